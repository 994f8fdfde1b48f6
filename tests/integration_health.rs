//! Integration tests for the health report over the fixture files

use datamedic::analyser::{AnalyzerKind, SkipReason};
use datamedic::config::EngineConfig;
use datamedic::dataset::Dataset;
use datamedic::purpose::{Purpose, TaskType};
use datamedic::session::Session;
use datamedic::stats::round_to;
use std::path::PathBuf;
use std::sync::Arc;

fn open(name: &str, purpose: Purpose) -> anyhow::Result<Session> {
    let data = Dataset::from_csv_path(&PathBuf::from("testdata").join(name))?;
    Ok(Session::new(data, purpose, Arc::new(EngineConfig::default()))?)
}

#[test]
fn test_classification_report_on_clean_data() -> anyhow::Result<()> {
    let purpose = Purpose::new(TaskType::Classification, Some("churned".to_owned()));
    let mut session = open("clean.csv", purpose)?;
    let config = session.config().clone();
    let report = session.health_report()?.clone();

    assert_eq!(
        report.skipped.get(&AnalyzerKind::Bias),
        Some(&SkipReason::NoSensitiveColumns),
        "Bias needs declared sensitive columns"
    );
    assert!(
        report.component_scores.contains_key(&AnalyzerKind::Leakage),
        "Leakage should run with a target and 40 rows: {:?}",
        report.skipped
    );
    assert_eq!(
        report.findings.len(),
        AnalyzerKind::ALL.len(),
        "Every analyzer reports, applicable or not"
    );

    let (weighted, total) = report
        .component_scores
        .iter()
        .fold((0.0, 0.0), |(w, t), (kind, score)| {
            let weight = config.scoring.weight(*kind);
            (w + weight * score, t + weight)
        });
    assert!(total > 0.0);
    assert_eq!(report.overall_score, round_to(weighted / total, 1));
    assert!((0.0..=100.0).contains(&report.overall_score));
    Ok(())
}

#[test]
fn test_target_analyzers_skip_without_target() -> anyhow::Result<()> {
    let mut session = open("clean.csv", Purpose::new(TaskType::GeneralCleaning, None))?;
    let report = session.health_report()?;

    for kind in [
        AnalyzerKind::Leakage,
        AnalyzerKind::Imbalance,
        AnalyzerKind::Baseline,
    ] {
        assert_eq!(
            report.skipped.get(&kind),
            Some(&SkipReason::NoTarget),
            "{kind:?} should be skipped without a target"
        );
        assert!(!report.component_scores.contains_key(&kind));
    }
    assert!(report.component_scores.contains_key(&AnalyzerKind::Missing));
    Ok(())
}

#[test]
fn test_missing_values_lower_the_missing_score() -> anyhow::Result<()> {
    let purpose = || Purpose::new(TaskType::GeneralCleaning, None);
    let mut clean = open("clean.csv", purpose())?;
    let mut messy = open("messy.csv", purpose())?;

    let clean_score = clean
        .health_report()?
        .component_scores
        .get(&AnalyzerKind::Missing)
        .copied();
    let messy_score = messy
        .health_report()?
        .component_scores
        .get(&AnalyzerKind::Missing)
        .copied();

    match (clean_score, messy_score) {
        (Some(clean), Some(messy)) => assert!(
            messy < clean,
            "messy.csv ({messy}) should score below clean.csv ({clean})"
        ),
        other => panic!("Missing analyzer did not run on both files: {other:?}"),
    }
    Ok(())
}

#[test]
fn test_changing_target_recomputes_report() -> anyhow::Result<()> {
    let mut session = open("clean.csv", Purpose::new(TaskType::Classification, None))?;
    assert!(
        session
            .health_report()?
            .skipped
            .contains_key(&AnalyzerKind::Imbalance)
    );

    session.set_target(Some("churned".to_owned()))?;
    let report = session.health_report()?;
    assert!(report.component_scores.contains_key(&AnalyzerKind::Imbalance));
    Ok(())
}
