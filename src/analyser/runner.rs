//! Concurrent analyzer fan-out with a shared deadline.

use super::{
    AnalysisContext, Analyzer, AnalyzerKind, AnalyzerOutcome, SkipReason, standard_analyzers,
};
use crate::error::panic_message;
use crossbeam_channel::RecvTimeoutError;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Runs a set of analyzers on worker threads and joins them under a deadline.
#[derive(Clone)]
pub struct AnalyzerRunner {
    analyzers: Vec<Arc<dyn Analyzer>>,
}

impl Default for AnalyzerRunner {
    fn default() -> Self {
        Self::new(standard_analyzers())
    }
}

impl AnalyzerRunner {
    pub fn new(analyzers: Vec<Arc<dyn Analyzer>>) -> Self {
        Self { analyzers }
    }

    /// Run every analyzer against `ctx`.
    ///
    /// Analyzers still running at `timeout` are reported as
    /// [`SkipReason::Timeout`] and left to finish on their detached thread;
    /// a panicking analyzer becomes [`SkipReason::InternalError`]. Outcomes
    /// come back in [`AnalyzerKind`] order whatever the completion order.
    pub fn run(&self, ctx: Arc<AnalysisContext>, timeout: Duration) -> Vec<AnalyzerOutcome> {
        let deadline = Instant::now() + timeout;
        let (tx, rx) = crossbeam_channel::unbounded::<AnalyzerOutcome>();
        let mut pending: BTreeSet<AnalyzerKind> = BTreeSet::new();
        let mut outcomes: BTreeMap<AnalyzerKind, AnalyzerOutcome> = BTreeMap::new();

        for analyzer in &self.analyzers {
            let kind = analyzer.kind();
            let analyzer = Arc::clone(analyzer);
            let ctx = Arc::clone(&ctx);
            let tx = tx.clone();

            let spawned = std::thread::Builder::new()
                .name(format!("analyzer-{kind}"))
                .spawn(move || {
                    let outcome = catch_unwind(AssertUnwindSafe(|| analyzer.analyze(&ctx)))
                        .unwrap_or_else(|payload| {
                            let message = panic_message(payload.as_ref());
                            tracing::error!(analyzer = %kind, "Analyzer panicked: {message}");
                            AnalyzerOutcome::skipped(kind, SkipReason::InternalError { message })
                        });
                    // receiver is gone once the deadline has passed
                    let _ = tx.send(outcome);
                });

            match spawned {
                Ok(_) => {
                    pending.insert(kind);
                }
                Err(e) => {
                    tracing::error!(analyzer = %kind, "Failed to spawn analyzer thread: {e}");
                    outcomes.insert(
                        kind,
                        AnalyzerOutcome::skipped(
                            kind,
                            SkipReason::InternalError {
                                message: format!("failed to spawn worker: {e}"),
                            },
                        ),
                    );
                }
            }
        }
        drop(tx);

        while !pending.is_empty() {
            match rx.recv_deadline(deadline) {
                Ok(outcome) => {
                    let kind = outcome.analyzer();
                    pending.remove(&kind);
                    tracing::debug!(
                        analyzer = %kind,
                        applicable = outcome.applicable(),
                        "Analyzer finished"
                    );
                    outcomes.insert(kind, outcome);
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
            }
        }

        for kind in pending {
            tracing::warn!(analyzer = %kind, ?timeout, "Analyzer timed out");
            outcomes.insert(kind, AnalyzerOutcome::skipped(kind, SkipReason::Timeout));
        }

        outcomes.into_values().collect()
    }
}
