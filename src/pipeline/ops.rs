//! Pure transforms behind the operation table.
//!
//! Each function takes the current dataset and a typed [`Step`], and returns a
//! new dataset. Column rewrites are polars expressions over a lazy frame;
//! nothing here mutates its input or depends on anything but its arguments,
//! which is what makes plan execution repeatable.

use super::plan::{
    DurationUnit, EncodeMethod, FillValue, ImputeStrategy, Keep, OutlierMethod, ScaleMethod, Step,
};
use super::registry::Transformed;
use crate::dataset::{Dataset, parse_number};
use anyhow::{Context as _, Result, anyhow, bail};
use polars::prelude::*;
use regex::Regex;

fn mismatch(step: &Step, expected: &str) -> anyhow::Error {
    anyhow!("'{expected}' transform cannot run a '{}' step", step.kind())
}

/// `name` as a Float64 expression, failing unless every present cell is a number.
fn numeric_expr(data: &Dataset, name: &str) -> Result<Expr> {
    let dtype = data.dtype(name)?;
    if dtype.is_primitive_numeric() || dtype.is_bool() {
        return Ok(col(name).cast(DataType::Float64));
    }
    if dtype != DataType::String {
        bail!("column '{name}' of type {dtype} is not numeric");
    }

    let parsed = col(name)
        .str()
        .strip_chars(lit(NULL))
        .cast(DataType::Float64);
    let check = data
        .lazy()
        .select([col(name)
            .is_not_null()
            .and(parsed.clone().is_null())
            .sum()
            .alias("bad")])
        .collect()?;
    let bad: usize = check.column("bad")?.get(0)?.extract().unwrap_or(0);
    if bad > 0 {
        bail!("column '{name}' has {bad} non-numeric value(s)");
    }
    Ok(parsed)
}

/// One-row frame of aggregates over `data`.
fn aggregate(data: &Dataset, exprs: Vec<Expr>) -> Result<DataFrame> {
    data.lazy()
        .select(exprs)
        .collect()
        .context("Failed to aggregate column statistics")
}

fn scalar(stats: &DataFrame, name: &str) -> Result<Option<f64>> {
    let value = stats.column(name)?.cast(&DataType::Float64)?;
    Ok(value.f64()?.get(0).filter(|v| v.is_finite()))
}

/// Rewrite `name` in place with `expr`.
fn rewrite(data: &Dataset, name: &str, expr: Expr) -> Result<Dataset> {
    Dataset::from_lazy(data.lazy().with_column(expr.alias(name)))
}

fn unique_rows(lf: LazyFrame, subset: Option<Vec<PlSmallStr>>, keep: Keep) -> LazyFrame {
    let keep = match keep {
        Keep::First => UniqueKeepStrategy::First,
        Keep::Last => UniqueKeepStrategy::Last,
    };
    lf.unique_stable(subset, keep)
}

fn subset_names(data: &Dataset, subset: &[String]) -> Result<Vec<String>> {
    if subset.is_empty() {
        return Ok(data.column_names());
    }
    for name in subset {
        data.dtype(name)?;
    }
    Ok(subset.to_vec())
}

pub fn drop_duplicates(data: &Dataset, step: &Step) -> Result<Transformed> {
    let Step::DropDuplicates { subset, keep } = step else {
        return Err(mismatch(step, "drop_duplicates"));
    };
    let names = subset_names(data, subset)?;
    let subset = names.into_iter().map(PlSmallStr::from).collect();
    let out = Dataset::from_lazy(unique_rows(data.lazy(), Some(subset), *keep))?;
    Ok(Transformed::clean(out))
}

/// Near-duplicate removal: whitespace-trimmed, case-folded unless asked not to.
pub fn deduplicate(data: &Dataset, step: &Step) -> Result<Transformed> {
    let Step::Deduplicate {
        subset,
        keep,
        case_sensitive,
    } = step
    else {
        return Err(mismatch(step, "deduplicate"));
    };

    let names = subset_names(data, subset)?;
    let mut keys = Vec::with_capacity(names.len());
    let mut key_names = Vec::with_capacity(names.len());
    for (i, name) in names.iter().enumerate() {
        let key_name = PlSmallStr::from(format!("__dedup_key_{i}"));
        let mut key = col(name.as_str());
        if data.dtype(name)? == DataType::String {
            key = key.str().strip_chars(lit(NULL));
            if !*case_sensitive {
                key = key.str().to_lowercase();
            }
        }
        keys.push(key.alias(key_name.clone()));
        key_names.push(key_name);
    }

    let lf = unique_rows(data.lazy().with_columns(keys), Some(key_names.clone()), *keep);
    let out = Dataset::from_lazy(lf.drop(key_names))?;
    Ok(Transformed::clean(out))
}

pub fn remove_outliers(data: &Dataset, step: &Step) -> Result<Transformed> {
    let Step::RemoveOutliers {
        column,
        method,
        threshold,
    } = step
    else {
        return Err(mismatch(step, "remove_outliers"));
    };

    let x = numeric_expr(data, column)?;
    let stats = aggregate(
        data,
        vec![
            x.clone()
                .quantile(lit(0.25), QuantileMethod::Linear)
                .alias("q1"),
            x.clone()
                .quantile(lit(0.75), QuantileMethod::Linear)
                .alias("q3"),
            x.clone().mean().alias("mean"),
            x.clone().std(1).alias("std"),
        ],
    )?;
    let no_spread = || {
        Ok(Transformed::clean(data.clone())
            .with_warning(format!("'{column}' has no spread; nothing removed")))
    };

    let inside = match method {
        OutlierMethod::Iqr => {
            let (Some(q1), Some(q3)) = (scalar(&stats, "q1")?, scalar(&stats, "q3")?) else {
                return no_spread();
            };
            let iqr = q3 - q1;
            if iqr <= f64::EPSILON {
                return no_spread();
            }
            let (lo, hi) = (q1 - threshold * iqr, q3 + threshold * iqr);
            x.clone().gt_eq(lit(lo)).and(x.clone().lt_eq(lit(hi)))
        }
        OutlierMethod::Zscore => {
            let (Some(mean), Some(sd)) = (scalar(&stats, "mean")?, scalar(&stats, "std")?) else {
                return no_spread();
            };
            if sd <= f64::EPSILON {
                return no_spread();
            }
            ((x.clone() - lit(mean)) / lit(sd)).abs().lt(lit(*threshold))
        }
    };

    let out = Dataset::from_lazy(data.lazy().filter(x.is_null().or(inside)))?;
    tracing::debug!(
        column = %column,
        removed = data.height() - out.height(),
        "Outlier rows removed"
    );
    Ok(Transformed::clean(out))
}

/// Most frequent present value; ties go to the smallest.
fn mode_of(expr: Expr) -> Expr {
    expr.drop_nulls()
        .mode()
        .sort(SortOptions::default())
        .first()
}

fn impute_expr(data: &Dataset, name: &str, strategy: &ImputeStrategy) -> Result<Expr> {
    let dtype = data.dtype(name)?;
    let numeric = dtype.is_primitive_numeric() || dtype.is_bool();
    let text = || col(name).cast(DataType::String);

    let expr = match strategy {
        ImputeStrategy::Mean => {
            let x = numeric_expr(data, name)?;
            x.clone().fill_null(x.mean())
        }
        ImputeStrategy::Median => {
            let x = numeric_expr(data, name)?;
            x.clone().fill_null(x.median())
        }
        ImputeStrategy::Mode if numeric => {
            let x = col(name).cast(DataType::Float64);
            x.clone().fill_null(mode_of(x))
        }
        ImputeStrategy::Mode => text().fill_null(mode_of(text())),
        ImputeStrategy::Constant(FillValue::Number(fill)) if numeric => {
            col(name).cast(DataType::Float64).fill_null(lit(*fill))
        }
        ImputeStrategy::Constant(value) if numeric => {
            bail!(
                "column '{name}' is numeric but the fill value '{}' is not a number",
                value.label()
            )
        }
        ImputeStrategy::Constant(value) => text().fill_null(lit(value.label())),
    };
    Ok(expr)
}

pub fn impute(data: &Dataset, step: &Step) -> Result<Transformed> {
    let Step::Impute { columns, strategy } = step else {
        return Err(mismatch(step, "impute"));
    };

    let mut out = Transformed::clean(data.clone());
    for name in columns {
        let missing = out.dataset.null_count(name)?;
        if missing == 0 {
            out = out.with_warning(format!("'{name}' had no missing values"));
            continue;
        }
        let expr = impute_expr(&out.dataset, name, strategy)?;
        if missing == out.dataset.height() && !matches!(strategy, ImputeStrategy::Constant(_)) {
            bail!("column '{name}' has no values to impute from");
        }
        out.dataset = rewrite(&out.dataset, name, expr)?;
        tracing::debug!(column = %name, filled = missing, "Imputed");
    }
    Ok(out)
}

pub fn scale(data: &Dataset, step: &Step) -> Result<Transformed> {
    let Step::Scale { columns, method } = step else {
        return Err(mismatch(step, "scale"));
    };

    let mut out = Transformed::clean(data.clone());
    for name in columns {
        let x = numeric_expr(&out.dataset, name)?;
        let (offset, spread) = match method {
            ScaleMethod::Standard => (x.clone().mean(), x.clone().std(1)),
            ScaleMethod::MinMax => (x.clone().min(), x.clone().max() - x.clone().min()),
        };
        let stats = aggregate(&out.dataset, vec![spread.clone().alias("spread")])?;

        let scaled = if scalar(&stats, "spread")?.is_some_and(|s| s > f64::EPSILON) {
            (x - offset) / spread
        } else {
            out = out.with_warning(format!("'{name}' is constant; scaled to 0"));
            when(x.is_null())
                .then(lit(NULL).cast(DataType::Float64))
                .otherwise(lit(0.0))
        };
        out.dataset = rewrite(&out.dataset, name, scaled)?;
    }
    Ok(out)
}

pub fn encode(data: &Dataset, step: &Step) -> Result<Transformed> {
    let Step::Encode { columns, method } = step else {
        return Err(mismatch(step, "encode"));
    };

    let mut out = Transformed::clean(data.clone());
    for name in columns {
        let levels = out.dataset.levels(name)?;
        let value = col(name.as_str()).cast(DataType::String);

        let exprs: Vec<Expr> = match method {
            EncodeMethod::OneHot => levels
                .iter()
                .map(|level| {
                    value
                        .clone()
                        .eq(lit(level.as_str()))
                        .fill_null(lit(false))
                        .cast(DataType::Int32)
                        .alias(format!("{name}_{level}"))
                })
                .collect(),
            EncodeMethod::Ordinal => {
                // every present value is a level, so only nulls fall through
                let coded = levels.iter().zip(0_i64..).fold(
                    value.clone().cast(DataType::Int64),
                    |rest, (level, code)| {
                        when(value.clone().eq(lit(level.as_str())))
                            .then(lit(code))
                            .otherwise(rest)
                    },
                );
                vec![coded.alias(name.as_str())]
            }
        };

        // splice the replacement exprs in where the column stood
        let mut select = Vec::with_capacity(out.dataset.width() + exprs.len());
        let mut replacement = Some(exprs);
        for existing in out.dataset.column_names() {
            if existing == *name {
                select.extend(replacement.take().into_iter().flatten());
            } else {
                select.push(col(existing.as_str()));
            }
        }
        out.dataset = Dataset::from_lazy(out.dataset.lazy().select(select))?;

        if levels.is_empty() && *method == EncodeMethod::OneHot {
            out = out.with_warning(format!("'{name}' has no values; column removed"));
        }
    }
    Ok(out)
}

/// Parses free-form duration text into seconds.
#[derive(Debug, Clone)]
pub struct DurationParser {
    iso: Regex,
    token: Regex,
}

impl DurationParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            iso: Regex::new(
                r"(?i)^P(?:(\d+(?:\.\d+)?)D)?(?:T(?:(\d+(?:\.\d+)?)H)?(?:(\d+(?:\.\d+)?)M)?(?:(\d+(?:\.\d+)?)S)?)?$",
            )?,
            token: Regex::new(
                r"(?i)(\d+(?:\.\d+)?)\s*(days?|d|hours?|hrs?|h|minutes?|mins?|m|seconds?|secs?|s)",
            )?,
        })
    }

    pub fn seconds(&self, raw: &str) -> Option<f64> {
        let s = raw.trim();
        if s.is_empty() {
            return None;
        }
        if let Some(v) = parse_number(s) {
            return (v >= 0.0).then_some(v);
        }
        if s.contains(':') {
            return clock_seconds(s);
        }
        self.iso_seconds(s).or_else(|| self.token_seconds(s))
    }

    fn iso_seconds(&self, s: &str) -> Option<f64> {
        let caps = self.iso.captures(s)?;
        let mut total = 0.0;
        let mut any = false;
        for (idx, unit) in [(1, 86_400.0), (2, 3600.0), (3, 60.0), (4, 1.0)] {
            if let Some(m) = caps.get(idx) {
                total += m.as_str().parse::<f64>().ok()? * unit;
                any = true;
            }
        }
        any.then_some(total)
    }

    fn token_seconds(&self, s: &str) -> Option<f64> {
        let mut total = 0.0;
        let mut consumed = 0;
        for caps in self.token.captures_iter(s) {
            let whole = caps.get(0)?;
            if !is_separator(s.get(consumed..whole.start())?) {
                return None;
            }
            let amount: f64 = caps.get(1)?.as_str().parse().ok()?;
            let unit = match caps.get(2)?.as_str().to_ascii_lowercase().chars().next()? {
                'd' => 86_400.0,
                'h' => 3600.0,
                'm' => 60.0,
                _ => 1.0,
            };
            total += amount * unit;
            consumed = whole.end();
        }
        (consumed > 0 && is_separator(s.get(consumed..)?)).then_some(total)
    }
}

fn is_separator(gap: &str) -> bool {
    gap.chars().all(|c| c.is_whitespace() || c == ',')
}

/// `MM:SS` or `HH:MM:SS`.
fn clock_seconds(s: &str) -> Option<f64> {
    let parts: Vec<f64> = s
        .split(':')
        .map(|p| p.trim().parse::<f64>().ok().filter(|v| *v >= 0.0))
        .collect::<Option<_>>()?;
    match parts.as_slice() {
        [m, sec] if *sec < 60.0 => Some(m * 60.0 + sec),
        [h, m, sec] if *m < 60.0 && *sec < 60.0 => Some(h * 3600.0 + m * 60.0 + sec),
        _ => None,
    }
}

pub fn normalize_duration(data: &Dataset, step: &Step) -> Result<Transformed> {
    let Step::NormalizeDuration { columns, unit } = step else {
        return Err(mismatch(step, "normalize_duration"));
    };

    let parser = DurationParser::new()?;
    let divisor = DurationUnit::seconds(*unit);
    let mut out = Transformed::clean(data.clone());
    for name in columns {
        let text = out.dataset.text(name)?;
        let mut unparsed = 0;
        let values: Vec<Option<f64>> = text
            .iter()
            .map(|v| {
                let raw = v.as_deref()?;
                let parsed = parser.seconds(raw);
                if parsed.is_none() {
                    unparsed += 1;
                }
                parsed.map(|secs| secs / divisor)
            })
            .collect();
        if unparsed > 0 {
            out = out.with_warning(format!(
                "{unparsed} value(s) in '{name}' could not be parsed as durations"
            ));
        }
        out.dataset = out
            .dataset
            .replace_column(name, Series::new(name.as_str().into(), values))?;
    }
    Ok(out)
}

pub fn drop_columns(data: &Dataset, step: &Step) -> Result<Transformed> {
    let Step::DropColumns { columns } = step else {
        return Err(mismatch(step, "drop_columns"));
    };
    Ok(Transformed::clean(data.drop_columns(columns)?))
}

/// Stable order on one column; nulls always last.
pub fn sort_by(data: &Dataset, step: &Step) -> Result<Transformed> {
    let Step::SortBy { column, ascending } = step else {
        return Err(mismatch(step, "sort_by"));
    };

    data.dtype(column)?;
    let options = SortMultipleOptions::default()
        .with_order_descending(!*ascending)
        .with_nulls_last(true)
        .with_maintain_order(true);
    let out = Dataset::from_lazy(data.lazy().sort([column.as_str()], options))?;
    Ok(Transformed::clean(out))
}

pub fn drop_sparse_rows(data: &Dataset, step: &Step) -> Result<Transformed> {
    let Step::DropSparseRows { threshold } = step else {
        return Err(mismatch(step, "drop_sparse_rows"));
    };
    if data.width() == 0 {
        return Ok(Transformed::clean(data.clone()));
    }

    let nulls: Vec<Expr> = data
        .column_names()
        .iter()
        .map(|name| col(name.as_str()).is_null().cast(DataType::Float64))
        .collect();
    let missing_share = sum_horizontal(nulls, true)? / lit(data.width() as f64);
    let out = Dataset::from_lazy(data.lazy().filter(missing_share.lt(lit(*threshold))))?;
    Ok(Transformed::clean(out))
}

pub fn clip_outliers(data: &Dataset, step: &Step) -> Result<Transformed> {
    let Step::ClipOutliers {
        columns,
        lower_quantile,
        upper_quantile,
    } = step
    else {
        return Err(mismatch(step, "clip_outliers"));
    };

    let mut out = Transformed::clean(data.clone());
    for name in columns {
        let x = numeric_expr(&out.dataset, name)?;
        if out.dataset.null_count(name)? == out.dataset.height() {
            out = out.with_warning(format!("'{name}' has no values to clip"));
            continue;
        }
        let lower = x
            .clone()
            .quantile(lit(*lower_quantile), QuantileMethod::Linear);
        let upper = x
            .clone()
            .quantile(lit(*upper_quantile), QuantileMethod::Linear);
        out.dataset = rewrite(&out.dataset, name, x.clip(lower, upper))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats;

    fn names(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|c| (*c).to_owned()).collect()
    }

    fn assert_close(actual: &[Option<f64>], expected: &[Option<f64>]) {
        assert_eq!(actual.len(), expected.len(), "length mismatch");
        for (a, e) in actual.iter().zip(expected) {
            match (a, e) {
                (Some(a), Some(e)) => assert!((a - e).abs() < 1e-9, "{a} != {e}"),
                _ => assert_eq!(a, e, "null mismatch"),
            }
        }
    }

    fn sample() -> anyhow::Result<Dataset> {
        Ok(Dataset::from_series(vec![
            Series::new("id".into(), vec![1_i64, 2, 3, 4, 5, 6]),
            Series::new(
                "amount".into(),
                vec![Some(10.0), Some(12.0), None, Some(11.0), Some(13.0), Some(500.0)],
            ),
            Series::new(
                "color".into(),
                vec![Some("red"), Some("blue"), None, Some("red"), Some("red"), Some("blue")],
            ),
        ])?)
    }

    #[test]
    fn test_remove_outliers_iqr_keeps_nulls() -> anyhow::Result<()> {
        let step = Step::RemoveOutliers {
            column: "amount".to_owned(),
            method: OutlierMethod::Iqr,
            threshold: 1.5,
        };
        let out = remove_outliers(&sample()?, &step)?;
        assert_eq!(
            out.dataset.numeric("id")?,
            vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(5.0)]
        );
        assert!(out.warnings.is_empty());
        Ok(())
    }

    #[test]
    fn test_remove_outliers_zscore() -> anyhow::Result<()> {
        let step = Step::RemoveOutliers {
            column: "amount".to_owned(),
            method: OutlierMethod::Zscore,
            threshold: 1.5,
        };
        let out = remove_outliers(&sample()?, &step)?;
        assert_eq!(out.dataset.height(), 5);
        Ok(())
    }

    #[test]
    fn test_remove_outliers_without_spread_warns() -> anyhow::Result<()> {
        let data = Dataset::from_series(vec![Series::new("x".into(), vec![4.0, 4.0, 4.0])])?;
        let step = Step::RemoveOutliers {
            column: "x".to_owned(),
            method: OutlierMethod::Iqr,
            threshold: 1.5,
        };
        let out = remove_outliers(&data, &step)?;
        assert_eq!(out.dataset.height(), 3);
        assert_eq!(out.warnings.len(), 1);
        Ok(())
    }

    #[test]
    fn test_impute_median_and_mode() -> anyhow::Result<()> {
        let data = sample()?;
        let median = impute(
            &data,
            &Step::Impute {
                columns: names(&["amount"]),
                strategy: ImputeStrategy::Median,
            },
        )?;
        assert_eq!(median.dataset.numeric("amount")?.get(2), Some(&Some(12.0)));
        assert_eq!(median.dataset.dtype("amount")?, DataType::Float64);

        let mode = impute(
            &data,
            &Step::Impute {
                columns: names(&["color"]),
                strategy: ImputeStrategy::Mode,
            },
        )?;
        assert_eq!(
            mode.dataset.text("color")?.get(2),
            Some(&Some("red".to_owned()))
        );
        Ok(())
    }

    #[test]
    fn test_numeric_mode_prefers_smallest_on_tie() -> anyhow::Result<()> {
        let data = Dataset::from_series(vec![Series::new(
            "x".into(),
            vec![Some(3_i64), Some(2), Some(3), None, Some(2), Some(1)],
        )])?;
        let step = Step::Impute {
            columns: names(&["x"]),
            strategy: ImputeStrategy::Mode,
        };
        let out = impute(&data, &step)?;
        assert_eq!(out.dataset.numeric("x")?.get(3), Some(&Some(2.0)));

        let empty = Dataset::from_series(vec![Series::new("x".into(), vec![None::<f64>; 3])])?;
        let err = impute(&empty, &step).unwrap_err();
        assert!(err.to_string().contains("no values to impute"));
        Ok(())
    }

    #[test]
    fn test_impute_constant_type_rules() -> anyhow::Result<()> {
        let data = sample()?;
        let text_into_number = Step::Impute {
            columns: names(&["amount"]),
            strategy: ImputeStrategy::Constant(FillValue::Text("unknown".to_owned())),
        };
        assert!(impute(&data, &text_into_number).is_err());

        let number = Step::Impute {
            columns: names(&["amount"]),
            strategy: ImputeStrategy::Constant(FillValue::Number(0.0)),
        };
        let out = impute(&data, &number)?;
        assert_eq!(out.dataset.numeric("amount")?.get(2), Some(&Some(0.0)));

        let label = Step::Impute {
            columns: names(&["color"]),
            strategy: ImputeStrategy::Constant(FillValue::Text("none".to_owned())),
        };
        let out = impute(&data, &label)?;
        assert_eq!(out.dataset.null_mask("color")?, vec![false; 6]);
        Ok(())
    }

    #[test]
    fn test_impute_without_missing_values_warns() -> anyhow::Result<()> {
        let step = Step::Impute {
            columns: names(&["id"]),
            strategy: ImputeStrategy::Mean,
        };
        let out = impute(&sample()?, &step)?;
        assert_eq!(out.warnings, vec!["'id' had no missing values".to_owned()]);
        Ok(())
    }

    #[test]
    fn test_scale_methods() -> anyhow::Result<()> {
        let data = Dataset::from_series(vec![
            Series::new("x".into(), vec![Some(1.0), Some(2.0), None, Some(3.0)]),
            Series::new("flat".into(), vec![5_i64, 5, 5, 5]),
        ])?;

        let standard = scale(
            &data,
            &Step::Scale {
                columns: names(&["x"]),
                method: ScaleMethod::Standard,
            },
        )?;
        assert_close(
            &standard.dataset.numeric("x")?,
            &[Some(-1.0), Some(0.0), None, Some(1.0)],
        );

        let minmax = scale(
            &data,
            &Step::Scale {
                columns: names(&["x", "flat"]),
                method: ScaleMethod::MinMax,
            },
        )?;
        assert_close(
            &minmax.dataset.numeric("x")?,
            &[Some(0.0), Some(0.5), None, Some(1.0)],
        );
        assert_eq!(minmax.dataset.numeric("flat")?, vec![Some(0.0); 4]);
        assert_eq!(minmax.warnings.len(), 1);
        Ok(())
    }

    #[test]
    fn test_scale_rejects_text() -> anyhow::Result<()> {
        let step = Step::Scale {
            columns: names(&["color"]),
            method: ScaleMethod::Standard,
        };
        let err = scale(&sample()?, &step).unwrap_err();
        assert!(err.to_string().contains("non-numeric"));
        Ok(())
    }

    #[test]
    fn test_onehot_splices_in_place() -> anyhow::Result<()> {
        let step = Step::Encode {
            columns: names(&["color"]),
            method: EncodeMethod::OneHot,
        };
        let out = encode(&sample()?, &step)?;
        assert_eq!(
            out.dataset.column_names(),
            vec!["id", "amount", "color_blue", "color_red"]
        );
        assert_eq!(
            out.dataset.numeric("color_red")?,
            vec![Some(1.0), Some(0.0), Some(0.0), Some(1.0), Some(1.0), Some(0.0)]
        );
        assert_eq!(out.dataset.dtype("color_blue")?, DataType::Int32);
        Ok(())
    }

    #[test]
    fn test_ordinal_codes_keep_nulls() -> anyhow::Result<()> {
        let step = Step::Encode {
            columns: names(&["color"]),
            method: EncodeMethod::Ordinal,
        };
        let out = encode(&sample()?, &step)?;
        assert_eq!(
            out.dataset.numeric("color")?,
            vec![Some(1.0), Some(0.0), None, Some(1.0), Some(1.0), Some(0.0)]
        );
        Ok(())
    }

    #[test]
    fn test_onehot_names_follow_numeric_levels() -> anyhow::Result<()> {
        let data = Dataset::from_series(vec![
            Series::new("code".into(), vec![Some("10"), Some("9"), Some("100"), None]),
            Series::new("empty".into(), vec![None::<&str>; 4]),
        ])?;
        let step = Step::Encode {
            columns: names(&["code", "empty"]),
            method: EncodeMethod::OneHot,
        };
        let out = encode(&data, &step)?;
        assert_eq!(
            out.dataset.column_names(),
            vec!["code_9", "code_10", "code_100"]
        );
        assert_eq!(
            out.dataset.numeric("code_9")?,
            vec![Some(0.0), Some(1.0), Some(0.0), Some(0.0)]
        );
        assert_eq!(
            out.warnings,
            vec!["'empty' has no values; column removed".to_owned()]
        );
        Ok(())
    }

    #[test]
    fn test_deduplicate_folds_case_and_whitespace() -> anyhow::Result<()> {
        let data = Dataset::from_series(vec![Series::new(
            "name".into(),
            vec![" Ann", "ann", "Bob", "bob "],
        )])?;

        let folded = |keep, case_sensitive| Step::Deduplicate {
            subset: Vec::new(),
            keep,
            case_sensitive,
        };

        let first = deduplicate(&data, &folded(Keep::First, false))?;
        assert_eq!(
            first.dataset.text("name")?,
            vec![Some(" Ann".to_owned()), Some("Bob".to_owned())]
        );

        let last = deduplicate(&data, &folded(Keep::Last, false))?;
        assert_eq!(
            last.dataset.text("name")?,
            vec![Some("ann".to_owned()), Some("bob ".to_owned())]
        );

        let strict = deduplicate(&data, &folded(Keep::First, true))?;
        assert_eq!(strict.dataset.height(), 4);
        Ok(())
    }

    #[test]
    fn test_drop_duplicates_on_subset() -> anyhow::Result<()> {
        let step = Step::DropDuplicates {
            subset: names(&["color"]),
            keep: Keep::First,
        };
        let out = drop_duplicates(&sample()?, &step)?;
        assert_eq!(
            out.dataset.numeric("id")?,
            vec![Some(1.0), Some(2.0), Some(3.0)]
        );
        Ok(())
    }

    #[test]
    fn test_duration_forms() -> anyhow::Result<()> {
        let parser = DurationParser::new()?;
        let cases = [
            ("42", Some(42.0)),
            ("1:30", Some(90.0)),
            ("01:02:03", Some(3723.0)),
            ("PT1H30M", Some(5400.0)),
            ("pt45s", Some(45.0)),
            ("1h 30m", Some(5400.0)),
            ("1h30m", Some(5400.0)),
            ("2 hours", Some(7200.0)),
            ("45 min", Some(2700.0)),
            ("90s", Some(90.0)),
            ("1 day", Some(86_400.0)),
            ("abc", None),
            ("1:75", None),
            ("PT", None),
            ("5 hourly", None),
            ("-3", None),
        ];
        for (raw, expected) in cases {
            assert_eq!(parser.seconds(raw), expected, "parsing {raw:?}");
        }
        Ok(())
    }

    #[test]
    fn test_normalize_duration_counts_failures() -> anyhow::Result<()> {
        let data = Dataset::from_series(vec![Series::new(
            "call".into(),
            vec![Some("1:30"), Some("2 min"), Some("soon"), None],
        )])?;
        let step = Step::NormalizeDuration {
            columns: names(&["call"]),
            unit: DurationUnit::Minutes,
        };
        let out = normalize_duration(&data, &step)?;
        assert_close(&out.dataset.numeric("call")?, &[Some(1.5), Some(2.0), None, None]);
        assert_eq!(
            out.warnings,
            vec!["1 value(s) in 'call' could not be parsed as durations".to_owned()]
        );
        Ok(())
    }

    #[test]
    fn test_sort_by_puts_nulls_last() -> anyhow::Result<()> {
        let data = sample()?;
        let desc = sort_by(
            &data,
            &Step::SortBy {
                column: "amount".to_owned(),
                ascending: false,
            },
        )?;
        assert_eq!(
            desc.dataset.numeric("id")?,
            vec![Some(6.0), Some(5.0), Some(2.0), Some(4.0), Some(1.0), Some(3.0)]
        );

        let by_color = sort_by(
            &data,
            &Step::SortBy {
                column: "color".to_owned(),
                ascending: true,
            },
        )?;
        assert_eq!(
            by_color.dataset.numeric("id")?,
            vec![Some(2.0), Some(6.0), Some(1.0), Some(4.0), Some(5.0), Some(3.0)]
        );
        Ok(())
    }

    #[test]
    fn test_drop_sparse_rows() -> anyhow::Result<()> {
        let data = Dataset::from_series(vec![
            Series::new("a".into(), vec![Some(1.0), None, None]),
            Series::new("b".into(), vec![Some(1.0), None, Some(2.0)]),
            Series::new("c".into(), vec![Some("x"), Some("y"), Some("z")]),
        ])?;
        let out = drop_sparse_rows(&data, &Step::DropSparseRows { threshold: 0.5 })?;
        assert_eq!(out.dataset.text("c")?, vec![Some("x".to_owned()), Some("z".to_owned())]);
        Ok(())
    }

    #[test]
    fn test_clip_to_quantiles() -> anyhow::Result<()> {
        let values: Vec<f64> = (1..=100).map(f64::from).collect();
        let data = Dataset::from_series(vec![Series::new("x".into(), values)])?;
        let step = Step::ClipOutliers {
            columns: names(&["x"]),
            lower_quantile: 0.1,
            upper_quantile: 0.9,
        };
        let clipped = stats::finite(&clip_outliers(&data, &step)?.dataset.numeric("x")?);
        let lo = clipped.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = clipped.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert!((lo - 10.9).abs() < 1e-9, "{lo}");
        assert!((hi - 90.1).abs() < 1e-9, "{hi}");
        Ok(())
    }

    #[test]
    fn test_missing_column_and_wrong_step_fail() -> anyhow::Result<()> {
        let data = sample()?;
        let gone = Step::DropColumns {
            columns: names(&["ghost"]),
        };
        assert!(drop_columns(&data, &gone).is_err());

        let err = scale(&data, &gone).unwrap_err();
        assert!(err.to_string().contains("drop_columns"));
        Ok(())
    }
}
