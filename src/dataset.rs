//! Owned tabular dataset backed by a polars `DataFrame`.
//!
//! Analyzers read columns through the typed accessors here
//! ([`Dataset::numeric`], [`Dataset::text`], [`Dataset::null_mask`]), which
//! keeps the statistical code independent of the dataframe's dtype rules.
//! Plan transforms work on [`Dataset::lazy`] and come back through
//! [`Dataset::from_lazy`].

use crate::error::{EngineError, Result};
use anyhow::{Context as _, bail};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use sha2::{Digest as _, Sha256};
use std::path::Path;

const SECONDS_PER_DAY: i64 = 86_400;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%m/%d/%Y", "%d-%m-%Y"];

#[derive(Debug, Clone)]
pub struct Dataset {
    df: DataFrame,
}

impl Dataset {
    pub fn from_frame(df: DataFrame) -> Self {
        Self { df }
    }

    /// Build from named series; handy for fixtures.
    pub fn from_series(series: Vec<Series>) -> Result<Self> {
        let columns = series.into_iter().map(Column::from).collect();
        Ok(Self::from_frame(DataFrame::new(columns)?))
    }

    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read dataset {}", path.display()))?;
        Self::from_csv_bytes(&bytes)
    }

    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(EngineError::Data("dataset is empty".to_owned()));
        }

        let cursor = std::io::Cursor::new(bytes.to_vec());
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(10_000))
            .into_reader_with_file_handle(cursor)
            .finish()
            .context("Failed to parse CSV")?;

        Ok(Self::from_frame(df))
    }

    pub fn frame(&self) -> &DataFrame {
        &self.df
    }

    pub fn lazy(&self) -> LazyFrame {
        self.df.clone().lazy()
    }

    pub fn from_lazy(lf: LazyFrame) -> anyhow::Result<Self> {
        let df = lf.collect().context("Failed to collect transformed frame")?;
        Ok(Self::from_frame(df))
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn width(&self) -> usize {
        self.df.width()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.df.get_column_index(name).is_some()
    }

    pub fn dtype(&self, name: &str) -> anyhow::Result<DataType> {
        Ok(self.series(name)?.dtype().clone())
    }

    fn series(&self, name: &str) -> anyhow::Result<&Series> {
        Ok(self
            .df
            .column(name)
            .with_context(|| format!("column '{name}' not found"))?
            .as_materialized_series())
    }

    /// `true` where the cell is null.
    pub fn null_mask(&self, name: &str) -> anyhow::Result<Vec<bool>> {
        let series = self.series(name)?;
        Ok(series
            .is_null()
            .into_iter()
            .map(|v| v.unwrap_or(true))
            .collect())
    }

    pub fn null_count(&self, name: &str) -> anyhow::Result<usize> {
        Ok(self.series(name)?.null_count())
    }

    /// Values as `f64`; text is parsed, unparseable or non-finite cells are `None`.
    pub fn numeric(&self, name: &str) -> anyhow::Result<Vec<Option<f64>>> {
        let series = self.series(name)?;
        match series.dtype() {
            DataType::String => Ok(series
                .str()?
                .into_iter()
                .map(|v| v.and_then(parse_number))
                .collect()),
            dt if dt.is_primitive_numeric() || dt.is_bool() => {
                let cast = series.cast(&DataType::Float64)?;
                Ok(cast
                    .f64()?
                    .into_iter()
                    .map(|v| v.filter(|x| x.is_finite()))
                    .collect())
            }
            other => bail!("column '{name}' of type {other} is not numeric"),
        }
    }

    /// Values rendered as text; nulls stay `None`.
    pub fn text(&self, name: &str) -> anyhow::Result<Vec<Option<String>>> {
        let series = self.series(name)?;
        let cast = series.cast(&DataType::String)?;
        Ok(cast
            .str()?
            .into_iter()
            .map(|v| v.map(str::to_owned))
            .collect())
    }

    /// Values as seconds since the Unix epoch.
    pub fn timestamps(&self, name: &str) -> anyhow::Result<Vec<Option<i64>>> {
        let series = self.series(name)?;
        let (scale, ticks) = match series.dtype() {
            DataType::Date => (SECONDS_PER_DAY, 1),
            DataType::Datetime(unit, _) | DataType::Duration(unit) => (1, ticks_per_second(*unit)),
            dt if dt.is_temporal() => bail!("column '{name}' of type {dt} has no epoch"),
            _ => {
                return Ok(self
                    .text(name)?
                    .into_iter()
                    .map(|v| v.as_deref().and_then(parse_timestamp))
                    .collect());
            }
        };
        let cast = series.cast(&DataType::Int64)?;
        Ok(cast
            .i64()?
            .into_iter()
            .map(|v| v.map(|t| (t * scale).div_euclid(ticks)))
            .collect())
    }

    /// Distinct present values as text; numeric order when every level is a number.
    ///
    /// These are the suffixes a one-hot encoding of `name` produces.
    pub fn levels(&self, name: &str) -> anyhow::Result<Vec<String>> {
        let distinct = self
            .series(name)?
            .cast(&DataType::String)?
            .drop_nulls()
            .unique()?;
        let mut levels: Vec<String> = distinct
            .str()?
            .into_no_null_iter()
            .map(str::to_owned)
            .collect();
        levels.sort();

        let numbers: Option<Vec<f64>> = levels.iter().map(|l| parse_number(l)).collect();
        if let Some(numbers) = numbers {
            let mut paired: Vec<(f64, String)> = numbers.into_iter().zip(levels).collect();
            paired.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
            levels = paired.into_iter().map(|(_, l)| l).collect();
        }
        Ok(levels)
    }

    /// Rows that repeat an earlier row over every column.
    pub fn duplicate_count(&self) -> anyhow::Result<usize> {
        let unique = self
            .df
            .unique_stable(None, UniqueKeepStrategy::First, None)?;
        Ok(self.height() - unique.height())
    }

    pub fn head(&self, n: usize) -> Self {
        Self::from_frame(self.df.head(Some(n)))
    }

    /// Replace a column in place, keeping its position and name.
    pub fn replace_column(&self, name: &str, series: Series) -> anyhow::Result<Self> {
        self.splice_column(name, vec![series.with_name(name.into())])
    }

    /// Replace one column by several, inserted where the original was.
    pub fn splice_column(&self, name: &str, replacements: Vec<Series>) -> anyhow::Result<Self> {
        let pos = self
            .df
            .get_column_index(name)
            .with_context(|| format!("column '{name}' not found"))?;

        let mut columns: Vec<Column> = self.df.get_columns().to_vec();
        columns.splice(pos..=pos, replacements.into_iter().map(Column::from));
        Ok(Self::from_frame(DataFrame::new(columns)?))
    }

    pub fn drop_columns(&self, names: &[String]) -> anyhow::Result<Self> {
        for name in names {
            if !self.has_column(name) {
                bail!("column '{name}' not found");
            }
        }
        let columns: Vec<Column> = self
            .df
            .get_columns()
            .iter()
            .filter(|c| !names.iter().any(|n| n.as_str() == c.name().as_str()))
            .cloned()
            .collect();
        Ok(Self::from_frame(DataFrame::new(columns)?))
    }

    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let mut df = self.df.clone();
        CsvWriter::new(&mut buf)
            .include_header(true)
            .finish(&mut df)
            .context("Failed to serialise dataset")?;
        Ok(buf)
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let bytes = self.to_csv_bytes()?;
        std::fs::write(path, bytes)
            .with_context(|| format!("Failed to write dataset {}", path.display()))?;
        Ok(())
    }

    /// SHA-256 of the CSV serialisation, as lowercase hex.
    pub fn digest(&self) -> Result<String> {
        let bytes = self.to_csv_bytes()?;
        let hash = Sha256::digest(&bytes);
        Ok(format!("{hash:x}"))
    }
}

fn ticks_per_second(unit: TimeUnit) -> i64 {
    match unit {
        TimeUnit::Nanoseconds => 1_000_000_000,
        TimeUnit::Microseconds => 1_000_000,
        TimeUnit::Milliseconds => 1_000,
    }
}

pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse common date and datetime layouts into epoch seconds.
pub fn parse_timestamp(raw: &str) -> Option<i64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc().timestamp());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> anyhow::Result<Dataset> {
        Ok(Dataset::from_series(vec![
            Series::new("id".into(), vec![1_i64, 2, 3, 4]),
            Series::new("amount".into(), vec![Some(1.5), None, Some(3.0), Some(3.0)]),
            Series::new(
                "city".into(),
                vec![Some("Oslo"), Some(" oslo "), None, Some("Rome")],
            ),
        ])?)
    }

    #[test]
    fn test_csv_roundtrip_preserves_shape() -> anyhow::Result<()> {
        let ds = Dataset::from_csv_bytes(b"a,b\n1,x\n2,y\n3,\n")?;
        assert_eq!(ds.height(), 3);
        assert_eq!(ds.width(), 2);
        assert_eq!(ds.null_mask("b")?, vec![false, false, true]);

        let reparsed = Dataset::from_csv_bytes(&ds.to_csv_bytes()?)?;
        assert_eq!(reparsed.column_names(), vec!["a", "b"]);
        Ok(())
    }

    #[test]
    fn test_empty_bytes_are_a_data_error() {
        let err = Dataset::from_csv_bytes(b"  \n").unwrap_err();
        assert!(matches!(err, EngineError::Data(_)));
    }

    #[test]
    fn test_numeric_parses_text_columns() -> anyhow::Result<()> {
        let ds = Dataset::from_series(vec![Series::new(
            "v".into(),
            vec![Some("1.5"), Some("abc"), None, Some(" 2 ")],
        )])?;
        assert_eq!(ds.numeric("v")?, vec![Some(1.5), None, None, Some(2.0)]);
        Ok(())
    }

    #[test]
    fn test_levels_are_distinct_and_ordered() -> anyhow::Result<()> {
        let ds = sample()?;
        assert_eq!(ds.levels("city")?, vec![" oslo ", "Oslo", "Rome"]);

        let codes = Dataset::from_series(vec![Series::new(
            "code".into(),
            vec![Some("10"), Some("9"), None, Some("100"), Some("9")],
        )])?;
        assert_eq!(codes.levels("code")?, vec!["9", "10", "100"]);
        Ok(())
    }

    #[test]
    fn test_duplicate_count_over_whole_rows() -> anyhow::Result<()> {
        let ds = Dataset::from_series(vec![
            Series::new("a".into(), vec![Some(1_i64), Some(1), None, None, Some(1)]),
            Series::new("b".into(), vec!["x", "x", "y", "y", "z"]),
        ])?;
        assert_eq!(ds.duplicate_count()?, 2);
        assert_eq!(sample()?.duplicate_count()?, 0);
        Ok(())
    }

    #[test]
    fn test_temporal_columns_become_epoch_seconds() -> anyhow::Result<()> {
        let days = Series::new("day".into(), vec![Some(1_i32), None, Some(-1)])
            .cast(&DataType::Date)?;
        let millis = Series::new("at".into(), vec![Some(60_000_i64), Some(1_500), None])
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
        let micros = Series::new("us".into(), vec![86_400_000_000_i64, 0, 7])
            .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?;
        let ds = Dataset::from_series(vec![days, millis, micros])?;

        assert_eq!(ds.timestamps("day")?, vec![Some(86_400), None, Some(-86_400)]);
        assert_eq!(ds.timestamps("at")?, vec![Some(60), Some(1), None]);
        assert_eq!(ds.timestamps("us")?, vec![Some(86_400), Some(0), Some(0)]);
        Ok(())
    }

    #[test]
    fn test_splice_and_drop_keep_order() -> anyhow::Result<()> {
        let ds = sample()?;
        let spliced = ds.splice_column(
            "amount",
            vec![
                Series::new("amount_a".into(), vec![0_i32; 4]),
                Series::new("amount_b".into(), vec![1_i32; 4]),
            ],
        )?;
        assert_eq!(
            spliced.column_names(),
            vec!["id", "amount_a", "amount_b", "city"]
        );

        let dropped = spliced.drop_columns(&["amount_a".to_owned()])?;
        assert_eq!(dropped.column_names(), vec!["id", "amount_b", "city"]);
        assert!(ds.drop_columns(&["nope".to_owned()]).is_err());
        Ok(())
    }

    #[test]
    fn test_head_and_digest() -> anyhow::Result<()> {
        let ds = sample()?;
        let head = ds.head(2);
        assert_eq!(head.numeric("id")?, vec![Some(1.0), Some(2.0)]);

        assert_eq!(head.digest()?, ds.head(2).digest()?);
        assert_ne!(head.digest()?, ds.digest()?);
        assert_eq!(head.digest()?.len(), 64);
        Ok(())
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert_eq!(parse_timestamp("1970-01-02"), Some(86_400));
        assert_eq!(parse_timestamp("1970-01-01 00:01:00"), Some(60));
        assert_eq!(parse_timestamp("1970-01-01T00:00:10Z"), Some(10));
        assert_eq!(parse_timestamp("42"), None);
        assert_eq!(parse_timestamp("not a date"), None);
    }
}
