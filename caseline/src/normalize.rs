//! Renaming of source-specific columns into the canonical schema, plus the value-level
//! normalizations every adapter needs (sex labels, ages, numeric codes, blank dates).

use std::collections::HashMap;

use itertools::Itertools;
use log::debug;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::frame::{column_names, has_column, map_str_column};
use crate::COL;

/// Mapping from source column names to canonical names. Matching is exact and case-sensitive.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ColumnAdapter {
    mapping: Vec<(String, String)>,
    drop_unmapped: bool,
}

impl ColumnAdapter {
    /// Adapter that keeps only the mapped columns.
    pub fn new<S: Into<String>, T: Into<String>>(mapping: impl IntoIterator<Item = (S, T)>) -> Self {
        Self {
            mapping: mapping
                .into_iter()
                .map(|(source, target)| (source.into(), target.into()))
                .collect(),
            drop_unmapped: true,
        }
    }

    /// Keep columns that are not part of the mapping under their original name.
    pub fn keep_unmapped(self) -> Self {
        Self {
            drop_unmapped: false,
            ..self
        }
    }

    pub fn source_columns(&self) -> Vec<&str> {
        self.mapping.iter().map(|(source, _)| source.as_str()).collect()
    }
}

/// Rename the columns of `df` according to `adapter`. Mapped columns missing from `df` are
/// skipped; later stages decide what to do without them.
pub fn table_rename(df: &DataFrame, adapter: &ColumnAdapter) -> PolarsResult<DataFrame> {
    let present = column_names(df);
    let mut exprs = vec![];
    for (source, target) in &adapter.mapping {
        if present.contains(source) {
            exprs.push(col(source.as_str()).alias(target.as_str()));
        } else {
            debug!("Column '{source}' not in source table, '{target}' will be unavailable");
        }
    }
    if !adapter.drop_unmapped {
        exprs.extend(
            present
                .iter()
                .filter(|name| !adapter.mapping.iter().any(|(source, _)| source == *name))
                .map(|name| col(name.as_str())),
        );
    }
    df.clone().lazy().select(exprs).collect()
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Sex {
    Male,
    Female,
    Unknown,
}

/// Case-insensitive lookup from raw sex labels to [`Sex`]. Anything not in the table, including
/// nulls, is `Sex::Unknown` so those cases still count.
#[derive(Clone, Debug)]
pub struct SexClassifier {
    labels: HashMap<String, Sex>,
}

impl SexClassifier {
    pub fn new<'a>(labels: impl IntoIterator<Item = (&'a str, Sex)>) -> Self {
        Self {
            labels: labels
                .into_iter()
                .map(|(label, sex)| (label.trim().to_lowercase(), sex))
                .collect(),
        }
    }

    pub fn classify(&self, raw: Option<&str>) -> Sex {
        raw.and_then(|value| self.labels.get(&value.trim().to_lowercase()))
            .copied()
            .unwrap_or(Sex::Unknown)
    }

    /// Rewrite the `sex` column with canonical labels, creating it when absent.
    pub fn apply(&self, df: &DataFrame) -> PolarsResult<DataFrame> {
        if !has_column(df, COL::SEX) {
            return df
                .clone()
                .lazy()
                .with_column(lit(Sex::Unknown.as_ref()).alias(COL::SEX))
                .collect();
        }
        map_str_column(df, COL::SEX, |raw| {
            Some(self.classify(raw).as_ref().to_string())
        })
    }
}

impl Default for SexClassifier {
    fn default() -> Self {
        Self::new([
            ("male", Sex::Male),
            ("m", Sex::Male),
            ("female", Sex::Female),
            ("f", Sex::Female),
        ])
    }
}

/// Cast `age` to integers. Values that are not numbers become null (unknown age).
pub fn normalize_age(df: &DataFrame) -> PolarsResult<DataFrame> {
    if !has_column(df, COL::AGE) {
        return df
            .clone()
            .lazy()
            .with_column(lit(NULL).cast(DataType::Int64).alias(COL::AGE))
            .collect();
    }
    let ages = map_str_column(df, COL::AGE, |raw| {
        raw.and_then(|value| value.trim().parse::<f64>().ok())
            .filter(|age| age.is_finite() && *age >= 0.0)
            .map(|age| (age.trunc() as i64).to_string())
    })?;
    ages.lazy()
        .with_column(col(COL::AGE).cast(DataType::Int64))
        .collect()
}

/// Render numeric codes (possibly read as floats, e.g. `355030.0`) as zero-padded strings of
/// `width` digits. Non-numeric values become null.
pub fn numeric_code_as_string(df: &DataFrame, column: &str, width: usize) -> PolarsResult<DataFrame> {
    map_str_column(df, column, |raw| {
        raw.and_then(|value| value.trim().parse::<f64>().ok())
            .filter(|code| code.is_finite() && code.fract() == 0.0 && *code >= 0.0)
            .map(|code| format!("{:0width$}", code as i64))
    })
}

/// Turn empty and whitespace-only strings into nulls in every given column that exists.
pub fn blank_to_null(df: &DataFrame, columns: &[&str]) -> PolarsResult<DataFrame> {
    columns
        .iter()
        .filter(|c| has_column(df, c))
        .try_fold(df.clone(), |acc, column| {
            map_str_column(&acc, column, |raw| {
                raw.filter(|value| !value.trim().is_empty())
                    .map(|value| value.to_string())
            })
        })
}

/// Canonical event date columns of `df`.
pub fn event_date_columns(df: &DataFrame) -> Vec<String> {
    column_names(df)
        .into_iter()
        .filter(|c| COL::is_event_date(c))
        .collect_vec()
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use polars::df;

    use super::*;

    #[test]
    fn test_table_rename_drops_unmapped_and_skips_missing() -> anyhow::Result<()> {
        let raw = df!(
            "ProvRes" => &["CEBU"],
            "Age" => &["30"],
            "BarangayRes" => &["Lahug"]
        )?;
        let adapter = ColumnAdapter::new([
            ("ProvRes", "province"),
            ("Age", COL::AGE),
            ("DateDied", COL::DATE_NEW_DECEASED),
        ]);
        let renamed = table_rename(&raw, &adapter)?;
        assert_eq!(renamed, df!("province" => &["CEBU"], COL::AGE => &["30"])?);

        let kept = table_rename(&raw, &adapter.clone().keep_unmapped())?;
        assert_eq!(column_names(&kept), vec!["province", "age", "BarangayRes"]);
        Ok(())
    }

    #[test]
    fn test_table_rename_is_case_sensitive() -> anyhow::Result<()> {
        let raw = df!("age" => &["30"])?;
        let renamed = table_rename(&raw, &ColumnAdapter::new([("Age", COL::AGE)]))?;
        assert_eq!(renamed.width(), 0);
        Ok(())
    }

    #[test]
    fn test_sex_classifier() -> anyhow::Result<()> {
        let classifier = SexClassifier::default();
        assert_eq!(classifier.classify(Some("MALE")), Sex::Male);
        assert_eq!(classifier.classify(Some(" f ")), Sex::Female);
        assert_eq!(classifier.classify(Some("other")), Sex::Unknown);
        assert_eq!(classifier.classify(None), Sex::Unknown);
        assert_eq!(Sex::from_str("Female")?, Sex::Female);

        let df = df!(COL::SEX => &[Some("FEMALE"), None])?;
        assert_eq!(
            classifier.apply(&df)?,
            df!(COL::SEX => &["female", "unknown"])?
        );
        Ok(())
    }

    #[test]
    fn test_normalize_age() -> anyhow::Result<()> {
        let df = df!(COL::AGE => &[Some("30"), Some("41.0"), Some("n/a"), None])?;
        let ages = normalize_age(&df)?;
        assert_eq!(ages, df!(COL::AGE => &[Some(30i64), Some(41), None, None])?);

        let no_age = normalize_age(&df!("x" => &[1i64])?)?;
        assert_eq!(no_age.column(COL::AGE)?.dtype(), &DataType::Int64);
        Ok(())
    }

    #[test]
    fn test_numeric_code_as_string() -> anyhow::Result<()> {
        let df = df!(COL::SUBREGION2_CODE => &[Some("355030.0"), Some("12"), Some("abc"), None])?;
        let codes = numeric_code_as_string(&df, COL::SUBREGION2_CODE, 6)?;
        assert_eq!(
            codes,
            df!(COL::SUBREGION2_CODE => &[Some("355030"), Some("000012"), None, None])?
        );
        Ok(())
    }

    #[test]
    fn test_blank_to_null() -> anyhow::Result<()> {
        let df = df!(COL::DATE_NEW_CONFIRMED => &["2021-09-01", "  ", ""])?;
        let cleaned = blank_to_null(&df, &[COL::DATE_NEW_CONFIRMED, COL::DATE_NEW_DECEASED])?;
        assert_eq!(cleaned.column(COL::DATE_NEW_CONFIRMED)?.null_count(), 2);
        Ok(())
    }
}
