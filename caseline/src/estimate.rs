//! Filling of missing event dates from auxiliary fields.
//!
//! Rules are applied strictly in declaration order and only ever fill null cells, so a direct
//! report always wins over an estimate. A rule whose inputs are absent from the table is skipped;
//! its target is still created (all null) so later stages see a consistent schema.

use log::{debug, warn};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

use crate::frame::{column_names, has_column};
use crate::COL;

/// Name of the scratch column holding dose classifications.
const DOSE_CLASS: &str = "_dose_class";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Dose {
    First,
    Second,
    Unknown,
}

/// Classifies free-text dose descriptions (`"1ª Dose"`, `"2ª Dose"`, ...) by prefix. The first
/// matching prefix wins.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DoseClassifier {
    prefixes: Vec<(String, Dose)>,
}

impl DoseClassifier {
    pub fn new<S: Into<String>>(prefixes: impl IntoIterator<Item = (S, Dose)>) -> Self {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(|(prefix, dose)| (prefix.into(), dose))
                .collect(),
        }
    }

    pub fn classify(&self, raw: &str) -> Dose {
        let raw = raw.trim();
        self.prefixes
            .iter()
            .find(|(prefix, _)| raw.starts_with(prefix.as_str()))
            .map(|(_, dose)| *dose)
            .unwrap_or(Dose::Unknown)
    }
}

impl Default for DoseClassifier {
    fn default() -> Self {
        Self::new([("1", Dose::First), ("2", Dose::Second)])
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum EstimateRule {
    /// Fill `target` from `estimate` wherever `target` is missing.
    FillFromEstimate { target: String, estimate: String },
    /// Fill `target` from `estimate` where `target` is missing and `status_column == status`.
    FillOnStatus {
        target: String,
        status_column: String,
        status: String,
        estimate: String,
    },
    /// Fill `target` from `source` where `target` is missing and `flag_column` equals
    /// `flag_value`, compared case-insensitively.
    FlagFromDate {
        target: String,
        flag_column: String,
        flag_value: String,
        source: String,
    },
    /// Copy `source` into `first_dose` or `second_dose` depending on how `dose_column` classifies.
    DoseSplit {
        dose_column: String,
        source: String,
        first_dose: String,
        second_dose: String,
        classifier: DoseClassifier,
    },
}

impl EstimateRule {
    pub fn fill_from_estimate(target: &str, estimate: &str) -> Self {
        Self::FillFromEstimate {
            target: target.into(),
            estimate: estimate.into(),
        }
    }

    pub fn fill_on_status(target: &str, status_column: &str, status: &str, estimate: &str) -> Self {
        Self::FillOnStatus {
            target: target.into(),
            status_column: status_column.into(),
            status: status.into(),
            estimate: estimate.into(),
        }
    }

    pub fn flag_from_date(target: &str, flag_column: &str, source: &str) -> Self {
        Self::FlagFromDate {
            target: target.into(),
            flag_column: flag_column.into(),
            flag_value: "yes".into(),
            source: source.into(),
        }
    }

    pub fn dose_split(dose_column: &str, source: &str, classifier: DoseClassifier) -> Self {
        Self::DoseSplit {
            dose_column: dose_column.into(),
            source: source.into(),
            first_dose: COL::DATE_NEW_PERSONS_VACCINATED.into(),
            second_dose: COL::DATE_NEW_PERSONS_FULLY_VACCINATED.into(),
            classifier,
        }
    }

    fn targets(&self) -> Vec<&str> {
        match self {
            Self::FillFromEstimate { target, .. }
            | Self::FillOnStatus { target, .. }
            | Self::FlagFromDate { target, .. } => vec![target.as_str()],
            Self::DoseSplit {
                first_dose,
                second_dose,
                ..
            } => vec![first_dose.as_str(), second_dose.as_str()],
        }
    }

    fn inputs(&self) -> Vec<&str> {
        match self {
            Self::FillFromEstimate { estimate, .. } => vec![estimate.as_str()],
            Self::FillOnStatus {
                status_column,
                estimate,
                ..
            } => vec![status_column.as_str(), estimate.as_str()],
            Self::FlagFromDate {
                flag_column,
                source,
                ..
            } => vec![flag_column.as_str(), source.as_str()],
            Self::DoseSplit {
                dose_column,
                source,
                ..
            } => vec![dose_column.as_str(), source.as_str()],
        }
    }

    fn apply(&self, df: DataFrame) -> PolarsResult<DataFrame> {
        let mut df = df;
        for target in self.targets() {
            if !has_column(&df, target) {
                df = df
                    .lazy()
                    .with_column(lit(NULL).cast(DataType::String).alias(target))
                    .collect()?;
            }
        }
        let missing: Vec<&str> = self
            .inputs()
            .into_iter()
            .filter(|c| !has_column(&df, c))
            .collect();
        if !missing.is_empty() {
            warn!("Skipping estimate rule {self:?}, unavailable columns: {missing:?}");
            return Ok(df);
        }

        match self {
            Self::FillFromEstimate { target, estimate } => df
                .lazy()
                .with_column(fill_where(target, col(target.as_str()).is_null(), estimate))
                .collect(),
            Self::FillOnStatus {
                target,
                status_column,
                status,
                estimate,
            } => {
                let mask = col(target.as_str()).is_null().and(
                    col(status_column.as_str())
                        .cast(DataType::String)
                        .eq(lit(status.as_str())),
                );
                df.lazy()
                    .with_column(fill_where(target, mask, estimate))
                    .collect()
            }
            Self::FlagFromDate {
                target,
                flag_column,
                flag_value,
                source,
            } => {
                let mask = col(target.as_str()).is_null().and(
                    col(flag_column.as_str())
                        .cast(DataType::String)
                        .str()
                        .to_lowercase()
                        .eq(lit(flag_value.to_lowercase())),
                );
                df.lazy()
                    .with_column(fill_where(target, mask, source))
                    .collect()
            }
            Self::DoseSplit {
                dose_column,
                source,
                first_dose,
                second_dose,
                classifier,
            } => {
                let classes: StringChunked = df
                    .column(dose_column)?
                    .cast(&DataType::String)?
                    .str()?
                    .into_iter()
                    .map(|raw| raw.map(|value| classifier.classify(value).as_ref().to_string()))
                    .collect();
                df.with_column(classes.with_name(DOSE_CLASS).into_series())?;
                let is_dose = |dose: Dose| col(DOSE_CLASS).eq(lit(dose.as_ref()));
                df.lazy()
                    .with_columns([
                        fill_where(
                            first_dose,
                            col(first_dose.as_str()).is_null().and(is_dose(Dose::First)),
                            source,
                        ),
                        fill_where(
                            second_dose,
                            col(second_dose.as_str())
                                .is_null()
                                .and(is_dose(Dose::Second)),
                            source,
                        ),
                    ])
                    .collect()
            }
        }
    }
}

/// `target` takes the value of `source` where `mask` holds, and keeps its own value elsewhere.
fn fill_where(target: &str, mask: Expr, source: &str) -> Expr {
    when(mask)
        .then(col(source).cast(DataType::String))
        .otherwise(col(target).cast(DataType::String))
        .alias(target)
}

/// Apply `rules` in order.
pub fn apply_estimates(df: &DataFrame, rules: &[EstimateRule]) -> PolarsResult<DataFrame> {
    rules.iter().try_fold(df.clone(), |acc, rule| {
        debug!("Applying estimate rule {rule:?}");
        rule.apply(acc)
    })
}

/// Remove adapter-internal columns (prefixed with `_`).
pub fn drop_internal_columns(df: &DataFrame) -> PolarsResult<DataFrame> {
    let keep: Vec<Expr> = column_names(df)
        .iter()
        .filter(|name| !name.starts_with(COL::INTERNAL_PREFIX))
        .map(|name| col(name.as_str()))
        .collect();
    df.clone().lazy().select(keep).collect()
}

#[cfg(test)]
mod tests {
    use polars::df;

    use super::*;

    const ESTIMATE: &str = "_date_estimate";
    const PROGNOSIS: &str = "_prognosis";
    const ADMITTED: &str = "_hospitalized";

    fn philippines_rules() -> Vec<EstimateRule> {
        vec![
            EstimateRule::fill_from_estimate(COL::DATE_NEW_CONFIRMED, ESTIMATE),
            EstimateRule::fill_on_status(COL::DATE_NEW_RECOVERED, PROGNOSIS, "Recovered", ESTIMATE),
            EstimateRule::fill_on_status(COL::DATE_NEW_DECEASED, PROGNOSIS, "Died", ESTIMATE),
            EstimateRule::flag_from_date(COL::DATE_NEW_HOSPITALIZED, ADMITTED, COL::DATE_NEW_CONFIRMED),
        ]
    }

    fn str_values(df: &DataFrame, column: &str) -> Vec<Option<String>> {
        df.column(column)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .map(|v| v.map(|s| s.to_string()))
            .collect()
    }

    #[test]
    fn test_recovered_status_fills_recovered_only() -> anyhow::Result<()> {
        let cases = df!(
            COL::DATE_NEW_CONFIRMED => &[Some("2021-09-01")],
            COL::DATE_NEW_RECOVERED => &[None::<&str>],
            COL::DATE_NEW_DECEASED => &[None::<&str>],
            ESTIMATE => &[Some("2021-09-10")],
            PROGNOSIS => &[Some("Recovered")],
            ADMITTED => &[Some("No")]
        )?;
        let derived = apply_estimates(&cases, &philippines_rules())?;
        assert_eq!(
            str_values(&derived, COL::DATE_NEW_RECOVERED),
            vec![Some("2021-09-10".to_string())]
        );
        assert_eq!(str_values(&derived, COL::DATE_NEW_DECEASED), vec![None]);
        assert_eq!(str_values(&derived, COL::DATE_NEW_HOSPITALIZED), vec![None]);
        // Direct reports are never overwritten
        assert_eq!(
            str_values(&derived, COL::DATE_NEW_CONFIRMED),
            vec![Some("2021-09-01".to_string())]
        );
        Ok(())
    }

    #[test]
    fn test_rules_apply_in_order() -> anyhow::Result<()> {
        let cases = df!(
            COL::DATE_NEW_CONFIRMED => &[None::<&str>, None],
            ESTIMATE => &[Some("2021-09-02"), None],
            PROGNOSIS => &[Some("Died"), Some("Died")],
            ADMITTED => &[Some("YES"), Some("yes")]
        )?;
        let derived = apply_estimates(&cases, &philippines_rules())?;
        // Confirmed is estimated first, so hospitalized can be derived from it
        assert_eq!(
            str_values(&derived, COL::DATE_NEW_HOSPITALIZED),
            vec![Some("2021-09-02".to_string()), None]
        );
        assert_eq!(
            str_values(&derived, COL::DATE_NEW_DECEASED),
            vec![Some("2021-09-02".to_string()), None]
        );
        assert_eq!(str_values(&derived, COL::DATE_NEW_RECOVERED), vec![None, None]);
        Ok(())
    }

    #[test]
    fn test_missing_inputs_skip_rule() -> anyhow::Result<()> {
        let cases = df!(COL::DATE_NEW_CONFIRMED => &["2021-09-01"])?;
        let derived = apply_estimates(&cases, &philippines_rules())?;
        assert_eq!(derived.height(), 1);
        assert_eq!(derived.column(COL::DATE_NEW_RECOVERED)?.null_count(), 1);
        assert_eq!(derived.column(COL::DATE_NEW_HOSPITALIZED)?.null_count(), 1);
        Ok(())
    }

    #[test]
    fn test_dose_split() -> anyhow::Result<()> {
        let classifier = DoseClassifier::default();
        assert_eq!(classifier.classify(" 1ª Dose"), Dose::First);
        assert_eq!(classifier.classify("2ª Dose"), Dose::Second);
        assert_eq!(classifier.classify("Dose Adicional"), Dose::Unknown);

        let cases = df!(
            COL::DATE_NEW_VACCINE_DOSES_ADMINISTERED => &["2021-05-01", "2021-06-01", "2021-07-01"],
            "_dose_information" => &["1ª Dose", "2ª Dose", "Reforço"]
        )?;
        let rules = [EstimateRule::dose_split(
            "_dose_information",
            COL::DATE_NEW_VACCINE_DOSES_ADMINISTERED,
            classifier,
        )];
        let derived = drop_internal_columns(&apply_estimates(&cases, &rules)?)?;
        assert_eq!(
            str_values(&derived, COL::DATE_NEW_PERSONS_VACCINATED),
            vec![Some("2021-05-01".to_string()), None, None]
        );
        assert_eq!(
            str_values(&derived, COL::DATE_NEW_PERSONS_FULLY_VACCINATED),
            vec![None, Some("2021-06-01".to_string()), None]
        );
        assert!(column_names(&derived)
            .iter()
            .all(|c| !c.starts_with(COL::INTERNAL_PREFIX)));
        Ok(())
    }
}
