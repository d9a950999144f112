//! Jurisdiction adapters.
//!
//! Every adapter implements [`DataSource`]. The trait's default methods form the shared case-line
//! pipeline (rename, derive, convert, aggregate); adapters override the hooks their data needs.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::NaiveDate;
use enum_dispatch::enum_dispatch;
use log::debug;
use polars::prelude::*;

use crate::aggregate::{aggregate_admin_levels, AdminAggregation};
use crate::config::Config;
use crate::convert::{convert_cases_to_time_series, normalize_dates};
use crate::error::{CaseLineError, CaseLineResult};
use crate::estimate::{apply_estimates, drop_internal_columns, EstimateRule};
use crate::filter::RecordFilter;
use crate::frame::{column_names, concat_aligned};
use crate::normalize::{blank_to_null, normalize_age, table_rename, ColumnAdapter, SexClassifier};
use crate::snapshot::{FetchOptions, DEFAULT_SNAPSHOT_DATE_FORMAT};
use crate::COL;

pub mod br;
pub mod covid19br;
pub mod ph;

pub use br::BrazilDataSource;
pub use covid19br::Covid19BrDataSource;
pub use ph::PhilippinesDataSource;

/// Default earliest plausible record date.
pub fn default_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Rename `raw`, turn blank cells into nulls and normalize sex and age.
pub fn rename_and_clean(
    raw: &DataFrame,
    adapter: &ColumnAdapter,
    sex_classifier: &SexClassifier,
) -> PolarsResult<DataFrame> {
    let cases = table_rename(raw, adapter)?;
    let columns = column_names(&cases);
    let cases = blank_to_null(
        &cases,
        &columns.iter().map(String::as_str).collect::<Vec<_>>(),
    )?;
    normalize_age(&sex_classifier.apply(&cases)?)
}

/// Sum counts again after the date column was rewritten, since distinct raw dates may normalize
/// to the same day.
pub fn regroup(series: &DataFrame) -> PolarsResult<DataFrame> {
    let (counts, keys): (Vec<String>, Vec<String>) = column_names(series)
        .into_iter()
        .partition(|c| COL::is_count(c));
    series
        .clone()
        .lazy()
        .group_by_stable(keys.iter().map(|c| col(c.as_str())).collect::<Vec<_>>())
        .agg(counts.iter().map(|c| col(c.as_str()).sum()).collect::<Vec<_>>())
        .collect()
}

#[enum_dispatch]
pub trait DataSource {
    /// Identifier used to select the adapter.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn country_code(&self) -> &'static str;

    fn column_adapter(&self) -> ColumnAdapter;

    fn aggregation(&self) -> AdminAggregation;

    fn estimate_rules(&self) -> Vec<EstimateRule> {
        vec![]
    }

    fn index_columns(&self) -> Vec<String> {
        self.aggregation()
            .index_columns()
            .into_iter()
            .map(String::from)
            .collect()
    }

    /// Location names that never identify a real place.
    fn sentinels(&self) -> Vec<String> {
        vec![]
    }

    fn epoch(&self) -> NaiveDate {
        default_epoch()
    }

    /// First candidate date when the fetch URL is a dated snapshot; `None` for static URLs.
    fn snapshot_start(&self) -> Option<NaiveDate> {
        None
    }

    fn snapshot_date_format(&self) -> &'static str {
        DEFAULT_SNAPSHOT_DATE_FORMAT
    }

    fn sex_classifier(&self) -> SexClassifier {
        SexClassifier::default()
    }

    /// Whether output rows must carry a key, i.e. match strings are not resolved downstream.
    fn require_key(&self) -> bool {
        false
    }

    /// Expand configured fetch options into the requests that need making.
    fn fetch_options(&self, options: &[FetchOptions]) -> Vec<FetchOptions> {
        options.to_vec()
    }

    /// Rename one raw partition into canonical columns and normalize demographics.
    fn normalize_columns(&self, raw: &DataFrame) -> CaseLineResult<DataFrame> {
        Ok(rename_and_clean(
            raw,
            &self.column_adapter(),
            &self.sex_classifier(),
        )?)
    }

    fn derive_fields(&self, cases: &DataFrame) -> CaseLineResult<DataFrame> {
        let cases = apply_estimates(cases, &self.estimate_rules())?;
        Ok(drop_internal_columns(&cases)?)
    }

    /// Raw event dates are grouped first and normalized afterwards, so a value no format parses
    /// becomes a null `date` that the record filter counts as malformed.
    fn convert_to_series(&self, cases: &DataFrame, config: &Config) -> CaseLineResult<DataFrame> {
        let index_columns = self.index_columns();
        let index_columns = index_columns.iter().map(String::as_str).collect::<Vec<_>>();
        let series = convert_cases_to_time_series(cases, &index_columns)?;
        let series = normalize_dates(&series, COL::DATE, &config.date_formats)?;
        Ok(regroup(&series)?)
    }

    fn aggregate(&self, series: &DataFrame) -> CaseLineResult<DataFrame> {
        aggregate_admin_levels(series, &self.aggregation(), &self.sentinels())
    }

    /// Turn raw partitions into one table in the output schema.
    fn parse(
        &self,
        tables: &BTreeMap<String, DataFrame>,
        config: &Config,
    ) -> CaseLineResult<DataFrame> {
        let mut partitions = vec![];
        for (name, raw) in tables {
            if raw.height() == 0 {
                debug!("Skipping empty partition '{name}'");
                continue;
            }
            debug!("Partition '{name}' has shape {:?}", raw.shape());
            let cases = self.normalize_columns(raw)?;
            partitions.push(self.derive_fields(&cases)?);
        }
        if partitions.is_empty() {
            return Err(CaseLineError::EmptyInput);
        }
        let cases = concat_aligned(partitions, &[])?;
        let series = self.convert_to_series(&cases, config)?;
        self.aggregate(&series)
    }

    fn record_filter(&self, config: &Config) -> RecordFilter {
        RecordFilter::new(config.epoch_or(self.epoch()), config.today())
            .with_sentinels(self.sentinels())
            .with_require_key(self.require_key())
    }
}

/// The available jurisdiction adapters.
#[enum_dispatch(DataSource)]
#[derive(Debug, Clone)]
pub enum Jurisdiction {
    Philippines(PhilippinesDataSource),
    Brazil(BrazilDataSource),
    Covid19Br(Covid19BrDataSource),
}

impl Jurisdiction {
    pub fn all() -> Vec<Jurisdiction> {
        vec![
            PhilippinesDataSource.into(),
            BrazilDataSource.into(),
            Covid19BrDataSource.into(),
        ]
    }
}

impl FromStr for Jurisdiction {
    type Err = CaseLineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|source| source.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                CaseLineError::AnyhowError(anyhow::anyhow!("No data source named '{s}'"))
            })
    }
}
