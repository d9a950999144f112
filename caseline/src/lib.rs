use std::collections::BTreeMap;

use chrono::Duration;
use log::{debug, info};
use polars::prelude::*;

use crate::config::Config;
use crate::error::CaseLineResult;
use crate::filter::FilterReport;
use crate::matcher::{resolve_locations, LocationMatcher};
use crate::snapshot::{locate_all, FetchOptions, SnapshotProbe};
use crate::sources::DataSource;

// Re-exports
pub use column_names as COL;

// Modules
pub mod aggregate;
pub mod column_names;
pub mod config;
pub mod convert;
pub mod error;
pub mod estimate;
pub mod filter;
pub mod frame;
pub mod matcher;
pub mod normalize;
pub mod snapshot;
pub mod sources;

/// Columns the final table is sorted by, so repeated runs produce identical output.
const OUTPUT_SORT_COLUMNS: [&str; 6] = [
    COL::KEY,
    COL::MATCH_STRING,
    COL::SUBREGION2_CODE,
    COL::DATE,
    COL::AGE,
    COL::SEX,
];

/// Result of running a jurisdiction's pipeline.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub data: DataFrame,
    pub report: FilterReport,
}

/// Entry point for running jurisdiction pipelines
pub struct CaseLine {
    pub config: Config,
}

impl Default for CaseLine {
    fn default() -> Self {
        Self::new()
    }
}

impl CaseLine {
    /// Setup the CaseLine object with default configuration
    pub fn new() -> Self {
        Self::new_with_config(Config::default())
    }

    /// Setup the CaseLine object with custom configuration
    pub fn new_with_config(config: Config) -> Self {
        debug!("config: {config:?}");
        Self { config }
    }

    /// Expands the configured fetch options of `source` and, for sources published as dated
    /// snapshots, resolves each `{date}` placeholder to the most recent available snapshot.
    pub async fn resolve_fetch_options<S, P>(
        &self,
        source: &S,
        options: &[FetchOptions],
        probe: &P,
    ) -> CaseLineResult<Vec<FetchOptions>>
    where
        S: DataSource,
        P: SnapshotProbe,
    {
        let options = source.fetch_options(options);
        let Some(start) = source.snapshot_start() else {
            return Ok(options);
        };
        let end = self.config.today() + Duration::days(1);
        locate_all(probe, &options, start, end, source.snapshot_date_format()).await
    }

    /// Runs `source` over its raw partitions. Match strings are resolved with `matcher` when one
    /// is given; rows that cannot be published are dropped and counted in the report.
    pub fn process<S: DataSource>(
        &self,
        source: &S,
        tables: &BTreeMap<String, DataFrame>,
        matcher: Option<&dyn LocationMatcher>,
    ) -> CaseLineResult<PipelineOutput> {
        let data = source.parse(tables, &self.config)?;
        let data = match matcher {
            Some(matcher) => resolve_locations(&data, matcher)?,
            None => data,
        };
        // Once names have been resolved, a row still lacking a key names no known location
        let filter = source.record_filter(&self.config);
        let filter = if matcher.is_some() {
            filter.with_require_key(true)
        } else {
            filter
        };
        let (data, report) = filter.apply(&data)?;
        let data = data.sort(
            OUTPUT_SORT_COLUMNS.to_vec(),
            SortMultipleOptions::default().with_maintain_order(true),
        )?;
        info!("{}: {report}", source.name());
        Ok(PipelineOutput { data, report })
    }
}
