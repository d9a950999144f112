//! Final removal of rows that cannot be published.

use std::fmt;

use chrono::{Duration, NaiveDate};
use log::{debug, info};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

use crate::error::{CaseLineError, CaseLineResult};
use crate::frame::{has_column, usable_identifier};
use crate::COL;

const ISO_DATE_PATTERN: &str = r"^\d{4}-\d{2}-\d{2}$";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum DropReason {
    MalformedDate,
    OutOfRange,
    UnmatchedLocation,
}

/// Number of rows dropped per reason, and how many were kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterReport {
    pub malformed_date: usize,
    pub out_of_range: usize,
    pub unmatched_location: usize,
    pub kept: usize,
}

impl FilterReport {
    pub fn dropped(&self, reason: DropReason) -> usize {
        match reason {
            DropReason::MalformedDate => self.malformed_date,
            DropReason::OutOfRange => self.out_of_range,
            DropReason::UnmatchedLocation => self.unmatched_location,
        }
    }

    pub fn total_dropped(&self) -> usize {
        self.malformed_date + self.out_of_range + self.unmatched_location
    }
}

impl fmt::Display for FilterReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "kept {} rows, dropped {} ({}: {}, {}: {}, {}: {})",
            self.kept,
            self.total_dropped(),
            DropReason::MalformedDate,
            self.malformed_date,
            DropReason::OutOfRange,
            self.out_of_range,
            DropReason::UnmatchedLocation,
            self.unmatched_location
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordFilter {
    /// Match strings that never name a real location.
    pub sentinels: Vec<String>,
    /// Earliest date kept.
    pub epoch: NaiveDate,
    /// Rows dated after this day are dropped.
    pub today: NaiveDate,
    /// Drop rows without a key even if they carry a match string.
    pub require_key: bool,
}

impl RecordFilter {
    pub fn new(epoch: NaiveDate, today: NaiveDate) -> Self {
        Self {
            sentinels: vec![],
            epoch,
            today,
            require_key: false,
        }
    }

    pub fn with_sentinels(self, sentinels: Vec<String>) -> Self {
        Self { sentinels, ..self }
    }

    pub fn with_require_key(self, require_key: bool) -> Self {
        Self {
            require_key,
            ..self
        }
    }

    fn location_predicate(&self, df: &DataFrame) -> Expr {
        let has_key = usable_identifier(COL::KEY, &[]);
        if self.require_key || !has_column(df, COL::MATCH_STRING) {
            has_key
        } else {
            has_key.or(usable_identifier(COL::MATCH_STRING, &self.sentinels))
        }
    }

    /// Drop rows with a malformed date, a date outside `[epoch, today]`, or no usable location.
    /// Rows are counted against the first reason that applies.
    pub fn apply(&self, df: &DataFrame) -> CaseLineResult<(DataFrame, FilterReport)> {
        for required in [COL::DATE, COL::KEY] {
            if !has_column(df, required) {
                return Err(CaseLineError::SchemaMismatch(format!(
                    "cannot filter a table without '{required}'"
                )));
            }
        }
        let mut report = FilterReport::default();
        let date = || col(COL::DATE).cast(DataType::String);

        let well_formed = df
            .clone()
            .lazy()
            .filter(date().str().contains(lit(ISO_DATE_PATTERN), false))
            .collect()?;
        report.malformed_date = df.height() - well_formed.height();

        let end = (self.today + Duration::days(1)).format("%Y-%m-%d").to_string();
        let in_range = well_formed
            .clone()
            .lazy()
            .filter(
                date()
                    .gt_eq(lit(self.epoch.format("%Y-%m-%d").to_string()))
                    .and(date().lt(lit(end))),
            )
            .collect()?;
        report.out_of_range = well_formed.height() - in_range.height();

        let located = in_range
            .clone()
            .lazy()
            .filter(self.location_predicate(&in_range))
            .collect()?;
        report.unmatched_location = in_range.height() - located.height();
        report.kept = located.height();

        debug!("Filter bounds [{}, {}]", self.epoch, self.today);
        info!("Record filter {report}");
        Ok((located, report))
    }
}
