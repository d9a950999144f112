use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// Default formats tried, in order, when parsing dates coming out of raw tables.
pub const DEFAULT_DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d", "%d/%m/%Y", "%m/%d/%Y"];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Date formats tried in order when normalizing event dates to ISO-8601.
    pub date_formats: Vec<String>,
    /// Fixes "today" for the run. Records dated on or after the day after are discarded.
    pub today: Option<NaiveDate>,
    /// Overrides the adapter's earliest plausible record date.
    pub epoch: Option<NaiveDate>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            date_formats: DEFAULT_DATE_FORMATS.iter().map(|s| s.to_string()).collect(),
            today: None,
            epoch: None,
        }
    }
}

impl Config {
    /// The run date, falling back to the local calendar date.
    pub fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    /// The earliest date kept for a source whose own epoch is `source_epoch`.
    pub fn epoch_or(&self, source_epoch: NaiveDate) -> NaiveDate {
        self.epoch.unwrap_or(source_epoch)
    }
}
