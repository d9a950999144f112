//! Aggregation of time series rows to nested administrative levels.

use itertools::Itertools;
use log::debug;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use crate::error::CaseLineResult;
use crate::frame::{column_names, concat_aligned, has_column, usable_identifier};
use crate::COL;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum AdminLevel {
    Country,
    Region,
    Subregion,
}

/// How a jurisdiction's rows map onto administrative levels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AdminAggregation {
    /// Region and sub-region columns hold codes; keys are built as `CC_region[_subregion]`.
    Coded {
        country: String,
        region_column: String,
        subregion_column: Option<String>,
        levels: Vec<AdminLevel>,
    },
    /// Region and sub-region columns hold names that are resolved to keys later. Region rows carry
    /// a null `subregion2_code` and sub-region rows an empty one so a matcher can tell them apart.
    MatchString {
        country: String,
        region_column: String,
        subregion_column: Option<String>,
        /// Only the text after the last occurrence of this separator names the region.
        region_prefix_separator: Option<String>,
    },
}

impl AdminAggregation {
    pub fn country(&self) -> &str {
        match self {
            Self::Coded { country, .. } | Self::MatchString { country, .. } => country,
        }
    }

    pub fn region_column(&self) -> &str {
        match self {
            Self::Coded { region_column, .. } | Self::MatchString { region_column, .. } => {
                region_column
            }
        }
    }

    pub fn subregion_column(&self) -> Option<&str> {
        match self {
            Self::Coded {
                subregion_column, ..
            }
            | Self::MatchString {
                subregion_column, ..
            } => subregion_column.as_deref(),
        }
    }

    pub fn levels(&self) -> Vec<AdminLevel> {
        match self {
            Self::Coded { levels, .. } => levels.clone(),
            Self::MatchString {
                subregion_column, ..
            } => {
                let mut levels = vec![AdminLevel::Country, AdminLevel::Region];
                if subregion_column.is_some() {
                    levels.push(AdminLevel::Subregion);
                }
                levels
            }
        }
    }

    /// Index columns the case table must be converted with for this aggregation.
    pub fn index_columns(&self) -> Vec<&str> {
        std::iter::once(self.region_column())
            .chain(self.subregion_column())
            .collect()
    }
}

fn null_string(name: &str) -> Expr {
    lit(NULL).cast(DataType::String).alias(name)
}

fn sum_counts(lf: LazyFrame, by: &[&str], counts: &[String]) -> LazyFrame {
    lf.group_by_stable(by.iter().copied().map(col).collect_vec())
        .agg(counts.iter().map(|c| col(c.as_str()).sum()).collect_vec())
}

fn level_rows(
    series: &DataFrame,
    aggregation: &AdminAggregation,
    level: AdminLevel,
    counts: &[String],
    sentinels: &[String],
) -> PolarsResult<DataFrame> {
    let country = aggregation.country();
    let region = aggregation.region_column();
    let mut lf = series.clone().lazy();

    if let AdminAggregation::MatchString {
        region_prefix_separator: Some(separator),
        ..
    } = aggregation
    {
        let prefix = format!("^.*{}", regex::escape(separator));
        lf = lf.with_column(
            col(region)
                .cast(DataType::String)
                .str()
                .replace(lit(prefix), lit(""), false)
                .str()
                .strip_chars(lit(NULL))
                .alias(region),
        );
    }

    let lf = match level {
        AdminLevel::Country => sum_counts(lf, &[COL::DATE, COL::AGE, COL::SEX], counts)
            .with_columns([lit(country).alias(COL::KEY), lit(country).alias(COL::COUNTRY_CODE)]),
        AdminLevel::Region => {
            let lf = sum_counts(
                lf.filter(usable_identifier(region, sentinels)),
                &[COL::DATE, region, COL::AGE, COL::SEX],
                counts,
            );
            match aggregation {
                AdminAggregation::Coded { .. } => lf.with_columns([
                    (lit(format!("{country}_")) + col(region).cast(DataType::String))
                        .alias(COL::KEY),
                    lit(country).alias(COL::COUNTRY_CODE),
                    col(region).cast(DataType::String).alias(COL::SUBREGION1_CODE),
                ]),
                AdminAggregation::MatchString { .. } => lf.with_columns([
                    null_string(COL::KEY),
                    lit(country).alias(COL::COUNTRY_CODE),
                    col(region).cast(DataType::String).alias(COL::MATCH_STRING),
                    null_string(COL::SUBREGION2_CODE),
                ]),
            }
        }
        AdminLevel::Subregion => {
            let Some(subregion) = aggregation.subregion_column() else {
                return Ok(DataFrame::empty());
            };
            // Coded keys need both components; a name is identified by itself alone
            let lf = match aggregation {
                AdminAggregation::Coded { .. } => sum_counts(
                    lf.filter(
                        usable_identifier(region, sentinels)
                            .and(usable_identifier(subregion, sentinels)),
                    ),
                    &[COL::DATE, region, subregion, COL::AGE, COL::SEX],
                    counts,
                ),
                AdminAggregation::MatchString { .. } => sum_counts(
                    lf.filter(usable_identifier(subregion, sentinels)),
                    &[COL::DATE, subregion, COL::AGE, COL::SEX],
                    counts,
                ),
            };
            match aggregation {
                AdminAggregation::Coded { .. } => lf.with_columns([
                    (lit(format!("{country}_"))
                        + col(region).cast(DataType::String)
                        + lit("_")
                        + col(subregion).cast(DataType::String))
                    .alias(COL::KEY),
                    lit(country).alias(COL::COUNTRY_CODE),
                    col(region).cast(DataType::String).alias(COL::SUBREGION1_CODE),
                    col(subregion).cast(DataType::String).alias(COL::SUBREGION2_CODE),
                ]),
                AdminAggregation::MatchString { .. } => lf.with_columns([
                    null_string(COL::KEY),
                    lit(country).alias(COL::COUNTRY_CODE),
                    col(subregion).cast(DataType::String).alias(COL::MATCH_STRING),
                    lit("").alias(COL::SUBREGION2_CODE),
                ]),
            }
        }
    };
    lf.collect()
}

/// Stack one block of rows per administrative level of `aggregation`. A row whose identifier
/// for a level is null, blank or one of `sentinels` is left out of that level only.
pub fn aggregate_admin_levels(
    series: &DataFrame,
    aggregation: &AdminAggregation,
    sentinels: &[String],
) -> CaseLineResult<DataFrame> {
    let counts = column_names(series)
        .into_iter()
        .filter(|c| COL::is_count(c))
        .collect_vec();
    let levels = aggregation
        .levels()
        .into_iter()
        .map(|level| {
            let rows = level_rows(series, aggregation, level, &counts, sentinels)?;
            debug!("{level} level has {} rows", rows.height());
            Ok::<_, PolarsError>(rows)
        })
        .filter(|rows| !matches!(rows, Ok(df) if df.width() == 0))
        .collect::<PolarsResult<Vec<_>>>()?;
    let stacked = concat_aligned(levels, &COL::OUTPUT_PREFIX_COLUMNS)?;
    Ok(select_output(&stacked)?)
}

/// Project onto the output schema: the location and demographic columns in fixed order, then
/// every count column as integers. Missing `new_*` counts become zero since a case line that
/// holds no event for a group counts none; missing `total_*` values stay null.
pub fn select_output(df: &DataFrame) -> PolarsResult<DataFrame> {
    let mut exprs = COL::OUTPUT_PREFIX_COLUMNS
        .iter()
        .map(|&name| {
            let dtype = if name == COL::AGE {
                DataType::Int64
            } else {
                DataType::String
            };
            if has_column(df, name) {
                col(name).cast(dtype)
            } else {
                lit(NULL).cast(dtype).alias(name)
            }
        })
        .collect_vec();
    exprs.extend(
        column_names(df)
            .iter()
            .filter(|c| COL::is_count(c))
            .map(|c| {
                let count = col(c.as_str()).cast(DataType::Int64);
                if c.starts_with(COL::NEW_PREFIX) {
                    count.fill_null(lit(0i64))
                } else {
                    count
                }
            }),
    );
    df.clone().lazy().select(exprs).collect()
}
