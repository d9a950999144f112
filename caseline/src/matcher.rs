//! Resolution of free-text location names to keys.

use std::collections::HashMap;
use std::str::FromStr;

use itertools::izip;
use log::{debug, info};
use polars::prelude::*;

use crate::aggregate::AdminLevel;
use crate::error::{CaseLineError, CaseLineResult};
use crate::frame::has_column;
use crate::COL;

/// Resolves a match string at a given administrative level of `country` to a location key.
pub trait LocationMatcher {
    fn resolve(&self, country: &str, level: AdminLevel, match_string: &str) -> Option<String>;
}

/// Case-insensitive table lookup. Entries without a level match at any level, entries with one
/// take precedence at that level.
#[derive(Clone, Debug, Default)]
pub struct LookupMatcher {
    entries: HashMap<(Option<AdminLevel>, String), String>,
}

fn lookup_name(name: &str) -> String {
    name.trim().to_lowercase()
}

impl LookupMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, level: Option<AdminLevel>, name: &str, key: &str) -> Self {
        self.entries
            .insert((level, lookup_name(name)), key.trim().to_string());
        self
    }

    /// Build from a table with `match_string` and `key` columns and an optional `level` column
    /// holding `country`, `region` or `subregion`. Rows with a null name or key are skipped.
    pub fn from_frame(df: &DataFrame) -> CaseLineResult<Self> {
        for required in [COL::MATCH_STRING, COL::KEY] {
            if !has_column(df, required) {
                return Err(CaseLineError::SchemaMismatch(format!(
                    "location table has no '{required}' column"
                )));
            }
        }
        let names = df.column(COL::MATCH_STRING)?.cast(&DataType::String)?;
        let keys = df.column(COL::KEY)?.cast(&DataType::String)?;
        let levels = match df.column("level") {
            Ok(levels) => levels.cast(&DataType::String)?,
            Err(_) => Series::full_null("level", df.height(), &DataType::String),
        };

        let mut matcher = Self::new();
        for (name, key, level) in izip!(names.str()?, keys.str()?, levels.str()?) {
            let (Some(name), Some(key)) = (name, key) else {
                continue;
            };
            let level = level
                .map(|level| {
                    AdminLevel::from_str(level.trim()).map_err(|_| {
                        CaseLineError::SchemaMismatch(format!("unknown admin level '{level}'"))
                    })
                })
                .transpose()?;
            matcher = matcher.with_entry(level, name, key);
        }
        debug!("Loaded {} location entries", matcher.len());
        Ok(matcher)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl LocationMatcher for LookupMatcher {
    fn resolve(&self, country: &str, level: AdminLevel, match_string: &str) -> Option<String> {
        let name = lookup_name(match_string);
        let prefix = format!("{country}_");
        [Some(level), None]
            .into_iter()
            .filter_map(|level| self.entries.get(&(level, name.clone())))
            .find(|key| key.as_str() == country || key.starts_with(&prefix))
            .cloned()
    }
}

fn string_values(df: &DataFrame, column: &str) -> PolarsResult<Vec<Option<String>>> {
    if !has_column(df, column) {
        return Ok(vec![None; df.height()]);
    }
    Ok(df
        .column(column)?
        .cast(&DataType::String)?
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect())
}

/// Fill `key` for rows that only carry a match string. Sub-region rows are recognized by an empty
/// `subregion2_code`; region rows by a null one. Codes of resolved rows are taken from the key.
/// Rows that cannot be resolved keep a null key.
pub fn resolve_locations(df: &DataFrame, matcher: &dyn LocationMatcher) -> PolarsResult<DataFrame> {
    if !has_column(df, COL::MATCH_STRING) {
        return Ok(df.clone());
    }
    let keys = string_values(df, COL::KEY)?;
    let countries = string_values(df, COL::COUNTRY_CODE)?;
    let matches = string_values(df, COL::MATCH_STRING)?;
    let region_codes = string_values(df, COL::SUBREGION1_CODE)?;
    let subregion_codes = string_values(df, COL::SUBREGION2_CODE)?;

    let mut resolved = 0usize;
    let mut out_keys = Vec::with_capacity(df.height());
    let mut out_regions = Vec::with_capacity(df.height());
    let mut out_subregions = Vec::with_capacity(df.height());
    for (key, country, name, region_code, subregion_code) in
        izip!(keys, countries, matches, region_codes, subregion_codes)
    {
        let lookup = match (&key, &country, &name) {
            (None, Some(country), Some(name)) => {
                let level = match subregion_code.as_deref() {
                    Some("") => AdminLevel::Subregion,
                    _ => AdminLevel::Region,
                };
                matcher.resolve(country, level, name)
            }
            _ => None,
        };
        match lookup {
            Some(found) => {
                resolved += 1;
                let mut parts = found.split('_').skip(1).map(str::to_string);
                out_regions.push(parts.next());
                out_subregions.push(parts.next());
                out_keys.push(Some(found));
            }
            None => {
                out_keys.push(key);
                out_regions.push(region_code);
                out_subregions.push(subregion_code);
            }
        }
    }
    info!("Resolved {resolved} of {} match strings", df.height());

    let mut out = df.clone();
    for (name, values) in [
        (COL::KEY, out_keys),
        (COL::SUBREGION1_CODE, out_regions),
        (COL::SUBREGION2_CODE, out_subregions),
    ] {
        let values: StringChunked = values.into_iter().collect();
        out.with_column(values.with_name(name).into_series())?;
    }
    Ok(out)
}
