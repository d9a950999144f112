//! This module stores the canonical column names shared by every jurisdiction adapter. Raw tables
//! are renamed into these names by the column normalizer, and all later stages only refer to them
//! through these constants.

pub const DATE: &str = "date";
pub const KEY: &str = "key";

pub const COUNTRY_CODE: &str = "country_code";
pub const SUBREGION1_CODE: &str = "subregion1_code";
pub const SUBREGION2_CODE: &str = "subregion2_code";
pub const LOCALITY_CODE: &str = "locality_code";
pub const MATCH_STRING: &str = "match_string";

pub const AGE: &str = "age";
pub const SEX: &str = "sex";

/// Prefix of per-case event date columns, e.g. `date_new_confirmed`.
pub const DATE_NEW_PREFIX: &str = "date_new_";
/// Prefix of aggregated count columns, e.g. `new_confirmed`.
pub const NEW_PREFIX: &str = "new_";
/// Columns starting with this prefix are internal to an adapter and never reach the output.
pub const INTERNAL_PREFIX: &str = "_";

pub const CONFIRMED: &str = "confirmed";
pub const DECEASED: &str = "deceased";
pub const RECOVERED: &str = "recovered";
pub const HOSPITALIZED: &str = "hospitalized";
pub const PERSONS_VACCINATED: &str = "persons_vaccinated";
pub const PERSONS_FULLY_VACCINATED: &str = "persons_fully_vaccinated";
pub const VACCINE_DOSES_ADMINISTERED: &str = "vaccine_doses_administered";

pub const DATE_NEW_CONFIRMED: &str = "date_new_confirmed";
pub const DATE_NEW_DECEASED: &str = "date_new_deceased";
pub const DATE_NEW_RECOVERED: &str = "date_new_recovered";
pub const DATE_NEW_HOSPITALIZED: &str = "date_new_hospitalized";
pub const DATE_NEW_PERSONS_VACCINATED: &str = "date_new_persons_vaccinated";
pub const DATE_NEW_PERSONS_FULLY_VACCINATED: &str = "date_new_persons_fully_vaccinated";
pub const DATE_NEW_VACCINE_DOSES_ADMINISTERED: &str = "date_new_vaccine_doses_administered";

pub const NEW_CONFIRMED: &str = "new_confirmed";
pub const NEW_DECEASED: &str = "new_deceased";
pub const NEW_RECOVERED: &str = "new_recovered";
pub const NEW_HOSPITALIZED: &str = "new_hospitalized";
pub const NEW_PERSONS_VACCINATED: &str = "new_persons_vaccinated";
pub const NEW_PERSONS_FULLY_VACCINATED: &str = "new_persons_fully_vaccinated";
pub const NEW_VACCINE_DOSES_ADMINISTERED: &str = "new_vaccine_doses_administered";

pub const TOTAL_PERSONS_VACCINATED: &str = "total_persons_vaccinated";
pub const TOTAL_PERSONS_FULLY_VACCINATED: &str = "total_persons_fully_vaccinated";
pub const TOTAL_VACCINE_DOSES_ADMINISTERED: &str = "total_vaccine_doses_administered";

/// Location and demographic columns that lead every output table, in output order. Count columns
/// follow them.
pub const OUTPUT_PREFIX_COLUMNS: [&str; 9] = [
    DATE,
    KEY,
    COUNTRY_CODE,
    SUBREGION1_CODE,
    SUBREGION2_CODE,
    LOCALITY_CODE,
    MATCH_STRING,
    AGE,
    SEX,
];

/// Returns true for columns holding per-case event dates.
pub fn is_event_date(column: &str) -> bool {
    column.starts_with(DATE_NEW_PREFIX)
}

/// Returns true for aggregated count columns (`new_*` and `total_*`).
pub fn is_count(column: &str) -> bool {
    column.starts_with(NEW_PREFIX) || column.starts_with("total_")
}

/// Maps `date_new_<event>` to `new_<event>`.
pub fn count_column_for(event_date_column: &str) -> String {
    format!(
        "{NEW_PREFIX}{}",
        event_date_column.trim_start_matches(DATE_NEW_PREFIX)
    )
}
