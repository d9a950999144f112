//! Conversion of case-line records into grouped daily time series.

use chrono::NaiveDate;
use itertools::Itertools;
use log::debug;
use polars::prelude::*;

use crate::error::{CaseLineError, CaseLineResult};
use crate::frame::{has_column, map_str_column, usable_identifier};
use crate::normalize::{event_date_columns, Sex};
use crate::COL;

const ISO_DATE: &str = "%Y-%m-%d";

/// Parse `raw` with the first matching format. Timestamps such as `2021-09-01T00:00:00` are
/// retried on their leading date part.
pub fn parse_date(raw: &str, formats: &[String]) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    formats
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .or_else(|| {
            raw.get(..10)
                .and_then(|head| NaiveDate::parse_from_str(head, ISO_DATE).ok())
        })
}

/// Rewrite `column` as ISO dates. Values no format can parse become null.
pub fn normalize_dates(df: &DataFrame, column: &str, formats: &[String]) -> PolarsResult<DataFrame> {
    map_str_column(df, column, |raw| {
        raw.and_then(|value| parse_date(value, formats))
            .map(|date| date.format(ISO_DATE).to_string())
    })
}

/// Turn one row per case into one row per `(index_columns, date, age, sex)` with a `new_<event>`
/// count for every `date_new_<event>` column of `cases`.
///
/// Every event column contributes the rows where it holds a date; those rows are stacked with an
/// indicator of 1 for their own event and 0 for the others, then grouped and summed. Unknown age
/// and sex are kept as their own groups.
pub fn convert_cases_to_time_series(
    cases: &DataFrame,
    index_columns: &[&str],
) -> CaseLineResult<DataFrame> {
    let missing = index_columns
        .iter()
        .filter(|c| !has_column(cases, c))
        .collect_vec();
    if !missing.is_empty() {
        return Err(CaseLineError::SchemaMismatch(format!(
            "index columns {missing:?} not in case table"
        )));
    }
    let events = event_date_columns(cases);
    if events.is_empty() {
        return Err(CaseLineError::SchemaMismatch(
            "case table has no date_new_* columns".to_string(),
        ));
    }
    let counts = events
        .iter()
        .map(|event| COL::count_column_for(event))
        .collect_vec();
    debug!("Converting {} cases into {counts:?}", cases.height());

    let mut demographics = vec![];
    if has_column(cases, COL::AGE) {
        demographics.push(col(COL::AGE).cast(DataType::Int64));
    } else {
        demographics.push(lit(NULL).cast(DataType::Int64).alias(COL::AGE));
    }
    if has_column(cases, COL::SEX) {
        demographics.push(
            col(COL::SEX)
                .cast(DataType::String)
                .fill_null(lit(Sex::Unknown.as_ref())),
        );
    } else {
        demographics.push(lit(Sex::Unknown.as_ref()).alias(COL::SEX));
    }

    let per_event = events
        .iter()
        .map(|event| {
            let mut exprs = index_columns.iter().map(|c| col(c)).collect_vec();
            exprs.push(col(event.as_str()).cast(DataType::String).alias(COL::DATE));
            exprs.extend(demographics.iter().cloned());
            exprs.extend(events.iter().zip(&counts).map(|(other, count)| {
                let indicator = if other == event { 1i64 } else { 0i64 };
                lit(indicator).alias(count.as_str())
            }));
            cases
                .clone()
                .lazy()
                .filter(usable_identifier(event, &[]))
                .select(exprs)
        })
        .collect_vec();

    let group_keys = index_columns
        .iter()
        .copied()
        .chain([COL::DATE, COL::AGE, COL::SEX])
        .map(col)
        .collect_vec();
    let series = concat(per_event, UnionArgs::default())?
        .group_by_stable(group_keys)
        .agg(counts.iter().map(|c| col(c.as_str()).sum()).collect_vec())
        .collect()?;
    debug!("Time series has shape {:?}", series.shape());
    Ok(series)
}

#[cfg(test)]
mod tests {
    use polars::df;

    use super::*;
    use crate::config::Config;

    fn sorted(df: DataFrame, by: &[&str]) -> DataFrame {
        df.sort(by.to_vec(), SortMultipleOptions::default()).unwrap()
    }

    #[test]
    fn test_parse_date() {
        let formats = Config::default().date_formats;
        let expected = NaiveDate::from_ymd_opt(2021, 9, 1);
        assert_eq!(parse_date("2021-09-01", &formats), expected);
        assert_eq!(parse_date("2021/09/01", &formats), expected);
        assert_eq!(parse_date("20210901", &formats), expected);
        assert_eq!(parse_date("2021-09-01T00:00:00.000Z", &formats), expected);
        assert_eq!(parse_date("not a date", &formats), None);
        assert_eq!(parse_date("  ", &formats), None);
    }

    #[test]
    fn test_normalize_dates() -> anyhow::Result<()> {
        let series = df!(
            COL::DATE => &[Some("2021/09/01"), Some("bad"), None],
            "province" => &["CEBU", "CEBU", "CEBU"]
        )?;
        let normalized = normalize_dates(&series, COL::DATE, &Config::default().date_formats)?;
        assert!(normalized
            .column(COL::DATE)?
            .equals_missing(&Series::new(COL::DATE, &[Some("2021-09-01"), None, None])));
        assert!(normalized
            .column("province")?
            .equals_missing(series.column("province")?));
        Ok(())
    }

    #[test]
    fn test_cases_become_counts() -> anyhow::Result<()> {
        let cases = df!(
            "province" => &["CEBU", "CEBU", "CEBU"],
            COL::AGE => &[Some(30i64), Some(30), None],
            COL::SEX => &[Some("male"), Some("male"), None],
            COL::DATE_NEW_CONFIRMED => &[Some("2021-09-01"), Some("2021-09-01"), Some("2021-09-02")],
            COL::DATE_NEW_DECEASED => &[None, Some("2021-09-01"), None]
        )?;
        let series = convert_cases_to_time_series(&cases, &["province"])?;
        let expected = df!(
            "province" => &["CEBU", "CEBU"],
            COL::DATE => &["2021-09-01", "2021-09-02"],
            COL::AGE => &[Some(30i64), None],
            COL::SEX => &["male", "unknown"],
            COL::NEW_CONFIRMED => &[2i64, 1],
            COL::NEW_DECEASED => &[1i64, 0]
        )?;
        assert_eq!(sorted(series, &[COL::DATE]), expected);
        Ok(())
    }

    #[test]
    fn test_group_tuple_is_unique() -> anyhow::Result<()> {
        let cases = df!(
            "province" => &["CEBU", "CEBU", "BOHOL", "CEBU"],
            COL::DATE_NEW_CONFIRMED => &["2021-09-01", "2021-09-01", "2021-09-01", "2021-09-03"]
        )?;
        let series = convert_cases_to_time_series(&cases, &["province"])?;
        assert_eq!(series.height(), 3);
        let total: i64 = series.column(COL::NEW_CONFIRMED)?.i64()?.sum().unwrap_or(0);
        assert_eq!(total, 4);
        assert_eq!(
            series.column(COL::SEX)?.str()?.into_no_null_iter().collect_vec(),
            vec!["unknown"; 3]
        );
        Ok(())
    }

    #[test]
    fn test_structural_errors() -> anyhow::Result<()> {
        let cases = df!(COL::DATE_NEW_CONFIRMED => &["2021-09-01"])?;
        assert!(matches!(
            convert_cases_to_time_series(&cases, &["province"]),
            Err(CaseLineError::SchemaMismatch(_))
        ));
        let no_events = df!("province" => &["CEBU"])?;
        assert!(matches!(
            convert_cases_to_time_series(&no_events, &["province"]),
            Err(CaseLineError::SchemaMismatch(_))
        ));
        Ok(())
    }
}
