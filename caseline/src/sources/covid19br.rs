use std::collections::BTreeMap;

use itertools::Itertools;
use log::debug;
use polars::prelude::*;

use super::DataSource;
use crate::aggregate::{select_output, AdminAggregation, AdminLevel};
use crate::config::Config;
use crate::convert::normalize_dates;
use crate::error::{CaseLineError, CaseLineResult};
use crate::frame::{concat_aligned, has_column, map_str_column};
use crate::normalize::{table_rename, ColumnAdapter};
use crate::COL;

/// State code used by the publisher for nationwide rows.
const TOTAL: &str = "TOTAL";

/// Pre-aggregated vaccination totals per Brazilian state published by the covid19br project.
#[derive(Debug, Clone, Copy, Default)]
pub struct Covid19BrDataSource;

impl DataSource for Covid19BrDataSource {
    fn name(&self) -> &'static str {
        "br_covid19br"
    }

    fn description(&self) -> &'static str {
        "Brazil vaccination totals per state (covid19br)"
    }

    fn country_code(&self) -> &'static str {
        "BR"
    }

    fn column_adapter(&self) -> ColumnAdapter {
        ColumnAdapter::new([
            ("date", COL::DATE),
            ("state", COL::SUBREGION1_CODE),
            ("vaccinated", COL::TOTAL_PERSONS_VACCINATED),
            ("vaccinated_second", COL::TOTAL_PERSONS_FULLY_VACCINATED),
        ])
    }

    /// Levels the published totals cover. The overridden `parse` keys rows itself and never
    /// aggregates, so this is descriptive only.
    fn aggregation(&self) -> AdminAggregation {
        AdminAggregation::Coded {
            country: self.country_code().into(),
            region_column: COL::SUBREGION1_CODE.into(),
            subregion_column: None,
            levels: vec![AdminLevel::Country, AdminLevel::Region],
        }
    }

    fn require_key(&self) -> bool {
        true
    }

    /// Rows are already totals per state and day, so they are only renamed and keyed. The
    /// nationwide `TOTAL` rows become the country level.
    fn parse(
        &self,
        tables: &BTreeMap<String, DataFrame>,
        config: &Config,
    ) -> CaseLineResult<DataFrame> {
        let adapter = self.column_adapter();
        let mut partitions = vec![];
        for (name, raw) in tables.iter().filter(|(_, raw)| raw.height() > 0) {
            let missing = adapter
                .source_columns()
                .into_iter()
                .filter(|c| !has_column(raw, c))
                .collect_vec();
            if !missing.is_empty() {
                return Err(CaseLineError::SchemaMismatch(format!(
                    "partition '{name}' lacks columns {missing:?}"
                )));
            }
            partitions.push(table_rename(raw, &adapter)?);
        }
        if partitions.is_empty() {
            return Err(CaseLineError::EmptyInput);
        }
        let data = concat_aligned(partitions, &[])?;

        let data = map_str_column(&data, COL::DATE, |raw| {
            raw.map(|value| value.trim().chars().take(10).collect())
        })?;
        let data = normalize_dates(&data, COL::DATE, &config.date_formats)?;

        let state = || col(COL::SUBREGION1_CODE).cast(DataType::String);
        let is_total = state().eq(lit(TOTAL));
        let count = |c: &str| col(c).cast(DataType::Float64).cast(DataType::Int64);
        let data = data
            .lazy()
            .with_columns([
                count(COL::TOTAL_PERSONS_VACCINATED),
                count(COL::TOTAL_PERSONS_FULLY_VACCINATED).fill_null(lit(0i64)),
            ])
            .with_columns([
                (col(COL::TOTAL_PERSONS_VACCINATED) + col(COL::TOTAL_PERSONS_FULLY_VACCINATED))
                    .alias(COL::TOTAL_VACCINE_DOSES_ADMINISTERED),
                when(is_total.clone())
                    .then(lit(self.country_code()))
                    .otherwise(lit(format!("{}_", self.country_code())) + state())
                    .alias(COL::KEY),
                lit(self.country_code()).alias(COL::COUNTRY_CODE),
                when(is_total)
                    .then(lit(NULL).cast(DataType::String))
                    .otherwise(state())
                    .alias(COL::SUBREGION1_CODE),
            ])
            .collect()?;
        debug!("Parsed {} state totals", data.height());
        Ok(select_output(&data)?)
    }
}

#[cfg(test)]
mod tests {
    use polars::df;

    use super::*;

    #[test]
    fn test_parse_totals() -> anyhow::Result<()> {
        let raw = df!(
            "date" => &["2021-05-01T00:00:00", "2021-05-01T00:00:00"],
            "state" => &["SP", "TOTAL"],
            "vaccinated" => &["100", "250"],
            "vaccinated_second" => &[None, Some("40")],
            "city" => &["São Paulo", ""]
        )?;
        let tables = BTreeMap::from([("totals".to_string(), raw)]);
        let data = Covid19BrDataSource.parse(&tables, &Config::default())?;

        let expected = df!(
            COL::DATE => &["2021-05-01", "2021-05-01"],
            COL::KEY => &["BR_SP", "BR"],
            COL::SUBREGION1_CODE => &[Some("SP"), None],
            COL::TOTAL_PERSONS_VACCINATED => &[100i64, 250],
            COL::TOTAL_PERSONS_FULLY_VACCINATED => &[0i64, 40],
            COL::TOTAL_VACCINE_DOSES_ADMINISTERED => &[100i64, 290]
        )?;
        assert_eq!(
            data.select([
                COL::DATE,
                COL::KEY,
                COL::SUBREGION1_CODE,
                COL::TOTAL_PERSONS_VACCINATED,
                COL::TOTAL_PERSONS_FULLY_VACCINATED,
                COL::TOTAL_VACCINE_DOSES_ADMINISTERED,
            ])?,
            expected
        );
        assert_eq!(data.column(COL::SEX)?.null_count(), 2);
        Ok(())
    }

    #[test]
    fn test_missing_totals_stay_null() -> anyhow::Result<()> {
        let raw = df!(
            "date" => &["2021-05-01"],
            "state" => &["SP"],
            "vaccinated" => &[None::<&str>],
            "vaccinated_second" => &[Some("40")]
        )?;
        let tables = BTreeMap::from([("totals".to_string(), raw)]);
        let data = Covid19BrDataSource.parse(&tables, &Config::default())?;
        assert_eq!(data.column(COL::TOTAL_PERSONS_VACCINATED)?.null_count(), 1);
        assert_eq!(data.column(COL::TOTAL_VACCINE_DOSES_ADMINISTERED)?.null_count(), 1);
        assert_eq!(
            data.column(COL::TOTAL_PERSONS_FULLY_VACCINATED)?.i64()?.get(0),
            Some(40)
        );
        Ok(())
    }

    #[test]
    fn test_missing_columns() -> anyhow::Result<()> {
        let raw = df!("date" => &["2021-05-01"], "state" => &["SP"])?;
        let tables = BTreeMap::from([("totals".to_string(), raw)]);
        assert!(matches!(
            Covid19BrDataSource.parse(&tables, &Config::default()),
            Err(CaseLineError::SchemaMismatch(_))
        ));
        assert!(matches!(
            Covid19BrDataSource.parse(&BTreeMap::new(), &Config::default()),
            Err(CaseLineError::EmptyInput)
        ));
        Ok(())
    }
}
