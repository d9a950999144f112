use chrono::NaiveDate;
use itertools::izip;
use polars::prelude::*;

use super::DataSource;
use crate::aggregate::AdminAggregation;
use crate::error::CaseLineResult;
use crate::estimate::{apply_estimates, drop_internal_columns, EstimateRule};
use crate::frame::has_column;
use crate::normalize::ColumnAdapter;
use crate::COL;

const PROVINCE: &str = "province";
const REGION: &str = "region";
const CITY: &str = "city";
const NCR: &str = "NCR";

const DATE_ESTIMATE: &str = "_date_estimate";
const ADMITTED: &str = "_hospitalized";
const PROGNOSIS: &str = "_prognosis";

/// Department of Health case line for the Philippines, published as daily snapshots.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhilippinesDataSource;

/// NCR rows are broken down by city rather than province. The city code is used as the
/// province name, without its two-character prefix and three-character suffix.
fn ncr_city_name(city: &str) -> String {
    let chars: Vec<char> = city.chars().collect();
    if chars.len() <= 5 {
        return String::new();
    }
    chars[2..chars.len() - 3].iter().collect()
}

fn assign_ncr_provinces(cases: &DataFrame) -> PolarsResult<DataFrame> {
    if !has_column(cases, CITY) {
        return Ok(cases.clone());
    }
    let height = cases.height();
    let column_or_null = |name: &str| -> PolarsResult<Series> {
        match cases.column(name) {
            Ok(s) => s.cast(&DataType::String),
            Err(_) => Ok(Series::full_null(name, height, &DataType::String)),
        }
    };
    let regions = column_or_null(REGION)?;
    let cities = column_or_null(CITY)?;
    let provinces = column_or_null(PROVINCE)?;
    let assigned: StringChunked = izip!(regions.str()?, cities.str()?, provinces.str()?)
        .map(|(region, city, province)| match region {
            Some(NCR) => city.map(ncr_city_name),
            _ => province.map(str::to_string),
        })
        .collect();
    let mut out = cases.clone();
    out.with_column(assigned.with_name(PROVINCE).into_series())?;
    out.drop(CITY)
}

impl DataSource for PhilippinesDataSource {
    fn name(&self) -> &'static str {
        "ph_authority"
    }

    fn description(&self) -> &'static str {
        "Philippines DOH case line (daily snapshots)"
    }

    fn country_code(&self) -> &'static str {
        "PH"
    }

    fn column_adapter(&self) -> ColumnAdapter {
        ColumnAdapter::new([
            ("ProvRes", PROVINCE),
            ("RegionRes", REGION),
            ("CityMuniPSGC", CITY),
            ("DateDied", COL::DATE_NEW_DECEASED),
            ("DateSpecimen", COL::DATE_NEW_CONFIRMED),
            ("DateRecover", COL::DATE_NEW_RECOVERED),
            ("daterepconf", DATE_ESTIMATE),
            ("admitted", ADMITTED),
            ("removaltype", PROGNOSIS),
            ("Age", COL::AGE),
            ("Sex", COL::SEX),
        ])
    }

    fn aggregation(&self) -> AdminAggregation {
        AdminAggregation::MatchString {
            country: self.country_code().into(),
            region_column: REGION.into(),
            subregion_column: Some(PROVINCE.into()),
            region_prefix_separator: Some(": ".into()),
        }
    }

    fn estimate_rules(&self) -> Vec<EstimateRule> {
        vec![
            EstimateRule::fill_from_estimate(COL::DATE_NEW_CONFIRMED, DATE_ESTIMATE),
            EstimateRule::fill_on_status(COL::DATE_NEW_RECOVERED, PROGNOSIS, "Recovered", DATE_ESTIMATE),
            EstimateRule::fill_on_status(COL::DATE_NEW_DECEASED, PROGNOSIS, "Died", DATE_ESTIMATE),
            EstimateRule::flag_from_date(COL::DATE_NEW_HOSPITALIZED, ADMITTED, COL::DATE_NEW_CONFIRMED),
        ]
    }

    fn sentinels(&self) -> Vec<String> {
        [
            "REPATRIATE",
            "CITY OF ISABELA (NOT A PROVINCE)",
            "COTABATO CITY (NOT A PROVINCE)",
        ]
        .map(String::from)
        .to_vec()
    }

    fn snapshot_start(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2021, 8, 31)
    }

    fn derive_fields(&self, cases: &DataFrame) -> CaseLineResult<DataFrame> {
        let cases = drop_internal_columns(&apply_estimates(cases, &self.estimate_rules())?)?;
        Ok(assign_ncr_provinces(&cases)?)
    }
}
