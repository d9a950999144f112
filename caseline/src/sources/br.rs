use std::collections::HashMap;

use chrono::NaiveDate;
use log::debug;
use polars::prelude::*;

use super::{rename_and_clean, DataSource};
use crate::aggregate::{AdminAggregation, AdminLevel};
use crate::error::CaseLineResult;
use crate::estimate::{DoseClassifier, EstimateRule};
use crate::frame::has_column;
use crate::normalize::{numeric_code_as_string, ColumnAdapter};
use crate::snapshot::{expand_url_template, FetchOptions};
use crate::COL;

/// Placeholder in fetch URLs substituted with each state code.
pub const STATE_PLACEHOLDER: &str = "subregion1_code";

/// Federative units of Brazil, in IBGE code order.
pub const STATES: [&str; 27] = [
    "RO", "AC", "AM", "RR", "PA", "AP", "TO", "MA", "PI", "CE", "RN", "PB", "PE", "AL", "SE", "BA",
    "MG", "ES", "RJ", "SP", "PR", "SC", "RS", "MS", "MT", "GO", "DF",
];

const DOSE_INFORMATION: &str = "_dose_information";
const MUNICIPALITY_CODE_WIDTH: usize = 6;

/// Ministry of Health vaccination case line for Brazil, published as one file per state.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrazilDataSource;

impl DataSource for BrazilDataSource {
    fn name(&self) -> &'static str {
        "br_authority"
    }

    fn description(&self) -> &'static str {
        "Brazil vaccination case line (one file per state)"
    }

    fn country_code(&self) -> &'static str {
        "BR"
    }

    fn column_adapter(&self) -> ColumnAdapter {
        ColumnAdapter::new([
            ("paciente_idade", COL::AGE),
            ("paciente_enumsexobiologico", COL::SEX),
            ("paciente_endereco_coibgemunicipio", COL::SUBREGION2_CODE),
            ("paciente_endereco_uf", COL::SUBREGION1_CODE),
            ("vacina_dataaplicacao", COL::DATE_NEW_VACCINE_DOSES_ADMINISTERED),
            ("vacina_descricao_dose", DOSE_INFORMATION),
            ("vacina_nome", "vaccine_manufacturer"),
        ])
    }

    fn aggregation(&self) -> AdminAggregation {
        AdminAggregation::Coded {
            country: self.country_code().into(),
            region_column: COL::SUBREGION1_CODE.into(),
            subregion_column: Some(COL::SUBREGION2_CODE.into()),
            levels: vec![AdminLevel::Country, AdminLevel::Region, AdminLevel::Subregion],
        }
    }

    fn estimate_rules(&self) -> Vec<EstimateRule> {
        vec![EstimateRule::dose_split(
            DOSE_INFORMATION,
            COL::DATE_NEW_VACCINE_DOSES_ADMINISTERED,
            DoseClassifier::default(),
        )]
    }

    fn snapshot_start(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2021, 1, 17)
    }

    fn require_key(&self) -> bool {
        true
    }

    /// One request per state, named by state code. A `{date}` placeholder is kept for snapshot
    /// location.
    fn fetch_options(&self, options: &[FetchOptions]) -> Vec<FetchOptions> {
        options
            .iter()
            .flat_map(|opts| {
                if !opts.has_placeholder(STATE_PLACEHOLDER) {
                    return vec![opts.clone()];
                }
                STATES
                    .iter()
                    .map(|state| {
                        let url = expand_url_template(
                            &opts.url,
                            &HashMap::from([(STATE_PLACEHOLDER, state.to_string())]),
                        );
                        opts.with_url(url).with_name(*state)
                    })
                    .collect()
            })
            .collect()
    }

    fn normalize_columns(&self, raw: &DataFrame) -> CaseLineResult<DataFrame> {
        let cases = rename_and_clean(raw, &self.column_adapter(), &self.sex_classifier())?;
        if !has_column(&cases, COL::SUBREGION2_CODE) {
            debug!("No municipality codes, only state and country rows will be produced");
            return Ok(cases);
        }
        Ok(numeric_code_as_string(
            &cases,
            COL::SUBREGION2_CODE,
            MUNICIPALITY_CODE_WIDTH,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use polars::df;

    use super::*;

    #[test]
    fn test_fetch_options_per_state() {
        let options = BrazilDataSource.fetch_options(&[FetchOptions::new(
            "https://example.org/{subregion1_code}/part-{date}.csv",
        )]);
        assert_eq!(options.len(), 27);
        assert_eq!(options[19].name.as_deref(), Some("SP"));
        assert_eq!(options[19].url, "https://example.org/SP/part-{date}.csv");

        let fixed = FetchOptions::new("https://example.org/all.csv");
        assert_eq!(BrazilDataSource.fetch_options(&[fixed.clone()]), vec![fixed]);
    }

    #[test]
    fn test_normalize_columns() -> anyhow::Result<()> {
        let raw = df!(
            "paciente_idade" => &["40", ""],
            "paciente_enumsexobiologico" => &["F", "I"],
            "paciente_endereco_coibgemunicipio" => &["355030.0", "330455"],
            "paciente_endereco_uf" => &["SP", "RJ"],
            "vacina_dataaplicacao" => &["2021-05-01T00:00:00.000Z", "2021-05-02T00:00:00.000Z"],
            "vacina_descricao_dose" => &["1ª Dose", "2ª Dose"],
            "sistema_origem" => &["Novo PNI", "Novo PNI"]
        )?;
        let source = BrazilDataSource;
        let cases = source.derive_fields(&source.normalize_columns(&raw)?)?;
        assert!(cases
            .column(COL::SUBREGION2_CODE)?
            .equals_missing(&Series::new(COL::SUBREGION2_CODE, &["355030", "330455"])));
        assert!(cases
            .column(COL::SEX)?
            .equals_missing(&Series::new(COL::SEX, &["female", "unknown"])));
        assert_eq!(cases.column(COL::AGE)?.null_count(), 1);
        assert_eq!(cases.column(COL::DATE_NEW_PERSONS_VACCINATED)?.null_count(), 1);
        assert_eq!(cases.column(COL::DATE_NEW_PERSONS_FULLY_VACCINATED)?.null_count(), 1);
        assert!(!has_column(&cases, "sistema_origem"));
        assert!(!has_column(&cases, DOSE_INFORMATION));
        Ok(())
    }
}
