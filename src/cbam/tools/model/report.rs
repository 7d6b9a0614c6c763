//! Nested report model handed to the document renderer.
//!
//! The hierarchy is imported good → customs procedure → emission source. All
//! types serialize to JSON so the renderer can live outside this crate.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use uuid::Uuid;

use crate::cbam::tools::model::ScalarValue;

/// How an emission figure was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DeterminationType {
    /// Real data reported by the installation.
    #[serde(rename = "01")]
    Actual,
    /// Default values published per commodity code.
    #[serde(rename = "02")]
    Default,
    /// Zero report or estimate.
    #[serde(rename = "03")]
    Estimated,
}

impl DeterminationType {
    pub fn code(&self) -> &'static str {
        match self {
            DeterminationType::Actual => "01",
            DeterminationType::Default => "02",
            DeterminationType::Estimated => "03",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "01" => Some(DeterminationType::Actual),
            "02" => Some(DeterminationType::Default),
            "03" => Some(DeterminationType::Estimated),
            _ => None,
        }
    }
}

impl fmt::Display for DeterminationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Importer {
    pub name: String,
    pub eori: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
}

/// Merged `general_information` and `quarter` entries of the lead workbook.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneralInfo {
    pub importer: Importer,
    pub year: String,
    pub quarter: String,
    /// Every extracted field, including the ones not promoted above.
    pub fields: BTreeMap<String, ScalarValue>,
}

impl GeneralInfo {
    /// Reporting period label such as `Q3-2024`.
    pub fn period(&self) -> String {
        format!("Q{}-{}", self.quarter, self.year)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Operator {
    pub name: String,
    pub country: Option<String>,
    pub fields: BTreeMap<String, ScalarValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Installation {
    pub name: String,
    pub operator_name: String,
    pub country: Option<String>,
    pub fields: BTreeMap<String, ScalarValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectEmissions {
    pub determination_type: DeterminationType,
    pub reporting_methodology: Option<String>,
    pub additional_info: Option<String>,
    pub see: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndirectEmissions {
    pub determination_type: DeterminationType,
    /// Declared value, used only when no emission factor is given.
    pub see: Option<f64>,
    pub source_of_electricity: Option<String>,
    pub other_source_indication: Option<String>,
    pub electricity_consumed: Option<f64>,
    pub emission_factor: Option<f64>,
    pub source_of_emission_factor: Option<String>,
    pub source_of_emission_factor_value: Option<String>,
}

/// Direct and indirect figures for one commodity at one source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmissionData {
    pub direct: DirectEmissions,
    pub indirect: IndirectEmissions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attachment {
    pub filename: String,
    pub mime: Option<String>,
    /// File the renderer embeds as base64.
    pub source: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupportingDocument {
    pub sequence_number: u32,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub reference_number: u32,
    pub attachment: Attachment,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InwardProcessingSplit {
    pub key: String,
    pub member_state_of_authorization: Option<String>,
    pub bill_of_discharge_waiver: String,
    pub authorization: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub deadline: Option<String>,
    pub already_processed: f64,
    pub not_processed: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Procedure {
    pub requested_procedure: String,
    pub previous_procedure: Option<String>,
    pub inward_processing: bool,
    pub net_mass: f64,
    pub inward_processing_splits: Vec<InwardProcessingSplit>,
}

/// Emissions attributed to one installation (or operator) for one imported good.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoodsEmission {
    /// Installation name, or operator name when no installation was given.
    pub source_name: String,
    pub operator: Operator,
    pub installation: Option<Installation>,
    pub country_of_production: Option<String>,
    pub net_mass: f64,
    pub production_methods: Vec<String>,
    pub production_method_name: String,
    pub direct: DirectEmissions,
    pub indirect: IndirectEmissions,
    pub see_direct: f64,
    pub see_indirect: f64,
    pub overall_emissions: f64,
    pub direct_emissions: f64,
    pub indirect_emissions: f64,
    pub supporting_documents: Vec<SupportingDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportedGood {
    /// Stable identifier derived from the grouping key.
    pub id: Uuid,
    pub cn_code: String,
    pub country_of_origin: String,
    pub importer: Importer,
    pub total_net_mass: f64,
    pub procedures: Vec<Procedure>,
    pub goods_emissions: Vec<GoodsEmission>,
    pub total_emissions: f64,
    pub emissions_per_unit: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub num_operators: usize,
    pub num_installations: usize,
    pub num_imported_goods: usize,
    pub num_goods_emissions: usize,
    pub total_net_mass: f64,
    pub total_emissions: f64,
    pub report_type: Option<String>,
}

/// The finished nested model for one workbook set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub run_id: Uuid,
    pub declarant_id: Option<String>,
    pub general_info: GeneralInfo,
    pub imported_goods: Vec<ImportedGood>,
    pub summary: Summary,
}
