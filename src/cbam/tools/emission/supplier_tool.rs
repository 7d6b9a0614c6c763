//! Supplier tool workbooks: per-commodity emission figures filled in by an
//! installation.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::cbam::tools::emission::matching::{MatchKind, find_name};
use crate::cbam::tools::error::{Result, ToolError};
use crate::cbam::tools::io::excel_read::read_workbook;
use crate::cbam::tools::io::{HeaderRow, Workbook, read_header_table};
use crate::cbam::tools::model::{
    DeterminationType, DirectEmissions, EmissionData, IndirectEmissions, ScalarValue,
};
use crate::cbam::tools::run::RunContext;

pub const OUTPUT_SHEET: &str = "Output";
const HEAD_COLUMN: &str = "ProPro Name";
const CN_CODE: &str = "CN-Code";
const DIRECT_DETERMINATION: &str = "Direct Emissions: Type of Determination";
const DIRECT_METHODOLOGY: &str = "Direct Emissions: Type of applicable reporting methodology";
const DIRECT_ADDITIONAL_INFO: &str = "Direct Emissions: Additional Information";
const DIRECT_SEE: &str = "Direct Emissions: Specific Direct Embedded Emissions";
const INDIRECT_DETERMINATION: &str = "Indirect Emissions: Type of determination";
const INDIRECT_EF_SOURCE: &str = "Indirect Emissions: Source of emission factor";
const INDIRECT_ELECTRICITY_SOURCE: &str = "Indirect Emissions: Source of electricity";
const INDIRECT_OTHER_SOURCE: &str = "Indirect Emissions: Other source indication";
const INDIRECT_ELECTRICITY_CONSUMED: &str = "Indirect Emissions: Electricity consumed [MWh/t]";
const INDIRECT_EMISSION_FACTOR: &str = "Indirect Emissions: Emission factor";
const INDIRECT_EF_SOURCE_VALUE: &str = "Indirect Emissions: Source of emissions factor value";

const COLUMNS: &[&str] = &[
    HEAD_COLUMN,
    CN_CODE,
    DIRECT_DETERMINATION,
    DIRECT_METHODOLOGY,
    DIRECT_ADDITIONAL_INFO,
    DIRECT_SEE,
    INDIRECT_DETERMINATION,
    INDIRECT_EF_SOURCE,
    INDIRECT_ELECTRICITY_SOURCE,
    INDIRECT_OTHER_SOURCE,
    INDIRECT_ELECTRICITY_CONSUMED,
    INDIRECT_EMISSION_FACTOR,
    INDIRECT_EF_SOURCE_VALUE,
];

/// Source of emission factor meaning "reported by the manufacturer".
const MANUFACTURER_EF_SOURCE: &str = "01";
const MANUFACTURER_EF_TEXT: &str = "Der Wert wurde anhand der Herstellerangaben berechnet.";

/// Locates `<supplier_data_dir>/<importer>/<installation>/`.
pub fn installation_folder(
    supplier_data_dir: &Path,
    importer_name: &str,
    installation: &str,
    ctx: &mut RunContext,
) -> Result<PathBuf> {
    let importer_dir = matching_entry(supplier_data_dir, importer_name, ctx)?;
    matching_entry(&importer_dir, installation, ctx)
}

fn matching_entry(parent: &Path, wanted: &str, ctx: &mut RunContext) -> Result<PathBuf> {
    let names = fs::read_dir(parent)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect::<Vec<_>>();
    let (name, kind) = find_name(wanted, names.iter().map(String::as_str)).ok_or_else(|| {
        ToolError::Identity {
            name: wanted.to_string(),
            context: format!("no folder in {}", parent.display()),
        }
    })?;
    if kind == MatchKind::Similar {
        ctx.warn(
            "non-exact match on supplier folder",
            format!("'{wanted}' matched folder '{name}' in {}", parent.display()),
        );
    }
    Ok(parent.join(name))
}

/// The single file in `folder` matching `pattern`, which may hold one `*`.
pub fn find_tool_file(folder: &Path, pattern: &str) -> Result<PathBuf> {
    let mut matches = fs::read_dir(folder)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| matches_pattern(name, pattern))
        .collect::<Vec<_>>();
    match matches.len() {
        1 => Ok(folder.join(matches.remove(0))),
        0 => Err(ToolError::MissingInput(folder.join(pattern))),
        count => Err(ToolError::Config(format!(
            "{count} supplier tool files match '{pattern}' in {}",
            folder.display()
        ))),
    }
}

fn matches_pattern(name: &str, pattern: &str) -> bool {
    match pattern.split_once('*') {
        Some((prefix, suffix)) => {
            name.len() >= prefix.len() + suffix.len()
                && name.starts_with(prefix)
                && name.ends_with(suffix)
        }
        None => name == pattern,
    }
}

/// Emission data per commodity code from a supplier tool file.
#[instrument(level = "info", skip_all, fields(input = %path.display()))]
pub fn load_supplier_tool(
    path: &Path,
    ctx: &mut RunContext,
) -> Result<HashMap<String, EmissionData>> {
    let workbook = read_workbook(path)?;
    parse_supplier_tool(&workbook, ctx)
}

pub fn parse_supplier_tool(
    workbook: &Workbook,
    ctx: &mut RunContext,
) -> Result<HashMap<String, EmissionData>> {
    let grid = workbook.sheet(OUTPUT_SHEET).ok_or_else(|| {
        ToolError::InvalidWorkbook(format!("supplier tool has no '{OUTPUT_SHEET}' sheet"))
    })?;
    let mut data = HashMap::new();
    for row in read_header_table(grid, HEAD_COLUMN, COLUMNS)? {
        let cn_code = text(&row, CN_CODE).ok_or_else(|| {
            ToolError::validation(format!("supplier tool row without {CN_CODE}"))
        })?;
        let emission = emission_row(&row, &cn_code, ctx)?;
        debug!(cn_code = %cn_code, "supplier tool row");
        data.insert(cn_code, emission);
    }
    Ok(data)
}

fn emission_row(row: &HeaderRow, cn_code: &str, ctx: &mut RunContext) -> Result<EmissionData> {
    let emission_factor = number(row, INDIRECT_EMISSION_FACTOR);
    let electricity_consumed = number(row, INDIRECT_ELECTRICITY_CONSUMED);
    let (Some(emission_factor), Some(electricity_consumed)) = (emission_factor, electricity_consumed)
    else {
        return Err(ToolError::validation(format!(
            "invalid electricity consumed or emission factor for {cn_code} in supplier tool"
        )));
    };

    let direct_type = determination(row, DIRECT_DETERMINATION, cn_code, ctx)?;
    let indirect_type = determination(row, INDIRECT_DETERMINATION, cn_code, ctx)?;

    let source_of_emission_factor = text(row, INDIRECT_EF_SOURCE);
    let mut source_of_emission_factor_value = text(row, INDIRECT_EF_SOURCE_VALUE);
    if source_of_emission_factor.as_deref() == Some(MANUFACTURER_EF_SOURCE)
        && source_of_emission_factor_value.is_none()
    {
        ctx.warn(
            "source of emission factor value filled in",
            format!("{cn_code}: '{MANUFACTURER_EF_TEXT}'"),
        );
        source_of_emission_factor_value = Some(MANUFACTURER_EF_TEXT.to_string());
    }

    let mut additional_info = text(row, DIRECT_ADDITIONAL_INFO);
    if direct_type == DeterminationType::Estimated && additional_info.is_none() {
        ctx.warn("additional information filled in", format!("{cn_code}: '-'"));
        additional_info = Some("-".to_string());
    }

    Ok(EmissionData {
        direct: DirectEmissions {
            determination_type: direct_type,
            reporting_methodology: text(row, DIRECT_METHODOLOGY),
            additional_info,
            see: number(row, DIRECT_SEE).unwrap_or_default(),
        },
        indirect: IndirectEmissions {
            determination_type: indirect_type,
            see: Some(emission_factor * electricity_consumed),
            source_of_electricity: text(row, INDIRECT_ELECTRICITY_SOURCE),
            other_source_indication: text(row, INDIRECT_OTHER_SOURCE),
            electricity_consumed: Some(electricity_consumed),
            emission_factor: Some(emission_factor),
            source_of_emission_factor,
            source_of_emission_factor_value,
        },
    })
}

/// Supplier tools are filled with actual data, so a default-value code is
/// rewritten to actual.
fn determination(
    row: &HeaderRow,
    column: &str,
    cn_code: &str,
    ctx: &mut RunContext,
) -> Result<DeterminationType> {
    let raw = text(row, column).unwrap_or_default();
    let code = if raw.len() == 1 { format!("0{raw}") } else { raw };
    match DeterminationType::from_code(&code) {
        Some(DeterminationType::Default) => {
            ctx.warn(
                "determination type 02 in supplier tool",
                format!("{cn_code}: '{column}' overwritten with 01"),
            );
            Ok(DeterminationType::Actual)
        }
        Some(kind) => Ok(kind),
        None => Err(ToolError::validation(format!(
            "invalid type of determination '{code}' in '{column}' for {cn_code}"
        ))),
    }
}

fn text(row: &HeaderRow, column: &str) -> Option<String> {
    row.get(column)
        .filter(|value| !value.is_empty())
        .map(|value| value.to_text().trim().to_string())
        .filter(|value| !value.is_empty())
}

fn number(row: &HeaderRow, column: &str) -> Option<f64> {
    row.get(column).and_then(ScalarValue::as_number)
}
