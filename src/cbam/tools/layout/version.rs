use tracing::{info, warn};

use crate::cbam::tools::error::{Result, ToolError};
use crate::cbam::tools::io::{Keyword, SearchScope, Workbook, find_keyword, value_right_of};
use crate::cbam::tools::layout::{LayoutDocument, SheetDescriptor};
use crate::cbam::tools::validate::registry;

pub const SPECIFICATION_SHEET: &str = "Specification";
pub const VERSION_LABELS: &[&str] = &["Version", "Version:"];

pub const GOODS_SHEET: &str = "Angaben_zu_Warenmengen";
pub const INSTALLATIONS_SHEET: &str = "Produktions_Standorte_Liste";
pub const INWARD_PROCESSING_KEYWORDS: &[&str] = &[
    "Ursprünglich zur Veredelung importiert",
    "Menge noch nicht veredelter Ware...",
    "Zulassungsstaat",
];

pub const LEGACY_VERSION: &str = "version_1_7";
pub const FALLBACK_VERSION: &str = "version_1_7_2";

/// Maps a declared version such as `1.7.2` to its overlay key `version_1_7_2`.
pub fn version_key(version: &str) -> Result<String> {
    let version = version.trim();
    if registry::check("version", &version.into()) != Some(true) {
        return Err(ToolError::Layout(format!(
            "invalid version '{version}' in specification sheet"
        )));
    }
    Ok(format!("version_{}", version.replace('.', "_")))
}

/// Picks the overlay key for a workbook.
///
/// A `Specification` sheet with a `Version` label wins. Without one the legacy
/// layout is recognised by the absence of the inward-processing columns in the
/// goods sheet together with the presence of an installations sheet; anything
/// else falls back to the newest unlabelled version.
pub fn detect_version(workbook: &Workbook, document: &LayoutDocument) -> Result<String> {
    if let Some(spec_sheet) = workbook.sheet(SPECIFICATION_SHEET) {
        let value = value_right_of(spec_sheet, VERSION_LABELS, true)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                ToolError::Layout(format!(
                    "sheet '{SPECIFICATION_SHEET}' has no version next to a 'Version' label"
                ))
            })?;
        let key = version_key(&value.to_text())?;
        if !document.has_version(&key) {
            return Err(ToolError::Layout(format!(
                "declared layout version '{key}' is not defined"
            )));
        }
        info!(version = %key, "layout version declared in workbook");
        return Ok(key);
    }

    let has_inward_processing = workbook.sheet(GOODS_SHEET).is_some_and(|goods| {
        INWARD_PROCESSING_KEYWORDS.iter().any(|keyword| {
            find_keyword(goods, &Keyword::parse(keyword), SearchScope::Anywhere, false).is_some()
        })
    });
    if !has_inward_processing && workbook.sheet(INSTALLATIONS_SHEET).is_some() {
        info!(version = LEGACY_VERSION, "legacy layout detected");
        return Ok(LEGACY_VERSION.to_string());
    }

    warn!(
        version = FALLBACK_VERSION,
        "no version information in workbook, using fallback layout"
    );
    Ok(FALLBACK_VERSION.to_string())
}

/// Replaces base sheets by overlay sheets with the same code name.
///
/// Matching uses the code name only. Overlay sheets without a base
/// counterpart are ignored, base sheets without an overlay stay as they are.
pub fn merge_sheets(base: &[SheetDescriptor], overlay: &[SheetDescriptor]) -> Vec<SheetDescriptor> {
    base.iter()
        .map(|sheet| {
            overlay
                .iter()
                .find(|candidate| candidate.code == sheet.code)
                .unwrap_or(sheet)
                .clone()
        })
        .collect()
}
