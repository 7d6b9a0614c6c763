//! Reference data: commodity default values, the country table, and the
//! declarant identification number.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info, instrument};

use crate::cbam::tools::error::{Result, ToolError};
use crate::cbam::tools::io::excel_read::read_workbook;
use crate::cbam::tools::io::{Grid, Keyword, SearchScope, Workbook, find_keyword, value_right_of};
use crate::cbam::tools::layout::FieldType;
use crate::cbam::tools::model::{CellRef, RawEntry};
use crate::cbam::tools::progress::LoadingIndicator;
use crate::cbam::tools::validate::{Country, CountryTable, Mode, Normalizer};

pub const REPORT_DEFAULTS_SHEET: &str = "report_default_values";
pub const COMMODITY_DEFAULTS_SHEET: &str = "cn_code_default_values";
pub const COUNTRY_DEFAULTS_SHEET: &str = "country_default_values";

const DECLARANT_LABEL: &str = "Declarant.IdentificationNumber";
const COMMODITY_ANCHOR: &str = "CN Code";
const COUNTRY_ANCHOR: &str = "country_code";

/// Default emission figures published for one commodity code.
#[derive(Debug, Clone, PartialEq)]
pub struct CommodityDefaults {
    pub cn_code: String,
    pub see_direct: f64,
    pub see_indirect: f64,
    pub description: String,
    pub production_methods: Vec<String>,
}

/// Read-only registry loaded once per process.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    pub declarant_id: Option<String>,
    commodities: HashMap<String, CommodityDefaults>,
    countries: CountryTable,
    /// Rows dropped because a value failed validation.
    pub skipped_rows: usize,
}

impl ReferenceData {
    /// Loads the reference workbook while a loading indicator animates.
    #[instrument(level = "info", skip_all, fields(input = %path.display()))]
    pub fn load(path: &Path) -> Result<Self> {
        let indicator = LoadingIndicator::start("loading reference data");
        let loaded = read_workbook(path).and_then(|workbook| Self::from_workbook(&workbook));
        indicator.finish();
        let data = loaded?;
        info!(
            commodity_count = data.commodities.len(),
            country_count = data.countries.len(),
            skipped_rows = data.skipped_rows,
            "reference data loaded"
        );
        Ok(data)
    }

    pub fn from_workbook(workbook: &Workbook) -> Result<Self> {
        let report = required_sheet(workbook, REPORT_DEFAULTS_SHEET)?;
        let declarant_id = value_right_of(report, &[DECLARANT_LABEL], false)
            .filter(|value| !value.is_empty())
            .map(|value| value.to_text().trim().to_string());

        let empty = CountryTable::new();
        let normalizer = Normalizer::new(&empty);

        let (commodity_rows, skipped_commodities) = load_default_table(
            required_sheet(workbook, COMMODITY_DEFAULTS_SHEET)?,
            COMMODITY_ANCHOR,
            &commodity_columns(),
            &normalizer,
        )?;
        let (country_rows, skipped_countries) = load_default_table(
            required_sheet(workbook, COUNTRY_DEFAULTS_SHEET)?,
            COUNTRY_ANCHOR,
            &country_columns(),
            &normalizer,
        )?;

        let mut commodities = HashMap::new();
        for row in commodity_rows {
            let Some(cn_code) = row.text("cn_code") else {
                continue;
            };
            let production_methods = ["pm1", "pm2", "pm3"]
                .iter()
                .filter_map(|field| row.text(field))
                .collect();
            commodities.insert(
                cn_code.clone(),
                CommodityDefaults {
                    see_direct: row.number("see_direct").unwrap_or_default(),
                    see_indirect: row.number("see_indirect").unwrap_or_default(),
                    description: row.text("description_of_goods").unwrap_or_default(),
                    production_methods,
                    cn_code,
                },
            );
        }

        let mut countries = CountryTable::new();
        for row in country_rows {
            let Some(code) = row.text("country_code") else {
                continue;
            };
            countries.insert(Country {
                code,
                english_name: row.text("english_name").unwrap_or_default(),
                local_name: row.text("local_name").unwrap_or_default(),
                aliases: ["alias1", "alias2"]
                    .iter()
                    .filter_map(|field| row.text(field))
                    .collect(),
            });
        }

        Ok(Self {
            declarant_id,
            commodities,
            countries,
            skipped_rows: skipped_commodities + skipped_countries,
        })
    }

    /// Builds reference data directly, mainly for callers that do not read a workbook.
    pub fn new(
        declarant_id: Option<String>,
        commodities: impl IntoIterator<Item = CommodityDefaults>,
        countries: CountryTable,
    ) -> Self {
        Self {
            declarant_id,
            commodities: commodities
                .into_iter()
                .map(|defaults| (defaults.cn_code.clone(), defaults))
                .collect(),
            countries,
            skipped_rows: 0,
        }
    }

    pub fn commodity(&self, cn_code: &str) -> Option<&CommodityDefaults> {
        self.commodities.get(cn_code)
    }

    pub fn countries(&self) -> &CountryTable {
        &self.countries
    }
}

fn required_sheet<'w>(workbook: &'w Workbook, name: &str) -> Result<&'w Grid> {
    workbook
        .sheet(name)
        .ok_or_else(|| ToolError::InvalidWorkbook(format!("reference data lacks sheet '{name}'")))
}

fn commodity_columns() -> Vec<(&'static str, FieldType)> {
    vec![
        ("cn_code", FieldType::mandatory("cn_code")),
        ("see_direct", FieldType::mandatory("float")),
        ("see_indirect", FieldType::mandatory("float")),
        ("description_of_goods", FieldType::mandatory("string")),
        ("pm1", FieldType::mandatory("string")),
        ("pm2", FieldType::optional("string")),
        ("pm3", FieldType::optional("string")),
    ]
}

fn country_columns() -> Vec<(&'static str, FieldType)> {
    vec![
        ("country_code", FieldType::optional("country_code")),
        ("english_name", FieldType::optional("string")),
        ("local_name", FieldType::optional("string")),
        ("alias1", FieldType::optional("string")),
        ("alias2", FieldType::optional("string")),
    ]
}

/// Reads consecutive rows below `anchor` until the first empty key cell.
///
/// Columns are taken left to right starting at the anchor column. A row
/// with any invalid value is skipped and counted; nothing here is fatal
/// except a missing anchor.
pub fn load_default_table(
    grid: &Grid,
    anchor: &str,
    columns: &[(&str, FieldType)],
    normalizer: &Normalizer<'_>,
) -> Result<(Vec<RawEntry>, usize)> {
    let anchor_cell = find_keyword(grid, &Keyword::parse(anchor), SearchScope::Anywhere, false)
        .ok_or_else(|| ToolError::MissingAnchor {
            sheet: grid.name().to_string(),
            table: grid.name().to_string(),
            keywords: vec![anchor.to_string()],
        })?;

    let mut rows = Vec::new();
    let mut skipped = 0;
    for row in anchor_cell.row + 1..grid.height() {
        let key_cell = CellRef::new(row, anchor_cell.col);
        if grid.get(key_cell).is_empty() {
            break;
        }
        let mut entry = RawEntry::new(key_cell);
        let mut valid = true;
        for (offset, (name, field_type)) in columns.iter().enumerate() {
            let cell = CellRef::new(row, anchor_cell.col + offset as u32);
            let normalized =
                normalizer.normalize(field_type, grid.get(cell).clone(), &entry, Mode::Muted)?;
            if !normalized.valid {
                debug!(sheet = grid.name(), %cell, column = name, "invalid reference value, row skipped");
                valid = false;
                break;
            }
            entry.insert(*name, normalized.value);
        }
        if valid {
            rows.push(entry);
        } else {
            skipped += 1;
        }
    }
    if skipped > 0 {
        debug!(sheet = grid.name(), skipped, "skipped faulty reference rows");
    }
    Ok((rows, skipped))
}
