//! Aggregation of extracted workbook tables into the nested report model.
//!
//! A workbook set is either one importer workbook or an importer cohort
//! handled by an indirect representative. General information comes from
//! the first workbook; operators, installations and goods from all of them.

use std::collections::HashMap;

use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::cbam::tools::emission::EmissionSourceResolver;
use crate::cbam::tools::emission::matching::strip_parenthetical;
use crate::cbam::tools::error::{Result, ToolError};
use crate::cbam::tools::model::{
    ExtractedWorkbook, GeneralInfo, ImportedGood, Importer, Installation, Operator, RawEntry,
    Report,
};
use crate::cbam::tools::run::RunContext;
use crate::cbam::tools::validate::round_to;

pub mod goods_emission;
pub mod procedure;

pub const GENERAL_SHEET: &str = "Allgemeine_Informationen";
pub const GENERAL_TABLE: &str = "general_information";
pub const QUARTER_TABLE: &str = "quarter";
pub const OPERATOR_SHEET: &str = "Ihre_Hersteller_Liste";
pub const OPERATOR_TABLE: &str = "operator_list";
pub const INSTALLATION_SHEET: &str = "Produktions_Standorte_Liste";
pub const INSTALLATION_TABLE: &str = "installations";
pub const GOODS_SHEET: &str = "Angaben_zu_Warenmengen";
pub const GOODS_TABLE: &str = "table_imported_goods";

/// Goods entry with its supplier identity resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct GoodsEntry {
    pub cn_code: String,
    pub country_of_origin: String,
    pub country_of_production: Option<String>,
    pub operator: Operator,
    pub installation: Option<Installation>,
    pub net_mass: f64,
    pub entry: RawEntry,
}

impl GoodsEntry {
    /// Installation name, or the operator name when no installation is known.
    pub fn source_name(&self) -> &str {
        self.installation
            .as_ref()
            .map(|installation| installation.name.as_str())
            .unwrap_or(&self.operator.name)
    }
}

/// Entries sharing commodity code, country of origin and importer.
#[derive(Debug, Clone, PartialEq)]
pub struct GoodsGroup {
    pub key: String,
    pub cn_code: String,
    pub country_of_origin: String,
    pub importer: Importer,
    pub entries: Vec<GoodsEntry>,
}

/// Resolved identities and grouped goods of one workbook set.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub general_info: GeneralInfo,
    pub operators: Vec<Operator>,
    pub installations: Vec<Installation>,
    pub groups: Vec<GoodsGroup>,
}

impl Aggregation {
    #[instrument(level = "info", skip_all, fields(workbooks = workbooks.len()))]
    pub fn collect(workbooks: &[ExtractedWorkbook], ctx: &mut RunContext) -> Result<Self> {
        let first = workbooks
            .first()
            .ok_or_else(|| ToolError::InvalidWorkbook("workbook set is empty".into()))?;
        let general_info = general_info(first)?;

        let mut operators: Vec<Operator> = Vec::new();
        let mut installations: Vec<Installation> = Vec::new();
        for workbook in workbooks {
            let read = read_operators(workbook)?;
            merge_by_name(&mut operators, read, |operator: &Operator| &operator.name);
            let read = read_installations(workbook, &operators)?;
            merge_by_name(&mut installations, read, |installation: &Installation| {
                &installation.name
            });
        }
        debug!(
            operators = operators.len(),
            installations = installations.len(),
            "identities collected"
        );

        let mut groups: Vec<GoodsGroup> = Vec::new();
        let mut group_index: HashMap<String, usize> = HashMap::new();
        for workbook in workbooks {
            let importer = importer(workbook)?;
            for entry in workbook.table(GOODS_SHEET, GOODS_TABLE) {
                let goods_entry = resolve_entry(entry, &operators, &installations)?;
                let key = format!(
                    "{};{};{}",
                    goods_entry.cn_code, goods_entry.country_of_origin, importer.name
                );
                match group_index.get(&key) {
                    Some(index) => groups[*index].entries.push(goods_entry),
                    None => {
                        group_index.insert(key.clone(), groups.len());
                        groups.push(GoodsGroup {
                            key,
                            cn_code: goods_entry.cn_code.clone(),
                            country_of_origin: goods_entry.country_of_origin.clone(),
                            importer: importer.clone(),
                            entries: vec![goods_entry],
                        });
                    }
                }
            }
        }

        if groups.is_empty() {
            ctx.warn("no imported goods", "the goods table of the workbook set is empty");
        }
        info!(imported_goods = groups.len(), "goods grouped");
        Ok(Self {
            general_info,
            operators,
            installations,
            groups,
        })
    }

    /// Distinct emission source names in order of first appearance.
    pub fn source_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for entry in self.groups.iter().flat_map(|group| group.entries.iter()) {
            let name = entry.source_name();
            if !names.iter().any(|known| known == name) {
                names.push(name.to_string());
            }
        }
        names
    }

    /// Builds the nested report, updating the summary counters of `ctx`.
    #[instrument(level = "info", skip_all, fields(imported_goods = self.groups.len()))]
    pub fn build_report(
        &self,
        resolver: &dyn EmissionSourceResolver,
        declarant_id: Option<String>,
        ctx: &mut RunContext,
    ) -> Result<Report> {
        ctx.summary.num_operators = self.operators.len();
        ctx.summary.num_installations = self.installations.len();
        ctx.summary.num_imported_goods = self.groups.len();

        let mut imported_goods = Vec::with_capacity(self.groups.len());
        for group in &self.groups {
            let (procedures, total_net_mass) = procedure::aggregate_procedures(group, ctx)?;
            let emissions =
                goods_emission::aggregate_goods_emissions(&group.cn_code, &group.entries, resolver, ctx)?;
            let total_emissions = round_to(
                emissions.iter().map(|emission| emission.overall_emissions).sum(),
                6,
            );
            let emissions_per_unit = if total_net_mass == 0.0 {
                ctx.warn(
                    "imported good without net mass",
                    format!("{}: emissions per unit reported as 0", group.key),
                );
                0.0
            } else {
                round_to(total_emissions / total_net_mass, 6)
            };

            ctx.summary.num_goods_emissions += emissions.len();
            ctx.summary.total_net_mass += total_net_mass;
            ctx.summary.total_emissions += total_emissions;

            imported_goods.push(ImportedGood {
                id: Uuid::new_v5(&Uuid::NAMESPACE_OID, group.key.as_bytes()),
                cn_code: group.cn_code.clone(),
                country_of_origin: group.country_of_origin.clone(),
                importer: group.importer.clone(),
                total_net_mass,
                procedures,
                goods_emissions: emissions,
                total_emissions,
                emissions_per_unit,
            });
        }

        info!(
            imported_goods = imported_goods.len(),
            goods_emissions = ctx.summary.num_goods_emissions,
            total_net_mass = ctx.summary.total_net_mass,
            total_emissions = ctx.summary.total_emissions,
            "report built"
        );
        Ok(Report {
            run_id: ctx.run_id,
            declarant_id,
            general_info: self.general_info.clone(),
            imported_goods,
            summary: ctx.summary.clone(),
        })
    }
}

fn required_text(entry: &RawEntry, sheet: &str, table: &str, field: &str) -> Result<String> {
    entry.text(field).ok_or_else(|| ToolError::MissingField {
        sheet: sheet.to_string(),
        table: table.to_string(),
        field: field.to_string(),
    })
}

fn first_entry<'w>(workbook: &'w ExtractedWorkbook, sheet: &str, table: &str) -> Result<&'w RawEntry> {
    workbook
        .table(sheet, table)
        .first()
        .ok_or_else(|| ToolError::InvalidWorkbook(format!("table '{table}' of sheet '{sheet}' is empty")))
}

fn importer(workbook: &ExtractedWorkbook) -> Result<Importer> {
    let entry = first_entry(workbook, GENERAL_SHEET, GENERAL_TABLE)?;
    Ok(Importer {
        name: required_text(entry, GENERAL_SHEET, GENERAL_TABLE, "importer_name")?,
        eori: entry.text("importer_eori"),
        country: entry.text("importer_country"),
        city: entry.text("importer_city"),
    })
}

fn general_info(workbook: &ExtractedWorkbook) -> Result<GeneralInfo> {
    let general = first_entry(workbook, GENERAL_SHEET, GENERAL_TABLE)?;
    let quarter = first_entry(workbook, GENERAL_SHEET, QUARTER_TABLE)?;
    let mut fields = general.values.clone();
    fields.extend(quarter.values.clone());
    Ok(GeneralInfo {
        importer: importer(workbook)?,
        year: required_text(quarter, GENERAL_SHEET, QUARTER_TABLE, "year")?,
        quarter: required_text(quarter, GENERAL_SHEET, QUARTER_TABLE, "quarter")?,
        fields,
    })
}

/// Later workbooks of a cohort override earlier entries of the same name.
fn merge_by_name<T>(merged: &mut Vec<T>, read: Vec<T>, name: impl Fn(&T) -> &String) {
    for item in read {
        match merged.iter().position(|known| name(known) == name(&item)) {
            Some(index) => merged[index] = item,
            None => merged.push(item),
        }
    }
}

fn read_operators(workbook: &ExtractedWorkbook) -> Result<Vec<Operator>> {
    let mut operators: Vec<Operator> = Vec::new();
    for entry in workbook.table(OPERATOR_SHEET, OPERATOR_TABLE) {
        let name = required_text(entry, OPERATOR_SHEET, OPERATOR_TABLE, "operator_name")?;
        if operators.iter().any(|operator| operator.name == name) {
            return Err(ToolError::Contradiction {
                key: name,
                detail: format!("duplicate operator name at {}", entry.cell),
            });
        }
        operators.push(Operator {
            name,
            country: entry.text("operator_country"),
            fields: entry.values.clone(),
        });
    }
    Ok(operators)
}

fn read_installations(
    workbook: &ExtractedWorkbook,
    operators: &[Operator],
) -> Result<Vec<Installation>> {
    let mut installations: Vec<Installation> = Vec::new();
    for entry in workbook.table(INSTALLATION_SHEET, INSTALLATION_TABLE) {
        let name = required_text(entry, INSTALLATION_SHEET, INSTALLATION_TABLE, "installation_name")?;
        if installations.iter().any(|installation| installation.name == name) {
            return Err(ToolError::Contradiction {
                key: name,
                detail: format!("duplicate installation name at {}", entry.cell),
            });
        }
        if operators.iter().any(|operator| operator.name == name) {
            return Err(ToolError::Contradiction {
                key: name,
                detail: format!("installation at {} is named like an operator", entry.cell),
            });
        }
        installations.push(Installation {
            operator_name: required_text(
                entry,
                INSTALLATION_SHEET,
                INSTALLATION_TABLE,
                "installation_operator_name",
            )?,
            country: entry.text("installation_country"),
            fields: entry.values.clone(),
            name,
        });
    }
    Ok(installations)
}

/// Supplier identity of a goods entry: installation, then operator, then
/// installation with a trailing parenthetical removed.
pub fn resolve_identity(
    stated: &str,
    operators: &[Operator],
    installations: &[Installation],
) -> Result<(Operator, Option<Installation>)> {
    let installation_named = |name: &str| installations.iter().find(|inst| inst.name == name);
    let operator_of = |installation: &Installation| {
        operators
            .iter()
            .find(|operator| operator.name == installation.operator_name)
            .cloned()
            .ok_or_else(|| ToolError::Identity {
                name: installation.operator_name.clone(),
                context: format!("operator of installation '{}' is not listed", installation.name),
            })
    };

    if let Some(installation) = installation_named(stated) {
        return Ok((operator_of(installation)?, Some(installation.clone())));
    }
    if let Some(operator) = operators.iter().find(|operator| operator.name == stated) {
        return Ok((operator.clone(), None));
    }
    if let Some(installation) = strip_parenthetical(stated).and_then(installation_named) {
        debug!(stated, installation = %installation.name, "installation matched without parenthetical");
        return Ok((operator_of(installation)?, Some(installation.clone())));
    }
    Err(ToolError::Identity {
        name: stated.to_string(),
        context: "neither an installation nor an operator of the workbook set".into(),
    })
}

fn resolve_entry(
    entry: &RawEntry,
    operators: &[Operator],
    installations: &[Installation],
) -> Result<GoodsEntry> {
    let stated = required_text(entry, GOODS_SHEET, GOODS_TABLE, "operator_or_installation")?;
    let (operator, installation) =
        resolve_identity(&stated, operators, installations).map_err(|error| match error {
            ToolError::Identity { name, context } => ToolError::Identity {
                name,
                context: format!("{context} (goods entry at {})", entry.cell),
            },
            other => other,
        })?;

    let cn_code = required_text(entry, GOODS_SHEET, GOODS_TABLE, "cn_code")?;
    let country_of_origin = entry
        .text("country_of_origin")
        .or_else(|| operator.country.clone())
        .ok_or_else(|| ToolError::MissingField {
            sheet: GOODS_SHEET.to_string(),
            table: GOODS_TABLE.to_string(),
            field: "country_of_origin".to_string(),
        })?;
    let country_of_production = installation
        .as_ref()
        .and_then(|installation| installation.country.clone())
        .or_else(|| operator.country.clone());
    let net_mass = entry.number("net_mass").ok_or_else(|| {
        ToolError::validation(format!("goods entry at {} has no numeric net mass", entry.cell))
    })?;

    Ok(GoodsEntry {
        cn_code,
        country_of_origin,
        country_of_production,
        operator,
        installation,
        net_mass,
        entry: entry.clone(),
    })
}
