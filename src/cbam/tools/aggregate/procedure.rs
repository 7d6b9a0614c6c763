//! Customs procedures of one imported good.

use std::collections::HashMap;

use tracing::debug;

use crate::cbam::tools::aggregate::{GoodsEntry, GoodsGroup};
use crate::cbam::tools::error::{Result, ToolError};
use crate::cbam::tools::model::{InwardProcessingSplit, Procedure};
use crate::cbam::tools::run::RunContext;
use crate::cbam::tools::validate::round_to;

/// Accumulation precision; presentation uses 6 decimals.
const ACCUMULATION_PLACES: i32 = 9;
const PRESENTATION_PLACES: i32 = 6;
pub const MASS_TOLERANCE: f64 = 1e-8;
/// Upper bound of the target schema for procedures and for splits.
pub const MAX_ENTRIES: usize = 9;
const INWARD_PROCESSING_PREVIOUS: &[&str] = &["51", "54"];

/// Procedures keyed by requested and previous procedure, plus the total net
/// mass of the imported good.
pub fn aggregate_procedures(
    group: &GoodsGroup,
    ctx: &mut RunContext,
) -> Result<(Vec<Procedure>, f64)> {
    let mut procedures: Vec<Procedure> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut total_net_mass = 0.0;

    for goods_entry in &group.entries {
        let mass = round_to(goods_entry.net_mass, ACCUMULATION_PLACES);
        total_net_mass += mass;

        let entry = &goods_entry.entry;
        let requested = entry.text("requested_procedure").ok_or_else(|| ToolError::MissingField {
            sheet: super::GOODS_SHEET.to_string(),
            table: super::GOODS_TABLE.to_string(),
            field: "requested_procedure".to_string(),
        })?;
        let previous = entry.text("previous_procedure");
        let key = format!("{requested};{}", previous.as_deref().unwrap_or_default());

        let flagged = entry.text("inward_processing").as_deref() == Some("1");
        let previous_matches = previous
            .as_deref()
            .is_some_and(|code| INWARD_PROCESSING_PREVIOUS.contains(&code));
        if flagged != previous_matches {
            return Err(ToolError::Contradiction {
                key: key.clone(),
                detail: format!(
                    "inward processing flag {flagged} disagrees with previous procedure {:?} at {}",
                    previous, entry.cell
                ),
            });
        }

        let position = match index.get(&key) {
            Some(position) => {
                procedures[*position].net_mass += mass;
                *position
            }
            None => {
                index.insert(key.clone(), procedures.len());
                procedures.push(Procedure {
                    requested_procedure: requested,
                    previous_procedure: previous,
                    inward_processing: flagged,
                    net_mass: mass,
                    inward_processing_splits: Vec::new(),
                });
                procedures.len() - 1
            }
        };

        if flagged {
            let split = inward_processing_split(goods_entry, ctx);
            merge_split(&mut procedures[position].inward_processing_splits, split);
        }
    }

    for procedure in &mut procedures {
        procedure.net_mass = round_to(procedure.net_mass, ACCUMULATION_PLACES);
        check_split_masses(&group.key, procedure, ctx);
        if procedure.inward_processing_splits.len() > MAX_ENTRIES {
            ctx.warn(
                "too many inward processing splits",
                format!(
                    "{} procedure {}: {} splits (max {MAX_ENTRIES})",
                    group.key,
                    procedure.requested_procedure,
                    procedure.inward_processing_splits.len()
                ),
            );
        }
    }
    if procedures.len() > MAX_ENTRIES {
        ctx.warn(
            "too many customs procedures",
            format!("{}: {} procedures (max {MAX_ENTRIES})", group.key, procedures.len()),
        );
    }

    debug!(key = %group.key, procedures = procedures.len(), "procedures aggregated");
    Ok((procedures, round_to(total_net_mass, ACCUMULATION_PLACES)))
}

fn inward_processing_split(goods_entry: &GoodsEntry, ctx: &mut RunContext) -> InwardProcessingSplit {
    let entry = &goods_entry.entry;
    let member_state_of_authorization = entry.text("member_state_of_authorization");
    let bill_of_discharge_waiver = entry
        .text("bill_of_discharge_waiver")
        .unwrap_or_else(|| "0".to_string());
    let authorization = entry.text("authorization");
    let start_date = entry.text("start_date");
    let end_date = entry.text("end_date");
    let deadline = entry.text("deadline");
    let already_processed = entry.number("already_processed").unwrap_or_default();
    let not_processed = entry.number("not_processed").unwrap_or_default();

    if !masses_agree(already_processed + not_processed, goods_entry.net_mass) {
        ctx.warn(
            "inward processing masses do not add up",
            format!(
                "entry at {}: {already_processed} + {not_processed} != {}",
                entry.cell, goods_entry.net_mass
            ),
        );
    }

    let key = [
        member_state_of_authorization.as_deref(),
        Some(bill_of_discharge_waiver.as_str()),
        authorization.as_deref(),
        start_date.as_deref(),
        end_date.as_deref(),
        deadline.as_deref(),
    ]
    .map(Option::unwrap_or_default)
    .join(";");

    InwardProcessingSplit {
        key,
        member_state_of_authorization,
        bill_of_discharge_waiver,
        authorization,
        start_date,
        end_date,
        deadline,
        already_processed,
        not_processed,
    }
}

fn merge_split(splits: &mut Vec<InwardProcessingSplit>, split: InwardProcessingSplit) {
    match splits.iter_mut().find(|known| known.key == split.key) {
        Some(known) => {
            known.already_processed += split.already_processed;
            known.not_processed += split.not_processed;
        }
        None => splits.push(split),
    }
}

fn check_split_masses(key: &str, procedure: &Procedure, ctx: &mut RunContext) {
    if procedure.inward_processing_splits.is_empty() {
        return;
    }
    let split_total: f64 = procedure
        .inward_processing_splits
        .iter()
        .map(|split| split.already_processed + split.not_processed)
        .sum();
    if !masses_agree(split_total, procedure.net_mass) {
        ctx.warn(
            "inward processing masses do not add up",
            format!(
                "{key} procedure {}: splits sum to {split_total}, procedure holds {}",
                procedure.requested_procedure, procedure.net_mass
            ),
        );
    }
}

/// Compares two masses at presentation precision.
pub fn masses_agree(lhs: f64, rhs: f64) -> bool {
    (round_to(lhs, PRESENTATION_PLACES) - round_to(rhs, PRESENTATION_PLACES)).abs() <= MASS_TOLERANCE
}
