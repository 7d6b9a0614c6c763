//! Emission sources of one imported good.

use std::collections::HashMap;

use tracing::debug;

use crate::cbam::tools::aggregate::GoodsEntry;
use crate::cbam::tools::emission::{EmissionSourceResolver, attach_documents};
use crate::cbam::tools::error::Result;
use crate::cbam::tools::model::{DeterminationType, GoodsEmission};
use crate::cbam::tools::run::RunContext;
use crate::cbam::tools::validate::round_to;

/// Upper plausible specific embedded emissions, in tonnes CO2e per tonne.
pub const SEE_PLAUSIBILITY_LIMIT: f64 = 35.0;
const PRODUCTION_METHOD_SEPARATOR: &str = " - ";
const UNNAMED_METHOD: &str = "-";

/// Splits `"P01 - Name"` into method id and name.
pub fn split_production_method(text: &str) -> (String, String) {
    match text.split_once(PRODUCTION_METHOD_SEPARATOR) {
        Some((id, name)) => (id.to_string(), name.to_string()),
        None => (text.to_string(), UNNAMED_METHOD.to_string()),
    }
}

/// Merges entries per installation (or operator) and computes their emissions.
///
/// The first entry of a source selects its emission data; later entries add
/// net mass and production methods.
pub fn aggregate_goods_emissions(
    cn_code: &str,
    entries: &[GoodsEntry],
    resolver: &dyn EmissionSourceResolver,
    ctx: &mut RunContext,
) -> Result<Vec<GoodsEmission>> {
    let mut emissions: Vec<GoodsEmission> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for goods_entry in entries {
        let source_name = goods_entry.source_name().to_string();
        let (method, method_name) =
            split_production_method(&goods_entry.entry.text("production_method").unwrap_or_default());

        if let Some(position) = index.get(&source_name) {
            let emission = &mut emissions[*position];
            emission.net_mass += goods_entry.net_mass;
            if !emission.production_methods.contains(&method) {
                emission.production_methods.push(method);
            }
            continue;
        }

        let resolved = resolver.resolve(&source_name, cn_code)?;
        let estimated = resolved.data.direct.determination_type == DeterminationType::Estimated
            || resolved.data.indirect.determination_type == DeterminationType::Estimated;
        let supporting_documents = if estimated {
            attach_documents(&resolved.documents, ctx)
        } else {
            Vec::new()
        };

        index.insert(source_name.clone(), emissions.len());
        emissions.push(GoodsEmission {
            source_name,
            operator: goods_entry.operator.clone(),
            installation: goods_entry.installation.clone(),
            country_of_production: goods_entry.country_of_production.clone(),
            net_mass: goods_entry.net_mass,
            production_methods: vec![method],
            production_method_name: method_name,
            direct: resolved.data.direct,
            indirect: resolved.data.indirect,
            see_direct: 0.0,
            see_indirect: 0.0,
            overall_emissions: 0.0,
            direct_emissions: 0.0,
            indirect_emissions: 0.0,
            supporting_documents,
        });
    }

    for emission in &mut emissions {
        compute_emissions(cn_code, emission, ctx);
    }
    debug!(cn_code, sources = emissions.len(), "goods emissions aggregated");
    Ok(emissions)
}

/// Fills the specific and total emissions of a merged source.
fn compute_emissions(cn_code: &str, emission: &mut GoodsEmission, ctx: &mut RunContext) {
    let net_mass = round_to(emission.net_mass, 6);
    let see_direct = round_to(emission.direct.see, 6);
    let see_indirect = match emission.indirect.emission_factor {
        Some(factor) => {
            let consumed = emission.indirect.electricity_consumed.unwrap_or_default();
            round_to(round_to(factor, 5) * round_to(consumed, 2), 6)
        }
        None => round_to(emission.indirect.see.unwrap_or_default(), 6),
    };

    for (label, value) in [("direct", see_direct), ("indirect", see_indirect)] {
        if value > SEE_PLAUSIBILITY_LIMIT {
            ctx.warn(
                "implausible specific embedded emissions",
                format!(
                    "{cn_code} at '{}': {label} value {value} exceeds {SEE_PLAUSIBILITY_LIMIT}",
                    emission.source_name
                ),
            );
        }
    }

    emission.net_mass = net_mass;
    emission.see_direct = see_direct;
    emission.see_indirect = see_indirect;
    emission.overall_emissions = round_to(net_mass * (see_direct + see_indirect), 6);
    emission.direct_emissions = round_to(net_mass * see_direct, 6);
    emission.indirect_emissions = round_to(net_mass * see_indirect, 6);
}
