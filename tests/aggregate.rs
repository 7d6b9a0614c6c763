mod common;

use std::path::PathBuf;

use cbam_tools::ToolError;
use cbam_tools::aggregate::Aggregation;
use cbam_tools::aggregate::resolve_identity;
use cbam_tools::emission::{EmissionPlan, EmissionSourceResolver, ResolvedSource, SourcePlan};
use cbam_tools::model::{
    CellRef, DeterminationType, DirectEmissions, EmissionData, ExtractedWorkbook,
    IndirectEmissions, Installation, Operator, RawEntry, ScalarValue,
};
use cbam_tools::run::RunContext;
use uuid::Uuid;

use common::{number, reference_data, text};

fn entry(row: u32, fields: &[(&str, ScalarValue)]) -> RawEntry {
    let mut entry = RawEntry::new(CellRef::new(row, 1));
    for (field, value) in fields {
        entry.insert(*field, value.clone());
    }
    entry
}

fn goods(row: u32, source: &str, mass: f64, requested: &str, previous: &str) -> RawEntry {
    entry(
        row,
        &[
            ("cn_code", text("72081000")),
            ("operator_or_installation", text(source)),
            ("country_of_origin", text("CN")),
            ("net_mass", number(mass)),
            ("requested_procedure", text(requested)),
            ("previous_procedure", text(previous)),
            ("inward_processing", text("0")),
            ("production_method", text("P01 - Warmwalzen")),
        ],
    )
}

fn inward_processing(
    row: u32,
    source: &str,
    mass: f64,
    already_processed: f64,
    not_processed: f64,
) -> RawEntry {
    let mut goods_entry = goods(row, source, mass, "40", "51");
    goods_entry.insert("inward_processing", text("1"));
    goods_entry.insert("member_state_of_authorization", text("DE"));
    goods_entry.insert("authorization", text("DE-IP-1"));
    goods_entry.insert("already_processed", number(already_processed));
    goods_entry.insert("not_processed", number(not_processed));
    goods_entry
}

fn workbook(importer: &str, goods_entries: Vec<RawEntry>) -> ExtractedWorkbook {
    let mut workbook = ExtractedWorkbook::new("version_1_7_2");
    workbook.insert_table(
        "Allgemeine_Informationen",
        "general_information",
        vec![entry(
            2,
            &[
                ("importer_name", text(importer)),
                ("importer_eori", text("DE1234567")),
                ("importer_country", text("DE")),
            ],
        )],
    );
    workbook.insert_table(
        "Allgemeine_Informationen",
        "quarter",
        vec![entry(7, &[("year", text("2024")), ("quarter", text("3"))])],
    );
    workbook.insert_table(
        "Ihre_Hersteller_Liste",
        "operator_list",
        vec![entry(
            1,
            &[
                ("operator_name", text("Steel Corp")),
                ("operator_country", text("CN")),
            ],
        )],
    );
    workbook.insert_table(
        "Produktions_Standorte_Liste",
        "installations",
        vec![entry(
            1,
            &[
                ("installation_name", text("Plant A")),
                ("installation_operator_name", text("Steel Corp")),
                ("installation_country", text("CN")),
            ],
        )],
    );
    workbook.insert_table(
        "Angaben_zu_Warenmengen",
        "table_imported_goods",
        goods_entries,
    );
    workbook
}

fn titles(ctx: &RunContext) -> Vec<String> {
    ctx.findings()
        .iter()
        .map(|finding| finding.title.clone())
        .collect()
}

struct ActualData;

impl EmissionSourceResolver for ActualData {
    fn resolve(&self, _source_name: &str, _cn_code: &str) -> cbam_tools::Result<ResolvedSource> {
        Ok(ResolvedSource {
            data: EmissionData {
                direct: DirectEmissions {
                    determination_type: DeterminationType::Actual,
                    reporting_methodology: Some("TOM01".into()),
                    additional_info: None,
                    see: 2.0,
                },
                indirect: IndirectEmissions {
                    determination_type: DeterminationType::Actual,
                    see: Some(99.0),
                    source_of_electricity: Some("SOE01".into()),
                    other_source_indication: None,
                    electricity_consumed: Some(2.0),
                    emission_factor: Some(0.5),
                    source_of_emission_factor: None,
                    source_of_emission_factor_value: None,
                },
            },
            documents: vec![PathBuf::from("ignored.pdf")],
        })
    }
}

#[test]
fn procedures_and_sources_are_merged_per_imported_good() {
    let reference = reference_data();
    let mut ctx = RunContext::new();
    let extracted = workbook(
        "Muster GmbH",
        vec![
            goods(4, "Plant A", 2.5, "40", "00"),
            {
                let mut second = goods(5, "Plant A (Steel Corp)", 3.25, "40", "00");
                second.insert("production_method", text("P02"));
                second
            },
            inward_processing(6, "Steel Corp", 1.0, 0.4, 0.6),
        ],
    );

    let aggregation = Aggregation::collect(&[extracted], &mut ctx).expect("collected");
    assert_eq!(aggregation.groups.len(), 1);
    assert_eq!(aggregation.groups[0].key, "72081000;CN;Muster GmbH");
    assert_eq!(
        aggregation.source_names(),
        vec!["Plant A".to_string(), "Steel Corp".to_string()]
    );

    let plan = EmissionPlan::defaults(&reference);
    let report = aggregation
        .build_report(&plan, reference.declarant_id.clone(), &mut ctx)
        .expect("report built");
    let good = &report.imported_goods[0];

    assert_eq!(good.procedures.len(), 2);
    assert_eq!(good.procedures[0].requested_procedure, "40");
    assert_eq!(good.procedures[0].previous_procedure.as_deref(), Some("00"));
    assert_eq!(good.procedures[0].net_mass, 5.75);
    assert!(good.procedures[1].inward_processing);
    assert_eq!(good.procedures[1].inward_processing_splits.len(), 1);
    assert_eq!(good.total_net_mass, 6.75);
    let procedure_mass: f64 = good.procedures.iter().map(|procedure| procedure.net_mass).sum();
    assert!((procedure_mass - good.total_net_mass).abs() < 1e-9);

    assert_eq!(good.goods_emissions.len(), 2);
    let plant = &good.goods_emissions[0];
    assert_eq!(plant.source_name, "Plant A");
    assert_eq!(plant.net_mass, 5.75);
    assert_eq!(plant.production_methods, vec!["P01".to_string(), "P02".to_string()]);
    assert_eq!(plant.production_method_name, "Warmwalzen");
    assert_eq!(plant.direct.determination_type, DeterminationType::Default);
    assert_eq!(plant.see_direct, 1.5);
    assert_eq!(plant.see_indirect, 0.25);
    assert_eq!(plant.overall_emissions, 10.0625);
    assert!(plant.supporting_documents.is_empty());

    let operator_only = &good.goods_emissions[1];
    assert_eq!(operator_only.source_name, "Steel Corp");
    assert!(operator_only.installation.is_none());
    assert_eq!(operator_only.overall_emissions, 1.75);

    assert_eq!(good.total_emissions, 11.8125);
    assert_eq!(good.emissions_per_unit, 1.75);
    assert_eq!(
        good.id,
        Uuid::new_v5(&Uuid::NAMESPACE_OID, b"72081000;CN;Muster GmbH")
    );

    assert_eq!(report.declarant_id.as_deref(), Some("DE123456789012345"));
    assert_eq!(report.summary.num_imported_goods, 1);
    assert_eq!(report.summary.num_goods_emissions, 2);
    assert_eq!(report.summary.num_operators, 1);
    assert_eq!(report.summary.num_installations, 1);
    assert!(ctx.findings().is_empty(), "{:?}", ctx.findings());
}

#[test]
fn inward_processing_flag_must_agree_with_previous_procedure() {
    let reference = reference_data();
    let mut ctx = RunContext::new();
    let mut contradicting = inward_processing(4, "Plant A", 1.0, 0.5, 0.5);
    contradicting.insert("previous_procedure", text("40"));

    let aggregation =
        Aggregation::collect(&[workbook("Muster GmbH", vec![contradicting])], &mut ctx)
            .expect("collected");
    let error = aggregation
        .build_report(&EmissionPlan::defaults(&reference), None, &mut ctx)
        .expect_err("contradiction");
    assert!(matches!(error, ToolError::Contradiction { .. }));

    let mut unflagged = goods(4, "Plant A", 1.0, "40", "54");
    unflagged.insert("inward_processing", text("0"));
    let aggregation = Aggregation::collect(&[workbook("Muster GmbH", vec![unflagged])], &mut ctx)
        .expect("collected");
    assert!(
        aggregation
            .build_report(&EmissionPlan::defaults(&reference), None, &mut ctx)
            .is_err()
    );
}

#[test]
fn matching_splits_are_merged_and_checked_after_merging() {
    let reference = reference_data();
    let mut ctx = RunContext::new();
    let aggregation = Aggregation::collect(
        &[workbook(
            "Muster GmbH",
            vec![
                inward_processing(4, "Plant A", 1.0, 0.4, 0.6),
                inward_processing(5, "Plant A", 2.0, 1.0, 1.0),
            ],
        )],
        &mut ctx,
    )
    .expect("collected");
    let report = aggregation
        .build_report(&EmissionPlan::defaults(&reference), None, &mut ctx)
        .expect("report built");

    let procedure = &report.imported_goods[0].procedures[0];
    assert_eq!(procedure.net_mass, 3.0);
    assert_eq!(procedure.inward_processing_splits.len(), 1);
    let split = &procedure.inward_processing_splits[0];
    assert!((split.already_processed - 1.4).abs() < 1e-9);
    assert!((split.not_processed - 1.6).abs() < 1e-9);
    assert_eq!(split.member_state_of_authorization.as_deref(), Some("DE"));
    assert_eq!(split.bill_of_discharge_waiver, "0");
    assert!(ctx.findings().is_empty(), "{:?}", ctx.findings());
}

fn round9(value: f64) -> f64 {
    (value * 1e9).round() / 1e9
}

#[test]
fn fractional_procedure_masses_add_up_to_the_good_total() {
    let reference = reference_data();
    let mut ctx = RunContext::new();
    let aggregation = Aggregation::collect(
        &[workbook(
            "Muster GmbH",
            vec![
                goods(4, "Plant A", 0.1, "40", "00"),
                inward_processing(5, "Plant A", 2.5, 1.25, 1.25),
                goods(6, "Plant A", 0.2, "40", "00"),
                inward_processing(7, "Plant A", 3.25, 1.5, 1.75),
                goods(8, "Plant A", 0.7, "40", "00"),
            ],
        )],
        &mut ctx,
    )
    .expect("collected");
    let report = aggregation
        .build_report(&EmissionPlan::defaults(&reference), None, &mut ctx)
        .expect("report built");

    let good = &report.imported_goods[0];
    assert_eq!(good.procedures.len(), 2);
    assert_eq!(round9(good.total_net_mass), 6.75);
    let procedure_mass: f64 = good.procedures.iter().map(|procedure| procedure.net_mass).sum();
    assert_eq!(round9(procedure_mass), round9(good.total_net_mass));

    let released = good
        .procedures
        .iter()
        .find(|procedure| !procedure.inward_processing)
        .expect("release procedure");
    assert_eq!(round9(released.net_mass), 1.0);

    let processed = good
        .procedures
        .iter()
        .find(|procedure| procedure.inward_processing)
        .expect("inward processing procedure");
    assert_eq!(processed.net_mass, 5.75);
    assert_eq!(processed.inward_processing_splits.len(), 1);
    let split = &processed.inward_processing_splits[0];
    assert_eq!(split.already_processed, 2.75);
    assert_eq!(split.not_processed, 3.0);
    assert_eq!(split.already_processed + split.not_processed, processed.net_mass);

    assert_eq!(good.goods_emissions.len(), 1);
    assert_eq!(round9(good.goods_emissions[0].net_mass), 6.75);
    assert!(
        !titles(&ctx)
            .iter()
            .any(|title| title == "inward processing masses do not add up")
    );
}

#[test]
fn split_mass_drift_is_reported_not_fatal() {
    let reference = reference_data();
    let mut ctx = RunContext::new();
    let aggregation = Aggregation::collect(
        &[workbook(
            "Muster GmbH",
            vec![inward_processing(4, "Plant A", 1.0, 0.4, 0.5)],
        )],
        &mut ctx,
    )
    .expect("collected");
    aggregation
        .build_report(&EmissionPlan::defaults(&reference), None, &mut ctx)
        .expect("report built");

    let drift = titles(&ctx)
        .into_iter()
        .filter(|title| title == "inward processing masses do not add up")
        .count();
    assert_eq!(drift, 2);
}

#[test]
fn identities_resolve_installation_then_operator_then_stripped_name() {
    let operators = vec![Operator {
        name: "Steel Corp".into(),
        country: Some("CN".into()),
        fields: Default::default(),
    }];
    let installations = vec![
        Installation {
            name: "Plant A".into(),
            operator_name: "Steel Corp".into(),
            country: Some("IN".into()),
            fields: Default::default(),
        },
        Installation {
            name: "Orphan Plant".into(),
            operator_name: "Unknown Corp".into(),
            country: None,
            fields: Default::default(),
        },
    ];

    let (operator, installation) =
        resolve_identity("Plant A", &operators, &installations).expect("installation");
    assert_eq!(operator.name, "Steel Corp");
    assert_eq!(installation.expect("installation").name, "Plant A");

    let (operator, installation) =
        resolve_identity("Steel Corp", &operators, &installations).expect("operator");
    assert_eq!(operator.name, "Steel Corp");
    assert!(installation.is_none());

    let (_, installation) = resolve_identity("Plant A (Steel Corp)", &operators, &installations)
        .expect("stripped name");
    assert_eq!(installation.expect("installation").name, "Plant A");

    assert!(matches!(
        resolve_identity("Nobody", &operators, &installations),
        Err(ToolError::Identity { .. })
    ));
    assert!(matches!(
        resolve_identity("Orphan Plant", &operators, &installations),
        Err(ToolError::Identity { .. })
    ));
}

#[test]
fn duplicate_names_are_contradictions() {
    let mut ctx = RunContext::new();
    let mut duplicated = workbook("Muster GmbH", Vec::new());
    duplicated.insert_table(
        "Ihre_Hersteller_Liste",
        "operator_list",
        vec![
            entry(1, &[("operator_name", text("Steel Corp"))]),
            entry(2, &[("operator_name", text("Steel Corp"))]),
        ],
    );
    assert!(matches!(
        Aggregation::collect(&[duplicated], &mut ctx),
        Err(ToolError::Contradiction { .. })
    ));

    let mut shadowing = workbook("Muster GmbH", Vec::new());
    shadowing.insert_table(
        "Produktions_Standorte_Liste",
        "installations",
        vec![entry(
            1,
            &[
                ("installation_name", text("Steel Corp")),
                ("installation_operator_name", text("Steel Corp")),
            ],
        )],
    );
    assert!(matches!(
        Aggregation::collect(&[shadowing], &mut ctx),
        Err(ToolError::Contradiction { .. })
    ));
}

#[test]
fn unknown_goods_source_is_an_identity_error() {
    let mut ctx = RunContext::new();
    let error = Aggregation::collect(
        &[workbook("Muster GmbH", vec![goods(4, "Somebody Else", 1.0, "40", "00")])],
        &mut ctx,
    )
    .expect_err("unresolved source");
    match error {
        ToolError::Identity { name, context } => {
            assert_eq!(name, "Somebody Else");
            assert!(context.contains("B5"), "{context}");
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn zero_mass_and_implausible_values_leave_findings() {
    let reference = reference_data();
    let mut ctx = RunContext::new();
    let mut implausible = goods(5, "Plant A", 2.0, "40", "00");
    implausible.insert("cn_code", text("72082000"));
    let aggregation = Aggregation::collect(
        &[workbook(
            "Muster GmbH",
            vec![goods(4, "Plant A", 0.0, "40", "00"), implausible],
        )],
        &mut ctx,
    )
    .expect("collected");
    let report = aggregation
        .build_report(&EmissionPlan::defaults(&reference), None, &mut ctx)
        .expect("report built");

    assert_eq!(report.imported_goods[0].emissions_per_unit, 0.0);
    assert_eq!(report.imported_goods[1].total_emissions, 81.0);
    let titles = titles(&ctx);
    assert!(titles.contains(&"imported good without net mass".to_string()));
    assert!(titles.contains(&"implausible specific embedded emissions".to_string()));
}

#[test]
fn emission_factor_overrides_declared_indirect_value() {
    let mut ctx = RunContext::new();
    let aggregation = Aggregation::collect(
        &[workbook("Muster GmbH", vec![goods(4, "Plant A", 1.5, "40", "00")])],
        &mut ctx,
    )
    .expect("collected");
    let report = aggregation
        .build_report(&ActualData, None, &mut ctx)
        .expect("report built");

    let emission = &report.imported_goods[0].goods_emissions[0];
    assert_eq!(emission.see_direct, 2.0);
    assert_eq!(emission.see_indirect, 1.0);
    assert_eq!(
        emission.overall_emissions,
        emission.net_mass * (emission.see_direct + emission.see_indirect)
    );
    assert_eq!(emission.overall_emissions, 4.5);
    assert!(emission.supporting_documents.is_empty());
}

#[test]
fn zero_reports_attach_documents_with_unique_names() {
    let reference = reference_data();
    let mut ctx = RunContext::new();
    let plan = EmissionPlan::zero_report(
        &reference,
        None,
        vec![PathBuf::from("docs/evidence.pdf"), PathBuf::from("docs/notes.xyz")],
    );
    let aggregation = Aggregation::collect(
        &[workbook(
            "Muster GmbH",
            vec![
                goods(4, "Plant A", 1.0, "40", "00"),
                goods(5, "Steel Corp", 1.0, "40", "00"),
            ],
        )],
        &mut ctx,
    )
    .expect("collected");
    let report = aggregation
        .build_report(&plan, None, &mut ctx)
        .expect("report built");

    let emissions = &report.imported_goods[0].goods_emissions;
    assert_eq!(emissions.len(), 2);
    assert_eq!(emissions[0].direct.determination_type, DeterminationType::Estimated);
    assert_eq!(emissions[0].overall_emissions, 0.0);
    assert!(
        emissions[0]
            .direct
            .additional_info
            .as_deref()
            .is_some_and(|info| info.contains("evidence.pdf"))
    );

    let first = &emissions[0].supporting_documents;
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].attachment.filename, "evidence_1.pdf");
    assert_eq!(first[0].attachment.mime.as_deref(), Some("application/pdf"));
    assert_eq!(first[0].sequence_number, 1);
    assert_eq!(first[1].reference_number, 1);
    assert!(first[1].attachment.mime.is_none());
    assert_eq!(
        emissions[1].supporting_documents[0].attachment.filename,
        "evidence_2.pdf"
    );
    assert!(titles(&ctx).contains(&"unknown attachment type".to_string()));
}

#[test]
fn per_source_plans_only_know_their_sources() {
    let reference = reference_data();
    let mut plan = EmissionPlan::per_source(&reference);
    plan.insert("Plant A", SourcePlan::Default);

    let resolved = plan.resolve("Plant A", "72081000").expect("planned source");
    assert_eq!(resolved.data.direct.see, 1.5);
    assert!(matches!(
        plan.resolve("Plant A", "99999999"),
        Err(ToolError::MissingEmissionData { .. })
    ));
    assert!(matches!(
        plan.resolve("Plant B", "72081000"),
        Err(ToolError::Identity { .. })
    ));
}

#[test]
fn too_many_procedures_are_reported() {
    let reference = reference_data();
    let mut ctx = RunContext::new();
    let entries = (0..10)
        .map(|index| goods(4 + index, "Plant A", 1.0, &format!("4{index}"), "00"))
        .collect();
    let aggregation = Aggregation::collect(&[workbook("Muster GmbH", entries)], &mut ctx)
        .expect("collected");
    let report = aggregation
        .build_report(&EmissionPlan::defaults(&reference), None, &mut ctx)
        .expect("report built");

    assert_eq!(report.imported_goods[0].procedures.len(), 10);
    assert!(titles(&ctx).contains(&"too many customs procedures".to_string()));
}

#[test]
fn cohort_groups_goods_per_importer() {
    let mut ctx = RunContext::new();
    let master = workbook("Vertreter AG", Vec::new());
    let first = workbook("Muster GmbH", vec![goods(4, "Plant A", 1.0, "40", "00")]);
    let mut second = workbook("Beispiel KG", vec![goods(4, "Plant A", 2.0, "40", "00")]);
    second.insert_table(
        "Ihre_Hersteller_Liste",
        "operator_list",
        vec![entry(
            1,
            &[
                ("operator_name", text("Steel Corp")),
                ("operator_country", text("IN")),
            ],
        )],
    );

    let aggregation =
        Aggregation::collect(&[master, first, second], &mut ctx).expect("collected");
    assert_eq!(aggregation.general_info.importer.name, "Vertreter AG");
    assert_eq!(aggregation.general_info.period(), "Q3-2024");
    assert_eq!(aggregation.operators.len(), 1);
    assert_eq!(aggregation.operators[0].country.as_deref(), Some("IN"));
    let keys: Vec<&str> = aggregation
        .groups
        .iter()
        .map(|group| group.key.as_str())
        .collect();
    assert_eq!(
        keys,
        vec!["72081000;CN;Muster GmbH", "72081000;CN;Beispiel KG"]
    );
}
