#![allow(dead_code)]

use std::path::Path;

use cbam_tools::io::{Grid, Workbook};
use cbam_tools::model::ScalarValue;
use cbam_tools::reference::{CommodityDefaults, ReferenceData};
use cbam_tools::validate::{Country, CountryTable};

pub const LAYOUT_YAML: &str = r#"
base:
  sheets:
    - code_sheet_name: Allgemeine_Informationen
      alias_sheet_name: [Allgemeine Informationen, Allgemeines]
      tables:
        - table_name: general_information
          orientation: horizontal
          upper_left: auto:Name des Importeurs
          num_entries: 1
          fields:
            - code_field_name: importer_name
              alias_field_name: Name des Importeurs
              type: string_m
              primary_key: true
            - code_field_name: importer_eori
              alias_field_name: EORI-Nummer
              type: eori_o
            - code_field_name: importer_country
              alias_field_name: Land des Importeurs
              type: country_m
            - code_field_name: importer_city
              alias_field_name: Stadt
              type: string_o
              required: false
        - table_name: quarter
          orientation: horizontal
          upper_left: auto:Berichtsjahr
          num_entries: 1
          fields:
            - code_field_name: year
              alias_field_name: Berichtsjahr
              type: year_m
              primary_key: true
            - code_field_name: quarter
              alias_field_name: Quartal
              type: quarter_m
    - code_sheet_name: Ihre_Hersteller_Liste
      alias_sheet_name: Ihre Hersteller Liste
      tables:
        - table_name: operator_list
          orientation: vertical
          upper_left: auto:Name des Herstellers
          num_entries: 20
          fields:
            - code_field_name: operator_name
              alias_field_name: Name des Herstellers
              type: string_m
              primary_key: true
            - code_field_name: operator_country
              alias_field_name: Land des Herstellers
              type: country_m
    - code_sheet_name: Produktions_Standorte_Liste
      alias_sheet_name: Produktions Standorte Liste
      tables:
        - table_name: installations
          orientation: vertical
          upper_left: auto:Name des Standorts
          num_entries: 20
          fields:
            - code_field_name: installation_name
              alias_field_name: Name des Standorts
              type: string_m
              primary_key: true
            - code_field_name: installation_operator_name
              alias_field_name: Betreiber
              type: string_m
            - code_field_name: installation_country
              alias_field_name: Land des Standorts
              type: country_m
    - code_sheet_name: Angaben_zu_Warenmengen
      alias_sheet_name: Angaben zu Warenmengen
      tables:
        - table_name: table_imported_goods
          orientation: vertical
          upper_left: [auto:KN-Code, auto:CN Code]
          num_entries: "1.000"
          num_examples: 1
          fields:
            - code_field_name: cn_code
              alias_field_name: [KN-Code, CN Code]
              type: cn_code_m
              primary_key: true
            - code_field_name: operator_or_installation
              alias_field_name: Hersteller oder Standort
              type: string_m
            - code_field_name: country_of_origin
              alias_field_name: Ursprungsland
              type: country_o
            - code_field_name: net_mass_unit
              alias_field_name: Einheit
              type: good_quantity_unit_m
            - code_field_name: net_mass
              alias_field_name: Nettomasse
              type: net_mass_m
            - code_field_name: requested_procedure
              alias_field_name: Beantragtes Verfahren
              type: customs_procedure_desc_m
            - code_field_name: previous_procedure
              alias_field_name: Vorangegangenes Verfahren
              type: customs_procedure_desc_o
            - code_field_name: production_method
              alias_field_name: Herstellungsverfahren
              type: production_method_o
              required: false
            - code_field_name: inward_processing
              alias_field_name: Ursprünglich zur Veredelung importiert
              type: inward_processing_o
              required: false
            - code_field_name: member_state_of_authorization
              alias_field_name: Zulassungsstaat
              type: country_code_c
              required: false
              condition:
                con_type: and
                ls:
                  - field: inward_processing
                    operator: "=="
                    value: "1"
            - code_field_name: already_processed
              alias_field_name: Bereits veredelt
              type: float_c
              required: false
              condition:
                ls:
                  - field: inward_processing
                    operator: "=="
                    value: "1"
            - code_field_name: not_processed
              alias_field_name: Menge noch nicht veredelter Ware...
              type: float_c
              required: false
              condition:
                ls:
                  - field: inward_processing
                    operator: "=="
                    value: "1"
version_1_7_2: {}
version_1_7:
  sheets:
    - code_sheet_name: Angaben_zu_Warenmengen
      alias_sheet_name: Angaben zu Warenmengen
      tables:
        - table_name: table_imported_goods
          orientation: vertical
          upper_left: auto:KN-Code
          num_entries: 200
          num_examples: 1
          fields:
            - code_field_name: cn_code
              alias_field_name: KN-Code
              type: cn_code_m
              primary_key: true
            - code_field_name: operator_or_installation
              alias_field_name: Hersteller oder Standort
              type: string_m
            - code_field_name: net_mass_unit
              alias_field_name: Einheit
              type: good_quantity_unit_m
            - code_field_name: net_mass
              alias_field_name: Nettomasse
              type: net_mass_m
            - code_field_name: requested_procedure
              alias_field_name: Beantragtes Verfahren
              type: customs_procedure_desc_m
"#;

pub const GOODS_HEADERS: [&str; 12] = [
    "KN-Code",
    "Hersteller oder Standort",
    "Ursprungsland",
    "Einheit",
    "Nettomasse",
    "Beantragtes Verfahren",
    "Vorangegangenes Verfahren",
    "Herstellungsverfahren",
    "Ursprünglich zur Veredelung importiert",
    "Zulassungsstaat",
    "Bereits veredelt",
    "Menge noch nicht veredelter Ware (t)",
];

pub fn text(value: &str) -> ScalarValue {
    ScalarValue::from(value)
}

pub fn number(value: f64) -> ScalarValue {
    ScalarValue::from(value)
}

pub fn countries() -> CountryTable {
    let mut table = CountryTable::new();
    for (code, english, local) in [
        ("CN", "China", "Zhongguo"),
        ("DE", "Germany", "Deutschland"),
        ("IN", "India", "Bharat"),
    ] {
        table.insert(Country {
            code: code.into(),
            english_name: english.into(),
            local_name: local.into(),
            aliases: Vec::new(),
        });
    }
    table
}

pub fn reference_data() -> ReferenceData {
    ReferenceData::new(
        Some("DE123456789012345".into()),
        [
            CommodityDefaults {
                cn_code: "72081000".into(),
                see_direct: 1.5,
                see_indirect: 0.25,
                description: "Flachgewalzte Erzeugnisse".into(),
                production_methods: vec!["P01 - Warmwalzen".into()],
            },
            CommodityDefaults {
                cn_code: "72082000".into(),
                see_direct: 40.0,
                see_indirect: 0.5,
                description: "Flacherzeugnisse".into(),
                production_methods: vec!["P01".into()],
            },
        ],
        countries(),
    )
}

/// Goods sheet with the header row at row 2 and one example row below it.
pub fn goods_grid(name: &str, rows: Vec<Vec<ScalarValue>>) -> Grid {
    let mut grid_rows = vec![
        vec![text("Angaben zu Warenmengen")],
        Vec::new(),
        std::iter::once(ScalarValue::Null)
            .chain(GOODS_HEADERS.iter().map(|header| text(header)))
            .collect(),
        vec![
            ScalarValue::Null,
            text("12345678"),
            text("Beispiel"),
            text("China"),
            text("kg"),
            number(1.0),
            text("40"),
        ],
    ];
    for row in rows {
        grid_rows.push(std::iter::once(ScalarValue::Null).chain(row).collect());
    }
    Grid::from_rows(name, grid_rows)
}

pub fn general_grid(importer: &str, year: f64, quarter: f64) -> Grid {
    Grid::from_rows(
        "Allgemeine Informationen",
        vec![
            vec![text("Allgemeine Informationen")],
            Vec::new(),
            vec![text("Name des Importeurs"), text(importer)],
            vec![text("EORI-Nummer"), text("DE 1234567")],
            vec![text("Land des Importeurs"), text("Germany")],
            vec![text("Stadt"), text("Hamburg")],
            Vec::new(),
            vec![text("Berichtsjahr"), number(year)],
            vec![text("Quartal"), number(quarter)],
        ],
    )
}

pub fn operator_grid(operators: &[(&str, &str)]) -> Grid {
    let mut rows = vec![vec![text("Name des Herstellers"), text("Land des Herstellers")]];
    for (name, country) in operators {
        rows.push(vec![text(name), text(country)]);
    }
    Grid::from_rows("Ihre Hersteller Liste", rows)
}

pub fn installation_grid(installations: &[(&str, &str, &str)]) -> Grid {
    let mut rows = vec![vec![
        text("Name des Standorts"),
        text("Betreiber"),
        text("Land des Standorts"),
    ]];
    for (name, operator, country) in installations {
        rows.push(vec![text(name), text(operator), text(country)]);
    }
    Grid::from_rows("Produktions Standorte Liste", rows)
}

pub fn specification_grid(version: &str) -> Grid {
    Grid::from_rows(
        "Specification",
        vec![vec![text("Version"), text(version)]],
    )
}

/// Customer workbook with one operator, one installation, and the given goods.
pub fn customer_workbook(importer: &str, goods: Vec<Vec<ScalarValue>>) -> Workbook {
    Workbook::new(vec![
        specification_grid("1.7.2"),
        general_grid(importer, 2024.0, 3.0),
        operator_grid(&[("Steel Corp", "China")]),
        installation_grid(&[("Plant A", "Steel Corp", "China")]),
        goods_grid("Angaben zu Warenmengen", goods),
    ])
}

/// Goods row in [`GOODS_HEADERS`] order without inward processing.
pub fn goods_row(cn_code: &str, source: &str, mass_kg: f64, requested: &str) -> Vec<ScalarValue> {
    vec![
        text(cn_code),
        text(source),
        text("China"),
        text("kg"),
        number(mass_kg),
        text(requested),
        text("00"),
        text("P01 - Warmwalzen"),
        text("nein"),
    ]
}

/// Writes a grid based workbook as `.xlsx` so it can be read back from disk.
pub fn write_xlsx(path: &Path, workbook: &Workbook) {
    let mut book = rust_xlsxwriter::Workbook::new();
    for grid in workbook.sheets() {
        let sheet = book.add_worksheet();
        sheet.set_name(grid.name()).expect("sheet name");
        for (cell, value) in grid.cells() {
            let (row, col) = (cell.row, cell.col as u16);
            match value {
                ScalarValue::String(text) => {
                    sheet.write_string(row, col, text).expect("string cell");
                }
                ScalarValue::Number(number) => {
                    sheet.write_number(row, col, *number).expect("number cell");
                }
                ScalarValue::Boolean(flag) => {
                    sheet.write_boolean(row, col, *flag).expect("boolean cell");
                }
                ScalarValue::Null => {}
            }
        }
    }
    book.save(path).expect("workbook saved");
}
