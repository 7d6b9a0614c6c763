use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::cbam::tools::model::ScalarValue;

/// Structural rule attached to a validation type name.
#[derive(Debug)]
pub enum Rule {
    /// Value must be numeric.
    Number,
    /// Any text is accepted.
    Text,
    /// Text matching the expression.
    Pattern(Regex),
}

impl Rule {
    pub fn accepts(&self, value: &ScalarValue) -> bool {
        match (self, value) {
            (Rule::Number, ScalarValue::Number(number)) => number.is_finite(),
            (Rule::Text, ScalarValue::String(_)) => true,
            (Rule::Pattern(regex), ScalarValue::String(text)) => regex.is_match(text),
            _ => false,
        }
    }

    pub fn is_textual(&self) -> bool {
        !matches!(self, Rule::Number)
    }
}

const PATTERNS: &[(&str, &str)] = &[
    ("cn_code", r"^[0-9]{8}$"),
    ("cell_index", r"^[A-Z]+[0-9]+$"),
    ("version", r"^[0-9]+(\.[0-9]+)*$"),
    (
        "eori",
        r"^(DE[0-9]{7}|DE[0-9]{15}|ATEOS[0-9]{8,12}|PL[0-9]{14}Z?|RO[A-Z0-9]{2,15}|FR[0-9]{14})$",
    ),
    ("mail_adress", r"^[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+(\.[a-zA-Z0-9-]+)+$"),
    ("country_code", r"^[A-Z]{2}$"),
    ("year", r"^[0-9]{4}$"),
    ("quarter", r"^[1-4]$"),
    ("production_method", r"^P\d{2}( - .*)?$"),
    ("boolean", r"^[01]$"),
    ("inward_processing", r"^[01]$"),
    ("date_str8", r"^[0-9]{8}$"),
    (
        "date_str_xlsx",
        r"^[0-9]{4}-[0-9]{2}-[0-9]{2} [0-9]{2}:[0-9]{2}:[0-9]{2}$",
    ),
    ("customs_procedure_code", r"^\d{2}$"),
];

const NUMERIC: &[&str] = &["float", "net_mass"];

const FREE_TEXT: &[&str] = &[
    "string",
    "country",
    "good_quantity_unit",
    "customs_procedure_desc",
];

static REGISTRY: LazyLock<HashMap<&'static str, Rule>> = LazyLock::new(|| {
    let mut rules = HashMap::new();
    for name in NUMERIC {
        rules.insert(*name, Rule::Number);
    }
    for name in FREE_TEXT {
        rules.insert(*name, Rule::Text);
    }
    for (name, pattern) in PATTERNS {
        let regex = Regex::new(pattern).expect("built-in validation pattern compiles");
        rules.insert(*name, Rule::Pattern(regex));
    }
    rules
});

/// Rule registered for a type name, if any.
pub fn rule(type_name: &str) -> Option<&'static Rule> {
    REGISTRY.get(type_name)
}

/// Checks a value against its type. `None` means the type is not registered.
pub fn check(type_name: &str, value: &ScalarValue) -> Option<bool> {
    rule(type_name).map(|rule| rule.accepts(value))
}
