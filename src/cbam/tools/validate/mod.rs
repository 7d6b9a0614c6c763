//! Per-field normalization and validation.
//!
//! Every extracted value runs through four stages: type specific coercion,
//! requirement policy, semantic normalization, and the structural rule from
//! the [`registry`].

use std::cell::Cell;

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::cbam::tools::error::{Result, ToolError};
use crate::cbam::tools::io::excel_read::SPREADSHEET_DATETIME_FORMAT;
use crate::cbam::tools::layout::{ConditionOutcome, FieldType, Requirement};
use crate::cbam::tools::model::{RawEntry, ScalarValue};

pub mod country;
pub mod registry;

pub use country::{Country, CountryTable};

/// Sibling field that carries the unit of `net_mass`.
pub const NET_MASS_UNIT_FIELD: &str = "net_mass_unit";

const TON_UNITS: &[&str] = &["t", "tonnes", "tonnen", "tons"];

/// Rounds half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Whether requirement and lookup failures abort or only mark the value invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Strict,
    Muted,
}

/// Normalized value and its structural validity.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub value: ScalarValue,
    pub valid: bool,
}

impl Normalized {
    fn valid(value: ScalarValue) -> Self {
        Self { value, valid: true }
    }

    fn invalid(value: ScalarValue) -> Self {
        Self {
            value,
            valid: false,
        }
    }
}

pub struct Normalizer<'a> {
    countries: &'a CountryTable,
    empty_inward_processing_reported: Cell<bool>,
}

impl<'a> Normalizer<'a> {
    pub fn new(countries: &'a CountryTable) -> Self {
        Self {
            countries,
            empty_inward_processing_reported: Cell::new(false),
        }
    }

    /// Normalizes `input` for a field of type `field_type`.
    ///
    /// `entry` holds the siblings extracted so far; conditions and the net
    /// mass unit are read from it. In [`Mode::Strict`] requirement and lookup
    /// failures are returned as errors, in [`Mode::Muted`] they yield an
    /// invalid result that keeps the un-normalized value.
    pub fn normalize(
        &self,
        field_type: &FieldType,
        input: ScalarValue,
        entry: &RawEntry,
        mode: Mode,
    ) -> Result<Normalized> {
        let (type_name, value) = self.pre_process(&field_type.name, input);

        if value.is_empty() {
            if !field_type.is_mandatory() {
                return Ok(Normalized::valid(value));
            }
            return fail(
                mode,
                ScalarValue::Null,
                format!("mandatory field of type '{field_type}' is empty"),
            );
        }

        if let Requirement::Conditional(condition) = &field_type.requirement {
            match condition.evaluate(entry) {
                ConditionOutcome::Met => {}
                ConditionOutcome::Unmet => {
                    return fail(
                        mode,
                        value,
                        format!("condition not met for conditional field of type '{field_type}'"),
                    );
                }
                ConditionOutcome::MissingField(field) => {
                    return fail(
                        mode,
                        value,
                        format!("condition field '{field}' not found in entry"),
                    );
                }
            }
        }

        let original = value.clone();
        let value = match self.process(type_name, value, entry) {
            Ok(value) => value,
            Err(error) if mode == Mode::Muted => {
                debug!(%error, "normalization failed");
                return Ok(Normalized::invalid(original));
            }
            Err(error) => return Err(error),
        };

        let valid = match registry::check(type_name, &value) {
            Some(valid) => valid,
            None => {
                warn!(type_name, "unknown validation type, value accepted");
                true
            }
        };
        if !valid {
            debug!(type_name, value = %value.to_text(), "value fails structural rule");
        }
        Ok(Normalized { value, valid })
    }

    /// Type specific coercion before the requirement policy applies.
    ///
    /// Returns the effective type name: a descriptive customs procedure
    /// becomes a two-digit procedure code here.
    fn pre_process<'t>(&self, type_name: &'t str, input: ScalarValue) -> (&'t str, ScalarValue) {
        let textual = registry::rule(type_name).is_some_and(registry::Rule::is_textual);
        let input = match input {
            ScalarValue::Number(_) | ScalarValue::Boolean(_) if textual => {
                ScalarValue::String(input.to_text())
            }
            other => other,
        };

        match type_name {
            "customs_procedure_desc" => {
                let text = input.to_text();
                let text = text.trim();
                if text == "0" || text == "-" {
                    return (type_name, ScalarValue::Null);
                }
                let code: String = text.chars().take(2).collect();
                ("customs_procedure_code", ScalarValue::String(code))
            }
            "boolean" => (type_name, yes_no(input)),
            "inward_processing" => {
                if input.is_empty() {
                    if !self.empty_inward_processing_reported.replace(true) {
                        warn!("empty inward processing field defaults to 'no'");
                    }
                    return (type_name, ScalarValue::String("0".into()));
                }
                (type_name, yes_no(input))
            }
            "eori" => match input {
                ScalarValue::String(text) => (
                    type_name,
                    ScalarValue::String(text.replace([' ', '\u{a0}'], "")),
                ),
                other => (type_name, other),
            },
            _ => (type_name, input),
        }
    }

    /// Semantic normalization of a non-empty value.
    fn process(&self, type_name: &str, value: ScalarValue, entry: &RawEntry) -> Result<ScalarValue> {
        let value = match value {
            ScalarValue::String(text) => ScalarValue::String(clean_text(&text)),
            other => other,
        };

        match type_name {
            "country" => {
                let query = value.to_text();
                let country = self.countries.find(&query).ok_or_else(|| {
                    ToolError::validation(format!("country '{query}' not found"))
                })?;
                Ok(ScalarValue::String(country.code.clone()))
            }
            "date_str8" => {
                let text = value.to_text();
                match NaiveDateTime::parse_from_str(&text, SPREADSHEET_DATETIME_FORMAT) {
                    Ok(moment) => Ok(ScalarValue::String(moment.format("%Y%m%d").to_string())),
                    Err(_) => Ok(value),
                }
            }
            "float" => Ok(parse_number(value)),
            "net_mass" => {
                let value = parse_number(value);
                let Some(mass) = value.as_number() else {
                    return Ok(value);
                };
                let unit = entry.text(NET_MASS_UNIT_FIELD).ok_or_else(|| {
                    ToolError::validation(format!(
                        "no '{NET_MASS_UNIT_FIELD}' before net mass, it must be extracted first"
                    ))
                })?;
                let unit = unit.trim().to_lowercase();
                let tons = if unit == "kg" {
                    mass / 1000.0
                } else if TON_UNITS.contains(&unit.as_str()) {
                    mass
                } else {
                    return Err(ToolError::validation(format!(
                        "unknown unit '{unit}' for net mass"
                    )));
                };
                Ok(ScalarValue::Number(round_to(tons, 6)))
            }
            _ => Ok(value),
        }
    }
}

fn fail(mode: Mode, value: ScalarValue, message: String) -> Result<Normalized> {
    match mode {
        Mode::Strict => Err(ToolError::validation(message)),
        Mode::Muted => {
            debug!(%message, "muted validation failure");
            Ok(Normalized::invalid(value))
        }
    }
}

fn yes_no(input: ScalarValue) -> ScalarValue {
    let text = input.to_text();
    match text.trim().to_lowercase().as_str() {
        "ja" | "yes" | "true" | "1" => ScalarValue::String("1".into()),
        "nein" | "no" | "false" | "0" => ScalarValue::String("0".into()),
        "" => ScalarValue::Null,
        _ => input,
    }
}

fn clean_text(text: &str) -> String {
    text.trim()
        .chars()
        .filter(|c| *c != '\u{a0}' && !c.is_control())
        .collect()
}

fn parse_number(value: ScalarValue) -> ScalarValue {
    match value {
        ScalarValue::String(text) => {
            let cleaned = text.replace(' ', "").replace(',', ".");
            match cleaned.parse::<f64>() {
                Ok(number) => ScalarValue::Number(number),
                Err(_) => {
                    warn!(value = %text, "invalid number format");
                    ScalarValue::String(text)
                }
            }
        }
        other => other,
    }
}
