use std::cmp::Ordering;
use std::fmt;

use serde::Deserialize;
use tracing::warn;

use crate::cbam::tools::error::{Result, ToolError};
use crate::cbam::tools::model::{RawEntry, ScalarValue};

/// A validation type name together with its requirement policy.
///
/// Layout documents spell this as `<type>_m`, `<type>_c`, or `<type>_o`; the
/// suffix is decoded once when the layout is loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldType {
    pub name: String,
    pub requirement: Requirement,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Requirement {
    Mandatory,
    Conditional(Condition),
    Optional,
}

impl FieldType {
    pub fn mandatory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requirement: Requirement::Mandatory,
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requirement: Requirement::Optional,
        }
    }

    /// Decodes a suffixed tag. A bare type name is optional; a conditional tag
    /// without a condition degrades to optional with a warning.
    pub fn decode(tag: &str, condition: Option<Condition>) -> Self {
        let tag = tag.trim();
        if let Some(name) = tag.strip_suffix("_m") {
            return Self::mandatory(name);
        }
        if let Some(name) = tag.strip_suffix("_c") {
            return match condition {
                Some(condition) => Self {
                    name: name.to_string(),
                    requirement: Requirement::Conditional(condition),
                },
                None => {
                    warn!(type_tag = tag, "conditional type without condition, treated as optional");
                    Self::optional(name)
                }
            };
        }
        Self::optional(tag.strip_suffix("_o").unwrap_or(tag))
    }

    pub fn is_mandatory(&self) -> bool {
        matches!(self.requirement, Requirement::Mandatory)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = match self.requirement {
            Requirement::Mandatory => "_m",
            Requirement::Conditional(_) => "_c",
            Requirement::Optional => "_o",
        };
        write!(f, "{}{}", self.name, suffix)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl Operator {
    fn parse(symbol: &str) -> Result<Self> {
        Ok(match symbol.trim() {
            "==" => Operator::Eq,
            "!=" => Operator::Ne,
            "<" => Operator::Lt,
            ">" => Operator::Gt,
            "<=" => Operator::Le,
            ">=" => Operator::Ge,
            other => {
                return Err(ToolError::Layout(format!(
                    "unknown condition operator '{other}'"
                )));
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub field: String,
    pub operator: Operator,
    pub value: ScalarValue,
}

/// Boolean expression over sibling fields of the same entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub combinator: Combinator,
    pub clauses: Vec<Clause>,
}

/// Outcome of evaluating a condition against a partially built entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionOutcome {
    Met,
    Unmet,
    /// A referenced sibling field has not been extracted.
    MissingField(String),
}

impl Condition {
    pub fn evaluate(&self, entry: &RawEntry) -> ConditionOutcome {
        if let Some(missing) = self
            .clauses
            .iter()
            .find(|clause| entry.get(&clause.field).is_none())
        {
            return ConditionOutcome::MissingField(missing.field.clone());
        }
        let mut results = self.clauses.iter().map(|clause| {
            entry
                .get(&clause.field)
                .is_some_and(|actual| compare(actual, clause.operator, &clause.value))
        });
        let met = match self.combinator {
            Combinator::And => results.all(|hit| hit),
            Combinator::Or => results.any(|hit| hit),
        };
        if met {
            ConditionOutcome::Met
        } else {
            ConditionOutcome::Unmet
        }
    }
}

fn compare(actual: &ScalarValue, operator: Operator, expected: &ScalarValue) -> bool {
    let ordering = match (actual, expected) {
        (ScalarValue::Number(lhs), ScalarValue::Number(rhs)) => lhs.partial_cmp(rhs),
        (ScalarValue::Null, ScalarValue::Null) => Some(Ordering::Equal),
        _ => {
            let (lhs, rhs) = (actual.to_text(), expected.to_text());
            match (lhs.parse::<f64>(), rhs.parse::<f64>()) {
                (Ok(lhs), Ok(rhs)) if operator != Operator::Eq && operator != Operator::Ne => {
                    lhs.partial_cmp(&rhs)
                }
                _ => Some(lhs.cmp(&rhs)),
            }
        }
    };
    let Some(ordering) = ordering else {
        return false;
    };
    match operator {
        Operator::Eq => ordering == Ordering::Equal,
        Operator::Ne => ordering != Ordering::Equal,
        Operator::Lt => ordering == Ordering::Less,
        Operator::Gt => ordering == Ordering::Greater,
        Operator::Le => ordering != Ordering::Greater,
        Operator::Ge => ordering != Ordering::Less,
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawCondition {
    #[serde(default)]
    con_type: Option<String>,
    #[serde(default)]
    ls: Vec<RawClause>,
}

#[derive(Debug, Deserialize)]
struct RawClause {
    field: String,
    operator: String,
    #[serde(default)]
    value: serde_yaml::Value,
}

impl RawCondition {
    pub(crate) fn decode(self) -> Result<Condition> {
        let combinator = match self.con_type.as_deref().map(str::trim) {
            None | Some("and") => Combinator::And,
            Some("or") => Combinator::Or,
            Some(other) => {
                return Err(ToolError::Layout(format!(
                    "unknown condition combinator '{other}'"
                )));
            }
        };
        let clauses = self
            .ls
            .into_iter()
            .map(|clause| {
                Ok(Clause {
                    field: clause.field,
                    operator: Operator::parse(&clause.operator)?,
                    value: yaml_to_scalar(&clause.value),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Condition {
            combinator,
            clauses,
        })
    }
}

fn yaml_to_scalar(value: &serde_yaml::Value) -> ScalarValue {
    match value {
        serde_yaml::Value::Null => ScalarValue::Null,
        serde_yaml::Value::Bool(flag) => ScalarValue::Boolean(*flag),
        serde_yaml::Value::Number(number) => number
            .as_f64()
            .map(ScalarValue::Number)
            .unwrap_or(ScalarValue::Null),
        serde_yaml::Value::String(text) => ScalarValue::String(text.clone()),
        other => ScalarValue::String(serde_yaml::to_string(other).unwrap_or_default()),
    }
}
