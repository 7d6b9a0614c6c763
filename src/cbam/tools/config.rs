//! Run configuration loaded from YAML.
//!
//! A top-level `paths` mapping defines substitutions: every string in the
//! document may refer to an entry as `${name}` or `$name`. Unknown names are
//! left untouched.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::de::{Error as _, IntoDeserializer};
use serde::{Deserialize, Deserializer};
use serde_yaml::Value;
use tracing::{debug, info, warn};

use crate::cbam::tools::error::{Result, ToolError};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))")
        .expect("placeholder pattern compiles")
});

/// How emission figures are determined for a whole reporting period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeterminationApproach {
    DefaultValues,
    ZeroReportWithDefaultDocs,
    ZeroReportWithoutDocs,
    RealDataDetermination,
}

/// What to do with a source given its consultation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusAction {
    Abort,
    UseSupplierToolData,
    UseDefault,
    ZeroReportSupDocs,
    ZeroReportWithoutDocs,
    ZeroReportCreateDocs,
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SupplierWorkflowConfig {
    pub consultation_overview_file: PathBuf,
    pub supplier_data_dir: PathBuf,
    pub supplier_tool_pattern: String,
    #[serde(default, deserialize_with = "status_table")]
    pub status: BTreeMap<String, StatusAction>,
}

impl SupplierWorkflowConfig {
    pub fn action_for(&self, status: &str) -> Result<StatusAction> {
        self.status.get(status.trim()).copied().ok_or_else(|| {
            ToolError::Config(format!("no action configured for communication status '{status}'"))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunConfig {
    pub input_directory: PathBuf,
    pub output_directory: PathBuf,
    pub version_layouts_file: PathBuf,
    pub default_data_file: PathBuf,
    /// Explicit layout version key; skips detection when set.
    #[serde(default, deserialize_with = "blank_as_none")]
    pub layout_version: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub preset_determination_approach: Option<DeterminationApproach>,
    /// Approach per reporting period, keyed like `Q3-2024`.
    #[serde(default)]
    pub determination_approach: BTreeMap<String, DeterminationApproach>,
    #[serde(default)]
    pub default_supporting_documents: Option<Vec<PathBuf>>,
    #[serde(default)]
    pub default_additional_information: Option<String>,
    #[serde(default)]
    pub supplier_workflow: Option<SupplierWorkflowConfig>,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ToolError::MissingInput(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let document: Value = serde_yaml::from_str(text)?;
        let paths = collect_paths(&document);
        debug!(path_count = paths.len(), "configuration path substitutions");
        let resolved = substitute(document, &paths);
        serde_yaml::from_value(resolved).map_err(|error| ToolError::Config(error.to_string()))
    }

    /// Approach for a reporting period; a preset overrides the period table.
    pub fn approach_for(&self, period: &str) -> Result<DeterminationApproach> {
        if let Some(preset) = self.preset_determination_approach {
            warn!(period, approach = ?preset, "using preset determination approach");
            return Ok(preset);
        }
        self.determination_approach
            .get(period)
            .copied()
            .ok_or_else(|| {
                ToolError::Config(format!("no determination approach configured for {period}"))
            })
    }

    /// Applies command line directory overrides.
    ///
    /// An input override without an output override also moves the output
    /// to `<input>/output`.
    pub fn override_directories(&mut self, input: Option<PathBuf>, output: Option<PathBuf>) {
        if let Some(input) = input {
            if output.is_none() {
                let derived = input.join("output");
                info!(
                    output = %derived.display(),
                    configured = %self.output_directory.display(),
                    "output directory derived from input override"
                );
                self.output_directory = derived;
            }
            self.input_directory = input;
        }
        if let Some(output) = output {
            self.output_directory = output;
        }
    }

    pub fn supplier_workflow(&self) -> Result<&SupplierWorkflowConfig> {
        self.supplier_workflow
            .as_ref()
            .ok_or_else(|| ToolError::Config("missing supplier_workflow section".into()))
    }
}

fn collect_paths(document: &Value) -> BTreeMap<String, String> {
    document
        .get("paths")
        .and_then(Value::as_mapping)
        .map(|mapping| {
            mapping
                .iter()
                .filter_map(|(key, value)| {
                    let key = key.as_str()?;
                    let value = match value {
                        Value::String(text) => text.clone(),
                        Value::Number(number) => number.to_string(),
                        _ => return None,
                    };
                    Some((key.to_string(), value))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn substitute(value: Value, paths: &BTreeMap<String, String>) -> Value {
    match value {
        Value::String(text) => Value::String(substitute_text(&text, paths)),
        Value::Sequence(items) => Value::Sequence(
            items
                .into_iter()
                .map(|item| substitute(item, paths))
                .collect(),
        ),
        Value::Mapping(mapping) => Value::Mapping(
            mapping
                .into_iter()
                .map(|(key, value)| (key, substitute(value, paths)))
                .collect(),
        ),
        other => other,
    }
}

fn substitute_text(text: &str, paths: &BTreeMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(text, |captures: &Captures<'_>| {
            let name = captures
                .get(1)
                .or_else(|| captures.get(2))
                .map(|name| name.as_str())
                .unwrap_or_default();
            paths
                .get(name)
                .cloned()
                .unwrap_or_else(|| captures[0].to_string())
        })
        .into_owned()
}

fn blank_as_none<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") | Some("None") => Ok(None),
        Some(text) => T::deserialize(text.to_string().into_deserializer()).map(Some),
    }
}

fn status_table<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, StatusAction>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_yaml::Mapping::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, value)| {
            let key = match key {
                Value::String(text) => text,
                Value::Number(number) => number.to_string(),
                other => return Err(D::Error::custom(format!("invalid status key {other:?}"))),
            };
            let action = StatusAction::deserialize(value).map_err(D::Error::custom)?;
            Ok((key, action))
        })
        .collect()
}
