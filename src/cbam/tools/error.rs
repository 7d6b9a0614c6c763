use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::cbam::tools::model::CellRef;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Spreadsheet position a validation failure originates from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldLocation {
    pub sheet: String,
    pub table: String,
    pub field: String,
    pub cell: CellRef,
}

impl fmt::Display for FieldLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sheet '{}', table '{}', field '{}', cell {}",
            self.sheet, self.table, self.field, self.cell
        )
    }
}

/// Coarse classification used when a workbook set is aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    StructuralConfig,
    Validation,
    IdentityResolution,
    Consistency,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::StructuralConfig => "structural/config",
            ErrorKind::Validation => "validation",
            ErrorKind::IdentityResolution => "identity resolution",
            ErrorKind::Consistency => "consistency",
            ErrorKind::Io => "io",
        };
        f.write_str(label)
    }
}

/// Error type covering the different failure cases that can occur while a
/// workbook set is read, validated, and aggregated.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Raised when a YAML document (layout or run configuration) is malformed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Errors bubbled up from the Excel reader implementation.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::XlsxError),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Raised when a sheet does not follow the expected conventions.
    #[error("invalid workbook structure: {0}")]
    InvalidWorkbook(String),

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),

    /// Raised when the run configuration is incomplete or inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// Raised when the layout document cannot produce an effective layout.
    #[error("layout error: {0}")]
    Layout(String),

    /// Raised when none of a table's anchor keywords can be found.
    #[error("no anchor for table '{table}' in sheet '{sheet}' (tried {})", .keywords.join(", "))]
    MissingAnchor {
        sheet: String,
        table: String,
        keywords: Vec<String>,
    },

    /// Raised when a required field header is absent from the anchor row or column.
    #[error("required field '{field}' not found in table '{table}' of sheet '{sheet}'")]
    MissingField {
        sheet: String,
        table: String,
        field: String,
    },

    /// Raised when a value fails its type rule or requirement policy.
    #[error("{message}{}", .location.as_ref().map(|at| format!(" ({at})")).unwrap_or_default())]
    Validation {
        message: String,
        location: Option<FieldLocation>,
    },

    /// Raised when an operator or installation reference cannot be matched.
    #[error("cannot resolve operator/installation '{name}': {context}")]
    Identity { name: String, context: String },

    /// Raised when two declared facts about the same entry disagree.
    #[error("contradicting entries for {key}: {detail}")]
    Contradiction { key: String, detail: String },

    /// Raised when a real-data emission source has no record for a commodity.
    #[error("commodity code {cn_code} not found in emission data of '{source_name}'")]
    MissingEmissionData { source_name: String, cn_code: String },

    /// Raised when the consultation overview asks to abort a source.
    #[error("source '{source_name}' has status '{status}' which aborts the report")]
    Abort { source_name: String, status: String },
}

impl ToolError {
    /// Creates a validation error without positional context.
    pub fn validation(message: impl Into<String>) -> Self {
        ToolError::Validation {
            message: message.into(),
            location: None,
        }
    }

    /// Attaches the originating cell to a validation error that has none yet.
    pub fn at(self, at: FieldLocation) -> Self {
        match self {
            ToolError::Validation {
                message,
                location: None,
            } => ToolError::Validation {
                message,
                location: Some(at),
            },
            other => other,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ToolError::Io(_)
            | ToolError::Json(_)
            | ToolError::ExcelRead(_)
            | ToolError::ExcelWrite(_)
            | ToolError::MissingInput(_)
            | ToolError::Logging(_) => ErrorKind::Io,
            ToolError::Yaml(_)
            | ToolError::InvalidWorkbook(_)
            | ToolError::Config(_)
            | ToolError::Layout(_)
            | ToolError::MissingAnchor { .. }
            | ToolError::MissingField { .. }
            | ToolError::Abort { .. } => ErrorKind::StructuralConfig,
            ToolError::Validation { .. } | ToolError::MissingEmissionData { .. } => {
                ErrorKind::Validation
            }
            ToolError::Identity { .. } => ErrorKind::IdentityResolution,
            ToolError::Contradiction { .. } => ErrorKind::Consistency,
        }
    }

    /// Short human readable heading for structured error logs.
    pub fn title(&self) -> &'static str {
        match self {
            ToolError::Io(_) | ToolError::MissingInput(_) => "file access failed",
            ToolError::Json(_) => "report serialization failed",
            ToolError::Yaml(_) => "malformed YAML document",
            ToolError::ExcelRead(_) | ToolError::ExcelWrite(_) => "spreadsheet access failed",
            ToolError::InvalidWorkbook(_) => "unexpected workbook structure",
            ToolError::Logging(_) => "logging unavailable",
            ToolError::Config(_) => "invalid run configuration",
            ToolError::Layout(_) => "layout cannot be resolved",
            ToolError::MissingAnchor { .. } => "table anchor not found",
            ToolError::MissingField { .. } => "required column not found",
            ToolError::Validation { .. } => "invalid value",
            ToolError::Identity { .. } => "operator/installation mismatch",
            ToolError::Contradiction { .. } => "contradicting entries",
            ToolError::MissingEmissionData { .. } => "missing commodity in emission data",
            ToolError::Abort { .. } => "report aborted by consultation status",
        }
    }
}
