use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::cbam::tools::model::Summary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Info,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => f.write_str("info"),
            Severity::Warning => f.write_str("warning"),
        }
    }
}

/// A non-fatal observation kept for manual review before filing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub severity: Severity,
    pub title: String,
    pub context: String,
}

/// State of one workbook set. A fresh context is created for every set and
/// passed explicitly to extraction and aggregation.
#[derive(Debug)]
pub struct RunContext {
    pub run_id: Uuid,
    pub output_dir: Option<PathBuf>,
    pub summary: Summary,
    findings: Vec<Finding>,
    document_counters: HashMap<String, u32>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            output_dir: None,
            summary: Summary::default(),
            findings: Vec::new(),
            document_counters: HashMap::new(),
        }
    }

    /// Records a finding and emits it as a warning.
    pub fn warn(&mut self, title: impl Into<String>, context: impl Into<String>) {
        let finding = Finding {
            severity: Severity::Warning,
            title: title.into(),
            context: context.into(),
        };
        warn!(run_id = %self.run_id, title = %finding.title, context = %finding.context, "finding");
        self.findings.push(finding);
    }

    pub fn note(&mut self, title: impl Into<String>, context: impl Into<String>) {
        self.findings.push(Finding {
            severity: Severity::Info,
            title: title.into(),
            context: context.into(),
        });
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn take_findings(&mut self) -> Vec<Finding> {
        std::mem::take(&mut self.findings)
    }

    /// Next running number for an attachment base name, starting at 1.
    pub fn next_document_index(&mut self, basename: &str) -> u32 {
        let counter = self.document_counters.entry(basename.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }
}
