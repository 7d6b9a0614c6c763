//! Batch processing of every workbook set found in the input directory.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{error, info, instrument, warn};

use crate::cbam::tools::aggregate::Aggregation;
use crate::cbam::tools::config::RunConfig;
use crate::cbam::tools::emission::build_plan;
use crate::cbam::tools::error::{Result, ToolError};
use crate::cbam::tools::extract::extract_workbook;
use crate::cbam::tools::io::Workbook;
use crate::cbam::tools::io::excel_read::read_workbook;
use crate::cbam::tools::io::excel_write::write_findings;
use crate::cbam::tools::layout::LayoutDocument;
use crate::cbam::tools::layout::version::{detect_version, version_key};
use crate::cbam::tools::model::{ExtractedWorkbook, GeneralInfo};
use crate::cbam::tools::reference::ReferenceData;
use crate::cbam::tools::run::{Finding, RunContext};
use crate::cbam::tools::validate::Normalizer;

pub const INDIRECT_REPRESENTATIVE_DIR: &str = "2 - indirect_representative";
pub const REPORT_FILE: &str = "report.json";
pub const FINDINGS_FILE: &str = "findings.xlsx";
const CUSTOMER_PREFIXES: &[&str] = &["customer", "Customer"];
const MASTER_PREFIX: &str = "master";
const IMPORTER_PREFIX: &str = "importer";
const WORKBOOK_EXTENSION: &str = ".xlsx";

/// Workbooks processed together; the first one is the lead workbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkbookSet {
    pub name: String,
    pub files: Vec<PathBuf>,
}

/// Result of one workbook set in a batch.
#[derive(Debug, Clone)]
pub struct SetOutcome {
    pub name: String,
    pub report_dir: Option<PathBuf>,
    pub error: Option<String>,
    pub findings: Vec<Finding>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub outcomes: Vec<SetOutcome>,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.error.is_none()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

fn workbook_names(dir: &Path, prefixes: &[&str]) -> Result<Vec<PathBuf>> {
    let mut files = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| {
                    name.ends_with(WORKBOOK_EXTENSION)
                        && prefixes.iter().any(|prefix| name.starts_with(prefix))
                })
        })
        .collect::<Vec<_>>();
    files.sort();
    Ok(files)
}

/// Finds the workbook sets of an input directory.
///
/// Every customer workbook is a set of its own. An indirect representative
/// folder holding exactly one master workbook forms one more set, led by the
/// master and followed by the importer workbooks.
#[instrument(level = "info", skip_all, fields(input = %input_dir.display()))]
pub fn discover_sets(input_dir: &Path) -> Result<Vec<WorkbookSet>> {
    let mut sets = customer_sets(input_dir)?;
    sets.extend(cohort_set(input_dir)?);
    info!(set_count = sets.len(), "workbook sets discovered");
    Ok(sets)
}

/// One set per customer workbook, sorted by file name.
pub fn customer_sets(input_dir: &Path) -> Result<Vec<WorkbookSet>> {
    if !input_dir.is_dir() {
        return Err(ToolError::MissingInput(input_dir.to_path_buf()));
    }
    Ok(workbook_names(input_dir, CUSTOMER_PREFIXES)?
        .into_iter()
        .map(|file| WorkbookSet {
            name: file_label(&file),
            files: vec![file],
        })
        .collect())
}

/// The indirect representative set, if the folder holds any workbooks.
///
/// Importer workbooks without a master, or several masters, are a
/// configuration error for this set only.
pub fn cohort_set(input_dir: &Path) -> Result<Option<WorkbookSet>> {
    let cohort_dir = input_dir.join(INDIRECT_REPRESENTATIVE_DIR);
    if !cohort_dir.is_dir() {
        return Ok(None);
    }
    let masters = workbook_names(&cohort_dir, &[MASTER_PREFIX])?;
    let importers = workbook_names(&cohort_dir, &[IMPORTER_PREFIX])?;
    match masters.as_slice() {
        [] if importers.is_empty() => Ok(None),
        [master] => {
            let mut files = vec![master.clone()];
            files.extend(importers);
            Ok(Some(WorkbookSet {
                name: INDIRECT_REPRESENTATIVE_DIR.to_string(),
                files,
            }))
        }
        _ => Err(ToolError::Config(format!(
            "'{INDIRECT_REPRESENTATIVE_DIR}' needs exactly one master workbook, found {}",
            masters.len()
        ))),
    }
}

/// Output folder name `<date> - <importer> - Q<quarter>-<year>`.
///
/// Spaces and path separators in the importer name become underscores.
pub fn report_dir_name(general_info: &GeneralInfo, date: &str) -> String {
    let importer = general_info
        .importer
        .name
        .replace("&amp;", "&")
        .replace([' ', '/', '\\'], "_");
    format!("{date} - {importer} - {}", general_info.period())
}

/// Layout version for a workbook: configured explicitly, else detected.
pub fn layout_version(
    configured: Option<&str>,
    workbook: &Workbook,
    layouts: &LayoutDocument,
) -> Result<String> {
    match configured.map(str::trim) {
        Some(key) if key.starts_with("version_") => Ok(key.to_string()),
        Some(version) => version_key(version),
        None => detect_version(workbook, layouts),
    }
}

/// Reads and extracts one workbook with its effective layout.
#[instrument(level = "info", skip_all, fields(input = %path.display()))]
pub fn extract_file(
    path: &Path,
    layouts: &LayoutDocument,
    reference: &ReferenceData,
    version: Option<&str>,
) -> Result<ExtractedWorkbook> {
    let workbook = read_workbook(path)?;
    let key = layout_version(version, &workbook, layouts)?;
    let layout = layouts.resolve(&key)?;
    let normalizer = Normalizer::new(reference.countries());
    extract_workbook(&workbook, &layout, &normalizer)
}

/// Extracts, aggregates and writes the report of one workbook set.
#[instrument(level = "info", skip_all, fields(set = %set.name, run_id = %ctx.run_id))]
pub fn process_set(
    config: &RunConfig,
    layouts: &LayoutDocument,
    reference: &ReferenceData,
    set: &WorkbookSet,
    ctx: &mut RunContext,
) -> Result<PathBuf> {
    let extracted = set
        .files
        .iter()
        .map(|file| extract_file(file, layouts, reference, config.layout_version.as_deref()))
        .collect::<Result<Vec<_>>>()?;

    let aggregation = Aggregation::collect(&extracted, ctx)?;
    let report_dir = config.output_directory.join(report_dir_name(
        &aggregation.general_info,
        &Local::now().format("%Y-%m-%d").to_string(),
    ));
    fs::create_dir_all(&report_dir)?;
    ctx.output_dir = Some(report_dir.clone());

    let plan = build_plan(
        config,
        &aggregation.general_info,
        &aggregation.source_names(),
        reference,
        ctx,
    )?;
    let report = aggregation.build_report(&plan, reference.declarant_id.clone(), ctx)?;

    let report_path = report_dir.join(REPORT_FILE);
    fs::write(&report_path, serde_json::to_string_pretty(&report)?)?;
    write_findings(&report_dir.join(FINDINGS_FILE), ctx.findings(), &ctx.summary)?;
    info!(output = %report_path.display(), findings = ctx.findings().len(), "report written");
    Ok(report_dir)
}

/// Processes every workbook set; a failing set is logged and skipped.
///
/// A rejected indirect representative folder counts as one failed set.
#[instrument(level = "info", skip_all, fields(input = %config.input_directory.display()))]
pub fn run_batch(config: &RunConfig) -> Result<BatchSummary> {
    let layouts = LayoutDocument::load(&config.version_layouts_file)?;
    let reference = ReferenceData::load(&config.default_data_file)?;
    let mut sets = customer_sets(&config.input_directory)?;
    let rejected_cohort = match cohort_set(&config.input_directory) {
        Ok(cohort) => {
            sets.extend(cohort);
            None
        }
        Err(failure) => Some(failure),
    };
    if sets.is_empty() && rejected_cohort.is_none() {
        warn!("no workbook sets in input directory");
    }

    let mut summary = BatchSummary::default();
    for set in &sets {
        let mut ctx = RunContext::new();
        let outcome = match process_set(config, &layouts, &reference, set, &mut ctx) {
            Ok(report_dir) => SetOutcome {
                name: set.name.clone(),
                report_dir: Some(report_dir),
                error: None,
                findings: ctx.take_findings(),
            },
            Err(failure) => failed_outcome(&set.name, &failure, ctx.take_findings()),
        };
        summary.outcomes.push(outcome);
    }
    if let Some(failure) = rejected_cohort {
        summary
            .outcomes
            .push(failed_outcome(INDIRECT_REPRESENTATIVE_DIR, &failure, Vec::new()));
    }

    info!(
        succeeded = summary.succeeded(),
        failed = summary.failed(),
        "batch finished"
    );
    Ok(summary)
}

fn failed_outcome(name: &str, failure: &ToolError, findings: Vec<Finding>) -> SetOutcome {
    error!(
        set = name,
        kind = %failure.kind(),
        title = failure.title(),
        error = %failure,
        "workbook set failed"
    );
    SetOutcome {
        name: name.to_string(),
        report_dir: None,
        error: Some(failure.to_string()),
        findings,
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
