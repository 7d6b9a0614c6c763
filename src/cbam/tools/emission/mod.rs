//! Where the emission figures of every source come from.
//!
//! The plan is decided once per workbook set from the determination approach
//! of the reporting period. Aggregation only sees the
//! [`EmissionSourceResolver`] seam.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use crate::cbam::tools::config::{DeterminationApproach, RunConfig, StatusAction};
use crate::cbam::tools::error::{Result, ToolError};
use crate::cbam::tools::model::{
    Attachment, DeterminationType, DirectEmissions, EmissionData, GeneralInfo, IndirectEmissions,
    SupportingDocument,
};
use crate::cbam::tools::reference::{CommodityDefaults, ReferenceData};
use crate::cbam::tools::run::RunContext;

pub mod consultation;
pub mod matching;
pub mod supplier_tool;

use consultation::ConsultationOverview;

const ZERO_REPORT_TEXT: &str = "Es war nicht möglich die Emissionsdaten zu ermitteln.";
const ZERO_REPORT_DOCS_TEXT: &str = " Eine Dokumentation der gescheiterten Versuche zur Ermittlung \
der Daten ist in folgenden Dateien unter 'Supplementary/Supporting documents' zu finden:";
const DEFAULT_METHODOLOGY: &str = "TOM03";
const DEFAULT_ELECTRICITY_SOURCE: &str = "SOE03";
const DEFAULT_OTHER_SOURCE_INDICATION: &str = "'Received from the grid' wurde ausgewählt weil \
Feld verpflichtend ist. Eigentlich ist die Information nicht verfügbar weil Defaultwerte genutzt \
werden.";
const SUPPORTING_DOCUMENT_TYPE: &str = "TED05";
const SUPPORTING_FOLDER_MARKER: &str = "supporting_document";
const CUSTOM_INFO_FILE: &str = "custom_additional_information.txt";
const CUSTOM_INFO_DONE_FILE: &str = "custom_additional_information - done.txt";

const MIME_TYPES: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    ("txt", "text/plain"),
    ("jpeg", "image/jpeg"),
    ("jpg", "image/jpeg"),
    ("doc", "application/msword"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("xls", "application/vnd.ms-excel"),
    (
        "xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
];

/// Emission data chosen for one source and commodity code.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSource {
    pub data: EmissionData,
    /// Files to attach when the figures are not actual data.
    pub documents: Vec<PathBuf>,
}

/// Supplies emission figures to the aggregation engine.
pub trait EmissionSourceResolver {
    fn resolve(&self, source_name: &str, cn_code: &str) -> Result<ResolvedSource>;
}

/// Data plan for a single emission source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourcePlan {
    Default,
    ZeroReport {
        data: EmissionData,
        documents: Vec<PathBuf>,
    },
    Actual {
        data: HashMap<String, EmissionData>,
        documents: Vec<PathBuf>,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum PlanMode {
    AllDefault,
    AllZero(SourcePlan),
    PerSource,
}

/// Emission data plan for one workbook set.
#[derive(Debug)]
pub struct EmissionPlan<'r> {
    reference: &'r ReferenceData,
    mode: PlanMode,
    sources: HashMap<String, SourcePlan>,
}

impl<'r> EmissionPlan<'r> {
    /// Every source uses the per-commodity default values.
    pub fn defaults(reference: &'r ReferenceData) -> Self {
        Self {
            reference,
            mode: PlanMode::AllDefault,
            sources: HashMap::new(),
        }
    }

    /// Every source reports zero emissions.
    pub fn zero_report(
        reference: &'r ReferenceData,
        additional_info: Option<String>,
        documents: Vec<PathBuf>,
    ) -> Self {
        let text = additional_info.unwrap_or_else(|| zero_report_text(&documents, true));
        Self {
            reference,
            mode: PlanMode::AllZero(SourcePlan::ZeroReport {
                data: zero_report_data(text),
                documents,
            }),
            sources: HashMap::new(),
        }
    }

    /// Plan decided source by source; sources never inserted fail to resolve.
    pub fn per_source(reference: &'r ReferenceData) -> Self {
        Self {
            reference,
            mode: PlanMode::PerSource,
            sources: HashMap::new(),
        }
    }

    pub fn insert(&mut self, source_name: impl Into<String>, plan: SourcePlan) {
        self.sources.insert(source_name.into(), plan);
    }

    pub fn source(&self, source_name: &str) -> Option<&SourcePlan> {
        self.sources.get(source_name)
    }

    fn resolve_plan(&self, plan: &SourcePlan, source_name: &str, cn_code: &str) -> Result<ResolvedSource> {
        match plan {
            SourcePlan::Default => {
                let defaults = self.reference.commodity(cn_code).ok_or_else(|| {
                    ToolError::MissingEmissionData {
                        source_name: source_name.to_string(),
                        cn_code: cn_code.to_string(),
                    }
                })?;
                Ok(ResolvedSource {
                    data: default_emission_data(defaults),
                    documents: Vec::new(),
                })
            }
            SourcePlan::ZeroReport { data, documents } => Ok(ResolvedSource {
                data: data.clone(),
                documents: documents.clone(),
            }),
            SourcePlan::Actual { data, documents } => {
                let data = data.get(cn_code).cloned().ok_or_else(|| {
                    ToolError::MissingEmissionData {
                        source_name: source_name.to_string(),
                        cn_code: cn_code.to_string(),
                    }
                })?;
                Ok(ResolvedSource {
                    data,
                    documents: documents.clone(),
                })
            }
        }
    }
}

impl EmissionSourceResolver for EmissionPlan<'_> {
    fn resolve(&self, source_name: &str, cn_code: &str) -> Result<ResolvedSource> {
        match &self.mode {
            PlanMode::AllDefault => self.resolve_plan(&SourcePlan::Default, source_name, cn_code),
            PlanMode::AllZero(plan) => self.resolve_plan(plan, source_name, cn_code),
            PlanMode::PerSource => {
                let plan = self.sources.get(source_name).ok_or_else(|| ToolError::Identity {
                    name: source_name.to_string(),
                    context: "no emission data planned for this source".into(),
                })?;
                self.resolve_plan(plan, source_name, cn_code)
            }
        }
    }
}

/// Per-commodity default values as determination type `02`.
pub fn default_emission_data(defaults: &CommodityDefaults) -> EmissionData {
    EmissionData {
        direct: DirectEmissions {
            determination_type: DeterminationType::Default,
            reporting_methodology: Some(DEFAULT_METHODOLOGY.to_string()),
            additional_info: None,
            see: defaults.see_direct,
        },
        indirect: IndirectEmissions {
            determination_type: DeterminationType::Default,
            see: Some(defaults.see_indirect),
            source_of_electricity: Some(DEFAULT_ELECTRICITY_SOURCE.to_string()),
            other_source_indication: Some(DEFAULT_OTHER_SOURCE_INDICATION.to_string()),
            electricity_consumed: None,
            emission_factor: None,
            source_of_emission_factor: None,
            source_of_emission_factor_value: None,
        },
    }
}

/// Zero emissions as determination type `03`.
pub fn zero_report_data(additional_info: String) -> EmissionData {
    EmissionData {
        direct: DirectEmissions {
            determination_type: DeterminationType::Estimated,
            reporting_methodology: None,
            additional_info: Some(additional_info),
            see: 0.0,
        },
        indirect: IndirectEmissions {
            determination_type: DeterminationType::Estimated,
            see: Some(0.0),
            source_of_electricity: None,
            other_source_indication: None,
            electricity_consumed: Some(0.0),
            emission_factor: Some(0.0),
            source_of_emission_factor: None,
            source_of_emission_factor_value: None,
        },
    }
}

/// Explanation put into a zero report, listing the attached documents.
pub fn zero_report_text(documents: &[PathBuf], with_documents: bool) -> String {
    let mut text = ZERO_REPORT_TEXT.to_string();
    if with_documents {
        text.push_str(ZERO_REPORT_DOCS_TEXT);
        for document in documents {
            text.push_str("\n - ");
            text.push_str(&basename(document));
        }
    }
    text
}

/// Decides the data plan for every emission source of a workbook set.
#[instrument(level = "info", skip_all, fields(period = %general_info.period()))]
pub fn build_plan<'r>(
    config: &RunConfig,
    general_info: &GeneralInfo,
    sources: &[String],
    reference: &'r ReferenceData,
    ctx: &mut RunContext,
) -> Result<EmissionPlan<'r>> {
    let approach = config.approach_for(&general_info.period())?;
    info!(approach = ?approach, source_count = sources.len(), "determination approach");

    let plan = match approach {
        DeterminationApproach::DefaultValues => {
            ctx.summary.report_type = Some("Default Value Report".into());
            EmissionPlan::defaults(reference)
        }
        DeterminationApproach::ZeroReportWithDefaultDocs => {
            let documents = config.default_supporting_documents.clone().ok_or_else(|| {
                ToolError::Config(
                    "zero_report_with_default_docs needs default_supporting_documents".into(),
                )
            })?;
            ctx.summary.report_type = Some("Zero Report with Default Documentation".into());
            EmissionPlan::zero_report(
                reference,
                config.default_additional_information.clone(),
                documents,
            )
        }
        DeterminationApproach::ZeroReportWithoutDocs => {
            ctx.summary.report_type = Some("Zero Report without Documentation".into());
            let text = config
                .default_additional_information
                .clone()
                .unwrap_or_else(|| zero_report_text(&[], false));
            EmissionPlan {
                reference,
                mode: PlanMode::AllZero(SourcePlan::ZeroReport {
                    data: zero_report_data(text),
                    documents: Vec::new(),
                }),
                sources: HashMap::new(),
            }
        }
        DeterminationApproach::RealDataDetermination => {
            real_data_plan(config, general_info, sources, reference, ctx)?
        }
    };
    Ok(plan)
}

fn real_data_plan<'r>(
    config: &RunConfig,
    general_info: &GeneralInfo,
    sources: &[String],
    reference: &'r ReferenceData,
    ctx: &mut RunContext,
) -> Result<EmissionPlan<'r>> {
    let workflow = config.supplier_workflow()?;
    let importer = &general_info.importer.name;
    let overview = ConsultationOverview::load(&workflow.consultation_overview_file, importer, ctx)?;

    let mut plan = EmissionPlan::per_source(reference);
    for source in sources {
        let row = overview.find(source, ctx)?;
        let action = workflow.action_for(&row.status)?;
        debug!(source = %source, status = %row.status, action = ?action, "communication status");

        let source_plan = match action {
            StatusAction::Abort => {
                return Err(ToolError::Abort {
                    source_name: source.clone(),
                    status: row.status.clone(),
                });
            }
            StatusAction::UseDefault => SourcePlan::Default,
            StatusAction::UseSupplierToolData => {
                ctx.summary.report_type = Some("Real Data Report with Supplier Tool Data".into());
                let folder = supplier_tool::installation_folder(
                    &workflow.supplier_data_dir,
                    importer,
                    &row.installation,
                    ctx,
                )?;
                let tool = supplier_tool::find_tool_file(&folder, &workflow.supplier_tool_pattern)?;
                let data = supplier_tool::load_supplier_tool(&tool, ctx)?;
                let documents = match &config.default_supporting_documents {
                    Some(defaults) => defaults.clone(),
                    None => folder_documents(&folder)?.unwrap_or_default(),
                };
                SourcePlan::Actual { data, documents }
            }
            StatusAction::ZeroReportSupDocs => {
                ctx.summary.report_type = Some("Zero Report with Customer Documentation".into());
                let (custom_info, documents) = match &config.default_supporting_documents {
                    Some(defaults) => (
                        config.default_additional_information.clone(),
                        defaults.clone(),
                    ),
                    None => {
                        let folder = supplier_tool::installation_folder(
                            &workflow.supplier_data_dir,
                            importer,
                            &row.installation,
                            ctx,
                        )?;
                        let documents = folder_documents(&folder)?.ok_or_else(|| {
                            ToolError::MissingInput(folder.join(SUPPORTING_FOLDER_MARKER))
                        })?;
                        (custom_information(&folder)?, documents)
                    }
                };
                if documents.is_empty() {
                    ctx.warn(
                        "no supporting documents",
                        format!("'{source}' has status '{}' but no documents", row.status),
                    );
                }
                let text = custom_info.unwrap_or_else(|| zero_report_text(&documents, true));
                SourcePlan::ZeroReport {
                    data: zero_report_data(text),
                    documents,
                }
            }
            StatusAction::ZeroReportWithoutDocs => {
                ctx.warn(
                    "zero report without documents",
                    format!("'{source}' has status '{}'", row.status),
                );
                SourcePlan::ZeroReport {
                    data: zero_report_data(zero_report_text(&[], false)),
                    documents: Vec::new(),
                }
            }
            StatusAction::ZeroReportCreateDocs => {
                return Err(ToolError::Config(format!(
                    "status '{}' of '{source}' asks for generated documents, which is not supported",
                    row.status
                )));
            }
            StatusAction::Ignore => {
                ctx.warn(
                    "source ignored",
                    format!("'{source}' has status '{}'", row.status),
                );
                continue;
            }
        };
        plan.insert(source.clone(), source_plan);
    }
    Ok(plan)
}

/// Files inside the first `supporting_document*` folder, or `None` when the
/// installation folder has no such folder.
fn folder_documents(installation_folder: &Path) -> Result<Option<Vec<PathBuf>>> {
    let mut folders = fs::read_dir(installation_folder)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.to_lowercase().contains(SUPPORTING_FOLDER_MARKER))
        })
        .collect::<Vec<_>>();
    folders.sort();
    let Some(folder) = folders.into_iter().next() else {
        warn!(folder = %installation_folder.display(), "no supporting documents folder");
        return Ok(None);
    };

    let mut documents = fs::read_dir(&folder)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| !basename(path).starts_with('.'))
        .collect::<Vec<_>>();
    documents.sort();
    Ok(Some(documents))
}

fn custom_information(installation_folder: &Path) -> Result<Option<String>> {
    for name in [CUSTOM_INFO_FILE, CUSTOM_INFO_DONE_FILE] {
        let path = installation_folder.join(name);
        if path.is_file() {
            return Ok(Some(fs::read_to_string(path)?));
        }
    }
    Ok(None)
}

/// Attachment entries for the given files, with run-unique filenames.
pub fn attach_documents(paths: &[PathBuf], ctx: &mut RunContext) -> Vec<SupportingDocument> {
    paths
        .iter()
        .enumerate()
        .map(|(index, path)| {
            let name = basename(path);
            let (stem, extension) = match name.rsplit_once('.') {
                Some((stem, extension)) if !stem.is_empty() => (stem.to_string(), extension.to_string()),
                _ => (name.clone(), String::new()),
            };
            let number = ctx.next_document_index(&name);
            let filename = if extension.is_empty() {
                format!("{stem}_{number}")
            } else {
                format!("{stem}_{number}.{extension}")
            };
            let mime = mime_type(&extension);
            if mime.is_none() {
                ctx.warn(
                    "unknown attachment type",
                    format!("no MIME type for '{name}'"),
                );
            }
            SupportingDocument {
                sequence_number: index as u32 + 1,
                doc_type: SUPPORTING_DOCUMENT_TYPE.to_string(),
                reference_number: index as u32,
                attachment: Attachment {
                    filename,
                    mime: mime.map(str::to_string),
                    source: path.clone(),
                },
            }
        })
        .collect()
}

pub fn mime_type(extension: &str) -> Option<&'static str> {
    let extension = extension.to_lowercase();
    MIME_TYPES
        .iter()
        .find(|(known, _)| *known == extension)
        .map(|(_, mime)| *mime)
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
