use std::path::Path;

use rust_xlsxwriter::{Format, Table, Workbook, Worksheet};

use crate::cbam::tools::error::Result;
use crate::cbam::tools::model::Summary;
use crate::cbam::tools::run::Finding;

pub const FINDINGS_SHEET: &str = "findings";
pub const SUMMARY_SHEET: &str = "summary";
const FINDING_COLUMNS: [&str; 3] = ["severity", "title", "context"];

/// Writes the review workbook of a workbook set: findings and summary counters.
pub fn write_findings(path: &Path, findings: &[Finding], summary: &Summary) -> Result<()> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(FINDINGS_SHEET)?;
    for (col_idx, header) in FINDING_COLUMNS.iter().enumerate() {
        worksheet.write_string_with_format(0, col_idx as u16, *header, &bold)?;
    }
    for (row_idx, finding) in findings.iter().enumerate() {
        let row = (row_idx + 1) as u32;
        worksheet.write_string(row, 0, finding.severity.to_string())?;
        worksheet.write_string(row, 1, &finding.title)?;
        worksheet.write_string(row, 2, &finding.context)?;
    }
    if !findings.is_empty() {
        let mut table = Table::new();
        table.set_autofilter(true);
        let col_end = (FINDING_COLUMNS.len() as u16).saturating_sub(1);
        worksheet.add_table(0, 0, findings.len() as u32, col_end, &table)?;
    }

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SUMMARY_SHEET)?;
    write_summary(worksheet, summary, &bold)?;

    workbook.save(path)?;
    Ok(())
}

fn write_summary(worksheet: &mut Worksheet, summary: &Summary, bold: &Format) -> Result<()> {
    let counters = [
        ("operators", summary.num_operators as f64),
        ("installations", summary.num_installations as f64),
        ("imported goods", summary.num_imported_goods as f64),
        ("goods emissions", summary.num_goods_emissions as f64),
        ("total net mass", summary.total_net_mass),
        ("total emissions", summary.total_emissions),
    ];
    for (row, (label, value)) in counters.iter().enumerate() {
        worksheet.write_string_with_format(row as u32, 0, *label, bold)?;
        worksheet.write_number(row as u32, 1, *value)?;
    }
    let row = counters.len() as u32;
    worksheet.write_string_with_format(row, 0, "report type", bold)?;
    worksheet.write_string(row, 1, summary.report_type.as_deref().unwrap_or("-"))?;
    Ok(())
}
