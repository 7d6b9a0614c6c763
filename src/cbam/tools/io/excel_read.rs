use std::path::Path;

use calamine::{DataType, Reader, Xlsx, open_workbook};
use chrono::{NaiveDate, TimeDelta};
use tracing::debug;

use crate::cbam::tools::error::{Result, ToolError};
use crate::cbam::tools::io::grid::{Grid, Workbook};
use crate::cbam::tools::model::{CellRef, ScalarValue};

/// Text format spreadsheet datetimes are rendered in.
pub const SPREADSHEET_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Reads every worksheet of an `.xlsx` file into memory.
pub fn read_workbook(path: &Path) -> Result<Workbook> {
    if !path.exists() {
        return Err(ToolError::MissingInput(path.to_path_buf()));
    }
    let mut workbook: Xlsx<_> = open_workbook(path)?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names().to_vec() {
        let range = read_sheet(&mut workbook, &name)?;
        sheets.push(range_to_grid(&name, &range));
    }
    debug!(path = %path.display(), sheet_count = sheets.len(), "workbook loaded");
    Ok(Workbook::new(sheets))
}

fn read_sheet<R: std::io::Read + std::io::Seek>(
    workbook: &mut Xlsx<R>,
    name: &str,
) -> Result<calamine::Range<DataType>> {
    let range_result = workbook
        .worksheet_range(name)
        .ok_or_else(|| ToolError::InvalidWorkbook(format!("missing sheet '{name}'")))?;
    let range = range_result.map_err(ToolError::from)?;
    Ok(range)
}

fn range_to_grid(name: &str, range: &calamine::Range<DataType>) -> Grid {
    let mut grid = Grid::new(name);
    let Some((start_row, start_col)) = range.start() else {
        return grid;
    };
    for (row_offset, row) in range.rows().enumerate() {
        for (col_offset, cell) in row.iter().enumerate() {
            let value = cell_to_scalar(cell);
            if value.is_empty() {
                continue;
            }
            let at = CellRef::new(start_row + row_offset as u32, start_col + col_offset as u32);
            grid.set(at, value);
        }
    }
    grid
}

fn cell_to_scalar(cell: &DataType) -> ScalarValue {
    match cell {
        DataType::Empty => ScalarValue::Null,
        DataType::String(value) => ScalarValue::String(value.clone()),
        DataType::Float(value) => ScalarValue::Number(*value),
        DataType::Int(value) => ScalarValue::Number(*value as f64),
        DataType::Bool(value) => ScalarValue::Boolean(*value),
        DataType::DateTime(serial) => excel_serial_to_text(*serial)
            .map(ScalarValue::String)
            .unwrap_or(ScalarValue::Number(*serial)),
        other => ScalarValue::String(other.to_string()),
    }
}

/// Renders an Excel serial date (days since 1899-12-30) as `YYYY-MM-DD HH:MM:SS`.
pub fn excel_serial_to_text(serial: f64) -> Option<String> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    let moment = epoch.checked_add_signed(TimeDelta::milliseconds(millis))?;
    Some(moment.format(SPREADSHEET_DATETIME_FORMAT).to_string())
}
