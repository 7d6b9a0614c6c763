use std::collections::BTreeMap;

use tracing::warn;

use crate::cbam::tools::error::{Result, ToolError};
use crate::cbam::tools::io::grid::{Grid, Keyword, SearchScope, find_keyword};
use crate::cbam::tools::model::{CellRef, ScalarValue};

/// A row of a header table, keyed by the header text as requested.
pub type HeaderRow = BTreeMap<String, ScalarValue>;

/// Reads a plain vertical table from a collaborator workbook.
///
/// `head` locates the header row and doubles as the row key: rows with an
/// empty `head` cell are skipped. Requested columns that are missing from
/// the header row are reported and left out of every row.
pub fn read_header_table(grid: &Grid, head: &str, columns: &[&str]) -> Result<Vec<HeaderRow>> {
    let head_cell = find_keyword(grid, &Keyword::parse(head), SearchScope::Anywhere, false)
        .ok_or_else(|| {
            ToolError::InvalidWorkbook(format!(
                "head column '{head}' not found in sheet '{}'",
                grid.name()
            ))
        })?;

    let mut located = Vec::with_capacity(columns.len());
    for column in columns {
        match find_keyword(
            grid,
            &Keyword::parse(column),
            SearchScope::Row(head_cell.row),
            false,
        ) {
            Some(cell) => located.push((*column, cell.col)),
            None => warn!(sheet = grid.name(), column, "column not found"),
        }
    }

    let mut rows = Vec::new();
    for row in head_cell.row + 1..grid.height() {
        if grid.get(CellRef::new(row, head_cell.col)).is_empty() {
            continue;
        }
        let values = located
            .iter()
            .map(|(name, col)| (name.to_string(), grid.get(CellRef::new(row, *col)).clone()))
            .collect();
        rows.push(values);
    }
    Ok(rows)
}
