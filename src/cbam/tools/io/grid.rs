use crate::cbam::tools::model::{CellRef, ScalarValue};

static EMPTY: ScalarValue = ScalarValue::Null;

/// In-memory worksheet addressed with zero-based absolute coordinates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    name: String,
    rows: Vec<Vec<ScalarValue>>,
}

impl Grid {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
        }
    }

    /// Builds a grid whose first row and column sit at `A1`.
    pub fn from_rows(name: impl Into<String>, rows: Vec<Vec<ScalarValue>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn height(&self) -> u32 {
        self.rows.len() as u32
    }

    pub fn width(&self) -> u32 {
        self.rows.iter().map(Vec::len).max().unwrap_or(0) as u32
    }

    pub fn get(&self, cell: CellRef) -> &ScalarValue {
        self.rows
            .get(cell.row as usize)
            .and_then(|row| row.get(cell.col as usize))
            .unwrap_or(&EMPTY)
    }

    pub fn set(&mut self, cell: CellRef, value: ScalarValue) {
        let (row, col) = (cell.row as usize, cell.col as usize);
        if self.rows.len() <= row {
            self.rows.resize_with(row + 1, Vec::new);
        }
        let cells = &mut self.rows[row];
        if cells.len() <= col {
            cells.resize(col + 1, ScalarValue::Null);
        }
        cells[col] = value;
    }

    /// Non-empty cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (CellRef, &ScalarValue)> {
        self.rows.iter().enumerate().flat_map(|(row, cells)| {
            cells
                .iter()
                .enumerate()
                .filter(|(_, value)| !value.is_empty())
                .map(move |(col, value)| (CellRef::new(row as u32, col as u32), value))
        })
    }
}

/// A header or label to look for. `text...` matches any cell starting with `text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword {
    text: String,
    prefix: bool,
}

impl Keyword {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.strip_suffix("...") {
            Some(stem) => Self {
                text: stem.trim_end().to_string(),
                prefix: true,
            },
            None => Self {
                text: trimmed.to_string(),
                prefix: false,
            },
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn matches(&self, value: &ScalarValue, case_sensitive: bool) -> bool {
        if value.is_empty() {
            return false;
        }
        let cell = value.to_text();
        let cell = cell.trim();
        let (cell, wanted) = if case_sensitive {
            (cell.to_string(), self.text.clone())
        } else {
            (cell.to_lowercase(), self.text.to_lowercase())
        };
        if self.prefix {
            cell.starts_with(&wanted)
        } else {
            cell == wanted
        }
    }
}

/// Region a keyword search is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    Anywhere,
    Row(u32),
    Column(u32),
}

/// First cell (row-major) inside `scope` that matches `keyword`.
pub fn find_keyword(
    grid: &Grid,
    keyword: &Keyword,
    scope: SearchScope,
    case_sensitive: bool,
) -> Option<CellRef> {
    grid.cells()
        .filter(|(cell, _)| match scope {
            SearchScope::Anywhere => true,
            SearchScope::Row(row) => cell.row == row,
            SearchScope::Column(col) => cell.col == col,
        })
        .find(|(_, value)| keyword.matches(value, case_sensitive))
        .map(|(cell, _)| cell)
}

/// Cell to the right of the first label found in row-major sheet order.
///
/// The position on the sheet decides between labels, not their order in `labels`.
pub fn value_right_of<'a>(
    grid: &'a Grid,
    labels: &[&str],
    case_sensitive: bool,
) -> Option<&'a ScalarValue> {
    let keywords: Vec<Keyword> = labels.iter().map(|label| Keyword::parse(label)).collect();
    grid.cells()
        .find(|(_, value)| {
            keywords
                .iter()
                .any(|keyword| keyword.matches(value, case_sensitive))
        })
        .map(|(cell, _)| grid.get(cell.right()))
}

/// A set of worksheets in workbook order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workbook {
    sheets: Vec<Grid>,
}

impl Workbook {
    pub fn new(sheets: Vec<Grid>) -> Self {
        Self { sheets }
    }

    pub fn sheet(&self, name: &str) -> Option<&Grid> {
        self.sheets.iter().find(|grid| grid.name() == name)
    }

    /// Case-insensitive sheet lookup, used for collaborator workbooks.
    pub fn sheet_ignore_case(&self, name: &str) -> Option<&Grid> {
        let wanted = name.trim().to_lowercase();
        self.sheets
            .iter()
            .find(|grid| grid.name().trim().to_lowercase() == wanted)
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.iter().map(Grid::name)
    }

    pub fn sheets(&self) -> &[Grid] {
        &self.sheets
    }
}
