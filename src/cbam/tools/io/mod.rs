pub mod excel_read;
pub mod excel_write;
pub mod grid;
pub mod table;

pub use grid::{Grid, Keyword, SearchScope, Workbook, find_keyword, value_right_of};
pub use table::{HeaderRow, read_header_table};
