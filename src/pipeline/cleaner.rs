use tracing::debug;

use crate::pipeline::table::{Cell, Table};

/// Normalizes a raw table before validation and mapping.
///
/// Runs three steps in order: drop rows where every cell is missing, trim
/// every text cell, then lowercase and trim every column header. The column
/// count never changes and cleaning never fails.
pub struct Cleaner;

impl Cleaner {
    pub fn clean(table: Table) -> Table {
        let original_rows = table.row_count();

        let rows: Vec<Vec<Cell>> = table
            .rows
            .into_iter()
            .filter(|row| !row.iter().all(Cell::is_empty))
            .map(|row| row.into_iter().map(trim_cell).collect())
            .collect();

        let columns = table
            .columns
            .iter()
            .map(|c| c.trim().to_lowercase())
            .collect();

        debug!(
            "Cleaned table: dropped {} empty rows",
            original_rows - rows.len()
        );
        Table::new(columns, rows)
    }
}

fn trim_cell(cell: Cell) -> Cell {
    match cell {
        Cell::Text(s) => {
            let trimmed = s.trim();
            if trimmed.len() == s.len() {
                Cell::Text(s)
            } else {
                Cell::Text(trimmed.to_string())
            }
        }
        other => other,
    }
}
