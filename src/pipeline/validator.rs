use serde::{Deserialize, Serialize};

use crate::error::{EtlError, Result};
use crate::pipeline::table::Table;

pub const NO_COLUMNS: &str = "Le fichier n'a pas de colonnes";
pub const NO_ROWS: &str = "Le fichier est vide";

/// Outcome of the structural checks on a cleaned table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    /// Turn a failed report into the error that aborts the pipeline
    pub fn into_result(self) -> Result<()> {
        if self.valid {
            Ok(())
        } else {
            Err(EtlError::Validation(self.errors))
        }
    }
}

/// Accepts any table with at least one column and one row
pub struct Validator;

impl Validator {
    pub fn validate(table: &Table) -> ValidationReport {
        let mut errors = Vec::new();

        if table.column_count() == 0 {
            errors.push(NO_COLUMNS.to_string());
        }
        if table.row_count() == 0 {
            errors.push(NO_ROWS.to_string());
        }

        ValidationReport {
            valid: errors.is_empty(),
            errors,
        }
    }
}
