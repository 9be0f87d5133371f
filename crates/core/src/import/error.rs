use std::fmt;

/// The import file lacks a header or any data rows.
#[derive(Debug, Clone)]
pub struct ImportFormatError {
    pub line_count: usize,
}

impl fmt::Display for ImportFormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid import format: expected a header and at least one data row (got {} non-empty lines)",
            self.line_count
        )
    }
}

impl std::error::Error for ImportFormatError {}
