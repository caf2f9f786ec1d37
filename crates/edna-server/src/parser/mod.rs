//! Survey file parsers
//!
//! Pure transforms from raw uploaded bytes into structured in-memory tables:
//! tab-separated tables with a header row, the abundance matrix (first
//! column is the OTU row index), and FASTA sequence files. No side effects;
//! all failures surface as [`ParseError`].

pub mod fasta;
pub mod tabular;

pub use fasta::{parse_fasta, FastaRecord};
pub use tabular::{parse_matrix, parse_table, Matrix, Table};

use thiserror::Error;

/// Malformed-input failures raised by the parsers.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("input is not valid UTF-8 text")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("table has no header row")]
    MissingHeader,

    #[error("required column '{0}' is missing")]
    MissingColumn(String),

    #[error("row {row}: expected {expected} fields, got {got}")]
    RowWidth {
        row: usize,
        expected: usize,
        got: usize,
    },

    #[error("row {row}: invalid value '{value}' for {column}")]
    InvalidValue {
        row: usize,
        column: String,
        value: String,
    },

    #[error("FASTA stream contains no records")]
    EmptyFasta,
}
