//! Tab-separated table parsing
//!
//! Two shapes are consumed: a plain table with a header row (sample
//! metadata, taxonomy table, species metadata) and the abundance matrix,
//! whose first column is unnamed-or-named row index holding OTU identifiers
//! and whose remaining columns are sample names with integer count cells.

use super::ParseError;

/// A parsed tab-separated table: ordered named columns, ordered rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Index of a named column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Index of a named column, or a `MissingColumn` error.
    pub fn require_column(&self, name: &str) -> Result<usize, ParseError> {
        self.column_index(name)
            .ok_or_else(|| ParseError::MissingColumn(name.to_string()))
    }
}

/// A parsed abundance matrix. `cells[i][j]` is the observed count of
/// `row_ids[i]` (an OTU identifier) in `sample_names[j]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matrix {
    pub row_ids: Vec<String>,
    pub sample_names: Vec<String>,
    pub cells: Vec<Vec<u32>>,
}

/// Parse raw bytes as a tab-separated table with a header row.
pub fn parse_table(bytes: &[u8]) -> Result<Table, ParseError> {
    let text = std::str::from_utf8(bytes)?;
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());

    let header = lines.next().ok_or(ParseError::MissingHeader)?;
    let columns: Vec<String> = header.split('\t').map(|c| c.trim().to_string()).collect();
    if columns.iter().all(|c| c.is_empty()) {
        return Err(ParseError::MissingHeader);
    }

    let mut rows = Vec::new();
    for (line_num, line) in lines.enumerate() {
        let fields: Vec<String> = line.split('\t').map(|f| f.trim().to_string()).collect();
        if fields.len() != columns.len() {
            return Err(ParseError::RowWidth {
                row: line_num + 1,
                expected: columns.len(),
                got: fields.len(),
            });
        }
        rows.push(fields);
    }

    Ok(Table { columns, rows })
}

/// Parse raw bytes as the abundance matrix.
///
/// The first header field labels the row index and is discarded; the
/// remaining fields are sample names. Every cell must be a non-negative
/// integer no larger than `i32::MAX`.
pub fn parse_matrix(bytes: &[u8]) -> Result<Matrix, ParseError> {
    let table = parse_table(bytes)?;

    if table.columns.len() < 2 {
        return Err(ParseError::MissingColumn("sample columns".to_string()));
    }

    let sample_names: Vec<String> = table.columns[1..].to_vec();
    let mut row_ids = Vec::with_capacity(table.rows.len());
    let mut cells = Vec::with_capacity(table.rows.len());

    for (row_num, row) in table.rows.iter().enumerate() {
        row_ids.push(row[0].clone());

        let mut counts = Vec::with_capacity(sample_names.len());
        for (col, value) in row[1..].iter().enumerate() {
            // Counts are stored as INTEGER, so cells beyond i32::MAX are
            // rejected here rather than wrapping at persistence time.
            let count = value
                .parse::<u32>()
                .ok()
                .filter(|&c| c <= i32::MAX as u32)
                .ok_or_else(|| ParseError::InvalidValue {
                    row: row_num + 1,
                    column: sample_names[col].clone(),
                    value: value.clone(),
                })?;
            counts.push(count);
        }
        cells.push(counts);
    }

    Ok(Matrix {
        row_ids,
        sample_names,
        cells,
    })
}
