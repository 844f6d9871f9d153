//! In-memory row table loaded from CSV.
//!
//! Values are kept as strings; each model decides how to interpret the
//! columns it needs. Prediction borrows contiguous row ranges through
//! `TableView` so chunking never copies the input.

use std::collections::HashMap;
use std::fs::File;
use std::ops::Range;
use std::path::Path;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    index: HashMap<String, usize>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, AppError> {
        let mut index = HashMap::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            if index.insert(name.clone(), i).is_some() {
                return Err(AppError::format(format!("Duplicate column `{name}`.")));
            }
        }
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != columns.len()) {
            return Err(AppError::format(format!(
                "Row {i} has {} fields; expected {}.",
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows, index })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Borrow rows `[range.start, range.end)`.
    ///
    /// # Panics
    /// Panics if the range is out of bounds.
    pub fn view(&self, range: Range<usize>) -> TableView<'_> {
        TableView {
            table: self,
            offset: range.start,
            rows: &self.rows[range],
        }
    }

    pub fn full_view(&self) -> TableView<'_> {
        self.view(0..self.rows.len())
    }
}

/// Contiguous, borrowed slice of a `Table`.
#[derive(Debug, Clone, Copy)]
pub struct TableView<'a> {
    table: &'a Table,
    offset: usize,
    rows: &'a [Vec<String>],
}

impl<'a> TableView<'a> {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the first row in the parent table.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.table.column_index(name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize, AppError> {
        self.column_index(name)
            .ok_or_else(|| AppError::format(format!("Missing required column: `{name}`")))
    }

    pub fn rows(&self) -> &'a [Vec<String>] {
        self.rows
    }

    pub fn value(&self, row: usize, col: usize) -> &'a str {
        self.rows[row][col].as_str()
    }
}

/// Values treated as missing by every consumer of the table.
pub fn is_missing(value: &str) -> bool {
    matches!(
        value.trim(),
        "" | "NA" | "na" | "NaN" | "nan" | "null" | "NULL" | "None"
    )
}

/// Load a headered CSV file.
pub fn read_table_csv(path: &Path) -> Result<Table, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open CSV '{}': {e}", path.display())))?;

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| AppError::format(format!("Failed to read CSV headers: {e}")))?
        .iter()
        .map(normalize_header_name)
        .collect();

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        // +2: header line, then 1-based numbering.
        let record = result
            .map_err(|e| AppError::format(format!("CSV parse error on line {}: {e}", idx + 2)))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Table::new(columns, rows)
}

/// Write a table as CSV.
pub fn write_table_csv(path: &Path, table: &Table) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::io(format!("Failed to create CSV '{}': {e}", path.display())))?;
    writer
        .write_record(table.columns())
        .map_err(|e| AppError::io(format!("Failed to write CSV header: {e}")))?;
    for row in table.rows() {
        writer
            .write_record(row)
            .map_err(|e| AppError::io(format!("Failed to write CSV row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::io(format!("Failed to flush CSV '{}': {e}", path.display())))
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a UTF-8 BOM.
    name.trim().trim_start_matches('\u{feff}').to_string()
}

#[cfg(test)]
pub(crate) fn table_of(columns: &[&str], rows: &[&[&str]]) -> Table {
    Table::new(
        columns.iter().map(|c| c.to_string()).collect(),
        rows.iter()
            .map(|r| r.iter().map(|v| v.to_string()).collect())
            .collect(),
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_tracks_offset_and_values() {
        let t = table_of(&["a", "b"], &[&["1", "x"], &["2", "y"], &["3", "z"]]);
        let v = t.view(1..3);
        assert_eq!(v.len(), 2);
        assert_eq!(v.offset(), 1);
        assert_eq!(v.value(0, t.column_index("b").unwrap()), "y");
        assert!(v.require_column("c").is_err());
    }

    #[test]
    fn ragged_rows_rejected() {
        let err = Table::new(vec!["a".into()], vec![vec!["1".into(), "2".into()]]).unwrap_err();
        assert!(err.message().contains("Row 0"));
    }

    #[test]
    fn csv_round_trip_strips_bom() {
        let dir = std::env::temp_dir().join(format!("iw-table-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("in.csv");
        std::fs::write(&path, "\u{feff}state,age\n06, 3\n36,4\n").unwrap();

        let t = read_table_csv(&path).unwrap();
        assert_eq!(t.columns(), &["state".to_string(), "age".to_string()]);
        assert_eq!(t.rows()[0], vec!["06".to_string(), "3".to_string()]);

        let out = dir.join("out.csv");
        write_table_csv(&out, &t).unwrap();
        assert_eq!(read_table_csv(&out).unwrap(), t);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_markers() {
        assert!(is_missing(""));
        assert!(is_missing(" NA "));
        assert!(!is_missing("0"));
    }
}
