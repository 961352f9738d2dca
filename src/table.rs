//! Tabular input and output
//!
//! The collector reads a table with at least a `url` column from CSV or a JSON
//! array of objects and writes its labeled output as CSV. Columns other than
//! `url` are carried through untouched.

use serde_json::Value;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;
use thiserror::Error;

/// Column holding the URL of each row
pub const URL_COLUMN: &str = "url";

/// Errors reading or writing tables
#[derive(Debug, Error)]
pub enum TableError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported input format: {0}")]
    UnsupportedFormat(String),
    #[error("Malformed table: {0}")]
    Malformed(String),
    #[error("Missing column: {0}")]
    MissingColumn(String),
}

/// A rectangular table of string cells
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Load from a `.csv` or `.json` file, picked by extension
    pub fn read_path(path: &Path) -> Result<Self, TableError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "csv" => Self::read_csv(File::open(path)?),
            "json" => Self::read_json(BufReader::new(File::open(path)?)),
            other => Err(TableError::UnsupportedFormat(if other.is_empty() {
                path.display().to_string()
            } else {
                format!(".{}", other)
            })),
        }
    }

    pub fn read_csv<R: std::io::Read>(reader: R) -> Result<Self, TableError> {
        let mut reader = csv::ReaderBuilder::new().flexible(false).from_reader(reader);
        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut table = Self::new(columns);
        for row in reader.records() {
            table.rows.push(row?.iter().map(str::to_string).collect());
        }
        Ok(table)
    }

    /// Read a JSON array of flat objects. Columns appear in first-seen key
    /// order; missing keys become empty cells and non-string values keep their
    /// JSON text.
    pub fn read_json<R: std::io::Read>(reader: R) -> Result<Self, TableError> {
        let value: Value = serde_json::from_reader(reader)?;
        let Value::Array(items) = value else {
            return Err(TableError::Malformed("expected a JSON array of objects".to_string()));
        };

        let mut columns: Vec<String> = Vec::new();
        for item in &items {
            let Value::Object(map) = item else {
                return Err(TableError::Malformed("expected every item to be an object".to_string()));
            };
            for key in map.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }

        let mut table = Self::new(columns);
        for item in &items {
            let row = table
                .columns
                .iter()
                .map(|column| match item.get(column) {
                    None | Some(Value::Null) => String::new(),
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                })
                .collect();
            table.rows.push(row);
        }
        Ok(table)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column, top to bottom
    pub fn column(&self, name: &str) -> Result<Vec<&str>, TableError> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| TableError::MissingColumn(name.to_string()))?;
        Ok(self
            .rows
            .iter()
            .map(|row| row.get(idx).map(String::as_str).unwrap_or_default())
            .collect())
    }

    /// The `url` column as owned strings
    pub fn urls(&self) -> Result<Vec<String>, TableError> {
        Ok(self.column(URL_COLUMN)?.into_iter().map(str::to_string).collect())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), TableError> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn write_csv_path(&self, path: &Path) -> Result<(), TableError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        self.write_csv(File::create(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_csv() {
        let table = Table::read_csv("url,label\na.com,news\nb.com,\"shop, retail\"\n".as_bytes()).unwrap();
        assert_eq!(table.columns, vec!["url", "label"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.column("label").unwrap(), vec!["news", "shop, retail"]);
    }

    #[test]
    fn test_read_json_unions_keys_in_order() {
        let json = r#"[{"url": "a.com", "label": "news"}, {"url": "b.com", "score": 3, "label": null}]"#;
        let table = Table::read_json(json.as_bytes()).unwrap();
        assert_eq!(table.columns, vec!["url", "label", "score"]);
        assert_eq!(table.rows[0], vec!["a.com", "news", ""]);
        assert_eq!(table.rows[1], vec!["b.com", "", "3"]);
    }

    #[test]
    fn test_read_json_rejects_non_array() {
        assert!(matches!(
            Table::read_json(r#"{"url": "a.com"}"#.as_bytes()),
            Err(TableError::Malformed(_))
        ));
    }

    #[test]
    fn test_missing_url_column() {
        let table = Table::read_csv("link\na.com\n".as_bytes()).unwrap();
        assert!(matches!(table.urls(), Err(TableError::MissingColumn(_))));
    }

    #[test]
    fn test_read_path_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("input.csv");
        std::fs::write(&csv_path, "url\na.com\n").unwrap();
        assert_eq!(Table::read_path(&csv_path).unwrap().urls().unwrap(), vec!["a.com"]);

        let txt_path = dir.path().join("input.txt");
        std::fs::write(&txt_path, "a.com\n").unwrap();
        assert!(matches!(Table::read_path(&txt_path), Err(TableError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_write_csv_quotes_cells() {
        let mut table = Table::new(vec!["url".into(), "h1".into()]);
        table.rows.push(vec!["a.com".into(), r#"["One, two"]"#.into()]);
        let mut out = Vec::new();
        table.write_csv(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "url,h1\na.com,\"[\"\"One, two\"\"]\"\n");
    }
}
