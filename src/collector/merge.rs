//! Result merger
//!
//! Left-joins the extracted records onto the input table by `url`, then keeps
//! only the first row for each URL. Input columns that share a name with a
//! feature column are dropped first.

use std::collections::{HashMap, HashSet};

use super::extractor::{ExtractedRecord, FEATURE_COLUMNS};
use crate::table::{Table, TableError, URL_COLUMN};

/// Merge `records` onto `input`.
///
/// The output has the input's non-colliding columns followed by the feature
/// columns, one row per distinct input URL in first-seen order. A URL with no
/// record keeps empty feature cells.
pub fn merge_records(input: &Table, records: &[ExtractedRecord]) -> Result<Table, TableError> {
    let url_idx = input
        .column_index(URL_COLUMN)
        .ok_or_else(|| TableError::MissingColumn(URL_COLUMN.to_string()))?;

    let kept: Vec<usize> = input
        .columns
        .iter()
        .enumerate()
        .filter(|(_, name)| !FEATURE_COLUMNS.contains(&name.as_str()))
        .map(|(i, _)| i)
        .collect();
    let dropped = input.columns.len() - kept.len();
    if dropped > 0 {
        tracing::debug!("Dropping {} input column(s) that collide with features", dropped);
    }

    let mut by_url: HashMap<&str, &ExtractedRecord> = HashMap::with_capacity(records.len());
    for record in records {
        by_url.entry(record.url.as_str()).or_insert(record);
    }

    let mut columns: Vec<String> = kept.iter().map(|&i| input.columns[i].clone()).collect();
    columns.extend(FEATURE_COLUMNS.iter().map(|c| c.to_string()));
    let mut output = Table::new(columns);

    let mut seen: HashSet<&str> = HashSet::with_capacity(input.len());
    for row in &input.rows {
        let url = row.get(url_idx).map(String::as_str).unwrap_or_default();
        if !seen.insert(url) {
            continue;
        }

        let mut merged: Vec<String> = kept
            .iter()
            .map(|&i| row.get(i).cloned().unwrap_or_default())
            .collect();
        match by_url.get(url) {
            Some(record) => merged.extend(record.feature_values()),
            None => merged.extend(std::iter::repeat(String::new()).take(FEATURE_COLUMNS.len())),
        }
        output.rows.push(merged);
    }

    tracing::debug!("Merged {} input rows into {} output rows", input.len(), output.len());
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(index: usize, url: &str, title: &str) -> ExtractedRecord {
        let mut record = ExtractedRecord::new(index, url);
        record.http_response_code = 200;
        record.html_title = title.to_string();
        record
    }

    fn input(rows: &[(&str, &str)]) -> Table {
        let mut table = Table::new(vec!["url".into(), "label".into()]);
        for (url, label) in rows {
            table.rows.push(vec![url.to_string(), label.to_string()]);
        }
        table
    }

    #[test]
    fn test_duplicate_urls_keep_first_row() {
        let table = input(&[("a.com", "first"), ("a.com", "second"), ("b.com", "third")]);
        let records = vec![record(0, "a.com", "A"), record(1, "a.com", "A again"), record(2, "b.com", "B")];

        let merged = merge_records(&table, &records).unwrap();

        assert_eq!(merged.len(), 2);
        assert_eq!(merged.column("url").unwrap(), vec!["a.com", "b.com"]);
        assert_eq!(merged.column("label").unwrap(), vec!["first", "third"]);
        assert_eq!(merged.column("html_title").unwrap(), vec!["A", "B"]);
        assert_eq!(merged.column("http_response").unwrap(), vec!["200", "200"]);
    }

    #[test]
    fn test_colliding_columns_are_replaced() {
        let mut table = Table::new(vec!["html_title".into(), "url".into(), "label".into()]);
        table.rows.push(vec!["stale".into(), "a.com".into(), "news".into()]);

        let merged = merge_records(&table, &[record(0, "a.com", "fresh")]).unwrap();

        assert_eq!(merged.columns[..2], ["url".to_string(), "label".to_string()]);
        assert_eq!(merged.columns.len(), 2 + FEATURE_COLUMNS.len());
        assert_eq!(merged.column("html_title").unwrap(), vec!["fresh"]);
    }

    #[test]
    fn test_unmatched_url_keeps_empty_features() {
        let table = input(&[("a.com", "x"), ("orphan.com", "y")]);
        let merged = merge_records(&table, &[record(0, "a.com", "A")]).unwrap();

        assert_eq!(merged.len(), 2);
        assert_eq!(merged.rows[1][0], "orphan.com");
        assert!(merged.rows[1][2..].iter().all(String::is_empty));
    }

    #[test]
    fn test_requires_url_column() {
        let table = Table::new(vec!["link".into()]);
        assert!(matches!(merge_records(&table, &[]), Err(TableError::MissingColumn(_))));
    }
}
