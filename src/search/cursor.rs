//! Durable pagination cursor
//!
//! Remembers, per (index, term, keyword), the last result page consumed so a
//! later search resumes where the previous one stopped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::SearchError;

/// Progress of one search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorEntry {
    pub index: String,
    pub term: String,
    pub keyword: String,
    /// Last page that returned records, if any
    pub last_page: Option<u32>,
    pub updated_at: DateTime<Utc>,
}

impl CursorEntry {
    /// First page the next search should request
    pub fn next_page(&self) -> u32 {
        self.last_page.map_or(0, |page| page + 1)
    }
}

/// JSON file of cursor entries
#[derive(Debug)]
pub struct CursorStore {
    path: PathBuf,
    entries: BTreeMap<String, CursorEntry>,
}

fn key(index: &str, term: &str, keyword: &str) -> String {
    format!("{}|{}|{}", index, term, keyword)
}

impl CursorStore {
    /// Load the store at `path`; a missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self, SearchError> {
        let entries = if path.exists() {
            let json = std::fs::read_to_string(path)?;
            serde_json::from_str(&json)?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, index: &str, term: &str, keyword: &str) -> Option<&CursorEntry> {
        self.entries.get(&key(index, term, keyword))
    }

    /// Next page to request for this search
    pub fn next_page(&self, index: &str, term: &str, keyword: &str) -> u32 {
        self.get(index, term, keyword).map_or(0, CursorEntry::next_page)
    }

    /// Record `page` as consumed
    pub fn advance(&mut self, index: &str, term: &str, keyword: &str, page: u32) {
        let entry = self
            .entries
            .entry(key(index, term, keyword))
            .or_insert_with(|| CursorEntry {
                index: index.to_string(),
                term: term.to_string(),
                keyword: keyword.to_string(),
                last_page: None,
                updated_at: Utc::now(),
            });
        entry.last_page = Some(entry.last_page.map_or(page, |last| last.max(page)));
        entry.updated_at = Utc::now();
    }

    /// Forget every search
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the store, replacing the file atomically
    pub fn save(&self) -> Result<(), SearchError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
