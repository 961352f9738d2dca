//! Extraction types

use serde::Serialize;
use thiserror::Error;

/// Why a document could not be turned into features
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Unreadable content type: {0}")]
    Unreadable(String),
    #[error("Failed to parse document: {0}")]
    Parse(String),
}

/// Limits applied during extraction
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Word budget for the concatenated div text
    pub max_div_words: usize,
    /// Hard character cap applied after the word budget
    pub max_div_chars: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_div_words: 500,
            max_div_chars: 5000,
        }
    }
}

impl From<&crate::config::CollectorConfig> for ExtractorConfig {
    fn from(config: &crate::config::CollectorConfig) -> Self {
        Self {
            max_div_words: config.max_div_words,
            max_div_chars: config.max_div_chars(),
        }
    }
}

/// Output columns, in order, excluding `url`
pub const FEATURE_COLUMNS: &[&str] = &[
    "url_path",
    "root_page_title",
    "http_response",
    "html_title",
    "meta_description",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "div_text",
];

/// Features of one page; one record per input index
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedRecord {
    #[serde(skip)]
    pub index: usize,
    pub url: String,
    pub url_path: String,
    pub root_page_title: String,
    /// Observed status code, -1 when no response was obtained
    #[serde(rename = "http_response")]
    pub http_response_code: i32,
    pub html_title: String,
    pub meta_description: String,
    /// JSON arrays of header texts
    pub h1: String,
    pub h2: String,
    pub h3: String,
    pub h4: String,
    pub h5: String,
    pub h6: String,
    pub div_text: String,
}

impl ExtractedRecord {
    /// Empty record for `url` at `index`
    pub fn new(index: usize, url: impl Into<String>) -> Self {
        Self {
            index,
            url: url.into(),
            url_path: String::new(),
            root_page_title: String::new(),
            http_response_code: -1,
            html_title: String::new(),
            meta_description: String::new(),
            h1: String::new(),
            h2: String::new(),
            h3: String::new(),
            h4: String::new(),
            h5: String::new(),
            h6: String::new(),
            div_text: String::new(),
        }
    }

    /// Set the header column for `level` (1..=6); other levels are ignored.
    pub fn set_header(&mut self, level: u8, value: String) {
        match level {
            1 => self.h1 = value,
            2 => self.h2 = value,
            3 => self.h3 = value,
            4 => self.h4 = value,
            5 => self.h5 = value,
            6 => self.h6 = value,
            _ => {}
        }
    }

    pub fn header(&self, level: u8) -> Option<&str> {
        match level {
            1 => Some(&self.h1),
            2 => Some(&self.h2),
            3 => Some(&self.h3),
            4 => Some(&self.h4),
            5 => Some(&self.h5),
            6 => Some(&self.h6),
            _ => None,
        }
    }

    /// Feature values in [`FEATURE_COLUMNS`] order
    pub fn feature_values(&self) -> Vec<String> {
        vec![
            self.url_path.clone(),
            self.root_page_title.clone(),
            self.http_response_code.to_string(),
            self.html_title.clone(),
            self.meta_description.clone(),
            self.h1.clone(),
            self.h2.clone(),
            self.h3.clone(),
            self.h4.clone(),
            self.h5.clone(),
            self.h6.clone(),
            self.div_text.clone(),
        ]
    }
}
