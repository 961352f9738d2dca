//! Pipeline types shared by the fetch, render and extract stages

use bytes::Bytes;
use url::Url;

/// A URL to fetch, tagged with its position in the input list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTarget {
    /// Stable position in the original input; the only correlation key once
    /// work is dispatched concurrently
    pub index: usize,
    /// The URL exactly as it appeared in the input
    pub url: String,
}

impl FetchTarget {
    pub fn new(index: usize, url: impl Into<String>) -> Self {
        Self {
            index,
            url: url.into(),
        }
    }

    /// Build dense targets over `[offset, offset + urls.len())`
    pub fn from_urls<S: AsRef<str>>(offset: usize, urls: &[S]) -> Vec<Self> {
        urls.iter()
            .enumerate()
            .map(|(i, url)| Self::new(offset + i, url.as_ref()))
            .collect()
    }
}

/// Classification of a fetch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// Fetched and usable
    Ok,
    /// Fetched but unusable; payload dropped, status code kept
    Discarded,
    /// Could not fetch
    Failed,
}

/// A response as seen by the pipeline, before or after filtering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// Declared content type, if any
    pub content_type: Option<String>,
    /// Declared `Content-Length`, if any
    pub declared_length: Option<u64>,
    /// Payload bytes; `None` once discarded
    pub body: Option<Bytes>,
}

impl RawResponse {
    /// Response with a full body
    pub fn new(status: u16, content_type: Option<&str>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type: content_type.map(str::to_string),
            declared_length: None,
            body: Some(body.into()),
        }
    }

    /// Reduced response carrying only the status code
    pub fn status_only(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            declared_length: None,
            body: None,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Result of fetching one target; exactly one per input index
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub index: usize,
    /// The URL exactly as it appeared in the input
    pub url: String,
    /// The URL after normalization, if it could be parsed
    pub resolved_url: Option<Url>,
    pub status: FetchStatus,
    /// Observed status code, -1 if no response
    pub http_status: i32,
    pub content_type: Option<String>,
    /// Decoded body, present only for `FetchStatus::Ok`
    pub body: Option<String>,
    /// DOM after script execution, set by the render stage
    pub rendered_html: Option<String>,
}

impl FetchOutcome {
    /// Outcome for a target that could not be fetched at all
    pub fn failed(target: &FetchTarget, resolved_url: Option<Url>) -> Self {
        Self {
            index: target.index,
            url: target.url.clone(),
            resolved_url,
            status: FetchStatus::Failed,
            http_status: -1,
            content_type: None,
            body: None,
            rendered_html: None,
        }
    }

    pub fn body_available(&self) -> bool {
        self.body.is_some()
    }

    /// The HTML to extract from: rendered if available, otherwise as fetched
    pub fn html(&self) -> Option<&str> {
        self.rendered_html.as_deref().or(self.body.as_deref())
    }
}
