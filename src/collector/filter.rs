//! Response filter
//!
//! Drops payloads that are too large, of a content type that cannot carry
//! page features, or attached to a non-2xx status. The status code always
//! survives so the record can still report it.

use super::types::RawResponse;

/// Content type fragments whose payloads are never parsed
pub const BLACKLISTED_CONTENT_TYPES: &[&str] = &[
    "pdf",
    "excel",
    "spreadsheetml",
    "msword",
    "wordprocessingml",
    "image",
    "rtf",
    "zip",
    "octet",
    "csv",
    "json",
];

/// Why a response was discarded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscardReason {
    TooLarge(u64),
    BlacklistedType(String),
    Status(u16),
}

impl std::fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooLarge(len) => write!(f, "body too large ({} bytes)", len),
            Self::BlacklistedType(ct) => write!(f, "unreadable content type '{}'", ct),
            Self::Status(code) => write!(f, "status {}", code),
        }
    }
}

/// Classifies fetched responses as usable or unusable
#[derive(Debug, Clone, Copy)]
pub struct ResponseFilter {
    max_body_bytes: usize,
}

impl ResponseFilter {
    pub fn new(max_body_bytes: usize) -> Self {
        Self { max_body_bytes }
    }

    /// Return the response unmodified, or reduced to its status code.
    ///
    /// Never fails. An absent response stays absent; an absent content type
    /// or body only skips the rule that needs it.
    pub fn apply(&self, response: Option<RawResponse>) -> Option<RawResponse> {
        let response = response?;
        match self.discard_reason(&response) {
            Some(reason) => {
                tracing::debug!("Discarding response: {}", reason);
                Some(RawResponse::status_only(response.status))
            }
            None => Some(response),
        }
    }

    /// The first rule that marks this response unusable, if any
    pub fn discard_reason(&self, response: &RawResponse) -> Option<DiscardReason> {
        let limit = self.max_body_bytes as u64;
        let observed = response.body.as_ref().map(|b| b.len() as u64);
        if let Some(len) = observed.into_iter().chain(response.declared_length).max() {
            if len > limit {
                return Some(DiscardReason::TooLarge(len));
            }
        }

        if let Some(content_type) = &response.content_type {
            let lowered = content_type.to_ascii_lowercase();
            if BLACKLISTED_CONTENT_TYPES.iter().any(|t| lowered.contains(t)) {
                return Some(DiscardReason::BlacklistedType(content_type.clone()));
            }
        }

        if !response.is_success() {
            return Some(DiscardReason::Status(response.status));
        }

        None
    }

    /// Whether `apply` would reduce this response
    pub fn is_discarded(&self, response: &RawResponse) -> bool {
        self.discard_reason(response).is_some()
    }
}

impl Default for ResponseFilter {
    fn default() -> Self {
        Self::new(10_000_000)
    }
}
