//! Text gathering for headers and block containers

use scraper::{ElementRef, Html};

use super::FeatureExtractor;
use crate::util::truncate_chars;

/// Elements whose text never reaches a feature
const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Text nodes under `element`, each trimmed, empties dropped, joined by a
/// single space. Script and style contents are skipped.
pub(super) fn stripped_text(element: ElementRef<'_>) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| HIDDEN_TAGS.contains(&el.name()))
        });
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed);
        }
    }
    parts.join(" ")
}

impl FeatureExtractor {
    /// Header texts of one level as a JSON array.
    ///
    /// Headers containing a link anywhere inside them are navigation, not
    /// content, and are left out.
    pub(super) fn header_json(&self, document: &Html, level: u8) -> String {
        let Some(selector) = self.header_selectors.get(usize::from(level).saturating_sub(1)) else {
            return String::new();
        };

        let texts: Vec<String> = document
            .select(selector)
            .filter(|header| header.select(&self.link_selector).next().is_none())
            .map(stripped_text)
            .collect();

        serde_json::to_string(&texts).unwrap_or_default()
    }

    /// Concatenated text of block containers in document order.
    ///
    /// Containers are taken whole while the running word count stays within
    /// budget; the first one that would exceed it stops the scan. The result
    /// is then cut to the character cap, so a single enormous word cannot
    /// blow past it.
    pub(super) fn div_text(&self, document: &Html) -> String {
        let mut collected = String::new();
        let mut words = 0usize;

        for container in document.select(&self.container_selector) {
            let text = stripped_text(container);
            let count = text.split_whitespace().count();
            if words + count > self.config.max_div_words {
                break;
            }
            if count == 0 {
                continue;
            }
            if !collected.is_empty() {
                collected.push(' ');
            }
            collected.push_str(&text);
            words += count;
        }

        truncate_chars(&collected, self.config.max_div_chars).to_string()
    }
}
