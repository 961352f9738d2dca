//! Page feature extraction
//!
//! Turns one fetch outcome into one [`ExtractedRecord`]:
//! - URL path and root page title, always
//! - Status code, always
//! - Title, meta description, h1-h6 and div text, when the body is readable
//!
//! Extraction never fails outright. Anything that cannot be read leaves the
//! corresponding fields at their defaults.

mod markup;
mod text;
mod types;

pub use markup::{check_well_formed, Dialect};
pub use types::*;

use scraper::{Html, Selector};
use url::Url;

use super::fetcher::with_default_scheme;
use super::types::{FetchOutcome, FetchStatus};
use crate::util::normalize_whitespace;

/// Feature extractor with pre-compiled selectors
pub struct FeatureExtractor {
    pub(crate) config: ExtractorConfig,
    title_selector: Selector,
    description_selector: Selector,
    /// h1..h6, index 0 is h1
    header_selectors: Vec<Selector>,
    link_selector: Selector,
    container_selector: Selector,
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid built-in selector {css}: {e:?}"))
}

impl FeatureExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            config,
            title_selector: selector("title"),
            description_selector: selector("meta[name=\"description\"]"),
            header_selectors: (1..=6).map(|level| selector(&format!("h{}", level))).collect(),
            link_selector: selector("a"),
            container_selector: selector("div"),
        }
    }

    /// Build the record for one outcome.
    ///
    /// `root_page_title` is the cached homepage title of the outcome's site.
    pub fn extract(&self, outcome: &FetchOutcome, root_page_title: &str) -> ExtractedRecord {
        let mut record = base_record(outcome, root_page_title);

        if outcome.status != FetchStatus::Ok {
            return record;
        }
        let Some(html) = outcome.html() else {
            return record;
        };

        let document = match self.parse(outcome.content_type.as_deref(), html) {
            Ok(document) => document,
            Err(e) => {
                tracing::debug!("Skipping features for {}: {}", outcome.url, e);
                return record;
            }
        };

        record.html_title = self.title(&document);
        record.meta_description = self.meta_description(&document);
        for level in 1..=6u8 {
            record.set_header(level, self.header_json(&document, level));
        }
        record.div_text = self.div_text(&document);

        // Release the tree before the record leaves the worker
        drop(document);
        record
    }

    /// Pick the dialect from the content type and parse.
    pub fn parse(&self, content_type: Option<&str>, body: &str) -> Result<Html, ExtractError> {
        let content_type = content_type.unwrap_or_default();
        match Dialect::from_content_type(content_type) {
            Some(Dialect::Html) => Ok(Html::parse_document(body)),
            Some(Dialect::Xml) => {
                check_well_formed(body)?;
                Ok(Html::parse_document(body))
            }
            None => Err(ExtractError::Unreadable(content_type.to_string())),
        }
    }

    fn title(&self, document: &Html) -> String {
        document
            .select(&self.title_selector)
            .next()
            .map(|el| normalize_whitespace(&el.text().collect::<String>()))
            .unwrap_or_default()
    }

    fn meta_description(&self, document: &Html) -> String {
        document
            .select(&self.description_selector)
            .next()
            .and_then(|el| el.value().attr("content"))
            .map(normalize_whitespace)
            .unwrap_or_default()
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(ExtractorConfig::default())
    }
}

/// The fields every record carries, whatever happened to the page
pub fn base_record(outcome: &FetchOutcome, root_page_title: &str) -> ExtractedRecord {
    let mut record = ExtractedRecord::new(outcome.index, outcome.url.clone());
    record.url_path = url_path(&outcome.url);
    record.root_page_title = normalize_whitespace(root_page_title);
    record.http_response_code = outcome.http_status;
    record
}

/// Path component of `raw` without the leading and trailing slash.
///
/// `https://example.com/a/b/` gives `a/b`; a bare host gives the empty string.
pub fn url_path(raw: &str) -> String {
    let Ok(url) = Url::parse(&with_default_scheme(raw.trim())) else {
        return String::new();
    };
    let path = url.path();
    let path = path.strip_prefix('/').unwrap_or(path);
    path.strip_suffix('/').unwrap_or(path).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::FetchTarget;

    fn outcome(content_type: &str, body: &str) -> FetchOutcome {
        FetchOutcome {
            index: 7,
            url: "example.com/about/".to_string(),
            resolved_url: Url::parse("https://example.com/about/").ok(),
            status: FetchStatus::Ok,
            http_status: 200,
            content_type: Some(content_type.to_string()),
            body: Some(body.to_string()),
            rendered_html: None,
        }
    }

    const PAGE: &str = r#"<html>
        <head>
            <title>
                About   us
            </title>
            <meta name="description" content="  Who   we are ">
        </head>
        <body>
            <nav><h2><a href="/">Home</a></h2></nav>
            <h1>About <em>the</em> team</h1>
            <h2>History</h2>
            <h2>Contact</h2>
            <div>Founded in 1999.</div>
        </body>
    </html>"#;

    #[test]
    fn test_extracts_all_features() {
        let extractor = FeatureExtractor::default();
        let record = extractor.extract(&outcome("text/html; charset=utf-8", PAGE), "  Example \n Home ");

        assert_eq!(record.index, 7);
        assert_eq!(record.url, "example.com/about/");
        assert_eq!(record.url_path, "about");
        assert_eq!(record.root_page_title, "Example Home");
        assert_eq!(record.http_response_code, 200);
        assert_eq!(record.html_title, "About us");
        assert_eq!(record.meta_description, "Who we are");
        assert_eq!(record.h1, r#"["About the team"]"#);
        assert_eq!(record.h2, r#"["History","Contact"]"#);
        assert_eq!(record.h3, "[]");
        assert_eq!(record.div_text, "Founded in 1999.");
    }

    #[test]
    fn test_headers_with_links_are_excluded() {
        let extractor = FeatureExtractor::default();
        let html = r#"<h3><span><a href="/x">Deep link</a></span></h3><h3>Plain</h3>"#;
        let record = extractor.extract(&outcome("text/html", html), "");
        assert_eq!(record.h3, r#"["Plain"]"#);
    }

    #[test]
    fn test_prefers_rendered_html() {
        let extractor = FeatureExtractor::default();
        let mut page = outcome("text/html", "<title>Loading</title>");
        page.rendered_html = Some("<title>Loaded</title>".to_string());
        assert_eq!(extractor.extract(&page, "").html_title, "Loaded");
    }

    #[test]
    fn test_failed_outcome_gives_partial_record() {
        let extractor = FeatureExtractor::default();
        let target = FetchTarget::new(3, "https://gone.example/a/b/");
        let record = extractor.extract(&FetchOutcome::failed(&target, None), "");

        assert_eq!(record.url_path, "a/b");
        assert_eq!(record.http_response_code, -1);
        assert_eq!(record.html_title, "");
        assert_eq!(record.h1, "");
    }

    #[test]
    fn test_unreadable_content_type_keeps_status() {
        let extractor = FeatureExtractor::default();
        let record = extractor.extract(&outcome("text/plain", "<title>x</title>"), "Root");
        assert_eq!(record.http_response_code, 200);
        assert_eq!(record.root_page_title, "Root");
        assert_eq!(record.html_title, "");
    }

    #[test]
    fn test_malformed_xml_gives_partial_record() {
        let extractor = FeatureExtractor::default();
        let record = extractor.extract(&outcome("application/xml", "<feed><title>Broken</feed>"), "");
        assert_eq!(record.html_title, "");

        let record = extractor.extract(&outcome("application/xml", "<feed><title>Fine</title></feed>"), "");
        assert_eq!(record.html_title, "Fine");
    }

    #[test]
    fn test_url_path() {
        assert_eq!(url_path("https://example.com"), "");
        assert_eq!(url_path("https://example.com/"), "");
        assert_eq!(url_path("example.com/a/b/"), "a/b");
        assert_eq!(url_path("httpbin.org/a/b/"), "a/b");
        assert_eq!(url_path("http://example.com/docs/index.html?q=1"), "docs/index.html");
        assert_eq!(url_path(""), "");
    }

    #[test]
    fn test_div_text_respects_laws() {
        let extractor = FeatureExtractor::default();
        let many = (0..600).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
        let html = format!("<div>short text</div><div>{}</div><div>after</div>", many);
        let record = extractor.extract(&outcome("text/html", &html), "");
        assert_eq!(record.div_text, "short text");
        assert!(record.div_text.split_whitespace().count() <= 500);
    }
}
