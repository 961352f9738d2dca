//! Markup dialect selection

use quick_xml::events::Event;
use quick_xml::Reader;

use super::ExtractError;

/// How a document will be parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Html,
    Xml,
}

impl Dialect {
    /// Dialect from a declared content type. `None` means the payload is not
    /// markup we can read.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let lowered = content_type.to_ascii_lowercase();
        if lowered.contains("html") {
            Some(Self::Html)
        } else if lowered.contains("xml") {
            Some(Self::Xml)
        } else {
            None
        }
    }
}

/// Reject XML that is not well-formed. HTML parsing is forgiving, so this is
/// the only structural failure a document can hit.
pub fn check_well_formed(xml: &str) -> Result<(), ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut depth = 0usize;
    let mut saw_root = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(_)) => {
                depth += 1;
                saw_root = true;
            }
            Ok(Event::End(_)) => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| ExtractError::Parse("unbalanced closing tag".to_string()))?;
            }
            Ok(Event::Empty(_)) => saw_root = true,
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(ExtractError::Parse(format!(
                    "{} at byte {}",
                    e,
                    reader.buffer_position()
                )))
            }
        }
    }

    if depth != 0 {
        return Err(ExtractError::Parse(format!("{} unclosed element(s)", depth)));
    }
    if !saw_root {
        return Err(ExtractError::Parse("no root element".to_string()));
    }
    Ok(())
}
