//! Loaders for xLights files: the layout (`xlights_rgbeffects.xml`) and
//! sequences (`.xsq`). Both produce [`ParsedEntity`] records.

pub mod rgbeffects;
pub mod sequence;

use std::fmt;

pub use rgbeffects::{load_layout, parse_layout};
pub use sequence::{apply_sequence, load_sequence, parse_sequence, ElementEffects, SequenceEffects};

#[derive(Debug)]
pub enum LayoutError {
    Io(std::io::Error),
    Xml(quick_xml::Error),
    Parse(String),
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::Io(e) => write!(f, "I/O error: {e}"),
            LayoutError::Xml(e) => write!(f, "XML error: {e}"),
            LayoutError::Parse(msg) => write!(f, "Parse error: {msg}"),
        }
    }
}

impl std::error::Error for LayoutError {}

impl From<std::io::Error> for LayoutError {
    fn from(e: std::io::Error) -> Self {
        LayoutError::Io(e)
    }
}

impl From<quick_xml::Error> for LayoutError {
    fn from(e: quick_xml::Error) -> Self {
        LayoutError::Xml(e)
    }
}

/// Owned `(key, value)` pairs of an element's attributes, unescaped.
pub(crate) fn attributes(e: &quick_xml::events::BytesStart<'_>) -> Vec<(String, String)> {
    e.attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let value = attr
                .unescape_value()
                .map_or_else(|_| String::from_utf8_lossy(&attr.value).to_string(), |v| v.to_string());
            (key, value)
        })
        .collect()
}

pub(crate) fn attr<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}
