//! Reader-based XML parsing utilities.
//!
//! Thin wrappers around `quick_xml::Reader` patterns shared by the VOTable,
//! UWS, and VOSI parsers. All three dialects arrive with varying namespace
//! prefixes (`vot:`, `uws:`, `vosi:`, or none), so matching is done on
//! prefix-stripped local names.

use quick_xml::Reader;
use quick_xml::events::BytesStart;
use quick_xml::name::QName;

/// Create a configured `Reader` from a string slice.
///
/// `expand_empty_elements` turns `<TD/>` into `Start` + `End` events so empty
/// cells and self-closing metadata elements go through the same code path as
/// populated ones.
pub(crate) fn make_reader(content: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().expand_empty_elements = true;
    reader
}

/// Prefix-stripped, upper-cased local name for case-insensitive tag matching.
pub(crate) fn local_name_upper(name: QName) -> Vec<u8> {
    name.local_name().as_ref().to_ascii_uppercase()
}

/// Extract an attribute value from a `BytesStart` event.
///
/// Returns `Some(String)` if the attribute exists, `None` otherwise.
pub(crate) fn get_attr(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.try_get_attribute(name)
        .ok()?
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

/// Extract an attribute value, trying each candidate name in order.
///
/// UWS result links appear as `xlink:href` or plain `href` depending on the
/// server.
pub(crate) fn get_attr_any(e: &BytesStart, names: &[&[u8]]) -> Option<String> {
    names.iter().find_map(|name| get_attr(e, name))
}
