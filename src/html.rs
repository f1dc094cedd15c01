// HTML attribute classification and entity decoding.

use crate::context::AttrKind;

/// Lower-case names of attributes whose value is a URL.
///
/// Derived from the HTML4 index of attributes typed `%URI` plus the HTML5
/// additions. Attributes like `<meta content>` that are only conditionally
/// URLs are not listed.
const URL_ATTR_NAMES: &[&str] = &[
    "action",
    "archive",
    "background",
    "cite",
    "classid",
    "codebase",
    "data",
    "dsync",
    "formaction",
    "href",
    "longdesc",
    "manifest",
    "poster",
    "profile",
    "src",
    "usemap",
    "xmlns",
];

/// Classifies an attribute by name: event handlers are script, `style` is
/// CSS, known URL attributes (and names that look like custom URL-bearing
/// attributes) are URLs.
pub(crate) fn classify_attr(name: &str) -> AttrKind {
    let mut name = name.to_ascii_lowercase();
    if let Some(colon) = name.find(':') {
        if &name[..colon] == "xmlns" {
            return AttrKind::Url;
        }
        // Treat html:href, xlink:href, svg:onclick, etc. the same
        // regardless of prefix. An XML vocabulary where foo:href is script
        // would defeat this, but none is known, so the unprefixed reading
        // is the conservative one.
        name = name[colon + 1..].to_string();
    }
    if name.starts_with("on") {
        AttrKind::Script
    } else if name == "style" {
        AttrKind::Style
    } else if URL_ATTR_NAMES.contains(&name.as_str()) {
        AttrKind::Url
    } else if name.contains("url") || name.contains("uri") {
        // Heuristic for custom and data-* attributes: a name mentioning
        // "url" or "uri" very likely holds one.
        AttrKind::Url
    } else {
        AttrKind::None
    }
}

/// Given HTML that would parse to a single text node, returns the text
/// value of that node.
pub(crate) fn unescape_html(html: &str) -> String {
    if !html.contains('&') {
        return html.to_string();
    }
    html_escape::decode_html_entities(html).into_owned()
}
