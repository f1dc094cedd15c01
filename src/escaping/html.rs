// HTML escapers and filters.
//
// Escaped output uses the named entities for `&`, `<`, `>` and numeric
// references for quotes (`&#34;`, `&#39;`) so the result is safe in both
// quoted-attribute and text positions.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use crate::content::{ContentKind, Value};

/// Escapes HTML special characters, quotes included. Known-safe HTML
/// passes through untouched.
pub(crate) fn escape_html(value: &Value) -> Value {
    if value.content_kind() == Some(ContentKind::Html) {
        return Value::Str(value.coerce_str());
    }
    Value::Str(escape_html_str(&value.coerce_str()).into_owned())
}

/// Escapes for RCDATA bodies (`<textarea>`, `<title>`). Known-safe HTML is
/// only normalized: RCDATA cannot contain elements, so an innocuous
/// `</textarea>` inside it must still not end the element.
pub(crate) fn escape_html_rcdata(value: &Value) -> Value {
    if value.content_kind() == Some(ContentKind::Html) {
        return Value::Str(normalize_html_str(&value.coerce_str()).into_owned());
    }
    Value::Str(escape_html_str(&value.coerce_str()).into_owned())
}

/// Escapes for an attribute value. Known-safe HTML is first stripped of
/// tags and comments, then normalized.
pub(crate) fn escape_html_attribute(value: &Value) -> Value {
    if value.content_kind() == Some(ContentKind::Html) {
        let stripped = strip_html_tags(&value.coerce_str());
        return Value::Str(normalize_html_str(&stripped).into_owned());
    }
    Value::Str(escape_html_str(&value.coerce_str()).into_owned())
}

/// Attribute names that carry script, style, or URL payloads; a dynamic
/// attribute name must not be able to smuggle one in.
const DENIED_ATTR_PREFIXES: &[&str] = &[
    "style",
    "on",
    "action",
    "archive",
    "background",
    "cite",
    "classid",
    "codebase",
    "data",
    "dsync",
    "href",
    "longdesc",
    "src",
    "usemap",
];

/// Filters out strings that cannot be a substring of a valid HTML
/// attribute. Returns `zSafehtmlz` for rejected input.
pub(crate) fn filter_html_attribute(value: &Value) -> Value {
    if value.content_kind() == Some(ContentKind::HtmlAttr) {
        return Value::Str(value.coerce_str());
    }
    let raw = value.coerce_str();
    let mut out = filter_attr_str(&raw).to_string();
    if let Some(eq) = out.find('=') {
        if !out.ends_with('"') && !out.ends_with('\'') {
            // Quote the value so a contextually escaped whole attribute
            // cannot absorb a following `={{...}}` as its own value: with
            // {{$x}}={{$y}}, an $x of "dir=ltr" must not make the parser
            // see dir=ltr={{$y}}.
            out.insert(eq + 1, '"');
            out.push('"');
        }
    }
    Value::Str(out)
}

fn filter_attr_str(raw: &str) -> &str {
    static SHAPE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)^(?:[a-z0-9_$:-]+|dir=(?:ltr|rtl))$").expect("regex"));
    let lower = raw.to_ascii_lowercase();
    if SHAPE.is_match(raw)
        && !DENIED_ATTR_PREFIXES
            .iter()
            .any(|prefix| lower.starts_with(prefix))
    {
        raw
    } else {
        "zSafehtmlz"
    }
}

/// Element names that would change the content model of their body.
const DENIED_ELEMENT_PREFIXES: &[&str] = &["script", "style", "title", "textarea", "xmp", "no"];

/// Filters out strings that cannot be a substring of a valid HTML element
/// name. Returns `zSafehtmlz` for rejected input.
pub(crate) fn filter_html_element_name(value: &Value) -> Value {
    static SHAPE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)^[a-z0-9_$:-]*$").expect("regex"));
    let raw = value.coerce_str();
    let lower = raw.to_ascii_lowercase();
    if SHAPE.is_match(&raw)
        && !DENIED_ELEMENT_PREFIXES
            .iter()
            .any(|prefix| lower.starts_with(prefix))
    {
        Value::Str(raw)
    } else {
        Value::Str("zSafehtmlz".to_string())
    }
}

/// Removes tags, comments, and DOCTYPEs from known-safe (tag-soup) HTML.
fn strip_html_tags(html: &str) -> String {
    static TAG: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"(?i)<(?:!|/?[a-z])(?:[^>'"]|"[^"]*"|'[^']*')*>"#).expect("regex")
    });
    TAG.replace_all(html, "").into_owned()
}

/// `'<a&gt;'` → `'&lt;a&amp;gt;'`.
pub(crate) fn escape_html_str(s: &str) -> Cow<'_, str> {
    escape_html_impl(s, true, true, true)
}

/// Escapes an attribute value for embedding between double quotes; leaves
/// `'` alone.
pub(crate) fn escape_html_dq_only(s: &str) -> Cow<'_, str> {
    escape_html_impl(s, true, true, false)
}

/// Escapes an attribute value for embedding between single quotes; leaves
/// `"` alone.
pub(crate) fn escape_html_sq_only(s: &str) -> Cow<'_, str> {
    escape_html_impl(s, true, false, true)
}

/// `'<a&gt;'` → `'&lt;a&gt;'`: re-escapes structure characters without
/// touching existing entities.
pub(crate) fn normalize_html_str(s: &str) -> Cow<'_, str> {
    escape_html_impl(s, false, true, true)
}

fn escape_html_impl(s: &str, esc_amp: bool, esc_dq: bool, esc_sq: bool) -> Cow<'_, str> {
    let needs = |b: u8| -> Option<&'static str> {
        match b {
            0 => Some("&#0;"),
            b'<' => Some("&lt;"),
            b'>' => Some("&gt;"),
            b'&' if esc_amp => Some("&amp;"),
            b'"' if esc_dq => Some("&#34;"),
            b'\'' if esc_sq => Some("&#39;"),
            _ => None,
        }
    };

    // Fast path: nothing to escape, so return a borrowed slice.
    let bytes = s.as_bytes();
    if !bytes.iter().any(|&b| needs(b).is_some()) {
        return Cow::Borrowed(s);
    }

    // All matched characters are single-byte ASCII, so byte offsets are
    // valid UTF-8 boundaries.
    let mut out = String::with_capacity(s.len() + 8);
    let mut last = 0;
    for (i, &b) in bytes.iter().enumerate() {
        if let Some(rep) = needs(b) {
            out.push_str(&s[last..i]);
            out.push_str(rep);
            last = i + 1;
        }
    }
    out.push_str(&s[last..]);
    Cow::Owned(out)
}
