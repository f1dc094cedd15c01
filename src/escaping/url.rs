// URL escapers.
//
// Percent-encoding emits lowercase hex over UTF-8 bytes. Three levels:
// `escape_url` for query/fragment values (everything but unreserved),
// `normalize_url` for whole well-formed URLs (only what no URL part may
// contain raw, plus stray `%`), and `filter_url` to vet the scheme.

use std::sync::LazyLock;

use regex::Regex;

use crate::content::{ContentKind, Value};

/// Percent-encodes everything outside `A-Za-z0-9._~-`, the RFC 3986
/// unreserved set. Known-safe URLs are normalized instead.
pub(crate) fn escape_url(value: &Value) -> Value {
    if value.content_kind() == Some(ContentKind::Url) {
        return normalize_url(value);
    }
    let s = value.coerce_str();
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'~' | b'-') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02x}"));
        }
    }
    Value::Str(out)
}

/// Removes rough edges from a URL: escapes characters that are neither
/// reserved nor unreserved (HTML/JS/CSS string delimiters among them) and
/// any `%` not followed by two hex digits.
///
/// Apostrophes and parentheses are reserved only by the obsolete `mark`
/// production of RFC 3986 appendix D.2, so encoding them never changes
/// the URL's meaning, and they are special in the languages URLs get
/// embedded in.
pub(crate) fn normalize_url(value: &Value) -> Value {
    let s = value.coerce_str();
    let bytes = s.as_bytes();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let keep = match b {
            b'%' => bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit(),
            _ => {
                b.is_ascii_alphanumeric()
                    || matches!(b,
                        b'.' | b'_' | b'~' | b'-'                               // unreserved
                        | b':' | b'/' | b'?' | b'#' | b'[' | b']' | b'@'        // gen-delims
                        | b'!' | b'$' | b'&' | b'*' | b'+' | b',' | b';' | b'=' // sub-delims
                    )
            }
        };
        if keep {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02x}"));
        }
        i += 1;
    }
    Value::Str(out)
}

/// Vets a URL's protocol: relative URLs and `http`, `https`, and `mailto`
/// pass; anything that could select another scheme (`javascript:`,
/// `vbscript:`, `data:`...) becomes `#zSafehtmlz`. Known-safe URLs pass
/// through typed so a following normalization still sees the label.
pub(crate) fn filter_url(value: &Value) -> Value {
    static OK: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)^(?:(?:https?|mailto):|[^&:/?#]*(?:[/?#]|$))").expect("regex")
    });
    if value.content_kind() == Some(ContentKind::Url) {
        return value.clone();
    }
    let s = value.coerce_str();
    if OK.is_match(&s) {
        Value::Str(s)
    } else {
        Value::Str("#zSafehtmlz".to_string())
    }
}
