// CSS escapers.

use std::sync::LazyLock;

use regex::Regex;

use crate::content::{ContentKind, Value};

/// Escapes a value so it can be embedded in a quoted CSS string: quotes,
/// newlines, angle brackets, slashes, and controls become `\XX ` hex
/// escapes (the trailing space ends the escape). Known-safe CSS passes.
pub(crate) fn escape_css_string(value: &Value) -> Value {
    if value.content_kind() == Some(ContentKind::Css) {
        return Value::Str(value.coerce_str());
    }
    let s = value.coerce_str();
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        if c == '\\' {
            out.push_str("\\\\");
        } else if is_css_string_special(c) {
            out.push_str(&format!("\\{:x} ", c as u32));
        } else {
            out.push(c);
        }
    }
    Value::Str(out)
}

fn is_css_string_special(c: char) -> bool {
    matches!(c,
        '\u{0}' | '\u{8}'..='\u{d}' | '"' | '&'..='*' | '/' | ':'..='>' | '@' | '{' | '}'
        | '\u{85}' | '\u{a0}' | '\u{2028}' | '\u{2029}')
}

/// Allows a value through as a CSS identifier part, keyword, or quantity.
///
/// CSS escapes are decoded first so `e\78 pression` cannot smuggle
/// `expression` past the identifier check, and the decoded form is
/// rejected if it contains characters that could escape the declaration
/// (per CSS3 error handling, unmatched quotes/brackets make the parser
/// resynchronize in surprising places). Returns `zSafehtmlz` on rejection.
pub(crate) fn filter_css_value(value: &Value) -> Value {
    if let Value::Safe(c) = value {
        if c.kind == ContentKind::Css {
            return value.clone();
        }
    }

    static CSS_ESC: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\\([0-9A-Fa-f]+)[\t\n\x0c\r ]?").expect("regex"));
    static DISALLOWED: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"[\x00"'()/;@\[\\\]`{}<]|--"#).expect("regex"));

    let raw = value.coerce_str();
    let decoded = CSS_ESC.replace_all(&raw, |caps: &regex::Captures<'_>| {
        u32::from_str_radix(&caps[1], 16)
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });

    if !DISALLOWED.is_match(&decoded) {
        let id_chars: String = decoded
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        let denied = id_chars.starts_with("expression")
            || id_chars.starts_with("mozbinding")
            || id_chars.starts_with("binding");
        if !denied {
            return Value::Str(decoded.into_owned());
        }
    }
    Value::Str("zSafehtmlz".to_string())
}
