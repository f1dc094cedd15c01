// JavaScript escapers.
//
// String and regexp escaping emit `\xXX`/`\uXXXX` (never HTML-significant
// characters), so their output is embeddable in attribute values without a
// further HTML pass. Value escaping renders whole data values as JS
// literals via JSON.

use crate::content::{ContentKind, Value};

/// Escapes a value into a valid run of JS StringCharacters. Known-safe
/// JS string chars are only normalized.
pub(crate) fn escape_js_string(value: &Value) -> Value {
    if value.content_kind() == Some(ContentKind::JsStrChars) {
        return Value::Str(normalize_js_str(&value.coerce_str(), false));
    }
    Value::Str(escape_js_str_chars(&value.coerce_str(), false))
}

/// Escapes a value for embedding in a JS regexp literal: everything
/// `escape_js_string` escapes plus the regexp metacharacters. The empty
/// string becomes `(?:)` so `/{{.}}/` cannot collapse into a line comment.
pub(crate) fn escape_js_regex(value: &Value) -> Value {
    if value.content_kind() == Some(ContentKind::JsStrChars) {
        return Value::Str(normalize_js_str(&value.coerce_str(), true));
    }
    let escaped = escape_js_str_chars(&value.coerce_str(), true);
    if escaped.is_empty() {
        return Value::Str("(?:)".to_string());
    }
    Value::Str(escaped)
}

/// Encodes a value as a JavaScript literal.
///
/// Objects are parenthesized so `{...}` cannot be read as a block; bare
/// literals are padded with spaces so they cannot fuse with neighboring
/// tokens; `<` and `>` are hex-escaped so string content cannot introduce
/// HTML token boundaries.
pub(crate) fn escape_js_value(value: &Value) -> Value {
    if value.content_kind() == Some(ContentKind::Js) {
        let content = value.coerce_str();
        // A typed expression containing '</script' could still close the
        // enclosing script element; there is no faithful fixup.
        if content.to_ascii_lowercase().contains("</script") {
            return Value::Str(" null ".to_string());
        }
        return Value::Str(content);
    }

    let Some(encoded) = to_json(value) else {
        return Value::Str(" null ".to_string());
    };
    let wrapped = match encoded.as_bytes().first() {
        Some(b'{') => format!("({encoded})"),
        Some(b'[') | Some(b'"') => encoded,
        // " true ", " 42 ": spaces keep literals from being glued onto
        // identifiers; parentheses could be read as a call.
        _ => format!(" {encoded} "),
    };
    Value::Str(wrapped.replace('<', r"\x3c").replace('>', r"\x3e"))
}

/// JSON-encodes a value with ASCII-only escapes (U+2028/U+2029 included).
/// `None` when the value has no JSON form (non-finite floats at the root).
pub(crate) fn to_json(value: &Value) -> Option<String> {
    let json = to_json_value(value)?;
    let compact = serde_json::to_string(&json).ok()?;
    Some(ascii_only(&compact))
}

fn to_json_value(value: &Value) -> Option<serde_json::Value> {
    Some(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(n) => serde_json::Value::Number((*n).into()),
        Value::Float(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::Safe(c) => serde_json::Value::String(c.content.clone()),
        Value::List(items) => {
            serde_json::Value::Array(items.iter().map(to_json_value).collect::<Option<_>>()?)
        }
        Value::Map(entries) => serde_json::Value::Object(
            entries
                .iter()
                .map(|(k, v)| Some((k.clone(), to_json_value(v)?)))
                .collect::<Option<_>>()?,
        ),
    })
}

fn ascii_only(s: &str) -> String {
    if s.is_ascii() {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            // Non-ASCII only occurs inside JSON strings; escape per
            // JSON/UTF-16, using surrogate pairs above the BMP.
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    out
}

/// Whether a character must be escaped inside a JS string literal.
fn is_js_string_special(c: char) -> bool {
    matches!(c,
        '\u{0}' | '\u{8}'..='\u{d}' | '"' | '&' | '\'' | '+' | '/' | '<' | '=' | '>' | '\\'
        | '\u{7f}' | '\u{85}' | '\u{2028}' | '\u{2029}')
}

/// Regexp metacharacters, beyond the string specials.
fn is_js_regex_special(c: char) -> bool {
    matches!(c,
        '$' | '(' | ')' | '*' | ',' | '-' | '.' | ':' | ';' | '?' | '[' | ']' | '^'
        | '{' | '|' | '}')
}

fn push_js_escape(out: &mut String, c: char) {
    match c {
        // '\x08' is NOT written as '\b' since that means word-break in
        // regexps.
        '\t' => out.push_str("\\t"),
        '\n' => out.push_str("\\n"),
        '\u{c}' => out.push_str("\\f"),
        '\r' => out.push_str("\\r"),
        '/' => out.push_str("\\/"),
        '\\' => out.push_str("\\\\"),
        _ => {
            let code = c as u32;
            if code < 0x100 {
                out.push_str(&format!("\\x{code:02x}"));
            } else {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{unit:04x}"));
                }
            }
        }
    }
}

fn escape_js_str_chars(s: &str, regex: bool) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        if is_js_string_special(c) || (regex && is_js_regex_special(c)) {
            push_js_escape(&mut out, c);
        } else {
            out.push(c);
        }
    }
    out
}

/// Normalization for content already known to be JS string characters:
/// existing escape sequences are left alone, but a `\` that dangles at the
/// end or before a line terminator is doubled, and HTML-significant
/// characters are still hex-escaped.
fn normalize_js_str(s: &str, regex: bool) -> String {
    let is_special =
        |c: char| (is_js_string_special(c) && c != '\\') || (regex && is_js_regex_special(c));
    let mut out = String::with_capacity(s.len() + 8);
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some(&next) if !matches!(next, '\n' | '\r' | '\u{2028}' | '\u{2029}') => {
                    out.push('\\');
                    out.push(next);
                    chars.next();
                }
                _ => out.push_str("\\\\"),
            }
        } else if is_special(c) {
            push_js_escape(&mut out, c);
        } else {
            out.push(c);
        }
    }
    out
}
