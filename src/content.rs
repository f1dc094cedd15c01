// Typed content and the template data model.
//
// A `TypedContent` is a string from a trusted source carrying the kind of
// context it is known to be safe in. Escapers pass matching typed content
// through (or only normalize it) instead of double-escaping.

use std::collections::BTreeMap;
use std::fmt;

/// The kind of context a [`TypedContent`] string is known safe in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    /// Plain text; no special meaning in any context.
    Plain,
    /// A CSS stylesheet, rule, declaration list, or value production.
    Css,
    /// An HTML fragment that neither starts nor ends inside a tag, comment,
    /// entity, or DOCTYPE, and contains no foreign executable code.
    Html,
    /// A complete HTML attribute, e.g. ` dir="ltr"`.
    HtmlAttr,
    /// A JS expression or SourceElement list.
    Js,
    /// A run of characters embeddable between quotes in a JS program:
    /// no unescaped quotes, line terminators, or trailing half-escapes.
    JsStrChars,
    /// A properly encoded portion of a URL.
    Url,
}

/// A wrapped string whose content is known safe for a particular kind of
/// context.
///
/// Only wrap content you would be comfortable writing into a template
/// literally: the escapers trust the label and skip (or merely normalize)
/// their usual work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedContent {
    pub content: String,
    pub kind: ContentKind,
}

impl TypedContent {
    pub fn new(content: impl Into<String>, kind: ContentKind) -> TypedContent {
        TypedContent {
            content: content.into(),
            kind,
        }
    }
}

impl fmt::Display for TypedContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}

/// A known-safe HTML document fragment.
pub fn safe_html(content: impl Into<String>) -> Value {
    Value::Safe(TypedContent::new(content, ContentKind::Html))
}

/// A known-safe complete HTML attribute (` name="value"`).
pub fn safe_html_attr(content: impl Into<String>) -> Value {
    Value::Safe(TypedContent::new(content, ContentKind::HtmlAttr))
}

/// Known-safe CSS.
pub fn safe_css(content: impl Into<String>) -> Value {
    Value::Safe(TypedContent::new(content, ContentKind::Css))
}

/// A known-safe JS expression.
pub fn safe_js(content: impl Into<String>) -> Value {
    Value::Safe(TypedContent::new(content, ContentKind::Js))
}

/// Known-safe JS string characters.
pub fn safe_js_str(content: impl Into<String>) -> Value {
    Value::Safe(TypedContent::new(content, ContentKind::JsStrChars))
}

/// A known-safe URL. Dynamic `javascript:` URLs are normally filtered out;
/// wrapping one here vouches for it.
pub fn safe_url(content: impl Into<String>) -> Value {
    Value::Safe(TypedContent::new(content, ContentKind::Url))
}

/// A value interpolated into a template.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    /// Ordered so rendered output is deterministic.
    Map(BTreeMap<String, Value>),
    Safe(TypedContent),
}

impl Value {
    /// Whether the value is truthy for `{{if}}`, `{{with}}`, and the
    /// zero-iteration check of `{{range}}`. Mirrors emptiness: `Null`,
    /// `false`, `0`, `""`, and empty collections are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(entries) => !entries.is_empty(),
            Value::Safe(c) => !c.content.is_empty(),
        }
    }

    /// Field lookup for `.Field` references. Non-maps have no fields.
    pub fn field(&self, name: &str) -> Value {
        match self {
            Value::Map(entries) => entries.get(name).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    /// The kind tag if this is typed content.
    pub(crate) fn content_kind(&self) -> Option<ContentKind> {
        match self {
            Value::Safe(c) => Some(c.kind),
            _ => None,
        }
    }

    /// Coerce to the string form used when a value reaches an escaper or
    /// the output. `Null` renders empty; collections render as JSON.
    pub(crate) fn coerce_str(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(n) => n.to_string(),
            Value::Str(s) => s.clone(),
            Value::Safe(c) => c.content.clone(),
            Value::List(_) | Value::Map(_) => {
                crate::escaping::js::to_json(self).unwrap_or_default()
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Value {
        Value::Int(n)
    }
}
