// html-autoescape: contextual auto-escaping for HTML templates.
//
// Architecture:
//   template source → parse → template set → analyze (context propagation
//   over every trace) → rewrite (insert escapers, normalize text, clone
//   helpers per context) → render
//
// Reference implementations:
//   - Go html/template (escape pass): https://pkg.go.dev/html/template
//   - Closure Templates contextual autoescaping:
//     https://github.com/google/closure-templates
//
// The guarantee is structure preservation: no interpolated value, whatever
// its content, can change the HTML/CSS/JS token structure the template
// produces. The analyzer statically determines the lexical context of
// every interpolation (HTML text, attribute value, URL query, JS string,
// CSS url(...), ...) and pipes each one through the escapers that context
// requires.

mod analyzer;
pub mod content;
pub mod context;
mod error;
mod escaping;
mod html;
mod scanner;
mod template;
mod writer;

pub use analyzer::TraceAnalyzer;
pub use content::{
    safe_css, safe_html, safe_html_attr, safe_js, safe_js_str, safe_url, ContentKind,
    TypedContent, Value,
};
pub use error::AutoescapeError;
pub use escaping::{sanitize, EscapeMode};
pub use scanner::{process_raw_text, RawText, ScanError};
pub use template::exec::{TemplateFn, TemplateSet};
pub use template::{Expr, Node, NodeId, Pipeline};
pub use writer::EscapingWriter;

/// Parses template source into a set of named templates.
///
/// `{{define "name"}}...{{end}}` blocks define templates; source outside
/// any block becomes the template named by `default_name`.
///
/// # Examples
///
/// ```
/// use html_autoescape::{parse_templates, Value};
///
/// let mut set = parse_templates("demo", "Hello, {{.}}!", Some("main")).unwrap();
/// set.escape(&["main"]).unwrap();
/// let out = set.render("main", &Value::from("<World>")).unwrap();
/// assert_eq!(out, "Hello, &lt;World&gt;!");
/// ```
pub fn parse_templates(
    src: &str,
    code: &str,
    default_name: Option<&str>,
) -> Result<TemplateSet, AutoescapeError> {
    template::parse::parse_templates(src, code, default_name)
}
