/// Errors from parsing, escaping, or rendering templates.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AutoescapeError {
    /// Template source did not parse; the message carries source name and
    /// line.
    #[error("template parse error: {0}")]
    Parse(String),

    /// Escaping failed. All problems found in the run are reported
    /// together; the template set was left unrewritten and is unsafe to
    /// render.
    #[error("{}", .0.join("\n"))]
    Escape(Vec<String>),

    /// Rendering failed (missing template, unknown function, bad arity).
    #[error("render error: {0}")]
    Render(String),

    /// The underlying stream failed while writing escaped output.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
