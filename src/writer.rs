// A streaming writer that escapes untrusted values contextually.
//
// The writer tracks the context of everything written so far: safe
// chunks advance it through the scanner (and are emitted in normalized
// form), and untrusted values are piped through the escapers the current
// context calls for. No guarantee is made about the context the stream
// ends in.

use std::io::Write;

use crate::content::Value;
use crate::context::Context;
use crate::error::AutoescapeError;
use crate::escaping::{esc_mode_for_hole, sanitize};
use crate::scanner::process_raw_text;

/// Wraps a stream so interleaved safe markup and untrusted values come
/// out contextually escaped.
pub struct EscapingWriter<W: Write> {
    inner: W,
    ctx: Context,
}

impl<W: Write> EscapingWriter<W> {
    /// A writer starting in the plain HTML text context.
    pub fn new(inner: W) -> EscapingWriter<W> {
        EscapingWriter::with_context(inner, Context::default())
    }

    /// A writer starting in an explicit context.
    pub fn with_context(inner: W, ctx: Context) -> EscapingWriter<W> {
        EscapingWriter { inner, ctx }
    }

    /// The context after everything written so far.
    pub fn context(&self) -> Context {
        self.ctx
    }

    /// Writes trusted markup, advancing the context across it. The chunk
    /// is emitted in normalized form (comments elided, unquoted attribute
    /// values quoted, stray `<` entity-encoded).
    pub fn write_safe(&mut self, safe: &str) -> Result<(), AutoescapeError> {
        let scan = process_raw_text(safe, self.ctx);
        if let Some(err) = scan.error {
            return Err(AutoescapeError::Escape(vec![err.describe()]));
        }
        self.inner.write_all(scan.text.as_bytes())?;
        self.ctx = scan.context;
        Ok(())
    }

    /// Writes an untrusted value through the escapers the current context
    /// requires.
    pub fn write_untrusted(&mut self, value: &Value) -> Result<(), AutoescapeError> {
        let (ctx, esc_modes, problem) = esc_mode_for_hole(self.ctx);
        if let Some(problem) = problem {
            return Err(AutoescapeError::Escape(vec![problem]));
        }
        if ctx.is_error() {
            return Err(AutoescapeError::Escape(vec![format!(
                "value cannot appear in {}",
                self.ctx
            )]));
        }
        let mut value = value.clone();
        for mode in esc_modes {
            value = sanitize(mode, &value);
        }
        self.inner.write_all(value.coerce_str().as_bytes())?;
        self.ctx = ctx;
        Ok(())
    }

    /// Unwraps the underlying stream.
    pub fn into_inner(self) -> W {
        self.inner
    }
}
