// The raw-text scanner: advances a context across literal template text
// and produces the normalized form of that text.
//
// The scanner repeatedly applies the applicable transition whose pattern
// matches earliest in the remaining input (ties go to table order).
// Attribute values are entity-decoded before the embedded language is
// scanned, then re-encoded; unquoted values are normalized to quoted
// ones. Comments are elided. A chunk that cannot be tokenized leaves the
// scanner in the absorbing error context, with the offending suffix
// reported.

pub(crate) mod js;
mod transitions;

use crate::context::{Context, Delim, Element, JsCtx, State, UrlPart};
use crate::escaping::html::{escape_html_dq_only, escape_html_sq_only};
use crate::html::{classify_attr, unescape_html};

use transitions::{
    elides_content, rcdata_tag_name, tag_done_context, transitions, Emit, Rule, Transition,
};

/// The outcome of scanning one chunk of literal template text.
#[derive(Debug, Clone)]
pub struct RawText {
    /// The context after the chunk. `State::Error` iff `error` is set.
    pub context: Context,
    /// The normalized form of the chunk.
    pub text: String,
    /// The first unrecoverable token, when scanning failed.
    pub error: Option<ScanError>,
}

/// Where and why the scanner gave up.
#[derive(Debug, Clone)]
pub struct ScanError {
    /// The context in which the unscannable content appeared.
    pub context: Context,
    /// The unprocessed suffix, starting at the failure.
    pub remaining: String,
    /// A specific explanation, when one beats "bad content".
    pub message: Option<String>,
}

impl ScanError {
    /// The message the analyzer reports for this failure.
    pub(crate) fn describe(&self) -> String {
        match &self.message {
            Some(msg) => msg.clone(),
            None => format!("bad content in {}: `{}`", self.context, self.remaining),
        }
    }
}

/// Scans a chunk of HTML/CSS/JS/URL template text starting in `context`.
pub fn process_raw_text(raw: &str, context: Context) -> RawText {
    let mut scanner = Scanner {
        ctx: context,
        out: String::with_capacity(raw.len()),
        error: None,
        comment_had_newline: false,
    };
    scanner.run(raw);
    RawText {
        context: scanner.ctx,
        text: scanner.out,
        error: scanner.error,
    }
}

struct Scanner {
    ctx: Context,
    out: String,
    error: Option<ScanError>,
    /// Whether the block comment being scanned has spanned a line
    /// terminator; decides if its collapsed form must keep a newline.
    comment_had_newline: bool,
}

impl Scanner {
    fn run(&mut self, raw: &str) {
        let mut text = raw;
        while !text.is_empty() && self.error.is_none() {
            if self.ctx.is_error() {
                // The error context is absorbing.
                return;
            }
            if self.ctx.delim != Delim::None {
                text = self.scan_attr_value(text);
            } else {
                text = self.step(text);
            }
        }
        if self.error.is_none() && self.ctx.state == State::HtmlBeforeTagName {
            // The chunk ended right after '<'. Whatever follows (an
            // interpolation, a branch) is not a tag name, so the '<' is
            // plain text.
            self.out.push_str("&lt;");
            self.ctx = Context::default();
        }
    }

    /// Consumes one token outside an attribute value.
    fn step<'t>(&mut self, text: &'t str) -> &'t str {
        let state = self.ctx.state;
        let Some((transition, start, end, group1)) = self.earliest_match(text) else {
            self.fail(text, None);
            return "";
        };

        let prefix = &text[..start];
        let token = &text[start..end];
        if !prefix.is_empty() {
            if elides_content(state) {
                self.note_comment_content(prefix);
            } else {
                self.out.push_str(prefix);
            }
        }

        let next = match self.next_context(&transition.rule, token, group1.as_deref(), prefix) {
            Ok(ctx) => ctx,
            Err(message) => {
                self.fail(&text[start..], Some(message));
                return "";
            }
        };

        if end == 0 && next.state == state {
            // A transition that consumes nothing and goes nowhere means a
            // buggy table; surface it rather than spin.
            self.fail(text, Some(format!("infinite loop scanning `{text}` in {}", self.ctx)));
            return "";
        }

        self.emit(transition.emit, token);
        if next.is_error() {
            self.fail(&text[start..], None);
            return "";
        }
        self.ctx = next;
        &text[end..]
    }

    /// Scans an attribute value: decode entities up to the delimiter, scan
    /// the decoded content in the embedded language, re-encode, and close
    /// the value.
    fn scan_attr_value<'t>(&mut self, text: &'t str) -> &'t str {
        let delim = self.ctx.delim;
        let value_end = end_of_attr_value(text, delim);

        // Quotes arrive entity-encoded inside attribute values; embedded
        // languages (JS, CSS) need to see them decoded, as in
        //   <a onclick="alert(&quot;Hello&quot;)">
        // whose handler is alert("Hello").
        let decoded = unescape_html(&text[..value_end]);
        let mut inner = String::new();
        let mut tail: &str = &decoded;
        while !tail.is_empty() && self.error.is_none() && !self.ctx.is_error() {
            let out_start = self.out.len();
            tail = self.step(tail);
            // step() appends to self.out; move the embedded-language
            // emission aside so it can be HTML re-encoded.
            inner.push_str(&self.out[out_start..]);
            self.out.truncate(out_start);
        }
        let encoded = match delim {
            Delim::SingleQuote => escape_html_sq_only(&inner).into_owned(),
            _ => escape_html_dq_only(&inner).into_owned(),
        };
        self.out.push_str(&encoded);
        if self.error.is_some() {
            return "";
        }

        if value_end < text.len() {
            // The value ends inside this chunk; emit its delimiter (or the
            // synthesized close quote for unquoted values) and return to
            // the tag body.
            let rest = match delim {
                Delim::DoubleQuote => {
                    self.out.push('"');
                    &text[value_end + 1..]
                }
                Delim::SingleQuote => {
                    self.out.push('\'');
                    &text[value_end + 1..]
                }
                _ => {
                    self.out.push('"');
                    &text[value_end..]
                }
            };
            self.ctx = Context {
                state: State::Tag,
                element: self.ctx.element,
                ..Context::default()
            };
            rest
        } else {
            ""
        }
    }

    /// The applicable transition whose match starts earliest.
    fn earliest_match(
        &self,
        text: &str,
    ) -> Option<(&'static Transition, usize, usize, Option<String>)> {
        let mut best: Option<(&Transition, usize, usize, Option<String>)> = None;
        for transition in transitions(self.ctx.state) {
            let Ok(Some(caps)) = transition.pattern.captures(text) else {
                continue;
            };
            let m = caps.get(0).expect("group 0");
            if let Some((_, start, _, _)) = best {
                if m.start() >= start {
                    continue;
                }
            }
            if !self.is_applicable(&transition.rule, caps.get(1).map(|g| g.as_str())) {
                continue;
            }
            let group1 = caps.get(1).map(|g| g.as_str().to_string());
            best = Some((transition, m.start(), m.end(), group1));
        }
        best
    }

    fn is_applicable(&self, rule: &Rule, group1: Option<&str>) -> bool {
        match rule {
            Rule::EndTag => self.ctx.attr == crate::context::AttrKind::None,
            Rule::RcdataEnd => match (group1, rcdata_tag_name(self.ctx.element)) {
                (Some(name), Some(expected)) => name.eq_ignore_ascii_case(expected),
                _ => false,
            },
            _ => true,
        }
    }

    fn next_context(
        &mut self,
        rule: &Rule,
        token: &str,
        group1: Option<&str>,
        prefix: &str,
    ) -> Result<Context, String> {
        let prior = self.ctx;
        Ok(match rule {
            Rule::ToSelf => prior,
            Rule::To(ctx) => *ctx,
            Rule::ToState(state) => Context {
                state: *state,
                url_part: UrlPart::None,
                ..prior
            },
            Rule::ToTag(element) => Context {
                state: State::Tag,
                element: *element,
                ..Context::default()
            },
            Rule::TagDone => tag_done_context(prior.element),
            Rule::BackToTag => Context {
                state: State::Tag,
                element: prior.element,
                ..Context::default()
            },
            Rule::ToAttrName => Context {
                state: State::AttrName,
                element: prior.element,
                attr: classify_attr(group1.unwrap_or_default()),
                ..Context::default()
            },
            Rule::ToAttrValue(delim) => {
                Context::after_attr_delimiter(prior.element, prior.attr, *delim)
            }
            Rule::ToJsString(state) => Context {
                state: *state,
                element: prior.element,
                attr: prior.attr,
                delim: prior.delim,
                ..Context::default()
            },
            Rule::Slash => match prior.js_ctx {
                JsCtx::DivOp => Context {
                    state: State::Js,
                    js_ctx: JsCtx::Regex,
                    url_part: UrlPart::None,
                    ..prior
                },
                JsCtx::Regex => Context {
                    state: State::JsRegexp,
                    js_ctx: JsCtx::None,
                    url_part: UrlPart::None,
                    ..prior
                },
                _ => {
                    return Err(format!(
                        "ambiguous / could be a RegExp or division; \
                         please add parentheses before `{token}`"
                    ));
                }
            },
            Rule::JsPunc => Context {
                js_ctx: if js::is_regex_preceder(token) {
                    JsCtx::Regex
                } else {
                    JsCtx::DivOp
                },
                ..prior
            },
            Rule::UrlPart { css_escapes } => {
                let mut part = prior.url_part;
                if is_query_or_frag_token(token, *css_escapes) {
                    part = UrlPart::QueryOrFrag;
                } else if part == UrlPart::None
                    && !(prefix.trim().is_empty() && token.trim().is_empty())
                {
                    part = UrlPart::PreQuery;
                }
                Context {
                    url_part: part,
                    ..prior
                }
            }
            Rule::CssUri => Context {
                state: match group1 {
                    Some("\"") => State::CssDqUrl,
                    Some("'") => State::CssSqUrl,
                    _ => State::CssUrl,
                },
                url_part: UrlPart::None,
                js_ctx: JsCtx::None,
                ..prior
            },
            Rule::RcdataEnd | Rule::EndTag => Context {
                state: State::Tag,
                element: Element::None,
                ..Context::default()
            },
            Rule::DivPreceder => Context {
                state: State::Js,
                js_ctx: JsCtx::DivOp,
                ..prior
            },
        })
    }

    fn emit(&mut self, emit: Emit, token: &str) {
        match emit {
            Emit::Verbatim => self.out.push_str(token),
            Emit::Nothing => {}
            Emit::Space => {
                self.comment_had_newline = false;
                self.out.push(' ');
            }
            Emit::Newline => self.out.push('\n'),
            Emit::Lt => self.out.push_str("&lt;"),
            Emit::OpenTag => {
                self.out.push('<');
                self.out.push_str(token);
            }
            Emit::OpenQuote => self.out.push('"'),
            Emit::CommentExit => {
                if self.ctx.state == State::JsBlockCmt && self.comment_had_newline {
                    // Keep the line break so automatic semicolon insertion
                    // still separates the statements the comment did.
                    self.out.push('\n');
                }
            }
        }
    }

    fn note_comment_content(&mut self, content: &str) {
        if content
            .chars()
            .any(|c| matches!(c, '\r' | '\n' | '\u{2028}' | '\u{2029}'))
        {
            self.comment_had_newline = true;
        }
    }

    fn fail(&mut self, remaining: &str, message: Option<String>) {
        self.error = Some(ScanError {
            context: self.ctx,
            remaining: remaining.to_string(),
            message,
        });
        self.ctx = Context::ERROR;
    }
}

/// The end of the current attribute value within `text`, or `text.len()`
/// when the value continues past this chunk.
fn end_of_attr_value(text: &str, delim: Delim) -> usize {
    match delim {
        Delim::DoubleQuote => text.find('"').unwrap_or(text.len()),
        Delim::SingleQuote => text.find('\'').unwrap_or(text.len()),
        Delim::SpaceOrTagEnd => text
            .find(|c: char| c.is_whitespace() || c == '>')
            .unwrap_or(text.len()),
        Delim::None => text.len(),
    }
}

/// `?`, `#`, or (in CSS, where backslash escapes hide them) their escaped
/// forms start the query/fragment.
fn is_query_or_frag_token(token: &str, css_escapes: bool) -> bool {
    matches!(token, "?" | "#")
        || (css_escapes
            && (token.starts_with("\\23")
                || token.starts_with("\\3f")
                || token.starts_with("\\3F")
                || token.starts_with("\\?")
                || token.starts_with("\\#")))
}
