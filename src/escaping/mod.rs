// Escape modes and the escaper registry.
//
// An escape mode names a sanitization function together with the kind of
// content it produces. The mode selector (`esc_mode_for_hole`) maps the
// context before an interpolation to the ordered escaper pipeline that
// makes the interpolated value safe there, and to the context after it.

pub(crate) mod css;
pub(crate) mod html;
pub(crate) mod js;
pub(crate) mod url;

use crate::content::Value;
use crate::context::{Context, Delim, JsCtx, State, UrlPart};

/// Names a reference escaper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EscapeMode {
    /// Encodes HTML special characters, quotes included.
    EscapeHtml,
    /// Like [`EscapeMode::EscapeHtml`] but only normalizes known-safe HTML,
    /// since RCDATA cannot contain tags.
    EscapeHtmlRcdata,
    /// Like [`EscapeMode::EscapeHtml`] but strips tags from known-safe HTML
    /// so it can live inside an attribute value.
    EscapeHtmlAttribute,
    /// Allows only identifier-shaped element names that cannot switch the
    /// content model.
    FilterHtmlElementName,
    /// Allows only identifier-shaped attribute names that carry no script,
    /// style, or URL payload.
    FilterHtmlAttribute,
    /// Escapes into a valid run of JS StringCharacters.
    EscapeJsString,
    /// Encodes a whole value as a JS literal.
    EscapeJsValue,
    /// Like [`EscapeMode::EscapeJsString`] plus regexp metacharacters.
    EscapeJsRegex,
    /// Backslash-hex escapes for embedding in a quoted CSS string.
    EscapeCssString,
    /// Allows CSS keywords, quantities, and identifier parts only.
    FilterCssValue,
    /// Percent-encodes everything outside the URL unreserved set.
    EscapeUrl,
    /// Percent-encodes only characters that are neither reserved nor
    /// unreserved in URLs, plus stray `%`.
    NormalizeUrl,
    /// Rejects URLs whose scheme could load code.
    FilterUrl,
    /// The explicit author opt-out; never selected automatically.
    NoAutoescape,
    /// Maps every input to the empty string (comment interiors).
    Elide,
    /// Prepends a `"`, pairing with the scanner's synthesized close quote
    /// for unquoted attribute values started by an interpolation.
    OpenQuote,
}

impl EscapeMode {
    /// The pipeline function name for this mode, as inserted into rewritten
    /// templates and resolved by the execution environment.
    pub fn fn_name(self) -> &'static str {
        match self {
            EscapeMode::EscapeHtml => "escape_html",
            EscapeMode::EscapeHtmlRcdata => "escape_html_rcdata",
            EscapeMode::EscapeHtmlAttribute => "escape_html_attribute",
            EscapeMode::FilterHtmlElementName => "filter_html_element_name",
            EscapeMode::FilterHtmlAttribute => "filter_html_attribute",
            EscapeMode::EscapeJsString => "escape_js_string",
            EscapeMode::EscapeJsValue => "escape_js_value",
            EscapeMode::EscapeJsRegex => "escape_js_regex",
            EscapeMode::EscapeCssString => "escape_css_string",
            EscapeMode::FilterCssValue => "filter_css_value",
            EscapeMode::EscapeUrl => "escape_url",
            EscapeMode::NormalizeUrl => "normalize_url",
            EscapeMode::FilterUrl => "filter_url",
            EscapeMode::NoAutoescape => "noescape",
            EscapeMode::Elide => "elide",
            EscapeMode::OpenQuote => "open_quote",
        }
    }

    /// Resolves a pipeline function name back to its mode.
    pub fn from_fn_name(name: &str) -> Option<EscapeMode> {
        Some(match name {
            "escape_html" => EscapeMode::EscapeHtml,
            "escape_html_rcdata" => EscapeMode::EscapeHtmlRcdata,
            "escape_html_attribute" => EscapeMode::EscapeHtmlAttribute,
            "filter_html_element_name" => EscapeMode::FilterHtmlElementName,
            "filter_html_attribute" => EscapeMode::FilterHtmlAttribute,
            "escape_js_string" => EscapeMode::EscapeJsString,
            "escape_js_value" => EscapeMode::EscapeJsValue,
            "escape_js_regex" => EscapeMode::EscapeJsRegex,
            "escape_css_string" => EscapeMode::EscapeCssString,
            "filter_css_value" => EscapeMode::FilterCssValue,
            "escape_url" => EscapeMode::EscapeUrl,
            "normalize_url" => EscapeMode::NormalizeUrl,
            "filter_url" => EscapeMode::FilterUrl,
            "noescape" => EscapeMode::NoAutoescape,
            "elide" => EscapeMode::Elide,
            "open_quote" => EscapeMode::OpenQuote,
            _ => return None,
        })
    }
}

/// The escape mode for a hole in the given state, or `None` for states a
/// hole can never occupy once epsilon transitions are forced.
pub(crate) fn escape_mode_for_state(state: State) -> Option<EscapeMode> {
    Some(match state {
        State::Text => EscapeMode::EscapeHtml,
        State::Rcdata => EscapeMode::EscapeHtmlRcdata,
        State::HtmlBeforeTagName | State::TagName => EscapeMode::FilterHtmlElementName,
        State::Tag | State::AttrName => EscapeMode::FilterHtmlAttribute,
        State::HtmlCmt | State::CssLineCmt | State::CssBlockCmt | State::JsLineCmt
        | State::JsBlockCmt => EscapeMode::Elide,
        State::Attr => EscapeMode::EscapeHtmlAttribute,
        State::Css => EscapeMode::FilterCssValue,
        State::CssDqStr | State::CssSqStr => EscapeMode::EscapeCssString,
        State::CssUrl | State::CssDqUrl | State::CssSqUrl => EscapeMode::NormalizeUrl,
        State::Js => EscapeMode::EscapeJsValue,
        State::JsDqStr | State::JsSqStr => EscapeMode::EscapeJsString,
        State::JsRegexp => EscapeMode::EscapeJsRegex,
        State::Url => EscapeMode::EscapeHtmlAttribute,
        State::AfterName | State::BeforeValue | State::Error => return None,
    })
}

/// True iff `g ∘ f = f`: applying `g` after `f` never changes the output,
/// so `g` can be dropped from a pipeline that already ends in `f`.
pub(crate) fn is_redundant(f: EscapeMode, g: EscapeMode) -> bool {
    use EscapeMode::*;
    matches!(
        (f, g),
        (Elide, EscapeHtmlAttribute)
            | (Elide, EscapeHtml)
            | (EscapeCssString, EscapeHtmlAttribute)
            | (EscapeJsRegex, EscapeHtmlAttribute)
            | (EscapeJsString, EscapeHtmlAttribute)
            | (EscapeUrl, NormalizeUrl)
    )
}

/// Applies the named escaper to a value.
pub fn sanitize(mode: EscapeMode, value: &Value) -> Value {
    match mode {
        EscapeMode::EscapeHtml => html::escape_html(value),
        EscapeMode::EscapeHtmlRcdata => html::escape_html_rcdata(value),
        EscapeMode::EscapeHtmlAttribute => html::escape_html_attribute(value),
        EscapeMode::FilterHtmlElementName => html::filter_html_element_name(value),
        EscapeMode::FilterHtmlAttribute => html::filter_html_attribute(value),
        EscapeMode::EscapeJsString => js::escape_js_string(value),
        EscapeMode::EscapeJsValue => js::escape_js_value(value),
        EscapeMode::EscapeJsRegex => js::escape_js_regex(value),
        EscapeMode::EscapeCssString => css::escape_css_string(value),
        EscapeMode::FilterCssValue => css::filter_css_value(value),
        EscapeMode::EscapeUrl => url::escape_url(value),
        EscapeMode::NormalizeUrl => url::normalize_url(value),
        EscapeMode::FilterUrl => url::filter_url(value),
        EscapeMode::NoAutoescape => value.clone(),
        EscapeMode::Elide => Value::Str(String::new()),
        EscapeMode::OpenQuote => Value::Str(format!("\"{}", value.coerce_str())),
    }
}

/// Given the context before an untrusted-value hole, computes the context
/// after it, the escaper pipeline that makes the value safe there, and an
/// explanation when no pipeline exists.
pub(crate) fn esc_mode_for_hole(
    context_before: Context,
) -> (Context, Vec<EscapeMode>, Option<String>) {
    let mut ctx = context_before.force_epsilon_transition();
    let mut problem = None;
    let state = ctx.state;

    let mut esc_modes: Vec<EscapeMode> = match escape_mode_for_state(state) {
        Some(mode) => vec![mode],
        None => {
            return (
                Context::ERROR,
                Vec::new(),
                Some(format!("hole cannot appear in {ctx}")),
            );
        }
    };

    match ctx.url_part {
        UrlPart::None => {
            if matches!(
                state,
                State::Url | State::CssUrl | State::CssDqUrl | State::CssSqUrl
            ) {
                // At the very start of a URL the value picks the scheme, so
                // dangerous protocols must be filtered out.
                esc_modes = vec![EscapeMode::FilterUrl, EscapeMode::NormalizeUrl];
                ctx.url_part = UrlPart::PreQuery;
            } else if matches!(state, State::CssDqStr | State::CssSqStr) {
                esc_modes.insert(0, EscapeMode::FilterUrl);
                ctx.url_part = UrlPart::PreQuery;
            }
        }
        UrlPart::PreQuery => {
            if !matches!(state, State::CssDqStr | State::CssSqStr) {
                esc_modes[0] = EscapeMode::NormalizeUrl;
            }
        }
        UrlPart::QueryOrFrag => {
            esc_modes[0] = EscapeMode::EscapeUrl;
        }
        UrlPart::Unknown => {
            ctx = Context::ERROR;
            problem = Some("hole appears in an ambiguous URL context".to_string());
        }
    }

    if state == State::Js {
        // A value is an expression, and an expression cannot be followed by
        // a regexp literal.
        ctx.js_ctx = JsCtx::DivOp;
    }

    if ctx.delim != Delim::None {
        if esc_modes.last() != Some(&EscapeMode::EscapeHtmlAttribute) {
            esc_modes.push(EscapeMode::EscapeHtmlAttribute);
        }
        if context_before.delim == Delim::None && ctx.delim == Delim::SpaceOrTagEnd {
            // The value itself starts the unquoted attribute, so it must
            // also supply the opening quote that the scanner's synthesized
            // close quote pairs with.
            esc_modes.push(EscapeMode::OpenQuote);
        }
    }

    compress_redundant(&mut esc_modes);
    (ctx, esc_modes, problem)
}

/// Drops pipeline entries that cannot change the output of their
/// predecessor.
fn compress_redundant(esc_modes: &mut Vec<EscapeMode>) {
    let mut i = 1;
    while i < esc_modes.len() {
        if is_redundant(esc_modes[i - 1], esc_modes[i]) {
            esc_modes.remove(i);
        } else {
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AttrKind, Element};

    fn ctx(state: State) -> Context {
        Context {
            state,
            ..Context::default()
        }
    }

    #[test]
    fn text_hole_uses_escape_html() {
        let (after, modes, problem) = esc_mode_for_hole(ctx(State::Text));
        assert_eq!(after, ctx(State::Text));
        assert_eq!(modes, vec![EscapeMode::EscapeHtml]);
        assert!(problem.is_none());
    }

    #[test]
    fn url_query_hole_uses_escape_url() {
        let before = Context {
            state: State::Url,
            attr: AttrKind::Url,
            delim: Delim::DoubleQuote,
            url_part: UrlPart::QueryOrFrag,
            ..Context::default()
        };
        let (after, modes, problem) = esc_mode_for_hole(before);
        assert_eq!(after, before);
        assert_eq!(
            modes,
            vec![EscapeMode::EscapeUrl, EscapeMode::EscapeHtmlAttribute]
        );
        assert!(problem.is_none());
    }

    #[test]
    fn url_start_hole_filters_protocol() {
        let before = Context {
            state: State::Url,
            attr: AttrKind::Url,
            delim: Delim::SingleQuote,
            ..Context::default()
        };
        let (after, modes, _) = esc_mode_for_hole(before);
        assert_eq!(after.url_part, UrlPart::PreQuery);
        assert_eq!(
            modes,
            vec![
                EscapeMode::FilterUrl,
                EscapeMode::NormalizeUrl,
                EscapeMode::EscapeHtmlAttribute,
            ]
        );
    }

    #[test]
    fn ambiguous_url_part_is_an_error() {
        let before = Context {
            state: State::Url,
            attr: AttrKind::Url,
            delim: Delim::DoubleQuote,
            url_part: UrlPart::Unknown,
            ..Context::default()
        };
        let (after, _, problem) = esc_mode_for_hole(before);
        assert!(after.is_error());
        assert_eq!(
            problem.as_deref(),
            Some("hole appears in an ambiguous URL context")
        );
    }

    #[test]
    fn js_hole_commits_to_div_op() {
        let before = Context {
            state: State::Js,
            element: Element::Script,
            js_ctx: JsCtx::Regex,
            ..Context::default()
        };
        let (after, modes, _) = esc_mode_for_hole(before);
        assert_eq!(after.js_ctx, JsCtx::DivOp);
        assert_eq!(modes, vec![EscapeMode::EscapeJsValue]);
    }

    #[test]
    fn js_string_in_attr_compresses_redundant_html_escape() {
        // escape_js_string output cannot contain HTML specials, so the
        // attribute-boundary escaper is dropped.
        let before = Context {
            state: State::JsDqStr,
            attr: AttrKind::Script,
            delim: Delim::SingleQuote,
            ..Context::default()
        };
        let (_, modes, _) = esc_mode_for_hole(before);
        assert_eq!(modes, vec![EscapeMode::EscapeJsString]);
    }

    #[test]
    fn unquoted_value_started_by_hole_gets_open_quote() {
        let before = Context {
            state: State::BeforeValue,
            attr: AttrKind::Url,
            ..Context::default()
        };
        let (after, modes, _) = esc_mode_for_hole(before);
        assert_eq!(after.delim, Delim::SpaceOrTagEnd);
        assert_eq!(
            modes,
            vec![
                EscapeMode::FilterUrl,
                EscapeMode::NormalizeUrl,
                EscapeMode::EscapeHtmlAttribute,
                EscapeMode::OpenQuote,
            ]
        );
    }

    #[test]
    fn comment_holes_are_elided() {
        let (_, modes, _) = esc_mode_for_hole(ctx(State::HtmlCmt));
        assert_eq!(modes, vec![EscapeMode::Elide]);
        // Inside an attribute, the boundary escaper is redundant after
        // elision and stays dropped.
        let before = Context {
            state: State::JsBlockCmt,
            attr: AttrKind::Script,
            delim: Delim::DoubleQuote,
            ..Context::default()
        };
        let (_, modes, _) = esc_mode_for_hole(before);
        assert_eq!(modes, vec![EscapeMode::Elide]);
    }

    #[test]
    fn redundant_pairs_really_are_redundant() {
        // For every (f, g) in the redundancy relation, g(f(x)) == f(x).
        let nasty: String = (0u8..0x80).map(char::from).collect::<String>()
            + "\u{a0}\u{100}\u{2028}\u{2029}\u{feff}\u{fffd}&amp;%22\\";
        let modes = [
            EscapeMode::EscapeHtml,
            EscapeMode::EscapeHtmlRcdata,
            EscapeMode::EscapeHtmlAttribute,
            EscapeMode::FilterHtmlElementName,
            EscapeMode::FilterHtmlAttribute,
            EscapeMode::EscapeJsString,
            EscapeMode::EscapeJsValue,
            EscapeMode::EscapeJsRegex,
            EscapeMode::EscapeCssString,
            EscapeMode::FilterCssValue,
            EscapeMode::EscapeUrl,
            EscapeMode::NormalizeUrl,
            EscapeMode::FilterUrl,
            EscapeMode::Elide,
            EscapeMode::OpenQuote,
        ];
        for f in modes {
            for g in modes {
                if !is_redundant(f, g) {
                    continue;
                }
                let once = sanitize(f, &Value::Str(nasty.clone()));
                let twice = sanitize(g, &once);
                assert_eq!(twice, once, "{f:?} then {g:?}");
            }
        }
    }

    #[test]
    fn fn_names_round_trip() {
        for mode in [
            EscapeMode::EscapeHtml,
            EscapeMode::EscapeHtmlRcdata,
            EscapeMode::EscapeHtmlAttribute,
            EscapeMode::FilterHtmlElementName,
            EscapeMode::FilterHtmlAttribute,
            EscapeMode::EscapeJsString,
            EscapeMode::EscapeJsValue,
            EscapeMode::EscapeJsRegex,
            EscapeMode::EscapeCssString,
            EscapeMode::FilterCssValue,
            EscapeMode::EscapeUrl,
            EscapeMode::NormalizeUrl,
            EscapeMode::FilterUrl,
            EscapeMode::NoAutoescape,
            EscapeMode::Elide,
            EscapeMode::OpenQuote,
        ] {
            assert_eq!(EscapeMode::from_fn_name(mode.fn_name()), Some(mode));
        }
    }
}
