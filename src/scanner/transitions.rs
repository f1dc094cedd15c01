// Per-state transition tables for the raw-text scanner.
//
// Each state owns an ordered list of transitions. A transition pairs a
// pattern with the rule for computing the next context and with how the
// consumed token is re-emitted into the normalized output. The scanner
// picks the applicable transition whose match starts earliest; ties go to
// table order.
//
// The CSS rules follow the CSS3 lexical grammar
// (http://www.w3.org/TR/css3-syntax/#lexical); the JS rules follow the
// regular lexical grammar for JavaScript 2.0
// (http://www.mozilla.org/js/language/js20-2000-07/rationale/syntax.html).

use std::sync::LazyLock;

use fancy_regex::Regex;

use crate::context::{Context, Delim, Element, State};

/// How a transition's consumed token appears in the normalized output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Emit {
    /// The matched text, verbatim.
    Verbatim,
    /// Nothing; the token is elided.
    Nothing,
    /// A single space (block-comment entry).
    Space,
    /// A newline (line-comment terminator).
    Newline,
    /// `&lt;` (a `<` that provably does not open a tag).
    Lt,
    /// `<` followed by the matched text (tag-name letters after a deferred
    /// `<`).
    OpenTag,
    /// A synthesized `"` opening an unquoted attribute value.
    OpenQuote,
    /// Block-comment exit: `\n` when a JS comment spanned a line
    /// terminator (so automatic semicolon insertion still sees the break),
    /// otherwise nothing.
    CommentExit,
}

/// The context-update rule a transition applies.
#[derive(Debug, Clone)]
pub(super) enum Rule {
    /// Consume without changing context.
    ToSelf,
    /// Replace the whole context.
    To(Context),
    /// Change state, keeping element/attr/delim/js_ctx and clearing the
    /// URL part.
    ToState(State),
    /// Enter the body of an open tag for the given element.
    ToTag(Element),
    /// Close a start tag and enter the element's content state.
    TagDone,
    /// Return to the tag body, element preserved.
    BackToTag,
    /// Enter an attribute name; group 1 is classified to an `AttrKind`.
    ToAttrName,
    /// Enter the attribute-value state for the current (element, attr)
    /// with the given delimiter.
    ToAttrValue(Delim),
    /// Enter a JS string state, keeping element/attr/delim only.
    ToJsString(State),
    /// A `/` in JS: division or regexp depending on `JsCtx`; ambiguity is
    /// a hard error.
    Slash,
    /// A run of JS tokens; updates `JsCtx` via the regexp-preceder rule.
    JsPunc,
    /// Advance the URL part: `?`/`#` (or, with `css_escapes`, their CSS
    /// backslash escapes) enter the query; other non-space content enters
    /// the pre-query part.
    UrlPart { css_escapes: bool },
    /// A CSS `url(` opening; group 1 is the optional quote delimiter.
    CssUri,
    /// An RCDATA end tag; applicable only when group 1 names the enclosing
    /// element.
    RcdataEnd,
    /// `</script` / `</style`; applicable only outside attributes.
    EndTag,
    /// Exit a JS string/regexp; a `/` after a complete literal divides.
    DivPreceder,
}

pub(super) struct Transition {
    pub pattern: Regex,
    pub rule: Rule,
    pub emit: Emit,
}

impl Transition {
    fn new(pattern: &str, rule: Rule, emit: Emit) -> Transition {
        Transition {
            pattern: Regex::new(pattern).expect("transition pattern"),
            rule,
            emit,
        }
    }
}

/// Whether static content in this state is elided from the normalized
/// output (comment interiors).
pub(super) fn elides_content(state: State) -> bool {
    matches!(
        state,
        State::HtmlCmt
            | State::CssLineCmt
            | State::CssBlockCmt
            | State::JsLineCmt
            | State::JsBlockCmt
    )
}

/// The expected end-tag name for an RCDATA element.
pub(super) fn rcdata_tag_name(element: Element) -> Option<&'static str> {
    match element {
        Element::Textarea => Some("textarea"),
        Element::Title => Some("title"),
        Element::Listing => Some("listing"),
        Element::Xmp => Some("xmp"),
        _ => None,
    }
}

/// The content state entered when a start tag closes.
pub(super) fn tag_done_context(element: Element) -> Context {
    use crate::context::JsCtx;
    let mut ctx = Context {
        element,
        ..Context::default()
    };
    match element {
        Element::None => ctx.state = State::Text,
        Element::Script => {
            // Script bodies start expecting a regexp: /foo/.test(x) is a
            // useful program and no program starts with a division.
            ctx.state = State::Js;
            ctx.js_ctx = JsCtx::Regex;
        }
        Element::Style => ctx.state = State::Css,
        Element::Textarea | Element::Title | Element::Listing | Element::Xmp => {
            ctx.state = State::Rcdata;
        }
    }
    ctx
}

const NLS: &str = r"\r\n\u{2028}\u{2029}";

pub(super) fn transitions(state: State) -> &'static [Transition] {
    static TABLES: LazyLock<Vec<Vec<Transition>>> = LazyLock::new(build_tables);
    &TABLES[state as usize]
}

fn build_tables() -> Vec<Vec<Transition>> {
    use Emit::*;
    use Rule::*;

    let text_ctx = Context::default();
    let before_tag_name_ctx = Context {
        state: State::HtmlBeforeTagName,
        ..Context::default()
    };
    let tag_name_ctx = Context {
        state: State::TagName,
        ..Context::default()
    };
    let html_cmt_ctx = Context {
        state: State::HtmlCmt,
        ..Context::default()
    };

    let script_end = || Transition::new(r"(?i)</script\b", EndTag, Verbatim);
    let style_end = || Transition::new(r"(?i)</style\b", EndTag, Verbatim);
    let rest = || Transition::new(r"$", ToSelf, Verbatim);
    let rest_elided = || Transition::new(r"$", ToSelf, Nothing);
    let css_url_part = || {
        Transition::new(
            r"[?#]|\\(?:23|3[fF]|[?#])|$",
            UrlPart { css_escapes: true },
            Verbatim,
        )
    };

    let mut tables: Vec<Vec<Transition>> = Vec::new();
    let mut set = |state: State, table: Vec<Transition>| {
        let idx = state as usize;
        while tables.len() <= idx {
            tables.push(Vec::new());
        }
        tables[idx] = table;
    };

    set(
        State::Text,
        vec![
            Transition::new(r"^[^<]+", ToSelf, Verbatim),
            Transition::new(r"^<!--", To(html_cmt_ctx), Nothing),
            Transition::new(r"(?i)^<script(?=[\s>/]|$)", ToTag(Element::Script), Verbatim),
            Transition::new(r"(?i)^<style(?=[\s>/]|$)", ToTag(Element::Style), Verbatim),
            Transition::new(
                r"(?i)^<textarea(?=[\s>/]|$)",
                ToTag(Element::Textarea),
                Verbatim,
            ),
            Transition::new(r"(?i)^<title(?=[\s>/]|$)", ToTag(Element::Title), Verbatim),
            Transition::new(
                r"(?i)^<listing(?=[\s>/]|$)",
                ToTag(Element::Listing),
                Verbatim,
            ),
            Transition::new(r"(?i)^<xmp(?=[\s>/]|$)", ToTag(Element::Xmp), Verbatim),
            Transition::new(r"(?i)^<!doctype", ToSelf, Verbatim),
            // Anything else after '<' is decided one transition later, in
            // HtmlBeforeTagName; the '<' itself is emitted there.
            Transition::new(r"^<", To(before_tag_name_ctx), Nothing),
        ],
    );

    set(
        State::Rcdata,
        vec![
            Transition::new(r"^[^<]+", ToSelf, Verbatim),
            Transition::new(r"</(\w+)\b", RcdataEnd, Verbatim),
            // A '<' that does not open this element's end tag cannot open
            // anything in RCDATA.
            Transition::new(r"^<", ToSelf, Lt),
        ],
    );

    set(
        State::HtmlBeforeTagName,
        vec![
            // A start or end tag name; end tags run through the same tag
            // machinery (their "attributes" are parsed but harmless).
            Transition::new(r"^/?[A-Za-z]+", To(tag_name_ctx), OpenTag),
            // Anything else means the '<' was plain text.
            Transition::new(r"^(?=[^A-Za-z])", To(text_ctx), Lt),
        ],
    );

    set(
        State::TagName,
        vec![
            Transition::new(r"^[A-Za-z0-9:-]*(?:[A-Za-z0-9]|$)", ToSelf, Verbatim),
            Transition::new(r"^(?=[/\s>])", ToTag(Element::None), Verbatim),
        ],
    );

    set(
        State::Tag,
        vec![
            // Allows dashed attribute names but not "--", so a tag ending
            // after a value-less "--" attribute cannot fake a comment end.
            Transition::new(r"^\s*([A-Za-z][\w:-]*)", ToAttrName, Verbatim),
            Transition::new(r"^\s*/?>", TagDone, Verbatim),
            Transition::new(r"^\s+$", ToSelf, Verbatim),
        ],
    );

    set(
        State::AttrName,
        vec![
            Transition::new(r"^[\w-]+", ToSelf, Verbatim),
            // For a value-less attribute, fall back to the tag body to look
            // for a tag end or another attribute name.
            Transition::new(r"^", ToState(State::AfterName), Verbatim),
        ],
    );

    set(
        State::AfterName,
        vec![
            Transition::new(r"^\s*=", ToState(State::BeforeValue), Verbatim),
            Transition::new(r"^\s+", ToSelf, Verbatim),
            Transition::new(r"^", BackToTag, Verbatim),
        ],
    );

    set(
        State::BeforeValue,
        vec![
            Transition::new(r#"^\s*""#, ToAttrValue(Delim::DoubleQuote), Verbatim),
            Transition::new(r"^\s*'", ToAttrValue(Delim::SingleQuote), Verbatim),
            // An unquoted value: normalized to a double-quoted one, so the
            // synthesized open quote is emitted here and the matching close
            // quote when the value ends.
            Transition::new(
                r#"^(?=[^"'\s>])"#,
                ToAttrValue(Delim::SpaceOrTagEnd),
                OpenQuote,
            ),
            // A blank value followed by a tag end (<input value=>) or by an
            // obvious attribute name (<input value= name=foo>).
            Transition::new(r"^(?=>|\s+[\w-]+\s*=)", BackToTag, Verbatim),
            Transition::new(r"^\s+", ToSelf, Verbatim),
        ],
    );

    set(
        State::HtmlCmt,
        vec![
            Transition::new(r"-->", To(text_ctx), Nothing),
            rest_elided(),
        ],
    );

    set(State::Attr, vec![rest()]);

    set(
        State::Css,
        vec![
            Transition::new(r"/\*", ToState(State::CssBlockCmt), Space),
            Transition::new(r"//", ToState(State::CssLineCmt), Nothing),
            Transition::new(r#"""#, ToState(State::CssDqStr), Verbatim),
            Transition::new(r"'", ToState(State::CssSqStr), Verbatim),
            Transition::new(r#"(?i)\burl\s*\(\s*(["']?)"#, CssUri, Verbatim),
            style_end(),
            rest(),
        ],
    );

    set(
        State::CssBlockCmt,
        vec![
            Transition::new(r"\*/", ToState(State::Css), CommentExit),
            style_end(),
            rest_elided(),
        ],
    );

    set(
        State::CssLineCmt,
        vec![
            Transition::new(r"[\n\x0c\r]", ToState(State::Css), Newline),
            style_end(),
            rest_elided(),
        ],
    );

    set(
        State::CssDqStr,
        vec![
            Transition::new(r#"""#, ToState(State::Css), Verbatim),
            // Line continuation or escape.
            Transition::new(r#"\\(?:\r\n?|[\n\x0c"])"#, ToSelf, Verbatim),
            css_url_part(),
            Transition::new(r"[\n\r\x0c]", To(Context::ERROR), Nothing),
            style_end(),
        ],
    );

    set(
        State::CssSqStr,
        vec![
            Transition::new(r"'", ToState(State::Css), Verbatim),
            Transition::new(r"\\(?:\r\n?|[\n\x0c'])", ToSelf, Verbatim),
            css_url_part(),
            Transition::new(r"[\n\r\x0c]", To(Context::ERROR), Nothing),
            style_end(),
        ],
    );

    set(
        State::CssUrl,
        vec![
            Transition::new(r"[\\)\s]", ToState(State::Css), Verbatim),
            css_url_part(),
            Transition::new(r#"["']"#, To(Context::ERROR), Nothing),
            style_end(),
        ],
    );

    set(
        State::CssDqUrl,
        vec![
            Transition::new(r#"""#, ToState(State::Css), Verbatim),
            css_url_part(),
            Transition::new(r#"\\(?:\r\n?|[\n\x0c"])"#, ToSelf, Verbatim),
            Transition::new(r"[\n\r\x0c]", To(Context::ERROR), Nothing),
            style_end(),
        ],
    );

    set(
        State::CssSqUrl,
        vec![
            Transition::new(r"'", ToState(State::Css), Verbatim),
            css_url_part(),
            Transition::new(r"\\(?:\r\n?|[\n\x0c'])", ToSelf, Verbatim),
            Transition::new(r"[\n\r\x0c]", To(Context::ERROR), Nothing),
            style_end(),
        ],
    );

    set(
        State::Js,
        vec![
            Transition::new(r"/\*", ToState(State::JsBlockCmt), Space),
            Transition::new(r"//", ToState(State::JsLineCmt), Nothing),
            Transition::new(r#"""#, ToJsString(State::JsDqStr), Verbatim),
            Transition::new(r"'", ToJsString(State::JsSqStr), Verbatim),
            Transition::new(r"/", Slash, Verbatim),
            // Words, numbers, and punctuation besides '/' feed the
            // regexp-preceder check.
            Transition::new(r#"(?i)(?:[^</"'\s\\]|<(?!/script))+"#, JsPunc, Verbatim),
            Transition::new(r"\s+", ToSelf, Verbatim),
            script_end(),
        ],
    );

    set(
        State::JsBlockCmt,
        vec![
            Transition::new(r"\*/", ToState(State::Js), CommentExit),
            script_end(),
            rest_elided(),
        ],
    );

    // Line continuations are not allowed in line comments.
    set(
        State::JsLineCmt,
        vec![
            Transition::new(&format!("[{NLS}]"), ToState(State::Js), Newline),
            script_end(),
            rest_elided(),
        ],
    );

    set(
        State::JsDqStr,
        vec![
            Transition::new(r#"^""#, DivPreceder, Verbatim),
            Transition::new(r"(?i)^</script\b", EndTag, Verbatim),
            Transition::new(
                &format!(
                    r#"(?i)^(?:[^"\\{NLS}<]|\\(?:\r\n?|[^\r<]|<(?!/script))|<(?!/script))+"#
                ),
                ToSelf,
                Verbatim,
            ),
        ],
    );

    set(
        State::JsSqStr,
        vec![
            Transition::new(r"^'", DivPreceder, Verbatim),
            Transition::new(r"(?i)^</script\b", EndTag, Verbatim),
            Transition::new(
                &format!(
                    r"(?i)^(?:[^'\\{NLS}<]|\\(?:\r\n?|[^\r<]|<(?!/script))|<(?!/script))+"
                ),
                ToSelf,
                Verbatim,
            ),
        ],
    );

    set(
        State::JsRegexp,
        vec![
            Transition::new(r"^/", DivPreceder, Verbatim),
            Transition::new(r"(?i)^</script\b", EndTag, Verbatim),
            Transition::new(
                // [...] charsets are handled specially: in /[/]/ the second
                // solidus does not end the literal.
                &format!(
                    r"(?i)^(?:[^\[\\/<{NLS}]|\\[^{NLS}]|\\?<(?!/script)|\[(?:[^\]\\<{NLS}]|\\[^{NLS}]|\\?<(?!/script))*\])+"
                ),
                ToSelf,
                Verbatim,
            ),
        ],
    );

    set(
        State::Url,
        vec![
            Transition::new(r"[?#]", UrlPart { css_escapes: false }, Verbatim),
            Transition::new(r"[^\s?#]+", UrlPart { css_escapes: false }, Verbatim),
            Transition::new(r"\s+", ToSelf, Verbatim),
        ],
    );

    set(State::Error, Vec::new());

    // Index space covers every state.
    while tables.len() <= State::Error as usize {
        tables.push(Vec::new());
    }
    tables
}
