// The context lattice: the HTML/CSS/JS/URL parser state at a point in a
// template.
//
// A context is a product of six orthogonal fields. The analyzer threads a
// context through every static text chunk and interpolation of a template;
// branch joins take the least upper bound via `Context::union`.
//
// Reference: the context type of Go's html/template escaping pass
// (https://pkg.go.dev/html/template).

use std::fmt;

/// Coarse-grained lexical parser state. Exactly one per context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum State {
    /// Outside an HTML tag, directive, or comment (parsed character data).
    #[default]
    Text,
    /// Inside an element whose content is RCDATA (`<title>`, `<textarea>`):
    /// entities are decoded but nested elements cannot appear.
    Rcdata,
    /// Just after a `<` that may open a tag.
    HtmlBeforeTagName,
    /// Inside a tag name.
    TagName,
    /// In a tag, before an attribute name or the end of the tag.
    Tag,
    /// Inside an attribute name.
    AttrName,
    /// After an attribute name, before `=` or the next attribute.
    AfterName,
    /// After `=`, before the attribute value.
    BeforeValue,
    /// Inside an HTML comment.
    HtmlCmt,
    /// Inside a plain (non-CSS, non-JS, non-URL) attribute value.
    Attr,
    /// In CSS outside a comment, string, or URL.
    Css,
    /// In CSS inside a `//` line comment.
    CssLineCmt,
    /// In CSS inside a `/* block comment */`.
    CssBlockCmt,
    /// In CSS inside a "double quoted string".
    CssDqStr,
    /// In CSS inside a 'single quoted string'.
    CssSqStr,
    /// In a CSS `url(...)` terminated by the first `)` or whitespace.
    CssUrl,
    /// In a CSS `url("...")` terminated by the first double quote.
    CssDqUrl,
    /// In a CSS `url('...')` terminated by the first single quote.
    CssSqUrl,
    /// In JavaScript outside a comment, string, or regexp literal.
    Js,
    /// In JavaScript inside a `//` line comment.
    JsLineCmt,
    /// In JavaScript inside a `/* block comment */`.
    JsBlockCmt,
    /// In JavaScript inside a "double quoted string".
    JsDqStr,
    /// In JavaScript inside a 'single quoted string'.
    JsSqStr,
    /// In JavaScript inside a /regular expression literal/.
    JsRegexp,
    /// In an HTML attribute whose content is a URL.
    Url,
    /// Not inside any valid HTML/CSS/JS construct. Absorbing.
    Error,
}

/// Special parent element whose content type differs from generic HTML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Element {
    #[default]
    None,
    /// `<script>`, whose content is raw JavaScript.
    Script,
    /// `<style>`, whose content is raw CSS.
    Style,
    /// `<textarea>` (RCDATA).
    Textarea,
    /// `<title>` (RCDATA).
    Title,
    /// `<listing>`, a historical raw-text element, treated as RCDATA.
    Listing,
    /// `<xmp>`, a historical raw-text element, treated as RCDATA.
    Xmp,
}

/// Semantic class of the attribute a context is inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttrKind {
    #[default]
    None,
    /// An event handler (`on*`), i.e. JavaScript.
    Script,
    /// `style`, i.e. CSS.
    Style,
    /// A URL-valued attribute (`href`, `src`, ...).
    Url,
}

/// How the current attribute value terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Delim {
    /// Not in an attribute value.
    #[default]
    None,
    DoubleQuote,
    SingleQuote,
    /// An unquoted value, ended by whitespace or `>`.
    SpaceOrTagEnd,
}

/// Whether a `/` as the next JavaScript token starts a regular expression
/// literal or a division operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JsCtx {
    /// Not in JavaScript.
    #[default]
    None,
    /// A `/` would start a regexp literal.
    Regex,
    /// A `/` would be a division operator.
    DivOp,
    /// Unknown after a branch join; a following `/` is an error.
    Unknown,
}

/// Position within a URL.
///
/// The distinction drives escaper choice: well-formed URL prefixes are
/// normalized, query/fragment values are fully percent-encoded, and values
/// that could choose the scheme are filtered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UrlPart {
    /// Not in a URL, or at the very start of one.
    #[default]
    None,
    /// In the scheme, authority, or path.
    PreQuery,
    /// In the query or fragment.
    QueryOrFrag,
    /// Unknown after a branch join.
    Unknown,
}

/// The lexical context at a point inside a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Context {
    pub state: State,
    pub element: Element,
    pub attr: AttrKind,
    pub delim: Delim,
    pub js_ctx: JsCtx,
    pub url_part: UrlPart,
}

impl Context {
    /// The absorbing error context.
    pub const ERROR: Context = Context {
        state: State::Error,
        element: Element::None,
        attr: AttrKind::None,
        delim: Delim::None,
        js_ctx: JsCtx::None,
        url_part: UrlPart::None,
    };

    /// True iff the state is the absorbing `Error` state.
    pub fn is_error(self) -> bool {
        self.state == State::Error
    }

    /// The context just inside an attribute value for the given element,
    /// attribute kind, and delimiter.
    pub(crate) fn after_attr_delimiter(element: Element, attr: AttrKind, delim: Delim) -> Context {
        // A script attribute starts in a regexp-expecting JS context since
        //   /foo/.test(str) && doSideEffect();
        // is a useful program, but no program starts with a division.
        let (state, js_ctx, url_part) = match attr {
            AttrKind::None => (State::Attr, JsCtx::None, UrlPart::None),
            AttrKind::Script => (State::Js, JsCtx::Regex, UrlPart::None),
            AttrKind::Style => (State::Css, JsCtx::None, UrlPart::None),
            AttrKind::Url => (State::Url, JsCtx::None, UrlPart::None),
        };
        Context {
            state,
            element,
            attr,
            delim,
            js_ctx,
            url_part,
        }
    }

    /// Forces the epsilon transitions that are otherwise delayed until more
    /// text arrives.
    ///
    /// An interpolation at a point expecting an attribute name becomes one,
    /// and an interpolation right after `=` commits to an unquoted value.
    /// The delay exists because quotes may arrive inside branches, as in
    /// `<a href={{if .C}}"/foo"{{else}}"/bar"{{end}}>`.
    pub fn force_epsilon_transition(self) -> Context {
        match self.state {
            State::Tag | State::TagName | State::AfterName => Context {
                state: State::AttrName,
                attr: AttrKind::None,
                ..self
            },
            State::BeforeValue => {
                Context::after_attr_delimiter(self.element, self.attr, Delim::SpaceOrTagEnd)
            }
            _ => self,
        }
    }

    /// A context consistent with both inputs, used where template branches
    /// merge. Returns [`Context::ERROR`] when no such context exists.
    pub fn union(a: Context, b: Context) -> Context {
        if a == b {
            return a;
        }
        if a
            == (Context {
                js_ctx: a.js_ctx,
                ..b
            })
        {
            return Context {
                js_ctx: JsCtx::Unknown,
                ..a
            };
        }
        if a
            == (Context {
                url_part: a.url_part,
                ..b
            })
        {
            return Context {
                url_part: UrlPart::Unknown,
                ..a
            };
        }
        // One side may be waiting on a delayed epsilon transition, as in
        // <b{if .C} attr="value"{/if}>. Force both and retry.
        if is_mid_epsilon(a.state) || is_mid_epsilon(b.state) {
            let (fa, fb) = (a.force_epsilon_transition(), b.force_epsilon_transition());
            if (fa, fb) != (a, b) {
                return Context::union(fa, fb);
            }
        }
        Context::ERROR
    }

    /// A name-mangled form used to suffix contextualized template clones.
    pub(crate) fn mangle(self) -> String {
        let mut out = format!("{:?}", self.state);
        if self.element != Element::None {
            out.push_str(&format!("_Element{:?}", self.element));
        }
        if self.attr != AttrKind::None {
            out.push_str(&format!("_Attr{:?}", self.attr));
        }
        if self.delim != Delim::None {
            out.push_str(&format!("_Delim{:?}", self.delim));
        }
        if self.js_ctx != JsCtx::None {
            out.push_str(&format!("_JsCtx{:?}", self.js_ctx));
        }
        if self.url_part != UrlPart::None {
            out.push_str(&format!("_UrlPart{:?}", self.url_part));
        }
        out
    }
}

fn is_mid_epsilon(state: State) -> bool {
    matches!(
        state,
        State::Tag | State::TagName | State::AfterName | State::BeforeValue
    )
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Context {:?}", self.state)?;
        if self.element != Element::None {
            write!(f, " Element={:?}", self.element)?;
        }
        if self.attr != AttrKind::None {
            write!(f, " Attr={:?}", self.attr)?;
        }
        if self.delim != Delim::None {
            write!(f, " Delim={:?}", self.delim)?;
        }
        if self.js_ctx != JsCtx::None {
            write!(f, " JsCtx={:?}", self.js_ctx)?;
        }
        if self.url_part != UrlPart::None {
            write!(f, " UrlPart={:?}", self.url_part)?;
        }
        write!(f, "]")
    }
}
