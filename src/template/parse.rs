// Template surface syntax.
//
// Source is a run of literal text with `{{...}}` actions in between.
// `{{define "name"}}...{{end}}` blocks populate a template set; an
// optional default name collects undelimited source into one template.
// Inside an action: references (`.`, `.A.B`), string and integer
// literals, function calls `f(a, b)`, pipelines `x | f | g`, and the
// `if` / `with` / `range` / `template` / `else` / `end` keywords.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::AutoescapeError;
use crate::template::exec::TemplateSet;
use crate::template::{Expr, Node};

/// One `{{...}}` action or the literal text between actions.
struct Token {
    text: String,
    is_action: bool,
    line: u32,
}

/// Parses template source into a template set.
///
/// `default_name` names the template built from source outside any
/// `{{define}}` block; without it, such source is an error.
pub fn parse_templates(
    src: &str,
    code: &str,
    default_name: Option<&str>,
) -> Result<TemplateSet, AutoescapeError> {
    let code = code.replace("\r\n", "\n").replace('\r', "\n");
    let tokens = tokenize(&code);
    Parser {
        src,
        tokens: &tokens,
        pos: 0,
    }
    .parse(default_name)
}

/// Splits source into text and `{{...}}` action tokens. Inside an action,
/// `}}` may appear inside a quoted string but nowhere else; strings are
/// backslash-escaped.
fn tokenize(code: &str) -> Vec<Token> {
    static ACTION: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r#"\{\{(?:[^"'}]|"(?:[^\\"]|\\.)*"|'(?:[^\\']|\\.)*')*\}\}"#,
        )
        .expect("regex")
    });

    let mut tokens = Vec::new();
    let mut line: u32 = 1;
    let mut push = |text: &str, is_action: bool, line: &mut u32| {
        if !text.is_empty() {
            tokens.push(Token {
                text: text.to_string(),
                is_action,
                line: *line,
            });
        }
        *line += text.matches('\n').count() as u32;
    };

    let mut last = 0;
    for m in ACTION.find_iter(code) {
        push(&code[last..m.start()], false, &mut line);
        push(m.as_str(), true, &mut line);
        last = m.end();
    }
    push(&code[last..], false, &mut line);
    tokens
}

struct Parser<'a> {
    src: &'a str,
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn parse(mut self, default_name: Option<&str>) -> Result<TemplateSet, AutoescapeError> {
        let mut set = TemplateSet::new();

        loop {
            match self.peek() {
                None => break,
                Some(token) if !token.is_action && token.text.trim().is_empty() => {
                    self.pos += 1;
                }
                Some(token) if token.is_action && token.text.starts_with("{{define") => {
                    self.parse_define(&mut set)?;
                }
                Some(_) => break,
            }
        }

        if self.pos < self.tokens.len() {
            let Some(name) = default_name else {
                return Err(self.err("unparsed content outside {{define}}"));
            };
            let body = self.parse_list()?;
            if self.pos < self.tokens.len() {
                return Err(self.err("unparsed content at end of input"));
            }
            set.define(name, body)
                .map_err(|msg| self.err(&msg))?;
        }
        Ok(set)
    }

    fn parse_define(&mut self, set: &mut TemplateSet) -> Result<(), AutoescapeError> {
        let token = self.expect_action()?;
        let inner = token.text[2..token.text.len() - 2].to_string();
        let rest = inner
            .strip_prefix("define")
            .map(str::trim)
            .unwrap_or_default();
        let name = match parse_expr_text(rest).map_err(|msg| self.err(&msg))? {
            Expr::StrLit(name) => name,
            other => {
                return Err(self.err(&format!(
                    "expected template name as a quoted string, not {other}"
                )));
            }
        };
        let body = self.parse_list()?;
        self.expect_token("{{end}}")?;
        set.define(&name, body).map_err(|msg| self.err(&msg))
    }

    fn parse_list(&mut self) -> Result<Node, AutoescapeError> {
        let mut children = Vec::new();
        while let Some(node) = self.parse_atom()? {
            children.push(node);
        }
        if children.len() == 1 {
            return Ok(children.pop().expect("one child"));
        }
        Ok(Node::list(children))
    }

    /// One statement node, or `None` at `{{else}}` / `{{end}}` / EOF.
    fn parse_atom(&mut self) -> Result<Option<Node>, AutoescapeError> {
        let Some(token) = self.peek() else {
            return Ok(None);
        };
        if !token.is_action {
            let node = Node::text(token.text.clone());
            self.pos += 1;
            return Ok(Some(node));
        }

        let inner = token.text[2..token.text.len() - 2].trim().to_string();
        let keyword = inner
            .split(|c: char| c.is_whitespace())
            .next()
            .unwrap_or_default();
        match keyword {
            "end" | "else" => Ok(None),
            "define" => Err(self.err("{{define}} cannot be nested")),
            "template" => {
                self.pos += 1;
                let rest = inner["template".len()..].trim();
                let (name_expr, remainder) =
                    parse_expr_prefix(rest).map_err(|msg| self.err(&msg))?;
                let Expr::StrLit(callee) = name_expr else {
                    return Err(self.err("expected template name as a quoted string"));
                };
                let arg = if remainder.trim().is_empty() {
                    None
                } else {
                    Some(parse_expr_text(remainder.trim()).map_err(|msg| self.err(&msg))?)
                };
                Ok(Some(Node::call(callee, arg)))
            }
            "if" | "with" | "range" => {
                self.pos += 1;
                let expr = parse_expr_text(inner[keyword.len()..].trim())
                    .map_err(|msg| self.err(&msg))?;
                let body = self.parse_list()?;
                let else_branch = if self.peek_is("{{else}}") {
                    self.pos += 1;
                    Some(self.parse_list()?)
                } else {
                    None
                };
                self.expect_token("{{end}}")?;
                Ok(Some(match keyword {
                    "if" => Node::if_node(expr, body, else_branch),
                    "with" => Node::with_node(expr, body, else_branch),
                    _ => Node::range_node(expr, body, else_branch),
                }))
            }
            _ => {
                self.pos += 1;
                let expr = parse_expr_text(&inner).map_err(|msg| self.err(&msg))?;
                Ok(Some(Node::interp(expr)))
            }
        }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn peek_is(&self, text: &str) -> bool {
        self.peek().is_some_and(|t| t.is_action && t.text == text)
    }

    fn expect_action(&mut self) -> Result<&'a Token, AutoescapeError> {
        let Some(token) = self.peek() else {
            return Err(self.err("unexpected end of input"));
        };
        self.pos += 1;
        Ok(token)
    }

    fn expect_token(&mut self, want: &str) -> Result<(), AutoescapeError> {
        match self.peek() {
            Some(token) if token.is_action && token.text == want => {
                self.pos += 1;
                Ok(())
            }
            Some(token) => Err(self.err(&format!("expected {want}, got {}", token.text))),
            None => Err(self.err(&format!("expected {want} at end of input"))),
        }
    }

    fn err(&self, msg: &str) -> AutoescapeError {
        let line = self
            .tokens
            .get(self.pos.min(self.tokens.len().saturating_sub(1)))
            .map(|t| t.line)
            .unwrap_or(1);
        AutoescapeError::Parse(format!("{}:{line}: {msg}", self.src))
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

/// Parses a complete expression; trailing content is an error.
fn parse_expr_text(text: &str) -> Result<Expr, String> {
    let (expr, rest) = parse_expr_prefix(text)?;
    if !rest.trim().is_empty() {
        return Err(format!("trailing content in expression: {rest}"));
    }
    Ok(expr)
}

/// Parses an expression from the front of `text`, returning it and the
/// unconsumed remainder.
fn parse_expr_prefix(text: &str) -> Result<(Expr, &str), String> {
    let mut p = ExprParser { text, pos: 0 };
    let expr = p.pipeline()?;
    Ok((expr, &text[p.pos..]))
}

struct ExprParser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> ExprParser<'a> {
    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.text.len() - trimmed.len();
    }

    fn eat(&mut self, prefix: char) -> bool {
        if self.rest().starts_with(prefix) {
            self.pos += prefix.len_utf8();
            true
        } else {
            false
        }
    }

    /// pipeline := atom ('|' name)*
    fn pipeline(&mut self) -> Result<Expr, String> {
        let mut expr = self.atom()?;
        loop {
            self.skip_ws();
            if !self.eat('|') {
                return Ok(expr);
            }
            self.skip_ws();
            let name = self.name()?;
            expr = Expr::Call {
                name,
                args: vec![expr],
            };
        }
    }

    /// atom := reference | string | integer | name '(' args ')'
    fn atom(&mut self) -> Result<Expr, String> {
        self.skip_ws();
        let rest = self.rest();
        let Some(first) = rest.chars().next() else {
            return Err("missing expression".to_string());
        };
        match first {
            '.' => {
                static REF: LazyLock<Regex> =
                    LazyLock::new(|| Regex::new(r"^(?:\.\w+)+|^\.").expect("regex"));
                let m = REF.find(rest).expect("dot implies a match");
                self.pos += m.end();
                let path = m
                    .as_str()
                    .split('.')
                    .filter(|part| !part.is_empty())
                    .map(str::to_string)
                    .collect();
                Ok(Expr::Ref(path))
            }
            '"' | '\'' => self.string_lit(first),
            c if c.is_ascii_digit() || c == '-' => {
                static INT: LazyLock<Regex> =
                    LazyLock::new(|| Regex::new(r"^-?[0-9]+").expect("regex"));
                let Some(m) = INT.find(rest) else {
                    return Err(format!("expected expression at `{rest}`"));
                };
                self.pos += m.end();
                let n = m
                    .as_str()
                    .parse::<i64>()
                    .map_err(|_| format!("integer out of range: {}", m.as_str()))?;
                Ok(Expr::IntLit(n))
            }
            _ => {
                let name = self.name()?;
                self.skip_ws();
                if !self.eat('(') {
                    return Err(format!("expected `(` after function name {name}"));
                }
                let mut args = Vec::new();
                self.skip_ws();
                if !self.rest().starts_with(')') {
                    loop {
                        args.push(self.pipeline()?);
                        self.skip_ws();
                        if !self.eat(',') {
                            break;
                        }
                    }
                }
                if !self.eat(')') {
                    return Err(format!("expected `)` to close call to {name}"));
                }
                Ok(Expr::Call { name, args })
            }
        }
    }

    fn string_lit(&mut self, quote: char) -> Result<Expr, String> {
        let rest = self.rest();
        let mut out = String::new();
        let mut chars = rest.char_indices().skip(1);
        while let Some((i, c)) = chars.next() {
            match c {
                c if c == quote => {
                    self.pos += i + quote.len_utf8();
                    return Ok(Expr::StrLit(out));
                }
                '\\' => {
                    let Some((_, escaped)) = chars.next() else {
                        break;
                    };
                    out.push(match escaped {
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        '0' => '\0',
                        other => other,
                    });
                }
                c => out.push(c),
            }
        }
        Err(format!("unterminated string literal: {rest}"))
    }

    fn name(&mut self) -> Result<String, String> {
        static NAME: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*").expect("regex"));
        let Some(m) = NAME.find(self.rest()) else {
            return Err(format!("expected function name at `{}`", self.rest()));
        };
        self.pos += m.end();
        Ok(m.as_str().to_string())
    }
}
