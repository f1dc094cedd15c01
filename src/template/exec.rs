// Template execution.
//
// A `TemplateSet` owns named template bodies plus the function registry
// used by pipelines: the escaper registry under its pipeline names,
// `noescape` as an explicit identity, and any caller-registered helpers.

use std::collections::HashMap;

use crate::analyzer;
use crate::content::Value;
use crate::context::Context;
use crate::error::AutoescapeError;
use crate::escaping::{sanitize, EscapeMode};
use crate::template::{Expr, Node};

/// A helper function callable from template expressions.
pub type TemplateFn = Box<dyn Fn(&[Value]) -> Value>;

/// A set of named templates that can be analyzed, rewritten, and rendered.
#[derive(Default)]
pub struct TemplateSet {
    templates: HashMap<String, Node>,
    fns: HashMap<String, TemplateFn>,
}

impl std::fmt::Debug for TemplateSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateSet")
            .field("templates", &self.templates)
            .field("fns", &self.fns.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TemplateSet {
    pub fn new() -> TemplateSet {
        TemplateSet::default()
    }

    /// Adds a template body under `name`; redefinition is an error.
    pub(crate) fn define(&mut self, name: &str, body: Node) -> Result<(), String> {
        if self.templates.contains_key(name) {
            return Err(format!("redefinition of template {name:?}"));
        }
        self.templates.insert(name.to_string(), body);
        Ok(())
    }

    /// The body of the named template, if defined.
    pub fn body(&self, name: &str) -> Option<&Node> {
        self.templates.get(name)
    }

    /// The names of all defined templates, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Registers a helper function callable from pipelines.
    pub fn register_fn(
        &mut self,
        name: impl Into<String>,
        function: impl Fn(&[Value]) -> Value + 'static,
    ) {
        self.fns.insert(name.into(), Box::new(function));
    }

    /// Contextually escapes the set so that rendering the named public
    /// templates (starting in plain HTML text context) preserves document
    /// structure for any data.
    ///
    /// On failure the set is left unrewritten and must be considered
    /// unsafe to render.
    pub fn escape(&mut self, public_names: &[&str]) -> Result<(), AutoescapeError> {
        self.escape_in_context(public_names, Context::default())
    }

    /// Like [`TemplateSet::escape`], with an explicit start context.
    pub fn escape_in_context(
        &mut self,
        public_names: &[&str],
        start: Context,
    ) -> Result<(), AutoescapeError> {
        analyzer::escape_templates(&mut self.templates, public_names, start)
    }

    /// Renders the named template against `data`.
    pub fn render(&self, name: &str, data: &Value) -> Result<String, AutoescapeError> {
        let mut out = String::new();
        self.execute_named(name, data, &mut out)?;
        Ok(out)
    }

    fn execute_named(
        &self,
        name: &str,
        data: &Value,
        out: &mut String,
    ) -> Result<(), AutoescapeError> {
        let Some(body) = self.templates.get(name) else {
            return Err(AutoescapeError::Render(format!("no such template {name}")));
        };
        self.execute(body, data, out)
    }

    fn execute(&self, node: &Node, data: &Value, out: &mut String) -> Result<(), AutoescapeError> {
        match node {
            Node::Text(n) => out.push_str(&n.text),
            Node::Interp(n) => {
                let value = self.eval(&n.expr, data)?;
                if value != Value::Null {
                    out.push_str(&value.coerce_str());
                }
            }
            Node::Call(n) => {
                let callee_data = match &n.arg {
                    Some(arg) => self.eval(arg, data)?,
                    None => data.clone(),
                };
                self.execute_named(&n.callee, &callee_data, out)?;
            }
            Node::If(n) => {
                if self.eval(&n.cond, data)?.is_truthy() {
                    self.execute(&n.then_branch, data, out)?;
                } else if let Some(else_branch) = &n.else_branch {
                    self.execute(else_branch, data, out)?;
                }
            }
            Node::With(n) => {
                let value = self.eval(&n.expr, data)?;
                if value.is_truthy() {
                    self.execute(&n.body, &value, out)?;
                } else if let Some(else_branch) = &n.else_branch {
                    self.execute(else_branch, data, out)?;
                }
            }
            Node::Range(n) => {
                let value = self.eval(&n.expr, data)?;
                match &value {
                    Value::List(items) if !items.is_empty() => {
                        for item in items {
                            self.execute(&n.body, item, out)?;
                        }
                    }
                    Value::Map(entries) if !entries.is_empty() => {
                        for item in entries.values() {
                            self.execute(&n.body, item, out)?;
                        }
                    }
                    _ => {
                        if let Some(else_branch) = &n.else_branch {
                            self.execute(else_branch, data, out)?;
                        }
                    }
                }
            }
            Node::List(n) => {
                for child in &n.children {
                    self.execute(child, data, out)?;
                }
            }
        }
        Ok(())
    }

    fn eval(&self, expr: &Expr, data: &Value) -> Result<Value, AutoescapeError> {
        Ok(match expr {
            Expr::Ref(path) => {
                let mut value = data.clone();
                for field in path {
                    value = value.field(field);
                }
                value
            }
            Expr::StrLit(s) => Value::Str(s.clone()),
            Expr::IntLit(n) => Value::Int(*n),
            Expr::Call { name, args } => {
                let mut evaluated = Vec::with_capacity(args.len());
                for arg in args {
                    evaluated.push(self.eval(arg, data)?);
                }
                if let Some(function) = self.fns.get(name) {
                    function(&evaluated)
                } else if let Some(mode) = EscapeMode::from_fn_name(name) {
                    let [value] = evaluated.as_slice() else {
                        return Err(AutoescapeError::Render(format!(
                            "{name} expects exactly one argument"
                        )));
                    };
                    sanitize(mode, value)
                } else {
                    return Err(AutoescapeError::Render(format!("no such function {name}")));
                }
            }
        })
    }
}
