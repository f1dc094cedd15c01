// Template AST.
//
// A template body is a tree of nodes. Every node carries a `NodeId`
// assigned at construction: the analyzer keys its side tables (pending
// text replacements, pipeline insertions, call-site contexts) by id, so
// ordinary `Clone` is a structural snapshot sharing ids, while
// `clone_fresh` re-ids a tree for use as an independent template.

pub(crate) mod exec;
pub(crate) mod parse;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::analyzer::TraceAnalyzer;
use crate::context::Context;

/// Identity of a single AST node, unique per construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> NodeId {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        NodeId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// An expression inside `{{...}}`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `.` (empty path) or `.Field.Sub`.
    Ref(Vec<String>),
    /// A quoted string literal.
    StrLit(String),
    /// An integer literal.
    IntLit(i64),
    /// A function call; pipelines desugar to nested single-argument calls,
    /// so `.X | a | b` is `b(a(.X))`.
    Call { name: String, args: Vec<Expr> },
}

// ---------------------------------------------------------------------------
// Node structs
// ---------------------------------------------------------------------------

/// A chunk of literal template text.
#[derive(Debug, Clone, PartialEq)]
pub struct Text {
    pub id: NodeId,
    pub text: String,
}

/// An interpolation of an untrusted expression, `{{.X | f}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Interp {
    pub id: NodeId,
    pub expr: Expr,
}

/// A call to another template, `{{template "name" .X}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateCall {
    pub id: NodeId,
    pub callee: String,
    pub arg: Option<Expr>,
}

/// `{{if .C}}...{{else}}...{{end}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct If {
    pub id: NodeId,
    pub cond: Expr,
    pub then_branch: Box<Node>,
    pub else_branch: Option<Box<Node>>,
}

/// `{{with .C}}...{{else}}...{{end}}`: like `if`, but the body sees the
/// condition value as its data.
#[derive(Debug, Clone, PartialEq)]
pub struct With {
    pub id: NodeId,
    pub expr: Expr,
    pub body: Box<Node>,
    pub else_branch: Option<Box<Node>>,
}

/// `{{range .Items}}...{{else}}...{{end}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    pub id: NodeId,
    pub expr: Expr,
    pub body: Box<Node>,
    pub else_branch: Option<Box<Node>>,
}

/// The concatenation of a series of nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct List {
    pub id: NodeId,
    pub children: Vec<Node>,
}

/// A node in a template body.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(Text),
    Interp(Interp),
    Call(TemplateCall),
    If(If),
    With(With),
    Range(Range),
    List(List),
}

impl Node {
    pub fn text(text: impl Into<String>) -> Node {
        Node::Text(Text {
            id: NodeId::next(),
            text: text.into(),
        })
    }

    pub fn interp(expr: Expr) -> Node {
        Node::Interp(Interp {
            id: NodeId::next(),
            expr,
        })
    }

    pub fn call(callee: impl Into<String>, arg: Option<Expr>) -> Node {
        Node::Call(TemplateCall {
            id: NodeId::next(),
            callee: callee.into(),
            arg,
        })
    }

    pub fn if_node(cond: Expr, then_branch: Node, else_branch: Option<Node>) -> Node {
        Node::If(If {
            id: NodeId::next(),
            cond,
            then_branch: Box::new(then_branch),
            else_branch: else_branch.map(Box::new),
        })
    }

    pub fn with_node(expr: Expr, body: Node, else_branch: Option<Node>) -> Node {
        Node::With(With {
            id: NodeId::next(),
            expr,
            body: Box::new(body),
            else_branch: else_branch.map(Box::new),
        })
    }

    pub fn range_node(expr: Expr, body: Node, else_branch: Option<Node>) -> Node {
        Node::Range(Range {
            id: NodeId::next(),
            expr,
            body: Box::new(body),
            else_branch: else_branch.map(Box::new),
        })
    }

    pub fn list(children: Vec<Node>) -> Node {
        Node::List(List {
            id: NodeId::next(),
            children,
        })
    }

    pub fn id(&self) -> NodeId {
        match self {
            Node::Text(n) => n.id,
            Node::Interp(n) => n.id,
            Node::Call(n) => n.id,
            Node::If(n) => n.id,
            Node::With(n) => n.id,
            Node::Range(n) => n.id,
            Node::List(n) => n.id,
        }
    }

    /// Child nodes in trace order.
    pub fn children(&self) -> Vec<&Node> {
        match self {
            Node::Text(_) | Node::Interp(_) | Node::Call(_) => Vec::new(),
            Node::If(n) => std::iter::once(&*n.then_branch)
                .chain(n.else_branch.as_deref())
                .collect(),
            Node::With(n) => std::iter::once(&*n.body)
                .chain(n.else_branch.as_deref())
                .collect(),
            Node::Range(n) => std::iter::once(&*n.body)
                .chain(n.else_branch.as_deref())
                .collect(),
            Node::List(n) => n.children.iter().collect(),
        }
    }

    /// A structural copy with the given children substituted, in the same
    /// order `children` returned them.
    pub fn with_children(&self, new_children: Vec<Node>) -> Node {
        let mut children = new_children.into_iter();
        match self {
            Node::Text(_) | Node::Interp(_) | Node::Call(_) => self.clone(),
            Node::If(n) => {
                let then_branch = Box::new(children.next().expect("then branch"));
                let else_branch = n
                    .else_branch
                    .as_ref()
                    .and_then(|_| children.next())
                    .map(Box::new);
                Node::If(If {
                    id: n.id,
                    cond: n.cond.clone(),
                    then_branch,
                    else_branch,
                })
            }
            Node::With(n) => {
                let body = Box::new(children.next().expect("body"));
                let else_branch = n
                    .else_branch
                    .as_ref()
                    .and_then(|_| children.next())
                    .map(Box::new);
                Node::With(With {
                    id: n.id,
                    expr: n.expr.clone(),
                    body,
                    else_branch,
                })
            }
            Node::Range(n) => {
                let body = Box::new(children.next().expect("body"));
                let else_branch = n
                    .else_branch
                    .as_ref()
                    .and_then(|_| children.next())
                    .map(Box::new);
                Node::Range(Range {
                    id: n.id,
                    expr: n.expr.clone(),
                    body,
                    else_branch,
                })
            }
            Node::List(n) => Node::List(List {
                id: n.id,
                children: children.collect(),
            }),
        }
    }

    /// A recursive copy with fresh ids throughout, so the analyzer's
    /// identity-keyed side tables treat it as a distinct tree.
    pub fn clone_fresh(&self) -> Node {
        match self {
            Node::Text(n) => Node::text(n.text.clone()),
            Node::Interp(n) => Node::interp(n.expr.clone()),
            Node::Call(n) => Node::call(n.callee.clone(), n.arg.clone()),
            Node::If(n) => Node::if_node(
                n.cond.clone(),
                n.then_branch.clone_fresh(),
                n.else_branch.as_ref().map(|e| e.clone_fresh()),
            ),
            Node::With(n) => Node::with_node(
                n.expr.clone(),
                n.body.clone_fresh(),
                n.else_branch.as_ref().map(|e| e.clone_fresh()),
            ),
            Node::Range(n) => Node::range_node(
                n.expr.clone(),
                n.body.clone_fresh(),
                n.else_branch.as_ref().map(|e| e.clone_fresh()),
            ),
            Node::List(n) => {
                Node::list(n.children.iter().map(Node::clone_fresh).collect())
            }
        }
    }

    // Step-value capabilities. A node exposes the ones that apply; the
    // analyzer probes them in order.

    /// Literal text content, for text-like nodes.
    pub fn to_raw_content(&self) -> Option<&str> {
        match self {
            Node::Text(n) => Some(&n.text),
            _ => None,
        }
    }

    /// A copy with the raw content replaced.
    pub fn with_raw_content(&self, text: String) -> Node {
        match self {
            Node::Text(n) => Node::Text(Text { id: n.id, text }),
            _ => self.clone(),
        }
    }

    /// The interpolation pipeline, for interpolation-like nodes.
    pub fn to_pipeline(&self) -> Option<Pipeline> {
        match self {
            Node::Interp(n) => Some(Pipeline {
                expr: n.expr.clone(),
            }),
            _ => None,
        }
    }

    /// A copy with the pipeline replaced.
    pub fn with_pipeline(&self, pipeline: Pipeline) -> Node {
        match self {
            Node::Interp(n) => Node::Interp(Interp {
                id: n.id,
                expr: pipeline.expr,
            }),
            _ => self.clone(),
        }
    }

    /// The called template's name, for call-like nodes.
    pub fn to_callee(&self) -> Option<&str> {
        match self {
            Node::Call(n) => Some(&n.callee),
            _ => None,
        }
    }

    /// A copy with the callee replaced.
    pub fn with_callee(&self, callee: String) -> Node {
        match self {
            Node::Call(n) => Node::Call(TemplateCall {
                id: n.id,
                callee,
                arg: n.arg.clone(),
            }),
            _ => self.clone(),
        }
    }

    /// Propagates a context along every trace through this node, invoking
    /// the analyzer at leaves and joins.
    pub fn reduce_traces(&self, start: Context, analyzer: &mut dyn TraceAnalyzer) -> Context {
        match self {
            Node::Text(_) | Node::Interp(_) | Node::Call(_) => {
                analyzer.step(start, self, None)
            }
            Node::List(n) => n
                .children
                .iter()
                .fold(start, |ctx, child| child.reduce_traces(ctx, analyzer)),
            Node::If(n) => {
                let then_end = n.then_branch.reduce_traces(start, analyzer);
                let else_end = match &n.else_branch {
                    Some(else_branch) => else_branch.reduce_traces(start, analyzer),
                    None => start,
                };
                analyzer.join(&[then_end, else_end], Some("{{if}}"))
            }
            Node::With(n) => {
                let body_end = n.body.reduce_traces(start, analyzer);
                let else_end = match &n.else_branch {
                    Some(else_branch) => else_branch.reduce_traces(start, analyzer),
                    None => start,
                };
                analyzer.join(&[body_end, else_end], Some("{{with}}"))
            }
            Node::Range(n) => {
                let zero = match &n.else_branch {
                    Some(else_branch) => else_branch.reduce_traces(start, analyzer),
                    None => start,
                };
                // One iteration from the loop entry, a second from the
                // first's end: if they disagree, the loop never settles.
                let one = n.body.reduce_traces(start, analyzer);
                let two = n.body.reduce_traces(one, analyzer);
                if one != two {
                    return analyzer.no_steady_state(&[one, two], Some("{{range}}"));
                }
                analyzer.join(&[zero, one], Some("{{range}}"))
            }
        }
    }
}

/// An interpolation's chain of single-argument calls, viewed as an
/// indexed sequence. For `.X | a | b`, element 0 is `a`.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    expr: Expr,
}

impl Pipeline {
    pub fn new(expr: Expr) -> Pipeline {
        Pipeline { expr }
    }

    pub fn into_expr(self) -> Expr {
        self.expr
    }

    fn elements(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut expr = &self.expr;
        while let Expr::Call { name, args } = expr {
            if args.len() != 1 {
                break;
            }
            names.push(name.as_str());
            expr = &args[0];
        }
        names.reverse();
        names
    }

    /// The name at `index`, leftmost first, or `None` past the end.
    pub fn element_at(&self, index: usize) -> Option<&str> {
        self.elements().get(index).copied()
    }

    /// Inserts `name` so that `element_at(index)` returns it afterwards.
    pub fn insert_element_at(&mut self, index: usize, name: &str) {
        // Unwind the chain to a list, splice, and rebuild.
        let mut names: Vec<String> = Vec::new();
        let mut expr = std::mem::replace(&mut self.expr, Expr::Ref(Vec::new()));
        loop {
            match expr {
                Expr::Call { name, mut args } if args.len() == 1 => {
                    names.push(name);
                    expr = args.pop().expect("single argument");
                }
                other => {
                    expr = other;
                    break;
                }
            }
        }
        names.reverse();
        names.insert(index.min(names.len()), name.to_string());
        for name in names {
            expr = Expr::Call {
                name,
                args: vec![expr],
            };
        }
        self.expr = expr;
    }
}

// ---------------------------------------------------------------------------
// Display: the parseable source form
// ---------------------------------------------------------------------------

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Ref(path) => {
                if path.is_empty() {
                    write!(f, ".")
                } else {
                    for part in path {
                        write!(f, ".{part}")?;
                    }
                    Ok(())
                }
            }
            Expr::StrLit(s) => write!(f, "{:?}", s),
            Expr::IntLit(n) => write!(f, "{n}"),
            Expr::Call { name, args } if args.len() == 1 => {
                write!(f, "{} | {}", args[0], name)
            }
            Expr::Call { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Text(n) => f.write_str(&n.text),
            Node::Interp(n) => write!(f, "{{{{{}}}}}", n.expr),
            Node::Call(n) => match &n.arg {
                Some(arg) => write!(f, "{{{{template {:?} {}}}}}", n.callee, arg),
                None => write!(f, "{{{{template {:?}}}}}", n.callee),
            },
            Node::If(n) => {
                write!(f, "{{{{if {}}}}}{}", n.cond, n.then_branch)?;
                if let Some(else_branch) = &n.else_branch {
                    write!(f, "{{{{else}}}}{else_branch}")?;
                }
                write!(f, "{{{{end}}}}")
            }
            Node::With(n) => {
                write!(f, "{{{{with {}}}}}{}", n.expr, n.body)?;
                if let Some(else_branch) = &n.else_branch {
                    write!(f, "{{{{else}}}}{else_branch}")?;
                }
                write!(f, "{{{{end}}}}")
            }
            Node::Range(n) => {
                write!(f, "{{{{range {}}}}}{}", n.expr, n.body)?;
                if let Some(else_branch) = &n.else_branch {
                    write!(f, "{{{{else}}}}{else_branch}")?;
                }
                write!(f, "{{{{end}}}}")
            }
            Node::List(n) => {
                for child in &n.children {
                    write!(f, "{child}")?;
                }
                Ok(())
            }
        }
    }
}
