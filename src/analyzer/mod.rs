// The trace analyzer.
//
// Walks every trace through each public template, threading a context
// through text chunks (via the scanner), interpolations (via the
// escape-mode selector), and template calls (recursively, reaching a
// fixed point for recursion and loops). Conclusions accumulate in
// side tables keyed by node identity; after a clean pass the rewriter
// applies them.
//
// Reference: the escape pass of Go's html/template
// (https://pkg.go.dev/html/template).

mod rewrite;

use std::collections::{HashMap, HashSet};

use crate::context::Context;
use crate::error::AutoescapeError;
use crate::escaping::{esc_mode_for_hole, EscapeMode};
use crate::scanner::process_raw_text;
use crate::template::{Node, NodeId, Pipeline};

/// The callbacks a template body invokes while its traces are reduced.
///
/// A step value is a node exposing at least one of the text /
/// interpolation / call capabilities; other nodes pass the state through
/// unchanged.
pub trait TraceAnalyzer {
    /// Propagates the state across one leaf step.
    fn step(&mut self, start: Context, step_value: &Node, debug_hint: Option<&str>) -> Context;

    /// Merges the end states of branches that rejoin.
    fn join(&mut self, states: &[Context], debug_hint: Option<&str>) -> Context;

    /// A re-entrant construct whose body keeps shifting the state has no
    /// finite description; reports it and yields an error state.
    fn no_steady_state(&mut self, states: &[Context], debug_hint: Option<&str>) -> Context;
}

/// Contextually escapes the templates in `name_to_body`.
///
/// Each public template is required to start and end in `start`, so that
/// concatenating outputs of escaped templates is itself safe. On success
/// the map is rewritten in place (and may gain context-qualified clones
/// of helper templates); on failure it is untouched and unsafe to use.
pub(crate) fn escape_templates(
    name_to_body: &mut HashMap<String, Node>,
    public_names: &[&str],
    start: Context,
) -> Result<(), AutoescapeError> {
    let updates = {
        let mut analyzer = Analyzer::new(name_to_body, start);
        let mut has_errors = false;

        for &name in public_names {
            let end = analyzer.external_call(name, start, None);
            if end.is_error() {
                has_errors = true;
            } else if end != start {
                analyzer.error(
                    None,
                    format!(
                        "template {name} does not start and end in the same context: {end}"
                    ),
                );
                has_errors = true;
            }
        }

        if has_errors {
            return Err(AutoescapeError::Escape(analyzer.errors));
        }
        analyzer.into_rewrites()
    };

    for (name, body) in updates {
        name_to_body.insert(name, body);
    }
    Ok(())
}

type TemplateKey = (String, Context);

/// Applies the context-propagation algorithm to a template set, building
/// side tables of pending rewrites and cloning templates that are called
/// in non-start contexts.
struct Analyzer<'a> {
    name_to_body: &'a HashMap<String, Node>,
    /// The context public templates are called in.
    start_state: Context,
    /// Memoized `(template, start context) -> (body, end context)`;
    /// entries double as fixed-point assumptions during speculation.
    templates: HashMap<TemplateKey, (Node, Context)>,
    /// Every `(template, start context)` pair that was invoked.
    called: HashSet<TemplateKey>,
    /// Text nodes whose content the scanner normalized.
    text_values: HashMap<NodeId, String>,
    /// Interpolations and the escaper pipelines they need.
    interps: HashMap<NodeId, (Pipeline, Vec<EscapeMode>)>,
    /// Call sites and the contexts they occur in.
    calls: HashMap<NodeId, Context>,
    /// Why escaping failed, in discovery order.
    errors: Vec<String>,
}

impl<'a> Analyzer<'a> {
    fn new(name_to_body: &'a HashMap<String, Node>, start_state: Context) -> Analyzer<'a> {
        Analyzer {
            name_to_body,
            start_state,
            templates: HashMap::new(),
            called: HashSet::new(),
            text_values: HashMap::new(),
            interps: HashMap::new(),
            calls: HashMap::new(),
            errors: Vec::new(),
        }
    }

    fn derived(&self) -> Analyzer<'a> {
        let mut child = Analyzer::new(self.name_to_body, self.start_state);
        child.templates = self.templates.clone();
        child
    }

    fn error(&mut self, debug_hint: Option<&str>, msg: String) {
        match debug_hint {
            Some(hint) => self.errors.push(format!("{hint}: {msg}")),
            None => self.errors.push(msg),
        }
    }

    /// Types a call to `name` in `start_ctx`, returning the context after
    /// a successful call.
    fn external_call(
        &mut self,
        name: &str,
        start_ctx: Context,
        debug_hint: Option<&str>,
    ) -> Context {
        let key = (name.to_string(), start_ctx);
        self.called.insert(key.clone());
        if let Some((_, end)) = self.templates.get(&key) {
            return *end;
        }
        let Some(body) = self.name_to_body.get(name) else {
            self.error(debug_hint, format!("no such template {name}"));
            return Context::ERROR;
        };
        // A template called outside the start context gets its own copy,
        // so its pipelines and calls can be rewritten independently of
        // the original.
        let body = if start_ctx != self.start_state {
            body.clone_fresh()
        } else {
            body.clone()
        };
        self.compute_end_context(key, body, debug_hint)
    }

    /// Finds the end context of `body` by fixed point: assume the call
    /// ends where it starts, and if that speculation fails, retry once
    /// with the context the first pass computed.
    fn compute_end_context(
        &mut self,
        key: TemplateKey,
        body: Node,
        debug_hint: Option<&str>,
    ) -> Context {
        #[cfg(feature = "tracing")]
        tracing::trace!(template = %key.0, context = %key.1, "computing end context");

        let (ctx, problems) = self.escape_template_body(&key, key.1, &body);
        let (ctx, problems) = match problems {
            None => (ctx, None),
            Some(first_problems) => {
                let (retry_ctx, retry_problems) = self.escape_template_body(&key, ctx, &body);
                match retry_problems {
                    None => (retry_ctx, None),
                    Some(_) => (ctx, Some(first_problems)),
                }
            }
        };
        match problems {
            None => ctx,
            Some(problems) => {
                if !ctx.is_error() {
                    // The speculation failed quietly; explain it.
                    self.error(
                        debug_hint,
                        format!(
                            "cannot compute output context for template {} in {}",
                            key.0, key.1
                        ),
                    );
                }
                self.errors.extend(problems);
                Context::ERROR
            }
        }
    }

    /// Speculatively types `body` under the assumption that calls to it
    /// end in `assumed_end`. Inferences are folded into `self` only when
    /// the speculation holds; otherwise only the problems escape, so a
    /// failed guess cannot poison the parent's tables.
    fn escape_template_body(
        &mut self,
        key: &TemplateKey,
        assumed_end: Context,
        body: &Node,
    ) -> (Context, Option<Vec<String>>) {
        // Record the assumption first so recursive calls take the
        // memoized fast path instead of recursing forever.
        self.templates
            .insert(key.clone(), (body.clone(), assumed_end));

        let mut child = self.derived();
        let end = body.reduce_traces(key.1, &mut child);

        // If the template recurses, the computed end must agree with the
        // assumption; if it does not recurse, the assumption never
        // entered the computation and the end stands on its own.
        let holds = !end.is_error() && !(child.called.contains(key) && assumed_end != end);
        if !holds {
            self.templates
                .insert(key.clone(), (body.clone(), Context::ERROR));
            return (end, Some(child.errors));
        }

        self.templates.extend(child.templates);
        self.called.extend(child.called);
        self.text_values.extend(child.text_values);
        self.interps.extend(child.interps);
        self.calls.extend(child.calls);
        self.errors.extend(child.errors);
        self.templates.insert(key.clone(), (body.clone(), end));
        (end, None)
    }
}

impl TraceAnalyzer for Analyzer<'_> {
    fn step(&mut self, start: Context, step_value: &Node, debug_hint: Option<&str>) -> Context {
        if start.is_error() {
            // Error is absorbing; one explanation per root cause.
            return start;
        }
        if let Some(raw) = step_value.to_raw_content() {
            let scan = process_raw_text(raw, start);
            match scan.error {
                Some(err) => self.error(debug_hint, err.describe()),
                None => {
                    if scan.text != raw {
                        self.text_values.insert(step_value.id(), scan.text);
                    }
                }
            }
            return scan.context;
        }
        if let Some(pipeline) = step_value.to_pipeline() {
            let (end, esc_modes, problem) = esc_mode_for_hole(start);
            self.interps.insert(step_value.id(), (pipeline, esc_modes));
            if end.is_error() {
                let msg =
                    problem.unwrap_or_else(|| format!("hole cannot appear in {start}"));
                self.error(debug_hint, msg);
            }
            return end;
        }
        if let Some(callee) = step_value.to_callee() {
            let callee = callee.to_string();
            let end = self.external_call(&callee, start, debug_hint);
            self.calls.insert(step_value.id(), start);
            return end;
        }
        start
    }

    fn join(&mut self, states: &[Context], debug_hint: Option<&str>) -> Context {
        let mut out = match states.first() {
            Some(first) => *first,
            None => return Context::ERROR,
        };
        for state in &states[1..] {
            out = Context::union(out, *state);
        }
        if out.is_error() && !states.iter().any(|state| state.is_error()) {
            let listed: Vec<String> = states.iter().map(Context::to_string).collect();
            self.error(
                debug_hint,
                format!("branches end in incompatible contexts: {}", listed.join(", ")),
            );
        }
        out
    }

    fn no_steady_state(&mut self, states: &[Context], debug_hint: Option<&str>) -> Context {
        for state in states {
            if state.is_error() {
                // Already explained when the state was produced.
                return *state;
            }
        }
        let listed: Vec<String> = states.iter().map(Context::to_string).collect();
        self.error(
            debug_hint,
            format!("loop switches between states ({})", listed.join(", ")),
        );
        Context::ERROR
    }
}
