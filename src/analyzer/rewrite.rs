// Applying the analyzer's conclusions to the template set.
//
// Three kinds of pending rewrite, applied in one bottom-up walk: text
// nodes take the scanner's normalized content, interpolations get the
// missing escapers spliced into their pipelines, and calls into
// non-start contexts are redirected to context-qualified clones.

use std::collections::{HashMap, HashSet};

use crate::context::Context;
use crate::template::{Node, Pipeline};

use super::Analyzer;

impl Analyzer<'_> {
    /// Consumes the analyzer, producing the `(name, rewritten body)`
    /// pairs to push back into the template map. Clones analyzed in
    /// non-start contexts come back under fresh context-qualified names.
    pub(super) fn into_rewrites(self) -> Vec<(String, Node)> {
        // Name every analyzed (template, context) pair up front so call
        // sites can be redirected in the same walk.
        let mut taken: HashSet<String> = self.name_to_body.keys().cloned().collect();
        let mut contextualized: HashMap<(String, Context), String> = HashMap::new();
        for (name, start_ctx) in self.templates.keys() {
            let out_name = if *start_ctx == self.start_state {
                name.clone()
            } else {
                let base = format!("{name}${}", start_ctx.mangle());
                let mut candidate = base.clone();
                let mut counter = 0;
                while taken.contains(&candidate) {
                    candidate = format!("{base}{counter}");
                    counter += 1;
                }
                taken.insert(candidate.clone());
                candidate
            };
            contextualized.insert((name.clone(), *start_ctx), out_name);
        }

        self.templates
            .iter()
            .map(|((name, start_ctx), (body, _))| {
                let out_name = contextualized[&(name.clone(), *start_ctx)].clone();
                (out_name, self.rewrite_node(body, &contextualized))
            })
            .collect()
    }

    fn rewrite_node(
        &self,
        node: &Node,
        contextualized: &HashMap<(String, Context), String>,
    ) -> Node {
        let mut node = node.clone();
        if let Some(new_text) = self.text_values.get(&node.id()) {
            node = node.with_raw_content(new_text.clone());
        }
        if let Some((pipeline, esc_modes)) = self.interps.get(&node.id()) {
            let mut pipeline = pipeline.clone();
            let required: Vec<&str> = esc_modes.iter().map(|mode| mode.fn_name()).collect();
            ensure_pipeline_contains(&mut pipeline, &required);
            node = node.with_pipeline(pipeline);
        }
        if let Some(call_ctx) = self.calls.get(&node.id()) {
            if let Some(callee) = node.to_callee() {
                if let Some(out_callee) =
                    contextualized.get(&(callee.to_string(), *call_ctx))
                {
                    if out_callee != callee {
                        node = node.with_callee(out_callee.clone());
                    }
                }
            }
        }
        let children: Vec<Node> = node.children().into_iter().cloned().collect();
        let rewritten: Vec<Node> = children
            .iter()
            .map(|child| self.rewrite_node(child, contextualized))
            .collect();
        if rewritten != children {
            node = node.with_children(rewritten);
        }
        node
    }
}

/// Ensures the pipeline applies the named functions in order, keeping any
/// it already has. For `.X | escape_html` with required
/// `[escape_js_value, escape_html]`, the existing `escape_html` absorbs
/// the second requirement and `escape_js_value` is inserted before it.
///
/// A pipeline containing `noescape` is the author's opt-out and is left
/// alone.
pub(crate) fn ensure_pipeline_contains(pipeline: &mut Pipeline, required: &[&str]) {
    if required.is_empty() {
        return;
    }

    let mut idx = 0;
    while let Some(element) = pipeline.element_at(idx) {
        if element == "noescape" {
            return;
        }
        idx += 1;
    }

    let mut to_insert: Vec<&str> = required.to_vec();
    let mut el_pos = 0;
    loop {
        let Some(element) = pipeline.element_at(el_pos).map(str::to_string) else {
            break;
        };
        if let Some(matched) = to_insert
            .iter()
            .position(|name| esc_fns_eq(&element, name))
        {
            // The existing element does this slot's work; everything the
            // slot required first goes to its left.
            for name in &to_insert[..matched] {
                pipeline.insert_element_at(el_pos, name);
                el_pos += 1;
            }
            to_insert.drain(..=matched);
        }
        el_pos += 1;
    }
    for name in to_insert {
        pipeline.insert_element_at(el_pos, name);
        el_pos += 1;
    }
}

/// Whether two escaping function names do the same work.
fn esc_fns_eq(a: &str, b: &str) -> bool {
    canon(a) == canon(b)
}

fn canon(name: &str) -> &str {
    match name {
        "escape_html_attribute" => "escape_html",
        other => other,
    }
}
