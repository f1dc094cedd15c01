// Error-reporting scenarios. All problems found during a run surface
// together in one `AutoescapeError::Escape`, and a failed run leaves the
// template set unrewritten.

use html_autoescape::{parse_templates, AutoescapeError};

/// Escapes a single template, returning the joined error message or
/// `None` on success.
fn escape_err(template: &str) -> Option<String> {
    let mut set = parse_templates("z", template, Some("t")).expect("parse");
    match set.escape(&["t"]) {
        Ok(()) => None,
        Err(err @ AutoescapeError::Escape(_)) => Some(err.to_string()),
        Err(other) => panic!("unexpected error kind: {other}"),
    }
}

fn assert_ok(template: &str) {
    if let Some(msg) = escape_err(template) {
        panic!("expected success for {template:?}, got: {msg}");
    }
}

fn assert_err_contains(template: &str, want: &str) {
    let Some(msg) = escape_err(template) else {
        panic!("expected an error for {template:?}");
    };
    assert!(
        msg.contains(want),
        "error for {template:?}\n  was: {msg}\n  missing: {want}"
    );
}

#[test]
fn well_formed_branches_pass() {
    assert_ok("{{if .Cond}}<a>{{else}}<b>{{end}}");
    assert_ok("{{if .Cond}}<a>{{end}}");
    assert_ok("{{if .Cond}}{{else}}<b>{{end}}");
    assert_ok("{{with .Cond}}<div>{{end}}");
    assert_ok("{{range .Items}}<a>{{end}}");
    assert_ok("<a href='/foo?{{range .Items}}&{{.K}}={{.V}}{{end}}'>");
}

#[test]
fn branches_ending_in_incompatible_contexts() {
    assert_err_contains(
        "{{if .Cond}}<a{{end}}",
        "{{if}}: branches end in incompatible contexts",
    );
    assert_err_contains(
        "{{if .Cond}}\n{{else}}\n<a{{end}}",
        "{{if}}: branches end in incompatible contexts",
    );
    // Missing close quote in the else branch.
    assert_err_contains(
        "{{if .Cond}}<a href=\"foo\">{{else}}<a href=\"bar>{{end}}",
        "{{if}}: branches end in incompatible contexts",
    );
    // Different attribute kinds: href is a URL, title is not.
    assert_err_contains(
        "<a {{if .Cond}}href='{{else}}title='{{end}}{{.X}}'>",
        "{{if}}: branches end in incompatible contexts",
    );
    assert_err_contains(
        "\n{{with .X}}<a{{end}}",
        "{{with}}: branches end in incompatible contexts",
    );
}

#[test]
fn loop_re_entry_errors() {
    // The second iteration starts mid-tag-name, where "<a" cannot be
    // scanned.
    assert_err_contains(
        "{{range .Items}}<a{{end}}",
        "bad content in [Context TagName]: `<a`",
    );
    assert_err_contains(
        "\n{{range .Items}} x='<a{{end}}",
        "{{range}}: loop switches between states ([Context TagName], \
         [Context Attr Delim=SingleQuote])",
    );
}

#[test]
fn templates_must_end_where_they_start() {
    assert_err_contains(
        "<a b=1 c={{.H}}",
        "template t does not start and end in the same context",
    );
    assert_err_contains(
        "<script>foo();",
        "template t does not start and end in the same context",
    );
    assert_err_contains(
        "<script>/foo/ /=",
        "template t does not start and end in the same context",
    );
}

#[test]
fn ambiguous_url_context() {
    assert_err_contains(
        "<a href=\"{{if .F}}/foo?a={{else}}/bar/{{end}}{{.H}}\">",
        "hole appears in an ambiguous URL context",
    );
}

#[test]
fn unfinished_js_tokens() {
    assert_err_contains("<a onclick=\"alert('Hello \\", "bad content in [Context JsSqStr");
    assert_err_contains(
        "<a onclick='alert(\"Hello\\, World\\",
        "bad content in [Context JsDqStr",
    );
    assert_err_contains("<a onclick=\"/foo[\\]/", "bad content in [Context JsRegexp");
}

#[test]
fn ambiguous_slash() {
    // After the branch join nobody knows whether '/' divides or opens a
    // regexp.
    assert_err_contains(
        "<script>{{if .F}}var x = 1{{end}}/-{{\"1.5\"}}/i.test(x)</script>",
        "ambiguous / could be a RegExp or division",
    );
}

#[test]
fn missing_template() {
    assert_err_contains("{{template \"foo\"}}", "no such template foo");
}

#[test]
fn unresolvable_recursion() {
    let source = concat!(
        "{{define \"z\"}}<script>reverseList = [{{template \"t\"}}]</script>{{end}}",
        // Unbalanced: each level appends '",' so the end context never
        // matches any single assumption.
        "{{define \"t\"}}{{if .Tail}}{{template \"t\" .Tail}}{{end}}{{.Head}}\",{{end}}",
    );
    let mut set = parse_templates("z", source, None).expect("parse");
    let err = set.escape(&["z"]).expect_err("should fail");
    assert!(
        err.to_string()
            .contains("cannot compute output context for template t in"),
        "got: {err}"
    );
}

#[test]
fn all_errors_are_reported_together() {
    let source = concat!(
        "{{define \"a\"}}{{if .A}}<a{{end}}{{end}}",
        "{{define \"b\"}}{{template \"nowhere\"}}{{end}}",
    );
    let mut set = parse_templates("z", source, None).expect("parse");
    let msg = set.escape(&["a", "b"]).expect_err("should fail").to_string();
    assert!(
        msg.contains("branches end in incompatible contexts"),
        "got: {msg}"
    );
    assert!(msg.contains("no such template nowhere"), "got: {msg}");
}

#[test]
fn error_context_is_absorbing() {
    // One root cause, one report: everything after the first failure is
    // in the error context and stays quiet.
    let msg = escape_err("{{if .A}}<a{{end}}{{if .B}}<b{{end}}").expect("error");
    let occurrences = msg.matches("branches end in incompatible contexts").count();
    assert_eq!(occurrences, 1, "got: {msg}");
}

#[test]
fn failed_escape_leaves_templates_unrewritten() {
    let source = "{{.X}}{{if .Cond}}<a{{end}}";
    let mut set = parse_templates("z", source, Some("t")).expect("parse");
    assert!(set.escape(&["t"]).is_err());
    assert_eq!(set.body("t").expect("t").to_string(), source);
}
