// End-to-end tests: parse, contextually escape, render, and compare the
// output byte for byte.

use std::collections::BTreeMap;

use pretty_assertions::assert_eq;

use html_autoescape::{parse_templates, safe_html, Value};

/// The shared data value: scalars, lists, and typed content under
/// single-letter keys.
fn data() -> Value {
    let mut map = BTreeMap::new();
    map.insert("F".to_string(), Value::Bool(false));
    map.insert("T".to_string(), Value::Bool(true));
    map.insert("C".to_string(), Value::Str("<Cincinatti>".into()));
    map.insert("G".to_string(), Value::Str("<Goodbye>".into()));
    map.insert("H".to_string(), Value::Str("<Hello>".into()));
    map.insert(
        "A".to_string(),
        Value::List(vec![Value::Str("<a>".into()), Value::Str("<b>".into())]),
    );
    map.insert("E".to_string(), Value::List(vec![]));
    map.insert("N".to_string(), Value::Int(42));
    map.insert("Z".to_string(), Value::Null);
    map.insert(
        "W".to_string(),
        safe_html("&iexcl;<b class=\"foo\">Hello</b>, <textarea>O'World</textarea>!"),
    );
    Value::Map(map)
}

fn check(name: &str, template: &str, want: &str) {
    let mut set = parse_templates(name, template, Some("main"))
        .unwrap_or_else(|err| panic!("{name}: parse failed: {err}"));
    set.escape(&["main"])
        .unwrap_or_else(|err| panic!("{name}: escape failed: {err}"));
    let got = set
        .render("main", &data())
        .unwrap_or_else(|err| panic!("{name}: render failed: {err}"));
    assert_eq!(got, want, "{name}: template {template:?}");
}

#[test]
fn plain_text_interpolation() {
    check("top level", "Hello, {{.C}}!", "Hello, &lt;Cincinatti&gt;!");
    check(
        "if",
        "{{if .T}}Hello{{end}}, {{.C}}!",
        "Hello, &lt;Cincinatti&gt;!",
    );
    check(
        "else",
        "{{if .F}}{{.H}}{{else}}{{.G}}{{end}}!",
        "&lt;Goodbye&gt;!",
    );
    check("with body", "{{with .H}}{{.}}{{end}}", "&lt;Hello&gt;");
    check(
        "with else",
        "{{with .E}}{{.}}{{else}}{{.H}}{{end}}",
        "&lt;Hello&gt;",
    );
    check("range body", "{{range .A}}{{.}}{{end}}", "&lt;a&gt;&lt;b&gt;");
    check(
        "range else",
        "{{range .E}}{{.}}{{else}}{{.H}}{{end}}",
        "&lt;Hello&gt;",
    );
    check("non-string value", "{{.T}}", "true");
}

#[test]
fn existing_escapers_are_not_doubled() {
    check(
        "explicit pipeline",
        "Hello, {{.C | escape_html}}!",
        "Hello, &lt;Cincinatti&gt;!",
    );
    check(
        "explicit call",
        "Hello, {{escape_html(.C)}}!",
        "Hello, &lt;Cincinatti&gt;!",
    );
}

#[test]
fn url_attributes() {
    check(
        "constant in query",
        r#"<a href="/search?q={{"'a<b'"}}">"#,
        r#"<a href="/search?q=%27a%3cb%27">"#,
    );
    check(
        "relative url start",
        r#"<a href='{{"/foo/bar?a=b&c=d"}}'>"#,
        "<a href='/foo/bar?a=b&amp;c=d'>",
    );
    check(
        "absolute url start",
        r#"<a href='{{"http://example.com/foo/bar?a=b&c=d"}}'>"#,
        "<a href='http://example.com/foo/bar?a=b&amp;c=d'>",
    );
    check(
        "protocol-relative url start",
        r#"<a href='{{"//example.com:8000/foo/bar?a=b&c=d"}}'>"#,
        "<a href='//example.com:8000/foo/bar?a=b&amp;c=d'>",
    );
    check(
        "path-relative url start",
        r#"<a href="{{"/javascript:80/foo/bar"}}">"#,
        r#"<a href="/javascript:80/foo/bar">"#,
    );
    check(
        "dangerous url start",
        r#"<a href='{{"javascript:alert(%22pwned%22)"}}'>"#,
        "<a href='#zSafehtmlz'>",
    );
    check(
        "dangerous url start after space",
        r#"<a href='  {{"javascript:alert(%22pwned%22)"}}'>"#,
        "<a href='  #zSafehtmlz'>",
    );
    check(
        "non-hierarchical url",
        "<a href={{\"mailto:Muhammed \\\"The Greatest\\\" Ali <m.ali@example.com>\"}}>",
        r#"<a href="mailto:Muhammed%20%22The%20Greatest%22%20Ali%20%3cm.ali@example.com%3e">"#,
    );
    check(
        "url path",
        r#"<a href='http://{{"javascript:80"}}/foo'>"#,
        "<a href='http://javascript:80/foo'>",
    );
    check(
        "url query",
        "<a href='/search?q={{.H}}'>",
        "<a href='/search?q=%3cHello%3e'>",
    );
    check(
        "url fragment",
        "<a href='/faq#{{.H}}'>",
        "<a href='/faq#%3cHello%3e'>",
    );
    check(
        "url branch",
        r#"<a href="{{if .F}}/foo?a=b{{else}}/bar{{end}}">"#,
        r#"<a href="/bar">"#,
    );
    check(
        "url branch conflict moot",
        r#"<a href="{{if .T}}/foo?a={{else}}/bar#{{end}}{{.C}}">"#,
        r#"<a href="/foo?a=%3cCincinatti%3e">"#,
    );
}

#[test]
fn unquoted_attribute_values_are_quoted() {
    check(
        "multiple attrs",
        "<a b=1 c={{.H}}>",
        r#"<a b="1" c="&lt;Hello&gt;">"#,
    );
    check("unquoted url", "<a href={{.H}}>", r#"<a href="%3cHello%3e">"#);
}

#[test]
fn js_values() {
    check(
        "string value",
        "<button onclick='alert({{.H}})'>",
        r#"<button onclick='alert(&#34;\x3cHello\x3e&#34;)'>"#,
    );
    check(
        "string value in double-quoted handler",
        r#"<button onclick="alert({{.H}})">"#,
        r#"<button onclick="alert(&#34;\x3cHello\x3e&#34;)">"#,
    );
    check(
        "numeric value",
        "<button onclick='alert({{.N}})'>",
        "<button onclick='alert( 42 )'>",
    );
    check(
        "boolean value",
        "<button onclick='alert({{.T}})'>",
        "<button onclick='alert( true )'>",
    );
    check(
        "null value",
        "<button onclick='alert(typeof{{.Z}})'>",
        "<button onclick='alert(typeof null )'>",
    );
    check(
        "list value",
        "<button onclick='alert({{.A}})'>",
        r#"<button onclick='alert([&#34;\x3ca\x3e&#34;,&#34;\x3cb\x3e&#34;])'>"#,
    );
    check(
        "list value in script",
        "<script>alert({{.A}})</script>",
        r#"<script>alert(["\x3ca\x3e","\x3cb\x3e"])</script>"#,
    );
    check(
        "not over-escaped",
        "<button onclick='alert({{.A | escape_html}})'>",
        r#"<button onclick='alert([&#34;\x3ca\x3e&#34;,&#34;\x3cb\x3e&#34;])'>"#,
    );
    check(
        "quoted string",
        "<button onclick='alert(&quot;{{.H}}&quot;)'>",
        "<button onclick='alert(\"\\x3cHello\\x3e\")'>",
    );
    check(
        "not under-escaped",
        "<button onclick='alert({{.C | escape_url}})'>",
        "<button onclick='alert(&#34;%3cCincinatti%3e&#34;)'>",
    );
}

#[test]
fn js_regexps() {
    check(
        "regexp content",
        r#"<button onclick='alert(/{{"foo+bar"}}/.test(""))'>"#,
        r#"<button onclick='alert(/foo\x2bbar/.test(""))'>"#,
    );
    check(
        "blank regexp",
        r#"<script>alert(/{{""}}/.test(""));</script>"#,
        r#"<script>alert(/(?:)/.test(""));</script>"#,
    );
    // The branch join leaves the regexp-or-division question open, but no
    // slash follows, so nothing is lost.
    check(
        "ambiguous js context without slash",
        "<script>{{if .T}}var x = 1{{end}}</script>",
        "<script>var x = 1</script>",
    );
}

#[test]
fn css_values() {
    check(
        "bidi keyword",
        r#"<p style="dir: {{"ltr"}}">"#,
        r#"<p style="dir: ltr">"#,
    );
    check(
        "property names",
        r#"<p style="border-{{"left"}}: 0; border-{{"right"}}: 1in">"#,
        r#"<p style="border-left: 0; border-right: 1in">"#,
    );
    check(
        "expression blocked",
        r#"<p style="width: {{"expression(alert(1337))"}}">"#,
        r#"<p style="width: zSafehtmlz">"#,
    );
    check(
        "obfuscated expression blocked",
        r#"<p style="width: {{"  e\\78preS\\0Sio/**/n(alert(1337))"}}">"#,
        r#"<p style="width: zSafehtmlz">"#,
    );
    check(
        "moz-binding blocked",
        r#"<p style="{{"-moz-binding(alert(1337))"}}: ...">"#,
        r#"<p style="zSafehtmlz: ...">"#,
    );
    check(
        "tag selector in style element",
        r#"<style>{{"p"}} { color: pink }</style>"#,
        "<style>p { color: pink }</style>",
    );
    check(
        "id selector in style element",
        r##"<style>p{{"#my-ID"}} { font: Arial }</style>"##,
        "<style>p#my-ID { font: Arial }</style>",
    );
    check(
        "quantities",
        r#"<a style="left: {{"2em"}}; top: {{0}}">"#,
        r#"<a style="left: 2em; top: 0">"#,
    );
    check(
        "percentage",
        r#"<table style=width:{{"100%"}}>"#,
        r#"<table style="width:100%">"#,
    );
    check(
        "colors",
        r##"<p style="color: {{"#8ff"}}; background: {{"#000"}}">"##,
        r#"<p style="color: #8ff; background: #000">"#,
    );
    check(
        "property pair",
        r#"<a style='{{"color: red"}}'>"#,
        "<a style='color: red'>",
    );
    check(
        "font name in string",
        r#"<p style='font-family: "{{"Times New Roman"}}"'>"#,
        r#"<p style='font-family: "Times New Roman"'>"#,
    );
    check(
        "font name unquoted",
        r#"<p style='font-family: {{"Times New Roman"}}'>"#,
        "<p style='font-family: Times New Roman'>",
    );
}

#[test]
fn css_urls() {
    check(
        "url query encoded",
        r#"<p style="background: url(/img?name={{"O'Reilly Animal(1)<2>.png"}})">"#,
        r#"<p style="background: url(/img?name=O%27Reilly%20Animal%281%29%3c2%3e.png)">"#,
    );
    check(
        "quoted url query encoded",
        r#"<p style="background: url('/img?name={{"O'Reilly Animal(1)<2>.png"}}')">"#,
        r#"<p style="background: url('/img?name=O%27Reilly%20Animal%281%29%3c2%3e.png')">"#,
    );
    check(
        "string query encoded",
        r#"<p style="background: '/img?name={{"O'Reilly Animal(1)<2>.png"}}'">"#,
        r#"<p style="background: '/img?name=O%27Reilly%20Animal%281%29%3c2%3e.png'">"#,
    );
    check(
        "bad protocol in url blocked",
        r#"<a style="background: url('{{"javascript:alert(1337)"}}')">"#,
        r#"<a style="background: url('#zSafehtmlz')">"#,
    );
    check(
        "bad protocol in string blocked",
        r#"<a style="background: '{{"vbscript:alert(1337)"}}'">"#,
        r#"<a style="background: '#zSafehtmlz'">"#,
    );
    check(
        "escaped colon is not a protocol",
        r#"<a style="background:'{{"javascript\\3a alert(1337)"}}'">"#,
        r#"<a style="background:'javascript\\3a alert\28 1337\29 '">"#,
    );
    check(
        "good protocol in url passed",
        r#"<a style="background: url('{{"http://oreilly.com/O'Reilly Animals(1)<2>;{}.html"}}')">"#,
        r#"<a style="background: url('http://oreilly.com/O%27Reilly%20Animals%281%29%3c2%3e;%7b%7d.html')">"#,
    );
    check(
        "good protocol in string escaped for css",
        r#"<a style="background: '{{"http://oreilly.com/O'Reilly Animals(1)<2>;{}.html"}}'">"#,
        r#"<a style="background: 'http\3a \2f \2f oreilly.com\2f O\27 Reilly Animals\28 1\29 \3c 2\3e \3b \7b \7d .html'">"#,
    );
    check(
        "url in attr is html-escaped",
        r#"<a style="background: url('{{"/search?img=foo&size=icon"}}')">"#,
        r#"<a style="background: url('/search?img=foo&amp;size=icon')">"#,
    );
    check(
        "url in style element is not html-escaped",
        r#"<style>body { background: url('{{"/search?img=foo&size=icon"}}') }</style>"#,
        r#"<style>body { background: url('/search?img=foo&size=icon') }</style>"#,
    );
    check(
        "mixed-case url keyword",
        r#"<p style="background: URL(#{{.H}})">"#,
        r#"<p style="background: URL(#%3cHello%3e)">"#,
    );
}

#[test]
fn html_comments_and_normalization() {
    check(
        "comment elided",
        "<b>Hello, <!-- name of world -->{{.C}}</b>",
        "<b>Hello, &lt;Cincinatti&gt;</b>",
    );
    check("comment not first < in text", "<<!-- -->!--", "&lt;!--");
    check("orphan lt", "a < b", "a &lt; b");
    check("double lt", "a << b", "a &lt;&lt; b");
    check("lt then comments", "a<<!-- --><!-- -->b", "a&lt;b");
    check(
        "doctype preserved",
        "<!DOCTYPE html>Hello, World!",
        "<!DOCTYPE html>Hello, World!",
    );
    check("no doctype injection", r#"<!{{"DOCTYPE"}}"#, "&lt;!DOCTYPE");
    check(
        "split comment",
        "<b>Hello, <!-- name of {{if .T}}city -->{{.C}}{{else}}world -->{{.W}}{{end}}</b>",
        "<b>Hello, &lt;Cincinatti&gt;</b>",
    );
    check(
        "interpolation commented out",
        "<p><!-- {{.H}} --></p>",
        "<p></p>",
    );
}

#[test]
fn js_and_css_comments_in_attributes() {
    check(
        "js block comment in attr",
        r#"<a onclick="f(&quot;&quot;); /* alert({{.H}}) */">"#,
        r#"<a onclick="f(&#34;&#34;);  ">"#,
    );
    check(
        "js line comment in attr",
        r#"<a onclick="// alert({{.G}})">"#,
        r#"<a onclick="">"#,
    );
    check(
        "css block comment in attr",
        r#"<a style="/* color: {{.H}} */">"#,
        r#"<a style=" ">"#,
    );
    check(
        "css line comment in attr",
        r#"<a style="// color: {{.G}}">"#,
        r#"<a style="">"#,
    );
    check(
        "comments flush with interpolations",
        "<!--{{.}}--><script>/*{{.}}*///{{.}}\n</script><style>/*{{.}}*///{{.}}\n</style><a onclick='/*{{.}}*///{{.}}' style='/*{{.}}*///{{.}}'>",
        "<script> \n</script><style> \n</style><a onclick=' ' style=' '>",
    );
}

#[test]
fn js_comments_in_script_elements() {
    check(
        "line comment keeps its terminator",
        "<script>for (;;) { if (c()) break// foo not a label\nfoo({{.T}});}</script>",
        "<script>for (;;) { if (c()) break\nfoo( true );}</script>",
    );
    check(
        "multiline block comment keeps a newline",
        "<script>for (;;) { if (c()) break/* foo not a label\n */foo({{.T}});}</script>",
        "<script>for (;;) { if (c()) break \nfoo( true );}</script>",
    );
    check(
        "single-line block comment collapses to a space",
        "<script>for (;;) {\nif (c()) break/* foo a label */foo;x({{.T}});}</script>",
        "<script>for (;;) {\nif (c()) break foo;x( true );}</script>",
    );
    check(
        "css comments collapse",
        "<style>p// paragraph\n{border: 1px/* color */{{\"#00f\"}}}</style>",
        "<style>p\n{border: 1px #00f}</style>",
    );
}

#[test]
fn typed_content_passes_where_safe() {
    check(
        "typed html in text",
        "{{.W}}",
        "&iexcl;<b class=\"foo\">Hello</b>, <textarea>O'World</textarea>!",
    );
    check(
        "typed html in attribute",
        r#"<div title="{{.W}}">"#,
        r#"<div title="&iexcl;Hello, O&#39;World!">"#,
    );
    check(
        "typed html in script",
        r#"<button onclick="alert({{.W}})">"#,
        r#"<button onclick="alert(&#34;&amp;iexcl;\x3cb class=\&#34;foo\&#34;\x3eHello\x3c/b\x3e, \x3ctextarea\x3eO&#39;World\x3c/textarea\x3e!&#34;)">"#,
    );
    check(
        "typed html in rcdata",
        "<textarea>{{.W}}</textarea>",
        "<textarea>&iexcl;&lt;b class=&#34;foo&#34;&gt;Hello&lt;/b&gt;, &lt;textarea&gt;O&#39;World&lt;/textarea&gt;!</textarea>",
    );
    check(
        "range in textarea",
        "<textarea>{{range .A}}{{.}}{{end}}</textarea>",
        "<textarea>&lt;a&gt;&lt;b&gt;</textarea>",
    );
    check(
        "noescape exemption",
        "{{range .A}}{{. | noescape}}{{end}}",
        "<a><b>",
    );
}

#[test]
fn structure_injection_is_blocked() {
    check(
        "no tag injection",
        r#"{{"10$"}}<{{"script src,evil.org/pwnd.js"}}..."#,
        "10$&lt;script src,evil.org/pwnd.js...",
    );
    check("no comment injection", r#"<{{"!--"}}"#, "&lt;!--");
    check(
        "no rcdata end tag injection",
        r#"<textarea><{{"/textarea "}}...</textarea>"#,
        "<textarea>&lt;/textarea ...</textarea>",
    );
}

#[test]
fn conditional_attributes() {
    check(
        "optional attrs",
        concat!(
            r#"<img class="{{"iconClass"}}""#,
            r#"{{if .T}} id="{{"<iconId>"}}"{{end}}"#,
            r#" src="#,
            r#"{{if .T}}"?{{"<iconPath>"}}"{{else}}"images/cleardot.gif"{{end}}"#,
            r#"{{if .T}}title="{{"<title>"}}"{{end}}"#,
            r#" alt=""#,
            r#"{{if .T}}{{"<alt>"}}{{else}}{{if .F}}{{"<title>"}}{{end}}{{end}}""#,
            ">",
        ),
        concat!(
            r#"<img class="iconClass" id="&lt;iconId&gt;""#,
            r#" src="?%3ciconPath%3e"title="&lt;title&gt;" alt="&lt;alt&gt;">"#,
        ),
    );
    check(
        "conditional valueless attr",
        "<input{{if .T}} checked{{end}} name=n>",
        r#"<input checked name="n">"#,
    );
    check(
        "conditional dynamic valueless attr",
        r#"<input{{if .T}} {{"checked"}}{{end}} name=n>"#,
        r#"<input checked name="n">"#,
    );
    check(
        "conditional dynamic valueless attr before static",
        r#"<input {{if .T}}{{"checked"}} {{end}}name=n>"#,
        r#"<input checked name="n">"#,
    );
}

#[test]
fn dynamic_names_are_filtered() {
    check(
        "dynamic attribute name",
        r#"<img on{{"load"}}="alert({{"loaded"}})">"#,
        r#"<img onload="alert(&#34;loaded&#34;)">"#,
    );
    check(
        "bad dynamic attribute name 1",
        r#"<input {{"onchange"}}="{{"doEvil()"}}">"#,
        r#"<input zSafehtmlz="doEvil()">"#,
    );
    check(
        "bad dynamic attribute name 2",
        r#"<div {{"sTyle"}}="{{"color: expression(alert(1337))"}}">"#,
        r#"<div zSafehtmlz="color: expression(alert(1337))">"#,
    );
    check(
        "bad dynamic attribute name 3",
        r#"<img {{"src"}}="{{"javascript:doEvil()"}}">"#,
        r#"<img zSafehtmlz="javascript:doEvil()">"#,
    );
    check(
        "bad dynamic attribute name 4",
        r#"<input checked {{""}}="Whose value am I?">"#,
        r#"<input checked zSafehtmlz="Whose value am I?">"#,
    );
    check(
        "dynamic element name",
        r#"<h{{3}}><table><t{{"head"}}>...</h{{3}}>"#,
        "<h3><table><thead>...</h3>",
    );
    check(
        "bad dynamic element name",
        r#"<{{"script"}}>{{"doEvil()"}}</{{"script"}}>"#,
        "&lt;script>doEvil()&lt;/script>",
    );
}

#[test]
fn escaping_is_idempotent_on_rewritten_templates() {
    let source = r#"<a href="/search?q={{.H}}" onclick='alert({{.H}})'>{{.C}}</a>"#;
    let mut set = parse_templates("t", source, Some("main")).expect("parse");
    set.escape(&["main"]).expect("first escape");
    let once = set.body("main").expect("body").to_string();
    set.escape(&["main"]).expect("second escape");
    let twice = set.body("main").expect("body").to_string();
    assert_eq!(once, twice);
}
