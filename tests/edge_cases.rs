mod common;

use gst::ast::pretty;
use gst::lexer::{tokenize, TokenType};
use gst::parser::{self, validate, Grammar};
use gst::{render, Bindings, CompileError, Error, ExecutionError, Value};

fn with(name: &str, value: impl Into<Value>) -> Bindings {
    let mut bindings = Bindings::new();
    bindings.insert(name.to_string(), value.into());
    bindings
}

// ── Edge cases for the template pipeline ──

#[test]
fn empty_template_produces_empty_output() {
    common::init_tracing();
    assert!(tokenize("").is_empty());
    assert_eq!(render("", &Bindings::new()).ok().as_deref(), Some(""));
}

#[test]
fn plain_text_template_no_constructs() {
    assert_eq!(render("Hello, world!", &Bindings::new()).ok().as_deref(), Some("Hello, world!"));
}

#[test]
fn html_passes_through() {
    let template = "<html lang=\"en\"><body class='x'>50% off</body></html>";
    assert_eq!(render(template, &Bindings::new()).ok().as_deref(), Some(template));
}

#[test]
fn bare_dollar_is_literal_text() {
    assert_eq!(render("costs $5 or $", &Bindings::new()).ok().as_deref(), Some("costs $5 or $"));
}

#[test]
fn trailing_dot_after_reference_is_text() {
    let rendered = render("Bye, $name.", &with("name", "Ada"));
    assert_eq!(rendered.ok().as_deref(), Some("Bye, Ada."));
}

#[test]
fn dotted_reference_reads_nested_maps() {
    let bindings = gst::bindings(&serde_json::json!({"user": {"profile": {"name": "Ada"}}})).expect("bindings");
    assert_eq!(render("$user.profile.name", &bindings).ok().as_deref(), Some("Ada"));
}

#[test]
fn special_characters_in_text_are_preserved() {
    let template = "quote ' backslash \\ tab\t newline\n\r\n done";
    assert_eq!(render(template, &Bindings::new()).ok().as_deref(), Some(template));
}

#[test]
fn special_characters_in_values_are_preserved() {
    let rendered = render("${ content }", &with("content", "Hello <world> & \"friends\""));
    assert_eq!(rendered.ok().as_deref(), Some("Hello <world> & \"friends\""));
}

#[test]
fn unicode_content() {
    let rendered = render("こんにちは $who 🌍", &with("who", "世界"));
    assert_eq!(rendered.ok().as_deref(), Some("こんにちは 世界 🌍"));
}

#[test]
fn braces_and_quotes_inside_dollar_scriptlet() {
    let rendered = render("${ \"}${ '{' }\" }", &Bindings::new());
    assert_eq!(rendered.ok().as_deref(), Some("}{"));
}

#[test]
fn percent_close_inside_expression_text() {
    // `%>` always ends a scriptlet, even inside a quoted literal.
    let tokens = tokenize("<%= '%>' %>");
    assert_eq!(tokens[2].kind, TokenType::ScriptletClose);
    assert_eq!(tokens[2].start, 6);
}

#[test]
fn multiline_expression_scriptlet() {
    let rendered = render("<%= [1,\n 2,\n 3].join('-') %>", &Bindings::new());
    assert_eq!(rendered.ok().as_deref(), Some("1-2-3"));
}

#[test]
fn null_value_renders_empty() {
    assert_eq!(render("[$x]", &with("x", Value::Null)).ok().as_deref(), Some("[]"));
}

#[test]
fn validate_reports_without_building_a_tree() {
    assert!(validate("ok $x <%= y %>", Grammar::STANDARD).is_empty());
    let diagnostics = validate("<%@ a %><% b", Grammar::STANDARD);
    assert_eq!(diagnostics.len(), 2);
    assert_eq!(diagnostics[0].message, parser::IMPORT_BLOCK_ILLEGAL);
    assert_eq!(diagnostics[1].span, Some(8..12));
    assert!(validate("<%@ a %>", Grammar::EXTENDED).is_empty());
}

#[test]
fn pretty_printed_tree() {
    let input = "a${b}";
    let root = parser::parse(input, Grammar::STANDARD).into_inner();
    let expected = "TEMPLATE\n  TEXT [0, 1) \"a\"\n  DOLLAR_SCRIPTLET\n    DOLLAR_SCRIPTLET_OPEN [1, 3) \"${\"\n    DOLLAR_SCRIPTLET_BODY [3, 4) \"b\"\n    DOLLAR_SCRIPTLET_CLOSE [4, 5) \"}\"\n";
    assert_eq!(pretty(&root, input), expected);
}

#[test]
fn oversized_repeat_is_an_execution_error() {
    let rendered = render("${ 'ab' * 9223372036854775807 }", &Bindings::new());
    assert_eq!(
        rendered,
        Err(Error::Execution(ExecutionError::Fault("string too large".into())))
    );
}

#[test]
fn deeply_nested_expression_is_a_compile_error() {
    let template = format!("${{ {}1{} }}", "(".repeat(200_000), ")".repeat(200_000));
    match render(&template, &Bindings::new()) {
        Err(Error::Compile(CompileError::Syntax { message, .. })) => {
            assert_eq!(message, "expression nested too deeply");
        }
        other => panic!("expected a nesting error, got {:?}", other),
    }
}
