//! Parse failure tests: every syntax error is a `ParseError` with a span.

use rhcl::{ErrorKind, parse_body, parse_expr};

fn parse_error(src: &str) -> rhcl::Error {
    let err = parse_body(src).unwrap_err();
    assert!(
        matches!(err.kind, ErrorKind::Parse { .. }),
        "expected a parse error, got {err:?}"
    );
    err
}

#[test]
fn spans_stay_within_the_source() {
    for src in [
        "a = ",
        "a = 1 b = 2",
        "a = (1",
        "a = [1, 2",
        "a = {x = 1",
        "block \"label\"",
        "a = 1 +",
        "= 1",
    ] {
        let err = parse_error(src);
        let span = err.span.expect("parse errors should carry a span");
        assert!(span.start <= span.end, "bad span {span} for {src:?}");
        assert!(
            span.end as usize <= src.len(),
            "span {span} exceeds source for {src:?}"
        );
    }
}

#[test]
fn unterminated_tokens_are_reported() {
    assert!(parse_error("a = \"abc").to_string().contains("unterminated string"));
    assert!(parse_error("a = 1 /* hmm").to_string().contains("unterminated block comment"));
    assert!(parse_error("a = <<EOT\nbody").to_string().contains("unterminated heredoc"));
}

#[test]
fn invalid_escape_sequences_are_reported() {
    let err = parse_error(r#"a = "bad \q escape""#);
    assert!(err.to_string().contains("invalid escape"));
}

#[test]
fn unterminated_interpolation_is_reported() {
    let err = parse_expr("\"${a\"").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Parse { .. }));
}

#[test]
fn block_labels_reject_interpolation() {
    let err = parse_error("block \"${x}\" { }");
    assert!(err.to_string().contains("block labels"));
}

#[test]
fn for_comprehensions_need_their_keywords() {
    let err = parse_expr("[for x y: x]").unwrap_err();
    assert!(err.to_string().contains("'in'"));
    let err = parse_expr("{for k, v in c: k}").unwrap_err();
    assert!(err.to_string().contains("'=>'"));
}

#[test]
fn statements_start_with_an_identifier() {
    let err = parse_error("\"not-an-ident\" = 1");
    assert!(err.to_string().contains("attribute or block"));
}

#[test]
fn error_messages_describe_the_found_token() {
    let err = parse_error("a = ]");
    assert!(err.to_string().contains("']'"), "got: {err}");
}

#[test]
fn expression_entry_point_requires_full_consumption() {
    let err = parse_expr("1 + 2 extra").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Parse { .. }));
    assert!(err.to_string().contains("end of input"));
}

#[test]
fn missing_conditional_else_is_reported() {
    let err = parse_expr("a ? b").unwrap_err();
    assert!(err.to_string().contains("':'"));
}
