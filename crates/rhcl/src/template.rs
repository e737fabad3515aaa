use crate::{
    errors::{Error, EvalResult},
    expressions::{Expr, Literal, TemplatePart},
    lex::Span,
    parse,
};

/// Expands the raw contents of a quoted string literal.
///
/// Returns a plain string literal when no interpolation is present, otherwise
/// a template of alternating literal and expression parts. `base` is the byte
/// offset of `raw` in the original source, so the spans of interpolated
/// sub-expressions keep pointing into it.
pub(crate) fn expand_string(raw: &str, base: u32) -> EvalResult<Expr> {
    let mut parts: Vec<TemplatePart> = Vec::new();
    let mut literal = String::new();
    let mut pos = 0;
    while pos < raw.len() {
        let rest = &raw[pos..];
        if rest.starts_with("$${") {
            literal.push_str("${");
            pos += 3;
        } else if rest.starts_with("${") {
            let inner_start = pos + 2;
            let Some(close) = find_interpolation_end(raw, inner_start) else {
                let span = Span::new(base + pos as u32, base + raw.len() as u32);
                return Err(Error::parse("unterminated interpolation", span));
            };
            if !literal.is_empty() {
                parts.push(TemplatePart::Literal(std::mem::take(&mut literal)));
            }
            let inner = parse::parse_expr_at(&raw[inner_start..close], base + inner_start as u32)?;
            parts.push(TemplatePart::Interpolation(inner));
            pos = close + 1;
        } else if let Some(escaped) = rest.strip_prefix('\\') {
            let Some(c) = escaped.chars().next() else {
                let span = Span::new(base + pos as u32, base + raw.len() as u32);
                return Err(Error::parse("unterminated escape sequence", span));
            };
            let resolved = match c {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                '"' => '"',
                '\\' => '\\',
                '$' => '$',
                other => {
                    let span = Span::new(base + pos as u32, base + (pos + 1 + other.len_utf8()) as u32);
                    return Err(Error::parse(format!("invalid escape sequence '\\{other}'"), span));
                }
            };
            literal.push(resolved);
            pos += 1 + c.len_utf8();
        } else {
            let Some(c) = rest.chars().next() else { break };
            literal.push(c);
            pos += c.len_utf8();
        }
    }
    if parts.is_empty() {
        return Ok(Expr::Literal(Literal::Str(literal)));
    }
    if !literal.is_empty() {
        parts.push(TemplatePart::Literal(literal));
    }
    Ok(Expr::Template(parts))
}

/// Finds the byte offset of the `}` closing an interpolation opened before
/// `from`, skipping nested braces, nested strings, and interpolations inside
/// those strings.
fn find_interpolation_end(raw: &str, from: usize) -> Option<usize> {
    let mut stack: Vec<char> = vec!['{'];
    let mut pos = from;
    while pos < raw.len() {
        let rest = &raw[pos..];
        let c = rest.chars().next()?;
        if stack.last() == Some(&'"') {
            if c == '\\' {
                let escaped = rest.chars().nth(1)?;
                pos += 1 + escaped.len_utf8();
                continue;
            }
            if rest.starts_with("${") {
                stack.push('{');
                pos += 2;
                continue;
            }
            if c == '"' {
                stack.pop();
            }
        } else {
            match c {
                '"' => stack.push('"'),
                '{' => stack.push('{'),
                '}' => {
                    stack.pop();
                    if stack.is_empty() {
                        return Some(pos);
                    }
                }
                _ => {}
            }
        }
        pos += c.len_utf8();
    }
    None
}

/// Strips the shortest common leading whitespace of the non-blank body lines,
/// for the `<<-` heredoc form.
///
/// Blank lines do not constrain the minimum and are emptied entirely when
/// they consist only of whitespace.
pub(crate) fn trim_heredoc_indent(body: &str) -> String {
    let had_trailing = body.ends_with('\n');
    let trimmed_len = if had_trailing { body.len() - 1 } else { body.len() };
    let lines: Vec<&str> = body[..trimmed_len].split('\n').collect();
    let min_indent = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);
    let mut out = String::with_capacity(body.len());
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        if !line.trim().is_empty() {
            out.push_str(&line[min_indent..]);
        }
    }
    if had_trailing && !out.is_empty() {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expressions::Expr;

    #[test]
    fn plain_string_stays_a_literal() {
        let expr = expand_string("hello", 0).unwrap();
        assert_eq!(expr, Expr::Literal(Literal::Str("hello".to_owned())));
    }

    #[test]
    fn escapes_resolve_in_literals() {
        let expr = expand_string(r#"a\n\t\"\\\$b"#, 0).unwrap();
        assert_eq!(expr, Expr::Literal(Literal::Str("a\n\t\"\\$b".to_owned())));
    }

    #[test]
    fn invalid_escape_is_rejected() {
        let err = expand_string(r"a\qb", 0).unwrap_err();
        assert!(err.to_string().contains("invalid escape"));
    }

    #[test]
    fn interpolation_splits_into_parts() {
        let expr = expand_string("a ${x} b", 0).unwrap();
        let Expr::Template(parts) = expr else {
            panic!("expected a template");
        };
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], TemplatePart::Literal("a ".to_owned()));
        assert!(matches!(
            &parts[1],
            TemplatePart::Interpolation(inner) if inner.expr == Expr::Name("x".to_owned())
        ));
        assert_eq!(parts[2], TemplatePart::Literal(" b".to_owned()));
    }

    #[test]
    fn escaped_interpolation_stays_literal() {
        let expr = expand_string("a $${x} b", 0).unwrap();
        assert_eq!(expr, Expr::Literal(Literal::Str("a ${x} b".to_owned())));
    }

    #[test]
    fn nested_interpolation_inside_inner_string() {
        let expr = expand_string(r#"${upper("${x}")}"#, 0).unwrap();
        let Expr::Template(parts) = expr else {
            panic!("expected a template");
        };
        assert_eq!(parts.len(), 1);
        assert!(matches!(
            &parts[0],
            TemplatePart::Interpolation(inner)
                if matches!(&inner.expr, Expr::FuncCall { name, .. } if name == "upper")
        ));
    }

    #[test]
    fn interpolation_spans_index_the_original_source() {
        // Raw content as it would sit at offset 5 in some larger source.
        let expr = expand_string("ab${cd}", 5).unwrap();
        let Expr::Template(parts) = expr else {
            panic!("expected a template");
        };
        let TemplatePart::Interpolation(inner) = &parts[1] else {
            panic!("expected an interpolation");
        };
        assert_eq!(inner.position, Span::new(9, 11));
    }

    #[test]
    fn heredoc_trimming_uses_shortest_nonblank_indent() {
        assert_eq!(trim_heredoc_indent("  a\n    b\n"), "a\n  b\n");
        assert_eq!(trim_heredoc_indent("\ta\n\t\tb\n"), "a\n\tb\n");
    }

    #[test]
    fn blank_lines_do_not_constrain_the_minimum() {
        assert_eq!(trim_heredoc_indent("  a\n\n    b\n"), "a\n\n  b\n");
        assert_eq!(trim_heredoc_indent("    a\n \n    b\n"), "a\n\nb\n");
    }

    #[test]
    fn whitespace_only_lines_are_emptied_but_kept() {
        assert_eq!(trim_heredoc_indent("   \n  \n"), "\n\n");
    }
}
