use ahash::AHashMap;
use indexmap::IndexSet;

use crate::{
    errors::{Error, ErrorKind, EvalResult},
    expressions::{Body, Expr, ExprLoc, Stmt, TemplatePart, Trailer},
};

/// Computes the free identifier references of an expression.
///
/// Free means: not bound by an enclosing for-comprehension, not a function
/// name, and not one of the literal keywords (those never reach the AST as
/// names). The result keeps first-reference order.
pub fn free_variables(expr: &ExprLoc) -> IndexSet<String> {
    let mut out = IndexSet::new();
    let mut bound = Vec::new();
    collect_expr(expr, &mut bound, &mut out);
    out
}

/// Computes the free identifier references of a statement.
///
/// For attributes this is the value expression's free set; for blocks it is
/// the union over every statement of the block body, recursively.
pub fn stmt_free_variables(stmt: &Stmt) -> IndexSet<String> {
    let mut out = IndexSet::new();
    let mut bound = Vec::new();
    collect_stmt(stmt, &mut bound, &mut out);
    out
}

fn collect_stmt(stmt: &Stmt, bound: &mut Vec<String>, out: &mut IndexSet<String>) {
    match stmt {
        Stmt::Attribute(attribute) => collect_expr(&attribute.value, bound, out),
        Stmt::Block(block) => {
            for stmt in &block.body.statements {
                collect_stmt(stmt, bound, out);
            }
        }
    }
}

fn collect_expr(expr: &ExprLoc, bound: &mut Vec<String>, out: &mut IndexSet<String>) {
    match &expr.expr {
        Expr::Literal(_) => {}
        Expr::Name(name) => {
            if !bound.iter().any(|b| b == name) {
                out.insert(name.clone());
            }
        }
        Expr::Template(parts) => {
            for part in parts {
                if let TemplatePart::Interpolation(inner) = part {
                    collect_expr(inner, bound, out);
                }
            }
        }
        Expr::GetAttr { object, .. } => collect_expr(object, bound, out),
        Expr::GetIndex { object, index } => {
            collect_expr(object, bound, out);
            collect_expr(index, bound, out);
        }
        Expr::AttrSplat { object, trailers } | Expr::FullSplat { object, trailers } => {
            collect_expr(object, bound, out);
            for trailer in trailers {
                if let Trailer::Index { index, .. } = trailer {
                    collect_expr(index, bound, out);
                }
            }
        }
        Expr::Array(items) => {
            for item in items {
                collect_expr(item, bound, out);
            }
        }
        Expr::Object(items) => {
            for (key, value) in items {
                collect_expr(key, bound, out);
                collect_expr(value, bound, out);
            }
        }
        // The function name is not a variable reference; only the arguments
        // can contain free names.
        Expr::FuncCall { args, .. } => {
            for arg in args {
                collect_expr(arg, bound, out);
            }
        }
        Expr::UnaryOp { operand, .. } => collect_expr(operand, bound, out),
        Expr::BinaryOp { left, right, .. } => {
            collect_expr(left, bound, out);
            collect_expr(right, bound, out);
        }
        Expr::Conditional {
            condition,
            then_expr,
            else_expr,
        } => {
            collect_expr(condition, bound, out);
            collect_expr(then_expr, bound, out);
            collect_expr(else_expr, bound, out);
        }
        Expr::Parenthesis(inner) => collect_expr(inner, bound, out),
        Expr::ForTuple {
            intro,
            value,
            condition,
        } => {
            // The collection is evaluated in the enclosing scope; only the
            // loop body sees the bindings.
            collect_expr(&intro.collection, bound, out);
            let pushed = push_bindings(bound, intro.key_var.as_deref(), &intro.value_var);
            collect_expr(value, bound, out);
            if let Some(condition) = condition {
                collect_expr(condition, bound, out);
            }
            bound.truncate(bound.len() - pushed);
        }
        Expr::ForObject {
            intro,
            key,
            value,
            condition,
            ..
        } => {
            collect_expr(&intro.collection, bound, out);
            let pushed = push_bindings(bound, intro.key_var.as_deref(), &intro.value_var);
            collect_expr(key, bound, out);
            collect_expr(value, bound, out);
            if let Some(condition) = condition {
                collect_expr(condition, bound, out);
            }
            bound.truncate(bound.len() - pushed);
        }
    }
}

fn push_bindings(bound: &mut Vec<String>, key_var: Option<&str>, value_var: &str) -> usize {
    let mut pushed = 1;
    if let Some(key_var) = key_var {
        bound.push(key_var.to_owned());
        pushed += 1;
    }
    bound.push(value_var.to_owned());
    pushed
}

/// Orders the statements of a body into topological generations.
///
/// Generation 0 holds every statement whose references all resolve outside
/// the body (through the caller's scope); generation n holds statements whose
/// in-body dependencies all live in earlier generations. Statements keep
/// source order inside a generation. A reference cycle is an error naming the
/// statements involved.
pub fn topological_generations(body: &Body) -> EvalResult<Vec<Vec<Stmt>>> {
    let statements = &body.statements;
    let mut defined: AHashMap<&str, Vec<usize>> = AHashMap::new();
    for (index, stmt) in statements.iter().enumerate() {
        defined.entry(stmt.defined_name()).or_default().push(index);
    }

    // deps[i] holds the statement indices i references; names no statement
    // defines resolve through the scope at evaluation time and add no edge.
    let deps: Vec<Vec<usize>> = statements
        .iter()
        .map(|stmt| {
            let free = stmt_free_variables(stmt);
            let mut edges: Vec<usize> = free
                .iter()
                .filter_map(|name| defined.get(name.as_str()))
                .flatten()
                .copied()
                .collect();
            edges.sort_unstable();
            edges.dedup();
            edges
        })
        .collect();

    let mut resolved = vec![false; statements.len()];
    let mut placed = 0;
    let mut generations = Vec::new();
    while placed < statements.len() {
        let ready: Vec<usize> = (0..statements.len())
            .filter(|&index| !resolved[index])
            .filter(|&index| deps[index].iter().all(|&dep| resolved[dep]))
            .collect();
        if ready.is_empty() {
            let stuck: Vec<String> = (0..statements.len())
                .filter(|&index| !resolved[index])
                .map(|index| statements[index].describe())
                .collect();
            let span = statements
                .iter()
                .enumerate()
                .find(|(index, _)| !resolved[*index])
                .map(|(_, stmt)| stmt.position());
            let mut err = Error::new(ErrorKind::Cycle { statements: stuck });
            if let Some(span) = span {
                err = err.at(span);
            }
            return Err(err);
        }
        for &index in &ready {
            resolved[index] = true;
        }
        placed += ready.len();
        generations.push(ready.into_iter().map(|index| statements[index].clone()).collect());
    }
    Ok(generations)
}
