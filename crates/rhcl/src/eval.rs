use std::fmt;

use indexmap::{IndexMap, map::Entry};
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{
    errors::{Error, EvalResult},
    expressions::{BinaryOperator, Block, Body, Expr, ExprLoc, ForIntro, Literal, Stmt, TemplatePart, Trailer},
    lex::Span,
    scope::Scope,
    value::{self, Value},
};

/// One segment of a traced key path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TraceSegment {
    Key(String),
    Index(usize),
}

/// A key path read from the outermost scope during evaluation, e.g. `a.b[0].c`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyPath(pub SmallVec<[TraceSegment; 4]>);

impl KeyPath {
    fn starts_with(&self, prefix: &Self) -> bool {
        prefix.0.len() <= self.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                TraceSegment::Key(key) => {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{key}")?;
                }
                TraceSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

/// A tree-walking evaluator.
///
/// Evaluation is a pure function of the expression and scope; the evaluator
/// itself only accumulates the variable trace, a side buffer of the key paths
/// that were read from the outermost scope. Because of that buffer a single
/// instance must not be shared across threads for the duration of one call;
/// independent evaluators can run in parallel freely.
#[derive(Debug, Default)]
pub struct Evaluator {
    trace: Vec<KeyPath>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reduces a single expression to a value under `scope`.
    pub fn evaluate_expr(&mut self, expr: &ExprLoc, scope: &Scope) -> EvalResult<Value> {
        self.eval(expr, scope)
    }

    /// Evaluates a body to an object value.
    ///
    /// Attributes become keys; blocks nest under their type and labels, and
    /// repeated full block paths accumulate into arrays at the leaf.
    pub fn evaluate_body(&mut self, body: &Body, scope: &Scope) -> EvalResult<Value> {
        let slots = self.eval_body_slots(body, scope)?;
        Ok(Value::Object(finish_slots(slots)))
    }

    /// The key paths read from the outermost scope so far.
    pub fn trace(&self) -> &[KeyPath] {
        &self.trace
    }

    /// Takes the accumulated variable trace, leaving the buffer empty.
    pub fn take_trace(&mut self) -> Vec<KeyPath> {
        std::mem::take(&mut self.trace)
    }

    fn eval(&mut self, expr: &ExprLoc, scope: &Scope) -> EvalResult<Value> {
        let span = expr.position;
        match &expr.expr {
            Expr::Literal(literal) => Ok(Value::from(literal)),
            Expr::Name(name) => {
                let value = scope
                    .var(name)
                    .cloned()
                    .ok_or_else(|| Error::name_error(name).at(span))?;
                if let Some(path) = key_path_of(expr, scope) {
                    self.record_read(path);
                }
                Ok(value)
            }
            Expr::Template(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Literal(text) => out.push_str(text),
                        TemplatePart::Interpolation(inner) => {
                            let value = self.eval(inner, scope)?;
                            let text = value
                                .coerce_to_string()
                                .map_err(|e| e.at(inner.position))?;
                            out.push_str(&text);
                        }
                    }
                }
                Ok(Value::String(out))
            }
            Expr::GetAttr { object, name } => {
                let value = self.eval(object, scope)?;
                let result = value.get_attr(name).map_err(|e| e.at(span))?;
                if let Some(path) = key_path_of(expr, scope) {
                    self.record_read(path);
                }
                Ok(result)
            }
            Expr::GetIndex { object, index } => {
                let value = self.eval(object, scope)?;
                let key = self.eval(index, scope)?;
                let result = value.get_index(&key).map_err(|e| e.at(span))?;
                if let Some(path) = key_path_of(expr, scope) {
                    self.record_read(path);
                }
                Ok(result)
            }
            Expr::AttrSplat { object, trailers } | Expr::FullSplat { object, trailers } => {
                let value = self.eval(object, scope)?;
                let items = match value {
                    Value::Null => Vec::new(),
                    Value::Array(items) => items,
                    other => vec![other],
                };
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.apply_trailers(item, trailers, scope)?);
                }
                Ok(Value::Array(out))
            }
            Expr::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item, scope)?);
                }
                Ok(Value::Array(out))
            }
            Expr::Object(items) => {
                let mut map = IndexMap::with_capacity(items.len());
                for (key_expr, value_expr) in items {
                    let key = match self.eval(key_expr, scope)? {
                        Value::String(s) => s,
                        other => {
                            return Err(Error::type_error(format!(
                                "object key must be a string, not {}",
                                other.kind()
                            ))
                            .at(key_expr.position));
                        }
                    };
                    if map.contains_key(&key) {
                        return Err(Error::duplicate_key(&key).at(key_expr.position));
                    }
                    let value = self.eval(value_expr, scope)?;
                    map.insert(key, value);
                }
                Ok(Value::Object(map))
            }
            Expr::FuncCall {
                name,
                args,
                expand_final,
            } => self.call(name, args, *expand_final, span, scope),
            Expr::UnaryOp { op, operand } => {
                let value = self.eval(operand, scope)?;
                value::unary_op(*op, &value).map_err(|e| e.at(span))
            }
            Expr::BinaryOp { left, op, right } => match op {
                BinaryOperator::And | BinaryOperator::Or => {
                    self.short_circuit(*op, left, right, scope)
                }
                _ => {
                    let lhs = self.eval(left, scope)?;
                    let rhs = self.eval(right, scope)?;
                    value::binary_op(*op, &lhs, &rhs).map_err(|e| e.at(span))
                }
            },
            Expr::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                // Only the selected branch is evaluated.
                if self.expect_bool(condition, scope, "condition")? {
                    self.eval(then_expr, scope)
                } else {
                    self.eval(else_expr, scope)
                }
            }
            Expr::Parenthesis(inner) => self.eval(inner, scope),
            Expr::ForTuple {
                intro,
                value,
                condition,
            } => self.for_tuple(intro, value, condition.as_deref(), scope),
            Expr::ForObject {
                intro,
                key,
                value,
                grouping,
                condition,
            } => self.for_object(intro, key, value, *grouping, condition.as_deref(), scope),
        }
    }

    fn expect_bool(&mut self, expr: &ExprLoc, scope: &Scope, what: &str) -> EvalResult<bool> {
        match self.eval(expr, scope)? {
            Value::Bool(b) => Ok(b),
            other => Err(Error::type_error(format!(
                "{what} must be a bool, not {}",
                other.kind()
            ))
            .at(expr.position)),
        }
    }

    fn short_circuit(
        &mut self,
        op: BinaryOperator,
        left: &ExprLoc,
        right: &ExprLoc,
        scope: &Scope,
    ) -> EvalResult<Value> {
        let what = if op == BinaryOperator::And {
            "operand of '&&'"
        } else {
            "operand of '||'"
        };
        let lhs = self.expect_bool(left, scope, what)?;
        // The skipped operand is never evaluated, so its errors are suppressed.
        match (op, lhs) {
            (BinaryOperator::And, false) => Ok(Value::Bool(false)),
            (BinaryOperator::Or, true) => Ok(Value::Bool(true)),
            _ => Ok(Value::Bool(self.expect_bool(right, scope, what)?)),
        }
    }

    fn apply_trailers(
        &mut self,
        mut value: Value,
        trailers: &[Trailer],
        scope: &Scope,
    ) -> EvalResult<Value> {
        for trailer in trailers {
            value = match trailer {
                Trailer::Attr { name, position } => {
                    value.get_attr(name).map_err(|e| e.at(*position))?
                }
                Trailer::Index { index, position } => {
                    let key = self.eval(index, scope)?;
                    value.get_index(&key).map_err(|e| e.at(*position))?
                }
            };
        }
        Ok(value)
    }

    fn call(
        &mut self,
        name: &str,
        args: &[ExprLoc],
        expand_final: bool,
        span: Span,
        scope: &Scope,
    ) -> EvalResult<Value> {
        let Some(func) = scope.func(name) else {
            return Err(Error::name_error(name).at(span));
        };
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg, scope)?);
        }
        if expand_final {
            // The parser only sets expand_final after a parsed argument.
            match values.pop() {
                Some(Value::Array(rest)) => values.extend(rest),
                Some(other) => {
                    return Err(Error::type_error(format!(
                        "'...' requires the final argument to be an array, not {}",
                        other.kind()
                    ))
                    .at(span));
                }
                None => {}
            }
        }
        func(values).map_err(|e| e.at(span))
    }

    fn for_tuple(
        &mut self,
        intro: &ForIntro,
        value: &ExprLoc,
        condition: Option<&ExprLoc>,
        scope: &Scope,
    ) -> EvalResult<Value> {
        let collection = self.eval(&intro.collection, scope)?;
        let pairs = iter_collection(collection, intro.collection.position)?;
        let mut out = Vec::new();
        for (k, v) in pairs {
            let child = self.bind_loop_vars(intro, k, v, scope);
            if let Some(cond) = condition {
                if !self.expect_bool(cond, &child, "'if' condition")? {
                    continue;
                }
            }
            out.push(self.eval(value, &child)?);
        }
        Ok(Value::Array(out))
    }

    fn for_object(
        &mut self,
        intro: &ForIntro,
        key: &ExprLoc,
        value: &ExprLoc,
        grouping: bool,
        condition: Option<&ExprLoc>,
        scope: &Scope,
    ) -> EvalResult<Value> {
        let collection = self.eval(&intro.collection, scope)?;
        let pairs = iter_collection(collection, intro.collection.position)?;
        let mut map: IndexMap<String, Value> = IndexMap::new();
        for (k, v) in pairs {
            let child = self.bind_loop_vars(intro, k, v, scope);
            if let Some(cond) = condition {
                if !self.expect_bool(cond, &child, "'if' condition")? {
                    continue;
                }
            }
            let key_value = match self.eval(key, &child)? {
                Value::String(s) => s,
                other => {
                    return Err(Error::type_error(format!(
                        "object comprehension key must be a string, not {}",
                        other.kind()
                    ))
                    .at(key.position));
                }
            };
            let item = self.eval(value, &child)?;
            if grouping {
                match map.entry(key_value) {
                    Entry::Occupied(mut entry) => {
                        if let Value::Array(items) = entry.get_mut() {
                            items.push(item);
                        }
                    }
                    Entry::Vacant(entry) => {
                        entry.insert(Value::Array(vec![item]));
                    }
                }
            } else if map.contains_key(&key_value) {
                return Err(Error::duplicate_key(&key_value).at(key.position));
            } else {
                map.insert(key_value, item);
            }
        }
        Ok(Value::Object(map))
    }

    /// Extends `scope` with the loop bindings for one iteration.
    fn bind_loop_vars<'a>(
        &self,
        intro: &ForIntro,
        k: Value,
        v: Value,
        scope: &'a Scope<'a>,
    ) -> Scope<'a> {
        let mut child = scope.child();
        if let Some(key_var) = &intro.key_var {
            child.declare_var(key_var.clone(), k);
        }
        child.declare_var(intro.value_var.clone(), v);
        child
    }

    fn eval_body_slots(&mut self, body: &Body, scope: &Scope) -> EvalResult<IndexMap<String, Slot>> {
        let mut slots: IndexMap<String, Slot> = IndexMap::new();
        for stmt in &body.statements {
            match stmt {
                Stmt::Attribute(attribute) => {
                    if slots.contains_key(&attribute.key) {
                        return Err(Error::duplicate_key(&attribute.key).at(attribute.position));
                    }
                    let value = self.eval(&attribute.value, scope)?;
                    slots.insert(attribute.key.clone(), Slot::Attr(value));
                }
                Stmt::Block(block) => {
                    let value = self.evaluate_body(&block.body, scope)?;
                    insert_block(&mut slots, block, value)?;
                }
            }
        }
        Ok(slots)
    }

    fn record_read(&mut self, path: KeyPath) {
        // Keep only the deepest read of a chain: `a.b.c` subsumes `a` and `a.b`.
        if self.trace.iter().any(|existing| existing.starts_with(&path)) {
            return;
        }
        self.trace.retain(|existing| !path.starts_with(existing));
        self.trace.push(path);
    }
}

/// Evaluates a single expression with a throwaway evaluator.
pub fn evaluate_expr(expr: &ExprLoc, scope: &Scope) -> EvalResult<Value> {
    Evaluator::new().evaluate_expr(expr, scope)
}

/// Evaluates a body to an object value with a throwaway evaluator.
pub fn evaluate_body(body: &Body, scope: &Scope) -> EvalResult<Value> {
    Evaluator::new().evaluate_body(body, scope)
}

/// Intermediate shape of a body object under construction.
///
/// Keeping attribute values, nested block maps, and leaf block bodies apart
/// until the whole body is processed lets repeated block paths accumulate
/// while attribute/block collisions stay detectable.
enum Slot {
    Attr(Value),
    Node(IndexMap<String, Slot>),
    Bodies(Vec<Value>),
}

fn insert_block(slots: &mut IndexMap<String, Slot>, block: &Block, value: Value) -> EvalResult<()> {
    let mut path: Vec<&str> = Vec::with_capacity(1 + block.labels.len());
    path.push(&block.ident);
    path.extend(block.labels.iter().map(String::as_str));
    let Some((leaf, interior)) = path.split_last() else {
        return Ok(());
    };
    let mut current = slots;
    for segment in interior {
        let entry = current
            .entry((*segment).to_owned())
            .or_insert_with(|| Slot::Node(IndexMap::new()));
        match entry {
            Slot::Node(children) => current = children,
            _ => return Err(Error::duplicate_key(*segment).at(block.position)),
        }
    }
    match current.entry((*leaf).to_owned()) {
        Entry::Occupied(mut entry) => match entry.get_mut() {
            Slot::Bodies(bodies) => bodies.push(value),
            _ => return Err(Error::duplicate_key(*leaf).at(block.position)),
        },
        Entry::Vacant(entry) => {
            entry.insert(Slot::Bodies(vec![value]));
        }
    }
    Ok(())
}

fn finish_slots(slots: IndexMap<String, Slot>) -> IndexMap<String, Value> {
    slots
        .into_iter()
        .map(|(key, slot)| {
            let value = match slot {
                Slot::Attr(value) => value,
                Slot::Node(children) => Value::Object(finish_slots(children)),
                Slot::Bodies(mut bodies) => {
                    // A single block stays an object; repeats become an array.
                    if bodies.len() == 1 {
                        bodies.remove(0)
                    } else {
                        Value::Array(bodies)
                    }
                }
            };
            (key, value)
        })
        .collect()
}

fn iter_collection(collection: Value, span: Span) -> EvalResult<Vec<(Value, Value)>> {
    match collection {
        Value::Array(items) => Ok(items
            .into_iter()
            .enumerate()
            .map(|(i, v)| (Value::Int(i.into()), v))
            .collect()),
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(k, v)| (Value::String(k), v))
            .collect()),
        other => Err(Error::type_error(format!(
            "cannot iterate over {} value",
            other.kind()
        ))
        .at(span)),
    }
}

/// The syntactic key path of a traversal chain rooted at a free name, if any.
///
/// Only pure `Name`/`.attr`/`[literal]` chains produce a path; anything
/// computed (function results, non-literal indexes) breaks the chain. Names
/// bound by an enclosing for-comprehension are not free and yield nothing.
fn key_path_of(expr: &ExprLoc, scope: &Scope) -> Option<KeyPath> {
    match &expr.expr {
        Expr::Name(name) => {
            if scope.is_locally_bound(name) {
                None
            } else {
                let mut path = SmallVec::new();
                path.push(TraceSegment::Key(name.clone()));
                Some(KeyPath(path))
            }
        }
        Expr::GetAttr { object, name } => {
            let mut path = key_path_of(object, scope)?;
            path.0.push(TraceSegment::Key(name.clone()));
            Some(path)
        }
        Expr::GetIndex { object, index } => {
            let mut path = key_path_of(object, scope)?;
            let segment = match &index.expr {
                Expr::Literal(Literal::Int(i)) => TraceSegment::Index(i.to_usize()?),
                Expr::Literal(Literal::Str(s)) => TraceSegment::Key(s.clone()),
                _ => return None,
            };
            path.0.push(segment);
            Some(path)
        }
        Expr::Parenthesis(inner) => key_path_of(inner, scope),
        _ => None,
    }
}
