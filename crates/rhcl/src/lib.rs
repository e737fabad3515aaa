#![doc = include_str!("../../../README.md")]
#![expect(clippy::cast_possible_truncation, reason = "byte offsets fit in u32 spans")]

mod depends;
mod errors;
mod eval;
mod expressions;
mod lex;
mod parse;
mod scope;
mod template;
mod value;

pub use crate::{
    depends::{free_variables, stmt_free_variables, topological_generations},
    errors::{Error, ErrorKind, EvalResult},
    eval::{Evaluator, KeyPath, TraceSegment, evaluate_body, evaluate_expr},
    expressions::{
        Attribute, BinaryOperator, Block, Body, Expr, ExprLoc, ForIntro, Literal, Stmt,
        TemplatePart, Trailer, UnaryOperator,
    },
    lex::Span,
    parse::{parse_body, parse_expr},
    scope::{Func, FuncArgs, Scope},
    value::Value,
};
