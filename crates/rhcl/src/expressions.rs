use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::lex::Span;

/// A literal value embedded in the AST.
///
/// Literals are detached from the runtime `Value` type so the parser stays
/// free of evaluation concerns; `Value::from` is the single crossing point
/// from parse-time data into runtime semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Bool(bool),
    /// Integer literal. Arbitrary precision; never silently truncated.
    Int(BigInt),
    Float(f64),
    Str(String),
}

/// Binary operators, with their source symbol as the `Display` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum BinaryOperator {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "%")]
    Mod,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    NotEq,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    LtE,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    GtE,
    #[strum(serialize = "&&")]
    And,
    #[strum(serialize = "||")]
    Or,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum UnaryOperator {
    #[strum(serialize = "!")]
    Not,
    #[strum(serialize = "-")]
    Neg,
}

/// One segment of a template string.
///
/// A quoted string containing `${...}` interpolations becomes an alternating
/// sequence of literal text and embedded expressions. Evaluation concatenates
/// the parts, coercing each interpolation result to a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TemplatePart {
    Literal(String),
    Interpolation(ExprLoc),
}

/// A trailing access chained onto a splat.
///
/// Attribute splats (`.*`) carry only `Attr` trailers; full splats (`[*]`)
/// may also carry `Index` trailers. The parser enforces this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Trailer {
    Attr { name: String, position: Span },
    Index { index: ExprLoc, position: Span },
}

/// The `for k, v in collection` header shared by both comprehension forms.
///
/// `key_var` is absent for the single-variable form `for v in collection`.
/// The collection expression is evaluated in the enclosing scope; the bound
/// variables only exist inside the comprehension's value/key/condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForIntro {
    pub key_var: Option<String>,
    pub value_var: String,
    pub collection: Box<ExprLoc>,
}

/// An expression in the AST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Literal),
    /// A free variable reference.
    Name(String),
    /// A string with at least one `${...}` interpolation.
    Template(Vec<TemplatePart>),
    /// Attribute projection: `object.name`.
    GetAttr {
        object: Box<ExprLoc>,
        name: String,
    },
    /// Index projection: `object[index]`.
    GetIndex {
        object: Box<ExprLoc>,
        index: Box<ExprLoc>,
    },
    /// Attribute splat: `object.*` followed by attribute accesses.
    ///
    /// Evaluates the object, lifts it to an array (null becomes `[]`, a
    /// non-array becomes a one-element array), then applies the trailers to
    /// every element.
    AttrSplat {
        object: Box<ExprLoc>,
        trailers: Vec<Trailer>,
    },
    /// Full splat: `object[*]` followed by attribute or index accesses.
    FullSplat {
        object: Box<ExprLoc>,
        trailers: Vec<Trailer>,
    },
    Array(Vec<ExprLoc>),
    /// Object constructor, preserving source order.
    ///
    /// Keys are expressions; a bare identifier key is lowered to its string
    /// literal form at parse time, everything else is evaluated at runtime.
    Object(Vec<(ExprLoc, ExprLoc)>),
    /// Function call: `name(args)`, optionally with a trailing `...` that
    /// splices the final array argument into positional arguments.
    FuncCall {
        name: String,
        args: Vec<ExprLoc>,
        expand_final: bool,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: Box<ExprLoc>,
    },
    BinaryOp {
        left: Box<ExprLoc>,
        op: BinaryOperator,
        right: Box<ExprLoc>,
    },
    /// Conditional expression: `condition ? then : else`.
    ///
    /// Only the selected branch is evaluated; errors in the other branch are
    /// never observed.
    Conditional {
        condition: Box<ExprLoc>,
        then_expr: Box<ExprLoc>,
        else_expr: Box<ExprLoc>,
    },
    /// A parenthesized expression. Semantically transparent, but preserved so
    /// analyzers and renderers can distinguish `(a)` from `a`.
    Parenthesis(Box<ExprLoc>),
    /// Tuple comprehension: `[for k, v in coll: value if cond]`, producing an
    /// array in iteration order.
    ForTuple {
        intro: ForIntro,
        value: Box<ExprLoc>,
        condition: Option<Box<ExprLoc>>,
    },
    /// Object comprehension: `{for k, v in coll: key => value ... if cond}`.
    ///
    /// `grouping` marks the `...` form, which collects values for repeated
    /// keys into arrays instead of failing on duplicates.
    ForObject {
        intro: ForIntro,
        key: Box<ExprLoc>,
        value: Box<ExprLoc>,
        grouping: bool,
        condition: Option<Box<ExprLoc>>,
    },
}

/// An expression with its source location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExprLoc {
    pub position: Span,
    pub expr: Expr,
}

impl ExprLoc {
    pub fn new(position: Span, expr: Expr) -> Self {
        Self { position, expr }
    }
}

/// An attribute statement: `key = value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub position: Span,
    /// Attribute name; never empty.
    pub key: String,
    pub value: ExprLoc,
}

/// A block statement: `ident "label1" label2 { body }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub position: Span,
    /// Block type; never empty.
    pub ident: String,
    pub labels: Vec<String>,
    pub body: Body,
}

/// A statement inside a body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Attribute(Attribute),
    Block(Block),
}

impl Stmt {
    pub fn position(&self) -> Span {
        match self {
            Self::Attribute(attribute) => attribute.position,
            Self::Block(block) => block.position,
        }
    }

    /// The top-level name this statement defines in the evaluated object.
    ///
    /// For attributes this is the key; for blocks it is the block type (the
    /// first segment of the block's key path). The dependency analyzer links
    /// references against these names.
    pub fn defined_name(&self) -> &str {
        match self {
            Self::Attribute(attribute) => &attribute.key,
            Self::Block(block) => &block.ident,
        }
    }

    /// A short human-readable label, used in cycle reports.
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Attribute(attribute) => attribute.key.clone(),
            Self::Block(block) => {
                let mut label = block.ident.clone();
                for part in &block.labels {
                    label.push('.');
                    label.push_str(part);
                }
                label
            }
        }
    }
}

/// A sequence of attribute and block statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub position: Span,
    pub statements: Vec<Stmt>,
}

impl Body {
    pub fn new(position: Span, statements: Vec<Stmt>) -> Self {
        Self {
            position,
            statements,
        }
    }
}
