use std::fmt;

use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use crate::lex::Span;

/// Result type alias for operations that can produce an evaluation error.
pub type EvalResult<T> = Result<T, Error>;

/// The failure taxonomy of the interpreter.
///
/// Each variant corresponds to one distinct failure class; the variant name
/// (via strum's `IntoStaticStr`) doubles as the error-kind label used in
/// `Display` output, e.g. `Type` renders as `TypeError`.
#[derive(Debug, Clone, PartialEq, Eq, IntoStaticStr, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Ill-formed source text.
    Parse { message: String },
    /// Operator, function, or index applied to an operand of the wrong kind.
    Type { message: String },
    /// Identifier not bound in scope.
    Name { name: String },
    /// Missing object key or out-of-range array index.
    Key { message: String },
    /// Function called with the wrong number of arguments.
    Arity { function: String, message: String },
    /// Body attribute or object literal key collision.
    DuplicateKey { key: String },
    /// The dependency analyzer detected a reference cycle.
    ///
    /// `statements` names the involved statements in source order.
    Cycle { statements: Vec<String> },
    /// Raised by a user-supplied function.
    User { message: String },
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label: &'static str = self.into();
        write!(f, "{label}Error: ")?;
        match self {
            Self::Parse { message } | Self::Type { message } | Self::User { message } => {
                write!(f, "{message}")
            }
            Self::Name { name } => write!(f, "name {name:?} is not defined"),
            Self::Key { message } => write!(f, "{message}"),
            Self::Arity { function, message } => write!(f, "{function}(): {message}"),
            Self::DuplicateKey { key } => write!(f, "duplicate key {key:?}"),
            Self::Cycle { statements } => {
                write!(f, "dependency cycle involving {}", statements.join(", "))
            }
        }
    }
}

/// An error produced by parsing, evaluation, or dependency analysis.
///
/// Carries the failure kind, the source span of the AST node at which the
/// failure arose (when known), and an optional cause chain. Errors abort the
/// enclosing operation and propagate unchanged to the caller; nothing inside
/// the core recovers from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Error {
    pub kind: ErrorKind,
    pub span: Option<Span>,
    pub cause: Option<Box<Error>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            span: None,
            cause: None,
        }
    }

    pub fn with_span(kind: ErrorKind, span: Span) -> Self {
        Self {
            kind,
            span: Some(span),
            cause: None,
        }
    }

    /// Attaches `cause` as the underlying error of this one.
    #[must_use]
    pub fn caused_by(mut self, cause: Self) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Fills in the span if the error does not carry one yet.
    ///
    /// Inner operations raise spanless errors; the evaluator pins them to the
    /// node it is currently reducing on the way out.
    #[must_use]
    pub(crate) fn at(mut self, span: Span) -> Self {
        if self.span.is_none() {
            self.span = Some(span);
        }
        self
    }

    pub fn parse(message: impl Into<String>, span: Span) -> Self {
        Self::with_span(
            ErrorKind::Parse {
                message: message.into(),
            },
            span,
        )
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type {
            message: message.into(),
        })
    }

    pub fn name_error(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::Name { name: name.into() })
    }

    pub fn key_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Key {
            message: message.into(),
        })
    }

    pub fn arity_error(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Arity {
            function: function.into(),
            message: message.into(),
        })
    }

    pub fn duplicate_key(key: impl Into<String>) -> Self {
        Self::new(ErrorKind::DuplicateKey { key: key.into() })
    }

    pub fn user(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::User {
            message: message.into(),
        })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)?;
        if let Some(span) = self.span {
            write!(f, " at {span}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}
