use std::fmt;

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use crate::{
    errors::{Error, EvalResult},
    template,
};

/// A byte-offset range into the source text.
///
/// Every AST node carries one; children's spans nest within their parent's.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// The smallest span covering both `self` and `other`.
    #[must_use]
    pub fn to(self, other: Self) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// A lexical token.
///
/// String literals stay raw: escape sequences and `${...}` interpolations are
/// resolved later by the template expansion in the AST builder, so a single
/// token always covers the whole literal. Heredocs arrive fully assembled
/// (indent-trimmed for the `<<-` form) since they never interpolate.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Ident(String),
    Int(BigInt),
    Float(f64),
    Bool(bool),
    Null,
    Str(String),
    Heredoc(String),
    Newline,
    Assign,
    Arrow,
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    And,
    Or,
    Not,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Question,
    Colon,
    Dot,
    Ellipsis,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
}

impl Token {
    /// A short description for parse error messages.
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Ident(name) => format!("identifier {name:?}"),
            Self::Int(_) | Self::Float(_) => "number".to_owned(),
            Self::Bool(_) => "boolean".to_owned(),
            Self::Null => "'null'".to_owned(),
            Self::Str(_) => "string".to_owned(),
            Self::Heredoc(_) => "heredoc".to_owned(),
            Self::Newline => "newline".to_owned(),
            Self::Assign => "'='".to_owned(),
            Self::Arrow => "'=>'".to_owned(),
            Self::Eq => "'=='".to_owned(),
            Self::NotEq => "'!='".to_owned(),
            Self::Lt => "'<'".to_owned(),
            Self::LtE => "'<='".to_owned(),
            Self::Gt => "'>'".to_owned(),
            Self::GtE => "'>='".to_owned(),
            Self::And => "'&&'".to_owned(),
            Self::Or => "'||'".to_owned(),
            Self::Not => "'!'".to_owned(),
            Self::Plus => "'+'".to_owned(),
            Self::Minus => "'-'".to_owned(),
            Self::Star => "'*'".to_owned(),
            Self::Slash => "'/'".to_owned(),
            Self::Percent => "'%'".to_owned(),
            Self::Question => "'?'".to_owned(),
            Self::Colon => "':'".to_owned(),
            Self::Dot => "'.'".to_owned(),
            Self::Ellipsis => "'...'".to_owned(),
            Self::Comma => "','".to_owned(),
            Self::LParen => "'('".to_owned(),
            Self::RParen => "')'".to_owned(),
            Self::LBracket => "'['".to_owned(),
            Self::RBracket => "']'".to_owned(),
            Self::LBrace => "'{'".to_owned(),
            Self::RBrace => "'}'".to_owned(),
        }
    }
}

/// A token with its source location.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TokenLoc {
    pub span: Span,
    pub token: Token,
}

/// Tokenizes HCL2 source text.
///
/// `offset` is added to every span; template interpolation bodies re-enter the
/// lexer with the offset of the substring so spans keep indexing the original
/// source.
pub(crate) fn tokenize(src: &str, offset: u32) -> EvalResult<Vec<TokenLoc>> {
    Lexer::new(src, offset).run()
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    offset: u32,
    tokens: Vec<TokenLoc>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str, offset: u32) -> Self {
        Self {
            src,
            pos: 0,
            offset,
            tokens: Vec::new(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(self.offset + start as u32, self.offset + self.pos as u32)
    }

    fn push(&mut self, token: Token, start: usize) {
        let span = self.span_from(start);
        self.tokens.push(TokenLoc { span, token });
    }

    fn error_at(&self, message: impl Into<String>, start: usize) -> Error {
        Error::parse(message, self.span_from(start))
    }

    fn run(mut self) -> EvalResult<Vec<TokenLoc>> {
        while let Some(c) = self.peek() {
            let start = self.pos;
            match c {
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                '\n' => {
                    self.bump();
                    self.push(Token::Newline, start);
                }
                '#' => self.line_comment(),
                '/' if self.rest().starts_with("//") => self.line_comment(),
                '/' if self.rest().starts_with("/*") => self.block_comment(start)?,
                '"' => self.string(start)?,
                '<' if self.rest().starts_with("<<") => self.heredoc(start)?,
                c if c.is_ascii_digit() => self.number(start)?,
                c if c.is_ascii_alphabetic() || c == '_' => self.ident(start),
                _ => self.punct(start)?,
            }
        }
        Ok(self.tokens)
    }

    /// Consumes a `#` or `//` comment up to (but not including) the newline,
    /// which then lexes as an ordinary separator.
    fn line_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn block_comment(&mut self, start: usize) -> EvalResult<()> {
        match self.rest()[2..].find("*/") {
            Some(idx) => {
                self.pos += 2 + idx + 2;
                Ok(())
            }
            None => Err(self.error_at("unterminated block comment", start)),
        }
    }

    fn ident(&mut self, start: usize) {
        loop {
            if self.rest().starts_with("::") {
                self.pos += 2;
                continue;
            }
            match self.peek() {
                Some(c) if c.is_ascii_alphanumeric() || c == '_' || c == '-' => {
                    self.bump();
                }
                _ => break,
            }
        }
        let token = match &self.src[start..self.pos] {
            "true" => Token::Bool(true),
            "false" => Token::Bool(false),
            "null" => Token::Null,
            name => Token::Ident(name.to_owned()),
        };
        self.push(token, start);
    }

    fn eat_digits(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
    }

    fn number(&mut self, start: usize) -> EvalResult<()> {
        self.eat_digits();
        let mut is_float = false;
        let mut it = self.rest().chars();
        if it.next() == Some('.') && it.next().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
            self.eat_digits();
            is_float = true;
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let mut it = self.rest().chars();
            it.next();
            let (sign_len, digit) = match it.next() {
                Some('+' | '-') => (1, it.next()),
                other => (0, other),
            };
            if digit.is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1 + sign_len;
                self.eat_digits();
                is_float = true;
            }
        }
        let text = &self.src[start..self.pos];
        let token = if is_float {
            let value = text
                .parse::<f64>()
                .map_err(|_| self.error_at(format!("invalid float literal {text:?}"), start))?;
            Token::Float(value)
        } else {
            let value = text
                .parse::<BigInt>()
                .map_err(|_| self.error_at(format!("invalid integer literal {text:?}"), start))?;
            Token::Int(value)
        };
        self.push(token, start);
        Ok(())
    }

    /// Scans a quoted string, capturing the raw contents between the quotes.
    ///
    /// Interpolations may nest strings which may nest further interpolations;
    /// a stack of open scopes tracks where the literal actually ends. Escapes
    /// and `${...}` splitting are deferred to template expansion.
    fn string(&mut self, start: usize) -> EvalResult<()> {
        self.bump();
        let content_start = self.pos;
        let mut stack: Vec<char> = Vec::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(self.error_at("unterminated string literal", start));
            };
            if stack.is_empty() {
                if self.rest().starts_with("$${") {
                    self.pos += 3;
                } else if self.rest().starts_with("${") {
                    stack.push('{');
                    self.pos += 2;
                } else {
                    match c {
                        '\\' => {
                            self.bump();
                            if self.bump().is_none() {
                                return Err(self.error_at("unterminated string literal", start));
                            }
                        }
                        '"' => break,
                        '\n' => return Err(self.error_at("unterminated string literal", start)),
                        _ => {
                            self.bump();
                        }
                    }
                }
            } else if stack.last() == Some(&'"') {
                match c {
                    '\\' => {
                        self.bump();
                        if self.bump().is_none() {
                            return Err(self.error_at("unterminated string literal", start));
                        }
                    }
                    '"' => {
                        stack.pop();
                        self.bump();
                    }
                    _ if self.rest().starts_with("${") => {
                        stack.push('{');
                        self.pos += 2;
                    }
                    _ => {
                        self.bump();
                    }
                }
            } else {
                match c {
                    '"' => {
                        stack.push('"');
                    }
                    '{' => {
                        stack.push('{');
                    }
                    '}' => {
                        stack.pop();
                    }
                    _ => {}
                }
                self.bump();
            }
        }
        let raw = self.src[content_start..self.pos].to_owned();
        self.bump();
        self.push(Token::Str(raw), start);
        Ok(())
    }

    fn heredoc(&mut self, start: usize) -> EvalResult<()> {
        self.pos += 2;
        let indent = self.peek() == Some('-');
        if indent {
            self.bump();
        }
        let tag_start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            self.bump();
        }
        let tag = self.src[tag_start..self.pos].to_owned();
        if tag.is_empty() {
            return Err(self.error_at("expected heredoc delimiter after '<<'", start));
        }
        if self.peek() == Some('\r') {
            self.bump();
        }
        if self.bump() != Some('\n') {
            return Err(self.error_at("expected newline after heredoc delimiter", start));
        }
        let mut lines: Vec<String> = Vec::new();
        loop {
            let (line, line_len, has_newline) = {
                let rest = &self.src[self.pos..];
                if rest.is_empty() {
                    return Err(self.error_at(format!("unterminated heredoc, expected {tag:?}"), start));
                }
                match rest.find('\n') {
                    Some(idx) => (rest[..idx].to_owned(), idx, true),
                    None => (rest.to_owned(), rest.len(), false),
                }
            };
            let candidate = line.strip_suffix('\r').unwrap_or(&line);
            let terminator = if indent {
                candidate.trim_start_matches([' ', '\t'])
            } else {
                candidate
            };
            if terminator == tag {
                // Leave the trailing newline so it lexes as a separator.
                self.pos += line_len;
                break;
            }
            if !has_newline {
                return Err(self.error_at(format!("unterminated heredoc, expected {tag:?}"), start));
            }
            lines.push(candidate.to_owned());
            self.pos += line_len + 1;
        }
        let mut body = lines.join("\n");
        if !lines.is_empty() {
            body.push('\n');
        }
        if indent {
            body = template::trim_heredoc_indent(&body);
        }
        self.push(Token::Heredoc(body), start);
        Ok(())
    }

    fn punct(&mut self, start: usize) -> EvalResult<()> {
        let rest = self.rest();
        let (token, len) = if rest.starts_with("...") {
            (Token::Ellipsis, 3)
        } else if rest.starts_with("==") {
            (Token::Eq, 2)
        } else if rest.starts_with("=>") {
            (Token::Arrow, 2)
        } else if rest.starts_with("!=") {
            (Token::NotEq, 2)
        } else if rest.starts_with("<=") {
            (Token::LtE, 2)
        } else if rest.starts_with(">=") {
            (Token::GtE, 2)
        } else if rest.starts_with("&&") {
            (Token::And, 2)
        } else if rest.starts_with("||") {
            (Token::Or, 2)
        } else {
            let Some(c) = self.peek() else {
                return Err(self.error_at("unexpected end of input", start));
            };
            let token = match c {
                '=' => Token::Assign,
                '!' => Token::Not,
                '<' => Token::Lt,
                '>' => Token::Gt,
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '%' => Token::Percent,
                '?' => Token::Question,
                ':' => Token::Colon,
                '.' => Token::Dot,
                ',' => Token::Comma,
                '(' => Token::LParen,
                ')' => Token::RParen,
                '[' => Token::LBracket,
                ']' => Token::RBracket,
                '{' => Token::LBrace,
                '}' => Token::RBrace,
                other => {
                    return Err(self.error_at(format!("unexpected character {other:?}"), start));
                }
            };
            (token, c.len_utf8())
        };
        self.pos += len;
        self.push(token, start);
        Ok(())
    }
}
