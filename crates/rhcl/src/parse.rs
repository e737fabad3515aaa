use crate::{
    errors::{Error, EvalResult},
    expressions::{
        Attribute, BinaryOperator, Block, Body, Expr, ExprLoc, ForIntro, Literal, Stmt, Trailer,
        UnaryOperator,
    },
    lex::{self, Span, Token, TokenLoc},
    template,
};

/// Parses a full configuration body.
///
/// Parsing is all-or-nothing: the first syntax error aborts with a
/// `ParseError` carrying the span of the offending token.
pub fn parse_body(src: &str) -> EvalResult<Body> {
    let tokens = lex::tokenize(src, 0)?;
    let mut parser = Parser::new(tokens, src.len() as u32);
    let statements = parser.statements(false)?;
    Ok(Body::new(Span::new(0, src.len() as u32), statements))
}

/// Parses a single expression; the whole input must be consumed.
pub fn parse_expr(src: &str) -> EvalResult<ExprLoc> {
    parse_expr_at(src, 0)
}

/// Parses an expression from a source fragment that sits at byte offset
/// `offset` of the original text, so all spans index the original.
pub(crate) fn parse_expr_at(src: &str, offset: u32) -> EvalResult<ExprLoc> {
    let tokens = lex::tokenize(src, offset)?;
    let mut parser = Parser::new(tokens, offset + src.len() as u32);
    parser.skip_newlines();
    let expr = parser.expression()?;
    parser.skip_newlines();
    parser.expect_end()?;
    Ok(expr)
}

/// A recursive-descent parser over the token stream.
///
/// One method per precedence level, lowest binding first: conditional, `||`,
/// `&&`, unary `!`, equality, comparison, additive, multiplicative, unary
/// `-`, postfix trailers, primary terms. Binary operators associate left;
/// the conditional associates right.
struct Parser {
    tokens: Vec<TokenLoc>,
    pos: usize,
    /// End offset of the source, for spans of errors at end of input.
    end: u32,
}

impl Parser {
    fn new(tokens: Vec<TokenLoc>, end: u32) -> Self {
        Self {
            tokens,
            pos: 0,
            end,
        }
    }

    fn peek(&self) -> Option<&TokenLoc> {
        self.tokens.get(self.pos)
    }

    fn peek_token(&self) -> Option<&Token> {
        self.peek().map(|t| &t.token)
    }

    fn eof_span(&self) -> Span {
        Span::new(self.end, self.end)
    }

    fn unexpected(&self, expected: &str) -> Error {
        match self.peek() {
            Some(t) => Error::parse(
                format!("expected {expected}, found {}", t.token.describe()),
                t.span,
            ),
            None => Error::parse(
                format!("expected {expected}, found end of input"),
                self.eof_span(),
            ),
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek_token() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_spanned(&mut self, token: &Token) -> Option<Span> {
        if self.peek_token() == Some(token) {
            let span = self.tokens[self.pos].span;
            self.pos += 1;
            Some(span)
        } else {
            None
        }
    }

    fn expect(&mut self, token: &Token, expected: &str) -> EvalResult<Span> {
        self.eat_spanned(token).ok_or_else(|| self.unexpected(expected))
    }

    fn expect_end(&self) -> EvalResult<()> {
        if self.pos == self.tokens.len() {
            Ok(())
        } else {
            Err(self.unexpected("end of input"))
        }
    }

    fn skip_newlines(&mut self) {
        while self.eat(&Token::Newline) {}
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek_token(), Some(Token::Ident(name)) if name == keyword)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn ident_name(&mut self, expected: &str) -> EvalResult<(String, Span)> {
        match self.peek() {
            Some(TokenLoc {
                span,
                token: Token::Ident(name),
            }) => {
                let out = (name.clone(), *span);
                self.pos += 1;
                Ok(out)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    // --- statements ---

    fn statements(&mut self, in_block: bool) -> EvalResult<Vec<Stmt>> {
        let mut out = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek_token() {
                None if in_block => return Err(self.unexpected("'}'")),
                None => break,
                Some(Token::RBrace) if in_block => break,
                _ => {}
            }
            out.push(self.statement()?);
            match self.peek_token() {
                None => {}
                Some(Token::Newline) => {
                    self.pos += 1;
                }
                Some(Token::RBrace) if in_block => {}
                _ => return Err(self.unexpected("a newline after the statement")),
            }
        }
        Ok(out)
    }

    fn statement(&mut self) -> EvalResult<Stmt> {
        let (name, ident_span) = self.ident_name("an attribute or block definition")?;
        if self.eat(&Token::Assign) {
            let value = self.expression()?;
            let position = ident_span.to(value.position);
            return Ok(Stmt::Attribute(Attribute {
                position,
                key: name,
                value,
            }));
        }
        let mut labels = Vec::new();
        loop {
            match self.peek_token() {
                Some(Token::Ident(label)) => {
                    labels.push(label.clone());
                    self.pos += 1;
                }
                Some(Token::Str(raw)) => {
                    let raw = raw.clone();
                    let span = self.tokens[self.pos].span;
                    self.pos += 1;
                    match template::expand_string(&raw, span.start + 1)? {
                        Expr::Literal(Literal::Str(label)) => labels.push(label),
                        _ => {
                            return Err(Error::parse(
                                "interpolation is not allowed in block labels",
                                span,
                            ));
                        }
                    }
                }
                Some(Token::LBrace) => break,
                _ => return Err(self.unexpected("a block label or '{'")),
            }
        }
        let lbrace = self.expect(&Token::LBrace, "'{'")?;
        let statements = self.statements(true)?;
        let rbrace = self.expect(&Token::RBrace, "'}'")?;
        Ok(Stmt::Block(Block {
            position: ident_span.to(rbrace),
            ident: name,
            labels,
            body: Body::new(lbrace.to(rbrace), statements),
        }))
    }

    // --- expressions ---

    fn expression(&mut self) -> EvalResult<ExprLoc> {
        self.conditional()
    }

    fn conditional(&mut self) -> EvalResult<ExprLoc> {
        let condition = self.or_expr()?;
        if !self.eat(&Token::Question) {
            return Ok(condition);
        }
        let then_expr = self.expression()?;
        self.expect(&Token::Colon, "':'")?;
        // Right-associative: the else branch swallows any further `?:`.
        let else_expr = self.expression()?;
        let position = condition.position.to(else_expr.position);
        Ok(ExprLoc::new(
            position,
            Expr::Conditional {
                condition: Box::new(condition),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
        ))
    }

    fn binary_level(
        &mut self,
        next: fn(&mut Self) -> EvalResult<ExprLoc>,
        ops: &[(Token, BinaryOperator)],
    ) -> EvalResult<ExprLoc> {
        let mut left = next(self)?;
        'outer: loop {
            for (token, op) in ops {
                if self.eat(token) {
                    let right = next(self)?;
                    let position = left.position.to(right.position);
                    left = ExprLoc::new(
                        position,
                        Expr::BinaryOp {
                            left: Box::new(left),
                            op: *op,
                            right: Box::new(right),
                        },
                    );
                    continue 'outer;
                }
            }
            break;
        }
        Ok(left)
    }

    fn or_expr(&mut self) -> EvalResult<ExprLoc> {
        self.binary_level(Self::and_expr, &[(Token::Or, BinaryOperator::Or)])
    }

    fn and_expr(&mut self) -> EvalResult<ExprLoc> {
        self.binary_level(Self::not_expr, &[(Token::And, BinaryOperator::And)])
    }

    fn not_expr(&mut self) -> EvalResult<ExprLoc> {
        if let Some(span) = self.eat_spanned(&Token::Not) {
            let operand = self.not_expr()?;
            let position = span.to(operand.position);
            return Ok(ExprLoc::new(
                position,
                Expr::UnaryOp {
                    op: UnaryOperator::Not,
                    operand: Box::new(operand),
                },
            ));
        }
        self.equality()
    }

    fn equality(&mut self) -> EvalResult<ExprLoc> {
        self.binary_level(
            Self::comparison,
            &[
                (Token::Eq, BinaryOperator::Eq),
                (Token::NotEq, BinaryOperator::NotEq),
            ],
        )
    }

    fn comparison(&mut self) -> EvalResult<ExprLoc> {
        self.binary_level(
            Self::additive,
            &[
                (Token::LtE, BinaryOperator::LtE),
                (Token::GtE, BinaryOperator::GtE),
                (Token::Lt, BinaryOperator::Lt),
                (Token::Gt, BinaryOperator::Gt),
            ],
        )
    }

    fn additive(&mut self) -> EvalResult<ExprLoc> {
        self.binary_level(
            Self::multiplicative,
            &[
                (Token::Plus, BinaryOperator::Add),
                (Token::Minus, BinaryOperator::Sub),
            ],
        )
    }

    fn multiplicative(&mut self) -> EvalResult<ExprLoc> {
        self.binary_level(
            Self::neg_expr,
            &[
                (Token::Star, BinaryOperator::Mul),
                (Token::Slash, BinaryOperator::Div),
                (Token::Percent, BinaryOperator::Mod),
            ],
        )
    }

    fn neg_expr(&mut self) -> EvalResult<ExprLoc> {
        if let Some(span) = self.eat_spanned(&Token::Minus) {
            let operand = self.neg_expr()?;
            let position = span.to(operand.position);
            return Ok(ExprLoc::new(
                position,
                Expr::UnaryOp {
                    op: UnaryOperator::Neg,
                    operand: Box::new(operand),
                },
            ));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> EvalResult<ExprLoc> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Token::Dot) {
                if self.eat(&Token::Star) {
                    expr = self.attr_splat(expr)?;
                    continue;
                }
                let (name, name_span) = self.ident_name("an attribute name after '.'")?;
                let position = expr.position.to(name_span);
                expr = ExprLoc::new(
                    position,
                    Expr::GetAttr {
                        object: Box::new(expr),
                        name,
                    },
                );
            } else if self.peek_token() == Some(&Token::LBracket) {
                self.pos += 1;
                if self.eat(&Token::Star) {
                    let rb = self.expect(&Token::RBracket, "']'")?;
                    expr = self.full_splat(expr, rb)?;
                    continue;
                }
                let index = self.expression()?;
                let rb = self.expect(&Token::RBracket, "']'")?;
                let position = expr.position.to(rb);
                expr = ExprLoc::new(
                    position,
                    Expr::GetIndex {
                        object: Box::new(expr),
                        index: Box::new(index),
                    },
                );
            } else {
                break;
            }
        }
        Ok(expr)
    }

    /// Whether the upcoming tokens are `.name`, i.e. a splat attr trailer.
    fn at_attr_trailer(&self) -> bool {
        self.peek_token() == Some(&Token::Dot)
            && matches!(
                self.tokens.get(self.pos + 1).map(|t| &t.token),
                Some(Token::Ident(_))
            )
    }

    fn attr_splat(&mut self, object: ExprLoc) -> EvalResult<ExprLoc> {
        // `.` and `*` are already consumed; the star span is behind us.
        let mut end = self.tokens[self.pos - 1].span;
        let mut trailers = Vec::new();
        while self.at_attr_trailer() {
            self.pos += 1;
            let (name, span) = self.ident_name("an attribute name after '.'")?;
            end = span;
            trailers.push(Trailer::Attr {
                name,
                position: span,
            });
        }
        let position = object.position.to(end);
        Ok(ExprLoc::new(
            position,
            Expr::AttrSplat {
                object: Box::new(object),
                trailers,
            },
        ))
    }

    fn full_splat(&mut self, object: ExprLoc, rb: Span) -> EvalResult<ExprLoc> {
        let mut end = rb;
        let mut trailers = Vec::new();
        loop {
            if self.at_attr_trailer() {
                self.pos += 1;
                let (name, span) = self.ident_name("an attribute name after '.'")?;
                end = span;
                trailers.push(Trailer::Attr {
                    name,
                    position: span,
                });
            } else if self.peek_token() == Some(&Token::LBracket)
                && self.tokens.get(self.pos + 1).map(|t| &t.token) != Some(&Token::Star)
            {
                let lb = self.tokens[self.pos].span;
                self.pos += 1;
                let index = self.expression()?;
                let rbracket = self.expect(&Token::RBracket, "']'")?;
                end = rbracket;
                trailers.push(Trailer::Index {
                    index,
                    position: lb.to(rbracket),
                });
            } else {
                break;
            }
        }
        let position = object.position.to(end);
        Ok(ExprLoc::new(
            position,
            Expr::FullSplat {
                object: Box::new(object),
                trailers,
            },
        ))
    }

    fn primary(&mut self) -> EvalResult<ExprLoc> {
        let Some(current) = self.peek().cloned() else {
            return Err(self.unexpected("an expression"));
        };
        let span = current.span;
        match current.token {
            Token::Int(value) => {
                self.pos += 1;
                Ok(ExprLoc::new(span, Expr::Literal(Literal::Int(value))))
            }
            Token::Float(value) => {
                self.pos += 1;
                Ok(ExprLoc::new(span, Expr::Literal(Literal::Float(value))))
            }
            Token::Bool(value) => {
                self.pos += 1;
                Ok(ExprLoc::new(span, Expr::Literal(Literal::Bool(value))))
            }
            Token::Null => {
                self.pos += 1;
                Ok(ExprLoc::new(span, Expr::Literal(Literal::Null)))
            }
            Token::Str(raw) => {
                self.pos += 1;
                // Content starts one byte past the opening quote.
                let expr = template::expand_string(&raw, span.start + 1)?;
                Ok(ExprLoc::new(span, expr))
            }
            Token::Heredoc(body) => {
                self.pos += 1;
                Ok(ExprLoc::new(span, Expr::Literal(Literal::Str(body))))
            }
            Token::Ident(name) => {
                self.pos += 1;
                if self.peek_token() == Some(&Token::LParen) {
                    self.func_call(name, span)
                } else {
                    Ok(ExprLoc::new(span, Expr::Name(name)))
                }
            }
            Token::LParen => {
                self.pos += 1;
                self.skip_newlines();
                let inner = self.expression()?;
                self.skip_newlines();
                let rp = self.expect(&Token::RParen, "')'")?;
                Ok(ExprLoc::new(span.to(rp), Expr::Parenthesis(Box::new(inner))))
            }
            Token::LBracket => {
                self.pos += 1;
                self.array_or_for(span)
            }
            Token::LBrace => {
                self.pos += 1;
                self.object_or_for(span)
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn func_call(&mut self, name: String, name_span: Span) -> EvalResult<ExprLoc> {
        self.expect(&Token::LParen, "'('")?;
        let mut args = Vec::new();
        let mut expand_final = false;
        let rp = loop {
            self.skip_newlines();
            if let Some(span) = self.eat_spanned(&Token::RParen) {
                break span;
            }
            args.push(self.expression()?);
            if self.eat(&Token::Ellipsis) {
                expand_final = true;
                self.skip_newlines();
                break self.expect(&Token::RParen, "')'")?;
            }
            let mut sep = self.eat(&Token::Comma);
            while self.eat(&Token::Newline) {
                sep = true;
            }
            if let Some(span) = self.eat_spanned(&Token::RParen) {
                break span;
            }
            if !sep {
                return Err(self.unexpected("',' or ')'"));
            }
        };
        Ok(ExprLoc::new(
            name_span.to(rp),
            Expr::FuncCall {
                name,
                args,
                expand_final,
            },
        ))
    }

    fn array_or_for(&mut self, lb: Span) -> EvalResult<ExprLoc> {
        self.skip_newlines();
        if self.eat_keyword("for") {
            return self.for_tuple(lb);
        }
        let mut items = Vec::new();
        let rb = loop {
            self.skip_newlines();
            if let Some(span) = self.eat_spanned(&Token::RBracket) {
                break span;
            }
            items.push(self.expression()?);
            let mut sep = self.eat(&Token::Comma);
            while self.eat(&Token::Newline) {
                sep = true;
            }
            if let Some(span) = self.eat_spanned(&Token::RBracket) {
                break span;
            }
            if !sep {
                return Err(self.unexpected("',' or ']'"));
            }
        };
        Ok(ExprLoc::new(lb.to(rb), Expr::Array(items)))
    }

    fn object_or_for(&mut self, lb: Span) -> EvalResult<ExprLoc> {
        self.skip_newlines();
        if self.eat_keyword("for") {
            return self.for_object(lb);
        }
        let mut items = Vec::new();
        let rb = loop {
            self.skip_newlines();
            if let Some(span) = self.eat_spanned(&Token::RBrace) {
                break span;
            }
            let key = self.object_key()?;
            if !self.eat(&Token::Assign) && !self.eat(&Token::Colon) {
                return Err(self.unexpected("'=' or ':'"));
            }
            let value = self.expression()?;
            items.push((key, value));
            let mut sep = self.eat(&Token::Comma);
            while self.eat(&Token::Newline) {
                sep = true;
            }
            if let Some(span) = self.eat_spanned(&Token::RBrace) {
                break span;
            }
            if !sep {
                return Err(self.unexpected("',' or '}'"));
            }
        };
        Ok(ExprLoc::new(lb.to(rb), Expr::Object(items)))
    }

    /// An object element key: a bare identifier means its string form, any
    /// other expression is kept and evaluated at runtime.
    fn object_key(&mut self) -> EvalResult<ExprLoc> {
        if let Some(TokenLoc {
            span,
            token: Token::Ident(name),
        }) = self.peek()
        {
            let key = ExprLoc::new(*span, Expr::Literal(Literal::Str(name.clone())));
            self.pos += 1;
            return Ok(key);
        }
        self.expression()
    }

    fn for_intro(&mut self) -> EvalResult<ForIntro> {
        let (first, _) = self.ident_name("a loop variable after 'for'")?;
        let (key_var, value_var) = if self.eat(&Token::Comma) {
            let (second, _) = self.ident_name("a loop variable after ','")?;
            (Some(first), second)
        } else {
            (None, first)
        };
        if !self.eat_keyword("in") {
            return Err(self.unexpected("'in'"));
        }
        let collection = self.expression()?;
        self.expect(&Token::Colon, "':'")?;
        self.skip_newlines();
        Ok(ForIntro {
            key_var,
            value_var,
            collection: Box::new(collection),
        })
    }

    fn for_condition(&mut self) -> EvalResult<Option<Box<ExprLoc>>> {
        if self.eat_keyword("if") {
            Ok(Some(Box::new(self.expression()?)))
        } else {
            Ok(None)
        }
    }

    fn for_tuple(&mut self, lb: Span) -> EvalResult<ExprLoc> {
        let intro = self.for_intro()?;
        let value = self.expression()?;
        let condition = self.for_condition()?;
        self.skip_newlines();
        let rb = self.expect(&Token::RBracket, "']'")?;
        Ok(ExprLoc::new(
            lb.to(rb),
            Expr::ForTuple {
                intro,
                value: Box::new(value),
                condition,
            },
        ))
    }

    fn for_object(&mut self, lb: Span) -> EvalResult<ExprLoc> {
        let intro = self.for_intro()?;
        let key = self.expression()?;
        self.expect(&Token::Arrow, "'=>'")?;
        let value = self.expression()?;
        let grouping = self.eat(&Token::Ellipsis);
        let condition = self.for_condition()?;
        self.skip_newlines();
        let rb = self.expect(&Token::RBrace, "'}'")?;
        Ok(ExprLoc::new(
            lb.to(rb),
            Expr::ForObject {
                intro,
                key: Box::new(key),
                value: Box::new(value),
                grouping,
                condition,
            },
        ))
    }
}
