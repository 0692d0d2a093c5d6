use crate::ast::{BinaryOp, Expr, LogicalOp, Param, ProcDecl, Program, Stmt, UnaryOp};
use crate::error::{Diagnostic, ErrorCode, ErrorCollector, Span};
use crate::lexer::{Token, TokenType};
use crate::value::Value;

pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Why a grammar rule gave up.
#[derive(Debug)]
enum ParseError {
    /// A new syntax error, recorded by the statement that contains it.
    Syntax(Diagnostic),
    /// The rule ran into a placeholder for a lexical error that is already
    /// in the error table.
    Lexical,
    /// The nesting limit was exceeded; the whole parse is abandoned.
    TooDeep(Diagnostic),
}

type ParseResult<T> = Result<T, ParseError>;

fn syntax_error(code: ErrorCode, span: Span, message: String, help: &str) -> ParseError {
    ParseError::Syntax(Diagnostic::syntactic(code, span, message).with_help(help))
}

/// Replaces a syntax error in the right operand of `operator` with one that
/// points at the operator itself.
fn expected_operand(operator: &Token, help: &'static str) -> impl FnOnce(ParseError) -> ParseError {
    let span = operator.span;
    let lexeme = operator.lexeme.clone();
    move |error| match error {
        ParseError::Syntax(_) => syntax_error(
            ErrorCode::ExpectedExpression,
            span,
            format!("Expected expression after '{}'", lexeme),
            help,
        ),
        other => other,
    }
}

pub struct Parser<'e> {
    tokens: Vec<Token>,
    current: usize,
    depth: usize,
    max_depth: usize,
    errors: &'e mut ErrorCollector,
}

impl<'e> Parser<'e> {
    pub fn new(mut tokens: Vec<Token>, errors: &'e mut ErrorCollector) -> Self {
        if tokens.last().map_or(true, |t| t.token_type != TokenType::Eof) {
            let span = tokens
                .last()
                .map(|t| t.span)
                .unwrap_or_else(|| Span::new(0, 0, 1, 1));
            tokens.push(Token::new(TokenType::Eof, String::new(), span));
        }

        Self {
            tokens,
            current: 0,
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
            errors,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Parses the whole token stream. Syntax errors are recorded and the
    /// offending statements replaced by `Stmt::Error`. Returns `None` only
    /// when the nesting limit was exceeded.
    pub fn parse(&mut self) -> Option<Program> {
        let mut statements = Vec::new();

        while !self.is_at_end() {
            match self.recovering_statement() {
                Ok(statement) => statements.push(statement),
                Err(diagnostic) => {
                    self.errors.record(diagnostic);
                    return None;
                }
            }
        }

        Some(Program { statements })
    }

    fn recovering_statement(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.current;
        let start_span = self.peek().span;
        let depth = self.depth;

        match self.statement() {
            Ok(statement) => Ok(statement),
            Err(ParseError::TooDeep(diagnostic)) => Err(diagnostic),
            Err(error) => {
                // Chain links still held by the failed statement.
                self.depth = depth;
                if let ParseError::Syntax(diagnostic) = error {
                    self.errors.record(diagnostic);
                }
                self.synchronize(start_span.line);
                if self.current == start && !self.is_at_end() {
                    self.advance();
                }
                let end_span = self.previous().span;
                Ok(Stmt::Error {
                    span: start_span.to(&end_span),
                })
            }
        }
    }

    /// Discards tokens of a malformed statement that started on
    /// `statement_line`.
    fn synchronize(&mut self, statement_line: usize) {
        while !self.is_at_end() {
            if self.peek().span.line > statement_line && self.starts_statement() {
                return;
            }

            match self.peek().token_type {
                TokenType::Semicolon => {
                    self.advance();
                    return;
                }
                TokenType::RightBrace => return,
                TokenType::LeftBrace => {
                    // The rest of a block opened by a broken statement is
                    // ambiguous; skip it whole.
                    self.skip_block();
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn skip_block(&mut self) {
        let mut depth = 0usize;
        while !self.is_at_end() {
            match self.advance().token_type {
                TokenType::LeftBrace => depth += 1,
                TokenType::RightBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    fn starts_statement(&self) -> bool {
        matches!(
            self.peek().token_type,
            TokenType::Var
                | TokenType::Proc
                | TokenType::If
                | TokenType::While
                | TokenType::For
                | TokenType::Return
                | TokenType::Identifier
                | TokenType::LeftBrace
                | TokenType::LeftParen
                | TokenType::LeftBracket
                | TokenType::Number
                | TokenType::String
                | TokenType::Minus
                | TokenType::Bang
                | TokenType::Not
                | TokenType::True
                | TokenType::False
                | TokenType::Undefined
        )
    }

    /// Runs `rule` one nesting level deeper, failing once the limit is hit.
    fn nested<T>(&mut self, rule: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        if self.depth >= self.max_depth {
            return Err(self.too_deep());
        }

        self.depth += 1;
        let result = rule(self);
        self.depth -= 1;
        result
    }

    /// Matches the next operator of a left-associative chain. The operator
    /// must sit on the line of its left operand, and every link counts as
    /// one nesting level until the caller releases `links`.
    fn chain_link(&mut self, types: &[TokenType], links: &mut usize) -> ParseResult<bool> {
        if !self.on_same_line() || !types.iter().any(|t| self.check(t)) {
            return Ok(false);
        }
        if self.depth >= self.max_depth {
            return Err(self.too_deep());
        }

        self.advance();
        self.depth += 1;
        *links += 1;
        Ok(true)
    }

    fn too_deep(&self) -> ParseError {
        ParseError::TooDeep(
            Diagnostic::syntactic(
                ErrorCode::RecursionLimit,
                self.peek().span,
                format!("Program is nested too deeply (limit is {} levels)", self.max_depth),
            )
            .with_help("Split deeply nested expressions or blocks into smaller statements."),
        )
    }

    fn statement(&mut self) -> ParseResult<Stmt> {
        self.nested(|parser| {
            if parser.match_types(&[TokenType::Var]) {
                parser.var_declaration()
            } else if parser.match_types(&[TokenType::Proc]) {
                parser.procedure()
            } else if parser.match_types(&[TokenType::If]) {
                parser.if_statement()
            } else if parser.match_types(&[TokenType::While]) {
                parser.while_statement()
            } else if parser.match_types(&[TokenType::For]) {
                parser.for_statement()
            } else if parser.match_types(&[TokenType::Return]) {
                parser.return_statement()
            } else if parser.check(&TokenType::LeftBrace) {
                let start_span = parser.advance().span;
                let statements = parser.block()?;
                Ok(Stmt::Block {
                    statements,
                    span: start_span.to(&parser.previous().span),
                })
            } else {
                parser.expression_statement()
            }
        })
    }

    fn block(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut statements = Vec::new();

        while !self.check(&TokenType::RightBrace) && !self.is_at_end() {
            statements.push(self.recovering_statement().map_err(ParseError::TooDeep)?);
        }

        self.consume_with_help(
            TokenType::RightBrace,
            "Expected '}' after block",
            "Block statements must be closed with '}' after the opening '{'.",
        )?;
        Ok(statements)
    }

    fn var_declaration(&mut self) -> ParseResult<Stmt> {
        let start_span = self.previous().span;
        let name = self
            .consume_with_help(
                TokenType::Identifier,
                "Expected variable name after 'var'",
                "Declarations look like: var total = 0",
            )?
            .clone();

        let initializer = if self.match_types(&[TokenType::Equal]) {
            Some(self.expression()?)
        } else {
            None
        };
        self.end_statement()?;

        Ok(Stmt::VarDecl {
            name: name.lexeme,
            name_span: name.span,
            initializer,
            span: start_span.to(&self.previous().span),
        })
    }

    fn procedure(&mut self) -> ParseResult<Stmt> {
        let start_span = self.previous().span;
        let name = self
            .consume_with_help(
                TokenType::Identifier,
                "Expected procedure name after 'proc'",
                "Procedures look like: proc area(w, h) { return w * h }",
            )?
            .clone();

        self.consume(TokenType::LeftParen, "Expected '(' after procedure name")?;
        let mut params = Vec::new();
        if !self.check(&TokenType::RightParen) {
            loop {
                let param = self.consume(TokenType::Identifier, "Expected parameter name")?;
                params.push(Param {
                    name: param.lexeme.clone(),
                    span: param.span,
                });
                if !self.match_types(&[TokenType::Comma]) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "Expected ')' after parameters")?;
        self.consume_with_help(
            TokenType::LeftBrace,
            "Expected '{' before procedure body",
            "A procedure body is a block: proc name(a) { ... }",
        )?;
        let body = self.block()?;

        Ok(Stmt::Procedure(ProcDecl {
            name: name.lexeme,
            name_span: name.span,
            params,
            body,
            span: start_span.to(&self.previous().span),
        }))
    }

    fn if_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.previous().span;

        self.consume_with_help(
            TokenType::LeftParen,
            "Expected '(' after 'if'",
            "If statements require parentheses around the condition: if (condition) { ... }",
        )?;
        let condition = self.expression()?;
        self.consume_with_help(
            TokenType::RightParen,
            "Expected ')' after if condition",
            "If conditions must be enclosed in parentheses: if (condition) { ... }",
        )?;

        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.match_types(&[TokenType::Else]) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        let end_span = match else_branch {
            Some(ref else_stmt) => *else_stmt.span(),
            None => *then_branch.span(),
        };

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
            span: start_span.to(&end_span),
        })
    }

    fn while_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.previous().span;

        self.consume(TokenType::LeftParen, "Expected '(' after 'while'")?;
        let condition = self.expression()?;
        self.consume(TokenType::RightParen, "Expected ')' after while condition")?;

        let body = Box::new(self.statement()?);
        let span = start_span.to(body.span());

        Ok(Stmt::While {
            condition,
            body,
            span,
        })
    }

    fn for_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.previous().span;

        self.consume(TokenType::LeftParen, "Expected '(' after 'for'")?;

        let initializer = if self.match_types(&[TokenType::Semicolon]) {
            None
        } else if self.match_types(&[TokenType::Var]) {
            let var_span = self.previous().span;
            let name = self
                .consume(TokenType::Identifier, "Expected variable name after 'var'")?
                .clone();
            let value = if self.match_types(&[TokenType::Equal]) {
                Some(self.expression()?)
            } else {
                None
            };
            self.consume(TokenType::Semicolon, "Expected ';' after loop initializer")?;
            Some(Box::new(Stmt::VarDecl {
                name: name.lexeme,
                name_span: name.span,
                initializer: value,
                span: var_span.to(&self.previous().span),
            }))
        } else {
            let expr = self.expression()?;
            let span = *expr.span();
            self.consume(TokenType::Semicolon, "Expected ';' after loop initializer")?;
            Some(Box::new(Stmt::Expression { expr, span }))
        };

        let condition = if !self.check(&TokenType::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::Semicolon, "Expected ';' after loop condition")?;

        let increment = if !self.check(&TokenType::RightParen) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::RightParen, "Expected ')' after for clauses")?;

        let body = Box::new(self.statement()?);
        let span = start_span.to(body.span());

        Ok(Stmt::For {
            initializer,
            condition,
            increment,
            body,
            span,
        })
    }

    fn return_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.previous().span;
        let value = if self.at_statement_end() {
            None
        } else {
            Some(self.expression()?)
        };
        self.end_statement()?;

        Ok(Stmt::Return {
            value,
            span: start_span.to(&self.previous().span),
        })
    }

    fn expression_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.peek().span;
        let expr = self.expression()?;
        self.end_statement()?;

        Ok(Stmt::Expression {
            expr,
            span: start_span.to(&self.previous().span),
        })
    }

    fn at_statement_end(&self) -> bool {
        self.is_at_end()
            || self.check(&TokenType::Semicolon)
            || self.check(&TokenType::RightBrace)
            || !self.on_same_line()
    }

    /// A simple statement ends with ';', a line break, the closing '}' of
    /// its block, or the end of input.
    fn end_statement(&mut self) -> ParseResult<()> {
        if self.match_types(&[TokenType::Semicolon]) {
            return Ok(());
        }
        if self.at_statement_end() {
            return Ok(());
        }
        if self.check(&TokenType::Error) {
            return Err(ParseError::Lexical);
        }

        Err(syntax_error(
            ErrorCode::UnexpectedToken,
            self.peek().span,
            format!("Expected end of statement, found {}", self.describe_current()),
            "Put each statement on its own line or separate statements with ';'.",
        ))
    }

    fn expression(&mut self) -> ParseResult<Expr> {
        self.nested(|parser| parser.assignment())
    }

    fn assignment(&mut self) -> ParseResult<Expr> {
        let expr = self.or()?;

        if self.check(&TokenType::Equal) {
            let equals_span = self.advance().span;
            let value = self.nested(|parser| parser.assignment())?;

            if let Expr::Variable { name, span } = expr {
                return Ok(Expr::Assign {
                    name,
                    name_span: span,
                    span: span.to(value.span()),
                    value: Box::new(value),
                });
            }

            return Err(syntax_error(
                ErrorCode::InvalidAssignmentTarget,
                equals_span,
                "Invalid assignment target".to_string(),
                "Only variables can be assigned to. Example: 'x = 10'",
            ));
        }

        Ok(expr)
    }

    fn or(&mut self) -> ParseResult<Expr> {
        let mut expr = self.and()?;
        let mut links = 0;

        while self.chain_link(&[TokenType::Or], &mut links)? {
            let right = self.and()?;
            let span = expr.span().to(right.span());

            expr = Expr::Logical {
                left: Box::new(expr),
                operator: LogicalOp::Or,
                right: Box::new(right),
                span,
            };
        }
        self.depth -= links;

        Ok(expr)
    }

    fn and(&mut self) -> ParseResult<Expr> {
        let mut expr = self.equality()?;
        let mut links = 0;

        while self.chain_link(&[TokenType::And], &mut links)? {
            let right = self.equality()?;
            let span = expr.span().to(right.span());

            expr = Expr::Logical {
                left: Box::new(expr),
                operator: LogicalOp::And,
                right: Box::new(right),
                span,
            };
        }
        self.depth -= links;

        Ok(expr)
    }

    fn equality(&mut self) -> ParseResult<Expr> {
        let mut expr = self.comparison()?;
        let mut links = 0;

        while self.chain_link(&[TokenType::BangEqual, TokenType::EqualEqual], &mut links)? {
            let operator_token = self.previous().clone();
            let operator = match operator_token.token_type {
                TokenType::BangEqual => BinaryOp::NotEqual,
                _ => BinaryOp::Equal,
            };

            let right = self.comparison().map_err(expected_operand(
                &operator_token,
                "Equality operators like '==' and '!=' require expressions on both sides.",
            ))?;
            let span = expr.span().to(right.span());

            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
                span,
            };
        }
        self.depth -= links;

        Ok(expr)
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        let mut expr = self.term()?;
        let mut links = 0;

        while self.chain_link(
            &[
                TokenType::Greater,
                TokenType::GreaterEqual,
                TokenType::Less,
                TokenType::LessEqual,
            ],
            &mut links,
        )? {
            let operator_token = self.previous().clone();
            let operator = match operator_token.token_type {
                TokenType::Greater => BinaryOp::Greater,
                TokenType::GreaterEqual => BinaryOp::GreaterEqual,
                TokenType::Less => BinaryOp::Less,
                _ => BinaryOp::LessEqual,
            };

            let right = self.term().map_err(expected_operand(
                &operator_token,
                "Comparison operators like '>', '<', '>=' and '<=' require expressions on both sides.",
            ))?;
            let span = expr.span().to(right.span());

            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
                span,
            };
        }
        self.depth -= links;

        Ok(expr)
    }

    fn term(&mut self) -> ParseResult<Expr> {
        let mut expr = self.factor()?;
        let mut links = 0;

        while self.chain_link(&[TokenType::Minus, TokenType::Plus], &mut links)? {
            let operator_token = self.previous().clone();
            let operator = match operator_token.token_type {
                TokenType::Minus => BinaryOp::Subtract,
                _ => BinaryOp::Add,
            };

            let right = self.factor().map_err(expected_operand(
                &operator_token,
                "Arithmetic operators like '+' and '-' require expressions on both sides.",
            ))?;
            let span = expr.span().to(right.span());

            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
                span,
            };
        }
        self.depth -= links;

        Ok(expr)
    }

    fn factor(&mut self) -> ParseResult<Expr> {
        let mut expr = self.unary()?;
        let mut links = 0;

        while self.chain_link(&[TokenType::Slash, TokenType::Star, TokenType::Percent], &mut links)? {
            let operator_token = self.previous().clone();
            let operator = match operator_token.token_type {
                TokenType::Slash => BinaryOp::Divide,
                TokenType::Star => BinaryOp::Multiply,
                _ => BinaryOp::Modulo,
            };

            let right = self.unary().map_err(expected_operand(
                &operator_token,
                "Multiplication, division and remainder operators require expressions on both sides.",
            ))?;
            let span = expr.span().to(right.span());

            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
                span,
            };
        }
        self.depth -= links;

        Ok(expr)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        if self.match_types(&[TokenType::Bang, TokenType::Not, TokenType::Minus]) {
            let operator = match self.previous().token_type {
                TokenType::Minus => UnaryOp::Negate,
                _ => UnaryOp::Not,
            };

            let start_span = self.previous().span;
            let right = self.nested(|parser| parser.unary())?;
            let span = start_span.to(right.span());

            return Ok(Expr::Unary {
                operator,
                operand: Box::new(right),
                span,
            });
        }

        self.call()
    }

    fn call(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;
        let mut links = 0;

        // Postfix operators only continue an expression on the same line.
        loop {
            if self.check(&TokenType::LeftParen) && self.on_same_line() {
                let paren_span = self.advance().span;
                expr = match expr {
                    Expr::Variable { name, span } => self.finish_call(name, span)?,
                    _ => {
                        return Err(syntax_error(
                            ErrorCode::UnexpectedToken,
                            paren_span,
                            "Only named procedures can be called".to_string(),
                            "Call a procedure by its name: area(2, 3)",
                        ));
                    }
                };
            } else if self.chain_link(&[TokenType::LeftBracket], &mut links)? {
                let index = self.expression()?;
                let close_span = self
                    .consume_with_help(
                        TokenType::RightBracket,
                        "Expected ']' after index",
                        "Index expressions look like: items[0]",
                    )?
                    .span;
                let span = expr.span().to(&close_span);
                expr = Expr::Index {
                    target: Box::new(expr),
                    index: Box::new(index),
                    span,
                };
            } else {
                break;
            }
        }
        self.depth -= links;

        Ok(expr)
    }

    fn finish_call(&mut self, callee: String, callee_span: Span) -> ParseResult<Expr> {
        let mut args = Vec::new();

        if !self.check(&TokenType::RightParen) {
            loop {
                if self.is_at_end() {
                    return Err(syntax_error(
                        ErrorCode::UnexpectedToken,
                        self.error_span(),
                        "Unexpected end of input in procedure call".to_string(),
                        "Procedure calls must be closed with ')' after the arguments. Example: area(2, 3)",
                    ));
                }

                args.push(self.expression()?);

                if !self.match_types(&[TokenType::Comma]) {
                    break;
                }
            }
        }

        let paren_span = self
            .consume_with_help(
                TokenType::RightParen,
                "Expected ')' after arguments",
                "Procedure calls must be closed with ')' after the arguments. Example: area(2, 3)",
            )?
            .span;

        Ok(Expr::Call {
            callee,
            callee_span,
            args,
            span: callee_span.to(&paren_span),
        })
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let token = self.peek().clone();

        let expr = match token.token_type {
            TokenType::False => Expr::Literal {
                value: Value::Bool(false),
                span: token.span,
            },
            TokenType::True => Expr::Literal {
                value: Value::Bool(true),
                span: token.span,
            },
            TokenType::Undefined => Expr::Literal {
                value: Value::Undefined,
                span: token.span,
            },
            TokenType::Number => {
                let value = token.lexeme.parse::<f64>().map_err(|_| {
                    syntax_error(
                        ErrorCode::ExpectedExpression,
                        token.span,
                        format!("Invalid number '{}'", token.lexeme),
                        "Numbers look like 42, -7 or 3.5",
                    )
                })?;
                Expr::Literal {
                    value: Value::Number(value),
                    span: token.span,
                }
            }
            TokenType::String => Expr::Literal {
                value: Value::Text(token.lexeme),
                span: token.span,
            },
            TokenType::Identifier => Expr::Variable {
                name: token.lexeme,
                span: token.span,
            },
            TokenType::LeftParen => {
                self.advance();
                return self.grouping(token.span);
            }
            TokenType::LeftBracket => {
                self.advance();
                return self.list_literal(token.span);
            }
            TokenType::Error => return Err(ParseError::Lexical),
            _ => {
                let help_msg = match token.token_type {
                    TokenType::RightParen => "Found ')' without matching '('. Check for unbalanced parentheses.",
                    TokenType::RightBrace => "Found '}' without matching '{'. Check for unbalanced braces.",
                    TokenType::RightBracket => "Found ']' without matching '['. Check for unbalanced brackets.",
                    TokenType::Eof => "Reached end of input while expecting an expression.",
                    _ => "Expected a literal value, variable, or parenthesized expression here.",
                };

                return Err(syntax_error(
                    ErrorCode::ExpectedExpression,
                    self.error_span(),
                    format!("Expected expression, found {}", self.describe_current()),
                    help_msg,
                ));
            }
        };

        self.advance();
        Ok(expr)
    }

    fn grouping(&mut self, start_span: Span) -> ParseResult<Expr> {
        if self.check(&TokenType::RightParen) {
            return Err(syntax_error(
                ErrorCode::ExpectedExpression,
                start_span.to(&self.peek().span),
                "Empty parentheses are not allowed".to_string(),
                "Parentheses must contain an expression. Use 'undefined' for an empty value: (undefined)",
            ));
        }

        let expr = self.expression()?;
        let end_span = self
            .consume_with_help(
                TokenType::RightParen,
                "Expected ')' after expression",
                "Every opening parenthesis '(' must have a matching closing parenthesis ')'.",
            )?
            .span;

        Ok(Expr::Grouping {
            expr: Box::new(expr),
            span: start_span.to(&end_span),
        })
    }

    fn list_literal(&mut self, start_span: Span) -> ParseResult<Expr> {
        let mut elements = Vec::new();

        if !self.check(&TokenType::RightBracket) {
            loop {
                elements.push(self.expression()?);
                if !self.match_types(&[TokenType::Comma]) {
                    break;
                }
            }
        }

        let end_span = self
            .consume_with_help(
                TokenType::RightBracket,
                "Expected ']' after list elements",
                "List literals must be closed with ']' after the opening '['. Example: [1, 2, 3]",
            )?
            .span;

        Ok(Expr::List {
            elements,
            span: start_span.to(&end_span),
        })
    }

    fn match_types(&mut self, types: &[TokenType]) -> bool {
        for token_type in types {
            if self.check(token_type) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn check(&self, token_type: &TokenType) -> bool {
        if self.is_at_end() {
            false
        } else {
            &self.peek().token_type == token_type
        }
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        self.peek().token_type == TokenType::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn on_same_line(&self) -> bool {
        self.current == 0 || self.peek().span.line == self.previous().span.line
    }

    fn describe_current(&self) -> String {
        match self.peek().token_type {
            TokenType::Eof => "end of input".to_string(),
            TokenType::String => format!("string \"{}\"", self.peek().lexeme),
            _ => format!("'{}'", self.peek().lexeme),
        }
    }

    /// Where to point an error about the current token. At the end of input
    /// this is just past the last real token.
    fn error_span(&self) -> Span {
        if self.is_at_end() && self.current > 0 {
            let last = self.previous().span;
            let width = last.end - last.start;
            Span::new(last.end, last.end + 1, last.line, last.column + width)
        } else {
            self.peek().span
        }
    }

    fn consume(&mut self, token_type: TokenType, message: &str) -> ParseResult<&Token> {
        self.consume_with_help(token_type, message, "")
    }

    fn consume_with_help(
        &mut self,
        token_type: TokenType,
        message: &str,
        help: &str,
    ) -> ParseResult<&Token> {
        if self.check(&token_type) {
            return Ok(self.advance());
        }
        if self.check(&TokenType::Error) {
            return Err(ParseError::Lexical);
        }

        let diagnostic = Diagnostic::syntactic(
            ErrorCode::UnexpectedToken,
            self.error_span(),
            format!("{}, found {}", message, self.describe_current()),
        );
        Err(ParseError::Syntax(if help.is_empty() {
            diagnostic
        } else {
            diagnostic.with_help(help)
        }))
    }
}
