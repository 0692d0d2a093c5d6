use crate::error::{Diagnostic, ErrorCode, ErrorCollector, Span};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    // Punctuation
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Semicolon,

    // Operators
    Minus,
    Plus,
    Slash,
    Star,
    Percent,
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    // Literals
    Identifier,
    String,
    Number,

    // Keywords
    And,
    Else,
    False,
    For,
    If,
    Not,
    Or,
    Proc,
    Return,
    True,
    Undefined,
    Var,
    While,

    // Special
    Error,
    Eof,
}

/// Coarse classification of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Keyword,
    Identifier,
    Number,
    String,
    Operator,
    Punctuation,
    Error,
    EndOfInput,
}

impl TokenType {
    pub fn kind(&self) -> TokenKind {
        use TokenType::*;
        match self {
            LeftParen | RightParen | LeftBrace | RightBrace | LeftBracket | RightBracket
            | Comma | Semicolon => TokenKind::Punctuation,
            Minus | Plus | Slash | Star | Percent | Bang | BangEqual | Equal | EqualEqual
            | Greater | GreaterEqual | Less | LessEqual => TokenKind::Operator,
            Identifier => TokenKind::Identifier,
            String => TokenKind::String,
            Number => TokenKind::Number,
            And | Else | False | For | If | Not | Or | Proc | Return | True | Undefined | Var
            | While => TokenKind::Keyword,
            Error => TokenKind::Error,
            Eof => TokenKind::EndOfInput,
        }
    }

    /// Whether a token of this type can be the last token of an operand.
    /// A sign right after such a token is a binary operator, not part of a
    /// number literal.
    fn ends_operand(&self) -> bool {
        matches!(
            self,
            TokenType::Identifier
                | TokenType::Number
                | TokenType::String
                | TokenType::RightParen
                | TokenType::RightBracket
                | TokenType::True
                | TokenType::False
                | TokenType::Undefined
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    /// Source text of the token; for strings, the unescaped contents.
    pub lexeme: String,
    pub span: Span,
}

impl Token {
    pub fn new(token_type: TokenType, lexeme: String, span: Span) -> Self {
        Self {
            token_type,
            lexeme,
            span,
        }
    }

    pub fn kind(&self) -> TokenKind {
        self.token_type.kind()
    }
}

/// Lazy scanner over a source text.
///
/// Yields `Ok(token)` for every token (ending with a single `Eof`) and
/// `Err(diagnostic)` for lexical errors. After an error the scanner has
/// already skipped the offending text, so iteration can simply continue.
pub struct Lexer {
    source: Vec<char>,
    start: usize,
    current: usize,
    line: usize,
    column: usize,
    start_line: usize,
    start_column: usize,
    previous: Option<TokenType>,
    finished: bool,
    keywords: HashMap<&'static str, TokenType>,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        let mut keywords = HashMap::new();
        keywords.insert("and", TokenType::And);
        keywords.insert("else", TokenType::Else);
        keywords.insert("false", TokenType::False);
        keywords.insert("for", TokenType::For);
        keywords.insert("if", TokenType::If);
        keywords.insert("not", TokenType::Not);
        keywords.insert("or", TokenType::Or);
        keywords.insert("proc", TokenType::Proc);
        keywords.insert("return", TokenType::Return);
        keywords.insert("true", TokenType::True);
        keywords.insert("undefined", TokenType::Undefined);
        keywords.insert("var", TokenType::Var);
        keywords.insert("while", TokenType::While);

        Self {
            source: source.chars().collect(),
            start: 0,
            current: 0,
            line: 1,
            column: 1,
            start_line: 1,
            start_column: 1,
            previous: None,
            finished: false,
            keywords,
        }
    }

    /// Drains the scanner, recording lexical errors and substituting an
    /// `Error` placeholder token for each of them.
    pub fn scan_tokens(self, errors: &mut ErrorCollector) -> Vec<Token> {
        let mut tokens = Vec::new();
        for item in self {
            match item {
                Ok(token) => tokens.push(token),
                Err(diagnostic) => {
                    tokens.push(Token::new(TokenType::Error, String::new(), diagnostic.span));
                    errors.record(diagnostic);
                }
            }
        }
        tokens
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    /// Scans one lexeme. `None` means the lexeme produced nothing
    /// (whitespace or a comment).
    fn scan_token(&mut self) -> Option<Result<Token, Diagnostic>> {
        let c = self.advance();

        let token_type = match c {
            '(' => TokenType::LeftParen,
            ')' => TokenType::RightParen,
            '{' => TokenType::LeftBrace,
            '}' => TokenType::RightBrace,
            '[' => TokenType::LeftBracket,
            ']' => TokenType::RightBracket,
            ',' => TokenType::Comma,
            ';' => TokenType::Semicolon,
            '*' => TokenType::Star,
            '%' => TokenType::Percent,
            '-' | '+' if self.peek().is_ascii_digit() && !self.follows_operand() => {
                return Some(self.number());
            }
            '-' => TokenType::Minus,
            '+' => TokenType::Plus,
            '!' => {
                if self.match_char('=') {
                    TokenType::BangEqual
                } else {
                    TokenType::Bang
                }
            }
            '=' => {
                if self.match_char('=') {
                    TokenType::EqualEqual
                } else {
                    TokenType::Equal
                }
            }
            '<' => {
                if self.match_char('=') {
                    TokenType::LessEqual
                } else {
                    TokenType::Less
                }
            }
            '>' => {
                if self.match_char('=') {
                    TokenType::GreaterEqual
                } else {
                    TokenType::Greater
                }
            }
            '/' => {
                if self.match_char('/') {
                    self.skip_line();
                    return None;
                } else if self.match_char('*') {
                    return self.block_comment().map(Err);
                } else {
                    TokenType::Slash
                }
            }
            '#' => {
                self.skip_line();
                return None;
            }
            ' ' | '\r' | '\t' | '\n' => return None,
            '"' => return Some(self.string()),
            c if c.is_ascii_digit() => return Some(self.number()),
            c if c.is_alphabetic() || c == '_' => return Some(Ok(self.identifier())),
            _ => {
                let span = Span::new(self.start, self.current, self.start_line, self.start_column);
                self.skip_to_whitespace();
                return Some(Err(Diagnostic::lexical(
                    ErrorCode::InvalidCharacter,
                    span,
                    format!("Unexpected character: '{}'", c),
                )));
            }
        };

        Some(Ok(self.add_token(token_type)))
    }

    fn follows_operand(&self) -> bool {
        self.previous.map_or(false, |t| t.ends_operand())
    }

    fn advance(&mut self) -> char {
        match self.source.get(self.current) {
            Some(&c) => {
                self.current += 1;
                if c == '\n' {
                    self.line += 1;
                    self.column = 1;
                } else {
                    self.column += 1;
                }
                c
            }
            None => '\0',
        }
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.peek() != expected {
            false
        } else {
            self.advance();
            true
        }
    }

    fn peek(&self) -> char {
        self.source.get(self.current).copied().unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        self.source.get(self.current + 1).copied().unwrap_or('\0')
    }

    fn skip_line(&mut self) {
        while self.peek() != '\n' && !self.is_at_end() {
            self.advance();
        }
    }

    fn skip_to_whitespace(&mut self) {
        while !self.is_at_end() && !self.peek().is_whitespace() {
            self.advance();
        }
    }

    fn current_span(&self) -> Span {
        Span::new(self.start, self.current, self.start_line, self.start_column)
    }

    fn block_comment(&mut self) -> Option<Diagnostic> {
        loop {
            if self.is_at_end() {
                return Some(
                    Diagnostic::lexical(
                        ErrorCode::UnterminatedComment,
                        self.current_span(),
                        "Unterminated block comment".to_string(),
                    )
                    .with_help("Block comments opened with '/*' must be closed with '*/'."),
                );
            }
            if self.peek() == '*' && self.peek_next() == '/' {
                self.advance();
                self.advance();
                return None;
            }
            self.advance();
        }
    }

    fn string(&mut self) -> Result<Token, Diagnostic> {
        let mut value = String::new();

        loop {
            if self.is_at_end() || self.peek() == '\n' {
                // Resume scanning at the line boundary.
                return Err(Diagnostic::lexical(
                    ErrorCode::UnterminatedString,
                    self.current_span(),
                    "Unterminated string".to_string(),
                )
                .with_help("Strings must be closed with '\"' on the same line."));
            }

            match self.advance() {
                '"' => break,
                '\\' => {
                    if self.is_at_end() || self.peek() == '\n' {
                        continue;
                    }
                    match self.advance() {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '"' => value.push('"'),
                        '\\' => value.push('\\'),
                        other => {
                            value.push('\\');
                            value.push(other);
                        }
                    }
                }
                c => value.push(c),
            }
        }

        Ok(self.add_token_with_content(TokenType::String, value))
    }

    fn number(&mut self) -> Result<Token, Diagnostic> {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        // Look for fractional part
        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let text: String = self.source[self.start..self.current].iter().collect();
        match text.parse::<f64>() {
            Ok(value) if value.is_finite() => {
                Ok(self.add_token_with_content(TokenType::Number, text))
            }
            _ => Err(Diagnostic::lexical(
                ErrorCode::NumberOutOfRange,
                self.current_span(),
                format!("Number literal '{}' is outside the representable range", text),
            )),
        }
    }

    fn identifier(&mut self) -> Token {
        while self.peek().is_alphanumeric() || self.peek() == '_' {
            self.advance();
        }

        let text: String = self.source[self.start..self.current].iter().collect();
        let token_type = self
            .keywords
            .get(text.to_lowercase().as_str())
            .copied()
            .unwrap_or(TokenType::Identifier);

        self.add_token_with_content(token_type, text)
    }

    fn add_token(&mut self, token_type: TokenType) -> Token {
        let text: String = self.source[self.start..self.current].iter().collect();
        self.add_token_with_content(token_type, text)
    }

    fn add_token_with_content(&mut self, token_type: TokenType, lexeme: String) -> Token {
        self.previous = Some(token_type);
        Token::new(token_type, lexeme, self.current_span())
    }
}

impl Iterator for Lexer {
    type Item = Result<Token, Diagnostic>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            self.start = self.current;
            self.start_line = self.line;
            self.start_column = self.column;

            if self.is_at_end() {
                self.finished = true;
                return Some(Ok(self.add_token_with_content(TokenType::Eof, String::new())));
            }

            if let Some(item) = self.scan_token() {
                if item.is_err() {
                    self.previous = Some(TokenType::Error);
                }
                return Some(item);
            }
        }
    }
}

/// Tokenizes a whole source text, recording lexical errors into `errors`.
pub fn tokenize(source: &str, errors: &mut ErrorCollector) -> Vec<Token> {
    Lexer::new(source).scan_tokens(errors)
}
