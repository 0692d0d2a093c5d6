use ariadne::{Color, Fmt, Label, Report, ReportKind, Source};
use serde::Serialize;
use std::fmt;
use std::io;
use thiserror::Error;

/// Source location of a token or node.
///
/// `start`/`end` are character offsets into the source text; `line` and
/// `column` (both starting at one) locate `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// Span covering `self` up to the end of `other`.
    pub fn to(&self, other: &Span) -> Self {
        Self {
            start: self.start,
            end: other.end.max(self.end),
            line: self.line,
            column: self.column,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Lexical,
    Syntactic,
    Semantic,
    Runtime,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Lexical => "lexical",
            Severity::Syntactic => "syntactic",
            Severity::Semantic => "semantic",
            Severity::Runtime => "runtime",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Lexical
    InvalidCharacter,
    UnterminatedString,
    UnterminatedComment,
    NumberOutOfRange,

    // Syntactic
    UnexpectedToken,
    ExpectedExpression,
    InvalidAssignmentTarget,
    RecursionLimit,

    // Semantic
    UndeclaredIdentifier,
    Redeclaration,
    TypeMismatch,
    NotCallable,
    ArityMismatch,
    ReturnOutsideProcedure,

    // Runtime
    DivByZero,
    IndexOutOfRange,
    UndefinedProcedure,
    FaultCeiling,
    StepLimit,
    Cancelled,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidCharacter => "INVALID_CHARACTER",
            ErrorCode::UnterminatedString => "UNTERMINATED_STRING",
            ErrorCode::UnterminatedComment => "UNTERMINATED_COMMENT",
            ErrorCode::NumberOutOfRange => "NUMBER_OUT_OF_RANGE",
            ErrorCode::UnexpectedToken => "UNEXPECTED_TOKEN",
            ErrorCode::ExpectedExpression => "EXPECTED_EXPRESSION",
            ErrorCode::InvalidAssignmentTarget => "INVALID_ASSIGNMENT_TARGET",
            ErrorCode::RecursionLimit => "RECURSION_LIMIT",
            ErrorCode::UndeclaredIdentifier => "UNDECLARED_IDENTIFIER",
            ErrorCode::Redeclaration => "REDECLARATION",
            ErrorCode::TypeMismatch => "TYPE_MISMATCH",
            ErrorCode::NotCallable => "NOT_CALLABLE",
            ErrorCode::ArityMismatch => "ARITY_MISMATCH",
            ErrorCode::ReturnOutsideProcedure => "RETURN_OUTSIDE_PROCEDURE",
            ErrorCode::DivByZero => "DIV_BY_ZERO",
            ErrorCode::IndexOutOfRange => "INDEX_OUT_OF_RANGE",
            ErrorCode::UndefinedProcedure => "UNDEFINED_PROCEDURE",
            ErrorCode::FaultCeiling => "FAULT_CEILING",
            ErrorCode::StepLimit => "STEP_LIMIT",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the error table.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("{severity} error {code} at {line}:{column}: {message}")]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: ErrorCode,
    pub message: String,
    pub line: usize,
    pub column: usize,
    #[serde(skip)]
    pub span: Span,
    #[serde(skip)]
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, code: ErrorCode, span: Span, message: String) -> Self {
        Self {
            severity,
            code,
            message,
            line: span.line,
            column: span.column,
            span,
            help: None,
        }
    }

    pub fn lexical(code: ErrorCode, span: Span, message: String) -> Self {
        Self::new(Severity::Lexical, code, span, message)
    }

    pub fn syntactic(code: ErrorCode, span: Span, message: String) -> Self {
        Self::new(Severity::Syntactic, code, span, message)
    }

    pub fn semantic(code: ErrorCode, span: Span, message: String) -> Self {
        Self::new(Severity::Semantic, code, span, message)
    }

    pub fn runtime(code: ErrorCode, span: Span, message: String) -> Self {
        Self::new(Severity::Runtime, code, span, message)
    }

    /// Catch-all for faults of the interpreter itself; there is no source
    /// position to blame.
    pub fn internal(message: String) -> Self {
        Self::new(
            Severity::Runtime,
            ErrorCode::InternalError,
            Span::default(),
            message,
        )
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn report(&self, source: &str, filename: Option<&str>) -> io::Result<()> {
        let filename = filename.unwrap_or("<repl>");

        let color = match self.severity {
            Severity::Lexical => Color::Red,
            Severity::Syntactic => Color::Yellow,
            Severity::Semantic => Color::Blue,
            Severity::Runtime => Color::Magenta,
        };

        let kind_str = match self.severity {
            Severity::Lexical => "Lexical Error",
            Severity::Syntactic => "Syntax Error",
            Severity::Semantic => "Semantic Error",
            Severity::Runtime => "Runtime Error",
        };

        let mut report_builder = Report::build(ReportKind::Error, filename, self.span.start)
            .with_code(self.code.as_str())
            .with_message(format!("{}: {}", kind_str.fg(color), self.message))
            .with_label(
                Label::new((filename, self.span.start..self.span.end))
                    .with_message(&self.message)
                    .with_color(color),
            );

        if let Some(ref help_text) = self.help {
            report_builder =
                report_builder.with_note(format!("{}: {}", "help".fg(Color::Cyan), help_text));
        }

        report_builder
            .finish()
            .eprint((filename, Source::from(source)))
    }
}

/// Append-only error table of one invocation.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    entries: Vec<Diagnostic>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: Diagnostic) {
        log::trace!("recorded {}", entry);
        self.entries.push(entry);
    }

    pub fn drain(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.entries)
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
