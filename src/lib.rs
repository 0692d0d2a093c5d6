// SMIA Language Interpreter Library
//
// Lexer, parser, semantic checker and evaluator for .smia scripts. Every
// call to `run` is an independent invocation that returns the console
// output together with the full error table of all four stages.

// Public modules
pub mod ast;
pub mod checker;
pub mod error;
pub mod evaluator;
pub mod lexer;
pub mod options;
pub mod parser;
pub mod repl;
pub mod runner;
pub mod value;

// Re-export commonly used items
pub use ast::{Expr, Program, Stmt};
pub use checker::Checker;
pub use error::{Diagnostic, ErrorCode, ErrorCollector, Severity, Span};
pub use evaluator::Evaluator;
pub use lexer::{tokenize, Lexer, Token, TokenKind, TokenType};
pub use options::RunOptions;
pub use parser::Parser;
pub use value::Value;

// Re-export main functions
pub use repl::start as start_repl;
pub use runner::{handle_request, run, RunOutput};
