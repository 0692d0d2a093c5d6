use crate::checker::Checker;
use crate::error::{Diagnostic, ErrorCollector};
use crate::evaluator::Evaluator;
use crate::lexer;
use crate::options::RunOptions;
use crate::parser::Parser;
use log::{debug, error, trace, warn};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Everything one invocation produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutput {
    /// Lines written by `print`, in order.
    pub console: Vec<String>,
    /// Every diagnostic from every stage, in the order they were found.
    pub errors: Vec<Diagnostic>,
}

impl RunOutput {
    pub fn console_text(&self) -> String {
        self.console.join("\n")
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&Response::from(self))
    }
}

/// JSON request body: `{"entrada": "<source>"}`.
#[derive(Debug, Deserialize)]
pub struct Request {
    pub entrada: String,
}

/// JSON response body: `{"consola": "...", "tablaError": [...]}`.
#[derive(Debug, Serialize)]
pub struct Response<'a> {
    pub consola: String,
    #[serde(rename = "tablaError")]
    pub tabla_error: &'a [Diagnostic],
}

impl<'a> From<&'a RunOutput> for Response<'a> {
    fn from(output: &'a RunOutput) -> Self {
        Self {
            consola: output.console_text(),
            tabla_error: &output.errors,
        }
    }
}

/// Runs a program from source through every stage.
///
/// Never panics: a fault inside the interpreter is reported as an
/// `INTERNAL_ERROR` entry, keeping whatever output and errors were
/// produced before it.
pub fn run(source: &str, options: &RunOptions) -> RunOutput {
    contained(|errors, console| interpret(source, options, errors, console))
}

fn contained(stages: impl FnOnce(&mut ErrorCollector, &mut Vec<String>)) -> RunOutput {
    let mut errors = ErrorCollector::new();
    let mut console = Vec::new();

    // Rows and console lines recorded before a panic stay in the output.
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| stages(&mut errors, &mut console)));

    if let Err(payload) = outcome {
        let message = panic_message(&*payload);
        error!("internal fault while running program: {}", message);
        errors.record(Diagnostic::internal(format!(
            "Internal interpreter error: {}",
            message
        )));
    }

    RunOutput {
        console,
        errors: errors.drain(),
    }
}

/// Decodes a JSON request, runs it and encodes the response.
pub fn handle_request(body: &str, options: &RunOptions) -> serde_json::Result<String> {
    let request: Request = serde_json::from_str(body)?;
    run(&request.entrada, options).to_json()
}

fn interpret(
    source: &str,
    options: &RunOptions,
    errors: &mut ErrorCollector,
    console: &mut Vec<String>,
) {
    debug!("running program of {} characters", source.chars().count());

    let tokens = lexer::tokenize(source, errors);
    trace!("scanned {} tokens", tokens.len());

    let mut parser = Parser::new(tokens, errors).with_max_depth(options.max_nesting_depth);
    let program = match parser.parse() {
        Some(program) => program,
        None => {
            warn!("parsing abandoned at the nesting limit");
            return;
        }
    };
    debug!("parsed {} top-level statements", program.statements.len());

    let program = Checker::new(errors).check(program);

    let mut evaluator = Evaluator::new(errors, console, options);
    evaluator.execute(&program);

    debug!(
        "run finished with {} console lines and {} errors",
        console.len(),
        errors.len()
    );
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    }
}
