use crate::options::RunOptions;
use crate::runner::run;
use std::io::{self, Write};

/// Interactive loop. Every line is an independent program: nothing carries
/// over from one line to the next.
pub fn start(options: &RunOptions) {
    println!("SMIA Interpreter v{}", env!("CARGO_PKG_VERSION"));
    println!("Each line runs as its own program. Type 'exit' or press Ctrl+D to quit");
    println!();

    loop {
        print!("> ");
        if let Err(error) = io::stdout().flush() {
            eprintln!("Error writing prompt: {}", error);
            break;
        }

        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) => {
                // EOF reached (Ctrl+D or piped input ended)
                println!();
                break;
            }
            Ok(_) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "exit" || line == "quit" {
                    println!("Goodbye!");
                    break;
                }

                run_repl_command(line, options);
            }
            Err(error) => {
                eprintln!("Error reading input: {}", error);
                break;
            }
        }
    }
}

fn run_repl_command(source: &str, options: &RunOptions) {
    let output = run(source, options);

    for line in &output.console {
        println!("{}", line);
    }
    for diagnostic in &output.errors {
        if diagnostic.report(source, None).is_err() {
            eprintln!("{}", diagnostic);
        }
    }
}
