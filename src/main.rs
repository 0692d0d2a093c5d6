use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use smia::runner::Request;
use smia::{repl, run, RunOptions};
use std::fs;
use std::path::Path;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();

    let matches = Command::new("smia")
        .about("Interpreter for .smia scripts with a complete error table")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("file")
                .help("The script file to execute")
                .value_name("FILE")
                .index(1),
        )
        .arg(
            Arg::new("interactive")
                .short('i')
                .long("interactive")
                .help("Start in interactive REPL mode")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print the result as a {\"consola\", \"tablaError\"} JSON document")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("request")
                .long("request")
                .help("Read FILE as a JSON request of the form {\"entrada\": \"<source>\"}")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("fault-ceiling")
                .long("fault-ceiling")
                .value_name("N")
                .help("Stop after N consecutive runtime errors (0 never stops)")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("max-steps")
                .long("max-steps")
                .value_name("N")
                .help("Stop after executing N statements")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("max-depth")
                .long("max-depth")
                .value_name("N")
                .help("Maximum nesting depth of the source and of procedure calls")
                .value_parser(value_parser!(usize)),
        )
        .get_matches();

    let options = run_options(&matches);

    match matches.get_one::<String>("file") {
        Some(file_path) if !matches.get_flag("interactive") => run_file(
            file_path,
            &options,
            matches.get_flag("json"),
            matches.get_flag("request"),
        ),
        _ => {
            repl::start(&options);
            ExitCode::SUCCESS
        }
    }
}

fn run_options(matches: &ArgMatches) -> RunOptions {
    let mut options = RunOptions::default();
    if let Some(&ceiling) = matches.get_one::<usize>("fault-ceiling") {
        options.fault_ceiling = if ceiling == 0 { None } else { Some(ceiling) };
    }
    if let Some(&steps) = matches.get_one::<u64>("max-steps") {
        options.max_steps = Some(steps);
    }
    if let Some(&depth) = matches.get_one::<usize>("max-depth") {
        options.max_nesting_depth = depth;
        options.max_call_depth = depth;
    }
    options
}

fn run_file(path: &str, options: &RunOptions, json: bool, request: bool) -> ExitCode {
    let path = Path::new(path);

    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            eprintln!("Error reading file '{}': {}", path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let source = if request {
        match serde_json::from_str::<Request>(&contents) {
            Ok(request) => request.entrada,
            Err(e) => {
                eprintln!("Error: '{}' is not a valid request: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        contents
    };

    let output = run(&source, options);

    if json {
        match output.to_json() {
            Ok(document) => println!("{}", document),
            Err(e) => {
                eprintln!("Error encoding result: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        for line in &output.console {
            println!("{}", line);
        }
        for diagnostic in &output.errors {
            if diagnostic.report(&source, path.to_str()).is_err() {
                eprintln!("{}", diagnostic);
            }
        }
    }

    if output.has_errors() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
