//! MyLang CLI
//!
//! Command-line interface for the MyLang scripting language.

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use colored::*;
use mylang::config::RunOptions;
use mylang::environment::Environment;
use mylang::lexer::Lexer;
use mylang::parser::parse_source;
use mylang::{Interpreter, MyLangError, Value};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::fs;
use std::path::{Path, PathBuf};

/// The parser recurses once per nesting level of the source
const INTERPRETER_STACK_SIZE: usize = 256 * 1024 * 1024;

#[derive(Parser)]
#[command(name = "mylang")]
#[command(author = "MyLang Team")]
#[command(version)]
#[command(about = "MyLang - a small dynamically-typed scripting language", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Source file to execute
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Re-evaluate every import instead of caching modules
    #[arg(long, global = true, env = "MYLANG_NO_CACHE")]
    no_cache: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive REPL
    Repl,
    /// Run a MyLang source file
    Run {
        /// The source file to run
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Arguments exposed to the script as `process.argv`
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
        args: Vec<String>,
    },
    /// Parse and display the AST
    Parse {
        /// The source file to parse
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Tokenize and display tokens
    Lex {
        /// The source file to tokenize
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Check source for errors without running
    Check {
        /// The source file to check
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let result = std::thread::Builder::new()
        .name("mylang".to_string())
        .stack_size(INTERPRETER_STACK_SIZE)
        .spawn(move || dispatch(cli))
        .map_err(anyhow::Error::from)
        .and_then(|handle| {
            handle
                .join()
                .map_err(|_| anyhow!("interpreter thread panicked"))?
        });

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn dispatch(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Repl) => run_repl(cli.no_cache),
        Some(Commands::Run { file, args }) => run_file(&file, args, cli.no_cache),
        Some(Commands::Parse { file, json }) => parse_file(&file, json),
        Some(Commands::Lex { file }) => lex_file(&file),
        Some(Commands::Check { file }) => check_file(&file),
        None => {
            if let Some(file) = cli.file {
                run_file(&file, Vec::new(), cli.no_cache)
            } else {
                run_repl(cli.no_cache)
            }
        }
    }
}

/// Language errors hold `Rc` values, so they are rendered rather than boxed
fn report(e: MyLangError) -> anyhow::Error {
    anyhow!("{}", e)
}

fn read_source(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))
}

fn run_repl(no_cache: bool) -> anyhow::Result<()> {
    println!(
        "{}",
        format!("MyLang v{}", env!("CARGO_PKG_VERSION")).green().bold()
    );
    println!("Type {} for help, {} to exit\n", ":help".cyan(), ":quit".cyan());

    let mut options = RunOptions::for_repl(&std::env::current_dir()?);
    options.disable_cache = no_cache;

    let mut rl = DefaultEditor::new()?;
    let mut interpreter = Interpreter::new(options.clone());

    loop {
        let readline = rl.readline(&format!("{} ", "mylang>".blue().bold()));
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                // Handle REPL commands
                if line.starts_with(':') {
                    let (command, argument) = line.split_once(' ').unwrap_or((line, ""));
                    match command {
                        ":quit" | ":q" | ":exit" => {
                            println!("Goodbye!");
                            break;
                        }
                        ":help" | ":h" => print_repl_help(),
                        ":clear" => {
                            interpreter = Interpreter::new(options.clone());
                            println!("Environment cleared.");
                        }
                        ":env" => print_environment(&interpreter),
                        ":load" if !argument.trim().is_empty() => {
                            match load_file(&mut interpreter, Path::new(argument.trim())) {
                                Ok(()) => println!("Loaded {}", argument.trim()),
                                Err(e) => println!("{}: {}", "Error".red(), e),
                            }
                        }
                        _ => println!("{}: Unknown command: {}", "Error".red(), line),
                    }
                    continue;
                }

                match evaluate(&mut interpreter, line) {
                    Ok(Some(result)) => println!("{}", result.green()),
                    Ok(None) => {}
                    Err(e) => println!("{}: {}", "Error".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    Ok(())
}

fn print_repl_help() {
    println!("{}", "\nREPL Commands:".yellow().bold());
    println!("  {}    - Show this help message", ":help, :h".cyan());
    println!("  {} - Exit the REPL", ":quit, :q, :exit".cyan());
    println!("  {}   - Clear the environment", ":clear".cyan());
    println!("  {}     - Show current environment bindings", ":env".cyan());
    println!("  {} - Run a file and merge its bindings", ":load FILE".cyan());
    println!();
    println!("{}", "Basics:".yellow().bold());
    println!("  {}        - Variable binding", "var x = 42".cyan());
    println!("  {}    - Constant binding", "var y = 1 as const".cyan());
    println!("  {} - Function definition", "func add(a, b = 1) { return a + b }".cyan());
    println!("  {}  - Enum", "enum Color { Red; Green; Blue }".cyan());
    println!("  {} - For-in loop", "for (var x in [1, 2, 3]) { io.println(x) }".cyan());
    println!();
    println!("{}", "Modules:".yellow().bold());
    println!("  {}      - Built-in library", r#"import "io""#.cyan());
    println!("  {} - File module with alias", r#"import (m: "./math.ml")"#.cyan());
    println!(
        "  {} - Libraries: io, array, object, json",
        "Standard Library".cyan()
    );
    println!();
}

/// Evaluate one REPL line; the session scope is restored if it fails
fn evaluate(interpreter: &mut Interpreter, source: &str) -> anyhow::Result<Option<String>> {
    let program = parse_source(source).map_err(report)?;

    let globals = interpreter.globals();
    let snapshot = Environment::deep_clone(&globals);
    let result = interpreter
        .eval(&program, &globals)
        .and_then(|value| interpreter.drain_tasks().map(|_| value));

    match result {
        Ok(Value::Nil) => Ok(None),
        Ok(value) => Ok(Some(value.repr())),
        Err(e) => {
            interpreter.set_globals(snapshot);
            Err(anyhow!("{}", e))
        }
    }
}

fn load_file(interpreter: &mut Interpreter, path: &Path) -> anyhow::Result<()> {
    let source = read_source(path)?;
    let program = parse_source(&source).map_err(report)?;
    let file = path
        .canonicalize()
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string();

    let root = interpreter
        .eval_file(&program, &file)
        .map_err(|e| anyhow!("{}", e))?;
    interpreter.drain_tasks().map_err(|e| anyhow!("{}", e))?;

    let merged = Environment::combine(&interpreter.globals(), &root);
    interpreter.set_globals(merged);
    Ok(())
}

fn print_environment(interpreter: &Interpreter) {
    let globals = interpreter.globals();
    let env = globals.borrow();
    for key in env.keys() {
        if key.starts_with('#') || key == "import" || key == "process" {
            continue;
        }
        if let Ok(value) = env.get(&key) {
            println!("  {} = {}", key.cyan(), value.repr());
        }
    }
}

fn run_file(path: &Path, args: Vec<String>, no_cache: bool) -> anyhow::Result<()> {
    let source = read_source(path)?;

    let mut options = RunOptions::for_file(path).map_err(report)?;
    options.args = args;
    if no_cache {
        options.disable_cache = true;
    }

    let mut interpreter = Interpreter::new(options);
    interpreter.run_source(&source).map_err(report)?;
    Ok(())
}

fn parse_file(path: &Path, json: bool) -> anyhow::Result<()> {
    let source = read_source(path)?;
    let program = parse_source(&source).map_err(report)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&program)?);
    } else {
        println!("{:#?}", program);
    }

    Ok(())
}

fn lex_file(path: &Path) -> anyhow::Result<()> {
    let source = read_source(path)?;
    let output = Lexer::analyze(&source);

    for token in &output.tokens {
        println!(
            "{:>8}  {:<16} {}",
            token.position.to_string().dimmed(),
            format!("{:?}", token.kind),
            token.value
        );
    }

    if output.errors.is_empty() {
        return Ok(());
    }
    for error in &output.errors {
        eprintln!("{}", error.to_string().red());
    }
    Err(anyhow!("{} lexical error(s)", output.errors.len()))
}

fn check_file(path: &Path) -> anyhow::Result<()> {
    let source = read_source(path)?;
    parse_source(&source).map_err(report)?;

    println!("{} No errors found in {}", "✓".green(), path.display());
    Ok(())
}
