use argscript::diagnostics::{DocumentStructure, FragmentId};
use argscript::lexer::Lexer;
use argscript::{error, Stream};
use clap::Parser;
use colored::Colorize;
use std::fs;
use std::path::PathBuf;

/// Command line tools for the ArgScript language.
///
/// Scripts are checked against the standard directives (`set`, `if`,
/// `define`, `include`, ...); keywords a host application would add on top
/// are reported as unrecognised commands.
#[derive(Parser)]
#[clap(version)]
struct Cli {
    #[clap(subcommand)]
    sub_command: SubCommand,
}

#[derive(Parser)]
enum SubCommand {
    Check(Check),
    Eval(Eval),
    Tokenize(Tokenize),
}

/// Check an ArgScript file and report its diagnostics
#[derive(Parser)]
struct Check {
    /// Path to the script file
    file_path: PathBuf,
    /// Skip syntax highlighting and document structure collection
    #[arg(long)]
    fast: bool,
    /// Print the block outline of the document
    #[arg(long)]
    outline: bool,
}

/// Evaluate an ArgScript expression and print the result
#[derive(Parser)]
struct Eval {
    /// The expression, like "2 * (1 + 2)" or "hash(creature)"
    expression: String,
    /// Evaluate as a real number
    #[arg(long)]
    float: bool,
    /// Evaluate as a boolean
    #[arg(long = "bool")]
    boolean: bool,
}

/// Tokenize a single line and print its words and options
#[derive(Parser)]
struct Tokenize {
    /// The line text
    line: String,
}

fn main() {
    let args: Cli = Cli::parse();
    let result = match args.sub_command {
        SubCommand::Check(check_args) => check(check_args),
        SubCommand::Eval(eval_args) => eval(eval_args),
        SubCommand::Tokenize(tokenize_args) => tokenize(tokenize_args),
    };
    if let Err(err) = result {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn new_stream() -> Stream<()> {
    let mut stream = Stream::new(());
    argscript_stdlib::register_all(&mut stream);
    stream
}

fn check(args: Check) -> Result<(), String> {
    let text = fs::read_to_string(&args.file_path)
        .map_err(|err| format!("Failed to open file {:?}: {err}", args.file_path))?;

    let mut stream = new_stream();
    stream.set_fast_parsing(args.fast);
    if let Some(folder) = args.file_path.parent() {
        stream.set_folder(folder);
    }
    stream.process(&text);

    let mut report = String::new();
    error::write_report(&mut report, stream.errors(), stream.warnings())
        .map_err(|err| err.to_string())?;
    print!("{report}");

    if args.outline {
        let structure = stream.document_structure();
        for id in structure.roots() {
            print_fragment(structure, *id);
        }
    }

    if stream.errors().is_empty() {
        println!(
            "{}: {} error(s), {} warning(s)",
            "ok".bright_green().bold(),
            stream.errors().len(),
            stream.warnings().len()
        );
        Ok(())
    } else {
        Err(format!(
            "{} error(s), {} warning(s)",
            stream.errors().len(),
            stream.warnings().len()
        ))
    }
}

fn print_fragment(structure: &DocumentStructure, id: FragmentId) {
    let fragment = structure.get(id);
    let indent = "  ".repeat(fragment.level.saturating_sub(1));
    println!("{indent}{}", fragment.description);
    for child in fragment.children() {
        print_fragment(structure, *child);
    }
}

fn eval(args: Eval) -> Result<(), String> {
    let stream = new_stream();
    let chars: Vec<char> = args.expression.chars().collect();
    let context = stream.eval_context();
    let mut lexer = Lexer::new(&chars, stream.functions(), &context);

    let result = if args.boolean {
        lexer.parse_boolean().map(|value| value.to_string())
    } else if args.float {
        lexer.parse_float().map(|value| value.to_string())
    } else {
        lexer.parse_integer().map(|value| {
            if lexer.last_number_was_hexadecimal() {
                format!("{value:#x}")
            } else {
                value.to_string()
            }
        })
    };
    match result {
        Ok(value) => {
            println!("{value}");
            Ok(())
        }
        Err(diagnostic) => Err(diagnostic.to_string()),
    }
}

fn tokenize(args: Tokenize) -> Result<(), String> {
    let mut stream = new_stream();
    let line = match stream.generate_line(&args.line) {
        Some(line) => line,
        None => {
            let mut report = String::new();
            error::write_report(&mut report, stream.errors(), stream.warnings())
                .map_err(|err| err.to_string())?;
            return Err(report.trim_end().to_string());
        }
    };

    let chars: Vec<char> = args.line.chars().collect();
    for (i, split) in line.splits().iter().enumerate() {
        let role = if i == 0 && line.has_keyword() {
            "keyword"
        } else {
            "word"
        };
        println!("{:>8}  {split}", role.bold());
    }
    for (start, end) in line.option_spans() {
        let text: String = chars[start..end.min(chars.len())].iter().collect();
        println!("{:>8}  {text}", "option".bold());
    }
    Ok(())
}
