//! Print the syntax tree of a PromptL template, or of a single embedded
//! expression with `--expr`.

use std::env;
use std::fs;
use std::process;
use std::sync::Arc;

use promptl_parser::ast_dump::{dump_expression, dump_template};
use promptl_parser::{parse, parse_expression, CompileError};

fn usage(program: &str) -> ! {
    eprintln!("Usage: {} <file.promptl>", program);
    eprintln!("       {} --expr <expression>", program);
    process::exit(2);
}

fn report(origin: &str, err: &CompileError) -> ! {
    match err.line_column() {
        Some((line, column)) => eprintln!("{}:{}:{}: {}", origin, line, column, err),
        None => eprintln!("{}: {}", origin, err),
    }
    if let Some(line) = err.source_line() {
        eprintln!("    {}", line);
    }
    process::exit(1);
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("promptl-parser");

    let dump = match args.get(1..).unwrap_or_default() {
        [flag, expression] if flag == "--expr" => match parse_expression(expression) {
            Ok(expression) => dump_expression(&expression),
            Err(err) => report("<expr>", &err.with_source(&Arc::from(expression.as_str()))),
        },
        [file] if !file.starts_with('-') => {
            let input = fs::read_to_string(file).unwrap_or_else(|e| {
                eprintln!("Error reading file '{}': {}", file, e);
                process::exit(1);
            });
            match parse(&input) {
                Ok(template) => dump_template(&template),
                Err(err) => report(file, &err),
            }
        }
        _ => usage(program),
    };
    println!("{}", dump);
}
