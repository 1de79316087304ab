/// PromptL command line tool

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use promptl_compiler::{read_metadata, FsResolver, MetadataOptions};
use promptl_eval::{compile, Chain, ChainError, CompileError, Parameters, Value};
use promptl_parser::ast_dump::dump_template;

#[derive(Parser, Debug)]
#[command(name = "promptl")]
#[command(about = "Compile and inspect PromptL prompts")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a prompt into a conversation; references are read from the
    /// prompt's directory
    Compile {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Parameters as a JSON object
        #[arg(short, long, value_name = "JSON")]
        params: Option<String>,
    },

    /// Print the metadata of a prompt; references are read from the
    /// prompt's directory
    Metadata {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// JSON schema the prompt config is validated against
        #[arg(short, long, value_name = "FILE")]
        schema: Option<PathBuf>,
    },

    /// Run a multi-step prompt, reading each assistant response from stdin
    Chain {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Parameters as a JSON object
        #[arg(short, long, value_name = "JSON")]
        params: Option<String>,
    },

    /// Print the syntax tree of a prompt
    Parse {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

fn read_file(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Error reading file '{}'", path.display()))
}

fn parse_parameters(params: Option<&str>) -> anyhow::Result<Parameters> {
    let Some(params) = params else {
        return Ok(Parameters::new());
    };
    match serde_json::from_str(params).context("Invalid --params JSON")? {
        JsonValue::Object(object) => Ok(object
            .into_iter()
            .map(|(name, value)| (name, Value::from(value)))
            .collect()),
        _ => bail!("--params must be a JSON object"),
    }
}

/// Where a prompt file's references are read from, and its own path
/// among them.
fn prompt_location(file: &Path) -> (FsResolver, String) {
    let root = file.parent().map(Path::to_path_buf).unwrap_or_default();
    let path = file
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    (FsResolver::new(root), path)
}

/// Prefix a compile error with the file and position it points at. An
/// error raised inside a referenced prompt names that prompt's file.
fn located(file: &Path, err: CompileError) -> anyhow::Error {
    let origin = match &err.prompt_path {
        Some(path) => prompt_location(file).0.file_path(path),
        None => file.to_path_buf(),
    };
    match err.line_column() {
        Some((line, column)) => anyhow!("{}:{}:{}: {}", origin.display(), line, column, err),
        None => anyhow!("{}: {}", origin.display(), err),
    }
}

/// The prompt text with every `<ref>` inlined, read relative to the file.
async fn resolve_references(file: &Path, source: &str) -> anyhow::Result<String> {
    let (resolver, path) = prompt_location(file);
    let options = MetadataOptions::new().resolver(resolver).path(path);
    let metadata = read_metadata(source, &options)
        .await
        .map_err(|err| located(file, err))?;
    Ok(metadata.resolved_prompt)
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_chain(file: &Path, source: &str, parameters: Parameters) -> anyhow::Result<()> {
    let mut chain = Chain::new(source, parameters).map_err(|err| chain_error(file, err))?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut response: Option<String> = None;

    loop {
        let result = chain
            .step(response.as_deref())
            .map_err(|err| chain_error(file, err))?;
        print_json(&result.conversation)?;
        if result.completed {
            info!("chain completed");
            return Ok(());
        }

        eprintln!("Waiting for the assistant response (one line):");
        match lines.next_line().await? {
            Some(line) => response = Some(line),
            None => bail!("stdin closed before the chain completed"),
        }
    }
}

fn chain_error(file: &Path, err: ChainError) -> anyhow::Error {
    match err {
        ChainError::Compile(err) => located(file, err),
        other => other.into(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match args.command {
        Command::Compile { file, params } => {
            let source = read_file(&file)?;
            let parameters = parse_parameters(params.as_deref())?;
            info!(file = %file.display(), parameters = parameters.len(), "compiling prompt");
            let prompt = resolve_references(&file, &source).await?;
            let conversation = compile(&prompt, parameters).map_err(|err| located(&file, err))?;
            print_json(&conversation)?;
        }

        Command::Metadata { file, schema } => {
            let source = read_file(&file)?;
            let (resolver, path) = prompt_location(&file);
            let mut options = MetadataOptions::new().resolver(resolver).path(path);
            if let Some(schema) = schema {
                let schema: JsonValue = serde_json::from_str(&read_file(&schema)?)
                    .with_context(|| format!("Invalid schema in '{}'", schema.display()))?;
                options = options.config_schema(schema);
            }

            info!(file = %file.display(), "reading metadata");
            let metadata = read_metadata(&source, &options)
                .await
                .map_err(|err| located(&file, err))?;
            print_json(&metadata)?;
        }

        Command::Chain { file, params } => {
            let source = read_file(&file)?;
            let parameters = parse_parameters(params.as_deref())?;
            info!(file = %file.display(), "starting chain");
            let prompt = resolve_references(&file, &source).await?;
            run_chain(&file, &prompt, parameters).await?;
        }

        Command::Parse { file } => {
            let source = read_file(&file)?;
            let template = promptl_parser::parse(&source).map_err(|err| located(&file, err))?;
            println!("{}", dump_template(&template));
        }
    }
    Ok(())
}
