use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use storage::{codec_for, FileContextStore, StorageBackend, Value};
use tracing::{error, info};

/// Inspect and edit a file-backed context store.
#[derive(Debug, Parser)]
#[command(name = "storectl", version)]
struct Cli {
    /// Host data folder (overrides storage.data_dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Emit JSON logs instead of compact text
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List all contexts
    Contexts,
    /// List the top-level keys of a context
    Keys { context: String },
    /// Print the value stored under a key as JSON
    Get { context: String, key: String },
    /// Store a value; the argument is parsed as JSON, falling back to a plain string
    Set { context: String, key: String, value: String },
    /// Exit successfully if the key is set
    Exists { context: String, key: String },
    /// Delete a whole context
    Rm { context: String },
    /// Delete one key from a context
    RmKey { context: String, key: String },
}

fn init_logging(json: bool) {
    // 提前加载 .env，使得 RUST_LOG 等环境变量生效
    dotenv().ok();
    if json {
        common::utils::logging::init_logging_json();
    } else {
        common::utils::logging::init_logging_default();
    }
}

fn open_store(cli: &Cli) -> anyhow::Result<FileContextStore> {
    let cfg = configs::AppConfig::load_and_validate().context("loading configuration")?;
    let data_dir = match &cli.data_dir {
        Some(dir) => dir.clone(),
        None => common::env::ensure_data_dir(&cfg.storage.data_dir)?,
    };
    let store = FileContextStore::new()
        .with_storage_dir_name(cfg.storage.storage_dir_name.clone())
        .with_codec(codec_for(&cfg.storage.format)?)
        .with_key_separator(cfg.storage.key_separator_char());
    store.initialize(&data_dir)?;
    info!(event = "store_open", data_dir = %data_dir.display(), format = %cfg.storage.format, "storage opened");
    Ok(store)
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::from(raw))
}

fn sorted(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut items: Vec<String> = items.into_iter().collect();
    items.sort();
    items
}

fn run(cli: &Cli) -> anyhow::Result<ExitCode> {
    let store = open_store(cli)?;
    match &cli.command {
        Command::Contexts => {
            for context in sorted(store.list_contexts()?) {
                println!("{context}");
            }
        }
        Command::Keys { context } => {
            for key in sorted(store.list_keys(context)?) {
                println!("{key}");
            }
        }
        Command::Get { context, key } => match store.load(context, key)? {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => {
                eprintln!("{context}/{key}: not found");
                return Ok(ExitCode::from(2));
            }
        },
        Command::Set { context, key, value } => {
            store.save(context, key, parse_value(value))?;
        }
        Command::Exists { context, key } => {
            if !store.exists(context, key)? {
                return Ok(ExitCode::from(1));
            }
        }
        Command::Rm { context } => store.delete(context)?,
        Command::RmKey { context, key } => store.delete_key(context, key)?,
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            error!(service = "storectl", event = "command_failed", error = %format!("{e:#}"), "command failed");
            ExitCode::FAILURE
        }
    }
}
