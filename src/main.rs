//! flowview CLI
//!
//! Usage:
//!   flowview [OPTIONS] [CONTENT]
//!
//! Options:
//!   -d, --data <FILE>           Data model the content binds to (JSON)
//!   -c, --config <FILE>         Engine configuration (TOML format)
//!   -a, --async-content <FILE>  Answers for async placeholders, keyed by id (JSON)
//!   -p, --pretty                Pretty-print the output
//!   -h, --help                  Print help

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use clap::Parser;
use env_logger::Env;
use log::debug;
use serde_json::{Map, Value};

use flowview::{
    AsyncError, AsyncNode, AsyncUpdater, EngineConfig, JsonModel, Services, ViewBuilder,
};

#[derive(Parser)]
#[command(name = "flowview")]
#[command(about = "Resolve declarative view content against a data model")]
struct Cli {
    /// Content file (reads from stdin if not provided)
    content: Option<PathBuf>,

    /// Data model the content binds to (JSON)
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Engine configuration (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Answers for async placeholders, as a JSON object keyed by id
    #[arg(short, long)]
    async_content: Option<PathBuf>,

    /// Pretty-print the output
    #[arg(short, long)]
    pretty: bool,
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match EngineConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading config '{}': {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => EngineConfig::default(),
    };

    let content = match &cli.content {
        Some(path) => read_json(path),
        None => {
            let mut buffer = String::new();
            if let Err(e) = io::stdin().read_to_string(&mut buffer) {
                eprintln!("Error reading from stdin: {}", e);
                std::process::exit(1);
            }
            match serde_json::from_str(&buffer) {
                Ok(content) => content,
                Err(e) => {
                    eprintln!("Error parsing content from stdin: {}", e);
                    std::process::exit(1);
                }
            }
        }
    };

    let data = cli.data.as_deref().map_or(Value::Object(Map::new()), read_json);
    let answers = match cli.async_content.as_deref().map(read_json) {
        Some(Value::Object(answers)) => answers,
        Some(_) => {
            eprintln!("Error: async content must be a JSON object keyed by id");
            std::process::exit(1);
        }
        None => Map::new(),
    };

    let model = Rc::new(JsonModel::new(data));
    let answer = move |node: &AsyncNode, updater: AsyncUpdater| -> Result<(), AsyncError> {
        debug!("answering async placeholder '{}'", node.id);
        updater.update(answers.get(&node.id).cloned())?;
        Ok(())
    };

    let view = ViewBuilder::new(Services::with_model(model))
        .with_config(config)
        .with_async_handler(answer)
        .build(&content);
    let mut view = match view {
        Ok(view) => view,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let output = match view.run_until_idle() {
        Ok(output) => output.map_or(Value::Null, |value| (*value).clone()),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let printed = if cli.pretty {
        serde_json::to_string_pretty(&output)
    } else {
        serde_json::to_string(&output)
    };
    match printed {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn read_json(path: &Path) -> Value {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error reading file '{}': {}", path.display(), e);
            std::process::exit(1);
        }
    };
    match serde_json::from_str(&source) {
        Ok(value) => value,
        Err(e) => {
            eprintln!("Error parsing '{}': {}", path.display(), e);
            std::process::exit(1);
        }
    }
}
