//! hashstore CLI - Command line interface for hashstore
//!
//! Every command opens the store named by `--store`, runs one operation and
//! closes it again. Results are printed as JSON.

use clap::{Parser, Subcommand};
use hashstore::{open_address, BlobStore, PutOptions, Store};
use std::io::Read;
use std::ops::ControlFlow;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hashstore")]
#[command(about = "An ordered blob store on a hash-indexed log")]
#[command(version)]
struct Cli {
    /// Store address, e.g. //path/to/dir?sync=10s&compact=1m
    #[arg(short, long, env = "HASHSTORE_ADDR", default_value = "blobs")]
    store: String,

    /// Output format (json or text)
    #[arg(short, long, default_value = "json")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a blob under a key
    Put {
        /// The key
        key: String,
        /// The value; read from --file or stdin when omitted
        value: Option<String>,
        /// Read the value from a file
        #[arg(long, conflicts_with = "value")]
        file: Option<PathBuf>,
        /// Overwrite an existing value
        #[arg(short, long)]
        replace: bool,
    },

    /// Fetch the blob stored under a key
    Get {
        /// The key
        key: String,
        /// Always print the value as hex
        #[arg(long)]
        hex: bool,
        /// Write the raw value to a file instead of printing it
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Delete a key
    Delete {
        /// The key
        key: String,
    },

    /// List keys in ascending order
    List {
        /// Only list keys at or after this one
        #[arg(long, default_value = "")]
        start: String,
        /// Maximum number of keys to return
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Count the keys in the store
    Len,

    /// Show log size and fragmentation
    Stats,

    /// Rewrite the log without dead records
    Compact,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let cli = Cli::parse();
    let store = open_address(&cli.store)?;

    match cli.command {
        Commands::Put {
            key,
            value,
            file,
            replace,
        } => {
            let data = match (value, file) {
                (Some(value), _) => value.into_bytes(),
                (None, Some(path)) => std::fs::read(&path)?,
                (None, None) => {
                    let mut buf = Vec::new();
                    std::io::stdin().read_to_end(&mut buf)?;
                    buf
                }
            };
            store.put(PutOptions::new(&key, &data).replace(replace))?;
            output(
                &cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "key": key,
                    "size": data.len()
                }),
            );
        }

        Commands::Get { key, hex, out } => {
            let data = match store.get(&key) {
                Ok(data) => data,
                Err(e) if e.is_not_found() => {
                    output(
                        &cli.format,
                        &serde_json::json!({
                            "status": "error",
                            "message": e.to_string()
                        }),
                    );
                    store.close()?;
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            };

            if let Some(path) = out {
                std::fs::write(&path, &data)?;
                output(
                    &cli.format,
                    &serde_json::json!({
                        "status": "ok",
                        "key": key,
                        "size": data.len(),
                        "path": path.display().to_string()
                    }),
                );
            } else {
                let (encoding, value) = match std::str::from_utf8(&data) {
                    Ok(text) if !hex => ("utf8", text.to_string()),
                    _ => ("hex", hex::encode(&data)),
                };
                output(
                    &cli.format,
                    &serde_json::json!({
                        "key": key,
                        "size": data.len(),
                        "encoding": encoding,
                        "value": value
                    }),
                );
            }
        }

        Commands::Delete { key } => {
            store.delete(&key)?;
            output(
                &cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "key": key
                }),
            );
        }

        Commands::List { start, limit } => {
            let keys = list_keys(&store, &start, limit)?;
            output(
                &cli.format,
                &serde_json::json!({
                    "count": keys.len(),
                    "keys": keys
                }),
            );
        }

        Commands::Len => {
            output(
                &cli.format,
                &serde_json::json!({
                    "count": store.len()?
                }),
            );
        }

        Commands::Stats => {
            output(&cli.format, &serde_json::to_value(store.engine().stats())?);
        }

        Commands::Compact => {
            let result = store.engine().compact()?;
            output(&cli.format, &serde_json::to_value(result)?);
        }
    }

    store.close()?;
    Ok(())
}

fn list_keys(store: &Store, start: &str, limit: Option<usize>) -> anyhow::Result<Vec<String>> {
    let mut keys = Vec::new();
    store.list(start, |key| {
        if limit.is_some_and(|limit| keys.len() >= limit) {
            return Ok::<_, anyhow::Error>(ControlFlow::Break(()));
        }
        keys.push(key.to_string());
        Ok(ControlFlow::Continue(()))
    })?;
    Ok(keys)
}

fn output(format: &OutputFormat, value: &serde_json::Value) {
    let text = match format {
        OutputFormat::Json => serde_json::to_string(value),
        OutputFormat::Text => serde_json::to_string_pretty(value),
    };
    // Serializing a Value cannot fail
    println!("{}", text.unwrap_or_default());
}
