//! Strata CLI - read or follow a value from merged configuration files.

use std::{error::Error, path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use strata::{Config, File, Loader, decode_json, tracing_config};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "strata", version, about = "Read merged configuration files")]
struct Cli {
    /// Configuration file to load; later files take precedence
    #[arg(short, long = "file", required = true)]
    files: Vec<PathBuf>,

    /// Decode files as JSON instead of TOML
    #[arg(long)]
    json: bool,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the value at a path
    Get {
        /// Delimiter-separated path, empty for the whole tree
        #[arg(default_value = "")]
        path: String,
    },
    /// Print the value at a path every time it changes
    Watch {
        /// Delimiter-separated path, empty for the whole tree
        #[arg(default_value = "")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let _guard = match &cli.log_dir {
        Some(dir) => Some(tracing_config::init_with_file(dir)?),
        None => {
            tracing_config::init()?;
            None
        }
    };

    let config = Config::new();
    let loaders = cli.files.iter().map(|path| {
        let file = File::new(path);
        let file = if cli.json {
            file.with_unmarshal(decode_json)
        } else {
            file
        };
        Arc::new(file) as Arc<dyn Loader>
    });
    config.load_all(loaders)?;

    match cli.command {
        Command::Get { path } => {
            println!("{}", format_value(&config, &path));
        }
        Command::Watch { path } => {
            println!("{}", format_value(&config, &path));

            let printed = path.clone();
            config.on_change(
                Some(move |config: &Config| println!("{}", format_value(config, &printed))),
                &[path.as_str()],
            );

            let cancel = CancellationToken::new();
            let stop = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Stopping configuration watch");
                }
                stop.cancel();
            });

            config.watch(Some(&cancel)).await?;
        }
    }

    Ok(())
}

/// Formats the value at `path` as TOML, or an empty line if it is unset.
fn format_value(config: &Config, path: &str) -> String {
    match config.get(path) {
        Some(toml::Value::Table(table)) => toml::to_string_pretty(&table)
            .unwrap_or_else(|_| toml::Value::Table(table).to_string()),
        Some(value) => value.to_string(),
        None => String::new(),
    }
}
