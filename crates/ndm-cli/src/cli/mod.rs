//! CLI for the NDM download manager.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use ndm_core::config;
use std::path::PathBuf;

use commands::{run_get, run_list, run_remove, run_resume, run_retry, run_serve};

/// Top-level CLI for the NDM download manager.
#[derive(Debug, Parser)]
#[command(name = "ndm")]
#[command(about = "NDM: segmented HTTP download manager", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the manager and the browser command server until Ctrl-C.
    Serve,

    /// Download one URL in the foreground.
    Get {
        /// Direct HTTP/HTTPS URL to download.
        url: String,
        /// Destination path (default: download dir + derived file name).
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        /// File name to use instead of the one derived from the URL.
        #[arg(short = 'n', long = "name", value_name = "NAME")]
        name: Option<String>,
        /// Extra request header, e.g. -H "Cookie: a=b". Repeatable.
        #[arg(short = 'H', long = "header", value_name = "NAME: VALUE", value_parser = parse_header)]
        headers: Vec<(String, String)>,
    },

    /// Show all saved downloads.
    List,

    /// Resume a paused or failed download in the foreground.
    Resume {
        /// Download id, or an unambiguous prefix of it.
        id: String,
    },

    /// Restart a download from scratch in the foreground.
    Retry {
        /// Download id, or an unambiguous prefix of it.
        id: String,
    },

    /// Cancel a download and forget it.
    Remove {
        /// Download id, or an unambiguous prefix of it.
        id: String,
    },

    /// Print the config file location.
    ConfigPath,
}

/// Splits `Name: value` at the first colon.
fn parse_header(raw: &str) -> Result<(String, String), String> {
    let Some((name, value)) = raw.split_once(':') else {
        return Err(format!("expected \"Name: value\", got {:?}", raw));
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("header name is empty in {:?}", raw));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        if let CliCommand::ConfigPath = cli.command {
            println!("{}", config::config_path()?.display());
            return Ok(());
        }
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Serve => run_serve(&cfg).await?,
            CliCommand::Get {
                url,
                output,
                name,
                headers,
            } => run_get(&cfg, url, output, name, headers.into_iter().collect()).await?,
            CliCommand::List => run_list()?,
            CliCommand::Resume { id } => run_resume(&cfg, &id).await?,
            CliCommand::Retry { id } => run_retry(&cfg, &id).await?,
            CliCommand::Remove { id } => run_remove(&cfg, &id).await?,
            CliCommand::ConfigPath => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
