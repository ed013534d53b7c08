//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{ArgGroup, Parser};

/// Download files and folders from a Chomikuj account over the ChomikBox protocol.
///
/// Partial downloads are kept as `.part` files and resumed on the next run.
#[derive(Parser, Debug)]
#[command(name = "chomikbox")]
#[command(author, version, about)]
#[command(group(ArgGroup::new("secret").args(["password", "hash"])))]
pub struct Args {
    /// Account name
    #[arg(short = 'u', long)]
    pub user: Option<String>,

    /// Account password (hashed before use, never stored)
    #[arg(short = 'p', long)]
    pub password: Option<String>,

    /// MD5 hash of the account password
    #[arg(long)]
    pub hash: Option<String>,

    /// File or folder URL to download (repeatable)
    #[arg(long = "url", value_name = "URL")]
    pub urls: Vec<String>,

    /// Only download these extensions, comma separated (e.g. "pdf,ttf")
    #[arg(short = 'e', long = "ext", value_name = "LIST")]
    pub extensions: Option<String>,

    /// Descend into subfolders
    #[arg(short = 'r', long)]
    pub recursive: bool,

    /// Recreate the remote folder structure under the destination
    #[arg(short = 's', long)]
    pub structure: bool,

    /// Replace files that already exist
    #[arg(short = 'o', long)]
    pub overwrite: bool,

    /// Maximum simultaneous transfers (1-16)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub concurrency: Option<u8>,

    /// Config file to read instead of the default location
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Service endpoint override
    #[arg(long, value_name = "URL", hide = true)]
    pub service_url: Option<String>,

    /// Site root override
    #[arg(long, value_name = "URL", hide = true)]
    pub site_url: Option<String>,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Destination directory
    #[arg(value_name = "DESTINATION")]
    pub destination: Option<PathBuf>,
}
