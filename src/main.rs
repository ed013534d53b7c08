//! CLI entry point for chomikbox.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use chomikbox_core::{
    Credentials, DEFAULT_CONCURRENCY, DownloadOptions, Endpoints, Engine, ExtensionFilter,
    HttpTimeouts, HttpTransport, Session, TransferOptions,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod app_config;
mod cli;

use app_config::{FileConfig, load_file_config, split_extensions};
use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let loaded = load_file_config(args.config.as_deref())?;
    if let Some(path) = &loaded.path {
        debug!(path = %path.display(), loaded = loaded.config.is_some(), "config file");
    }
    let config = loaded.config.unwrap_or_default();

    if args.urls.is_empty() {
        info!("No URLs given, nothing to download. Pass one or more --url.");
        return Ok(());
    }

    let credentials = resolve_credentials(&args, &config)?;
    let options = resolve_options(&args, &config);
    let endpoints = resolve_endpoints(&args, &config);

    let timeouts = HttpTimeouts {
        file_connect_secs: config
            .connect_timeout_secs
            .unwrap_or(HttpTimeouts::default().file_connect_secs),
        file_read_secs: config
            .read_timeout_secs
            .unwrap_or(HttpTimeouts::default().file_read_secs),
        ..HttpTimeouts::default()
    };
    let transport = HttpTransport::with_timeouts(timeouts).context("Failed to set up HTTP")?;

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let session = Session::new(Arc::new(transport), endpoints, credentials)
        .with_cancellation(cancel);
    let engine = Engine::new(Arc::new(session));

    info!(
        urls = args.urls.len(),
        destination = %options.transfer.destination_root.display(),
        recursive = options.recursive,
        structure = options.transfer.use_structure,
        overwrite = options.transfer.overwrite,
        "chomikbox starting"
    );

    let summary = engine
        .download(&args.urls, &options)
        .await
        .context("Download run aborted")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}

fn resolve_credentials(args: &Args, config: &FileConfig) -> Result<Credentials> {
    let Some(user) = args.user.as_deref().or(config.user.as_deref()) else {
        bail!("No account name given. Pass --user or set `user` in the config file.");
    };

    if let Some(password) = args.password.as_deref() {
        return Ok(Credentials::from_password(user, password)?);
    }
    match args.hash.as_deref().or(config.hash.as_deref()) {
        Some(hash) => Ok(Credentials::from_hash(user, hash)?),
        None => bail!(
            "No password given. Pass --password or --hash, or set `hash` in the config file."
        ),
    }
}

fn resolve_options(args: &Args, config: &FileConfig) -> DownloadOptions {
    let extensions = args
        .extensions
        .as_deref()
        .map(split_extensions)
        .or_else(|| config.extensions.clone())
        .unwrap_or_default();

    let concurrency = args
        .concurrency
        .or(config.concurrency)
        .map_or(DEFAULT_CONCURRENCY, usize::from);
    if concurrency > 1 {
        warn!(concurrency, "pipelining transfers within one session");
    }

    DownloadOptions {
        extensions: ExtensionFilter::new(extensions),
        recursive: args.recursive || config.recursive.unwrap_or(false),
        transfer: TransferOptions {
            destination_root: args
                .destination
                .clone()
                .or_else(|| config.output_dir.clone())
                .unwrap_or_else(|| PathBuf::from(".")),
            use_structure: args.structure || config.structure.unwrap_or(false),
            overwrite: args.overwrite || config.overwrite.unwrap_or(false),
            concurrency,
        },
    }
}

fn resolve_endpoints(args: &Args, config: &FileConfig) -> Endpoints {
    let defaults = Endpoints::default();
    Endpoints::new(
        args.service_url
            .clone()
            .or_else(|| config.service_url.clone())
            .unwrap_or(defaults.service_url),
        args.site_url
            .clone()
            .or_else(|| config.site_url.clone())
            .unwrap_or(defaults.site_url),
    )
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current chunk");
            cancel.cancel();
        }
    });
}
