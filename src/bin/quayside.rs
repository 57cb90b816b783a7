// SPDX-FileCopyrightText: 2026 Quayside Contributors
// SPDX-License-Identifier: MIT

use quayside::{
    config::{default_config_path, Config},
    normalize::TreeNormalizer,
    publish::{PublishRequest, Publisher},
    server,
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::{fs, path::PathBuf, process::exit};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  quayside [options] <quayside-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self) -> Result<()> {
        match self.command {
            Command::Serve(opts) => run_serve(opts).await,
            Command::Publish(opts) => run_publish(opts).await,
            Command::Normalize(opts) => run_normalize(opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run the deploy service.
    #[command(override_usage = "quayside serve [options]")]
    Serve(ServeOptions),

    /// Publish one archive without going through the HTTP surface.
    #[command(override_usage = "quayside publish [options] <archive> <project_name>")]
    Publish(PublishOptions),

    /// Normalize an extracted site tree in place.
    #[command(override_usage = "quayside normalize [options] <dir>")]
    Normalize(NormalizeOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ServeOptions {
    /// Path to configuration file.
    #[arg(short, long, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Listen address, overriding the configuration file.
    #[arg(short, long, value_name = "addr")]
    pub bind: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct PublishOptions {
    /// Zip archive containing the site.
    #[arg(value_name = "archive")]
    pub archive: PathBuf,

    /// Project display name.
    #[arg(value_name = "project_name")]
    pub project_name: String,

    /// Submitter identity recorded as the commit author.
    #[arg(short, long, value_name = "name")]
    pub submitter: Option<String>,

    /// Path to configuration file.
    #[arg(short, long, value_name = "path")]
    pub config: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct NormalizeOptions {
    /// Directory holding an extracted site tree.
    #[arg(value_name = "dir")]
    pub dir: PathBuf,

    /// Entry document the tree must contain.
    #[arg(short, long, value_name = "filename", default_value = "index.html")]
    pub entry: String,
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run().await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

async fn run() -> Result<()> {
    Cli::parse().run().await
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let path = match path {
        Some(path) => path,
        None => default_config_path()?,
    };

    if path.exists() {
        Ok(Config::load(path)?)
    } else {
        Ok(Config::default())
    }
}

async fn run_serve(opts: ServeOptions) -> Result<()> {
    let mut config = load_config(opts.config)?;
    if let Some(bind) = opts.bind {
        config.server.bind = bind;
    }

    server::serve(&config).await?;

    Ok(())
}

async fn run_publish(opts: PublishOptions) -> Result<()> {
    let config = load_config(opts.config)?;
    let publisher = Publisher::from_config(&config)?;

    // The pipeline deletes the upload when the request finishes, so hand it
    // a spooled copy rather than the caller's archive.
    mkdirp::mkdirp(&config.workspace.upload_dir)?;
    let spooled = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(".zip")
        .tempfile_in(&config.workspace.upload_dir)?;
    fs::copy(&opts.archive, spooled.path())?;
    let (_, archive) = spooled.keep()?;

    let publication = publisher
        .publish(PublishRequest {
            archive,
            display_name: opts.project_name,
            submitter: opts.submitter,
        })
        .await?;

    println!("{} -> {}", publication.repo, publication.url);

    Ok(())
}

fn run_normalize(opts: NormalizeOptions) -> Result<()> {
    TreeNormalizer::new(opts.entry).normalize(&opts.dir)?;

    Ok(())
}
