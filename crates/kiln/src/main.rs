//! kiln CLI - front-end asset pipeline with a live-reload development server.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use kiln_tasks::Mode;
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(about = "Front-end asset pipeline with a live-reload development server")]
#[command(version)]
pub struct Cli {
    /// Task to run: default, build, watcher, clean, html, pug, styles,
    /// scripts, images, sprite or fonts
    task: Option<String>,

    /// Path to kiln.toml config file
    #[arg(short, long, default_value = "kiln.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Port for the development server
    #[arg(short, long)]
    port: Option<u16>,

    /// Do not open browser
    #[arg(long)]
    no_open: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt().with_env_filter(filter).with_target(false).init();

    let mode = Mode::from_arg(cli.task.as_deref());
    let file_config = config::load_config(&cli.config)?;
    let ctx = commands::context(&file_config, mode)?;

    // Execute task
    match cli.task.as_deref().unwrap_or(commands::DEFAULT_TASK) {
        commands::DEFAULT_TASK => {
            let server = file_config.server_config(ctx.output_root(), cli.port, cli.no_open);
            commands::dev::run(ctx, server, file_config.delay()).await?;
        }
        kiln_tasks::BUILD_KEYWORD => {
            commands::build::run(ctx).await?;
        }
        commands::WATCHER_TASK => {
            commands::watcher::run(ctx, file_config.delay(), None).await?;
        }
        name => {
            commands::task::run(name, ctx).await?;
        }
    }

    Ok(())
}
