//! Kiln CLI - static asset build pipeline.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use kiln_assets::AssetKind;
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(about = "Build HTML, styles, scripts, images and fonts; serve them with live reload")]
#[command(version)]
pub struct Cli {
    /// Target to run; defaults to `dev`
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to kiln.toml config file
    #[arg(short, long, default_value = "kiln.toml", global = true)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean, build everything, then watch and serve with live reload
    Dev {
        /// Port to listen on (defaults to config or 3000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Do not open browser
        #[arg(long)]
        no_open: bool,
    },

    /// Clean, then build every asset kind
    Build,

    /// Build index.html with its partials
    Html,

    /// Build the stylesheet bundle
    Styles,

    /// Build the script bundle
    Scripts,

    /// Optimize images and add WebP copies
    Images,

    /// Convert fonts to WOFF and WOFF2
    Fonts,

    /// Delete the output directory
    Clean,

    /// Rebuild assets as their sources change
    Watch,

    /// Serve the output directory with live reload
    Serve {
        /// Port to listen on (defaults to config or 3000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Do not open browser
        #[arg(long)]
        no_open: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // KILN_LOG takes precedence over --verbose
    let filter = EnvFilter::try_from_env("KILN_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    fmt().with_env_filter(filter).with_target(false).init();

    let project = config::Project::load(&cli.config)?;

    match cli.command.unwrap_or(Commands::Dev {
        port: None,
        no_open: false,
    }) {
        Commands::Dev { port, no_open } => {
            commands::dev::run(&project, port, !no_open).await?;
        }
        Commands::Build => commands::build::run(&project).await?,
        Commands::Html => commands::task::run(&project, AssetKind::Html).await?,
        Commands::Styles => commands::task::run(&project, AssetKind::Css).await?,
        Commands::Scripts => commands::task::run(&project, AssetKind::Js).await?,
        Commands::Images => commands::task::run(&project, AssetKind::Img).await?,
        Commands::Fonts => commands::task::run(&project, AssetKind::Fonts).await?,
        Commands::Clean => commands::clean::run(&project)?,
        Commands::Watch => commands::watch::run(&project).await?,
        Commands::Serve { port, no_open } => {
            commands::serve::run(&project, port, !no_open).await?;
        }
    }

    Ok(())
}
