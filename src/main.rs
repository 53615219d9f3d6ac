// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand, ValueEnum};
use edgecam::config::{Config, SourceKind};
use edgecam::constants::app_info;
use edgecam::presenter::PresenterKind;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "edgecam")]
#[command(about = "Real-time camera edge detection")]
#[command(version = app_info::version())]
#[command(subcommand_required = false)]
struct Cli {
    /// Configuration file (default: <config dir>/edgecam/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Capture device node, e.g. /dev/video2
    #[arg(short, long, global = true)]
    device: Option<String>,

    /// Preferred capture width
    #[arg(long, global = true)]
    width: Option<u32>,

    /// Preferred capture height
    #[arg(long, global = true)]
    height: Option<u32>,

    /// Use the built-in test pattern instead of a camera
    #[arg(long, global = true)]
    synthetic: bool,

    /// Presenter backend
    #[arg(long, global = true, value_enum)]
    presenter: Option<PresenterArg>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum PresenterArg {
    Gpu,
    Software,
}

impl From<PresenterArg> for PresenterKind {
    fn from(arg: PresenterArg) -> Self {
        match arg {
            PresenterArg::Gpu => PresenterKind::Gpu,
            PresenterArg::Software => PresenterKind::Software,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the terminal viewer (default)
    Run,

    /// List available capture devices
    List,

    /// Run the pipeline headlessly and report frame rate and transform time
    Bench {
        /// Number of ticks to run (0 runs until Ctrl+C)
        #[arg(short, long, default_value = "300")]
        frames: u64,

        /// Present the raw feed instead of the edge map
        #[arg(long)]
        raw: bool,

        /// Print pipeline events as JSON lines
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Load the configuration file and apply command-line overrides
    fn resolve_config(&self) -> Result<Config, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };

        if let Some(device) = &self.device {
            config.device_path = device.clone();
            config.source = SourceKind::Device;
        }
        if self.synthetic {
            config.source = SourceKind::Synthetic;
        }
        if let Some(width) = self.width {
            config.preferred_width = width;
        }
        if let Some(height) = self.height {
            config.preferred_height = height;
        }
        if let Some(presenter) = self.presenter {
            config.presenter = presenter.into();
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=edgecam=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::List) => cli::list_devices(),
        Some(Commands::Bench { frames, raw, json }) => {
            cli::bench(cli.resolve_config()?, *frames, *raw, *json)
        }
        Some(Commands::Run) | None => edgecam::terminal::run(cli.resolve_config()?),
    }
}
