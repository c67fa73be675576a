//! Command-line surface: `trackectl <subcommand>`, mirroring the SDK's own layering — one
//! subcommand per capture/store/upload operation a host application would otherwise wire up
//! itself.

use std::path::PathBuf;

use clap::{crate_authors, crate_description, crate_name, crate_version, Parser};

/// CLI options.
#[derive(Parser)]
#[command(disable_version_flag = true)]
#[clap(name = crate_name!(), about = crate_description!())]
#[clap(version = crate_version!(), author = crate_authors!())]
pub struct Opts {
    /// Configuration file (HCL). Defaults to the platform config directory.
    #[clap(short = 'c', long)]
    pub config: Option<PathBuf>,
    /// Path to the SQLite measurement store. Defaults to `<config dir>/measurements.sqlite`.
    #[clap(long)]
    pub store: Option<PathBuf>,
    /// Verbose mode (`-v`, `-vv`, ...).
    #[clap(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
    #[clap(subcommand)]
    pub subcmd: SubCommand,
}

#[derive(Debug, Parser)]
pub enum SubCommand {
    /// List every measurement in the store.
    List,
    /// Show one measurement's tracks, locations and events.
    Show(ShowOpts),
    /// Delete a measurement and its sensor files.
    Delete(DeleteOpts),
    /// Run a scripted capture session against synthetic sensor data.
    Simulate(SimulateOpts),
    /// Upload one measurement to the configured collector.
    Upload(UploadOpts),
    /// Print the resolved configuration and exit.
    Config,
    /// Print version information.
    Version,
}

#[derive(Debug, Parser)]
pub struct ShowOpts {
    pub measurement_id: u64,
}

#[derive(Debug, Parser)]
pub struct DeleteOpts {
    pub measurement_id: u64,
}

#[derive(Debug, Parser)]
pub struct SimulateOpts {
    /// Modality to record the session under.
    #[clap(default_value = "WALKING")]
    pub modality: String,
    /// Number of synthetic sample batches to record before stopping.
    #[clap(long, default_value_t = 5)]
    pub batches: u32,
    /// Whether to pause and resume once midway through the run.
    #[clap(long)]
    pub with_pause: bool,
}

#[derive(Debug, Parser)]
pub struct UploadOpts {
    pub measurement_id: u64,
    /// Bearer token to authenticate with. Without one, a mock authenticator is used.
    #[clap(long)]
    pub token: Option<String>,
}
