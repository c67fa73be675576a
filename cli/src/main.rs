//! `trackectl`: a thin driver over the capture/store/upload SDK, letting a developer inspect
//! the measurement store and exercise the capture and upload pipelines from a shell rather
//! than from a host application's UI.

mod cli;
mod cmds;
mod error;

use clap::Parser;
use directories::BaseDirs;
use eyre::{eyre, Result};
use tracekit_common::{init_logging, CaptureConfig, LoggingOptions};
use tracekit_store::Store;

use cli::{Opts, SubCommand};

fn default_data_dir() -> Result<std::path::PathBuf> {
    let base = BaseDirs::new().ok_or_else(|| eyre!("could not determine a home directory for this platform"))?;
    Ok(base.data_local_dir().join("tracekit"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::parse();

    if opts.verbose > 0 && std::env::var("RUST_LOG").is_err() {
        let level = if opts.verbose > 1 { "debug" } else { "info" };
        std::env::set_var("RUST_LOG", level);
    }
    let _logging = init_logging(&LoggingOptions::default());

    let config_path = opts.config.as_deref().and_then(|p| p.to_str());
    let config = CaptureConfig::load_or_init(config_path)?;

    let data_dir = default_data_dir()?;
    let store_path = opts.store.clone().unwrap_or_else(|| data_dir.join("measurements.sqlite"));
    let measurements_dir = data_dir.join("measurements");

    if let Some(parent) = store_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = Store::open(&store_path, &measurements_dir)?;

    match opts.subcmd {
        SubCommand::List => cmds::run_list(&store).await?,
        SubCommand::Show(show_opts) => cmds::run_show(&store, show_opts.measurement_id).await?,
        SubCommand::Delete(delete_opts) => cmds::run_delete(&store, delete_opts.measurement_id).await?,
        SubCommand::Simulate(sim_opts) => cmds::run_simulate(store, &sim_opts).await?,
        SubCommand::Upload(upload_opts) => cmds::run_upload(store, &config, &upload_opts).await?,
        SubCommand::Config => cmds::run_config(&config).await?,
        SubCommand::Version => {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
