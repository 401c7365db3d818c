mod args;
mod browser;
mod command;
mod config;
mod error;
mod logging;
mod remote;
mod session;
mod utils;

use std::sync::Arc;

use anyhow::{Context, Result};
use args::Args;
use clap::Parser;
use config::{initialize_config_file, initialize_log_file, load_config, log_file};
use log::{debug, error, info};
use logging::init_logging;

use crate::{
    command::SystemRunner,
    remote::port::PortAllocator,
    session::{ctrl_c, SessionController},
};

fn main() {
    let args = Args::parse();
    if let Err(err) = try_main(args) {
        error!("{:#}", err);
        eprintln!("Error: {}", err);
        for cause in err.chain().skip(1) {
            eprintln!("  Caused by: {}", cause);
        }
        std::process::exit(1);
    }
}

fn try_main(args: Args) -> Result<()> {
    initialize_config_file(args.config_file.clone());
    initialize_log_file(args.log_file.clone());
    init_logging(args.verbose, &log_file()).context("failed to initialize logging")?;

    let config = load_config().context("could not load configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async {
        let mut session = SessionController::new(
            args.session_options(),
            config,
            Arc::new(SystemRunner),
            PortAllocator::from_entropy(),
            ctrl_c(),
        );
        let result = session.run().await;
        debug!("session states: {:?}", session.history());
        result.with_context(|| format!("session with {} failed", args.host))?;
        info!(
            "session with {} finished ({:?})",
            args.host,
            session.signal()
        );
        Ok::<(), anyhow::Error>(())
    })
}
