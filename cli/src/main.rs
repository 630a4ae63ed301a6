#![deny(clippy::all)]

mod args;
mod config;
mod logging;
mod orchestrator;
mod process;
mod steps;

use anyhow::{Context, Result};
use log::{error, info};
use structopt::StructOpt;

use crate::{
    args::Args,
    config::RunConfig,
    logging::LogConfig,
    orchestrator::{authenticate, Orchestrator, Outcome},
    process::SystemRunner,
};

fn run(args: Args) -> Result<()> {
    let config = RunConfig::from_args(&args)?;
    let credentials_json = config
        .credentials
        .load()
        .context("Could not load service account credentials.")?;

    let client = authenticate(&credentials_json, config.client)?;
    let orchestrator = Orchestrator::new(client, SystemRunner);

    match orchestrator.run(&config.job)? {
        Outcome::CleanedUp => info!("Cleanup of `{}` finished.", config.job.dataset),
        Outcome::Completed => info!("All dbt steps succeeded for `{}`.", config.job.dataset),
    }
    Ok(())
}

fn main() {
    let args = Args::from_args();
    LogConfig::new(args.verbose).init();

    if let Err(error) = run(args) {
        error!("An error occurred:");
        for cause in error.chain() {
            error!(" |- {cause}");
        }

        #[cfg(feature = "backtrace")]
        {
            error!("{}", error.backtrace());
        }

        std::process::exit(1);
    }
}
