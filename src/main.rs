use std::env::consts::{ARCH, FAMILY, OS};
use std::path::Path;

use anyhow::Error;
use clap::Parser;
use tracing::trace;

use crate::crawler::cli::Cli;
use crate::crawler::load_app_config;
use crate::crawler::logger::init_logging;
use crate::program::Program;

mod crawler;
mod program;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();
    let (app_config, origin) = load_app_config(&cli.config)?;

    // Keep the guard alive so buffered log lines are flushed on exit
    let _guard = init_logging(&app_config.logging, Path::new(&app_config.paths.log_directory))?;
    origin.log(&cli.config);
    log_system_information();

    let program = Program::new(app_config, cli);
    program.run().await
}

/// Logs important information about the system being used.
fn log_system_information() {
    trace!("Printing system information out into log for debug purposes...");
    trace!("ARCH:           \"{}\"", ARCH);
    trace!("FAMILY:         \"{}\"", FAMILY);
    trace!("OS:             \"{}\"", OS);
}
