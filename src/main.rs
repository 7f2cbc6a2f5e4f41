//! ----------------------
//! Author: Sang Young Noh
//! ----------------------
//!
//! ------------------------
//! Last Updated: 16/10/2026
//! ------------------------
//!

/*
Run every simulation mode on every box and print the run summary as JSON.

    sang_mc [config.json]

Without an argument the built-in methane/CO2 demo is run. Log level follows
RUST_LOG (default: info).
*/

use log::{error, info};
use std::process::ExitCode;

use sang_mc::{driver, SimulationInput, Variables};

fn run() -> sang_mc::Result<()> {
    let input = match std::env::args().nth(1) {
        Some(path) => SimulationInput::from_json_file(path)?,
        None => {
            info!("no configuration given, running the built-in demo");
            SimulationInput::demo()
        }
    };
    let mut vars = Variables::from_input(&input)?;
    let summary = driver::run(&mut vars)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
