//! Band split tuner executable.

use anyhow::Result;
use bandtune_driver::cli::{run_cli, Cli};
use clap::Parser;
use std::process::ExitCode;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    run_cli(cli)
}
