mod cli;
mod concordance;
mod config;
mod container;
mod filestore;
mod inputs;
mod location;
mod process;
mod publish;
mod stage;
mod transfer;

#[macro_use]
extern crate log;
#[macro_use]
extern crate anyhow;

use anyhow::Context;

fn main() -> anyhow::Result<()> {
    let cfg = cli::handle_cli().with_context(|| "Error processing command line arguments")?;
    process::process(&cfg)
}
