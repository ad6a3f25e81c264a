#[cfg(feature = "cli")]
pub mod cli;
pub mod density;
pub mod phreeqc;

#[cfg(feature = "cli")]
use clap::Parser;

#[cfg(feature = "cli")]
pub fn run() -> Result<(), crate::error::RoError> {
    let args = crate::adapters::cli::Args::parse();
    crate::adapters::cli::dispatch(&args)
}
