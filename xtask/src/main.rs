mod common;
mod infer;
mod inspect;
mod pack;

use clap::Parser;
use std::process::ExitCode;

#[macro_use]
extern crate clap;
#[macro_use]
extern crate log;

fn main() -> ExitCode {
    use Commands::*;
    let result = match Cli::parse().command {
        Infer(infer) => infer.invoke(),
        Inspect(inspect) => inspect.invoke(),
        Pack(pack) => pack.invoke(),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[derive(Parser)]
#[clap(name = "pix2pix-utils")]
#[clap(version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate an image
    Infer(infer::InferArgs),
    /// Show the contents of a weight container
    Inspect(inspect::InspectArgs),
    /// Build a weight container from JSON
    Pack(pack::PackArgs),
}

type Result = std::result::Result<(), Box<dyn std::error::Error>>;
