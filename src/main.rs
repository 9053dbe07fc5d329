use clap::Parser;
use quantloop::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
