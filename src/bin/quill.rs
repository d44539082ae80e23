// src/bin/quill.rs

use clap::Parser;
use std::process::ExitCode;

use quill::cli::{Cli, Commands};
use quill::commands::check::check_file;
use quill::commands::run::run_file;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            format,
            timeout,
        } => run_file(&file, format.into(), timeout),
        Commands::Check { file, format } => check_file(&file, format.into()),
    }
}
