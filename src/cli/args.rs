// src/cli/args.rs

use crate::errors::MessageFormat;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Quill scripting language compiler and runtime
#[derive(Parser)]
#[command(name = "quill")]
#[command(version = "0.1.0")]
#[command(about = "Quill scripting language", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile and run a Quill script
    Run {
        /// Path to the .quill file to execute
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Error message style
        #[arg(long, value_enum, default_value_t = FormatArg::Quill)]
        format: FormatArg,

        /// Abort execution after this many instruction ticks
        #[arg(long, value_name = "TICKS")]
        timeout: Option<u64>,
    },
    /// Compile a Quill script without executing it
    Check {
        /// Path to the .quill file to check
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Error message style
        #[arg(long, value_enum, default_value_t = FormatArg::Quill)]
        format: FormatArg,
    },
}

/// Command-line face of the message format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Quill,
    Python,
    Msvc,
}

impl From<FormatArg> for MessageFormat {
    fn from(arg: FormatArg) -> MessageFormat {
        match arg {
            FormatArg::Quill => MessageFormat::Quill,
            FormatArg::Python => MessageFormat::Python,
            FormatArg::Msvc => MessageFormat::Msvc,
        }
    }
}
