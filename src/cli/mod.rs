// src/cli/mod.rs
pub mod args;

pub use args::{Cli, Commands, FormatArg};
