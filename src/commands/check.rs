// src/commands/check.rs

use super::common::compile_file;
use crate::errors::MessageFormat;
use std::path::Path;
use std::process::ExitCode;

/// Check a Quill source file (full compile, no execution).
pub fn check_file(path: &Path, format: MessageFormat) -> ExitCode {
    match compile_file(path, format) {
        Some(_) => ExitCode::SUCCESS,
        // Diagnostics were already printed.
        None => ExitCode::FAILURE,
    }
}
