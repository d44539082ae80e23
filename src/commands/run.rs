// src/commands/run.rs

use super::common::{compile_file, find_entry_point};
use crate::binding::Module;
use crate::errors::MessageFormat;
use crate::runtime::{call_function, ExceptionReport, ExecutableState};
use std::path::Path;
use std::process::ExitCode;

/// Compile and run a Quill source file. The exit code comes from `Main`
/// when it returns an Integer.
pub fn run_file(path: &Path, format: MessageFormat, timeout: Option<u64>) -> ExitCode {
    let Some((ctx, library)) = compile_file(path, format) else {
        return ExitCode::FAILURE;
    };

    let mut module = Module::new(&ctx);
    module.add(library.clone());
    let mut state = ExecutableState::new(&ctx, module);
    state.set_output(Box::new(|text| print!("{text}")));

    let mut report = ExceptionReport::new();
    state.link(&ctx, &mut report);
    if report.is_set() {
        eprintln!("{}", report.format(format));
        state.teardown(&ctx);
        return ExitCode::FAILURE;
    }

    let Some(main) = find_entry_point(&ctx, &library) else {
        eprintln!("error: no static parameterless 'Main' function found");
        state.teardown(&ctx);
        return ExitCode::FAILURE;
    };

    if let Some(ticks) = timeout {
        state.push_timeout(ticks);
    }
    let result = call_function(&ctx, &mut state, main, None, vec![], &mut report);
    if timeout.is_some() {
        state.pop_timeout();
    }

    let code = if report.is_set() {
        eprintln!("{}", report.format(format));
        ExitCode::FAILURE
    } else {
        match result.and_then(|value| value.as_integer()) {
            Some(status) => ExitCode::from(status.clamp(0, 255) as u8),
            None => ExitCode::SUCCESS,
        }
    };
    state.teardown(&ctx);
    code
}
