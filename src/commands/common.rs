// src/commands/common.rs

use crate::binding::{Context, FunctionId, LibraryRef};
use crate::errors::{Diagnostics, MessageFormat};
use crate::frontend::Project;
use std::path::Path;

/// Compile one script file into a fresh context. Compile errors are printed
/// to stderr in the requested format; `None` means compilation failed.
pub fn compile_file(path: &Path, format: MessageFormat) -> Option<(Context, LibraryRef)> {
    let mut ctx = Context::new();
    let mut project = Project::new();
    if let Err(error) = project.add_code_from_file(path) {
        eprintln!("error: could not read '{}': {}", path.display(), error);
        return None;
    }

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "script".to_string());

    let mut diagnostics = Diagnostics::new();
    let library = project.compile(&mut ctx, &name, &[], &mut diagnostics);
    for error in diagnostics.take_errors() {
        eprintln!("{}", error.format(format));
    }
    library.map(|library| (ctx, library))
}

/// The script's entry point: a static, parameterless function named `Main`
/// on any type the library declares.
pub fn find_entry_point(ctx: &Context, library: &LibraryRef) -> Option<FunctionId> {
    for &ty in &library.types {
        let Some(candidates) = ctx.ty(ty).find_functions("Main", true) else {
            continue;
        };
        for &candidate in candidates {
            let function = ctx.function(candidate);
            if ctx.delegate(function.delegate).params.is_empty() {
                return Some(candidate);
            }
        }
    }
    None
}
