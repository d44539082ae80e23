// src/runtime/exception.rs
//! The explicit failure channel. Nothing in the VM unwinds; every call
//! threads an `ExceptionReport`, and each frame that observes one active
//! appends its own trace entry on the way out. Scripted throws and native
//! failures travel the same path and are indistinguishable to the caller.

use crate::errors::{MessageFormat, RuntimeError};
use crate::frontend::CodeLocation;
use crate::runtime::handle::Handle;

/// One frame of a stack trace, recorded as the failure unwinds through it.
#[derive(Debug, Clone)]
pub struct StackTraceEntry {
    pub function_name: String,
    pub class_name: Option<String>,
    pub location: CodeLocation,
}

impl StackTraceEntry {
    fn format(&self, format: MessageFormat) -> String {
        let name = match &self.class_name {
            Some(class) => format!("{}.{}", class, self.function_name),
            None => self.function_name.clone(),
        };
        match format {
            MessageFormat::Quill => format!(
                "  in {} ({} at line {})",
                name, self.location.origin, self.location.primary_line
            ),
            MessageFormat::Python => format!(
                "  File \"{}\", line {}, in {}",
                self.location.origin, self.location.primary_line, name
            ),
            MessageFormat::Msvc => format!(
                "{}({}): in {}",
                self.location.origin, self.location.primary_line, name
            ),
        }
    }
}

/// An active failure: the runtime error, the thrown exception object for
/// scripted throws, and the trace accumulated so far.
#[derive(Debug, Clone)]
pub struct ThrownException {
    pub error: RuntimeError,
    /// The script-side exception object, when the failure came from a
    /// `throw` rather than a VM or native error.
    pub value: Option<Handle>,
    pub trace: Vec<StackTraceEntry>,
}

/// Out-parameter carried through every VM and native call boundary.
#[derive(Debug, Default)]
pub struct ExceptionReport {
    active: Option<ThrownException>,
}

impl ExceptionReport {
    pub fn new() -> ExceptionReport {
        ExceptionReport::default()
    }

    pub fn is_set(&self) -> bool {
        self.active.is_some()
    }

    /// Raise a runtime error. A report that is already active keeps its
    /// original failure; later raises during unwinding are ignored.
    pub fn raise(&mut self, error: RuntimeError) {
        if self.active.is_none() {
            self.active = Some(ThrownException {
                error,
                value: None,
                trace: Vec::new(),
            });
        }
    }

    /// Raise a scripted `throw`, keeping the exception object alive for
    /// handlers and debuggers.
    pub fn raise_thrown(&mut self, error: RuntimeError, value: Handle) {
        if self.active.is_none() {
            self.active = Some(ThrownException {
                error,
                value: Some(value),
                trace: Vec::new(),
            });
        }
    }

    /// Append a trace entry as the failure unwinds out of a frame.
    pub fn push_trace(&mut self, entry: StackTraceEntry) {
        if let Some(active) = &mut self.active {
            active.trace.push(entry);
        }
    }

    pub fn exception(&self) -> Option<&ThrownException> {
        self.active.as_ref()
    }

    pub fn take(&mut self) -> Option<ThrownException> {
        self.active.take()
    }

    pub fn clear(&mut self) {
        self.active = None;
    }

    /// The error message plus the formatted stack trace, innermost first.
    pub fn format(&self, format: MessageFormat) -> String {
        let Some(active) = &self.active else {
            return String::new();
        };
        let mut out = active.error.to_string();
        for entry in &active.trace {
            out.push('\n');
            out.push_str(&entry.format(format));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_failure_wins() {
        let mut report = ExceptionReport::new();
        report.raise(RuntimeError::DivideByZero);
        report.raise(RuntimeError::NullDereference);
        assert!(matches!(
            report.exception().unwrap().error,
            RuntimeError::DivideByZero
        ));
    }

    #[test]
    fn trace_accumulates_in_unwind_order() {
        let mut report = ExceptionReport::new();
        report.raise(RuntimeError::DivideByZero);
        let mut location = CodeLocation::default();
        location.origin = "Game".into();
        location.primary_line = 4;
        report.push_trace(StackTraceEntry {
            function_name: "Inner".into(),
            class_name: Some("Player".into()),
            location: location.clone(),
        });
        location.primary_line = 9;
        report.push_trace(StackTraceEntry {
            function_name: "Outer".into(),
            class_name: None,
            location,
        });

        let text = report.format(MessageFormat::Quill);
        assert!(text.starts_with("integer division by zero"));
        let inner = text.find("Player.Inner").unwrap();
        let outer = text.find("Outer").unwrap();
        assert!(inner < outer);
    }

    #[test]
    fn trace_without_failure_is_dropped() {
        let mut report = ExceptionReport::new();
        report.push_trace(StackTraceEntry {
            function_name: "F".into(),
            class_name: None,
            location: CodeLocation::default(),
        });
        assert!(!report.is_set());
        assert_eq!(report.format(MessageFormat::Quill), "");
    }
}
