// src/errors/render.rs
//! Presentation of compile errors.
//!
//! Every error is one (location, message) pair; consumers pick how the
//! location prefix is formatted. The miette graphical handler is used for
//! rich terminal output; the `MessageFormat` variants below are the plain
//! single-line styles hosts select between.

use crate::errors::CompileError;
use miette::{Diagnostic, GraphicalReportHandler, GraphicalTheme, ThemeCharacters, ThemeStyles};

/// Plain-text presentation styles for a (location, message) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageFormat {
    /// "In Origin at line N, character C: message"
    #[default]
    Quill,
    /// "  File \"Origin\", line N: message"
    Python,
    /// "Origin(N): message"
    Msvc,
}

impl CompileError {
    /// Format this error in the requested presentation style.
    pub fn format(&self, format: MessageFormat) -> String {
        let loc = &self.location;
        let message = self.message();
        match format {
            MessageFormat::Quill => format!(
                "In {} at line {}, character {}: {}",
                loc.origin, loc.primary_line, loc.primary_character, message
            ),
            MessageFormat::Python => format!(
                "  File \"{}\", line {}: {}",
                loc.origin, loc.primary_line, message
            ),
            MessageFormat::Msvc => {
                format!("{}({}): {}", loc.origin, loc.primary_line, message)
            }
        }
    }
}

/// Render a miette diagnostic to a plain string (ascii, no colors).
pub fn render_report(report: &dyn Diagnostic) -> String {
    let theme = GraphicalTheme {
        characters: ThemeCharacters::ascii(),
        styles: ThemeStyles::none(),
    };
    let handler = GraphicalReportHandler::new_themed(theme);
    let mut output = String::new();
    let _ = handler.render_report(&mut output, report);
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{CompileErrorKind, SemanticError};
    use crate::frontend::CodeLocation;

    fn sample_error() -> CompileError {
        let mut location = CodeLocation::default();
        location.origin = "Player.quill".to_string();
        location.primary_line = 12;
        location.primary_character = 5;
        CompileError {
            kind: CompileErrorKind::Sema(SemanticError::UndefinedIdentifier {
                name: "speed".into(),
                span: (0, 5).into(),
            }),
            location,
        }
    }

    #[test]
    fn quill_format() {
        let err = sample_error();
        assert_eq!(
            err.format(MessageFormat::Quill),
            "In Player.quill at line 12, character 5: undefined identifier 'speed'"
        );
    }

    #[test]
    fn python_format() {
        let err = sample_error();
        assert_eq!(
            err.format(MessageFormat::Python),
            "  File \"Player.quill\", line 12: undefined identifier 'speed'"
        );
    }

    #[test]
    fn msvc_format() {
        let err = sample_error();
        assert_eq!(
            err.format(MessageFormat::Msvc),
            "Player.quill(12): undefined identifier 'speed'"
        );
    }
}
