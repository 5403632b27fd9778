//! Evaluation context and structured evaluation errors

use std::fmt;

use serde::{Deserialize, Serialize};

/// A line/column position in program source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePosition {
    pub line: u32,
    pub column: u32,
}

/// A source span attached to an evaluation error
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub start: SourcePosition,
    pub end: SourcePosition,
}

impl SourceLocation {
    /// Placeholder span for errors that have no source position, such as
    /// errors reported back by a device.
    pub const UNKNOWN: SourceLocation = SourceLocation {
        start: SourcePosition { line: 0, column: 0 },
        end: SourcePosition { line: 0, column: 0 },
    };

    pub fn at(line: u32, column: u32) -> Self {
        let pos = SourcePosition { line, column };
        Self {
            start: pos,
            end: pos,
        }
    }
}

/// A single evaluation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalError {
    pub message: String,
    pub location: SourceLocation,
}

impl EvalError {
    pub fn new(message: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            message: message.into(),
            location,
        }
    }

    /// An error raised on the device while running the program
    pub fn device(message: impl Into<String>) -> Self {
        Self::new(message, SourceLocation::UNKNOWN)
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.location == SourceLocation::UNKNOWN {
            write!(f, "{}", self.message)
        } else {
            write!(
                f,
                "Line {}: {}",
                self.location.start.line, self.message
            )
        }
    }
}

/// Evaluation context bound to a workspace.
///
/// Compilers push into `errors` when they fail; the accumulated list is what
/// gets reported back to the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalContext {
    /// Language chapter the workspace is set to
    pub chapter: u8,

    /// Language variant (e.g. "default", "concurrent")
    pub variant: String,

    /// Errors accumulated by the last compile
    #[serde(default)]
    pub errors: Vec<EvalError>,
}

impl Default for EvalContext {
    fn default() -> Self {
        Self {
            chapter: 1,
            variant: "default".to_string(),
            errors: Vec::new(),
        }
    }
}

impl EvalContext {
    pub fn new(chapter: u8, variant: impl Into<String>) -> Self {
        Self {
            chapter,
            variant: variant.into(),
            errors: Vec::new(),
        }
    }

    pub fn push_error(&mut self, error: EvalError) {
        self.errors.push(error);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_uses_placeholder_location() {
        let err = EvalError::device("motor stalled");
        assert_eq!(err.location, SourceLocation::UNKNOWN);
        assert_eq!(err.to_string(), "motor stalled");
    }

    #[test]
    fn test_error_display_includes_line() {
        let err = EvalError::new("Missing semicolon", SourceLocation::at(3, 7));
        assert_eq!(err.to_string(), "Line 3: Missing semicolon");
    }

    #[test]
    fn test_context_error_accumulation() {
        let mut ctx = EvalContext::default();
        assert!(!ctx.has_errors());
        ctx.push_error(EvalError::new("a", SourceLocation::at(1, 0)));
        ctx.push_error(EvalError::new("b", SourceLocation::at(2, 0)));
        assert_eq!(ctx.errors.len(), 2);
        ctx.clear_errors();
        assert!(!ctx.has_errors());
    }
}
