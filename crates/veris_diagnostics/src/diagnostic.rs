//! Structured diagnostic messages with severity, codes, and locations.

use crate::code::DiagnosticCode;
use crate::severity::Severity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A source position in a line-oriented input.
///
/// The VM assembly format is line-oriented, so a file name plus a 1-based
/// line number identifies a statement. Elaboration diagnostics that have
/// no text position use [`SourceLoc::NONE`].
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub struct SourceLoc {
    /// The input name, if known.
    pub file: Option<String>,
    /// 1-based line number; 0 when unknown.
    pub line: u32,
}

impl SourceLoc {
    /// The absent location.
    pub const NONE: SourceLoc = SourceLoc {
        file: None,
        line: 0,
    };

    /// Creates a location for the given line of the given input.
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: Some(file.into()),
            line,
        }
    }

    /// Creates a location with a line number but no input name.
    pub fn line(line: u32) -> Self {
        Self { file: None, line }
    }

    /// Returns `true` if no position is known.
    pub fn is_none(&self) -> bool {
        self.file.is_none() && self.line == 0
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), 0) => write!(f, "{file}"),
            (Some(file), line) => write!(f, "{file}:{line}"),
            (None, 0) => write!(f, "<unknown>"),
            (None, line) => write!(f, "line {line}"),
        }
    }
}

/// A structured diagnostic message.
///
/// Diagnostics are the primary mechanism for reporting errors and
/// warnings to the user. Each diagnostic includes a severity level, a
/// unique code, the main message, a source location, and optional
/// explanatory notes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity level of this diagnostic.
    pub severity: Severity,
    /// The unique code identifying the type of diagnostic.
    pub code: DiagnosticCode,
    /// The main diagnostic message.
    pub message: String,
    /// Where the issue was detected.
    pub loc: SourceLoc,
    /// Explanatory footnotes.
    pub notes: Vec<String>,
}

impl Diagnostic {
    /// Creates a new error diagnostic.
    pub fn error(code: DiagnosticCode, message: impl Into<String>, loc: SourceLoc) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            loc,
            notes: Vec::new(),
        }
    }

    /// Creates a new warning diagnostic.
    pub fn warning(code: DiagnosticCode, message: impl Into<String>, loc: SourceLoc) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
            loc,
            notes: Vec::new(),
        }
    }

    /// Adds a note to this diagnostic.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.loc.is_none() {
            write!(f, "{}[{}]: {}", self.severity, self.code, self.message)
        } else {
            write!(
                f,
                "{}: {}[{}]: {}",
                self.loc, self.severity, self.code, self.message
            )
        }
    }
}
