//! Compiler diagnostics
//!
//! Diagnostics are plain data so they can outlive the batch that produced
//! them (a failed batch purges its sources). Rendering with source context
//! needs the texts passed back in.

use codespan_reporting::diagnostic::{Diagnostic as CsDiagnostic, Label, Severity as CsSeverity};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::NoColor;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::lexer::Span;

/// Error code for a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub &'static str);

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        self.0
    }
}

/// Diagnostic codes emitted by the Kiln compiler
pub mod codes {
    use super::ErrorCode;

    pub const UNEXPECTED_CHARACTER: ErrorCode = ErrorCode("E0001");
    pub const INVALID_NUMBER: ErrorCode = ErrorCode("E0002");
    pub const SYNTAX: ErrorCode = ErrorCode("E0010");
    pub const UNKNOWN_IDENTIFIER: ErrorCode = ErrorCode("E0101");
    pub const MISSING_TYPE: ErrorCode = ErrorCode("E0102");
    pub const DUPLICATE_FUNCTION: ErrorCode = ErrorCode("E0103");
    pub const DUPLICATE_TYPE: ErrorCode = ErrorCode("E0104");
    pub const UNKNOWN_TYPE: ErrorCode = ErrorCode("E0201");
    pub const UNKNOWN_FUNCTION: ErrorCode = ErrorCode("E0202");
    pub const ARITY_MISMATCH: ErrorCode = ErrorCode("E0203");
    pub const TOO_MANY_OPERANDS: ErrorCode = ErrorCode("E0204");
    pub const SOURCE_UNAVAILABLE: ErrorCode = ErrorCode("E0301");
    pub const OUTPUT_FAILED: ErrorCode = ErrorCode("E0302");
    pub const UNUSED_PARAMETER: ErrorCode = ErrorCode("W0001");
}

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A message about one compilation unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String,
    pub message: String,
    /// Qualified name of the unit the diagnostic belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl Diagnostic {
    fn new(severity: Severity, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: code.as_str().to_string(),
            message: message.into(),
            unit: None,
            span: None,
            notes: Vec::new(),
        }
    }

    /// Create an error diagnostic
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, message)
    }

    /// Create a warning diagnostic
    pub fn warning(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, message)
    }

    /// Attach the unit the diagnostic belongs to
    pub fn in_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Attach the primary location
    pub fn at(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Add a help suggestion
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.notes.push(format!("help: {}", help.into()));
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Convert to JSON representation for tooling
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    fn to_codespan(&self, file_id: Option<usize>) -> CsDiagnostic<usize> {
        let severity = match self.severity {
            Severity::Error => CsSeverity::Error,
            Severity::Warning => CsSeverity::Warning,
        };
        let mut diag = CsDiagnostic::new(severity)
            .with_code(self.code.clone())
            .with_message(self.message.clone())
            .with_notes(self.notes.clone());
        if let (Some(file_id), Some(span)) = (file_id, self.span) {
            diag = diag.with_labels(vec![Label::primary(file_id, span.start..span.end)]);
        }
        diag
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}[{}]: {}", kind, self.code, self.message)?;
        match (&self.unit, self.span) {
            (Some(unit), Some(span)) => write!(f, " ({}:{}:{})", unit, span.line, span.column),
            (Some(unit), None) => write!(f, " ({})", unit),
            _ => Ok(()),
        }
    }
}

/// Count the error-severity diagnostics
pub fn error_count(diagnostics: &[Diagnostic]) -> usize {
    diagnostics.iter().filter(|d| d.is_error()).count()
}

/// Render diagnostics with source context
///
/// `sources` maps unit names to their text. Diagnostics whose unit is not in
/// `sources` are rendered without a snippet.
pub fn render(diagnostics: &[Diagnostic], sources: &[(&str, &str)]) -> String {
    let mut files = SimpleFiles::new();
    let ids: Vec<(&str, usize)> = sources
        .iter()
        .map(|(name, text)| (*name, files.add(name.to_string(), text.to_string())))
        .collect();

    let config = term::Config::default();
    let mut writer = NoColor::new(Vec::new());
    for diag in diagnostics {
        let file_id = diag
            .unit
            .as_deref()
            .and_then(|unit| ids.iter().find(|(name, _)| *name == unit))
            .map(|(_, id)| *id);
        if term::emit(&mut writer, &config, &files, &diag.to_codespan(file_id)).is_err() {
            // Span outside the text; fall back to the one-line form.
            let _ = std::io::Write::write_fmt(writer.get_mut(), format_args!("{}\n", diag));
        }
    }
    String::from_utf8_lossy(&writer.into_inner()).into_owned()
}
