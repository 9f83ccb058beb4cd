//! Runtime error types.

use kiln_compiler::Diagnostic;
use kiln_vm::DefineError;

/// Errors returned by [`InMemoryCompiler`](crate::InMemoryCompiler).
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The batch failed and was rolled back
    #[error("Compilation failed with {} error(s)", error_count(.diagnostics))]
    CompilationFailed {
        /// Every diagnostic of the failed batch, warnings included
        diagnostics: Vec<Diagnostic>,
        /// Diagnostics rendered with source context
        report: String,
    },

    /// No artifact with this name is visible to the instance
    #[error("Class not found: {0}")]
    ClassNotFound(String),

    /// An artifact exists but could not be defined
    #[error("Cannot define '{name}': {source}")]
    Define {
        name: String,
        #[source]
        source: DefineError,
    },

    /// File I/O error
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

fn error_count(diagnostics: &[Diagnostic]) -> usize {
    kiln_compiler::diagnostic::error_count(diagnostics)
}

impl RuntimeError {
    /// Diagnostics of a failed batch, empty for other errors
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            RuntimeError::CompilationFailed { diagnostics, .. } => diagnostics,
            _ => &[],
        }
    }
}
