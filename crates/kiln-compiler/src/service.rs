//! The compiler service
//!
//! A [`CompilerService`] compiles a batch of units against a [`FileManager`]:
//! every unit is read through the manager, every compiled type is written
//! back through it, and types outside the batch are looked up through it.

use std::io::Write;
use std::path::PathBuf;

use crate::binder::{bind, ParsedUnit};
use crate::codegen::generate;
use crate::diagnostic::{codes, error_count, Diagnostic};
use crate::file::{FileKind, SourceFile};
use crate::file_manager::{FileManager, StandardFileManager};
use crate::parser::parse_unit;

/// Result of compiling one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOutcome {
    /// True when no error was reported; outputs were written only in that case
    pub success: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileOutcome {
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.is_error())
    }
}

/// A compiler usable from inside a running program
pub trait CompilerService: Send + Sync {
    /// File manager reading from and writing to the real filesystem
    fn standard_file_manager(&self) -> Box<dyn FileManager + Send>;

    /// Compile `units` as one batch
    fn compile(&self, units: &[SourceFile], files: &mut dyn FileManager) -> CompileOutcome;
}

/// The Kiln compiler
#[derive(Debug, Clone, Default)]
pub struct KilnCompiler {
    classpath: Vec<PathBuf>,
}

impl KilnCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiler whose standard file manager resolves types on `classpath`
    pub fn with_classpath(classpath: Vec<PathBuf>) -> Self {
        Self { classpath }
    }
}

impl CompilerService for KilnCompiler {
    fn standard_file_manager(&self) -> Box<dyn FileManager + Send> {
        Box::new(StandardFileManager::with_classpath(self.classpath.clone()))
    }

    fn compile(&self, units: &[SourceFile], files: &mut dyn FileManager) -> CompileOutcome {
        log::debug!("Compiling batch of {} unit(s)", units.len());
        let mut diagnostics = Vec::new();

        let mut parsed = Vec::with_capacity(units.len());
        for unit in units {
            let text = match files.read_source(&unit.id) {
                Ok(text) => text,
                Err(e) => {
                    diagnostics.push(
                        Diagnostic::error(
                            codes::SOURCE_UNAVAILABLE,
                            format!("Cannot read {}: {}", unit.id, e),
                        )
                        .in_unit(&unit.name),
                    );
                    continue;
                }
            };
            let (ast, unit_diagnostics) = parse_unit(&text);
            diagnostics.extend(unit_diagnostics.into_iter().map(|d| d.in_unit(&unit.name)));
            if let Some(ast) = ast {
                parsed.push(ParsedUnit {
                    source: unit.clone(),
                    ast,
                });
            }
        }

        let table = bind(&parsed, &mut diagnostics);
        let images = generate(&parsed, &table, &*files, &mut diagnostics);

        if error_count(&diagnostics) > 0 {
            log::debug!("Batch failed with {} error(s)", error_count(&diagnostics));
            return CompileOutcome {
                success: false,
                diagnostics,
            };
        }

        for image in &images {
            let bytes = image.encode();
            let written = files
                .open_output(&image.name, FileKind::Output)
                .and_then(|mut sink| {
                    sink.write_all(&bytes)?;
                    sink.flush()
                });
            if let Err(e) = written {
                let mut diagnostic = Diagnostic::error(
                    codes::OUTPUT_FAILED,
                    format!("Cannot write output for '{}': {}", image.name, e),
                );
                if let Some(ty) = table.get(&image.name) {
                    diagnostic = diagnostic.in_unit(&parsed[ty.unit].source.name);
                }
                diagnostics.push(diagnostic);
            }
        }

        let success = error_count(&diagnostics) == 0;
        log::debug!(
            "Batch finished: {} type(s), success = {}",
            images.len(),
            success
        );
        CompileOutcome {
            success,
            diagnostics,
        }
    }
}
