//! Kiln Compiler
//!
//! Compiles batches of Kiln source units into type images. The compiler
//! reads and writes exclusively through a [`FileManager`], so callers decide
//! where sources come from and where compiled output lands.
//!
//! ```text
//! SourceFile[] ──▶ parse ──▶ bind ──▶ codegen ──▶ FileManager::open_output
//!                   │                   │
//!                   └── FileManager::read_source
//!                                       └── FileManager::resolve_type
//! ```

#![warn(rust_2018_idioms)]

pub mod ast;
pub mod binder;
pub mod codegen;
pub mod diagnostic;
pub mod file;
pub mod file_manager;
pub mod lexer;
pub mod parser;
pub mod service;

pub use diagnostic::{codes, render, Diagnostic, ErrorCode, Severity};
pub use file::{FileId, FileKind, SourceFile, MEMORY_ROOT};
pub use file_manager::{FileManager, StandardFileManager};
pub use lexer::Span;
pub use service::{CompileOutcome, CompilerService, KilnCompiler};
