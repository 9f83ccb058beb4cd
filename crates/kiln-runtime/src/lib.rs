//! Kiln Runtime
//!
//! Compile named Kiln source units in memory and load the result without
//! touching the filesystem.
//!
//! # Example
//!
//! ```rust,ignore
//! use kiln_runtime::InMemoryCompiler;
//!
//! let mut compiler = InMemoryCompiler::new();
//! compiler.add_source("demo.Calc", "class Calc { fn twice(x) = x * 2; }");
//! let calc = compiler.get_class("demo.Calc")?;
//! assert_eq!(calc.invoke("twice", &[21])?, 42);
//! ```

#![warn(rust_2018_idioms)]

pub mod compiler;
pub mod error;
pub mod loader;
pub mod options;
pub mod registry;
pub mod vfs;

pub use compiler::{CompilerState, InMemoryCompiler};
pub use error::RuntimeError;
pub use loader::ByteCodeLoader;
pub use options::{CompilerOptions, ConfigError};
pub use registry::{SourceRegistry, SourceStatus, SourceUnit};
pub use vfs::{ArtifactStore, VirtualFileManager};

pub use kiln_compiler::{CompileOutcome, CompilerService, Diagnostic, KilnCompiler, Severity};
pub use kiln_vm::{TypeHandle, VmError};
