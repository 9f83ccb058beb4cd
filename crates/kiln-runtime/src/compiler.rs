//! The in-memory compiler
//!
//! Ties registration, batch compilation and loading together:
//!
//! ```text
//! add_source ──▶ SourceRegistry (pending)
//!                     │ compile()
//!                     ▼
//!            VirtualFileManager ◀──▶ CompilerService
//!               │ commit / discard
//!               ▼
//!          ArtifactStore ──▶ ByteCodeLoader ──▶ TypeHandle
//! ```

use kiln_compiler::{codes, render, CompilerService, Diagnostic, KilnCompiler};
use kiln_vm::{SpaceId, TypeHandle};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::RuntimeError;
use crate::loader::ByteCodeLoader;
use crate::options::{CompilerOptions, ConfigError};
use crate::registry::SourceRegistry;
use crate::vfs::VirtualFileManager;

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Where an instance is in its batch lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilerState {
    /// Nothing pending
    Idle,
    /// Units registered since the last batch
    Dirty,
    /// A batch is being compiled
    Compiling,
}

/// Compiles named source units in memory and loads the result
///
/// Every instance has its own registry, artifact map and type space: types
/// loaded through one instance are never visible to another.
pub struct InMemoryCompiler {
    id: u64,
    service: Arc<dyn CompilerService>,
    registry: SourceRegistry,
    files: VirtualFileManager,
    loader: ByteCodeLoader,
    options: CompilerOptions,
    state: CompilerState,
    warnings: Vec<Diagnostic>,
}

impl InMemoryCompiler {
    /// Create a compiler with default options
    pub fn new() -> Self {
        Self::with_options(CompilerOptions::default())
    }

    pub fn with_options(options: CompilerOptions) -> Self {
        let service = Arc::new(KilnCompiler::with_classpath(options.classpath.clone()));
        Self::with_service(service, options)
    }

    /// Create a compiler from the `[compiler]` table of a config file
    pub fn from_config_file(path: &Path) -> Result<Self, ConfigError> {
        Ok(Self::with_options(CompilerOptions::from_file(path)?))
    }

    /// Create a compiler driving a custom compiler service
    pub fn with_service(service: Arc<dyn CompilerService>, options: CompilerOptions) -> Self {
        let files = VirtualFileManager::new(service.standard_file_manager());
        let loader = ByteCodeLoader::new(files.artifact_store(), &options);
        let id = NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed);
        log::debug!("Created compiler instance {} ({})", id, loader.space_id());
        Self {
            id,
            service,
            registry: SourceRegistry::new(),
            files,
            loader,
            options,
            state: CompilerState::Idle,
            warnings: Vec::new(),
        }
    }

    /// Register a unit for the next batch
    ///
    /// Returns `false` and changes nothing if `name` is already registered on
    /// this instance, pending or compiled. Names of a failed batch can be
    /// registered again.
    pub fn add_source(&mut self, name: &str, text: &str) -> bool {
        if !self.registry.add(name, text) {
            log::warn!(
                "Instance {}: '{}' is already registered, ignoring new source",
                self.id,
                name
            );
            return false;
        }
        log::debug!("Instance {}: registered '{}'", self.id, name);
        self.state = CompilerState::Dirty;
        true
    }

    /// Compile every pending unit as one batch
    ///
    /// Does nothing when nothing is pending. On failure the whole batch is
    /// rolled back: no artifact of it is kept and its names can be
    /// registered again.
    pub fn compile(&mut self) -> Result<(), RuntimeError> {
        if !self.registry.has_pending() {
            return Ok(());
        }
        self.state = CompilerState::Compiling;
        let result = self.run_batch();
        self.state = CompilerState::Idle;
        result
    }

    fn run_batch(&mut self) -> Result<(), RuntimeError> {
        let units = self.files.stage_sources(self.registry.pending_units());
        log::debug!(
            "Instance {}: compiling batch of {} unit(s)",
            self.id,
            units.len()
        );

        let outcome = self.service.compile(&units, &mut self.files);
        let mut diagnostics = outcome.diagnostics;

        if outcome.success {
            match self.files.commit() {
                Ok(committed) => {
                    self.registry.mark_compiled();
                    diagnostics.retain(|d| !d.is_error());
                    self.warnings = diagnostics;
                    log::debug!(
                        "Instance {}: committed {}",
                        self.id,
                        committed.join(", ")
                    );
                    return Ok(());
                }
                Err(collisions) => {
                    diagnostics.extend(collisions.into_iter().map(|name| {
                        Diagnostic::error(
                            codes::DUPLICATE_TYPE,
                            format!("Type '{}' was already compiled by an earlier batch", name),
                        )
                        .with_help("compiled types cannot be replaced; use a new name")
                    }));
                }
            }
        }

        // Render while the sources are still registered.
        let sources: Vec<(&str, &str)> = self
            .registry
            .pending_units()
            .into_iter()
            .map(|u| (u.name.as_str(), u.text.as_str()))
            .collect();
        let report = render(&diagnostics, &sources);

        self.files.discard();
        let purged = self.registry.rollback();
        log::warn!(
            "Instance {}: batch failed with {} error(s), rolled back {}",
            self.id,
            kiln_compiler::diagnostic::error_count(&diagnostics),
            purged.join(", ")
        );
        Err(RuntimeError::CompilationFailed {
            diagnostics,
            report,
        })
    }

    /// Load the type `name`, compiling pending units first
    ///
    /// A compilation failure is returned as is. `name` is a binary name, so
    /// nested and auxiliary types are loadable too.
    ///
    /// The handle stays invokable only while this compiler is alive. Once it
    /// is dropped, `invoke` returns `VmError::SpaceDropped`; the metadata
    /// accessors keep working.
    pub fn get_class(&mut self, name: &str) -> Result<TypeHandle, RuntimeError> {
        self.compile()?;
        self.loader.load(name)
    }

    pub fn state(&self) -> CompilerState {
        self.state
    }

    /// Registered text of `name`
    pub fn source(&self, name: &str) -> Option<&str> {
        self.registry.get(name).map(|u| u.text.as_str())
    }

    pub fn is_compiled(&self, name: &str) -> bool {
        self.registry.is_compiled(name)
    }

    /// Pending names in registration order
    pub fn pending_names(&self) -> &[String] {
        self.registry.pending_names()
    }

    /// Names of every committed artifact, sorted
    pub fn artifact_names(&self) -> Vec<String> {
        self.files.artifact_store().names()
    }

    /// Compiled bytes of an artifact
    pub fn artifact_bytes(&self, name: &str) -> Option<Arc<[u8]>> {
        self.files.artifact_store().get(name)
    }

    /// Warnings of the last successful batch
    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    pub fn instance_id(&self) -> u64 {
        self.id
    }

    /// Type space backing this instance's loader
    pub fn space_id(&self) -> SpaceId {
        self.loader.space_id()
    }

    /// Names of the types loaded so far, sorted
    pub fn loaded_names(&self) -> Vec<String> {
        self.loader.loaded_names()
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }
}

impl Default for InMemoryCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InMemoryCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryCompiler")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("pending", &self.registry.pending_names())
            .field("artifacts", &self.artifact_names())
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        let mut compiler = InMemoryCompiler::new();
        assert_eq!(compiler.state(), CompilerState::Idle);
        compiler.add_source("demo.A", "class A { fn one() = 1; }");
        assert_eq!(compiler.state(), CompilerState::Dirty);
        compiler.compile().unwrap();
        assert_eq!(compiler.state(), CompilerState::Idle);

        compiler.add_source("demo.B", "class B { fn f() = ; }");
        assert!(compiler.compile().is_err());
        assert_eq!(compiler.state(), CompilerState::Idle);
    }

    #[test]
    fn test_rejected_add_keeps_state() {
        let mut compiler = InMemoryCompiler::new();
        compiler.add_source("demo.A", "class A {}");
        compiler.compile().unwrap();
        assert!(!compiler.add_source("demo.A", "class A {}"));
        assert_eq!(compiler.state(), CompilerState::Idle);
    }

    #[test]
    fn test_instance_ids_increase() {
        let a = InMemoryCompiler::new();
        let b = InMemoryCompiler::new();
        assert!(b.instance_id() > a.instance_id());
        assert_ne!(a.space_id(), b.space_id());
    }

    #[test]
    fn test_warnings_of_last_batch() {
        let mut compiler = InMemoryCompiler::new();
        compiler.add_source("demo.W", "class W { fn f(x) = 1; }");
        compiler.compile().unwrap();
        assert_eq!(compiler.warnings().len(), 1);
        assert_eq!(compiler.warnings()[0].code, "W0001");

        compiler.add_source("demo.Clean", "class Clean { fn f(x) = x; }");
        compiler.compile().unwrap();
        assert!(compiler.warnings().is_empty());
    }
}
