//! Loading compiled artifacts as types

use kiln_compiler::file::path_in;
use kiln_compiler::FileKind;
use kiln_vm::{
    ArtifactFinder, ExecLimits, ResolveError, SpaceId, SpaceOptions, TypeHandle, TypeSpace,
};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::RuntimeError;
use crate::options::CompilerOptions;
use crate::vfs::ArtifactStore;

/// Finds bytes for a binary name.
///
/// Search order:
/// 1. Artifacts committed by the owning compiler instance
/// 2. `<dir>/pkg/Name.kbc` for each classpath directory, in order
struct ArtifactSource {
    artifacts: ArtifactStore,
    classpath: Vec<PathBuf>,
}

impl ArtifactFinder for ArtifactSource {
    fn find(&self, name: &str) -> Option<Arc<[u8]>> {
        if let Some(bytes) = self.artifacts.get(name) {
            return Some(bytes);
        }
        self.classpath.iter().find_map(|dir| {
            let path = path_in(dir, name, FileKind::Output);
            std::fs::read(&path).ok().map(|bytes| {
                log::debug!("Found {} on classpath at {}", name, path.display());
                Arc::from(bytes)
            })
        })
    }
}

/// Turns artifacts into types, one type space per compiler instance
#[derive(Debug)]
pub struct ByteCodeLoader {
    space: Arc<TypeSpace>,
}

impl ByteCodeLoader {
    pub fn new(artifacts: ArtifactStore, options: &CompilerOptions) -> Self {
        let finder = ArtifactSource {
            artifacts,
            classpath: options.classpath.clone(),
        };
        let space = TypeSpace::with_options(
            Arc::new(finder),
            SpaceOptions {
                limits: ExecLimits {
                    max_call_depth: options.max_call_depth,
                },
                verify: options.verify_bytecode,
            },
        );
        Self { space }
    }

    /// Type named `name`, defining it on first request
    pub fn load(&self, name: &str) -> Result<TypeHandle, RuntimeError> {
        self.space.resolve(name).map_err(|e| match e {
            ResolveError::NotFound(name) => RuntimeError::ClassNotFound(name),
            ResolveError::Define(source) => RuntimeError::Define {
                name: name.to_string(),
                source,
            },
        })
    }

    pub fn space_id(&self) -> SpaceId {
        self.space.id()
    }

    /// Names defined so far, sorted
    pub fn loaded_names(&self) -> Vec<String> {
        self.space.loaded_names()
    }
}
