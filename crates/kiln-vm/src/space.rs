//! Type spaces
//!
//! A [`TypeSpace`] is the unit of type identity: a name is defined at most
//! once per space, and two spaces defining the same bytes produce two
//! distinct types. Types a running function calls are resolved through the
//! space that defined the caller.

use kiln_bytecode::{artifact_digest, verify_image, TypeImage};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::error::{DefineError, ResolveError};
use crate::handle::TypeHandle;

static NEXT_SPACE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a type space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpaceId(u64);

impl SpaceId {
    fn next() -> Self {
        SpaceId(NEXT_SPACE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "space#{}", self.0)
    }
}

/// Source of compiled bytes for names a space has not defined yet
pub trait ArtifactFinder: Send + Sync {
    fn find(&self, name: &str) -> Option<Arc<[u8]>>;
}

impl<F> ArtifactFinder for F
where
    F: Fn(&str) -> Option<Arc<[u8]>> + Send + Sync,
{
    fn find(&self, name: &str) -> Option<Arc<[u8]>> {
        self(name)
    }
}

/// Execution limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecLimits {
    /// Maximum nesting of calls, including the entry call
    pub max_call_depth: usize,
}

impl Default for ExecLimits {
    fn default() -> Self {
        Self { max_call_depth: 256 }
    }
}

/// Type space configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceOptions {
    pub limits: ExecLimits,
    /// Run the bytecode verifier on every definition
    pub verify: bool,
}

impl Default for SpaceOptions {
    fn default() -> Self {
        Self {
            limits: ExecLimits::default(),
            verify: true,
        }
    }
}

/// A set of defined types sharing one namespace
pub struct TypeSpace {
    id: SpaceId,
    this: Weak<TypeSpace>,
    finder: Arc<dyn ArtifactFinder>,
    types: RwLock<FxHashMap<String, TypeHandle>>,
    options: SpaceOptions,
}

impl TypeSpace {
    /// Create a space with default options
    pub fn new(finder: Arc<dyn ArtifactFinder>) -> Arc<Self> {
        Self::with_options(finder, SpaceOptions::default())
    }

    pub fn with_options(finder: Arc<dyn ArtifactFinder>, options: SpaceOptions) -> Arc<Self> {
        Arc::new_cyclic(|this| TypeSpace {
            id: SpaceId::next(),
            this: this.clone(),
            finder,
            types: RwLock::new(FxHashMap::default()),
            options,
        })
    }

    pub fn id(&self) -> SpaceId {
        self.id
    }

    pub fn limits(&self) -> ExecLimits {
        self.options.limits
    }

    /// Define `name` from compiled bytes
    ///
    /// The bytes must decode to an image named `name`, pass verification
    /// (unless disabled) and the name must not be defined yet.
    pub fn define(&self, name: &str, bytes: &[u8]) -> Result<TypeHandle, DefineError> {
        if self.types.read().contains_key(name) {
            return Err(DefineError::Duplicate(name.to_string()));
        }

        let image = TypeImage::decode(bytes)?;
        if image.name != name {
            return Err(DefineError::NameMismatch {
                expected: name.to_string(),
                found: image.name,
            });
        }
        if self.options.verify {
            verify_image(&image)?;
        }

        let digest = artifact_digest(bytes);
        let handle = TypeHandle::new(image, digest, self.id, self.this.clone());

        let mut types = self.types.write();
        if types.contains_key(name) {
            return Err(DefineError::Duplicate(name.to_string()));
        }
        types.insert(name.to_string(), handle.clone());
        drop(types);

        log::debug!(
            "Defined {} in {} (sha256 {})",
            name,
            self.id,
            &handle.digest()[..12]
        );
        Ok(handle)
    }

    /// Handle for `name`, defining it from the finder on first use
    pub fn resolve(&self, name: &str) -> Result<TypeHandle, ResolveError> {
        if let Some(handle) = self.find_loaded(name) {
            return Ok(handle);
        }
        let bytes = self
            .finder
            .find(name)
            .ok_or_else(|| ResolveError::NotFound(name.to_string()))?;
        match self.define(name, &bytes) {
            Ok(handle) => Ok(handle),
            // Another thread defined it between the lookup and the define.
            Err(DefineError::Duplicate(_)) => self
                .find_loaded(name)
                .ok_or_else(|| ResolveError::NotFound(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Handle for `name` if it is already defined
    pub fn find_loaded(&self, name: &str) -> Option<TypeHandle> {
        self.types.read().get(name).cloned()
    }

    /// Names of all defined types, sorted
    pub fn loaded_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }
}

impl fmt::Debug for TypeSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeSpace")
            .field("id", &self.id)
            .field("types", &self.loaded_names())
            .field("options", &self.options)
            .finish()
    }
}
