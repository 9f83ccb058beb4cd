//! Handles to defined types

use kiln_bytecode::{FunctionSignature, TypeImage};
use std::fmt;
use std::sync::{Arc, Weak};

use crate::error::{VmError, VmResult};
use crate::interpreter::Interpreter;
use crate::space::{SpaceId, TypeSpace};

struct LoadedType {
    image: TypeImage,
    digest: String,
    space_id: SpaceId,
    space: Weak<TypeSpace>,
}

/// A type defined in a [`TypeSpace`]
///
/// Handles are cheap to clone. Equality is identity: two handles are equal
/// only when they come from the same definition in the same space.
#[derive(Clone)]
pub struct TypeHandle(Arc<LoadedType>);

impl TypeHandle {
    pub(crate) fn new(
        image: TypeImage,
        digest: String,
        space_id: SpaceId,
        space: Weak<TypeSpace>,
    ) -> Self {
        TypeHandle(Arc::new(LoadedType {
            image,
            digest,
            space_id,
            space,
        }))
    }

    /// Binary name
    pub fn name(&self) -> &str {
        &self.0.image.name
    }

    /// Binary name of the enclosing type
    pub fn outer(&self) -> Option<&str> {
        self.0.image.outer.as_deref()
    }

    pub fn source_file(&self) -> Option<&str> {
        self.0.image.source_file.as_deref()
    }

    pub fn space_id(&self) -> SpaceId {
        self.0.space_id
    }

    /// SHA-256 of the bytes the type was defined from, hex encoded
    pub fn digest(&self) -> &str {
        &self.0.digest
    }

    pub fn functions(&self) -> Vec<FunctionSignature> {
        self.0.image.signature().functions
    }

    pub fn arity(&self, function: &str) -> Option<usize> {
        self.0.image.function(function).map(|(_, f)| f.param_count)
    }

    pub(crate) fn image(&self) -> &TypeImage {
        &self.0.image
    }

    /// Call `function` with `args`
    pub fn invoke(&self, function: &str, args: &[i64]) -> VmResult<i64> {
        let space = self.0.space.upgrade().ok_or(VmError::SpaceDropped)?;
        let (index, f) = self
            .image()
            .function(function)
            .ok_or_else(|| VmError::NoSuchFunction {
                type_name: self.name().to_string(),
                function: function.to_string(),
            })?;
        if f.param_count != args.len() {
            return Err(VmError::ArityMismatch {
                function: format!("{}.{}", self.name(), function),
                expected: f.param_count,
                actual: args.len(),
            });
        }
        Interpreter::new(&space).call(self, index, args)
    }

    /// Check whether both handles refer to the same definition
    pub fn ptr_eq(&self, other: &TypeHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for TypeHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for TypeHandle {}

impl fmt::Debug for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeHandle")
            .field("name", &self.name())
            .field("space", &self.0.space_id)
            .finish()
    }
}

impl fmt::Display for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name(), self.0.space_id)
    }
}
