//! Errors raised by type spaces and the interpreter

use kiln_bytecode::{DecodeError, ModuleError, VerifyError};
use thiserror::Error;

/// Failure to define a type from compiled bytes
#[derive(Debug, Error)]
pub enum DefineError {
    /// The bytes are not a well-formed image
    #[error("Malformed image: {0}")]
    Decode(#[from] ModuleError),

    /// The image decoded but its code is invalid
    #[error("Verification failed: {0}")]
    Verify(#[from] VerifyError),

    /// The image declares another type than the one requested
    #[error("Image declares '{found}', expected '{expected}'")]
    NameMismatch { expected: String, found: String },

    /// The space already holds a type with this name
    #[error("Type '{0}' is already defined in this space")]
    Duplicate(String),
}

/// Failure to resolve a type by name
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Neither defined nor findable
    #[error("Type not found: {0}")]
    NotFound(String),

    /// Found, but the bytes could not be defined
    #[error(transparent)]
    Define(#[from] DefineError),
}

/// Execution error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VmError {
    #[error("No function '{function}' in type '{type_name}'")]
    NoSuchFunction { type_name: String, function: String },

    #[error("Function '{function}' expects {expected} argument(s), got {actual}")]
    ArityMismatch {
        function: String,
        expected: usize,
        actual: usize,
    },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Integer overflow")]
    Overflow,

    /// Call depth exceeded the configured limit
    #[error("Stack overflow at call depth {0}")]
    StackOverflow(usize),

    #[error("Stack underflow")]
    StackUnderflow,

    /// A called type is not defined in the space and cannot be found
    #[error("Type not found: {0}")]
    TypeNotFound(String),

    /// A called type was found but could not be defined
    #[error("Cannot link '{name}': {message}")]
    Link { name: String, message: String },

    #[error("Invalid argument to {function}: {message}")]
    InvalidArgument {
        function: &'static str,
        message: String,
    },

    /// Bytecode that would have been rejected by verification
    #[error("Invalid bytecode: {0}")]
    InvalidBytecode(String),

    /// The type space owning the handle no longer exists
    #[error("Type space has been dropped")]
    SpaceDropped,
}

impl From<DecodeError> for VmError {
    fn from(e: DecodeError) -> Self {
        VmError::InvalidBytecode(e.to_string())
    }
}

/// VM execution result
pub type VmResult<T> = Result<T, VmError>;
