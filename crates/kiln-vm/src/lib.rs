//! Kiln VM
//!
//! Type spaces that define types from compiled images, and the interpreter
//! that runs their functions.
//!
//! A [`TypeSpace`] owns every type it defines. Handles returned from it
//! compare by identity, so the same image defined in two spaces yields two
//! unequal handles.

#![warn(rust_2018_idioms)]

pub mod error;
pub mod handle;
mod interpreter;
pub mod natives;
pub mod space;
pub mod stack;

pub use error::{DefineError, ResolveError, VmError, VmResult};
pub use handle::TypeHandle;
pub use space::{ArtifactFinder, ExecLimits, SpaceId, SpaceOptions, TypeSpace};
