//! Kiln Bytecode Definitions
//!
//! This crate provides the instruction set, the compiled type image format,
//! the verifier and the platform library signatures shared by the Kiln
//! compiler and the Kiln type spaces.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod constants;
pub mod encoder;
pub mod module;
pub mod opcode;
pub mod platform;
pub mod verify;

pub use constants::ConstantPool;
pub use encoder::{BytecodeReader, BytecodeWriter, DecodeError, JumpPatch};
pub use module::{
    artifact_digest, Function, FunctionSignature, ModuleError, TypeImage, TypeSignature,
};
pub use opcode::Opcode;
pub use platform::NativeId;
pub use verify::{verify_image, VerifyError};
