//! Compiled type image format (.kbc)
//!
//! One image is produced per compiled type, including nested and auxiliary
//! types. Images are self-contained: cross-type calls reference their target
//! by binary name through the constant pool.

use crate::constants::ConstantPool;
use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Magic number for Kiln type images: "KILN"
pub const MAGIC: [u8; 4] = *b"KILN";

/// Current image format version
pub const VERSION: u32 = 1;

/// Size of the fixed header: magic + version + flags + checksum
pub const HEADER_SIZE: usize = 16;

/// Image encoding/decoding errors
#[derive(Debug, Error)]
pub enum ModuleError {
    /// Decode error
    #[error("Decode error: {0}")]
    DecodeError(#[from] DecodeError),

    /// Invalid magic number
    #[error("Invalid magic number: expected KILN, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported version
    #[error("Unsupported version: {0} (current: {VERSION})")]
    UnsupportedVersion(u32),

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Bytes left over after the last section
    #[error("Trailing data after offset {0}")]
    TrailingData(usize),
}

/// Image flags
pub mod flags {
    /// The type is declared inside another type
    pub const NESTED: u32 = 1 << 0;
}

/// Function definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    /// Function name
    pub name: String,
    /// Number of parameters
    pub param_count: usize,
    /// Bytecode instructions
    pub code: Vec<u8>,
}

impl Function {
    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_string(&self.name);
        writer.emit_u32(self.param_count as u32);
        writer.emit_u32(self.code.len() as u32);
        writer.buffer.extend_from_slice(&self.code);
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let name = reader.read_string()?;
        let param_count = reader.read_u32()? as usize;
        let code_len = reader.read_u32()? as usize;
        let code = reader.read_bytes(code_len)?;
        Ok(Self {
            name,
            param_count,
            code,
        })
    }
}

/// Name and arity of one callable function
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionSignature {
    /// Function name
    pub name: String,
    /// Number of parameters
    pub arity: usize,
}

/// The callable surface of a type, as seen by the compiler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSignature {
    /// Binary name of the type
    pub name: String,
    /// Functions declared by the type
    pub functions: Vec<FunctionSignature>,
}

impl TypeSignature {
    /// Look up a function by name
    pub fn function(&self, name: &str) -> Option<&FunctionSignature> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// A compiled type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeImage {
    /// Magic number (must be "KILN")
    pub magic: [u8; 4],
    /// Format version
    pub version: u32,
    /// Image flags
    pub flags: u32,
    /// Binary name (`pkg.Outer$Inner`)
    pub name: String,
    /// Binary name of the enclosing type, for nested types
    pub outer: Option<String>,
    /// Identifier of the source file this type was compiled from
    pub source_file: Option<String>,
    /// Constant pool
    pub constants: ConstantPool,
    /// Function definitions
    pub functions: Vec<Function>,
}

impl TypeImage {
    /// Create a new empty image
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            flags: 0,
            name: name.into(),
            outer: None,
            source_file: None,
            constants: ConstantPool::new(),
            functions: Vec::new(),
        }
    }

    /// Validate header fields
    pub fn validate(&self) -> Result<(), String> {
        if self.magic != MAGIC {
            return Err("Invalid magic number".to_string());
        }
        if self.version != VERSION {
            return Err(format!("Unsupported version: {}", self.version));
        }
        if self.name.is_empty() {
            return Err("Type name is empty".to_string());
        }
        Ok(())
    }

    /// Find a function by name, returning its index
    pub fn function(&self, name: &str) -> Option<(usize, &Function)> {
        self.functions.iter().enumerate().find(|(_, f)| f.name == name)
    }

    /// Callable surface of this type
    pub fn signature(&self) -> TypeSignature {
        TypeSignature {
            name: self.name.clone(),
            functions: self
                .functions
                .iter()
                .map(|f| FunctionSignature {
                    name: f.name.clone(),
                    arity: f.param_count,
                })
                .collect(),
        }
    }

    /// Encode the image to binary format
    ///
    /// Format:
    /// - Header: magic (4 bytes) + version (u32) + flags (u32) + checksum (u32)
    /// - Name, optional outer name, optional source file
    /// - Constant pool
    /// - Function table
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = BytecodeWriter::new();

        writer.buffer.extend_from_slice(&self.magic);
        writer.emit_u32(self.version);
        writer.emit_u32(self.flags);
        let checksum_offset = writer.offset();
        writer.emit_u32(0);

        writer.emit_string(&self.name);
        encode_optional(&mut writer, self.outer.as_deref());
        encode_optional(&mut writer, self.source_file.as_deref());

        self.constants.encode(&mut writer);

        writer.emit_u32(self.functions.len() as u32);
        for func in &self.functions {
            func.encode(&mut writer);
        }

        // CRC32 of everything after the header
        let checksum = crc32fast::hash(&writer.buffer[HEADER_SIZE..]);
        writer.patch_u32(checksum_offset, checksum);

        writer.into_bytes()
    }

    /// Decode an image from binary format
    pub fn decode(data: &[u8]) -> Result<Self, ModuleError> {
        let mut reader = BytecodeReader::new(data);

        let raw = reader.read_bytes(4)?;
        let magic = [raw[0], raw[1], raw[2], raw[3]];
        if magic != MAGIC {
            return Err(ModuleError::InvalidMagic(magic));
        }

        let version = reader.read_u32()?;
        if version != VERSION {
            return Err(ModuleError::UnsupportedVersion(version));
        }

        let flags = reader.read_u32()?;
        let stored_checksum = reader.read_u32()?;

        let calculated_checksum = crc32fast::hash(&data[HEADER_SIZE..]);
        if stored_checksum != calculated_checksum {
            return Err(ModuleError::ChecksumMismatch {
                expected: stored_checksum,
                actual: calculated_checksum,
            });
        }

        let name = reader.read_string()?;
        let outer = decode_optional(&mut reader)?;
        let source_file = decode_optional(&mut reader)?;

        let constants = ConstantPool::decode(&mut reader)?;

        let func_count = reader.read_u32()? as usize;
        let mut functions = Vec::with_capacity(func_count.min(1024));
        for _ in 0..func_count {
            functions.push(Function::decode(&mut reader)?);
        }

        if reader.has_more() {
            return Err(ModuleError::TrailingData(reader.position()));
        }

        Ok(Self {
            magic,
            version,
            flags,
            name,
            outer,
            source_file,
            constants,
            functions,
        })
    }
}

fn encode_optional(writer: &mut BytecodeWriter, value: Option<&str>) {
    match value {
        Some(s) => {
            writer.emit_u8(1);
            writer.emit_string(s);
        }
        None => writer.emit_u8(0),
    }
}

fn decode_optional(reader: &mut BytecodeReader<'_>) -> Result<Option<String>, DecodeError> {
    if reader.read_u8()? != 0 {
        Ok(Some(reader.read_string()?))
    } else {
        Ok(None)
    }
}

/// SHA-256 digest of an encoded artifact, as lowercase hex
pub fn artifact_digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
