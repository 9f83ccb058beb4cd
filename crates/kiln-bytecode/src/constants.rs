//! String constant pool
//!
//! Holds the type and function names referenced by `CALL_STATIC`. Entries are
//! deduplicated so each name is stored once per type image.

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};

/// Constant pool of interned strings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstantPool {
    /// Strings in index order
    pub strings: Vec<String>,
}

impl ConstantPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a string, returning the index of the existing entry if already present
    pub fn add_string(&mut self, value: &str) -> u32 {
        if let Some(index) = self.strings.iter().position(|s| s == value) {
            return index as u32;
        }
        self.strings.push(value.to_string());
        (self.strings.len() - 1) as u32
    }

    /// Get a string by index
    pub fn get_string(&self, index: u32) -> Option<&str> {
        self.strings.get(index as usize).map(|s| s.as_str())
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Check if the pool is empty
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub(crate) fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u32(self.strings.len() as u32);
        for s in &self.strings {
            writer.emit_string(s);
        }
    }

    pub(crate) fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let count = reader.read_u32()? as usize;
        let mut strings = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            strings.push(reader.read_string()?);
        }
        Ok(Self { strings })
    }
}
