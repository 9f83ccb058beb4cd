//! Bytecode encoding and decoding utilities
//!
//! This module provides the writer used by code generation and the reader used
//! by the verifier and the interpreter.

use crate::opcode::Opcode;
use thiserror::Error;

/// Errors that can occur during bytecode decoding
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Unexpected end of bytecode stream
    #[error("Unexpected end of bytecode at offset {0}")]
    UnexpectedEnd(usize),

    /// Invalid UTF-8 string
    #[error("Invalid UTF-8 string at offset {0}")]
    InvalidUtf8(usize),

    /// Invalid opcode
    #[error("Invalid opcode {0} at offset {1}")]
    InvalidOpcode(u8, usize),
}

/// Bytecode writer for encoding instructions
///
/// Provides methods for emitting opcodes and their operands into a binary buffer.
#[derive(Debug, Default)]
pub struct BytecodeWriter {
    pub(crate) buffer: Vec<u8>,
}

/// Position of a jump operand waiting for its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a pending jump must be patched"]
pub struct JumpPatch(usize);

impl BytecodeWriter {
    /// Create a new bytecode writer
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Get the current bytecode buffer
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the writer and return the bytecode buffer
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get the current offset (length of bytecode)
    pub fn offset(&self) -> usize {
        self.buffer.len()
    }

    // ===== Basic Emission =====

    /// Emit a raw byte
    pub fn emit_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Emit a 16-bit unsigned integer (little-endian)
    pub fn emit_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit unsigned integer (little-endian)
    pub fn emit_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit signed integer (little-endian)
    pub fn emit_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 64-bit signed integer (little-endian)
    pub fn emit_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a length-prefixed UTF-8 string
    pub fn emit_string(&mut self, value: &str) {
        self.emit_u32(value.len() as u32);
        self.buffer.extend_from_slice(value.as_bytes());
    }

    /// Overwrite a previously emitted u32
    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        self.buffer[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    // ===== Opcode Emission =====

    /// Emit an opcode without operands
    pub fn emit_opcode(&mut self, opcode: Opcode) {
        self.emit_u8(opcode.to_u8());
    }

    /// Emit CONST_I64 instruction with value
    pub fn emit_const_i64(&mut self, value: i64) {
        self.emit_opcode(Opcode::ConstI64);
        self.emit_i64(value);
    }

    /// Emit CONST_TRUE or CONST_FALSE
    pub fn emit_const_bool(&mut self, value: bool) {
        self.emit_opcode(if value { Opcode::ConstTrue } else { Opcode::ConstFalse });
    }

    /// Emit LOAD_LOCAL instruction
    pub fn emit_load_local(&mut self, index: u16) {
        self.emit_opcode(Opcode::LoadLocal);
        self.emit_u16(index);
    }

    /// Emit CALL instruction
    pub fn emit_call(&mut self, function: u32, argc: u16) {
        self.emit_opcode(Opcode::Call);
        self.emit_u32(function);
        self.emit_u16(argc);
    }

    /// Emit CALL_STATIC instruction
    pub fn emit_call_static(&mut self, type_const: u32, function_const: u32, argc: u16) {
        self.emit_opcode(Opcode::CallStatic);
        self.emit_u32(type_const);
        self.emit_u32(function_const);
        self.emit_u16(argc);
    }

    /// Emit RETURN instruction
    pub fn emit_return(&mut self) {
        self.emit_opcode(Opcode::Return);
    }

    // ===== Jumps =====

    /// Emit a jump with a placeholder offset, to be resolved with [`patch_jump`](Self::patch_jump)
    pub fn emit_jump(&mut self, opcode: Opcode) -> JumpPatch {
        debug_assert!(opcode.is_jump());
        self.emit_opcode(opcode);
        let at = self.offset();
        self.emit_i32(0);
        JumpPatch(at)
    }

    /// Point a pending jump at the current offset
    pub fn patch_jump(&mut self, patch: JumpPatch) {
        let next_instruction = patch.0 + 4;
        let relative = self.offset() as i64 - next_instruction as i64;
        self.buffer[patch.0..patch.0 + 4].copy_from_slice(&(relative as i32).to_le_bytes());
    }
}

/// Bytecode reader for decoding instructions and module sections
pub struct BytecodeReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> BytecodeReader<'a> {
    /// Create a new reader over a buffer
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Get the current position in the buffer
    pub fn position(&self) -> usize {
        self.position
    }

    /// Check if there are more bytes to read
    pub fn has_more(&self) -> bool {
        self.position < self.buffer.len()
    }

    /// Seek to a specific position
    pub fn seek(&mut self, position: usize) {
        self.position = position;
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let end = self.position + N;
        if end > self.buffer.len() {
            return Err(DecodeError::UnexpectedEnd(self.position));
        }
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&self.buffer[self.position..end]);
        self.position = end;
        Ok(bytes)
    }

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take::<1>()?[0])
    }

    /// Read a 16-bit unsigned integer (little-endian)
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    /// Read a 32-bit unsigned integer (little-endian)
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    /// Read a 32-bit signed integer (little-endian)
    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    /// Read a 64-bit signed integer (little-endian)
    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_le_bytes(self.take()?))
    }

    /// Read a length-prefixed string (u32 length + UTF-8 bytes)
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let len = self.read_u32()? as usize;
        let start = self.position;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8(start))
    }

    /// Read a fixed number of bytes
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, DecodeError> {
        let end = self
            .position
            .checked_add(len)
            .filter(|&end| end <= self.buffer.len())
            .ok_or(DecodeError::UnexpectedEnd(self.position))?;
        let bytes = self.buffer[self.position..end].to_vec();
        self.position = end;
        Ok(bytes)
    }

    /// Read an opcode byte
    pub fn read_opcode(&mut self) -> Result<Opcode, DecodeError> {
        let offset = self.position;
        let byte = self.read_u8()?;
        Opcode::from_u8(byte).ok_or(DecodeError::InvalidOpcode(byte, offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_and_read_const() {
        let mut writer = BytecodeWriter::new();
        writer.emit_const_i64(-7);
        writer.emit_return();

        let bytes = writer.into_bytes();
        let mut reader = BytecodeReader::new(&bytes);
        assert_eq!(reader.read_opcode().unwrap(), Opcode::ConstI64);
        assert_eq!(reader.read_i64().unwrap(), -7);
        assert_eq!(reader.read_opcode().unwrap(), Opcode::Return);
        assert!(!reader.has_more());
    }

    #[test]
    fn test_patch_jump_forward() {
        let mut writer = BytecodeWriter::new();
        let jump = writer.emit_jump(Opcode::Jmp);
        writer.emit_const_i64(1);
        writer.patch_jump(jump);
        writer.emit_return();

        let bytes = writer.into_bytes();
        let mut reader = BytecodeReader::new(&bytes);
        reader.read_opcode().unwrap();
        let offset = reader.read_i32().unwrap();
        // Skips the 9-byte CONST_I64 instruction
        assert_eq!(offset, 9);
        reader.seek(reader.position() + offset as usize);
        assert_eq!(reader.read_opcode().unwrap(), Opcode::Return);
    }

    #[test]
    fn test_read_past_end() {
        let mut reader = BytecodeReader::new(&[1, 2]);
        assert_eq!(reader.read_u32(), Err(DecodeError::UnexpectedEnd(0)));
    }

    #[test]
    fn test_invalid_opcode() {
        let mut reader = BytecodeReader::new(&[0xEE]);
        assert_eq!(reader.read_opcode(), Err(DecodeError::InvalidOpcode(0xEE, 0)));
    }

    #[test]
    fn test_string_roundtrip() {
        let mut writer = BytecodeWriter::new();
        writer.emit_string("pricing.Rules$Tier");
        let bytes = writer.into_bytes();
        let mut reader = BytecodeReader::new(&bytes);
        assert_eq!(reader.read_string().unwrap(), "pricing.Rules$Tier");
    }
}
