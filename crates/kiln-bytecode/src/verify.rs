//! Bytecode verification
//!
//! Run before a type image is defined into a type space, so the interpreter
//! can rely on well-formed instruction streams.

use crate::encoder::{BytecodeReader, DecodeError};
use crate::module::{Function, TypeImage};
use crate::opcode::Opcode;
use std::collections::HashSet;

/// Bytecode verification errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VerifyError {
    /// Instruction stream could not be decoded
    #[error("In function '{function}': {source}")]
    Decode {
        function: String,
        #[source]
        source: DecodeError,
    },

    /// Invalid jump target
    #[error("In function '{function}': invalid jump target {target} at offset {offset}")]
    InvalidJumpTarget {
        function: String,
        target: i64,
        offset: usize,
    },

    /// Invalid constant pool reference
    #[error(
        "In function '{function}': invalid constant pool reference {index} at offset {offset}"
    )]
    InvalidConstantRef {
        function: String,
        index: u32,
        offset: usize,
    },

    /// Invalid local variable reference
    #[error(
        "In function '{function}': invalid local reference {index} (max {max}) at offset {offset}"
    )]
    InvalidLocalRef {
        function: String,
        index: usize,
        max: usize,
        offset: usize,
    },

    /// Invalid function reference
    #[error("In function '{function}': invalid function reference {index} at offset {offset}")]
    InvalidFunctionRef {
        function: String,
        index: u32,
        offset: usize,
    },

    /// More parameters than a call can pass
    #[error("Function '{function}' declares {count} parameters, at most 65535 are callable")]
    TooManyParameters { function: String, count: usize },

    /// Execution falls off end
    #[error("Function '{0}' does not end with a terminator")]
    FallOffEnd(String),

    /// Two functions share a name
    #[error("Duplicate function '{0}'")]
    DuplicateFunction(String),

    /// Image header validation error
    #[error("Image validation error: {0}")]
    ImageValidation(String),
}

/// Verify every function of a type image
pub fn verify_image(image: &TypeImage) -> Result<(), VerifyError> {
    image.validate().map_err(VerifyError::ImageValidation)?;

    let mut seen = HashSet::new();
    for function in &image.functions {
        if !seen.insert(function.name.as_str()) {
            return Err(VerifyError::DuplicateFunction(function.name.clone()));
        }
        verify_function(function, image)?;
    }

    Ok(())
}

/// Decoded instruction with its raw operand block
#[derive(Debug, Clone)]
struct Instruction {
    offset: usize,
    opcode: Opcode,
    operands: Vec<u8>,
}

fn verify_function(function: &Function, image: &TypeImage) -> Result<(), VerifyError> {
    let decode = |source| VerifyError::Decode {
        function: function.name.clone(),
        source,
    };

    if u16::try_from(function.param_count).is_err() {
        return Err(VerifyError::TooManyParameters {
            function: function.name.clone(),
            count: function.param_count,
        });
    }

    let mut instructions = Vec::new();
    let mut reader = BytecodeReader::new(&function.code);
    while reader.has_more() {
        let offset = reader.position();
        let opcode = reader.read_opcode().map_err(decode)?;
        let operands = reader.read_bytes(opcode.operand_size()).map_err(decode)?;
        instructions.push(Instruction {
            offset,
            opcode,
            operands,
        });
    }

    match instructions.last() {
        Some(last) if last.opcode.is_terminator() => {}
        _ => return Err(VerifyError::FallOffEnd(function.name.clone())),
    }

    let boundaries: HashSet<usize> = instructions.iter().map(|i| i.offset).collect();

    for instr in &instructions {
        let ops = &instr.operands;
        match instr.opcode {
            Opcode::LoadLocal => {
                let index = u16::from_le_bytes([ops[0], ops[1]]) as usize;
                if index >= function.param_count {
                    return Err(VerifyError::InvalidLocalRef {
                        function: function.name.clone(),
                        index,
                        max: function.param_count,
                        offset: instr.offset,
                    });
                }
            }
            Opcode::Jmp | Opcode::JmpIfFalse => {
                let relative = i32::from_le_bytes([ops[0], ops[1], ops[2], ops[3]]) as i64;
                let target = (instr.offset + 1 + 4) as i64 + relative;
                if target < 0 || !boundaries.contains(&(target as usize)) {
                    return Err(VerifyError::InvalidJumpTarget {
                        function: function.name.clone(),
                        target,
                        offset: instr.offset,
                    });
                }
            }
            Opcode::Call => {
                let index = u32::from_le_bytes([ops[0], ops[1], ops[2], ops[3]]);
                if index as usize >= image.functions.len() {
                    return Err(VerifyError::InvalidFunctionRef {
                        function: function.name.clone(),
                        index,
                        offset: instr.offset,
                    });
                }
            }
            Opcode::CallStatic => {
                for at in [0usize, 4] {
                    let index =
                        u32::from_le_bytes([ops[at], ops[at + 1], ops[at + 2], ops[at + 3]]);
                    if image.constants.get_string(index).is_none() {
                        return Err(VerifyError::InvalidConstantRef {
                            function: function.name.clone(),
                            index,
                            offset: instr.offset,
                        });
                    }
                }
            }
            _ => {}
        }
    }

    Ok(())
}
