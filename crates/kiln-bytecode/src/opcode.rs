//! Bytecode opcodes for compiled Kiln types
//!
//! Every instruction is a single opcode byte followed by a fixed-size operand
//! block. Values on the operand stack are 64-bit signed integers; booleans are
//! encoded as `0` and `1`.
//!
//! Opcodes are organized into categories:
//! - 0x00-0x0F: Stack manipulation & constants
//! - 0x10-0x1F: Local variables
//! - 0x20-0x2F: Integer arithmetic
//! - 0x50-0x5F: Integer comparison
//! - 0x70-0x7F: Logical
//! - 0x90-0x9F: Control flow
//! - 0xA0-0xAF: Function calls

/// Bytecode opcode enumeration
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ===== Stack Manipulation & Constants (0x00-0x0F) =====
    /// No operation
    Nop = 0x00,
    /// Pop top value from stack
    Pop = 0x01,
    /// Push true (1)
    ConstTrue = 0x05,
    /// Push false (0)
    ConstFalse = 0x06,
    /// Push 64-bit integer constant (operand: i64)
    ConstI64 = 0x07,

    // ===== Local Variables (0x10-0x1F) =====
    /// Load parameter onto stack (operand: u16 index)
    LoadLocal = 0x10,

    // ===== Integer Arithmetic (0x20-0x2F) =====
    /// Integer addition: pop b, pop a, push a + b
    Iadd = 0x20,
    /// Integer subtraction: pop b, pop a, push a - b
    Isub = 0x21,
    /// Integer multiplication: pop b, pop a, push a * b
    Imul = 0x22,
    /// Integer division: pop b, pop a, push a / b
    Idiv = 0x23,
    /// Integer modulo: pop b, pop a, push a % b
    Imod = 0x24,
    /// Integer negation: pop a, push -a
    Ineg = 0x25,

    // ===== Integer Comparison (0x50-0x5F) =====
    /// Integer equality: pop b, pop a, push a == b
    Ieq = 0x50,
    /// Integer inequality: pop b, pop a, push a != b
    Ine = 0x51,
    /// Integer less than: pop b, pop a, push a < b
    Ilt = 0x52,
    /// Integer less or equal: pop b, pop a, push a <= b
    Ile = 0x53,
    /// Integer greater than: pop b, pop a, push a > b
    Igt = 0x54,
    /// Integer greater or equal: pop b, pop a, push a >= b
    Ige = 0x55,

    // ===== Logical (0x70-0x7F) =====
    /// Logical not: pop a, push a == 0
    Not = 0x70,

    // ===== Control Flow (0x90-0x9F) =====
    /// Unconditional jump (operand: i32 offset from the next instruction)
    Jmp = 0x90,
    /// Pop a, jump if a == 0 (operand: i32 offset from the next instruction)
    JmpIfFalse = 0x91,

    // ===== Function Calls (0xA0-0xAF) =====
    /// Call a function of the same type (operands: u32 function index, u16 arg count)
    Call = 0xA0,
    /// Call a function of another type
    /// (operands: u32 type constant, u32 function constant, u16 arg count)
    CallStatic = 0xA1,
    /// Return top of stack to the caller
    Return = 0xA2,
}

impl Opcode {
    /// Convert a byte to an opcode
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Nop),
            0x01 => Some(Self::Pop),
            0x05 => Some(Self::ConstTrue),
            0x06 => Some(Self::ConstFalse),
            0x07 => Some(Self::ConstI64),
            0x10 => Some(Self::LoadLocal),
            0x20 => Some(Self::Iadd),
            0x21 => Some(Self::Isub),
            0x22 => Some(Self::Imul),
            0x23 => Some(Self::Idiv),
            0x24 => Some(Self::Imod),
            0x25 => Some(Self::Ineg),
            0x50 => Some(Self::Ieq),
            0x51 => Some(Self::Ine),
            0x52 => Some(Self::Ilt),
            0x53 => Some(Self::Ile),
            0x54 => Some(Self::Igt),
            0x55 => Some(Self::Ige),
            0x70 => Some(Self::Not),
            0x90 => Some(Self::Jmp),
            0x91 => Some(Self::JmpIfFalse),
            0xA0 => Some(Self::Call),
            0xA1 => Some(Self::CallStatic),
            0xA2 => Some(Self::Return),
            _ => None,
        }
    }

    /// Convert opcode to byte
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Get the human-readable name of the opcode
    pub fn name(self) -> &'static str {
        match self {
            Self::Nop => "NOP",
            Self::Pop => "POP",
            Self::ConstTrue => "CONST_TRUE",
            Self::ConstFalse => "CONST_FALSE",
            Self::ConstI64 => "CONST_I64",
            Self::LoadLocal => "LOAD_LOCAL",
            Self::Iadd => "IADD",
            Self::Isub => "ISUB",
            Self::Imul => "IMUL",
            Self::Idiv => "IDIV",
            Self::Imod => "IMOD",
            Self::Ineg => "INEG",
            Self::Ieq => "IEQ",
            Self::Ine => "INE",
            Self::Ilt => "ILT",
            Self::Ile => "ILE",
            Self::Igt => "IGT",
            Self::Ige => "IGE",
            Self::Not => "NOT",
            Self::Jmp => "JMP",
            Self::JmpIfFalse => "JMP_IF_FALSE",
            Self::Call => "CALL",
            Self::CallStatic => "CALL_STATIC",
            Self::Return => "RETURN",
        }
    }

    /// Size in bytes of the operand block following the opcode
    pub fn operand_size(self) -> usize {
        match self {
            Self::LoadLocal => 2,
            Self::Jmp | Self::JmpIfFalse => 4,
            Self::Call => 6,
            Self::ConstI64 => 8,
            Self::CallStatic => 10,
            _ => 0,
        }
    }

    /// Check if this opcode is a jump instruction
    pub fn is_jump(self) -> bool {
        matches!(self, Self::Jmp | Self::JmpIfFalse)
    }

    /// Check if this opcode is a call instruction
    pub fn is_call(self) -> bool {
        matches!(self, Self::Call | Self::CallStatic)
    }

    /// Check if this opcode terminates a basic block
    pub fn is_terminator(self) -> bool {
        self.is_jump() || self == Self::Return
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
