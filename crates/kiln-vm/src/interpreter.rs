//! Bytecode interpreter
//!
//! Each call runs in its own activation with a fresh operand stack; calls
//! recurse on the Rust stack, bounded by [`ExecLimits::max_call_depth`].
//!
//! [`ExecLimits::max_call_depth`]: crate::space::ExecLimits::max_call_depth

use kiln_bytecode::platform::lookup_native;
use kiln_bytecode::{BytecodeReader, Opcode};

use crate::error::{ResolveError, VmError, VmResult};
use crate::handle::TypeHandle;
use crate::natives;
use crate::space::{ExecLimits, TypeSpace};
use crate::stack::Stack;

/// Outcome of executing one instruction
enum OpcodeResult {
    Continue,
    Return(i64),
}

pub(crate) struct Interpreter<'s> {
    space: &'s TypeSpace,
    limits: ExecLimits,
    depth: usize,
}

impl<'s> Interpreter<'s> {
    pub(crate) fn new(space: &'s TypeSpace) -> Self {
        Self {
            space,
            limits: space.limits(),
            depth: 0,
        }
    }

    /// Run function `index` of `ty`
    pub(crate) fn call(&mut self, ty: &TypeHandle, index: usize, args: &[i64]) -> VmResult<i64> {
        if self.depth >= self.limits.max_call_depth {
            return Err(VmError::StackOverflow(self.depth));
        }
        self.depth += 1;
        let result = self.run(ty, index, args);
        self.depth -= 1;
        result
    }

    fn run(&mut self, ty: &TypeHandle, index: usize, locals: &[i64]) -> VmResult<i64> {
        let function = ty.image().functions.get(index).ok_or_else(|| {
            VmError::InvalidBytecode(format!("no function #{} in '{}'", index, ty.name()))
        })?;
        let code = &function.code;
        let mut reader = BytecodeReader::new(code);
        let mut stack = Stack::new();

        loop {
            let opcode = reader.read_opcode()?;
            let result = match opcode {
                Opcode::Nop
                | Opcode::Pop
                | Opcode::ConstTrue
                | Opcode::ConstFalse
                | Opcode::ConstI64
                | Opcode::LoadLocal => self.exec_stack_ops(&mut reader, &mut stack, locals, opcode),
                Opcode::Iadd
                | Opcode::Isub
                | Opcode::Imul
                | Opcode::Idiv
                | Opcode::Imod
                | Opcode::Ineg => exec_arithmetic_ops(&mut stack, opcode),
                Opcode::Ieq
                | Opcode::Ine
                | Opcode::Ilt
                | Opcode::Ile
                | Opcode::Igt
                | Opcode::Ige
                | Opcode::Not => exec_comparison_ops(&mut stack, opcode),
                Opcode::Jmp | Opcode::JmpIfFalse => {
                    exec_jump_ops(&mut reader, &mut stack, code.len(), opcode)
                }
                Opcode::Call | Opcode::CallStatic | Opcode::Return => {
                    self.exec_call_ops(ty, &mut reader, &mut stack, opcode)
                }
            }?;
            if let OpcodeResult::Return(value) = result {
                return Ok(value);
            }
        }
    }

    fn exec_stack_ops(
        &mut self,
        reader: &mut BytecodeReader<'_>,
        stack: &mut Stack,
        locals: &[i64],
        opcode: Opcode,
    ) -> VmResult<OpcodeResult> {
        match opcode {
            Opcode::Nop => {}
            Opcode::Pop => {
                stack.pop()?;
            }
            Opcode::ConstTrue => stack.push(1),
            Opcode::ConstFalse => stack.push(0),
            Opcode::ConstI64 => stack.push(reader.read_i64()?),
            Opcode::LoadLocal => {
                let index = reader.read_u16()? as usize;
                let value = locals.get(index).copied().ok_or_else(|| {
                    VmError::InvalidBytecode(format!("local {} out of range", index))
                })?;
                stack.push(value);
            }
            _ => unreachable!("Not a stack opcode: {:?}", opcode),
        }
        Ok(OpcodeResult::Continue)
    }

    fn exec_call_ops(
        &mut self,
        ty: &TypeHandle,
        reader: &mut BytecodeReader<'_>,
        stack: &mut Stack,
        opcode: Opcode,
    ) -> VmResult<OpcodeResult> {
        match opcode {
            Opcode::Call => {
                let index = reader.read_u32()? as usize;
                let argc = reader.read_u16()? as usize;
                let args = stack.pop_n(argc)?;
                let expected = ty
                    .image()
                    .functions
                    .get(index)
                    .map(|f| f.param_count)
                    .ok_or_else(|| {
                        VmError::InvalidBytecode(format!("call to missing function #{}", index))
                    })?;
                if expected != argc {
                    return Err(VmError::ArityMismatch {
                        function: ty.image().functions[index].name.clone(),
                        expected,
                        actual: argc,
                    });
                }
                stack.push(self.call(ty, index, &args)?);
            }
            Opcode::CallStatic => {
                let type_const = reader.read_u32()?;
                let function_const = reader.read_u32()?;
                let argc = reader.read_u16()? as usize;
                let constants = &ty.image().constants;
                let (Some(type_name), Some(function)) = (
                    constants.get_string(type_const),
                    constants.get_string(function_const),
                ) else {
                    return Err(VmError::InvalidBytecode(
                        "call target outside the constant pool".to_string(),
                    ));
                };
                let args = stack.pop_n(argc)?;
                stack.push(self.call_static(type_name, function, &args)?);
            }
            Opcode::Return => return Ok(OpcodeResult::Return(stack.pop()?)),
            _ => unreachable!("Not a call opcode: {:?}", opcode),
        }
        Ok(OpcodeResult::Continue)
    }

    /// Call `type_name.function`: platform natives first, then types of this space.
    fn call_static(&mut self, type_name: &str, function: &str, args: &[i64]) -> VmResult<i64> {
        if let Some((native, arity)) = lookup_native(type_name, function) {
            if arity != args.len() {
                return Err(VmError::ArityMismatch {
                    function: format!("{}.{}", type_name, function),
                    expected: arity,
                    actual: args.len(),
                });
            }
            return natives::call(native, args);
        }

        let target = self.space.resolve(type_name).map_err(|e| match e {
            ResolveError::NotFound(name) => VmError::TypeNotFound(name),
            ResolveError::Define(e) => VmError::Link {
                name: type_name.to_string(),
                message: e.to_string(),
            },
        })?;
        let (index, f) = target
            .image()
            .function(function)
            .ok_or_else(|| VmError::NoSuchFunction {
                type_name: type_name.to_string(),
                function: function.to_string(),
            })?;
        if f.param_count != args.len() {
            return Err(VmError::ArityMismatch {
                function: format!("{}.{}", type_name, function),
                expected: f.param_count,
                actual: args.len(),
            });
        }
        self.call(&target, index, args)
    }
}

fn exec_arithmetic_ops(stack: &mut Stack, opcode: Opcode) -> VmResult<OpcodeResult> {
    if opcode == Opcode::Ineg {
        let a = stack.pop()?;
        stack.push(a.checked_neg().ok_or(VmError::Overflow)?);
        return Ok(OpcodeResult::Continue);
    }

    let b = stack.pop()?;
    let a = stack.pop()?;
    let value = match opcode {
        Opcode::Iadd => a.checked_add(b),
        Opcode::Isub => a.checked_sub(b),
        Opcode::Imul => a.checked_mul(b),
        Opcode::Idiv | Opcode::Imod if b == 0 => return Err(VmError::DivisionByZero),
        Opcode::Idiv => a.checked_div(b),
        Opcode::Imod => a.checked_rem(b),
        _ => unreachable!("Not an arithmetic opcode: {:?}", opcode),
    };
    stack.push(value.ok_or(VmError::Overflow)?);
    Ok(OpcodeResult::Continue)
}

fn exec_comparison_ops(stack: &mut Stack, opcode: Opcode) -> VmResult<OpcodeResult> {
    if opcode == Opcode::Not {
        let a = stack.pop()?;
        stack.push((a == 0) as i64);
        return Ok(OpcodeResult::Continue);
    }

    let b = stack.pop()?;
    let a = stack.pop()?;
    let result = match opcode {
        Opcode::Ieq => a == b,
        Opcode::Ine => a != b,
        Opcode::Ilt => a < b,
        Opcode::Ile => a <= b,
        Opcode::Igt => a > b,
        Opcode::Ige => a >= b,
        _ => unreachable!("Not a comparison opcode: {:?}", opcode),
    };
    stack.push(result as i64);
    Ok(OpcodeResult::Continue)
}

fn exec_jump_ops(
    reader: &mut BytecodeReader<'_>,
    stack: &mut Stack,
    code_len: usize,
    opcode: Opcode,
) -> VmResult<OpcodeResult> {
    let offset = reader.read_i32()? as i64;
    let taken = match opcode {
        Opcode::Jmp => true,
        Opcode::JmpIfFalse => stack.pop()? == 0,
        _ => unreachable!("Not a jump opcode: {:?}", opcode),
    };
    if taken {
        let target = reader.position() as i64 + offset;
        if target < 0 || target as usize >= code_len {
            return Err(VmError::InvalidBytecode(format!(
                "jump target {} outside function",
                target
            )));
        }
        reader.seek(target as usize);
    }
    Ok(OpcodeResult::Continue)
}
