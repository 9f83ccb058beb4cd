//! Operand stack

use crate::error::{VmError, VmResult};

/// Operand stack of one activation
#[derive(Debug, Default)]
pub struct Stack {
    values: Vec<i64>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: i64) {
        self.values.push(value);
    }

    pub fn pop(&mut self) -> VmResult<i64> {
        self.values.pop().ok_or(VmError::StackUnderflow)
    }

    /// Pop the top `n` values, in push order
    pub fn pop_n(&mut self, n: usize) -> VmResult<Vec<i64>> {
        if self.values.len() < n {
            return Err(VmError::StackUnderflow);
        }
        let at = self.values.len() - n;
        Ok(self.values.split_off(at))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
