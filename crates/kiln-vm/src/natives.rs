//! Native implementations of the platform library

use kiln_bytecode::NativeId;

use crate::error::{VmError, VmResult};

/// Run a platform function. Arity has been checked by the caller.
pub fn call(id: NativeId, args: &[i64]) -> VmResult<i64> {
    match (id, args) {
        (NativeId::MathAbs, [x]) => x.checked_abs().ok_or(VmError::Overflow),
        (NativeId::MathMin, [a, b]) => Ok(*a.min(b)),
        (NativeId::MathMax, [a, b]) => Ok(*a.max(b)),
        (NativeId::MathPow, [base, exp]) => {
            let exp = u32::try_from(*exp).map_err(|_| VmError::InvalidArgument {
                function: "Math.pow",
                message: format!("exponent {} is negative or too large", exp),
            })?;
            base.checked_pow(exp).ok_or(VmError::Overflow)
        }
        (NativeId::MathClamp, [x, lo, hi]) => {
            if lo > hi {
                return Err(VmError::InvalidArgument {
                    function: "Math.clamp",
                    message: format!("lower bound {} exceeds upper bound {}", lo, hi),
                });
            }
            Ok(*x.clamp(lo, hi))
        }
        (NativeId::MathSignum, [x]) => Ok(x.signum()),
        (id, args) => Err(VmError::ArityMismatch {
            function: format!("{:?}", id),
            expected: native_arity(id),
            actual: args.len(),
        }),
    }
}

fn native_arity(id: NativeId) -> usize {
    match id {
        NativeId::MathAbs | NativeId::MathSignum => 1,
        NativeId::MathMin | NativeId::MathMax | NativeId::MathPow => 2,
        NativeId::MathClamp => 3,
    }
}
