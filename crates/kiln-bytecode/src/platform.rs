//! Platform library
//!
//! Types that every compiler and every type space knows without an artifact.
//! The compiler type-checks calls against these signatures; the interpreter
//! dispatches them to native implementations by [`NativeId`].

use crate::module::{FunctionSignature, TypeSignature};
use once_cell::sync::Lazy;

/// Identifies a native platform function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeId {
    /// `Math.abs(x)`
    MathAbs,
    /// `Math.min(a, b)`
    MathMin,
    /// `Math.max(a, b)`
    MathMax,
    /// `Math.pow(base, exp)`
    MathPow,
    /// `Math.clamp(x, lo, hi)`
    MathClamp,
    /// `Math.signum(x)`
    MathSignum,
}

struct PlatformFunction {
    type_name: &'static str,
    name: &'static str,
    arity: usize,
    id: NativeId,
}

const PLATFORM_FUNCTIONS: &[PlatformFunction] = &[
    PlatformFunction { type_name: "Math", name: "abs", arity: 1, id: NativeId::MathAbs },
    PlatformFunction { type_name: "Math", name: "min", arity: 2, id: NativeId::MathMin },
    PlatformFunction { type_name: "Math", name: "max", arity: 2, id: NativeId::MathMax },
    PlatformFunction { type_name: "Math", name: "pow", arity: 2, id: NativeId::MathPow },
    PlatformFunction { type_name: "Math", name: "clamp", arity: 3, id: NativeId::MathClamp },
    PlatformFunction { type_name: "Math", name: "signum", arity: 1, id: NativeId::MathSignum },
];

static PLATFORM_TYPES: Lazy<Vec<TypeSignature>> = Lazy::new(|| {
    let mut types: Vec<TypeSignature> = Vec::new();
    for f in PLATFORM_FUNCTIONS {
        let sig = FunctionSignature {
            name: f.name.to_string(),
            arity: f.arity,
        };
        match types.iter_mut().find(|t| t.name == f.type_name) {
            Some(t) => t.functions.push(sig),
            None => types.push(TypeSignature {
                name: f.type_name.to_string(),
                functions: vec![sig],
            }),
        }
    }
    types
});

/// Signature of a platform type, if `name` is one
pub fn platform_type(name: &str) -> Option<&'static TypeSignature> {
    PLATFORM_TYPES.iter().find(|t| t.name == name)
}

/// Check if `name` is a platform type
pub fn is_platform_type(name: &str) -> bool {
    platform_type(name).is_some()
}

/// Resolve a platform function to its native id and arity
pub fn lookup_native(type_name: &str, function: &str) -> Option<(NativeId, usize)> {
    PLATFORM_FUNCTIONS
        .iter()
        .find(|f| f.type_name == type_name && f.name == function)
        .map(|f| (f.id, f.arity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_math_is_platform_type() {
        let math = platform_type("Math").unwrap();
        assert_eq!(math.function("clamp").map(|f| f.arity), Some(3));
        assert!(!is_platform_type("demo.Math"));
    }

    #[test]
    fn test_lookup_native() {
        assert_eq!(lookup_native("Math", "max"), Some((NativeId::MathMax, 2)));
        assert_eq!(lookup_native("Math", "sqrt"), None);
    }
}
