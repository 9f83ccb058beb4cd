//! Code generation
//!
//! Lowers each type of the batch table to a [`TypeImage`]. Name resolution
//! happens here as well: every identifier, local call and qualified call is
//! checked while its code is emitted, so one walk produces both the
//! diagnostics and the images.

use kiln_bytecode::module::flags;
use kiln_bytecode::{BytecodeWriter, ConstantPool, Function, Opcode, TypeImage, TypeSignature};

use crate::ast::{BinaryOp, Expr, ExprKind, FnDecl, UnaryOp};
use crate::binder::{BatchType, ParsedUnit, TypeTable};
use crate::diagnostic::{codes, Diagnostic, ErrorCode};
use crate::file_manager::FileManager;
use crate::lexer::Span;

/// Generate one image per type of the batch.
///
/// Images are produced even when diagnostics were reported; callers must not
/// emit them unless the batch is error-free.
pub fn generate(
    units: &[ParsedUnit],
    table: &TypeTable<'_>,
    files: &dyn FileManager,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<TypeImage> {
    let mut images = Vec::with_capacity(table.len());
    for ty in table.iter() {
        let unit = &units[ty.unit];
        let mut image = TypeImage::new(ty.name.clone());
        if ty.outer.is_some() {
            image.flags |= flags::NESTED;
        }
        image.outer = ty.outer.clone();
        image.source_file = Some(unit.source.id.to_string());

        for decl in &ty.decl.functions {
            // Duplicates were reported by the binder; keep the first body.
            let first = ty.decl.functions.iter().find(|f| f.name == decl.name);
            if !first.is_some_and(|f| std::ptr::eq(f, decl)) {
                continue;
            }
            if u16::try_from(decl.params.len()).is_err() {
                diagnostics.push(
                    Diagnostic::error(
                        codes::TOO_MANY_OPERANDS,
                        format!(
                            "Function '{}' declares {} parameters, at most {} are allowed",
                            decl.name,
                            decl.params.len(),
                            u16::MAX
                        ),
                    )
                    .in_unit(&unit.source.name)
                    .at(decl.span),
                );
                continue;
            }
            let mut gen = FunctionGenerator {
                table,
                files,
                current: ty,
                unit_name: &unit.source.name,
                decl,
                constants: &mut image.constants,
                writer: BytecodeWriter::new(),
                used: vec![false; decl.params.len()],
                diagnostics: &mut *diagnostics,
            };
            gen.expr(&decl.body);
            gen.writer.emit_return();
            gen.report_unused();

            let code = gen.writer.into_bytes();
            image.functions.push(Function {
                name: decl.name.clone(),
                param_count: decl.params.len(),
                code,
            });
        }
        images.push(image);
    }
    images
}

/// Binary-name candidates for a dotted type path, longest package first:
/// `a.b.C` -> `a.b.C`, `a.b$C`, `a$b$C`.
fn candidates(path: &[String]) -> Vec<String> {
    (1..=path.len())
        .rev()
        .map(|k| {
            let mut name = path[..k].join(".");
            for segment in &path[k..] {
                name.push('$');
                name.push_str(segment);
            }
            name
        })
        .collect()
}

fn qualify(package: &str, name: &str) -> String {
    if package.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", package, name)
    }
}

struct FunctionGenerator<'g, 'a> {
    table: &'g TypeTable<'a>,
    files: &'g dyn FileManager,
    current: &'g BatchType<'a>,
    unit_name: &'g str,
    decl: &'g FnDecl,
    constants: &'g mut ConstantPool,
    writer: BytecodeWriter,
    used: Vec<bool>,
    diagnostics: &'g mut Vec<Diagnostic>,
}

impl<'g, 'a> FunctionGenerator<'g, 'a> {
    fn error(&mut self, code: ErrorCode, message: String, span: Span) {
        self.diagnostics
            .push(Diagnostic::error(code, message).in_unit(self.unit_name).at(span));
    }

    fn report_unused(&mut self) {
        for (param, used) in self.decl.params.iter().zip(&self.used) {
            if !used && !param.name.starts_with('_') {
                self.diagnostics.push(
                    Diagnostic::warning(
                        codes::UNUSED_PARAMETER,
                        format!("Unused parameter '{}' in '{}'", param.name, self.decl.name),
                    )
                    .in_unit(self.unit_name)
                    .at(param.span)
                    .with_help(format!("prefix it with an underscore: `_{}`", param.name)),
                );
            }
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Int(value) => self.writer.emit_const_i64(*value),
            ExprKind::Bool(value) => self.writer.emit_const_bool(*value),
            ExprKind::Name(name) => self.name(name, expr.span),
            ExprKind::Unary(op, operand) => {
                self.expr(operand);
                self.writer.emit_opcode(match op {
                    UnaryOp::Neg => Opcode::Ineg,
                    UnaryOp::Not => Opcode::Not,
                });
            }
            ExprKind::Binary(BinaryOp::And, left, right) => self.and(left, right),
            ExprKind::Binary(BinaryOp::Or, left, right) => self.or(left, right),
            ExprKind::Binary(op, left, right) => {
                self.expr(left);
                self.expr(right);
                self.writer.emit_opcode(arithmetic_opcode(*op));
            }
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.expr(cond);
                let to_else = self.writer.emit_jump(Opcode::JmpIfFalse);
                self.expr(then_branch);
                let to_end = self.writer.emit_jump(Opcode::Jmp);
                self.writer.patch_jump(to_else);
                self.expr(else_branch);
                self.writer.patch_jump(to_end);
            }
            ExprKind::Call { path, args } => self.call(path, args, expr.span),
        }
    }

    fn name(&mut self, name: &str, span: Span) {
        match self.decl.params.iter().position(|p| p.name == name) {
            Some(index) => {
                self.used[index] = true;
                match u16::try_from(index) {
                    Ok(local) => self.writer.emit_load_local(local),
                    Err(_) => {
                        let message = format!("Parameter '{}' is out of the local range", name);
                        self.error(codes::TOO_MANY_OPERANDS, message, span);
                    }
                }
            }
            None => {
                self.error(
                    codes::UNKNOWN_IDENTIFIER,
                    format!("Unknown identifier '{}'", name),
                    span,
                );
                self.writer.emit_const_i64(0);
            }
        }
    }

    /// `l && r` evaluates to 0 or 1; `r` only runs when `l` is non-zero.
    fn and(&mut self, left: &Expr, right: &Expr) {
        self.expr(left);
        let to_false = self.writer.emit_jump(Opcode::JmpIfFalse);
        self.expr(right);
        self.writer.emit_opcode(Opcode::Not);
        self.writer.emit_opcode(Opcode::Not);
        let to_end = self.writer.emit_jump(Opcode::Jmp);
        self.writer.patch_jump(to_false);
        self.writer.emit_const_bool(false);
        self.writer.patch_jump(to_end);
    }

    /// `l || r` evaluates to 0 or 1; `r` only runs when `l` is zero.
    fn or(&mut self, left: &Expr, right: &Expr) {
        self.expr(left);
        let to_right = self.writer.emit_jump(Opcode::JmpIfFalse);
        self.writer.emit_const_bool(true);
        let to_end = self.writer.emit_jump(Opcode::Jmp);
        self.writer.patch_jump(to_right);
        self.expr(right);
        self.writer.emit_opcode(Opcode::Not);
        self.writer.emit_opcode(Opcode::Not);
        self.writer.patch_jump(to_end);
    }

    fn call(&mut self, path: &[String], args: &[Expr], span: Span) {
        for arg in args {
            self.expr(arg);
        }
        let Ok(argc) = u16::try_from(args.len()) else {
            let message = format!(
                "Call passes {} arguments, at most {} are allowed",
                args.len(),
                u16::MAX
            );
            self.error(codes::TOO_MANY_OPERANDS, message, span);
            return;
        };
        let (function, type_path) = match path.split_last() {
            Some(parts) => parts,
            None => return,
        };

        if type_path.is_empty() {
            let current = self.current;
            let functions = &current.signature.functions;
            match functions.iter().position(|f| &f.name == function) {
                Some(index) => {
                    self.check_arity(function, functions[index].arity, args.len(), span);
                    match u32::try_from(index) {
                        Ok(index) => self.writer.emit_call(index, argc),
                        Err(_) => {
                            let message =
                                format!("Function '{}' is out of the call range", function);
                            self.error(codes::TOO_MANY_OPERANDS, message, span);
                        }
                    }
                }
                None => {
                    let message =
                        format!("Unknown function '{}' in type '{}'", function, current.name);
                    self.error(codes::UNKNOWN_FUNCTION, message, span);
                }
            }
            return;
        }

        let Some(target) = self.resolve_type(type_path) else {
            let message = format!("Unknown type '{}'", type_path.join("."));
            self.error(codes::UNKNOWN_TYPE, message, span);
            return;
        };
        match target.function(function) {
            Some(f) => {
                let arity = f.arity;
                self.check_arity(function, arity, args.len(), span);
                let type_const = self.constants.add_string(&target.name);
                let function_const = self.constants.add_string(function);
                self.writer.emit_call_static(type_const, function_const, argc);
            }
            None => {
                let message = format!("Unknown function '{}' in type '{}'", function, target.name);
                self.error(codes::UNKNOWN_FUNCTION, message, span);
            }
        }
    }

    fn check_arity(&mut self, function: &str, expected: usize, actual: usize, span: Span) {
        if expected != actual {
            let message = format!(
                "Function '{}' expects {} argument(s), got {}",
                function, expected, actual
            );
            self.error(codes::ARITY_MISMATCH, message, span);
        }
    }

    /// Resolve a dotted type path as seen from the current type.
    ///
    /// Order: nested types of the enclosing chain, batch types in the current
    /// package, batch types by full name, then the file manager (platform
    /// library and classpath).
    fn resolve_type(&self, path: &[String]) -> Option<TypeSignature> {
        if let [simple] = path {
            let mut scope = Some(self.current);
            while let Some(ty) = scope {
                let nested = format!("{}${}", ty.name, simple);
                if let Some(found) = self.table.get(&nested) {
                    return Some(found.signature.clone());
                }
                scope = ty.outer.as_deref().and_then(|o| self.table.get(o));
            }
        }

        let package = self.current.package.as_str();
        let candidates = candidates(path);
        for candidate in &candidates {
            if !package.is_empty() {
                if let Some(found) = self.table.get(&qualify(package, candidate)) {
                    return Some(found.signature.clone());
                }
            }
            if let Some(found) = self.table.get(candidate) {
                return Some(found.signature.clone());
            }
        }
        for candidate in &candidates {
            if !package.is_empty() {
                if let Some(found) = self.files.resolve_type(&qualify(package, candidate)) {
                    return Some(found);
                }
            }
            if let Some(found) = self.files.resolve_type(candidate) {
                return Some(found);
            }
        }
        None
    }
}

fn arithmetic_opcode(op: BinaryOp) -> Opcode {
    match op {
        BinaryOp::Add => Opcode::Iadd,
        BinaryOp::Sub => Opcode::Isub,
        BinaryOp::Mul => Opcode::Imul,
        BinaryOp::Div => Opcode::Idiv,
        BinaryOp::Mod => Opcode::Imod,
        BinaryOp::Eq => Opcode::Ieq,
        BinaryOp::Ne => Opcode::Ine,
        BinaryOp::Lt => Opcode::Ilt,
        BinaryOp::Le => Opcode::Ile,
        BinaryOp::Gt => Opcode::Igt,
        BinaryOp::Ge => Opcode::Ige,
        BinaryOp::And | BinaryOp::Or => {
            unreachable!("short-circuit operators are lowered by jumps")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> Vec<String> {
        s.split('.').map(str::to_string).collect()
    }

    #[test]
    fn test_candidates_longest_package_first() {
        assert_eq!(candidates(&path("a.b.C")), vec!["a.b.C", "a.b$C", "a$b$C"]);
        assert_eq!(candidates(&path("Outer.Inner")), vec!["Outer.Inner", "Outer$Inner"]);
        assert_eq!(candidates(&path("Math")), vec!["Math"]);
    }

    #[test]
    fn test_qualify() {
        assert_eq!(qualify("", "Math"), "Math");
        assert_eq!(qualify("rules", "Tax$Rate"), "rules.Tax$Rate");
    }
}
