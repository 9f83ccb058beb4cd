//! Batch type table
//!
//! Collects every type declared by the units of one batch under its binary
//! name and checks the declaration-level rules: each unit declares its own
//! top-level class, binary names are unique across the batch and function
//! names are unique within a type.

use kiln_bytecode::{FunctionSignature, TypeSignature};
use rustc_hash::FxHashMap;

use crate::ast::{TypeDecl, Unit};
use crate::diagnostic::{codes, Diagnostic};
use crate::file::SourceFile;

/// A unit that parsed successfully
#[derive(Debug)]
pub struct ParsedUnit {
    pub source: SourceFile,
    pub ast: Unit,
}

/// One type declared in the batch
#[derive(Debug)]
pub struct BatchType<'a> {
    /// Binary name (`pkg.Outer$Inner`)
    pub name: String,
    pub package: String,
    /// Binary name of the enclosing type
    pub outer: Option<String>,
    /// Index of the declaring unit
    pub unit: usize,
    pub decl: &'a TypeDecl,
    /// Callable surface; the first declaration wins for duplicated names
    pub signature: TypeSignature,
}

/// Every type of a batch, in declaration order
#[derive(Debug, Default)]
pub struct TypeTable<'a> {
    types: Vec<BatchType<'a>>,
    index: FxHashMap<String, usize>,
}

impl<'a> TypeTable<'a> {
    pub fn get(&self, name: &str) -> Option<&BatchType<'a>> {
        self.index.get(name).map(|&i| &self.types[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BatchType<'a>> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Build the type table of a batch, reporting declaration errors.
pub fn bind<'a>(units: &'a [ParsedUnit], diagnostics: &mut Vec<Diagnostic>) -> TypeTable<'a> {
    let mut table = TypeTable::default();

    for (unit_index, unit) in units.iter().enumerate() {
        let expected = unit.source.simple_name();
        if !unit.ast.types.iter().any(|t| t.name == expected) {
            diagnostics.push(
                Diagnostic::error(
                    codes::MISSING_TYPE,
                    format!("Unit '{}' does not declare class '{}'", unit.source.name, expected),
                )
                .in_unit(&unit.source.name)
                .with_help(format!("add `class {} {{ ... }}` to the unit", expected)),
            );
        }

        let scope = UnitScope {
            index: unit_index,
            name: &unit.source.name,
            package: unit.source.package(),
        };
        for decl in &unit.ast.types {
            let name = if scope.package.is_empty() {
                decl.name.clone()
            } else {
                format!("{}.{}", scope.package, decl.name)
            };
            declare(&mut table, &scope, name, None, decl, diagnostics);
        }
    }

    table
}

/// The unit whose declarations are being bound
struct UnitScope<'u> {
    index: usize,
    name: &'u str,
    package: &'u str,
}

fn declare<'a>(
    table: &mut TypeTable<'a>,
    scope: &UnitScope<'_>,
    name: String,
    outer: Option<String>,
    decl: &'a TypeDecl,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if table.contains(&name) {
        diagnostics.push(
            Diagnostic::error(codes::DUPLICATE_TYPE, format!("Duplicate type '{}'", name))
                .in_unit(scope.name)
                .at(decl.span),
        );
        return;
    }

    let mut functions: Vec<FunctionSignature> = Vec::with_capacity(decl.functions.len());
    for f in &decl.functions {
        if functions.iter().any(|s| s.name == f.name) {
            diagnostics.push(
                Diagnostic::error(
                    codes::DUPLICATE_FUNCTION,
                    format!("Duplicate function '{}' in type '{}'", f.name, name),
                )
                .in_unit(scope.name)
                .at(f.span),
            );
            continue;
        }
        functions.push(FunctionSignature {
            name: f.name.clone(),
            arity: f.params.len(),
        });
    }

    let index = table.types.len();
    table.index.insert(name.clone(), index);
    table.types.push(BatchType {
        name: name.clone(),
        package: scope.package.to_string(),
        outer,
        unit: scope.index,
        decl,
        signature: TypeSignature {
            name: name.clone(),
            functions,
        },
    });

    for nested in &decl.nested {
        let nested_name = format!("{}${}", name, nested.name);
        declare(table, scope, nested_name, Some(name.clone()), nested, diagnostics);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_unit;

    fn parsed(name: &str, source: &str) -> ParsedUnit {
        let (ast, diags) = parse_unit(source);
        assert!(diags.is_empty(), "{:?}", diags);
        ParsedUnit {
            source: SourceFile::in_memory(name),
            ast: ast.unwrap(),
        }
    }

    #[test]
    fn test_binary_names() {
        let units = vec![parsed(
            "rules.Pricing",
            "class Pricing { fn a() = 1; class Tier { class Deep {} } } class Helper {}",
        )];
        let mut diags = Vec::new();
        let table = bind(&units, &mut diags);
        assert!(diags.is_empty());

        let names: Vec<&str> = table.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "rules.Pricing",
                "rules.Pricing$Tier",
                "rules.Pricing$Tier$Deep",
                "rules.Helper"
            ]
        );
        let deep = table.get("rules.Pricing$Tier$Deep").unwrap();
        assert_eq!(deep.outer.as_deref(), Some("rules.Pricing$Tier"));
        assert_eq!(deep.package, "rules");
    }

    #[test]
    fn test_root_package() {
        let units = vec![parsed("Calc", "class Calc { fn f(x) = x; }")];
        let mut diags = Vec::new();
        let table = bind(&units, &mut diags);
        assert_eq!(table.get("Calc").unwrap().signature.function("f").unwrap().arity, 1);
    }

    #[test]
    fn test_missing_top_level_class() {
        let units = vec![parsed("demo.Calc", "class Other {}")];
        let mut diags = Vec::new();
        bind(&units, &mut diags);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, "E0102");
        assert_eq!(diags[0].unit.as_deref(), Some("demo.Calc"));
    }

    #[test]
    fn test_duplicate_type_across_units() {
        let units = vec![
            parsed("demo.A", "class A {} class Shared {}"),
            parsed("demo.B", "class B {} class Shared {}"),
        ];
        let mut diags = Vec::new();
        let table = bind(&units, &mut diags);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, "E0104");
        assert_eq!(diags[0].unit.as_deref(), Some("demo.B"));
        assert_eq!(table.get("demo.Shared").unwrap().unit, 0);
    }

    #[test]
    fn test_duplicate_function() {
        let units = vec![parsed("demo.A", "class A { fn f() = 1; fn f(x) = x; }")];
        let mut diags = Vec::new();
        let table = bind(&units, &mut diags);
        assert_eq!(diags[0].code, "E0103");
        assert_eq!(table.get("demo.A").unwrap().signature.functions.len(), 1);
    }
}
