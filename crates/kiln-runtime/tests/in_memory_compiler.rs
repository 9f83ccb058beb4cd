//! End-to-end behavior of `InMemoryCompiler`

use kiln_bytecode::TypeSignature;
use kiln_compiler::file::path_in;
use kiln_compiler::{FileKind, FileManager, SourceFile, StandardFileManager};
use kiln_runtime::{
    CompileOutcome, CompilerOptions, CompilerService, InMemoryCompiler, RuntimeError, VmError,
};
use std::io::Write;
use std::sync::Arc;

const CALC: &str = "class Calc { fn twice(x) = x * 2; }";

fn failed_diagnostic_codes(err: &RuntimeError) -> Vec<&str> {
    err.diagnostics()
        .iter()
        .filter(|d| d.is_error())
        .map(|d| d.code.as_str())
        .collect()
}

#[test]
fn test_duplicate_registration_keeps_first_text() {
    let mut compiler = InMemoryCompiler::new();
    assert!(compiler.add_source("demo.Calc", CALC));
    assert!(!compiler.add_source("demo.Calc", "class Calc { fn twice(x) = x * 3; }"));
    assert_eq!(compiler.source("demo.Calc"), Some(CALC));

    let calc = compiler.get_class("demo.Calc").unwrap();
    assert_eq!(calc.invoke("twice", &[21]), Ok(42));

    // Compiled names stay taken.
    assert!(!compiler.add_source("demo.Calc", CALC));
}

#[test]
fn test_compile_without_pending_is_noop() {
    let mut compiler = InMemoryCompiler::new();
    compiler.compile().unwrap();
    compiler.compile().unwrap();
    assert!(compiler.artifact_names().is_empty());

    compiler.add_source("demo.Calc", CALC);
    compiler.compile().unwrap();
    let before = compiler.artifact_names();
    compiler.compile().unwrap();
    assert_eq!(compiler.artifact_names(), before);
}

#[test]
fn test_valid_batch_is_loadable_everywhere() {
    let mut compiler = InMemoryCompiler::new();
    compiler.add_source(
        "demo.Pricing",
        "class Pricing {
            fn rate(total) = if total > 100 then 10 else 0;
            fn apply(total) = total - total * rate(total) / 100;
            class Tier { fn of(x) = Math.min(x, 3); }
        }
        class Helper { fn id(x) = x; }",
    );
    compiler.add_source(
        "demo.Checkout",
        "class Checkout { fn total(x) = Pricing.apply(x) + Helper.id(1); }",
    );
    compiler.compile().unwrap();

    assert_eq!(
        compiler.artifact_names(),
        vec!["demo.Checkout", "demo.Helper", "demo.Pricing", "demo.Pricing$Tier"]
    );
    assert!(compiler.is_compiled("demo.Pricing"));
    assert!(compiler.is_compiled("demo.Checkout"));
    assert!(compiler.pending_names().is_empty());

    let checkout = compiler.get_class("demo.Checkout").unwrap();
    assert_eq!(checkout.invoke("total", &[200]), Ok(181));
    let tier = compiler.get_class("demo.Pricing$Tier").unwrap();
    assert_eq!(tier.outer(), Some("demo.Pricing"));
    assert_eq!(tier.invoke("of", &[10]), Ok(3));
}

#[test]
fn test_identity_is_per_instance() {
    let mut first = InMemoryCompiler::new();
    let mut second = InMemoryCompiler::new();
    first.add_source("demo.Calc", CALC);
    second.add_source("demo.Calc", CALC);

    let a = first.get_class("demo.Calc").unwrap();
    let a_again = first.get_class("demo.Calc").unwrap();
    let b = second.get_class("demo.Calc").unwrap();

    assert_eq!(a, a_again);
    assert_ne!(a, b);
    assert_ne!(a.space_id(), b.space_id());
    assert_eq!(a.digest(), b.digest());
    assert_eq!(a.invoke("twice", &[4]), b.invoke("twice", &[4]));
}

#[test]
fn test_one_invalid_unit_fails_the_whole_batch() {
    let mut compiler = InMemoryCompiler::new();
    compiler.add_source("demo.A", "class A { fn f() = 1; }");
    compiler.add_source("demo.B", "class B { fn g() = missing; }");
    compiler.add_source("demo.C", "class C { fn h() = 3; }");

    let err = compiler.compile().unwrap_err();
    assert_eq!(failed_diagnostic_codes(&err), vec!["E0101"]);
    let RuntimeError::CompilationFailed { report, .. } = &err else {
        panic!("expected CompilationFailed, got {:?}", err);
    };
    assert!(report.contains("missing"));

    assert!(compiler.artifact_names().is_empty());
    assert!(compiler.pending_names().is_empty());
    for name in ["demo.A", "demo.B", "demo.C"] {
        assert!(compiler.source(name).is_none());
        assert!(!compiler.is_compiled(name));
    }
    assert!(matches!(
        compiler.get_class("demo.A"),
        Err(RuntimeError::ClassNotFound(_))
    ));

    assert!(compiler.add_source("demo.A", "class A { fn f() = 10; }"));
    assert!(compiler.add_source("demo.B", "class B { fn g() = 20; }"));
    assert!(compiler.add_source("demo.C", "class C { fn h() = 30; }"));
    compiler.compile().unwrap();
    assert_eq!(compiler.get_class("demo.B").unwrap().invoke("g", &[]), Ok(20));
}

#[test]
fn test_failure_does_not_touch_earlier_batches() {
    let mut compiler = InMemoryCompiler::new();
    compiler.add_source("demo.Old", "class Old { fn v() = 1; }");
    compiler.compile().unwrap();
    let old = compiler.get_class("demo.Old").unwrap();

    compiler.add_source("demo.New", "class New { fn v() = ; }");
    assert!(compiler.compile().is_err());

    assert!(compiler.is_compiled("demo.Old"));
    assert_eq!(compiler.artifact_names(), vec!["demo.Old"]);
    assert_eq!(compiler.get_class("demo.Old").unwrap(), old);
}

#[test]
fn test_get_class_failure_is_returned() {
    let mut compiler = InMemoryCompiler::new();
    compiler.add_source("demo.Bad", "class Bad { fn f(x) = x +; }");
    let err = compiler.get_class("demo.Bad").unwrap_err();
    assert_eq!(failed_diagnostic_codes(&err), vec!["E0010"]);
    assert!(compiler.source("demo.Bad").is_none());
}

#[test]
fn test_unknown_and_foreign_names_are_not_found() {
    let mut owner = InMemoryCompiler::new();
    let mut other = InMemoryCompiler::new();
    owner.add_source("demo.Calc", CALC);
    owner.compile().unwrap();

    assert!(matches!(
        owner.get_class("demo.Nope"),
        Err(RuntimeError::ClassNotFound(name)) if name == "demo.Nope"
    ));
    assert!(matches!(
        other.get_class("demo.Calc"),
        Err(RuntimeError::ClassNotFound(_))
    ));
}

#[test]
fn test_handle_outliving_its_compiler() {
    let mut compiler = InMemoryCompiler::new();
    compiler.add_source("demo.Calc", CALC);
    let calc = compiler.get_class("demo.Calc").unwrap();
    drop(compiler);

    assert_eq!(calc.name(), "demo.Calc");
    assert_eq!(calc.arity("twice"), Some(1));
    assert_eq!(calc.invoke("twice", &[5]), Err(VmError::SpaceDropped));
}

#[test]
fn test_get_class_compiles_lazily() {
    let mut compiler = InMemoryCompiler::new();
    compiler.add_source("demo.Calc", CALC);
    assert_eq!(compiler.pending_names(), ["demo.Calc".to_string()]);

    let calc = compiler.get_class("demo.Calc").unwrap();
    assert!(compiler.is_compiled("demo.Calc"));
    assert_eq!(calc.invoke("twice", &[5]), Ok(10));
    assert_eq!(compiler.loaded_names(), vec!["demo.Calc".to_string()]);
}

#[test]
fn test_artifact_collision_fails_the_batch() {
    let mut compiler = InMemoryCompiler::new();
    compiler.add_source("demo.A", "class A {} class Shared { fn v() = 1; }");
    compiler.compile().unwrap();

    compiler.add_source("demo.B", "class B {} class Shared { fn v() = 2; }");
    let err = compiler.compile().unwrap_err();
    assert_eq!(failed_diagnostic_codes(&err), vec!["E0104"]);
    assert_eq!(compiler.artifact_names(), vec!["demo.A", "demo.Shared"]);
    assert!(compiler.add_source("demo.B", "class B {}"));

    let shared = compiler.get_class("demo.Shared").unwrap();
    assert_eq!(shared.invoke("v", &[]), Ok(1));
}

#[test]
fn test_earlier_batches_are_not_visible_to_the_compiler() {
    let mut compiler = InMemoryCompiler::new();
    compiler.add_source("demo.Base", "class Base { fn v() = 1; }");
    compiler.compile().unwrap();

    compiler.add_source("demo.User", "class User { fn v() = Base.v(); }");
    let err = compiler.compile().unwrap_err();
    assert_eq!(failed_diagnostic_codes(&err), vec!["E0201"]);
}

#[test]
fn test_classpath_types_compile_and_load() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut producer = InMemoryCompiler::new();
        producer.add_source("lib.Util", "class Util { fn triple(x) = x * 3; }");
        producer.compile().unwrap();
        let path = path_in(dir.path(), "lib.Util", FileKind::Output);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, &*producer.artifact_bytes("lib.Util").unwrap()).unwrap();
    }

    let options = CompilerOptions::default().with_classpath_entry(dir.path());
    let mut compiler = InMemoryCompiler::with_options(options);
    compiler.add_source("app.Main", "class Main { fn run(x) = lib.Util.triple(x) + 1; }");
    let main = compiler.get_class("app.Main").unwrap();
    assert_eq!(main.invoke("run", &[4]), Ok(13));
    assert_eq!(
        compiler.loaded_names(),
        vec!["app.Main".to_string(), "lib.Util".to_string()]
    );
    assert_eq!(compiler.artifact_names(), vec!["app.Main"]);
}

#[test]
fn test_config_file_limits_call_depth() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kiln.toml");
    std::fs::write(&path, "[compiler]\nmax_call_depth = 8\n").unwrap();

    let mut compiler = InMemoryCompiler::from_config_file(&path).unwrap();
    assert_eq!(compiler.options().max_call_depth, 8);
    compiler.add_source(
        "demo.Deep",
        "class Deep { fn down(n) = if n == 0 then 0 else down(n - 1); }",
    );
    let deep = compiler.get_class("demo.Deep").unwrap();
    assert_eq!(deep.invoke("down", &[5]), Ok(0));
    assert_eq!(
        deep.invoke("down", &[50]),
        Err(kiln_runtime::VmError::StackOverflow(8))
    );
}

/// Reports success but writes bytes that are not an image.
struct CorruptingService;

impl CompilerService for CorruptingService {
    fn standard_file_manager(&self) -> Box<dyn FileManager + Send> {
        Box::new(StandardFileManager::new())
    }

    fn compile(&self, units: &[SourceFile], files: &mut dyn FileManager) -> CompileOutcome {
        for unit in units {
            let mut sink = files.open_output(&unit.name, FileKind::Output).unwrap();
            sink.write_all(b"not an image").unwrap();
        }
        CompileOutcome {
            success: true,
            diagnostics: Vec::new(),
        }
    }
}

#[test]
fn test_malformed_output_is_a_define_error() {
    let mut compiler =
        InMemoryCompiler::with_service(Arc::new(CorruptingService), CompilerOptions::default());
    compiler.add_source("demo.Calc", CALC);
    compiler.compile().unwrap();
    assert!(matches!(
        compiler.get_class("demo.Calc"),
        Err(RuntimeError::Define { name, .. }) if name == "demo.Calc"
    ));
}

/// Records what the compiler service sees.
struct InspectingService;

impl CompilerService for InspectingService {
    fn standard_file_manager(&self) -> Box<dyn FileManager + Send> {
        Box::new(StandardFileManager::new())
    }

    fn compile(&self, units: &[SourceFile], files: &mut dyn FileManager) -> CompileOutcome {
        let ids: Vec<String> = units.iter().map(|u| u.id.to_string()).collect();
        assert_eq!(ids, vec!["mem:///demo/First.kiln", "mem:///demo/Second.kiln"]);
        assert_eq!(files.read_source(&units[1].id).unwrap(), "second text");
        let math: Option<TypeSignature> = files.resolve_type("Math");
        assert!(math.is_some());
        CompileOutcome {
            success: false,
            diagnostics: Vec::new(),
        }
    }
}

#[test]
fn test_service_sees_batch_in_registration_order() {
    let mut compiler =
        InMemoryCompiler::with_service(Arc::new(InspectingService), CompilerOptions::default());
    compiler.add_source("demo.First", "first text");
    compiler.add_source("demo.Second", "second text");
    let err = compiler.compile().unwrap_err();
    assert!(err.diagnostics().is_empty());
    assert!(compiler.add_source("demo.First", "again"));
}
