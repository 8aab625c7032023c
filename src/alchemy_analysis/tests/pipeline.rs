use std::path::Path;
use std::sync::Arc;

use alchemy_analysis::expr::ExprKind;
use alchemy_analysis::{CompileResult, Compiler, CompilerOptions, MethodInfo, TypeInfo};
use alchemy_syntax::BuiltInType;
use tempfile::TempDir;

fn write_file(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).expect("write source file");
}

fn compiler_for(packages: &[(&str, &TempDir)]) -> Compiler {
    let mut compiler = Compiler::new(CompilerOptions {
        worker_threads: 2,
        ..CompilerOptions::default()
    });
    for (name, dir) in packages {
        compiler.add_package(name, dir.path());
    }
    compiler
}

fn messages(result: &CompileResult) -> Vec<String> {
    result.diagnostics.iter().map(|d| d.message.clone()).collect()
}

fn find_method(type_info: &Arc<TypeInfo>, name: &str) -> Vec<Arc<MethodInfo>> {
    type_info
        .members()
        .expect("members resolved")
        .methods
        .iter()
        .filter(|m| m.name == name)
        .cloned()
        .collect()
}

/// Walk every stored method body in the compiler, yielding expression
/// kinds to a callback.
fn for_each_expr(compiler: &Compiler, mut f: impl FnMut(&ExprKind)) {
    for file in compiler.files() {
        let bodies = file.bodies.read();
        for type_bodies in bodies.iter() {
            for body in type_bodies.methods.iter().flatten() {
                for expr in &body.arena.exprs {
                    f(&expr.kind);
                }
            }
        }
    }
}

#[test]
fn duplicate_type_is_diagnosed_once_and_first_declaration_wins() {
    let dir = TempDir::new().expect("tempdir");
    write_file(dir.path(), "one.ax", "class Foo { int x; }\n");
    write_file(dir.path(), "two.ax", "class Foo { int y; }\n");

    let mut compiler = compiler_for(&[("App", &dir)]);
    let result = compiler.compile().expect("compile");

    let duplicates: Vec<_> = messages(&result)
        .into_iter()
        .filter(|m| m.contains("was also declared in"))
        .collect();
    assert_eq!(duplicates.len(), 1, "expected exactly one duplicate diagnostic");
    assert!(duplicates[0].contains("class `App::Foo`"));

    // the first declaration stays resolvable
    assert!(compiler.resolve_type("App::Foo").is_some());
}

#[test]
fn ambiguous_using_match_is_diagnosed() {
    let a = TempDir::new().expect("tempdir");
    let b = TempDir::new().expect("tempdir");
    let main = TempDir::new().expect("tempdir");
    write_file(a.path(), "bar.ax", "class Bar { int x; }\n");
    write_file(b.path(), "bar.ax", "class Bar { int x; }\n");
    write_file(
        main.path(),
        "main.ax",
        "using A;\nusing B;\nclass C { Bar b; }\n",
    );

    let mut compiler = compiler_for(&[("A", &a), ("B", &b), ("Main", &main)]);
    let result = compiler.compile().expect("compile");

    let ambiguous: Vec<_> = messages(&result)
        .into_iter()
        .filter(|m| m.starts_with("Ambiguous type match"))
        .collect();
    assert_eq!(ambiguous.len(), 1, "expected exactly one ambiguity diagnostic");
    assert!(ambiguous[0].contains("::Bar"));
}

#[test]
fn optional_parameters_expand_into_per_arity_methods() {
    let dir = TempDir::new().expect("tempdir");
    write_file(
        dir.path(),
        "calc.ax",
        "class Calc {\n\
         \tvoid F(int x, int y = 1, int z = 2) { }\n\
         \tvoid Caller() { F(5); }\n\
         }\n",
    );

    let mut compiler = compiler_for(&[("App", &dir)]);
    let result = compiler.compile().expect("compile");
    assert!(messages(&result).is_empty(), "unexpected diagnostics: {result:?}");

    let calc = compiler.resolve_type("App::Calc").expect("Calc resolved");
    let methods = find_method(&calc, "F");
    assert_eq!(methods.len(), 4, "prototype plus three arities");

    let prototype = methods
        .iter()
        .find(|m| m.is_optional_parameter_prototype)
        .expect("prototype present");
    assert_eq!(prototype.parameters.len(), 3);
    assert!(prototype.prototype.is_none());

    let mut arities: Vec<usize> = methods
        .iter()
        .filter(|m| !m.is_optional_parameter_prototype)
        .map(|m| m.parameters.len())
        .collect();
    arities.sort();
    assert_eq!(arities, vec![1, 2, 3]);

    for method in methods.iter().filter(|m| !m.is_optional_parameter_prototype) {
        let proto = method.prototype.as_ref().expect("expanded links prototype");
        assert!(Arc::ptr_eq(proto, prototype));
        assert!(method.parameters.len() <= proto.parameters.len());
        for (expanded, original) in method.parameters.iter().zip(proto.parameters.iter()) {
            assert_eq!(expanded.ty, original.ty);
            assert!(!expanded.has_default_value);
        }
    }

    // the call `F(5)` selects the one-argument expansion
    let mut selected = None;
    for_each_expr(&compiler, |kind| {
        if let ExprKind::InstanceCall { method, .. } | ExprKind::StaticCall { method, .. } = kind {
            if method.name == "F" {
                selected = Some(method.clone());
            }
        }
    });
    let selected = selected.expect("call to F resolved");
    assert_eq!(selected.parameters.len(), 1);
    assert!(selected.prototype.is_some());
}

#[test]
fn generic_instantiations_are_interned_and_invalidated() {
    let dir = TempDir::new().expect("tempdir");
    write_file(dir.path(), "list.ax", "class List<T> { T item; }\n");
    write_file(dir.path(), "use_a.ax", "class UseA { List<int> xs; }\n");
    write_file(dir.path(), "use_b.ax", "class UseB { List<int> ys; }\n");

    let mut compiler = compiler_for(&[("App", &dir)]);
    let result = compiler.compile().expect("compile");
    assert!(messages(&result).is_empty(), "unexpected diagnostics: {result:?}");

    let cache = compiler.generic_cache().clone();
    let first = cache.get("App::List`1<int>").expect("List<int> interned");

    // both use sites share the same record
    let use_a = compiler.resolve_type("App::UseA").expect("UseA");
    let use_b = compiler.resolve_type("App::UseB").expect("UseB");
    let xs_ty = use_a.members().expect("members").fields[0].ty.clone();
    let ys_ty = use_b.members().expect("members").fields[0].ty.clone();
    assert!(Arc::ptr_eq(xs_ty.type_info.as_ref().expect("xs typed"), &first));
    assert!(Arc::ptr_eq(ys_ty.type_info.as_ref().expect("ys typed"), &first));

    // edit the declaring file: the cached record must be dropped and a
    // fresh one interned on the next run
    std::thread::sleep(std::time::Duration::from_millis(50));
    write_file(dir.path(), "list.ax", "class List<T> { T item; int extra; }\n");

    let result = compiler.compile().expect("recompile");
    assert!(messages(&result).is_empty(), "unexpected diagnostics: {result:?}");

    let second = cache
        .get("App::List`1<int>")
        .expect("List<int> re-interned after invalidation");
    assert!(
        !Arc::ptr_eq(&first, &second),
        "invalidation must rebuild the cached instantiation"
    );
}

#[test]
fn numeric_promotion_wraps_the_narrower_operand() {
    let dir = TempDir::new().expect("tempdir");
    write_file(
        dir.path(),
        "math.ax",
        "class Math {\n\
         \tdouble Mix(int x) { double d = x + 2.5; return d; }\n\
         }\n",
    );

    let mut compiler = compiler_for(&[("App", &dir)]);
    let result = compiler.compile().expect("compile");
    assert!(messages(&result).is_empty(), "unexpected diagnostics: {result:?}");

    let mut found_cast_to_double = false;
    for file in compiler.files() {
        let bodies = file.bodies.read();
        for type_bodies in bodies.iter() {
            for body in type_bodies.methods.iter().flatten() {
                for expr in &body.arena.exprs {
                    if let ExprKind::Arithmetic { lhs, .. } = &expr.kind {
                        if let ExprKind::DirectCast { ty, .. } = &body.arena.expr(*lhs).kind {
                            if ty.built_in == BuiltInType::Double {
                                found_cast_to_double = true;
                            }
                        }
                    }
                }
            }
        }
    }
    assert!(
        found_cast_to_double,
        "int + double must wrap the int side in a DirectCast<double>"
    );
}

#[test]
fn entry_point_pattern_selects_exported_method() {
    let dir = TempDir::new().expect("tempdir");
    write_file(
        dir.path(),
        "program.ax",
        "export class Program {\n\
         \texport void Main() { }\n\
         }\n",
    );

    let mut compiler = Compiler::new(CompilerOptions {
        worker_threads: 1,
        root_package: "TestApp".to_string(),
        entry_points: vec!["Program".to_string()],
        ..CompilerOptions::default()
    });
    compiler.add_package("TestApp", dir.path());

    let result = compiler.compile().expect("compile");
    assert!(messages(&result).is_empty(), "unexpected diagnostics: {result:?}");
    assert_eq!(result.entry_points.len(), 1);
    assert_eq!(result.entry_points[0].method.name, "Main");
}

#[test]
fn non_exported_entry_point_is_diagnosed() {
    let dir = TempDir::new().expect("tempdir");
    write_file(
        dir.path(),
        "program.ax",
        "class Program {\n\
         \texport void Main() { }\n\
         }\n",
    );

    let mut compiler = Compiler::new(CompilerOptions {
        worker_threads: 1,
        root_package: "TestApp".to_string(),
        entry_points: vec!["Program".to_string()],
        ..CompilerOptions::default()
    });
    compiler.add_package("TestApp", dir.path());

    let result = compiler.compile().expect("compile");
    assert!(result.entry_points.is_empty());
    assert!(
        messages(&result)
            .iter()
            .any(|m| m.starts_with("Entry points must be marked as `export`")),
        "missing export diagnostic: {result:?}"
    );
}

#[test]
fn duplicate_entry_point_patterns_dedup_by_method() {
    let dir = TempDir::new().expect("tempdir");
    write_file(
        dir.path(),
        "program.ax",
        "export class Program { export void Main() { } }\n",
    );

    let mut compiler = Compiler::new(CompilerOptions {
        worker_threads: 1,
        root_package: "TestApp".to_string(),
        entry_points: vec![
            "Program".to_string(),
            "Program".to_string(),
            "Program.Main".to_string(),
        ],
        ..CompilerOptions::default()
    });
    compiler.add_package("TestApp", dir.path());

    let result = compiler.compile().expect("compile");
    assert_eq!(
        result.entry_points.len(),
        1,
        "each MethodInfo appears exactly once"
    );
}

#[test]
fn overload_scoring_prefers_identical_over_widening() {
    let dir = TempDir::new().expect("tempdir");
    write_file(
        dir.path(),
        "over.ax",
        "class Over {\n\
         \tvoid F(double d) { }\n\
         \tvoid F(int i) { }\n\
         \tvoid Caller() { F(5); }\n\
         }\n",
    );

    let mut compiler = compiler_for(&[("App", &dir)]);
    let result = compiler.compile().expect("compile");
    assert!(messages(&result).is_empty(), "unexpected diagnostics: {result:?}");

    let mut selected = None;
    for_each_expr(&compiler, |kind| {
        if let ExprKind::InstanceCall { method, .. } | ExprKind::StaticCall { method, .. } = kind {
            if method.name == "F" {
                selected = Some(method.clone());
            }
        }
    });
    let selected = selected.expect("call resolved");
    assert_eq!(selected.parameters[0].ty.built_in, BuiltInType::Int32);
}

#[test]
fn tied_overloads_are_diagnosed_as_ambiguous() {
    let dir = TempDir::new().expect("tempdir");
    write_file(
        dir.path(),
        "amb.ax",
        "class Amb {\n\
         \tvoid F(int a, double b) { }\n\
         \tvoid F(double a, int b) { }\n\
         \tvoid Caller() { F(1, 2); }\n\
         }\n",
    );

    let mut compiler = compiler_for(&[("App", &dir)]);
    let result = compiler.compile().expect("compile");
    assert!(
        messages(&result)
            .iter()
            .any(|m| m.starts_with("Ambiguous method call")),
        "expected ambiguity diagnostic: {result:?}"
    );
}

#[test]
fn signed_unsigned_comparison_requires_a_cast() {
    let dir = TempDir::new().expect("tempdir");
    write_file(
        dir.path(),
        "cmp.ax",
        "class Cmp {\n\
         \tbool Check(uint u, int i) { return u < i; }\n\
         }\n",
    );

    let mut compiler = compiler_for(&[("App", &dir)]);
    let result = compiler.compile().expect("compile");
    assert!(
        messages(&result)
            .iter()
            .any(|m| m.starts_with("Cannot compare signed and unsigned types")),
        "expected sign-mix diagnostic: {result:?}"
    );
}

#[test]
fn if_with_context_list_unwraps_nullable_conditions() {
    let dir = TempDir::new().expect("tempdir");
    write_file(
        dir.path(),
        "ctx.ax",
        "class Ctx {\n\
         \tint Unwrap(int? a) {\n\
         \t\tif (a) using (v) { return v + 1; }\n\
         \t\treturn 0;\n\
         \t}\n\
         }\n",
    );

    let mut compiler = compiler_for(&[("App", &dir)]);
    let result = compiler.compile().expect("compile");
    assert!(messages(&result).is_empty(), "unexpected diagnostics: {result:?}");

    let mut saw_has_value = false;
    let mut saw_value = false;
    for_each_expr(&compiler, |kind| {
        match kind {
            ExprKind::NullableHasValue { .. } => saw_has_value = true,
            ExprKind::NullableValue { .. } => saw_value = true,
            _ => {}
        }
    });
    assert!(saw_has_value, "condition must lower to a hasValue check");
    assert!(saw_value, "context binding must lower to a value read");
}

#[test]
fn inaccessible_private_field_is_diagnosed() {
    let dir = TempDir::new().expect("tempdir");
    write_file(
        dir.path(),
        "acc.ax",
        "class Holder { private int secret; }\n\
         class Reader {\n\
         \tint Read(Holder h) { return h.secret; }\n\
         }\n",
    );

    let mut compiler = compiler_for(&[("App", &dir)]);
    let result = compiler.compile().expect("compile");
    assert!(
        messages(&result)
            .iter()
            .any(|m| m.contains("is marked private and is not accessible here")),
        "expected private-access diagnostic: {result:?}"
    );
}

#[test]
fn unresolved_type_and_identifier_report_stable_messages() {
    let dir = TempDir::new().expect("tempdir");
    write_file(
        dir.path(),
        "bad.ax",
        "class Bad {\n\
         \tMissing field;\n\
         \tvoid Go() { frobnicate(); }\n\
         }\n",
    );

    let mut compiler = compiler_for(&[("App", &dir)]);
    let result = compiler.compile().expect("compile");
    let all = messages(&result);
    assert!(
        all.iter().any(|m| m.starts_with("Unable to resolve type `Missing`")),
        "missing type diagnostic: {all:?}"
    );
    assert!(
        all.iter().any(|m| m.contains("No method with this name")),
        "missing identifier diagnostic: {all:?}"
    );
}

#[test]
fn optional_parameter_ordering_violations_are_diagnosed() {
    let dir = TempDir::new().expect("tempdir");
    write_file(
        dir.path(),
        "opt.ax",
        "class Opt {\n\
         \tvoid Bad(int a = 1, int b) { }\n\
         \tvoid AlsoBad(int a, ref int b = 2) { }\n\
         \tvoid Dup(int a, int a) { }\n\
         }\n",
    );

    let mut compiler = compiler_for(&[("App", &dir)]);
    let result = compiler.compile().expect("compile");
    let all = messages(&result);
    assert!(all
        .iter()
        .any(|m| m == "Optional parameters must appear after all required parameters"));
    assert!(all
        .iter()
        .any(|m| m == "Optional parameters cannot be passed by ref or out"));
    assert!(all.iter().any(|m| m == "Duplicate parameter `a`"));
}

#[test]
fn code_gen_visits_each_method_exactly_once() {
    let dir = TempDir::new().expect("tempdir");
    write_file(
        dir.path(),
        "reach.ax",
        "export class Program {\n\
         \texport void Main() { Helper(); Helper(); Other(); }\n\
         \tvoid Helper() { Other(); }\n\
         \tvoid Other() { }\n\
         }\n",
    );

    let mut compiler = Compiler::new(CompilerOptions {
        worker_threads: 2,
        root_package: "App".to_string(),
        entry_points: vec!["Program.Main".to_string()],
        ..CompilerOptions::default()
    });
    compiler.add_package("App", dir.path());

    let result = compiler.compile().expect("compile");
    assert!(messages(&result).is_empty(), "unexpected diagnostics: {result:?}");
    assert_eq!(result.entry_points.len(), 1);

    // signatures carry only the method's own mangled name, so one
    // signature per name proves the CAS gate fired exactly once
    let signatures: Vec<&str> = result
        .outputs
        .iter()
        .filter(|o| o.kind == alchemy_analysis::codegen::CodeGenOutputKind::MethodSignature)
        .map(|o| o.text.as_str())
        .collect();

    let helper_count = signatures.iter().filter(|t| t.contains("_Helper_")).count();
    let other_count = signatures.iter().filter(|t| t.contains("_Other_")).count();
    let main_count = signatures.iter().filter(|t| t.contains("_Main_")).count();
    assert_eq!(helper_count, 1, "has_code_gen gate fires once per method");
    assert_eq!(other_count, 1, "has_code_gen gate fires once per method");
    assert_eq!(main_count, 1);
}

#[test]
fn file_ids_are_reused_after_deletion() {
    let dir = TempDir::new().expect("tempdir");
    write_file(dir.path(), "a.ax", "class A { int x; }\n");
    write_file(dir.path(), "b.ax", "class B { int x; }\n");

    let mut compiler = compiler_for(&[("App", &dir)]);
    compiler.compile().expect("first compile");
    assert_eq!(compiler.file_count(), 2);

    let b_id = compiler
        .files()
        .iter()
        .find(|f| f.path.ends_with("b.ax"))
        .map(|f| f.file_id)
        .expect("b.ax registered");

    std::fs::remove_file(dir.path().join("b.ax")).expect("delete b.ax");
    write_file(dir.path(), "c.ax", "class C { int x; }\n");

    compiler.compile().expect("second compile");
    assert_eq!(compiler.file_count(), 2);

    let c_id = compiler
        .files()
        .iter()
        .find(|f| f.path.ends_with("c.ax"))
        .map(|f| f.file_id)
        .expect("c.ax registered");
    assert_eq!(c_id, b_id, "freed file id must be reused");
    assert!(compiler.resolve_type("App::B").is_none());
    assert!(compiler.resolve_type("App::C").is_some());
}

#[test]
fn dependency_closure_invalidates_transitive_dependents() {
    let dir = TempDir::new().expect("tempdir");
    write_file(dir.path(), "a.ax", "class A { int x; }\n");
    write_file(dir.path(), "b.ax", "class B { A a; }\n");
    write_file(dir.path(), "c.ax", "class C { B b; }\n");

    let mut compiler = compiler_for(&[("App", &dir)]);
    compiler.compile().expect("first compile");

    let files = compiler.files();
    let find = |suffix: &str| {
        files
            .iter()
            .find(|f| f.path.ends_with(suffix))
            .cloned()
            .expect("file present")
    };
    let (a, b, c) = (find("a.ax"), find("b.ax"), find("c.ax"));

    // direct dependencies were recorded during resolution
    assert!(b.references_file(a.file_id));
    assert!(c.references_file(b.file_id));

    let c_type_before = compiler.resolve_type("App::C").expect("C");

    // edit only a.ax; the closure must re-analyze b.ax and c.ax too
    std::thread::sleep(std::time::Duration::from_millis(50));
    write_file(dir.path(), "a.ax", "class A { int x; int y; }\n");
    compiler.compile().expect("second compile");

    let c_type_after = compiler.resolve_type("App::C").expect("C");
    assert!(
        !Arc::ptr_eq(&c_type_before, &c_type_after),
        "transitive dependent must be rebuilt"
    );
}

#[test]
fn unchanged_files_keep_their_type_identities() {
    let dir = TempDir::new().expect("tempdir");
    write_file(dir.path(), "stable.ax", "class Stable { int x; }\n");
    write_file(dir.path(), "volatile.ax", "class Volatile { int x; }\n");

    let mut compiler = compiler_for(&[("App", &dir)]);
    compiler.compile().expect("first compile");

    let stable_before = compiler.resolve_type("App::Stable").expect("Stable");

    std::thread::sleep(std::time::Duration::from_millis(50));
    write_file(dir.path(), "volatile.ax", "class Volatile { int x; int y; }\n");
    compiler.compile().expect("second compile");

    let stable_after = compiler.resolve_type("App::Stable").expect("Stable");
    assert!(
        Arc::ptr_eq(&stable_before, &stable_after),
        "files outside the changed closure must not be re-analyzed"
    );
}

#[test]
fn base_types_resolve_with_class_first() {
    let dir = TempDir::new().expect("tempdir");
    write_file(
        dir.path(),
        "hier.ax",
        "interface IThing { }\n\
         class Base { int b; }\n\
         class Derived : Base, IThing { int d; }\n",
    );

    let mut compiler = compiler_for(&[("App", &dir)]);
    let result = compiler.compile().expect("compile");
    assert!(messages(&result).is_empty(), "unexpected diagnostics: {result:?}");

    let derived = compiler.resolve_type("App::Derived").expect("Derived");
    let base = compiler.resolve_type("App::Base").expect("Base");
    let ithing = compiler.resolve_type("App::IThing").expect("IThing");

    let members = derived.members().expect("members");
    assert_eq!(members.base_types.len(), 2);
    assert!(Arc::ptr_eq(&members.base_types[0], &base));
    assert!(Arc::ptr_eq(&members.base_types[1], &ithing));

    assert!(derived.is_subclass_of(&base));
    assert!(derived.implements(&ithing));
    // inherited field lookup walks the class base
    assert!(derived.try_get_field("b").is_some());
}
