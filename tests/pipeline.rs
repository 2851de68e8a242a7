//! End-to-end pipeline tests: source text through lex, parse, check and
//! IR emission, asserting on the produced module or the recorded
//! diagnostics.

use la_lib::codegen;
use la_lib::diagnostics::DiagnosticSink;
use la_lib::lexer::Lexer;
use la_lib::parser::ast::CompilationUnit;
use la_lib::parser::Parser;
use la_lib::typechecker::TypeChecker;

fn check(source: &str) -> (Option<CompilationUnit>, DiagnosticSink) {
    let mut sink = DiagnosticSink::new();
    let file = sink.add_file("test.la", source);
    let tokens = Lexer::new(source, file).lex();
    let Ok(mut unit) = Parser::new(tokens, &mut sink).parse() else {
        return (None, sink);
    };
    match TypeChecker::new(&mut sink).check(&mut unit) {
        Ok(()) => (Some(unit), sink),
        Err(_) => (None, sink),
    }
}

fn emit_ir(source: &str) -> String {
    let (unit, sink) = check(source);
    let unit = unit.unwrap_or_else(|| {
        panic!(
            "check failed: {:?}",
            sink.diagnostics()
                .iter()
                .map(|d| d.message.clone())
                .collect::<Vec<_>>()
        )
    });
    let mut sink = sink;
    let context = inkwell::context::Context::create();
    let module =
        codegen::emit(&context, &unit, "test", &mut sink).expect("module verifies");
    module.print_to_string().to_string()
}

fn messages(source: &str) -> Vec<String> {
    let (_, sink) = check(source);
    sink.diagnostics()
        .iter()
        .map(|d| d.message.clone())
        .collect()
}

#[test]
fn hello_world_declares_printf_and_main() {
    let ir = emit_ir(
        r#"@extern fun printf(format *char, varargs Any) int64;
fun main() int64 {
    printf("Hello, World!\n");
    return 0;
}
"#,
    );
    assert!(ir.contains("declare i64 @printf"), "{ir}");
    assert!(ir.contains("..."), "varargs missing: {ir}");
    assert!(ir.contains("define i64 @main"), "{ir}");
    assert!(ir.contains("Hello, World!"), "{ir}");
    assert!(ir.contains("ret i64 0"), "{ir}");
}

#[test]
fn generic_identity_monomorphizes() {
    let ir = emit_ir(
        "fun id<T>(x T) T { return x; }
        fun main() int64 { return id<int64>(42); }",
    );
    assert!(ir.contains("define i64 @idi64"), "{ir}");
    assert!(ir.contains("call i64 @idi64"), "{ir}");
}

#[test]
fn function_pointer_through_struct_field() {
    let ir = emit_ir(
        "struct S { f *((int64) -> int64); }
        fun inc(x int64) int64 { return x + 1; }
        fun main() int64 { var s = S { &inc }; return s.f(41); }",
    );
    assert!(ir.contains("define i64 @inc"), "{ir}");
    // The field holds an erased pointer; the call goes indirect.
    assert!(ir.contains("call i64 %"), "{ir}");
}

#[test]
fn defer_expands_in_reverse_order() {
    let ir = emit_ir(
        r#"@extern fun puts(s *char) int32;
fun main() int64 {
    defer puts("b");
    defer puts("a");
    return 0;
}
"#,
    );
    // "b" interns first (_str_0), "a" second (_str_1); the unwind calls
    // "a" before "b".
    let a_call = ir.rfind("@_str_1").expect("call using \"a\"");
    let b_call = ir.rfind("@_str_0").expect("call using \"b\"");
    assert!(a_call < b_call, "{ir}");
}

#[test]
fn incomplete_enum_switch_is_reported() {
    let errors = messages(
        "enum Color : int8 { Red, Green, Blue }
        fun f(c Color) int64 {
            switch c { case Color::Red -> return 0; case Color::Green -> return 1; }
            return -1;
        }",
    );
    assert!(
        errors
            .iter()
            .any(|e| e.contains("Switch is incomplete and must has else branch")),
        "{errors:?}"
    );
}

#[test]
fn null_into_non_pointer_is_reported() {
    let errors = messages("fun f() { var x : int32 = null; }");
    assert!(
        errors
            .iter()
            .any(|e| e.contains("Can't declare non pointer variable with null value")),
        "{errors:?}"
    );
}

#[test]
fn every_checked_expression_has_a_type() {
    let (unit, _) = check(
        "fun add(a int64, b int64) int64 { return a + b; }
        fun main() int64 { return add(1, 2); }",
    );
    let unit = unit.expect("check succeeds");

    // Spot-check the tree: no expression slot is left unresolved.
    for statement in &unit.statements {
        if let la_lib::parser::ast::Statement::Function(function) = statement {
            for inner in &function.body.statements {
                if let la_lib::parser::ast::Statement::Return(ret) = inner {
                    let value = ret.value.as_ref().expect("return value");
                    assert!(!value.type_slot().is_unresolved());
                }
            }
        }
    }
}

#[test]
fn defers_run_before_every_return_path() {
    let ir = emit_ir(
        r#"@extern fun puts(s *char) int32;
fun f(x int64) int64 {
    defer puts("out");
    if x > 0 {
        return 1;
    }
    return 2;
}
fun main() int64 { return f(1); }
"#,
    );
    // Both returns unwind the defer scope: two calls to puts.
    let calls = ir.matches("call i32 @puts").count();
    assert_eq!(calls, 2, "{ir}");
}

#[test]
fn lambda_lifts_with_captured_parameter() {
    let ir = emit_ir(
        "fun main() int64 {
            var y = 10;
            var f = fun (x int64) -> int64 { return x + y; };
            return f(32);
        }",
    );
    // The lifted lambda takes the capture as its leading parameter.
    assert!(ir.contains("define i64 @_lambda_0(i64"), "{ir}");
}

#[test]
fn string_interning_shares_globals() {
    let ir = emit_ir(
        r#"@extern fun puts(s *char) int32;
fun main() int64 {
    puts("same");
    puts("same");
    return 0;
}
"#,
    );
    assert_eq!(ir.matches("_str_0").count() >= 3, true, "{ir}");
    assert!(!ir.contains("_str_1"), "second global for equal literal: {ir}");
}

#[test]
fn global_initializers_fold() {
    let ir = emit_ir(
        "var answer = 6 * 7;
        fun main() int64 { return answer; }",
    );
    assert!(ir.contains("@answer = global i64 42"), "{ir}");
}

#[test]
fn operator_overload_lowers_to_call() {
    let ir = emit_ir(
        "struct V { x int64; }
        operator + (a V, b V) V { return V { a.x + b.x }; }
        fun main() int64 {
            var v = V { 1 } + V { 2 };
            return v.x;
        }",
    );
    // Operator names contain the operator glyph; LLVM quotes them.
    assert!(ir.contains("_operator_+VV"), "{ir}");
}

#[test]
fn missing_return_is_reported() {
    let errors = messages("fun f(x int64) int64 { if x > 0 { return 1; } }");
    assert!(
        errors.iter().any(|e| e.contains("Missing return")),
        "{errors:?}"
    );
}

#[test]
fn break_deeper_than_nesting_is_rejected() {
    let errors = messages("fun f() { for { break 2; } }");
    assert!(
        errors.iter().any(|e| e.contains("exceeds")),
        "{errors:?}"
    );
}

#[test]
fn shift_amount_is_bounded_by_the_operand_width() {
    let errors = messages("fun f(x int8) int8 { return x << 8; }");
    assert!(
        errors.iter().any(|e| e.contains("Shift amount")),
        "{errors:?}"
    );

    let (unit, _) = check("fun f(x int8) int8 { return x << 7; }");
    assert!(unit.is_some());
}

#[test]
fn bool_enums_hold_at_most_two_members() {
    let (unit, _) = check("enum Flag : bool { Off, On }");
    assert!(unit.is_some());

    let errors = messages("enum Flag : bool { Off, On, Maybe }");
    assert!(
        errors.iter().any(|e| e.contains("two members")),
        "{errors:?}"
    );
}

#[test]
fn explicit_depth_one_and_same_type_cast_warn() {
    let (unit, sink) = check("fun f(x int64) { for { break 1; } var y = cast<int64>(x); }");
    assert!(unit.is_some());
    assert_eq!(sink.warning_count(), 2);
}
