use smia::ast::{Program, Stmt};
use smia::checker::{Checker, SymbolKind, SymbolTable};
use smia::error::{Diagnostic, ErrorCode, ErrorCollector, Severity};
use smia::lexer::tokenize;
use smia::parser::Parser;

/// Lexes, parses and checks `source`, returning the checked program and
/// the semantic diagnostics.
fn check(source: &str) -> (Program, Vec<Diagnostic>) {
    let mut errors = ErrorCollector::new();
    let tokens = tokenize(source, &mut errors);
    let program = Parser::new(tokens, &mut errors)
        .parse()
        .expect("test programs stay within the nesting limit");
    assert!(errors.is_empty(), "unexpected syntax errors: {:?}", errors.entries());

    let program = Checker::new(&mut errors).check(program);
    (program, errors.drain())
}

fn codes(errors: &[Diagnostic]) -> Vec<ErrorCode> {
    errors.iter().map(|error| error.code).collect()
}

#[test]
fn clean_program_has_no_diagnostics() {
    let source = "var total = 0\nproc add(a, b) { return a + b }\ntotal = add(total, 2)\nprint(total, len(\"abc\"), type(total))";
    let (_, errors) = check(source);
    assert!(errors.is_empty(), "{:?}", errors);
}

#[test]
fn undeclared_identifier_rejects_the_statement() {
    let (program, errors) = check("print(y)");

    assert_eq!(codes(&errors), vec![ErrorCode::UndeclaredIdentifier]);
    assert_eq!(errors[0].severity, Severity::Semantic);
    assert_eq!((errors[0].line, errors[0].column), (1, 7));
    assert!(matches!(program.statements[0], Stmt::Error { .. }));
}

#[test]
fn redeclaration_points_at_the_second_declaration() {
    let (program, errors) = check("var x = 1\nvar x = 2");

    assert_eq!(codes(&errors), vec![ErrorCode::Redeclaration]);
    assert_eq!((errors[0].line, errors[0].column), (2, 5));
    assert!(matches!(program.statements[0], Stmt::VarDecl { .. }));
    assert!(matches!(program.statements[1], Stmt::Error { .. }));
}

#[test]
fn shadowing_in_a_block_is_allowed() {
    let (_, errors) = check("var x = 1\n{ var x = 2\n print(x) }");
    assert!(errors.is_empty(), "{:?}", errors);
}

#[test]
fn block_variables_do_not_leak() {
    let (_, errors) = check("{ var inner = 1 }\nprint(inner)");
    assert_eq!(codes(&errors), vec![ErrorCode::UndeclaredIdentifier]);
    assert_eq!(errors[0].line, 2);
}

#[test]
fn assignment_declares_a_variable() {
    let (_, errors) = check("count = 1\ncount = count + 1\nprint(count)");
    assert!(errors.is_empty(), "{:?}", errors);
}

#[test]
fn procedures_can_be_called_before_their_declaration() {
    let (_, errors) = check("print(twice(2))\nproc twice(n) { return n * 2 }");
    assert!(errors.is_empty(), "{:?}", errors);
}

#[test]
fn duplicate_procedures_and_parameters() {
    let (_, errors) = check("proc f(a, a) { return a }\nproc f() { return 1 }");
    assert_eq!(
        codes(&errors),
        vec![ErrorCode::Redeclaration, ErrorCode::Redeclaration]
    );
    // Hoisting reports the duplicate procedure before the body is visited.
    assert_eq!(errors[0].line, 2);
    assert_eq!((errors[1].line, errors[1].column), (1, 11));
}

#[test]
fn variable_clashing_with_a_procedure() {
    let (_, errors) = check("var area = 1\nproc area() { return 2 }");
    assert_eq!(codes(&errors), vec![ErrorCode::Redeclaration]);
    assert_eq!(errors[0].line, 1);
}

#[test]
fn arity_is_checked_for_procedures_and_builtins() {
    let (_, errors) = check("proc f(a, b) { return a }\nf(1)\nlen(1, 2)\nprint()\nprint(1, 2, 3)");
    assert_eq!(
        codes(&errors),
        vec![ErrorCode::ArityMismatch, ErrorCode::ArityMismatch]
    );
    assert_eq!(errors[0].line, 2);
    assert_eq!(errors[1].line, 3);
}

#[test]
fn builtin_scope_comes_first() {
    let mut symbols = SymbolTable::with_builtins();
    let len = symbols.lookup("len").expect("len is a builtin");
    assert_eq!(len.kind, SymbolKind::Procedure { arity: Some(1) });
    assert_eq!(len.scope_id, 0);
    assert_eq!(symbols.lookup("print").map(|s| s.kind), Some(SymbolKind::Procedure { arity: None }));

    assert_eq!(symbols.push(), 1);
    assert!(symbols.declare("len", SymbolKind::Variable, Default::default()).is_ok());
    assert_eq!(symbols.lookup("len").map(|s| s.kind), Some(SymbolKind::Variable));
}

#[test]
fn calling_a_variable_is_not_callable() {
    let (_, errors) = check("var f = 1\nf(2)");
    assert_eq!(codes(&errors), vec![ErrorCode::NotCallable]);
}

#[test]
fn procedure_used_as_value() {
    let (_, errors) = check("proc f() { return 1 }\nx = f + 1");
    assert_eq!(codes(&errors), vec![ErrorCode::TypeMismatch]);
}

#[test]
fn return_outside_procedure() {
    let (program, errors) = check("return 5");
    assert_eq!(codes(&errors), vec![ErrorCode::ReturnOutsideProcedure]);
    assert!(matches!(program.statements[0], Stmt::Error { .. }));
}

#[test]
fn literal_type_mismatches() {
    let (_, errors) = check("a = \"x\" - 1\nb = 1 + \"x\"\nc = -\"x\"\nd = 1 < \"x\"\ne = 5[0]\nf = [1][\"a\"]");
    assert_eq!(codes(&errors), vec![ErrorCode::TypeMismatch; 6]);
    let lines: Vec<usize> = errors.iter().map(|error| error.line).collect();
    assert_eq!(lines, vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn well_typed_literals_pass() {
    let (_, errors) = check("a = \"x\" + \"y\"\nb = 1 + 2 * 3 % 2\nc = \"a\" < \"b\"\nd = 1 == \"1\"\ne = \"abc\"[1]\nf = not 3");
    assert!(errors.is_empty(), "{:?}", errors);
}

#[test]
fn unknown_kinds_are_left_to_runtime() {
    let (_, errors) = check("proc get() { return \"x\" }\ny = get() - 1");
    assert!(errors.is_empty(), "{:?}", errors);
}

#[test]
fn failed_initializer_still_declares_the_variable() {
    let (program, errors) = check("var x = missing\nprint(x)");
    assert_eq!(codes(&errors), vec![ErrorCode::UndeclaredIdentifier]);
    match &program.statements[0] {
        Stmt::VarDecl { initializer, .. } => assert!(initializer.is_none()),
        other => panic!("expected a declaration, got {:?}", other),
    }
    assert!(matches!(program.statements[1], Stmt::Expression { .. }));
}

#[test]
fn procedure_bodies_see_enclosing_scopes() {
    let (_, errors) = check("var base = 10\nproc add(n) { return base + n }\nprint(add(1))");
    assert!(errors.is_empty(), "{:?}", errors);

    let (_, errors) = check("proc f(n) { return n }\nprint(n)");
    assert_eq!(codes(&errors), vec![ErrorCode::UndeclaredIdentifier]);
}

#[test]
fn for_header_scope() {
    let (_, errors) = check("for (var i = 0; i < 3; i = i + 1) { print(i) }\nprint(i)");
    assert_eq!(codes(&errors), vec![ErrorCode::UndeclaredIdentifier]);
    assert_eq!(errors[0].line, 2);
}

#[test]
fn every_independent_error_is_reported() {
    let (_, errors) = check("print(a)\nprint(b)\nvar c = 1\nvar c = 2\nreturn");
    assert_eq!(
        codes(&errors),
        vec![
            ErrorCode::UndeclaredIdentifier,
            ErrorCode::UndeclaredIdentifier,
            ErrorCode::Redeclaration,
            ErrorCode::ReturnOutsideProcedure
        ]
    );
}
