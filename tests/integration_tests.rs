// Parser robustness tests for SMIA
//
// Every case runs the lexer and the recovering parser on a snippet and
// checks whether any lexical or syntax error was recorded.

use smia::ast::Program;
use smia::error::{Diagnostic, ErrorCode, ErrorCollector};
use smia::lexer::tokenize;
use smia::parser::Parser;

/// Test result for a single test case
#[derive(Debug)]
pub enum TestResult {
    Pass,
    Fail(String),
    Crash(String),
}

/// Individual test case
#[derive(Debug, Clone)]
pub struct TestCase {
    pub name: String,
    pub input: String,
    pub should_succeed: bool,
    pub expected_error_contains: Option<String>,
}

/// Test suite containing multiple test cases
#[derive(Debug)]
pub struct TestSuite {
    pub name: String,
    pub tests: Vec<TestCase>,
}

impl TestSuite {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tests: Vec::new(),
        }
    }

    pub fn add_test(&mut self, test: TestCase) {
        self.tests.push(test);
    }

    /// Run all tests in this suite
    pub fn run(&self) -> TestSuiteResults {
        let mut results = TestSuiteResults::new(&self.name);
        
        println!("Running test suite: {}", self.name);
        println!("{}", "=".repeat(50));

        for test in &self.tests {
            let result = run_single_test(test);
            results.add_result(&test.name, result);
        }

        results.print_summary();
        results
    }
}

/// Results for a test suite run
#[derive(Debug)]
pub struct TestSuiteResults {
    pub suite_name: String,
    pub results: Vec<(String, TestResult)>,
    pub passed: usize,
    pub failed: usize,
    pub crashed: usize,
}

impl TestSuiteResults {
    pub fn new(suite_name: &str) -> Self {
        Self {
            suite_name: suite_name.to_string(),
            results: Vec::new(),
            passed: 0,
            failed: 0,
            crashed: 0,
        }
    }

    pub fn add_result(&mut self, test_name: &str, result: TestResult) {
        match &result {
            TestResult::Pass => {
                self.passed += 1;
                println!("  ✓ {}", test_name);
            }
            TestResult::Fail(msg) => {
                self.failed += 1;
                println!("  ✗ {}: {}", test_name, msg);
            }
            TestResult::Crash(msg) => {
                self.crashed += 1;
                println!("  💥 {}: CRASHED - {}", test_name, msg);
            }
        }
        self.results.push((test_name.to_string(), result));
    }

    pub fn print_summary(&self) {
        println!();
        println!("Test Suite: {} - Summary", self.suite_name);
        println!("{}", "-".repeat(30));
        println!("Passed:  {}", self.passed);
        println!("Failed:  {}", self.failed);
        println!("Crashed: {}", self.crashed);
        println!("Total:   {}", self.results.len());
        
        if self.crashed > 0 {
            println!("\n⚠️  WARNING: {} tests caused crashes! Parser robustness needs improvement.", self.crashed);
        }
        
        if self.failed > 0 {
            println!("\n❌ {} tests had unexpected results.", self.failed);
        }
        
        if self.crashed == 0 && self.failed == 0 {
            println!("\n✅ All tests passed! Parser is robust.");
        }
        println!();
    }

    pub fn is_all_passed(&self) -> bool {
        self.crashed == 0 && self.failed == 0
    }
}

/// Run a single test case
fn run_single_test(test: &TestCase) -> TestResult {
    // Catch any panics to detect crashes
    let result = std::panic::catch_unwind(|| {
        parse_input(&test.input)
    });

    match result {
        Ok(parse_result) => {
            match (parse_result, test.should_succeed) {
                (Ok(_), true) => TestResult::Pass,
                (Ok(_), false) => TestResult::Fail("Expected parsing to fail, but it succeeded".to_string()),
                (Err(errors), false) => {
                    // Check if any error contains expected text
                    if let Some(expected) = &test.expected_error_contains {
                        if errors.iter().any(|error| error.message.contains(expected)) {
                            TestResult::Pass
                        } else {
                            TestResult::Fail(format!(
                                "No error message in {:?} contains expected text '{}'",
                                messages(&errors), expected
                            ))
                        }
                    } else {
                        TestResult::Pass // Any error is acceptable
                    }
                }
                (Err(errors), true) => TestResult::Fail(format!("Expected parsing to succeed, but got errors: {:?}", messages(&errors))),
            }
        }
        Err(panic_info) => {
            let panic_msg = if let Some(s) = panic_info.downcast_ref::<String>() {
                s.clone()
            } else if let Some(s) = panic_info.downcast_ref::<&str>() {
                s.to_string()
            } else {
                "Unknown panic".to_string()
            };
            TestResult::Crash(panic_msg)
        }
    }
}

/// Parse input, failing with every recorded diagnostic
fn parse_input(input: &str) -> Result<Program, Vec<Diagnostic>> {
    let mut errors = ErrorCollector::new();
    let tokens = tokenize(input, &mut errors);
    let program = Parser::new(tokens, &mut errors).parse();

    match program {
        Some(program) if errors.is_empty() => Ok(program),
        _ => Err(errors.drain()),
    }
}

fn messages(errors: &[Diagnostic]) -> Vec<&str> {
    errors.iter().map(|error| error.message.as_str()).collect()
}

/// Test case builder for convenience
impl TestCase {
    pub fn should_succeed(name: &str, input: &str) -> Self {
        Self {
            name: name.to_string(),
            input: input.to_string(),
            should_succeed: true,
            expected_error_contains: None,
        }
    }

    pub fn should_fail(name: &str, input: &str) -> Self {
        Self {
            name: name.to_string(),
            input: input.to_string(),
            should_succeed: false,
            expected_error_contains: None,
        }
    }

    pub fn should_fail_with_message(name: &str, input: &str, expected_msg: &str) -> Self {
        Self {
            name: name.to_string(),
            input: input.to_string(),
            should_succeed: false,
            expected_error_contains: Some(expected_msg.to_string()),
        }
    }
}

// ============================================================================
// Test Suite Creation Functions
// ============================================================================

fn create_malformed_expressions_tests() -> TestSuite {
    let mut suite = TestSuite::new("Malformed Expressions");

    // === PARENTHESES TESTS ===

    // Unmatched opening parentheses
    suite.add_test(TestCase::should_fail_with_message(
        "unmatched_opening_paren",
        "(1 + 2",
        "Expected ')' after expression"
    ));

    suite.add_test(TestCase::should_fail_with_message(
        "unmatched_opening_paren_nested",
        "((1 + 2)",
        "Expected ')' after expression"
    ));

    suite.add_test(TestCase::should_fail_with_message(
        "unmatched_opening_paren_complex",
        "(1 + (2 * 3)",
        "Expected ')' after expression"
    ));

    // Unmatched closing parentheses
    suite.add_test(TestCase::should_fail_with_message(
        "unmatched_closing_paren",
        "1 + 2)",
        "Expected end of statement, found ')'"
    ));

    suite.add_test(TestCase::should_fail_with_message(
        "unmatched_closing_paren_multiple",
        "1 + 2))",
        "Expected end of statement, found ')'"
    ));

    // Empty parentheses
    suite.add_test(TestCase::should_fail_with_message(
        "empty_parentheses",
        "()",
        "Empty parentheses are not allowed"
    ));

    suite.add_test(TestCase::should_fail_with_message(
        "empty_parentheses_in_expression",
        "1 + ()",
        "Expected expression after '+'"
    ));

    // === BRACKET TESTS ===

    // Unmatched opening brackets
    suite.add_test(TestCase::should_fail_with_message(
        "unmatched_opening_bracket",
        "[1, 2",
        "Expected ']' after list elements"
    ));

    suite.add_test(TestCase::should_fail_with_message(
        "unclosed_index",
        "items[0",
        "Expected ']' after index"
    ));

    // === BRACE TESTS ===

    // Unmatched opening braces
    suite.add_test(TestCase::should_fail_with_message(
        "unmatched_opening_brace",
        "{ x = 1",
        "Expected '}' after block"
    ));

    suite.add_test(TestCase::should_fail_with_message(
        "unmatched_closing_brace",
        "x = 1 }",
        "Expected expression, found '}'"
    ));

    suite
}

fn create_edge_case_tests() -> TestSuite {
    let mut suite = TestSuite::new("Edge Cases");

    // Empty input
    suite.add_test(TestCase::should_succeed("empty_input", ""));

    // Only whitespace
    suite.add_test(TestCase::should_succeed("only_whitespace", "   \n\t  "));

    // EOF conditions
    suite.add_test(TestCase::should_fail("unexpected_eof_after_operator", "1 +"));
    suite.add_test(TestCase::should_fail("unexpected_eof_in_expression", "1 + ("));

    // Deeply nested expressions
    let deep_parens = "(".repeat(40) + "1" + &")".repeat(40);
    suite.add_test(TestCase::should_succeed("deeply_nested_parens", &deep_parens));

    // Nesting past the limit is refused, not overflowed
    let too_deep = "(".repeat(5000) + "1" + &")".repeat(5000);
    suite.add_test(TestCase::should_fail_with_message(
        "nesting_limit",
        &too_deep,
        "nested too deeply"
    ));

    // Long operator chains count toward the same limit
    let long_chain = "1".to_string() + &" + 1".repeat(40);
    suite.add_test(TestCase::should_succeed("long_operator_chain", &long_chain));
    let endless_chain = "1".to_string() + &" + 1".repeat(100_000);
    suite.add_test(TestCase::should_fail_with_message(
        "operator_chain_limit",
        &endless_chain,
        "nested too deeply"
    ));

    // Comments only
    suite.add_test(TestCase::should_succeed("only_comments", "# setup\n// nothing\n/* here */"));

    suite
}

fn create_operator_tests() -> TestSuite {
    let mut suite = TestSuite::new("Operator Tests");

    // Missing operands
    suite.add_test(TestCase::should_fail("missing_left_operand", "+ 1"));
    suite.add_test(TestCase::should_fail("missing_right_operand", "1 +"));
    suite.add_test(TestCase::should_fail("missing_both_operands", "+"));

    // Invalid operator combinations
    suite.add_test(TestCase::should_fail("plus_star", "1 + * 2"));
    // A sign glued to a digit after an operator belongs to the number
    suite.add_test(TestCase::should_succeed("double_minus", "1 -- 2")); // Parsed as 1 - (-2)
    suite.add_test(TestCase::should_succeed("mixed_operators", "1 +- 2")); // Parsed as 1 + (-2)
    suite.add_test(TestCase::should_succeed("double_plus", "1 ++ 2")); // Parsed as 1 + (+2)
    suite.add_test(TestCase::should_succeed("remainder", "7 % 2"));
    suite.add_test(TestCase::should_succeed("not_keyword", "not true"));

    // Comparison operators
    suite.add_test(TestCase::should_succeed("comparison_equal", "1 == 2"));
    suite.add_test(TestCase::should_succeed("comparison_not_equal", "1 != 2"));
    suite.add_test(TestCase::should_succeed("comparison_less", "1 < 2"));
    suite.add_test(TestCase::should_succeed("comparison_greater", "1 > 2"));

    suite
}

fn create_control_flow_tests() -> TestSuite {
    let mut suite = TestSuite::new("Control Flow Tests");

    // If statements
    suite.add_test(TestCase::should_succeed("valid_if", "if (true) { x = 1 }"));
    suite.add_test(TestCase::should_fail("if_missing_condition", "if { x = 1 }"));
    suite.add_test(TestCase::should_fail("if_missing_body", "if (true)"));

    // While loops
    suite.add_test(TestCase::should_succeed("valid_while", "while (true) { x = 1 }"));
    suite.add_test(TestCase::should_fail("while_missing_condition", "while { x = 1 }"));
    suite.add_test(TestCase::should_fail("while_missing_body", "while (true)"));

    // For loops
    suite.add_test(TestCase::should_succeed("valid_for", "for (i = 0; i < 10; i = i + 1) { print(i) }"));
    suite.add_test(TestCase::should_succeed("for_with_var", "for (var i = 0; i < 3; i = i + 1) { print(i) }"));
    suite.add_test(TestCase::should_succeed("for_empty_clauses", "for (;;) { x = 1 }"));
    suite.add_test(TestCase::should_fail_with_message(
        "for_missing_semicolon",
        "for (i = 0 i < 10; i = i + 1) { print(i) }",
        "Expected ';' after loop initializer"
    ));

    // Procedures
    suite.add_test(TestCase::should_succeed("valid_proc", "proc add(a, b) { return a + b }"));
    suite.add_test(TestCase::should_succeed("proc_without_params", "proc hello() { print(\"hi\") }"));
    suite.add_test(TestCase::should_fail_with_message(
        "proc_missing_name",
        "proc (a) { return a }",
        "Expected procedure name after 'proc'"
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "proc_missing_body",
        "proc f(a) return a",
        "Expected '{' before procedure body"
    ));

    // Statement separators
    suite.add_test(TestCase::should_succeed("semicolons", "x = 1; y = 2;"));
    suite.add_test(TestCase::should_fail_with_message(
        "two_statements_one_line",
        "x = 1 y = 2",
        "Expected end of statement"
    ));

    suite
}

fn create_literal_tests() -> TestSuite {
    let mut suite = TestSuite::new("Literal Tests");

    // Valid literals
    suite.add_test(TestCase::should_succeed("integer_literal", "42"));
    suite.add_test(TestCase::should_succeed("double_literal", "3.14"));
    suite.add_test(TestCase::should_succeed("string_literal", "\"hello\""));
    suite.add_test(TestCase::should_succeed("boolean_true", "true"));
    suite.add_test(TestCase::should_succeed("boolean_false", "false"));

    // Invalid number formats
    suite.add_test(TestCase::should_fail("multiple_dots", "3.14.159"));
    suite.add_test(TestCase::should_fail("trailing_dot", "42."));
    suite.add_test(TestCase::should_fail("leading_dot", ".42"));

    suite.add_test(TestCase::should_succeed("undefined_literal", "undefined"));
    suite.add_test(TestCase::should_succeed("negative_literal", "-7"));
    suite.add_test(TestCase::should_succeed("list_literal", "[1, \"two\", [3]]"));
    suite.add_test(TestCase::should_succeed("uppercase_keywords", "VAR x = TRUE"));

    // Unterminated strings
    suite.add_test(TestCase::should_fail_with_message("unterminated_string", "\"hello", "Unterminated string"));
    suite.add_test(TestCase::should_fail("unterminated_string_with_newline", "\"hello\nworld"));
    suite.add_test(TestCase::should_fail_with_message("unterminated_comment", "x = 1 /* open", "Unterminated block comment"));
    suite.add_test(TestCase::should_fail_with_message("stray_character", "x = 3 @ 4", "Unexpected character: '@'"));

    suite
}

fn create_function_call_tests() -> TestSuite {
    let mut suite = TestSuite::new("Function Call Tests");

    // Valid procedure calls
    suite.add_test(TestCase::should_succeed("simple_function_call", "foo()"));
    suite.add_test(TestCase::should_succeed("function_call_with_args", "foo(1, 2, 3)"));
    suite.add_test(TestCase::should_fail_with_message(
        "call_on_expression",
        "(foo)(1)",
        "Only named procedures can be called"
    ));

    // Invalid function calls
    suite.add_test(TestCase::should_fail("missing_closing_paren", "foo(1, 2"));
    suite.add_test(TestCase::should_fail("missing_opening_paren", "foo 1, 2)"));
    suite.add_test(TestCase::should_fail("trailing_comma", "foo(1, 2,)"));

    suite
}

fn create_assignment_tests() -> TestSuite {
    let mut suite = TestSuite::new("Assignment Tests");

    // Valid assignments
    suite.add_test(TestCase::should_succeed("simple_assignment", "x = 1"));
    suite.add_test(TestCase::should_succeed("assignment_with_expression", "x = 1 + 2"));

    // Invalid assignments
    suite.add_test(TestCase::should_fail("missing_value", "x ="));
    suite.add_test(TestCase::should_fail_with_message("invalid_target", "1 = x", "Invalid assignment target"));
    suite.add_test(TestCase::should_succeed("var_without_initializer", "var x"));
    suite.add_test(TestCase::should_fail_with_message("var_missing_name", "var = 3", "Expected variable name after 'var'"));

    suite
}

fn create_mixed_construct_tests() -> TestSuite {
    let mut suite = TestSuite::new("Mixed Construct Tests");

    // Complex valid expressions
    suite.add_test(TestCase::should_succeed(
        "complex_expression",
        "x = (1 + 2) * 3 + foo(4, 5)"
    ));

    // Complex invalid expressions
    suite.add_test(TestCase::should_fail(
        "mixed_paren_bracket_error",
        "x = [1 + (2 * 3]"
    ));

    suite
}

fn create_positive_tests() -> TestSuite {
    let mut suite = TestSuite::new("Positive Tests");

    // These tests verify that valid syntax still parses correctly
    suite.add_test(TestCase::should_succeed("simple_arithmetic", "1 + 2 * 3"));
    suite.add_test(TestCase::should_succeed("parentheses", "(1 + 2) * 3"));
    suite.add_test(TestCase::should_succeed("variable_assignment", "x = 42"));
    suite.add_test(TestCase::should_succeed("string_concatenation", "\"hello\" + \" world\""));
    suite.add_test(TestCase::should_succeed("boolean_operations", "true and false"));
    suite.add_test(TestCase::should_succeed("comparison", "1 < 2"));
    suite.add_test(TestCase::should_succeed(
        "small_program",
        "var total = 0\nfor (var i = 1; i <= 3; i = i + 1) {\n  total = total + i\n}\nif (total > 5) { print(\"big\") } else { print(\"small\") }",
    ));

    suite
}

// ============================================================================
// Recovery
// ============================================================================

#[test]
fn reports_every_broken_statement() {
    let source = "x = (1 + 2;\ny = 2\nz = * 3\nprint(y)";
    let errors = parse_input(source).expect_err("two statements are broken");

    assert_eq!(errors.len(), 2, "got {:?}", messages(&errors));
    assert_eq!(errors[0].line, 1);
    assert_eq!(errors[1].line, 3);
    assert!(errors.iter().all(|error| error.severity == smia::Severity::Syntactic));
}

#[test]
fn recovery_keeps_valid_statements() {
    let mut errors = ErrorCollector::new();
    let tokens = tokenize("a = 1\nb = )\nc = 3", &mut errors);
    let program = Parser::new(tokens, &mut errors).parse().expect("recoverable");

    assert_eq!(errors.len(), 1);
    assert_eq!(program.statements.len(), 3);
    assert!(matches!(program.statements[1], smia::Stmt::Error { .. }));
}

#[test]
fn broken_statement_inside_block() {
    let errors = parse_input("{\n  x = = 1\n  y = 2\n}\nz = 3").expect_err("one broken statement");
    assert_eq!(errors.len(), 1, "got {:?}", messages(&errors));
    assert_eq!(errors[0].line, 2);
}

#[test]
fn lexical_error_is_not_reported_twice() {
    let errors = parse_input("x = 3 @ 4\ny = 1").expect_err("stray character");
    assert_eq!(errors.len(), 1, "got {:?}", messages(&errors));
    assert_eq!(errors[0].code, ErrorCode::InvalidCharacter);
}

#[test]
fn nesting_limit_stops_parsing() {
    let source = "(".repeat(5000) + "1" + &")".repeat(5000);
    let mut errors = ErrorCollector::new();
    let tokens = tokenize(&source, &mut errors);
    let program = Parser::new(tokens, &mut errors).with_max_depth(64).parse();

    assert!(program.is_none());
    assert_eq!(errors.len(), 1);
    assert_eq!(errors.entries()[0].code, ErrorCode::RecursionLimit);
}

#[test]
fn broken_chains_release_their_depth() {
    let source = "x = 1 + 2 + * 3\n".repeat(20) + "y = 1 + 1 + 1";
    let mut errors = ErrorCollector::new();
    let tokens = tokenize(&source, &mut errors);
    let program = Parser::new(tokens, &mut errors).with_max_depth(8).parse().expect("recoverable");

    assert_eq!(errors.len(), 20);
    assert!(errors.entries().iter().all(|error| error.code != ErrorCode::RecursionLimit));
    assert_eq!(program.statements.len(), 21);
}

#[test]
fn operator_on_a_new_line_starts_a_statement() {
    let errors = parse_input("x = 5\n-3\ny = 1\n+ 2").expect_err("'+' cannot start a statement");
    assert_eq!(errors.len(), 1, "got {:?}", messages(&errors));
    assert_eq!(errors[0].line, 4);

    let program = parse_input("x = 5\n-3").expect("two statements");
    assert_eq!(program.statements.len(), 2);
}

// ============================================================================
// Main Test Function
// ============================================================================

#[test]
fn comprehensive_parser_tests() {
    println!("🧪 SMIA Parser Robustness Test Suite");
    println!("====================================\n");

    let mut all_passed = true;

    // Run each test suite
    let suites = vec![
        create_malformed_expressions_tests(),
        create_edge_case_tests(),
        create_operator_tests(),
        create_control_flow_tests(),
        create_literal_tests(),
        create_function_call_tests(),
        create_assignment_tests(),
        create_mixed_construct_tests(),
        create_positive_tests(),
    ];

    for suite in suites {
        let results = suite.run();
        if !results.is_all_passed() {
            all_passed = false;
        }
    }

    if all_passed {
        println!("🎉 ALL TESTS PASSED! Parser is robust and handles all edge cases gracefully.");
    } else {
        println!("⚠️  Some tests failed. See output above for details.");
    }
    assert!(all_passed, "parser robustness suites reported failures");
}