use crate::ast::{BinaryOp, Expr, LogicalOp, ProcDecl, Program, Stmt, UnaryOp};
use crate::error::{Diagnostic, ErrorCode, ErrorCollector, Span};
use crate::value::ValueKind;
use std::collections::{HashMap, HashSet};

/// Builtin procedures and their arity (`None` accepts any number of
/// arguments).
pub const BUILTINS: &[(&str, Option<usize>)] = &[("print", None), ("len", Some(1)), ("type", Some(1))];

const BUILTIN_SCOPE: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Procedure { arity: Option<usize> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub scope_id: usize,
    pub span: Span,
}

#[derive(Debug)]
struct Scope {
    id: usize,
    symbols: HashMap<String, Symbol>,
}

/// Stack of scopes, innermost last.
#[derive(Debug, Default)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    next_id: usize,
}

impl SymbolTable {
    /// A table holding only the builtin scope.
    pub fn with_builtins() -> Self {
        let symbols = BUILTINS
            .iter()
            .map(|(name, arity)| {
                let symbol = Symbol {
                    name: name.to_string(),
                    kind: SymbolKind::Procedure { arity: *arity },
                    scope_id: BUILTIN_SCOPE,
                    span: Span::default(),
                };
                (name.to_string(), symbol)
            })
            .collect();

        Self {
            scopes: vec![Scope {
                id: BUILTIN_SCOPE,
                symbols,
            }],
            next_id: BUILTIN_SCOPE + 1,
        }
    }

    pub fn push(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.scopes.push(Scope {
            id,
            symbols: HashMap::new(),
        });
        id
    }

    pub fn pop(&mut self) {
        self.scopes.pop();
    }

    /// Declares `name` in the innermost scope. On a clash within that scope
    /// the existing symbol is returned and nothing changes.
    pub fn declare(&mut self, name: &str, kind: SymbolKind, span: Span) -> Result<(), Symbol> {
        let Some(scope) = self.scopes.last_mut() else {
            return Ok(());
        };
        if let Some(existing) = scope.symbols.get(name) {
            return Err(existing.clone());
        }
        scope.symbols.insert(
            name.to_string(),
            Symbol {
                name: name.to_string(),
                kind,
                scope_id: scope.id,
                span,
            },
        );
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.symbols.get(name))
    }
}

/// Static checks over a parsed program.
///
/// Statements whose own expressions are in error come back as
/// `Stmt::Error`, so the evaluator never runs them.
pub struct Checker<'e> {
    symbols: SymbolTable,
    errors: &'e mut ErrorCollector,
    procedure_depth: usize,
}

impl<'e> Checker<'e> {
    pub fn new(errors: &'e mut ErrorCollector) -> Self {
        Self {
            symbols: SymbolTable::with_builtins(),
            errors,
            procedure_depth: 0,
        }
    }

    pub fn check(&mut self, program: Program) -> Program {
        self.symbols.push();
        let statements = self.check_block(program.statements);
        self.symbols.pop();
        Program { statements }
    }

    fn check_block(&mut self, statements: Vec<Stmt>) -> Vec<Stmt> {
        let duplicates = self.hoist_procedures(&statements);

        statements
            .into_iter()
            .enumerate()
            .map(|(index, statement)| {
                let checked = self.check_statement(statement);
                if duplicates.contains(&index) {
                    Stmt::Error {
                        span: *checked.span(),
                    }
                } else {
                    checked
                }
            })
            .collect()
    }

    /// Declares every procedure of a statement list up front so calls may
    /// precede the declaration. Returns the positions of duplicates.
    fn hoist_procedures(&mut self, statements: &[Stmt]) -> HashSet<usize> {
        let mut duplicates = HashSet::new();
        for (index, statement) in statements.iter().enumerate() {
            if let Stmt::Procedure(decl) = statement {
                let kind = SymbolKind::Procedure {
                    arity: Some(decl.params.len()),
                };
                if !self.declare(&decl.name, kind, decl.name_span) {
                    duplicates.insert(index);
                }
            }
        }
        duplicates
    }

    fn check_statement(&mut self, statement: Stmt) -> Stmt {
        match statement {
            Stmt::Expression { expr, span } => {
                let before = self.errors.len();
                self.check_expr(&expr);
                if self.failed_since(before) {
                    Stmt::Error { span }
                } else {
                    Stmt::Expression { expr, span }
                }
            }
            Stmt::VarDecl {
                name,
                name_span,
                initializer,
                span,
            } => {
                let before = self.errors.len();
                if let Some(ref value) = initializer {
                    self.check_expr(value);
                }
                let initializer_failed = self.failed_since(before);

                if !self.declare(&name, SymbolKind::Variable, name_span) {
                    return Stmt::Error { span };
                }

                // A broken initializer still declares the name, bound to
                // undefined, so later statements do not cascade.
                Stmt::VarDecl {
                    name,
                    name_span,
                    initializer: if initializer_failed { None } else { initializer },
                    span,
                }
            }
            Stmt::Procedure(decl) => Stmt::Procedure(self.check_procedure(decl)),
            Stmt::Block { statements, span } => {
                self.symbols.push();
                let statements = self.check_block(statements);
                self.symbols.pop();
                Stmt::Block { statements, span }
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                span,
            } => {
                let before = self.errors.len();
                self.check_expr(&condition);
                let condition_failed = self.failed_since(before);

                let then_branch = Box::new(self.check_statement(*then_branch));
                let else_branch = else_branch.map(|branch| Box::new(self.check_statement(*branch)));

                if condition_failed {
                    Stmt::Error { span }
                } else {
                    Stmt::If {
                        condition,
                        then_branch,
                        else_branch,
                        span,
                    }
                }
            }
            Stmt::While {
                condition,
                body,
                span,
            } => {
                let before = self.errors.len();
                self.check_expr(&condition);
                let condition_failed = self.failed_since(before);

                let body = Box::new(self.check_statement(*body));

                if condition_failed {
                    Stmt::Error { span }
                } else {
                    Stmt::While {
                        condition,
                        body,
                        span,
                    }
                }
            }
            Stmt::For {
                initializer,
                condition,
                increment,
                body,
                span,
            } => {
                self.symbols.push();

                let before = self.errors.len();
                let initializer = initializer.map(|init| Box::new(self.check_statement(*init)));
                if let Some(ref condition) = condition {
                    self.check_expr(condition);
                }
                if let Some(ref increment) = increment {
                    self.check_expr(increment);
                }
                let header_failed = self.failed_since(before);

                let body = Box::new(self.check_statement(*body));
                self.symbols.pop();

                if header_failed {
                    Stmt::Error { span }
                } else {
                    Stmt::For {
                        initializer,
                        condition,
                        increment,
                        body,
                        span,
                    }
                }
            }
            Stmt::Return { value, span } => {
                let before = self.errors.len();
                if self.procedure_depth == 0 {
                    self.errors.record(
                        Diagnostic::semantic(
                            ErrorCode::ReturnOutsideProcedure,
                            span,
                            "'return' used outside of a procedure".to_string(),
                        )
                        .with_help("Only procedure bodies can return a value."),
                    );
                }
                if let Some(ref value) = value {
                    self.check_expr(value);
                }

                if self.failed_since(before) {
                    Stmt::Error { span }
                } else {
                    Stmt::Return { value, span }
                }
            }
            Stmt::Error { span } => Stmt::Error { span },
        }
    }

    fn check_procedure(&mut self, decl: ProcDecl) -> ProcDecl {
        self.symbols.push();
        for param in &decl.params {
            self.declare(&param.name, SymbolKind::Variable, param.span);
        }

        self.procedure_depth += 1;
        let body = self.check_block(decl.body);
        self.procedure_depth -= 1;
        self.symbols.pop();

        ProcDecl { body, ..decl }
    }

    /// Checks an expression and returns its statically known kind.
    fn check_expr(&mut self, expr: &Expr) -> ValueKind {
        match expr {
            Expr::Literal { value, .. } => value.kind(),
            Expr::Variable { name, span } => {
                match self.symbols.lookup(name).map(|symbol| symbol.kind) {
                    None => self.undeclared(name, span),
                    Some(SymbolKind::Procedure { .. }) => {
                        self.errors.record(
                            Diagnostic::semantic(
                                ErrorCode::TypeMismatch,
                                *span,
                                format!("Procedure '{}' cannot be used as a value", name),
                            )
                            .with_help(format!("Call it instead: {}(...)", name)),
                        );
                    }
                    Some(SymbolKind::Variable) => {}
                }
                ValueKind::Unknown
            }
            Expr::Assign {
                name,
                name_span,
                value,
                ..
            } => {
                let kind = self.check_expr(value);
                match self.symbols.lookup(name).map(|symbol| symbol.kind) {
                    Some(SymbolKind::Procedure { .. }) => {
                        self.errors.record(Diagnostic::semantic(
                            ErrorCode::TypeMismatch,
                            *name_span,
                            format!("Cannot assign to procedure '{}'", name),
                        ));
                    }
                    Some(SymbolKind::Variable) => {}
                    None => {
                        // First assignment declares the variable.
                        self.declare(name, SymbolKind::Variable, *name_span);
                    }
                }
                kind
            }
            Expr::Binary {
                left,
                operator,
                right,
                span,
            } => {
                let left_kind = self.check_expr(left);
                let right_kind = self.check_expr(right);
                self.binary_kind(*operator, left_kind, right_kind, span)
            }
            Expr::Unary {
                operator,
                operand,
                span,
            } => {
                let kind = self.check_expr(operand);
                match operator {
                    UnaryOp::Negate => {
                        if kind.is_known() && kind != ValueKind::Number {
                            self.errors.record(Diagnostic::semantic(
                                ErrorCode::TypeMismatch,
                                *span,
                                format!("Cannot negate a {}", kind.name()),
                            ));
                        }
                        ValueKind::Number
                    }
                    UnaryOp::Not => ValueKind::Bool,
                }
            }
            Expr::Logical {
                left,
                operator,
                right,
                ..
            } => {
                let left_kind = self.check_expr(left);
                let right_kind = self.check_expr(right);
                match operator {
                    LogicalOp::And | LogicalOp::Or if left_kind == right_kind => left_kind,
                    _ => ValueKind::Unknown,
                }
            }
            Expr::Call {
                callee,
                callee_span,
                args,
                span,
            } => {
                let kind = self.check_call(callee, callee_span, args.len(), span);
                for arg in args {
                    self.check_expr(arg);
                }
                kind
            }
            Expr::Index {
                target,
                index,
                span,
            } => {
                let target_kind = self.check_expr(target);
                let index_kind = self.check_expr(index);

                if target_kind.is_known()
                    && !matches!(target_kind, ValueKind::List | ValueKind::Text)
                {
                    self.errors.record(Diagnostic::semantic(
                        ErrorCode::TypeMismatch,
                        *span,
                        format!("Cannot index a {}", target_kind.name()),
                    ));
                }
                if index_kind.is_known() && index_kind != ValueKind::Number {
                    self.errors.record(Diagnostic::semantic(
                        ErrorCode::TypeMismatch,
                        *index.span(),
                        format!("Index must be a number, found {}", index_kind.name()),
                    ));
                }

                if target_kind == ValueKind::Text {
                    ValueKind::Text
                } else {
                    ValueKind::Unknown
                }
            }
            Expr::Grouping { expr, .. } => self.check_expr(expr),
            Expr::List { elements, .. } => {
                for element in elements {
                    self.check_expr(element);
                }
                ValueKind::List
            }
        }
    }

    fn check_call(&mut self, callee: &str, callee_span: &Span, arg_count: usize, span: &Span) -> ValueKind {
        let symbol = self
            .symbols
            .lookup(callee)
            .map(|symbol| (symbol.kind, symbol.scope_id));

        match symbol {
            None => {
                self.undeclared(callee, callee_span);
                ValueKind::Unknown
            }
            Some((SymbolKind::Variable, _)) => {
                self.errors.record(
                    Diagnostic::semantic(
                        ErrorCode::NotCallable,
                        *callee_span,
                        format!("'{}' is a variable, not a procedure", callee),
                    )
                    .with_help("Only procedures declared with 'proc' and builtins can be called."),
                );
                ValueKind::Unknown
            }
            Some((SymbolKind::Procedure { arity }, scope_id)) => {
                if let Some(expected) = arity {
                    if expected != arg_count {
                        self.errors.record(Diagnostic::semantic(
                            ErrorCode::ArityMismatch,
                            *span,
                            format!(
                                "Procedure '{}' expects {} argument{}, got {}",
                                callee,
                                expected,
                                if expected == 1 { "" } else { "s" },
                                arg_count
                            ),
                        ));
                    }
                }

                if scope_id != BUILTIN_SCOPE {
                    return ValueKind::Unknown;
                }
                match callee {
                    "print" => ValueKind::Undefined,
                    "len" => ValueKind::Number,
                    "type" => ValueKind::Text,
                    _ => ValueKind::Unknown,
                }
            }
        }
    }

    fn binary_kind(
        &mut self,
        operator: BinaryOp,
        left: ValueKind,
        right: ValueKind,
        span: &Span,
    ) -> ValueKind {
        use ValueKind::{Bool, Number, Text, Unknown};

        let compatible = match operator {
            BinaryOp::Add => {
                let addable = |kind: ValueKind| matches!(kind, Number | Text | Unknown);
                addable(left) && addable(right) && !(left.is_known() && right.is_known() && left != right)
            }
            op if op.is_arithmetic() => {
                matches!(left, Number | Unknown) && matches!(right, Number | Unknown)
            }
            op if op.is_ordering() => {
                let orderable = |kind: ValueKind| matches!(kind, Number | Text | Unknown);
                orderable(left) && orderable(right) && !(left.is_known() && right.is_known() && left != right)
            }
            _ => true,
        };

        if !compatible {
            self.errors.record(Diagnostic::semantic(
                ErrorCode::TypeMismatch,
                *span,
                format!(
                    "Operator '{}' cannot be applied to {} and {}",
                    operator,
                    left.name(),
                    right.name()
                ),
            ));
            return Unknown;
        }

        match operator {
            BinaryOp::Add if left == right => left,
            BinaryOp::Add => Unknown,
            op if op.is_arithmetic() => Number,
            _ => Bool,
        }
    }

    /// Declares a symbol, recording a redeclaration error on a clash.
    /// Returns whether the declaration succeeded.
    fn declare(&mut self, name: &str, kind: SymbolKind, span: Span) -> bool {
        match self.symbols.declare(name, kind, span) {
            Ok(()) => true,
            Err(existing) => {
                self.errors.record(
                    Diagnostic::semantic(
                        ErrorCode::Redeclaration,
                        span,
                        format!("'{}' is already declared in this scope", name),
                    )
                    .with_help(format!(
                        "The first declaration is at line {}, column {}.",
                        existing.span.line, existing.span.column
                    )),
                );
                false
            }
        }
    }

    fn undeclared(&mut self, name: &str, span: &Span) {
        self.errors.record(
            Diagnostic::semantic(
                ErrorCode::UndeclaredIdentifier,
                *span,
                format!("Undeclared identifier '{}'", name),
            )
            .with_help(format!(
                "Declare it first, e.g. 'var {} = 0', or assign a value to it.",
                name
            )),
        );
    }

    fn failed_since(&self, mark: usize) -> bool {
        self.errors.len() > mark
    }
}
