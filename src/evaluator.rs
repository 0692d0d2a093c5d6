use crate::ast::{BinaryOp, Expr, LogicalOp, ProcDecl, Program, Stmt, UnaryOp};
use crate::error::{Diagnostic, ErrorCode, ErrorCollector, Span};
use crate::options::RunOptions;
use crate::value::Value;
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::sync::atomic::Ordering;

#[derive(Debug, Default)]
struct Frame<'p> {
    values: HashMap<String, Value>,
    procedures: HashMap<String, &'p ProcDecl>,
}

/// Variable and procedure bindings as a stack of frames, innermost last.
#[derive(Debug)]
pub struct Environment<'p> {
    frames: Vec<Frame<'p>>,
}

impl<'p> Default for Environment<'p> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'p> Environment<'p> {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::default()],
        }
    }

    pub fn push(&mut self) {
        self.frames.push(Frame::default());
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn define(&mut self, name: &str, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.values.insert(name.to_string(), value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.values.get(name))
    }

    /// Updates the nearest binding of `name`, or creates one in the
    /// innermost frame when there is none.
    pub fn assign(&mut self, name: &str, value: Value) {
        for frame in self.frames.iter_mut().rev() {
            if let Some(slot) = frame.values.get_mut(name) {
                *slot = value;
                return;
            }
        }
        self.define(name, value);
    }

    pub fn define_procedure(&mut self, decl: &'p ProcDecl) {
        if let Some(frame) = self.frames.last_mut() {
            frame.procedures.insert(decl.name.clone(), decl);
        }
    }

    /// Finds a procedure and the index of the frame that declared it.
    pub fn find_procedure(&self, name: &str) -> Option<(usize, &'p ProcDecl)> {
        self.frames
            .iter()
            .enumerate()
            .rev()
            .find_map(|(index, frame)| frame.procedures.get(name).map(|decl| (index, *decl)))
    }

    /// Detaches every frame above the declaring frame and opens a fresh
    /// frame for the call. The detached frames come back through
    /// `leave_call`.
    fn enter_call(&mut self, declaring_frame: usize) -> Vec<Frame<'p>> {
        let detached = self.frames.split_off(declaring_frame + 1);
        self.frames.push(Frame::default());
        detached
    }

    fn leave_call(&mut self, declaring_frame: usize, detached: Vec<Frame<'p>>) {
        self.frames.truncate(declaring_frame + 1);
        self.frames.extend(detached);
    }
}

/// Reasons evaluation stops short of a normal result.
enum Interrupt {
    /// A runtime error; the enclosing statement is abandoned and execution
    /// moves on.
    Fault(Diagnostic),
    /// `return` unwinding to the active call.
    Return(Value),
    /// The whole run stops.
    Halt(Diagnostic),
}

type Flow<T> = Result<T, Interrupt>;

fn fault(code: ErrorCode, span: &Span, message: String) -> Interrupt {
    Interrupt::Fault(Diagnostic::runtime(code, *span, message))
}

fn halt(code: ErrorCode, span: &Span, message: String) -> Interrupt {
    Interrupt::Halt(Diagnostic::runtime(code, *span, message))
}

pub struct Evaluator<'p, 'a> {
    environment: Environment<'p>,
    errors: &'a mut ErrorCollector,
    console: &'a mut Vec<String>,
    options: &'a RunOptions,
    consecutive_faults: usize,
    steps: u64,
    call_depth: usize,
}

impl<'p, 'a> Evaluator<'p, 'a> {
    pub fn new(
        errors: &'a mut ErrorCollector,
        console: &'a mut Vec<String>,
        options: &'a RunOptions,
    ) -> Self {
        Self {
            environment: Environment::new(),
            errors,
            console,
            options,
            consecutive_faults: 0,
            steps: 0,
            call_depth: 0,
        }
    }

    /// Runs a checked program. Runtime errors land in the collector;
    /// console output is appended line by line.
    pub fn execute(&mut self, program: &'p Program) {
        for statement in &program.statements {
            match self.execute_statement(statement) {
                Ok(()) => {}
                Err(Interrupt::Halt(diagnostic)) => {
                    warn!("execution halted: {}", diagnostic);
                    self.errors.record(diagnostic);
                    return;
                }
                Err(Interrupt::Return(_)) => return,
                Err(Interrupt::Fault(diagnostic)) => self.errors.record(diagnostic),
            }
        }
        debug!("execution finished after {} steps", self.steps);
    }

    fn execute_statement(&mut self, stmt: &'p Stmt) -> Flow<()> {
        self.tick(stmt.span())?;

        match self.run_statement(stmt) {
            Ok(()) => {
                if matches!(stmt, Stmt::Expression { .. } | Stmt::VarDecl { .. }) {
                    self.consecutive_faults = 0;
                }
                Ok(())
            }
            Err(Interrupt::Fault(diagnostic)) => self.record_fault(diagnostic),
            Err(other) => Err(other),
        }
    }

    fn record_fault(&mut self, diagnostic: Diagnostic) -> Flow<()> {
        trace!("runtime fault: {}", diagnostic);
        let span = diagnostic.span;
        self.errors.record(diagnostic);
        self.consecutive_faults += 1;

        match self.options.fault_ceiling {
            Some(ceiling) if self.consecutive_faults >= ceiling => Err(halt(
                ErrorCode::FaultCeiling,
                &span,
                format!(
                    "Execution stopped after {} consecutive runtime errors",
                    self.consecutive_faults
                ),
            )),
            _ => Ok(()),
        }
    }

    /// Per-statement bookkeeping: cancellation and the step budget.
    fn tick(&mut self, span: &Span) -> Flow<()> {
        if let Some(ref cancel) = self.options.cancel {
            if cancel.load(Ordering::Relaxed) {
                return Err(halt(
                    ErrorCode::Cancelled,
                    span,
                    "Execution was cancelled".to_string(),
                ));
            }
        }

        self.steps += 1;
        if let Some(max_steps) = self.options.max_steps {
            if self.steps > max_steps {
                return Err(halt(
                    ErrorCode::StepLimit,
                    span,
                    format!("Execution exceeded the limit of {} steps", max_steps),
                ));
            }
        }
        Ok(())
    }

    fn run_statement(&mut self, stmt: &'p Stmt) -> Flow<()> {
        match stmt {
            Stmt::Expression { expr, .. } => {
                self.evaluate_expression(expr)?;
                Ok(())
            }
            Stmt::VarDecl {
                name, initializer, ..
            } => {
                let value = match initializer {
                    Some(expr) => self.evaluate_expression(expr)?,
                    None => Value::Undefined,
                };
                self.environment.define(name, value);
                Ok(())
            }
            Stmt::Procedure(decl) => {
                self.environment.define_procedure(decl);
                Ok(())
            }
            Stmt::Block { statements, .. } => {
                self.environment.push();
                let result = self.execute_statements(statements);
                self.environment.pop();
                result
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                if self.evaluate_expression(condition)?.is_truthy() {
                    self.execute_statement(then_branch)
                } else if let Some(else_stmt) = else_branch {
                    self.execute_statement(else_stmt)
                } else {
                    Ok(())
                }
            }
            Stmt::While { condition, body, .. } => {
                while self.evaluate_expression(condition)?.is_truthy() {
                    self.execute_statement(body)?;
                }
                Ok(())
            }
            Stmt::For {
                initializer,
                condition,
                increment,
                body,
                ..
            } => {
                self.environment.push();
                let result = self.run_for(initializer.as_deref(), condition.as_ref(), increment.as_ref(), body);
                self.environment.pop();
                result
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.evaluate_expression(expr)?,
                    None => Value::Undefined,
                };
                Err(Interrupt::Return(value))
            }
            Stmt::Error { .. } => Ok(()),
        }
    }

    fn run_for(
        &mut self,
        initializer: Option<&'p Stmt>,
        condition: Option<&'p Expr>,
        increment: Option<&'p Expr>,
        body: &'p Stmt,
    ) -> Flow<()> {
        if let Some(init) = initializer {
            self.execute_statement(init)?;
        }

        loop {
            if let Some(cond) = condition {
                if !self.evaluate_expression(cond)?.is_truthy() {
                    break;
                }
            }

            self.execute_statement(body)?;

            if let Some(inc) = increment {
                self.evaluate_expression(inc)?;
            }
        }
        Ok(())
    }

    fn execute_statements(&mut self, statements: &'p [Stmt]) -> Flow<()> {
        for statement in statements {
            self.execute_statement(statement)?;
        }
        Ok(())
    }

    fn evaluate_expression(&mut self, expr: &'p Expr) -> Flow<Value> {
        match expr {
            Expr::Literal { value, .. } => Ok(value.clone()),
            Expr::Variable { name, span } => match self.environment.get(name) {
                Some(value) => Ok(value.clone()),
                None => Err(fault(
                    ErrorCode::UndeclaredIdentifier,
                    span,
                    format!("Variable '{}' has no value", name),
                )),
            },
            Expr::Assign { name, value, .. } => {
                let value = self.evaluate_expression(value)?;
                self.environment.assign(name, value.clone());
                Ok(value)
            }
            Expr::Binary {
                left,
                operator,
                right,
                span,
            } => {
                let left_val = self.evaluate_expression(left)?;
                let right_val = self.evaluate_expression(right)?;
                evaluate_binary_op(*operator, left_val, right_val, span)
            }
            Expr::Unary {
                operator,
                operand,
                span,
            } => {
                let operand_val = self.evaluate_expression(operand)?;
                match (operator, operand_val) {
                    (UnaryOp::Negate, Value::Number(n)) => Ok(Value::Number(-n)),
                    (UnaryOp::Negate, other) => Err(fault(
                        ErrorCode::TypeMismatch,
                        span,
                        format!("Cannot negate a {}", other.type_name()),
                    )),
                    (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
                }
            }
            Expr::Logical {
                left,
                operator,
                right,
                ..
            } => {
                let left_val = self.evaluate_expression(left)?;

                match operator {
                    LogicalOp::Or => {
                        if left_val.is_truthy() {
                            Ok(left_val)
                        } else {
                            self.evaluate_expression(right)
                        }
                    }
                    LogicalOp::And => {
                        if !left_val.is_truthy() {
                            Ok(left_val)
                        } else {
                            self.evaluate_expression(right)
                        }
                    }
                }
            }
            Expr::Call {
                callee, args, span, ..
            } => self.evaluate_call(callee, args, span),
            Expr::Index {
                target,
                index,
                span,
            } => {
                let target_val = self.evaluate_expression(target)?;
                let index_val = self.evaluate_expression(index)?;
                evaluate_index(target_val, index_val, span)
            }
            Expr::Grouping { expr, .. } => self.evaluate_expression(expr),
            Expr::List { elements, .. } => {
                let mut list_values = Vec::with_capacity(elements.len());
                for element in elements {
                    list_values.push(self.evaluate_expression(element)?);
                }
                Ok(Value::List(list_values))
            }
        }
    }

    fn evaluate_call(&mut self, callee: &str, args: &'p [Expr], span: &Span) -> Flow<Value> {
        let procedure = self.environment.find_procedure(callee);
        if procedure.is_none() && !is_builtin(callee) {
            return Err(fault(
                ErrorCode::UndefinedProcedure,
                span,
                format!("Procedure '{}' is not defined at this point", callee),
            ));
        }

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.evaluate_expression(arg)?);
        }

        match procedure {
            Some((declaring_frame, decl)) => self.call_procedure(declaring_frame, decl, values, span),
            None => self.call_builtin(callee, values, span),
        }
    }

    fn call_procedure(
        &mut self,
        declaring_frame: usize,
        decl: &'p ProcDecl,
        args: Vec<Value>,
        span: &Span,
    ) -> Flow<Value> {
        if args.len() != decl.params.len() {
            return Err(fault(
                ErrorCode::ArityMismatch,
                span,
                format!(
                    "Procedure '{}' expects {} arguments, got {}",
                    decl.name,
                    decl.params.len(),
                    args.len()
                ),
            ));
        }
        if self.call_depth >= self.options.max_call_depth {
            return Err(halt(
                ErrorCode::RecursionLimit,
                span,
                format!(
                    "Procedure calls nested deeper than {} levels",
                    self.options.max_call_depth
                ),
            ));
        }

        let detached = self.environment.enter_call(declaring_frame);
        for (param, value) in decl.params.iter().zip(args) {
            self.environment.define(&param.name, value);
        }

        self.call_depth += 1;
        let result = self.execute_statements(&decl.body);
        self.call_depth -= 1;
        self.environment.leave_call(declaring_frame, detached);

        match result {
            Ok(()) => Ok(Value::Undefined),
            Err(Interrupt::Return(value)) => Ok(value),
            Err(other) => Err(other),
        }
    }

    fn call_builtin(&mut self, name: &str, args: Vec<Value>, span: &Span) -> Flow<Value> {
        match name {
            "print" => {
                let line = args
                    .iter()
                    .map(|value| value.to_string())
                    .collect::<Vec<_>>()
                    .join(" ");
                self.console.push(line);
                Ok(Value::Undefined)
            }
            "len" => match single_argument(name, args, span)? {
                Value::Text(s) => Ok(Value::Number(s.chars().count() as f64)),
                Value::List(l) => Ok(Value::Number(l.len() as f64)),
                other => Err(fault(
                    ErrorCode::TypeMismatch,
                    span,
                    format!("len() is not supported for a {}", other.type_name()),
                )),
            },
            "type" => {
                let value = single_argument(name, args, span)?;
                Ok(Value::Text(value.type_name().to_string()))
            }
            _ => Err(fault(
                ErrorCode::UndefinedProcedure,
                span,
                format!("Procedure '{}' is not defined at this point", name),
            )),
        }
    }
}

fn is_builtin(name: &str) -> bool {
    crate::checker::BUILTINS
        .iter()
        .any(|(builtin, _)| *builtin == name)
}

fn single_argument(name: &str, args: Vec<Value>, span: &Span) -> Flow<Value> {
    let count = args.len();
    let mut args = args.into_iter();
    match (args.next(), count) {
        (Some(value), 1) => Ok(value),
        _ => Err(fault(
            ErrorCode::ArityMismatch,
            span,
            format!("{}() takes exactly 1 argument, got {}", name, count),
        )),
    }
}

fn evaluate_binary_op(operator: BinaryOp, left: Value, right: Value, span: &Span) -> Flow<Value> {
    match operator {
        BinaryOp::Add => match (left, right) {
            (Value::Number(l), Value::Number(r)) => Ok(Value::Number(l + r)),
            (Value::Text(l), Value::Text(r)) => Ok(Value::Text(l + &r)),
            (l, r) => Err(mismatch(operator, &l, &r, span)),
        },
        BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => {
            let (l, r) = match (left, right) {
                (Value::Number(l), Value::Number(r)) => (l, r),
                (l, r) => return Err(mismatch(operator, &l, &r, span)),
            };
            match operator {
                BinaryOp::Subtract => Ok(Value::Number(l - r)),
                BinaryOp::Multiply => Ok(Value::Number(l * r)),
                _ if r == 0.0 => Err(fault(
                    ErrorCode::DivByZero,
                    span,
                    if operator == BinaryOp::Divide {
                        "Division by zero".to_string()
                    } else {
                        "Remainder by zero".to_string()
                    },
                )),
                BinaryOp::Divide => Ok(Value::Number(l / r)),
                _ => Ok(Value::Number(l % r)),
            }
        }
        BinaryOp::Equal => Ok(Value::Bool(left.equals(&right))),
        BinaryOp::NotEqual => Ok(Value::Bool(!left.equals(&right))),
        BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
            let ordering = match (&left, &right) {
                (Value::Number(l), Value::Number(r)) => l.partial_cmp(r),
                (Value::Text(l), Value::Text(r)) => Some(l.cmp(r)),
                _ => return Err(mismatch(operator, &left, &right, span)),
            };
            let result = match ordering {
                Some(ordering) => match operator {
                    BinaryOp::Less => ordering.is_lt(),
                    BinaryOp::LessEqual => ordering.is_le(),
                    BinaryOp::Greater => ordering.is_gt(),
                    _ => ordering.is_ge(),
                },
                None => false,
            };
            Ok(Value::Bool(result))
        }
    }
}

fn mismatch(operator: BinaryOp, left: &Value, right: &Value, span: &Span) -> Interrupt {
    fault(
        ErrorCode::TypeMismatch,
        span,
        format!(
            "Operator '{}' cannot be applied to {} and {}",
            operator,
            left.type_name(),
            right.type_name()
        ),
    )
}

fn evaluate_index(target: Value, index: Value, span: &Span) -> Flow<Value> {
    let position = match index {
        Value::Number(n) if n >= 0.0 && n.fract() == 0.0 => n as usize,
        Value::Number(n) => {
            return Err(fault(
                ErrorCode::IndexOutOfRange,
                span,
                format!("Index {} is not a valid position", Value::Number(n)),
            ))
        }
        other => {
            return Err(fault(
                ErrorCode::TypeMismatch,
                span,
                format!("Index must be a number, found {}", other.type_name()),
            ))
        }
    };

    let out_of_range = |length: usize| {
        fault(
            ErrorCode::IndexOutOfRange,
            span,
            format!("Index {} is out of range for length {}", position, length),
        )
    };

    match target {
        Value::List(items) => {
            let length = items.len();
            items.into_iter().nth(position).ok_or_else(|| out_of_range(length))
        }
        Value::Text(text) => text
            .chars()
            .nth(position)
            .map(|c| Value::Text(c.to_string()))
            .ok_or_else(|| out_of_range(text.chars().count())),
        other => Err(fault(
            ErrorCode::TypeMismatch,
            span,
            format!("Cannot index a {}", other.type_name()),
        )),
    }
}
