//! Tree-walking evaluator.
//!
//! Suspension happens wherever the evaluator reaches a native tool call:
//! that call is a real Rust `async fn`, so awaiting it suspends the
//! whole recursive evaluation chain back to the host executor exactly
//! like any other `.await` point — the "explicit state machine" the
//! design calls for is the one `rustc` already compiles for an `async
//! fn`; hand-rolling a second one on top would only duplicate it. The
//! one place this collapses the original coroutine-object model is
//! `gather`/`create_task`: those names are recognised syntactically
//! (see `rewrite::PASSTHROUGH_CALLS`) and their direct call arguments
//! are evaluated as deferred `PendingCall`s instead of being awaited on
//! the spot, which is what makes them concurrent.

pub mod scheduler;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{BinOp, Block, Expr, FnDef, LValue, Stmt, UnaryOp};
use crate::capture::OutputCapture;
use crate::value::{NativeFn, TaskState, ToolError, Value};

pub type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + 'a>>;

/// Escapes a statement boundary: either an explicit `return` (caught by
/// the nearest enclosing function call) or an uncaught tool error
/// (propagates all the way to the top-level block, halting the turn).
#[derive(Debug)]
pub enum Flow {
    Return(Value),
    Error(ToolError),
}

pub type StmtResult = Result<(), Flow>;
pub type ExprResult = Result<Value, ToolError>;

/// One turn's evaluator: a scope stack, the output buffer script `say`
/// calls write into, and the owning agent's id (used in trace events).
pub struct Interp {
    scopes: Vec<HashMap<String, Value>>,
    output: Rc<RefCell<OutputCapture>>,
    pub agent_id: String,
}

impl Interp {
    pub fn new(agent_id: impl Into<String>) -> Self {
        let output = Rc::new(RefCell::new(OutputCapture::new()));
        let mut interp = Self {
            scopes: vec![HashMap::new()],
            output,
            agent_id: agent_id.into(),
        };
        interp.set_global("print", Value::Native(Rc::new(PrintFn(interp.output.clone()))));
        interp.set_global("raise", Value::Native(Rc::new(RaiseFn)));
        interp
    }

    /// Shared handle onto this turn's output buffer — handed to the
    /// `print`/`say`/`done`/`list_tools` natives so they can write into
    /// it from outside the evaluator itself.
    pub fn output_handle(&self) -> Rc<RefCell<OutputCapture>> {
        self.output.clone()
    }

    /// Consumes the interpreter and returns the finished (head/tail
    /// truncated) capture. Drops the scope stack first so any native
    /// closure holding a clone of the handle is released before the
    /// unwrap.
    pub fn finish_output(self) -> String {
        let Interp { scopes, output, .. } = self;
        drop(scopes);
        Rc::try_unwrap(output).map(|cell| cell.into_inner().finish()).unwrap_or_default()
    }

    /// Bind a name in the global scope — used by the registry to inject
    /// tool proxies, the `T` namespace object, and other always-present
    /// bindings before a block runs.
    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        self.scopes[0].insert(name.into(), value);
    }

    pub fn get_global(&self, name: &str) -> Option<&Value> {
        self.scopes[0].get(name)
    }

    /// Names currently bound in the namespace, innermost scope last —
    /// used by `arc-snapshot` to decide what's live.
    pub fn namespace_snapshot_view(&self) -> HashMap<String, Value> {
        let mut merged = HashMap::new();
        for scope in &self.scopes {
            for (k, v) in scope {
                merged.insert(k.clone(), v.clone());
            }
        }
        merged
    }

    pub fn union_namespace(&mut self, entries: HashMap<String, Value>) {
        for (name, value) in entries {
            self.scopes[0].insert(name, value);
        }
    }

    fn get_var(&self, name: &str) -> Option<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(value) = scope.get(name) {
                return Some(value.clone());
            }
        }
        None
    }

    fn define(&mut self, name: String, value: Value) {
        self.scopes.last_mut().expect("scope stack is never empty").insert(name, value);
    }

    fn assign_existing(&mut self, name: &str, value: Value) -> bool {
        for scope in self.scopes.iter_mut().rev() {
            if scope.contains_key(name) {
                scope.insert(name.to_string(), value);
                return true;
            }
        }
        false
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Execute a top-level, already auto-await-rewritten block as one
    /// exec turn. Applies the display-hook per statement and stops at
    /// the first uncaught error, per the interactive-compiler contract.
    pub async fn exec_block(&mut self, block: &Block) -> Result<(), ToolError> {
        for stmt in block {
            match self.eval_stmt_interactive(stmt).await {
                Ok(()) => {}
                Err(Flow::Error(e)) => return Err(e),
                Err(Flow::Return(_)) => {
                    // `return` outside a function body simply ends the block early.
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    async fn eval_stmt_interactive(&mut self, stmt: &Stmt) -> StmtResult {
        if let Stmt::ExprStmt(expr) = stmt {
            let value = self.eval_expr(expr).await.map_err(Flow::Error)?;
            self.display(&value);
            return Ok(());
        }
        self.eval_stmt(stmt).await
    }

    fn display(&mut self, value: &Value) {
        if matches!(value, Value::Null | Value::Done) {
            return;
        }
        self.output.borrow_mut().writeln(&value.repr());
        self.define("_".to_string(), value.clone());
    }

    fn eval_block<'a>(&'a mut self, block: &'a Block) -> BoxFuture<'a, StmtResult> {
        Box::pin(async move {
            for stmt in block {
                self.eval_stmt(stmt).await?;
            }
            Ok(())
        })
    }

    fn eval_stmt<'a>(&'a mut self, stmt: &'a Stmt) -> BoxFuture<'a, StmtResult> {
        Box::pin(async move {
            match stmt {
                Stmt::Let(name, expr) => {
                    let value = self.eval_expr(expr).await.map_err(Flow::Error)?;
                    self.define(name.clone(), value);
                    Ok(())
                }
                Stmt::Assign(lvalue, expr) => {
                    let value = self.eval_expr(expr).await.map_err(Flow::Error)?;
                    self.assign(lvalue, value).await.map_err(Flow::Error)
                }
                Stmt::ExprStmt(expr) => {
                    self.eval_expr(expr).await.map_err(Flow::Error)?;
                    Ok(())
                }
                Stmt::If(cond, then_block, else_block) => {
                    if self.eval_expr(cond).await.map_err(Flow::Error)?.is_truthy() {
                        self.eval_block(then_block).await
                    } else if let Some(else_block) = else_block {
                        self.eval_block(else_block).await
                    } else {
                        Ok(())
                    }
                }
                Stmt::While(cond, body) => {
                    while self.eval_expr(cond).await.map_err(Flow::Error)?.is_truthy() {
                        self.eval_block(body).await?;
                    }
                    Ok(())
                }
                Stmt::For(var, iter_expr, body) => {
                    let iterable = self.eval_expr(iter_expr).await.map_err(Flow::Error)?;
                    let items = materialize_iterable(iterable).map_err(Flow::Error)?;
                    for item in items {
                        self.push_scope();
                        self.define(var.clone(), item);
                        let result = self.eval_block(body).await;
                        self.pop_scope();
                        result?;
                    }
                    Ok(())
                }
                Stmt::Return(expr) => {
                    let value = match expr {
                        Some(expr) => self.eval_expr(expr).await.map_err(Flow::Error)?,
                        None => Value::Null,
                    };
                    Err(Flow::Return(value))
                }
                Stmt::FnDef(def) => {
                    self.define(def.name.clone(), Value::Function(Rc::new(def.clone())));
                    Ok(())
                }
            }
        })
    }

    async fn assign(&mut self, lvalue: &LValue, value: Value) -> ExprResult {
        match lvalue {
            LValue::Ident(name) => {
                if !self.assign_existing(name, value.clone()) {
                    self.define(name.clone(), value.clone());
                }
                Ok(value)
            }
            LValue::Attr(base, name) => {
                let base_value = self.eval_expr(base).await?;
                match base_value {
                    Value::Map(entries) => {
                        let mut entries = entries.borrow_mut();
                        if let Some(slot) = entries.iter_mut().find(|(k, _)| k == name) {
                            slot.1 = value.clone();
                        } else {
                            entries.push((name.clone(), value.clone()));
                        }
                        Ok(value)
                    }
                    other => Err(ToolError {
                        message: format!("cannot set attribute '{name}' on a {}", other.type_name()),
                    }),
                }
            }
            LValue::Index(base, index) => {
                let base_value = self.eval_expr(base).await?;
                let index_value = self.eval_expr(index).await?;
                match (base_value, index_value) {
                    (Value::List(items), Value::Int(i)) => {
                        let mut items = items.borrow_mut();
                        let i = normalize_index(i, items.len())?;
                        items[i] = value.clone();
                        Ok(value)
                    }
                    (Value::Map(entries), Value::Str(key)) => {
                        let mut entries = entries.borrow_mut();
                        if let Some(slot) = entries.iter_mut().find(|(k, _)| *k == key) {
                            slot.1 = value.clone();
                        } else {
                            entries.push((key, value.clone()));
                        }
                        Ok(value)
                    }
                    (base, index) => Err(ToolError {
                        message: format!("cannot index a {} with a {}", base.type_name(), index.type_name()),
                    }),
                }
            }
        }
    }

    fn eval_expr<'a>(&'a mut self, expr: &'a Expr) -> BoxFuture<'a, ExprResult> {
        Box::pin(async move {
            match expr {
                Expr::Null => Ok(Value::Null),
                Expr::Bool(b) => Ok(Value::Bool(*b)),
                Expr::Int(i) => Ok(Value::Int(*i)),
                Expr::Float(f) => Ok(Value::Float(*f)),
                Expr::Str(s) => Ok(Value::str(s.clone())),
                Expr::Ident(name) => self.get_var(name).ok_or_else(|| ToolError {
                    message: format!("undefined variable '{name}'"),
                }),
                Expr::List(items) => {
                    let mut values = Vec::with_capacity(items.len());
                    for item in items {
                        values.push(self.eval_expr(item).await?);
                    }
                    Ok(Value::list(values))
                }
                Expr::Map(entries) => {
                    let mut values = Vec::with_capacity(entries.len());
                    for (key, value_expr) in entries {
                        values.push((key.clone(), self.eval_expr(value_expr).await?));
                    }
                    Ok(Value::map(values))
                }
                Expr::Unary(op, inner) => {
                    let value = self.eval_expr(inner).await?;
                    apply_unary(op, value)
                }
                Expr::Binary(lhs, BinOp::And, rhs) => {
                    let left = self.eval_expr(lhs).await?;
                    if !left.is_truthy() {
                        Ok(left)
                    } else {
                        self.eval_expr(rhs).await
                    }
                }
                Expr::Binary(lhs, BinOp::Or, rhs) => {
                    let left = self.eval_expr(lhs).await?;
                    if left.is_truthy() {
                        Ok(left)
                    } else {
                        self.eval_expr(rhs).await
                    }
                }
                Expr::Binary(lhs, op, rhs) => {
                    let left = self.eval_expr(lhs).await?;
                    let right = self.eval_expr(rhs).await?;
                    apply_binary(op, left, right)
                }
                Expr::Attr(base, name) => {
                    let base_value = self.eval_expr(base).await?;
                    match base_value {
                        Value::Map(entries) => Ok(entries
                            .borrow()
                            .iter()
                            .find(|(k, _)| k == name)
                            .map(|(_, v)| v.clone())
                            .unwrap_or(Value::Null)),
                        other => Err(ToolError {
                            message: format!("'{}' has no attribute '{name}'", other.type_name()),
                        }),
                    }
                }
                Expr::Index(base, index) => {
                    let base_value = self.eval_expr(base).await?;
                    let index_value = self.eval_expr(index).await?;
                    match (base_value, index_value) {
                        (Value::List(items), Value::Int(i)) => {
                            let items = items.borrow();
                            let i = normalize_index(i, items.len())?;
                            Ok(items[i].clone())
                        }
                        (Value::Map(entries), Value::Str(key)) => Ok(entries
                            .borrow()
                            .iter()
                            .find(|(k, _)| *k == key)
                            .map(|(_, v)| v.clone())
                            .unwrap_or(Value::Null)),
                        (Value::Str(s), Value::Int(i)) => {
                            let chars: Vec<char> = s.chars().collect();
                            let i = normalize_index(i, chars.len())?;
                            Ok(Value::str(chars[i].to_string()))
                        }
                        (base, index) => Err(ToolError {
                            message: format!("cannot index a {} with a {}", base.type_name(), index.type_name()),
                        }),
                    }
                }
                Expr::Await(inner) => self.eval_await(inner).await,
                Expr::Call { callee, args, kwargs } => self.eval_call(callee, args, kwargs).await,
            }
        })
    }

    async fn eval_await(&mut self, inner: &Expr) -> ExprResult {
        let value = self.eval_expr(inner).await?;
        match value {
            Value::Task(state) => resolve_task(state).await,
            other => Ok(other),
        }
    }

    async fn eval_call(&mut self, callee: &Expr, args: &[Expr], kwargs: &[(String, Expr)]) -> ExprResult {
        // `asyncio.gather`/`asyncio.create_task`, never bare `gather`/
        // `create_task` — a tool happens to be named `create_task` too
        // (it makes a `Task`), and the two must not collide.
        if crate::ast::is_asyncio_call(callee, "gather") {
            return self.eval_gather(args, kwargs).await;
        }
        if crate::ast::is_asyncio_call(callee, "create_task") {
            return self.eval_create_task(args).await;
        }

        // Method call on a handle: `shell.run(args)` dispatches through
        // `HandleObj::call_method` rather than treating `shell.run` as a
        // plain attribute lookup. A `Map`-backed namespace object (e.g.
        // the tool catalogue `T`) falls through to the generic path
        // below, where the attribute's bound value is called directly.
        let callee_value = if let Expr::Attr(base, method) = callee {
            let base_value = self.eval_expr(base).await?;
            match base_value {
                Value::Handle(handle) => {
                    let (arg_values, kwarg_values) = self.eval_args(args, kwargs).await?;
                    return handle.call_method(method, arg_values, kwarg_values).await;
                }
                Value::Map(entries) => entries
                    .borrow()
                    .iter()
                    .find(|(k, _)| k == method)
                    .map(|(_, v)| v.clone())
                    .unwrap_or(Value::Null),
                other => {
                    return Err(ToolError {
                        message: format!("'{}' has no attribute '{method}'", other.type_name()),
                    })
                }
            }
        } else {
            self.eval_expr(callee).await?
        };

        let (arg_values, kwarg_values) = self.eval_args(args, kwargs).await?;
        match callee_value {
            Value::Native(native) => native.call(arg_values, kwarg_values).await,
            Value::Function(def) => self.call_function(def, arg_values, kwarg_values).await,
            other => Err(ToolError {
                message: format!("a {} is not callable", other.type_name()),
            }),
        }
    }

    async fn eval_args(&mut self, args: &[Expr], kwargs: &[(String, Expr)]) -> Result<(Vec<Value>, Vec<(String, Value)>), ToolError> {
        let mut arg_values = Vec::with_capacity(args.len());
        for arg in args {
            arg_values.push(self.eval_expr(arg).await?);
        }
        let mut kwarg_values = Vec::with_capacity(kwargs.len());
        for (name, expr) in kwargs {
            kwarg_values.push((name.clone(), self.eval_expr(expr).await?));
        }
        Ok((arg_values, kwarg_values))
    }

    async fn call_function(&mut self, def: Rc<FnDef>, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> ExprResult {
        self.push_scope();
        for (param, value) in def.params.iter().zip(args.into_iter()) {
            self.define(param.clone(), value);
        }
        for (name, value) in kwargs {
            self.define(name, value);
        }
        let result = self.eval_block(&def.body).await;
        self.pop_scope();
        match result {
            Ok(()) => Ok(Value::Null),
            Err(Flow::Return(value)) => Ok(value),
            Err(Flow::Error(e)) => Err(e),
        }
    }

    /// Prepare the direct call arguments of a `gather`/`create_task` as
    /// deferred native calls, falling back to eager evaluation for
    /// arguments that aren't themselves calls to a native tool proxy
    /// (they gain nothing from deferral).
    async fn prepare_pending(&mut self, expr: &Expr) -> Result<PreparedArg, ToolError> {
        if let Expr::Call { callee, args, kwargs } = expr {
            let callee_is_plain_ident = matches!(callee.as_ref(), Expr::Ident(_));
            if callee_is_plain_ident {
                let callee_value = self.eval_expr(callee).await?;
                if let Value::Native(native) = callee_value {
                    let (arg_values, kwarg_values) = self.eval_args(args, kwargs).await?;
                    return Ok(PreparedArg::Pending(scheduler::PendingCall {
                        native,
                        args: arg_values,
                        kwargs: kwarg_values,
                    }));
                }
            }
        }
        Ok(PreparedArg::Ready(self.eval_expr(expr).await?))
    }

    /// Evaluates each direct argument — deferring native-tool calls so
    /// they run concurrently, evaluating anything else (already-bound
    /// tasks, plain values) eagerly in place — then awaits the batch.
    async fn eval_gather(&mut self, args: &[Expr], kwargs: &[(String, Expr)]) -> ExprResult {
        let return_exceptions = match kwargs.iter().find(|(name, _)| name == "return_exceptions") {
            Some((_, expr)) => self.eval_expr(expr).await?.is_truthy(),
            None => false,
        };

        let mut slots: Vec<Option<Value>> = Vec::with_capacity(args.len());
        let mut pending: Vec<(usize, scheduler::PendingCall)> = Vec::new();
        for (index, arg) in args.iter().enumerate() {
            match self.prepare_pending(arg).await? {
                PreparedArg::Ready(value) => slots.push(Some(value)),
                PreparedArg::Pending(call) => {
                    slots.push(None);
                    pending.push((index, call));
                }
            }
        }

        let (indices, calls): (Vec<usize>, Vec<scheduler::PendingCall>) = pending.into_iter().unzip();
        let outcomes = scheduler::run_concurrently(calls).await;
        for (index, outcome) in indices.into_iter().zip(outcomes) {
            match outcome {
                Ok(value) => slots[index] = Some(value),
                Err(e) if return_exceptions => slots[index] = Some(Value::Error(Rc::new(e))),
                Err(e) => return Err(e),
            }
        }

        Ok(Value::list(slots.into_iter().map(|slot| slot.expect("every gather slot filled")).collect()))
    }

    async fn eval_create_task(&mut self, args: &[Expr]) -> ExprResult {
        let expr = args.first().ok_or_else(|| ToolError {
            message: "create_task expects exactly one argument".into(),
        })?;
        match self.prepare_pending(expr).await? {
            PreparedArg::Pending(call) => {
                let handle = tokio::task::spawn_local(async move { call.native.call(call.args, call.kwargs).await });
                Ok(Value::Task(Rc::new(RefCell::new(TaskState::Pending(handle)))))
            }
            PreparedArg::Ready(value) => Ok(Value::Task(Rc::new(RefCell::new(TaskState::Done(Ok(value)))))),
        }
    }
}

enum PreparedArg {
    Ready(Value),
    Pending(scheduler::PendingCall),
}

/// Writes its arguments into the turn's captured output, space-joined,
/// the way Python's builtin `print` writes to redirected stdout.
#[derive(Debug)]
struct PrintFn(Rc<RefCell<OutputCapture>>);

#[async_trait::async_trait(?Send)]
impl NativeFn for PrintFn {
    fn name(&self) -> &str {
        "print"
    }

    async fn call(&self, args: Vec<Value>, _kwargs: Vec<(String, Value)>) -> ExprResult {
        let line = args
            .iter()
            .map(|v| match v {
                Value::Str(s) => s.clone(),
                other => other.repr(),
            })
            .collect::<Vec<_>>()
            .join(" ");
        self.0.borrow_mut().writeln(&line);
        Ok(Value::Null)
    }
}

/// Raises a tool-style error from script code — there is no exception
/// class hierarchy in this language, so a message is all `raise` takes.
#[derive(Debug)]
struct RaiseFn;

#[async_trait::async_trait(?Send)]
impl NativeFn for RaiseFn {
    fn name(&self) -> &str {
        "raise"
    }

    async fn call(&self, args: Vec<Value>, _kwargs: Vec<(String, Value)>) -> ExprResult {
        let message = match args.into_iter().next() {
            Some(Value::Str(s)) => s,
            Some(other) => other.repr(),
            None => "error".to_string(),
        };
        Err(ToolError { message })
    }
}

async fn resolve_task(state: Rc<RefCell<TaskState>>) -> ExprResult {
    let pending = {
        let mut slot = state.borrow_mut();
        match &mut *slot {
            TaskState::Done(result) => return result.clone(),
            TaskState::Pending(_) => std::mem::replace(&mut *slot, TaskState::Done(Err(ToolError {
                message: "task polled twice".into(),
            }))),
        }
    };
    let result = match pending {
        TaskState::Pending(handle) => handle.await.unwrap_or_else(|e| Err(ToolError { message: e.to_string() })),
        TaskState::Done(result) => result,
    };
    *state.borrow_mut() = TaskState::Done(result.clone());
    result
}

fn materialize_iterable(value: Value) -> Result<Vec<Value>, ToolError> {
    match value {
        Value::List(items) => Ok(items.borrow().clone()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::str(c.to_string())).collect()),
        other => Err(ToolError {
            message: format!("cannot iterate over a {}", other.type_name()),
        }),
    }
}

fn normalize_index(i: i64, len: usize) -> Result<usize, ToolError> {
    let idx = if i < 0 { len as i64 + i } else { i };
    if idx < 0 || idx as usize >= len {
        Err(ToolError {
            message: format!("index {i} out of bounds for length {len}"),
        })
    } else {
        Ok(idx as usize)
    }
}

fn apply_unary(op: &UnaryOp, value: Value) -> ExprResult {
    match (op, &value) {
        (UnaryOp::Neg, Value::Int(i)) => Ok(Value::Int(-i)),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Not, _) => Ok(Value::Bool(!value.is_truthy())),
        (UnaryOp::Neg, other) => Err(ToolError {
            message: format!("cannot negate a {}", other.type_name()),
        }),
    }
}

fn apply_binary(op: &BinOp, left: Value, right: Value) -> ExprResult {
    use BinOp::*;
    match op {
        Eq => Ok(Value::Bool(left == right)),
        NotEq => Ok(Value::Bool(left != right)),
        Add => match (&left, &right) {
            (Value::Str(a), Value::Str(b)) => Ok(Value::str(format!("{a}{b}"))),
            _ => numeric_binop(op, left, right),
        },
        And | Or => unreachable!("short-circuited before reaching apply_binary"),
        _ => numeric_binop(op, left, right),
    }
}

fn numeric_binop(op: &BinOp, left: Value, right: Value) -> ExprResult {
    use BinOp::*;
    let (a, b, is_float) = match (&left, &right) {
        (Value::Int(a), Value::Int(b)) => (*a as f64, *b as f64, false),
        (Value::Float(a), Value::Int(b)) => (*a, *b as f64, true),
        (Value::Int(a), Value::Float(b)) => (*a as f64, *b, true),
        (Value::Float(a), Value::Float(b)) => (*a, *b, true),
        _ => {
            return Err(ToolError {
                message: format!("unsupported operands for {op:?}: {} and {}", left.type_name(), right.type_name()),
            })
        }
    };
    let result = match op {
        Add => a + b,
        Sub => a - b,
        Mul => a * b,
        Div => {
            if b == 0.0 {
                return Err(ToolError { message: "division by zero".into() });
            }
            a / b
        }
        Mod => a % b,
        Lt => return Ok(Value::Bool(a < b)),
        LtEq => return Ok(Value::Bool(a <= b)),
        Gt => return Ok(Value::Bool(a > b)),
        GtEq => return Ok(Value::Bool(a >= b)),
        Eq | NotEq | And | Or => unreachable!(),
    };
    if is_float {
        Ok(Value::Float(result))
    } else {
        Ok(Value::Int(result as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Block;
    use crate::lexer::lex;
    use crate::parser::parse;

    fn compile(src: &str) -> Block {
        parse(lex(src).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn executes_arithmetic_and_assignment() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let block = compile("let x = 1 + 2 * 3; x = x - 1;");
                let mut interp = Interp::new("agent-1");
                interp.exec_block(&block).await.unwrap();
                assert_eq!(interp.get_var("x"), Some(Value::Int(6)));
            })
            .await;
    }

    #[tokio::test]
    async fn if_else_and_while_control_flow() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let block = compile(
                    "let total = 0; let i = 0; while i < 5 { total = total + i; i = i + 1; } if total > 5 { total = total * 2; }",
                );
                let mut interp = Interp::new("agent-1");
                interp.exec_block(&block).await.unwrap();
                assert_eq!(interp.get_var("total"), Some(Value::Int(20)));
            })
            .await;
    }

    #[tokio::test]
    async fn user_defined_function_returns_value() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let block = compile("fn add(a, b) { return a + b; } let result = add(2, 3);");
                let mut interp = Interp::new("agent-1");
                interp.exec_block(&block).await.unwrap();
                assert_eq!(interp.get_var("result"), Some(Value::Int(5)));
            })
            .await;
    }

    #[tokio::test]
    async fn error_halts_block_execution() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let block = compile("let x = 1; let y = undefined_name; let z = 2;");
                let mut interp = Interp::new("agent-1");
                let result = interp.exec_block(&block).await;
                assert!(result.is_err());
                assert_eq!(interp.get_var("x"), Some(Value::Int(1)));
                assert_eq!(interp.get_var("z"), None);
            })
            .await;
    }

    #[tokio::test]
    async fn for_loop_iterates_over_list() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let block = compile("let total = 0; for x in [1, 2, 3] { total = total + x; }");
                let mut interp = Interp::new("agent-1");
                interp.exec_block(&block).await.unwrap();
                assert_eq!(interp.get_var("total"), Some(Value::Int(6)));
            })
            .await;
    }
}
