//! Runtime value representation.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use arc_snapshot::SnapshotValue;
use tokio::task::JoinHandle;

use crate::ast::FnDef;

/// State of a `create_task`-spawned computation. `Pending` holds the
/// `spawn_local` handle; the first `await` on the owning `Value::Task`
/// joins it and moves the slot to `Done`, so joining twice just replays
/// the cached result instead of polling an already-consumed handle.
#[derive(Debug)]
pub enum TaskState {
    Pending(JoinHandle<Result<Value, ToolError>>),
    Done(Result<Value, ToolError>),
}

/// A tool error. Always falsy in boolean context — matching the
/// "raised not returned, but never truthy" semantics a failing tool
/// call carries through `gather(..., return_exceptions=true)`.
#[derive(Debug, Clone)]
pub struct ToolError {
    pub message: String,
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ToolError {}

/// A native (host- or registry-provided) callable. The script runtime
/// is single-threaded and cooperative, so these are `?Send`.
#[async_trait::async_trait(?Send)]
pub trait NativeFn: fmt::Debug {
    fn name(&self) -> &str;
    async fn call(&self, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Result<Value, ToolError>;
}

/// A handle value (shell session, sub-agent, task board, ...) reached
/// via method calls, e.g. `shell.run(...)`.
#[async_trait::async_trait(?Send)]
pub trait HandleObj: fmt::Debug {
    fn type_name(&self) -> &str;
    async fn call_method(
        &self,
        method: &str,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, ToolError>;
}

#[derive(Clone)]
pub enum Value {
    Null,
    /// The suppressed-display sentinel returned by `say`/`done`.
    Done,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Rc<RefCell<Vec<Value>>>),
    Map(Rc<RefCell<Vec<(String, Value)>>>),
    Function(Rc<FnDef>),
    Native(Rc<dyn NativeFn>),
    Handle(Rc<dyn HandleObj>),
    Error(Rc<ToolError>),
    Task(Rc<RefCell<TaskState>>),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn map(entries: Vec<(String, Value)>) -> Self {
        Value::Map(Rc::new(RefCell::new(entries)))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null | Value::Done | Value::Error(_) => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.borrow().is_empty(),
            Value::Map(m) => !m.borrow().is_empty(),
            Value::Function(_) | Value::Native(_) | Value::Handle(_) | Value::Task(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Done => "done",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Function(_) => "function",
            Value::Native(_) => "native",
            Value::Handle(_) => "handle",
            Value::Error(_) => "error",
            Value::Task(_) => "task",
        }
    }

    /// `repr()`-style rendering used by the display-hook.
    pub fn repr(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Done => "done".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) => format!("{s:?}"),
            Value::List(items) => {
                let inner = items.borrow().iter().map(Value::repr).collect::<Vec<_>>().join(", ");
                format!("[{inner}]")
            }
            Value::Map(entries) => {
                let inner = entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("{k:?}: {}", v.repr()))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{{{inner}}}")
            }
            Value::Function(f) => format!("<fn {}>", f.name),
            Value::Native(n) => format!("<native {}>", n.name()),
            Value::Handle(h) => format!("<{} handle>", h.type_name()),
            Value::Error(e) => format!("<error: {}>", e.message),
            Value::Task(_) => "<task>".to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) | (Value::Done, Value::Done) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => *a.borrow() == *b.borrow(),
            (Value::Map(a), Value::Map(b)) => {
                let a = a.borrow();
                let b = b.borrow();
                a.len() == b.len() && a.iter().all(|(k, v)| b.iter().any(|(k2, v2)| k == k2 && v == v2))
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repr())
    }
}

impl arc_snapshot::Snapshotable for Value {
    fn to_snapshot(&self) -> Option<SnapshotValue> {
        match self {
            Value::Null | Value::Done => Some(SnapshotValue::Null),
            Value::Bool(b) => Some(SnapshotValue::Bool(*b)),
            Value::Int(i) => Some(SnapshotValue::Int(*i)),
            Value::Float(f) => Some(SnapshotValue::Float(*f)),
            Value::Str(s) => Some(SnapshotValue::Str(s.clone())),
            Value::List(items) => {
                let mut converted = Vec::with_capacity(items.borrow().len());
                for item in items.borrow().iter() {
                    converted.push(item.to_snapshot()?);
                }
                Some(SnapshotValue::List(converted))
            }
            Value::Map(entries) => {
                let mut converted = Vec::with_capacity(entries.borrow().len());
                for (key, value) in entries.borrow().iter() {
                    converted.push((key.clone(), value.to_snapshot()?));
                }
                Some(SnapshotValue::Map(converted))
            }
            Value::Function(_) | Value::Native(_) | Value::Handle(_) | Value::Error(_) | Value::Task(_) => None,
        }
    }

    fn from_snapshot(value: SnapshotValue) -> Self {
        match value {
            SnapshotValue::Null => Value::Null,
            SnapshotValue::Bool(b) => Value::Bool(b),
            SnapshotValue::Int(i) => Value::Int(i),
            SnapshotValue::Float(f) => Value::Float(f),
            SnapshotValue::Str(s) => Value::Str(s),
            SnapshotValue::List(items) => Value::list(items.into_iter().map(Value::from_snapshot).collect()),
            SnapshotValue::Map(entries) => {
                Value::map(entries.into_iter().map(|(k, v)| (k, Value::from_snapshot(v))).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_value_is_always_falsy() {
        let err = Value::Error(Rc::new(ToolError { message: "boom".into() }));
        assert!(!err.is_truthy());
    }

    #[test]
    fn empty_containers_are_falsy_nonempty_are_truthy() {
        assert!(!Value::list(vec![]).is_truthy());
        assert!(Value::list(vec![Value::Int(1)]).is_truthy());
    }

    #[test]
    fn snapshot_round_trips_nested_containers() {
        use arc_snapshot::Snapshotable;
        let value = Value::map(vec![
            ("a".to_string(), Value::Int(1)),
            ("b".to_string(), Value::list(vec![Value::str("x"), Value::Bool(true)])),
        ]);
        let snapshot = value.to_snapshot().unwrap();
        let restored = Value::from_snapshot(snapshot);
        assert_eq!(restored.repr(), value.repr());
    }

    #[test]
    fn handle_values_are_not_snapshotable() {
        use arc_snapshot::Snapshotable;
        #[derive(Debug)]
        struct Dummy;
        #[async_trait::async_trait(?Send)]
        impl HandleObj for Dummy {
            fn type_name(&self) -> &str {
                "dummy"
            }
            async fn call_method(
                &self,
                _method: &str,
                _args: Vec<Value>,
                _kwargs: Vec<(String, Value)>,
            ) -> Result<Value, ToolError> {
                Ok(Value::Null)
            }
        }
        let handle = Value::Handle(Rc::new(Dummy));
        assert!(handle.to_snapshot().is_none());
    }
}
