//! Raw tool dispatch and JSON hydration.
//!
//! `Dispatcher` is deliberately thin: marshal, round-trip through the
//! `Bridge`, map a transport failure onto `ToolError`. It does not know
//! about handles or task types — that hydration step lives in
//! `hydrate()` below, kept separate so a wrapper proxy that needs the
//! raw decoded JSON (`agent_call`, to stash a schema on the handle it
//! returns) can inspect it without a second round trip.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use arc_bridge::Bridge;
use arc_domain::{Skill, SkillSummary, Task, ToolCall, ToolKind};
use arc_script::{ToolError, Value};

use crate::handles::{skill_summary_value, skill_value, task_value, AgentHandle, ShellHandle};

/// Everything a tool proxy needs to actually place a call: the bridge
/// transport and the agent id the host identifies this session by.
/// Also accumulates a `ToolCall` record per dispatch, drained once per
/// turn by the session so it can attach them to the completed `Turn`
/// (spec.md §2/§3: tool calls are assembled by the host, not the runtime).
pub struct Dispatcher {
    bridge: Arc<dyn Bridge>,
    agent_id: String,
    calls: RefCell<Vec<ToolCall>>,
}

impl Dispatcher {
    pub fn new(bridge: Arc<dyn Bridge>, agent_id: impl Into<String>) -> Self {
        Self {
            bridge,
            agent_id: agent_id.into(),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Drain the tool calls recorded since the last drain.
    pub fn take_calls(&self) -> Vec<ToolCall> {
        self.calls.take()
    }

    /// Marshal `params` to JSON and invoke `name` through the bridge.
    /// A transport-level failure (not a tool-reported one — those come
    /// back as `Ok` with `success: false`, already handled by `Bridge`)
    /// becomes a `ToolError` here, to be raised at the call site. Either
    /// way the attempt is recorded for the turn's `tool_calls`.
    pub async fn call(&self, name: &str, params: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let started = Instant::now();
        let args = params.as_object().cloned().unwrap_or_default();
        let outcome = self
            .bridge
            .invoke_tool(&self.agent_id, name, params)
            .await
            .map_err(|e| ToolError { message: e.to_string() });
        let duration_ms = started.elapsed().as_millis() as u64;

        let (result, success) = match &outcome {
            Ok(value) => (value.clone(), true),
            Err(e) => (serde_json::json!({ "error": e.message }), false),
        };
        self.calls.borrow_mut().push(ToolCall {
            tool: ToolKind::classify(name),
            args,
            result,
            success,
            duration_ms,
        });
        arc_domain::TraceEvent::ToolDispatched {
            tool_name: name.to_string(),
            duration_ms,
            success,
        }
        .emit();

        outcome
    }

    pub async fn send_message(&self, text: &str, terminal: bool) -> Result<(), ToolError> {
        self.bridge
            .send_message(&self.agent_id, text, terminal)
            .await
            .map_err(|e| ToolError { message: e.to_string() })
    }

    pub async fn ask_user(&self, prompt: &str) -> Result<String, ToolError> {
        self.bridge
            .ask_user(&self.agent_id, prompt)
            .await
            .map_err(|e| ToolError { message: e.to_string() })
    }
}

/// Decode a tool result's JSON payload into a script `Value`, hydrating
/// the `__handle__ ∈ {shell, agent}` and `__type__ ∈ {task, task_list,
/// skill, skill_summary, skill_list}` discriminators. Anything else
/// decodes structurally (objects become `Value::Map`, arrays `Value::List`).
pub fn hydrate(dispatcher: &Rc<Dispatcher>, json: serde_json::Value) -> Value {
    let Some(obj) = json.as_object() else {
        return json_to_value(json);
    };

    if let Some(handle) = obj.get("__handle__").and_then(|v| v.as_str()) {
        return match handle {
            "shell" => Value::Handle(Rc::new(ShellHandle::new(dispatcher.clone(), obj.clone()))),
            "agent" => Value::Handle(Rc::new(AgentHandle::new(dispatcher.clone(), obj.clone(), None))),
            _ => json_to_value(serde_json::Value::Object(obj.clone())),
        };
    }

    if let Some(ty) = obj.get("__type__").and_then(|v| v.as_str()) {
        return match ty {
            "task" => decode::<Task>(obj)
                .map(|t| task_value(dispatcher.clone(), t))
                .unwrap_or(Value::Null),
            "task_list" => hydrate_items(dispatcher, obj, "task"),
            "skill" => decode::<Skill>(obj).map(skill_value).unwrap_or(Value::Null),
            "skill_summary" => decode::<SkillSummary>(obj).map(skill_summary_value).unwrap_or(Value::Null),
            "skill_list" => hydrate_items(dispatcher, obj, "skill_summary"),
            _ => json_to_value(serde_json::Value::Object(obj.clone())),
        };
    }

    json_to_value(serde_json::Value::Object(obj.clone()))
}

fn decode<T: serde::de::DeserializeOwned>(obj: &serde_json::Map<String, serde_json::Value>) -> Option<T> {
    serde_json::from_value(serde_json::Value::Object(obj.clone())).ok()
}

fn hydrate_items(
    dispatcher: &Rc<Dispatcher>,
    obj: &serde_json::Map<String, serde_json::Value>,
    item_type: &str,
) -> Value {
    let items = obj.get("items").and_then(|v| v.as_array()).cloned().unwrap_or_default();
    let values = items
        .into_iter()
        .map(|item| {
            let mut item_obj = item.as_object().cloned().unwrap_or_default();
            item_obj
                .entry("__type__".to_string())
                .or_insert_with(|| serde_json::Value::String(item_type.to_string()));
            hydrate(dispatcher, serde_json::Value::Object(item_obj))
        })
        .collect();
    Value::list(values)
}

pub fn json_to_value(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(0.0)),
        },
        serde_json::Value::String(s) => Value::str(s),
        serde_json::Value::Array(items) => Value::list(items.into_iter().map(json_to_value).collect()),
        serde_json::Value::Object(entries) => {
            Value::map(entries.into_iter().map(|(k, v)| (k, json_to_value(v))).collect())
        }
    }
}

/// Inverse of `json_to_value`, used to marshal script arguments for an
/// outgoing tool call. Callables and handles have no JSON form and
/// collapse to `null` — a proxy never receives one as an argument in
/// practice, since they aren't constructible from script literals.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null | Value::Done => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::json!(i),
        Value::Float(f) => serde_json::json!(f),
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::List(items) => serde_json::Value::Array(items.borrow().iter().map(value_to_json).collect()),
        Value::Map(entries) => {
            let map: serde_json::Map<String, serde_json::Value> = entries
                .borrow()
                .iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect();
            serde_json::Value::Object(map)
        }
        Value::Error(e) => serde_json::json!({ "error": e.message }),
        Value::Function(_) | Value::Native(_) | Value::Handle(_) | Value::Task(_) => serde_json::Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_to_value_round_trips_plain_object() {
        let json = serde_json::json!({"a": 1, "b": [1, 2, "x"]});
        let value = json_to_value(json.clone());
        assert_eq!(value_to_json(&value), json);
    }

    #[test]
    fn json_to_value_promotes_whole_numbers_to_int() {
        assert_eq!(json_to_value(serde_json::json!(3)), Value::Int(3));
        assert_eq!(json_to_value(serde_json::json!(3.5)), Value::Float(3.5));
    }
}
