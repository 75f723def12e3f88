//! Handle and hydrated-type construction.
//!
//! `ShellHandle`/`AgentHandle` are genuine `HandleObj` implementors —
//! they're only ever reached through method calls (`shell.write(...)`),
//! never a plain attribute read, so they don't need to support
//! `Expr::Attr`. `Task`/`Skill`/`SkillSummary`, by contrast, are built
//! as `Value::Map`s holding both data fields and native-function-valued
//! method entries, the same "map of natives" shape already used for the
//! tool catalogue object `T` — because `(await get_task(id)).subject`
//! needs a plain attribute read, and `eval_expr`'s `Expr::Attr` only
//! supports `Value::Map` bases.

use std::rc::Rc;

use arc_domain::{Skill, SkillSummary, Task};
use arc_script::{HandleObj, NativeFn, ToolError, Value};

use crate::dispatch::{json_to_value, value_to_json, Dispatcher};

/// Handle to a running shell process. Named `shell` rather than the
/// original `bash` to match this port's `__handle__ == "shell"`
/// discriminator; the dispatched tool names follow suit
/// (`shell_result`/`shell_write`/`shell_output`/`shell_kill`).
#[derive(Debug)]
pub struct ShellHandle {
    dispatcher: Rc<Dispatcher>,
    id: String,
}

impl ShellHandle {
    pub fn new(dispatcher: Rc<Dispatcher>, obj: serde_json::Map<String, serde_json::Value>) -> Self {
        let id = obj.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        Self { dispatcher, id }
    }
}

#[async_trait::async_trait(?Send)]
impl HandleObj for ShellHandle {
    fn type_name(&self) -> &str {
        "shell"
    }

    async fn call_method(&self, method: &str, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Result<Value, ToolError> {
        let mut params = serde_json::Map::new();
        params.insert("id".to_string(), serde_json::Value::String(self.id.clone()));
        match method {
            "result" => {
                let timeout = args.first().or_else(|| kwarg(&kwargs, "timeout"));
                if let Some(v) = timeout {
                    params.insert("timeout".to_string(), value_to_json(v));
                }
                let result = self.dispatcher.call("shell_result", params.into()).await?;
                Ok(json_to_value(result))
            }
            "write" => {
                let text = args.first().or_else(|| kwarg(&kwargs, "text")).cloned().unwrap_or(Value::str(""));
                params.insert("input".to_string(), value_to_json(&text));
                let result = self.dispatcher.call("shell_write", params.into()).await?;
                Ok(json_to_value(result))
            }
            "output" => {
                let result = self.dispatcher.call("shell_output", params.into()).await?;
                Ok(json_to_value(result))
            }
            "kill" => {
                let result = self.dispatcher.call("shell_kill", params.into()).await?;
                Ok(json_to_value(result))
            }
            other => Err(ToolError {
                message: format!("shell handle has no method '{other}'"),
            }),
        }
    }
}

/// Handle to a spawned sub-agent. Carries an optional JSON schema
/// (attached by `agent_call` after hydration, since the schema is an
/// argument to the proxy call, not part of the tool's own JSON result)
/// used by `result()` to do a minimal "required keys present" check —
/// there is no JSON-Schema validator crate in this stack, so full
/// structural validation is out of scope; see DESIGN.md.
#[derive(Debug)]
pub struct AgentHandle {
    dispatcher: Rc<Dispatcher>,
    id: String,
    schema: Option<serde_json::Value>,
}

impl AgentHandle {
    pub fn new(
        dispatcher: Rc<Dispatcher>,
        obj: serde_json::Map<String, serde_json::Value>,
        schema: Option<serde_json::Value>,
    ) -> Self {
        let id = obj.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        Self { dispatcher, id, schema }
    }

    pub fn with_schema(dispatcher: Rc<Dispatcher>, id: String, schema: Option<serde_json::Value>) -> Self {
        Self { dispatcher, id, schema }
    }
}

#[async_trait::async_trait(?Send)]
impl HandleObj for AgentHandle {
    fn type_name(&self) -> &str {
        "agent"
    }

    async fn call_method(&self, method: &str, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Result<Value, ToolError> {
        let mut params = serde_json::Map::new();
        params.insert("id".to_string(), serde_json::Value::String(self.id.clone()));
        match method {
            "result" => {
                let timeout = args.first().or_else(|| kwarg(&kwargs, "timeout"));
                if let Some(v) = timeout {
                    params.insert("timeout".to_string(), value_to_json(v));
                }
                let result = self.dispatcher.call("agent_result", params.into()).await?;
                if let Some(schema) = &self.schema {
                    check_required_fields(schema, &result)?;
                }
                Ok(json_to_value(result))
            }
            "output" => {
                let result = self.dispatcher.call("agent_output", params.into()).await?;
                Ok(json_to_value(result))
            }
            "kill" => {
                let result = self.dispatcher.call("agent_kill", params.into()).await?;
                Ok(json_to_value(result))
            }
            other => Err(ToolError {
                message: format!("agent handle has no method '{other}'"),
            }),
        }
    }
}

fn check_required_fields(schema: &serde_json::Value, payload: &serde_json::Value) -> Result<(), ToolError> {
    let Some(required) = schema.get("required").and_then(|v| v.as_array()) else {
        return Ok(());
    };
    let missing: Vec<&str> = required
        .iter()
        .filter_map(|name| name.as_str())
        .filter(|name| payload.get(name).is_none())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ToolError {
            message: format!("agent result missing required field(s): {}", missing.join(", ")),
        })
    }
}

fn kwarg<'a>(kwargs: &'a [(String, Value)], name: &str) -> Option<&'a Value> {
    kwargs.iter().find(|(k, _)| k == name).map(|(_, v)| v)
}

/// Build the `Value::Map` a hydrated `Task` presents to script code:
/// data fields plus native methods. `start()` is the one deliberate
/// departure from the original tool's own `Task.start` (which just sets
/// `status=in_progress` via `update_task`) — here it claims the task
/// through `claim_task`, auto-filling `owner` from the dispatcher's own
/// agent id.
pub fn task_value(dispatcher: Rc<Dispatcher>, task: Task) -> Value {
    let id = task.id.clone();
    Value::map(vec![
        ("id".to_string(), Value::str(task.id)),
        ("subject".to_string(), Value::str(task.subject)),
        ("description".to_string(), Value::str(task.description)),
        ("status".to_string(), Value::str(task.status)),
        ("priority".to_string(), Value::str(task.priority)),
        (
            "blocks".to_string(),
            Value::list(task.blocks.into_iter().map(Value::str).collect()),
        ),
        (
            "blocked_by".to_string(),
            Value::list(task.blocked_by.into_iter().map(Value::str).collect()),
        ),
        (
            "start".to_string(),
            Value::Native(Rc::new(TaskStart {
                dispatcher: dispatcher.clone(),
                id: id.clone(),
            })),
        ),
        (
            "done".to_string(),
            Value::Native(Rc::new(TaskSetStatus {
                dispatcher: dispatcher.clone(),
                id: id.clone(),
                status: "completed",
            })),
        ),
        (
            "cancel".to_string(),
            Value::Native(Rc::new(TaskSetStatus {
                dispatcher: dispatcher.clone(),
                id: id.clone(),
                status: "cancelled",
            })),
        ),
        (
            "delete".to_string(),
            Value::Native(Rc::new(TaskDelete {
                dispatcher: dispatcher.clone(),
                id: id.clone(),
            })),
        ),
        (
            "block".to_string(),
            Value::Native(Rc::new(TaskLinkIds {
                dispatcher: dispatcher.clone(),
                id: id.clone(),
                field: "add_blocks",
            })),
        ),
        (
            "wait_on".to_string(),
            Value::Native(Rc::new(TaskLinkIds {
                dispatcher: dispatcher.clone(),
                id: id.clone(),
                field: "add_blocked_by",
            })),
        ),
        (
            "update".to_string(),
            Value::Native(Rc::new(TaskUpdate { dispatcher, id })),
        ),
    ])
}

pub fn skill_value(skill: Skill) -> Value {
    Value::map(vec![
        ("name".to_string(), Value::str(skill.name)),
        ("description".to_string(), Value::str(skill.description)),
        ("doc".to_string(), Value::str(skill.doc)),
    ])
}

pub fn skill_summary_value(summary: SkillSummary) -> Value {
    Value::map(vec![
        ("name".to_string(), Value::str(summary.name)),
        ("description".to_string(), Value::str(summary.description)),
    ])
}

#[derive(Debug)]
struct TaskStart {
    dispatcher: Rc<Dispatcher>,
    id: String,
}

#[async_trait::async_trait(?Send)]
impl NativeFn for TaskStart {
    fn name(&self) -> &str {
        "task.start"
    }

    async fn call(&self, _args: Vec<Value>, _kwargs: Vec<(String, Value)>) -> Result<Value, ToolError> {
        let params = serde_json::json!({
            "id": self.id,
            "owner": self.dispatcher.agent_id(),
        });
        let result = self.dispatcher.call("claim_task", params).await?;
        Ok(json_to_value(result))
    }
}

#[derive(Debug)]
struct TaskSetStatus {
    dispatcher: Rc<Dispatcher>,
    id: String,
    status: &'static str,
}

#[async_trait::async_trait(?Send)]
impl NativeFn for TaskSetStatus {
    fn name(&self) -> &str {
        "task.set_status"
    }

    async fn call(&self, _args: Vec<Value>, _kwargs: Vec<(String, Value)>) -> Result<Value, ToolError> {
        let params = serde_json::json!({"id": self.id, "status": self.status});
        let result = self.dispatcher.call("update_task", params).await?;
        Ok(json_to_value(result))
    }
}

#[derive(Debug)]
struct TaskDelete {
    dispatcher: Rc<Dispatcher>,
    id: String,
}

#[async_trait::async_trait(?Send)]
impl NativeFn for TaskDelete {
    fn name(&self) -> &str {
        "task.delete"
    }

    async fn call(&self, _args: Vec<Value>, _kwargs: Vec<(String, Value)>) -> Result<Value, ToolError> {
        let params = serde_json::json!({"id": self.id});
        let result = self.dispatcher.call("delete_task", params).await?;
        Ok(json_to_value(result))
    }
}

/// Backs `block(*ids)`/`wait_on(*ids)` — positional args are task ids to
/// link, collected into a single `add_blocks`/`add_blocked_by` list.
#[derive(Debug)]
struct TaskLinkIds {
    dispatcher: Rc<Dispatcher>,
    id: String,
    field: &'static str,
}

#[async_trait::async_trait(?Send)]
impl NativeFn for TaskLinkIds {
    fn name(&self) -> &str {
        "task.link_ids"
    }

    async fn call(&self, args: Vec<Value>, _kwargs: Vec<(String, Value)>) -> Result<Value, ToolError> {
        let ids: Vec<serde_json::Value> = args.iter().map(value_to_json).collect();
        let params = serde_json::json!({"id": self.id, self.field: ids});
        let result = self.dispatcher.call("update_task", params).await?;
        Ok(json_to_value(result))
    }
}

#[derive(Debug)]
struct TaskUpdate {
    dispatcher: Rc<Dispatcher>,
    id: String,
}

#[async_trait::async_trait(?Send)]
impl NativeFn for TaskUpdate {
    fn name(&self) -> &str {
        "task.update"
    }

    async fn call(&self, _args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Result<Value, ToolError> {
        let mut params = serde_json::Map::new();
        params.insert("id".to_string(), serde_json::Value::String(self.id.clone()));
        for (key, value) in kwargs {
            params.insert(key, value_to_json(&value));
        }
        let result = self.dispatcher.call("update_task", params.into()).await?;
        Ok(json_to_value(result))
    }
}
