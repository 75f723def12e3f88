//! Tool proxies: the callables synthesised onto the script namespace
//! for every non-hidden `ToolDef`, plus the handful of special wrappers
//! (`claim_task`, `agent_call`, `enter_plan_mode`, `exit_plan_mode`)
//! spec.md §4.3 calls out by name.

use std::cell::RefCell;
use std::rc::Rc;

use arc_domain::ToolParam;
use arc_history::TurnHistory;
use arc_memory::Mem;
use arc_script::{NativeFn, ToolError, Value};

use crate::dispatch::{hydrate, value_to_json, Dispatcher};
use crate::handles::AgentHandle;

/// Maps a proxy call's positional/keyword arguments onto the tool's
/// declared parameter names (spec.md §4.3, grounded in the original's
/// `make_fn` closure): positional args fill declared params in order; a
/// positional arg that is itself a mapping merges into the arg-map
/// wholesale (dict-style call) instead of filling one named slot;
/// keyword args are applied last and win on key collision.
pub fn map_args(params: &[ToolParam], args: Vec<Value>, kwargs: Vec<(String, Value)>) -> serde_json::Map<String, serde_json::Value> {
    let mut out = serde_json::Map::new();
    for (i, arg) in args.into_iter().enumerate() {
        if let Value::Map(entries) = &arg {
            for (key, value) in entries.borrow().iter() {
                out.insert(key.clone(), value_to_json(value));
            }
        } else if let Some(param) = params.get(i) {
            out.insert(param.name.clone(), value_to_json(&arg));
        }
    }
    for (key, value) in kwargs {
        out.insert(key, value_to_json(&value));
    }
    out
}

/// A synthesised proxy for one non-hidden, non-special `ToolDef`.
#[derive(Debug)]
pub struct ToolProxy {
    name: String,
    params: Vec<ToolParam>,
    dispatcher: Rc<Dispatcher>,
}

impl ToolProxy {
    pub fn new(def: &arc_domain::ToolDef, dispatcher: Rc<Dispatcher>) -> Self {
        Self {
            name: def.name.clone(),
            params: def.params.clone(),
            dispatcher,
        }
    }
}

#[async_trait::async_trait(?Send)]
impl NativeFn for ToolProxy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Result<Value, ToolError> {
        let params = map_args(&self.params, args, kwargs);
        let result = self.dispatcher.call(&self.name, params.into()).await?;
        Ok(hydrate(&self.dispatcher, result))
    }
}

/// `claim_task(id=None)` — auto-fills `owner` from the dispatcher's own
/// agent id; `id` is optional (omission means "claim the next
/// available task").
#[derive(Debug)]
pub struct ClaimTaskProxy {
    dispatcher: Rc<Dispatcher>,
}

impl ClaimTaskProxy {
    pub fn new(dispatcher: Rc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait::async_trait(?Send)]
impl NativeFn for ClaimTaskProxy {
    fn name(&self) -> &str {
        "claim_task"
    }

    async fn call(&self, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Result<Value, ToolError> {
        let mut params = serde_json::Map::new();
        if let Some(id) = args.first().or_else(|| find_kwarg(&kwargs, "id")) {
            params.insert("id".to_string(), value_to_json(id));
        }
        for (key, value) in &kwargs {
            if key != "id" {
                params.insert(key.clone(), value_to_json(value));
            }
        }
        params.insert(
            "owner".to_string(),
            serde_json::Value::String(self.dispatcher.agent_id().to_string()),
        );
        let result = self.dispatcher.call("claim_task", params.into()).await?;
        Ok(hydrate(&self.dispatcher, result))
    }
}

/// `agent_call(..., schema=None)` — dispatches to spawn a sub-agent,
/// attaching the parent's serialized history/memory when non-empty
/// (spec.md §4.3: the PARENT session's state, not an argument the
/// script author passes), and stashing `schema` on the returned
/// `AgentHandle` for later validation in `result()`.
#[derive(Debug)]
pub struct AgentCallProxy {
    dispatcher: Rc<Dispatcher>,
    history: Rc<RefCell<TurnHistory>>,
    mem: Rc<RefCell<Mem>>,
}

impl AgentCallProxy {
    pub fn new(dispatcher: Rc<Dispatcher>, history: Rc<RefCell<TurnHistory>>, mem: Rc<RefCell<Mem>>) -> Self {
        Self { dispatcher, history, mem }
    }
}

#[async_trait::async_trait(?Send)]
impl NativeFn for AgentCallProxy {
    fn name(&self) -> &str {
        "agent_call"
    }

    async fn call(&self, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Result<Value, ToolError> {
        let mut kwargs = kwargs;
        let schema = take_kwarg(&mut kwargs, "schema").map(|v| schema_to_json(&v)).transpose()?;

        let mut params = serde_json::Map::new();
        if let Some(prompt) = args.first().or_else(|| find_kwarg(&kwargs, "prompt")) {
            params.insert("prompt".to_string(), value_to_json(prompt));
        }
        for (key, value) in &kwargs {
            if key != "prompt" {
                params.insert(key.clone(), value_to_json(value));
            }
        }
        if let Some(schema) = &schema {
            params.insert("schema".to_string(), schema.clone());
        }

        if !self.history.borrow().is_empty() {
            let bytes = self.history.borrow().serialize().map_err(|e| ToolError { message: e.to_string() })?;
            let json: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| ToolError { message: e.to_string() })?;
            params.insert("_parent_history".to_string(), json);
        }
        if !self.mem.borrow().is_empty() {
            let bytes = self.mem.borrow().serialize().map_err(|e| ToolError { message: e.to_string() })?;
            let json: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| ToolError { message: e.to_string() })?;
            params.insert("_parent_mem".to_string(), json);
        }

        let result = self.dispatcher.call("agent_call", params.into()).await?;
        let Some(obj) = result.as_object() else {
            return Ok(hydrate(&self.dispatcher, result));
        };
        if obj.get("__handle__").and_then(|v| v.as_str()) == Some("agent") {
            let id = obj.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            return Ok(Value::Handle(Rc::new(AgentHandle::with_schema(self.dispatcher.clone(), id, schema))));
        }
        Ok(hydrate(&self.dispatcher, result))
    }
}

/// `enter_plan_mode()` — returns the plan-file path the host prepared.
#[derive(Debug)]
pub struct EnterPlanModeProxy {
    dispatcher: Rc<Dispatcher>,
}

impl EnterPlanModeProxy {
    pub fn new(dispatcher: Rc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait::async_trait(?Send)]
impl NativeFn for EnterPlanModeProxy {
    fn name(&self) -> &str {
        "enter_plan_mode"
    }

    async fn call(&self, _args: Vec<Value>, _kwargs: Vec<(String, Value)>) -> Result<Value, ToolError> {
        let result = self.dispatcher.call("enter_plan_mode", serde_json::json!({})).await?;
        Ok(hydrate(&self.dispatcher, result))
    }
}

/// `exit_plan_mode()` — in interactive mode, presents `{Execute plan,
/// Edit plan, Reject}` through the bridge's `ask_user` and, if the user
/// picks "Execute plan", sends a terminal confirmation message. In
/// headless mode there's no one to ask, so it proceeds as if "Execute
/// plan" had been chosen.
#[derive(Debug)]
pub struct ExitPlanModeProxy {
    dispatcher: Rc<Dispatcher>,
    headless: bool,
}

impl ExitPlanModeProxy {
    pub fn new(dispatcher: Rc<Dispatcher>, headless: bool) -> Self {
        Self { dispatcher, headless }
    }
}

const EXECUTE: &str = "Execute plan";

#[async_trait::async_trait(?Send)]
impl NativeFn for ExitPlanModeProxy {
    fn name(&self) -> &str {
        "exit_plan_mode"
    }

    async fn call(&self, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Result<Value, ToolError> {
        let plan = args.first().or_else(|| find_kwarg(&kwargs, "plan")).cloned().unwrap_or(Value::str(""));
        let mut params = serde_json::Map::new();
        params.insert("plan".to_string(), value_to_json(&plan));

        let choice = if self.headless {
            EXECUTE.to_string()
        } else {
            let prompt = "Execute plan, Edit plan, or Reject?".to_string();
            self.dispatcher.ask_user(&prompt).await?
        };

        params.insert("choice".to_string(), serde_json::Value::String(choice.clone()));
        let result = self.dispatcher.call("exit_plan_mode", params.into()).await?;

        if choice == EXECUTE {
            self.dispatcher.send_message("Plan approved — executing.", true).await?;
        }
        Ok(hydrate(&self.dispatcher, result))
    }
}

fn find_kwarg<'a>(kwargs: &'a [(String, Value)], name: &str) -> Option<&'a Value> {
    kwargs.iter().find(|(k, _)| k == name).map(|(_, v)| v)
}

/// Removes and returns a keyword argument by name, if present.
pub fn take_kwarg(kwargs: &mut Vec<(String, Value)>, name: &str) -> Option<Value> {
    let position = kwargs.iter().position(|(k, _)| k == name)?;
    Some(kwargs.remove(position).1)
}

/// `schema` accepts a JSON-schema string or an already-structured
/// mapping. The original's `model_json_schema()` (a Pydantic model
/// class) has no Rust analogue since there are no runtime model
/// classes here — noted in DESIGN.md as a deliberate simplification.
pub fn schema_to_json(value: &Value) -> Result<serde_json::Value, ToolError> {
    match value {
        Value::Str(s) => serde_json::from_str(s).map_err(|e| ToolError {
            message: format!("invalid schema JSON: {e}"),
        }),
        Value::Map(_) => Ok(value_to_json(value)),
        other => Err(ToolError {
            message: format!("schema must be a JSON string or a map, got {}", other.type_name()),
        }),
    }
}
