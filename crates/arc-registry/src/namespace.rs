//! Assembles one turn's script namespace: the `T` tool-catalogue
//! object, bare globals for `inject_into_prompt` tools, and the
//! always-present builtins (`done`, `say`, `ask`, `list_tools`,
//! `find_tools`, `find_history`, `find_mem`, `reset_repl`) — the same
//! grouping the original binds into its namespace in one pass.

use std::cell::RefCell;
use std::rc::Rc;

use arc_domain::ToolDef;
use arc_history::TurnHistory;
use arc_memory::Mem;
use arc_script::capture::OutputCapture;
use arc_script::{AutoAwaitConfig, NativeFn, ToolError, Value};
use arc_search::{Document, SearchMode};

use crate::dispatch::Dispatcher;
use crate::proxy::{AgentCallProxy, ClaimTaskProxy, EnterPlanModeProxy, ExitPlanModeProxy, ToolProxy};

/// Fixed handle-method names the auto-await rewriter treats as always
/// suspending (spec.md §4.1), regardless of which concrete handle or
/// tool proxy they end up bound to at runtime.
pub const HANDLE_METHOD_NAMES: &[&str] = &[
    "result", "write", "output", "kill", "claim", "start", "done", "cancel", "delete", "block", "wait_on", "update",
    "load", "read_file",
];

/// What `build` assembles for one turn: the globals to bind onto the
/// interpreter and the auto-await name/attribute sets the compiler
/// needs for the same turn.
pub struct RegisteredNamespace {
    pub globals: Vec<(String, Value)>,
    pub auto_await: AutoAwaitConfig,
}

/// Session-scoped state every proxy needs a handle to. Lives as long as
/// the session does; `build` is called fresh each turn with a new
/// output buffer (see `output`) and the turn index about to run, so the
/// `mem` object's `set` stamps entries with the right turn number.
pub struct RegistryConfig {
    pub dispatcher: Rc<Dispatcher>,
    pub headless: bool,
    pub history: Rc<RefCell<TurnHistory>>,
    pub mem: Rc<RefCell<Mem>>,
    pub turn_index: u64,
}

/// Synthesise proxies for `defs` and assemble the namespace per spec.md
/// §4.3: every non-hidden def gets bound onto `T`; hidden defs are
/// skipped entirely (an invariant of spec.md §3 — they're never bound
/// but remain dispatchable via whatever internal Rust caller already
/// knows their name, not through the script namespace at all); the
/// `inject_into_prompt` subset is additionally bound as a bare global.
/// `output` is the current turn's capture buffer, for the handful of
/// builtins (`list_tools`, `reset_repl`) that print their result the
/// way the original does.
pub fn build(defs: &[ToolDef], config: &RegistryConfig, output: Rc<RefCell<OutputCapture>>) -> RegisteredNamespace {
    let mut t_entries: Vec<(String, Value)> = Vec::new();
    let mut globals: Vec<(String, Value)> = Vec::new();
    let mut auto_await_names: Vec<String> = Vec::new();
    let mut auto_await_attrs: Vec<String> = HANDLE_METHOD_NAMES.iter().map(|s| s.to_string()).collect();

    for def in defs {
        if def.hidden {
            continue;
        }
        let value: Value = match def.name.as_str() {
            "claim_task" => Value::Native(Rc::new(ClaimTaskProxy::new(config.dispatcher.clone()))),
            "agent_call" => Value::Native(Rc::new(AgentCallProxy::new(
                config.dispatcher.clone(),
                config.history.clone(),
                config.mem.clone(),
            ))),
            "enter_plan_mode" => Value::Native(Rc::new(EnterPlanModeProxy::new(config.dispatcher.clone()))),
            "exit_plan_mode" => {
                Value::Native(Rc::new(ExitPlanModeProxy::new(config.dispatcher.clone(), config.headless)))
            }
            _ => Value::Native(Rc::new(ToolProxy::new(def, config.dispatcher.clone()))),
        };
        t_entries.push((def.name.clone(), value.clone()));
        auto_await_attrs.push(def.name.clone());
        if def.inject_into_prompt {
            auto_await_names.push(def.name.clone());
            globals.push((def.name.clone(), value));
        }
    }

    t_entries.push(("list_tools".to_string(), Value::Native(Rc::new(ListTools::new(defs, output.clone())))));
    t_entries.push(("find_tools".to_string(), Value::Native(Rc::new(FindTools::new(defs)))));
    t_entries.push((
        "find_history".to_string(),
        Value::Native(Rc::new(FindHistory {
            history: config.history.clone(),
        })),
    ));
    t_entries.push(("find_mem".to_string(), Value::Native(Rc::new(FindMem { mem: config.mem.clone() }))));

    globals.push(("T".to_string(), Value::map(t_entries)));
    globals.push(("mem".to_string(), mem_value(config.mem.clone(), config.turn_index)));
    globals.push(("done".to_string(), Value::Native(Rc::new(DoneFn { dispatcher: config.dispatcher.clone() }))));
    globals.push(("say".to_string(), Value::Native(Rc::new(SayFn { dispatcher: config.dispatcher.clone() }))));
    if !config.headless {
        globals.push((
            "ask".to_string(),
            Value::Native(Rc::new(AskFn {
                dispatcher: config.dispatcher.clone(),
                output: output.clone(),
            })),
        ));
        auto_await_names.push("ask".to_string());
    }
    globals.push((
        "reset_repl".to_string(),
        Value::Native(Rc::new(ResetRepl { output })),
    ));

    RegisteredNamespace {
        globals,
        auto_await: AutoAwaitConfig::new(auto_await_names, auto_await_attrs),
    }
}

fn clamp_limit(value: Option<&Value>) -> usize {
    let requested = match value {
        Some(Value::Int(i)) => *i,
        _ => 10,
    };
    requested.clamp(1, 100) as usize
}

fn mode_from(value: Option<&Value>) -> SearchMode {
    match value {
        Some(Value::Str(s)) if s.eq_ignore_ascii_case("literal") => SearchMode::Literal,
        Some(Value::Str(s)) if s.eq_ignore_ascii_case("regex") => SearchMode::Regex,
        _ => SearchMode::Hybrid,
    }
}

fn kwarg<'a>(kwargs: &'a [(String, Value)], name: &str) -> Option<&'a Value> {
    kwargs.iter().find(|(k, _)| k == name).map(|(_, v)| v)
}

fn query_arg(args: &[Value], kwargs: &[(String, Value)]) -> String {
    match args.first().or_else(|| kwarg(kwargs, "query")) {
        Some(Value::Str(s)) => s.clone(),
        _ => String::new(),
    }
}

/// The optional conjunctive `regex` post-filter accepted by every search
/// native, regardless of mode (spec.md §4.5).
fn regex_filter_arg(kwargs: &[(String, Value)]) -> Option<String> {
    match kwarg(kwargs, "regex") {
        Some(Value::Str(s)) => Some(s.clone()),
        _ => None,
    }
}

/// Builds the `mem` global (spec.md §3/§8 scenario 6): a map of natives
/// over the session's `Mem`, stamping writes with the turn about to run
/// rather than taking a turn argument from script code.
fn mem_value(mem: Rc<RefCell<Mem>>, turn_index: u64) -> Value {
    Value::map(vec![
        ("set".to_string(), Value::Native(Rc::new(MemSet { mem: mem.clone(), turn_index }))),
        ("get".to_string(), Value::Native(Rc::new(MemGet { mem: mem.clone() }))),
        ("entry".to_string(), Value::Native(Rc::new(MemEntryFn { mem: mem.clone() }))),
        ("delete".to_string(), Value::Native(Rc::new(MemDelete { mem: mem.clone() }))),
        ("all".to_string(), Value::Native(Rc::new(MemAll { mem: mem.clone() }))),
        ("since".to_string(), Value::Native(Rc::new(MemSince { mem: mem.clone() }))),
        ("recent".to_string(), Value::Native(Rc::new(MemRecent { mem }))),
    ])
}

fn mem_entry_value(entry: &arc_domain::MemEntry) -> Value {
    Value::map(vec![
        ("key".to_string(), Value::str(entry.key.clone())),
        ("description".to_string(), Value::str(entry.description.clone())),
        ("value".to_string(), Value::str(entry.value.clone())),
        ("turn".to_string(), Value::Int(entry.turn as i64)),
    ])
}

fn arg_str(args: &[Value], kwargs: &[(String, Value)], name: &str, position: usize) -> Option<String> {
    let value = args.get(position).or_else(|| kwarg(kwargs, name))?;
    match value {
        Value::Str(s) => Some(s.clone()),
        other => Some(other.repr()),
    }
}

/// `mem.set(key, description, value=None)` — a `None`/omitted `value`
/// aliases `description` (spec.md §3).
#[derive(Debug)]
struct MemSet {
    mem: Rc<RefCell<Mem>>,
    turn_index: u64,
}

#[async_trait::async_trait(?Send)]
impl NativeFn for MemSet {
    fn name(&self) -> &str {
        "mem.set"
    }

    async fn call(&self, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Result<Value, ToolError> {
        let key = arg_str(&args, &kwargs, "key", 0).ok_or_else(|| ToolError { message: "mem.set requires 'key'".to_string() })?;
        let description = arg_str(&args, &kwargs, "description", 1).unwrap_or_default();
        let value = match args.get(2).or_else(|| kwarg(&kwargs, "value")) {
            Some(Value::Null) | None => description.clone(),
            Some(Value::Str(s)) => s.clone(),
            Some(other) => other.repr(),
        };
        self.mem.borrow_mut().set(key, description, value, self.turn_index);
        Ok(Value::Done)
    }
}

#[derive(Debug)]
struct MemGet {
    mem: Rc<RefCell<Mem>>,
}

#[async_trait::async_trait(?Send)]
impl NativeFn for MemGet {
    fn name(&self) -> &str {
        "mem.get"
    }

    async fn call(&self, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Result<Value, ToolError> {
        let key = arg_str(&args, &kwargs, "key", 0).unwrap_or_default();
        Ok(self.mem.borrow().value(&key).map(Value::str).unwrap_or(Value::Null))
    }
}

#[derive(Debug)]
struct MemEntryFn {
    mem: Rc<RefCell<Mem>>,
}

#[async_trait::async_trait(?Send)]
impl NativeFn for MemEntryFn {
    fn name(&self) -> &str {
        "mem.entry"
    }

    async fn call(&self, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Result<Value, ToolError> {
        let key = arg_str(&args, &kwargs, "key", 0).unwrap_or_default();
        Ok(self.mem.borrow().get(&key).map(mem_entry_value).unwrap_or(Value::Null))
    }
}

#[derive(Debug)]
struct MemDelete {
    mem: Rc<RefCell<Mem>>,
}

#[async_trait::async_trait(?Send)]
impl NativeFn for MemDelete {
    fn name(&self) -> &str {
        "mem.delete"
    }

    async fn call(&self, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Result<Value, ToolError> {
        let key = arg_str(&args, &kwargs, "key", 0).unwrap_or_default();
        Ok(Value::Bool(self.mem.borrow_mut().delete(&key).is_some()))
    }
}

#[derive(Debug)]
struct MemAll {
    mem: Rc<RefCell<Mem>>,
}

#[async_trait::async_trait(?Send)]
impl NativeFn for MemAll {
    fn name(&self) -> &str {
        "mem.all"
    }

    async fn call(&self, _args: Vec<Value>, _kwargs: Vec<(String, Value)>) -> Result<Value, ToolError> {
        Ok(Value::list(self.mem.borrow().all().iter().map(mem_entry_value).collect()))
    }
}

#[derive(Debug)]
struct MemSince {
    mem: Rc<RefCell<Mem>>,
}

#[async_trait::async_trait(?Send)]
impl NativeFn for MemSince {
    fn name(&self) -> &str {
        "mem.since"
    }

    async fn call(&self, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Result<Value, ToolError> {
        let turn = match args.first().or_else(|| kwarg(&kwargs, "turn")) {
            Some(Value::Int(i)) => *i as u64,
            _ => 0,
        };
        Ok(Value::list(self.mem.borrow().since(turn).into_iter().map(mem_entry_value).collect()))
    }
}

#[derive(Debug)]
struct MemRecent {
    mem: Rc<RefCell<Mem>>,
}

#[async_trait::async_trait(?Send)]
impl NativeFn for MemRecent {
    fn name(&self) -> &str {
        "mem.recent"
    }

    async fn call(&self, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Result<Value, ToolError> {
        let n = match args.first().or_else(|| kwarg(&kwargs, "n")) {
            Some(Value::Int(i)) => (*i).max(0) as usize,
            _ => 10,
        };
        Ok(Value::list(self.mem.borrow().recent(n).into_iter().map(mem_entry_value).collect()))
    }
}

struct ToolDoc<'a>(&'a ToolDef);

impl<'a> Document for ToolDoc<'a> {
    fn fields(&self) -> Vec<(&str, &str, f32)> {
        vec![
            ("name", self.0.name.as_str(), 4.0),
            ("description", self.0.description.as_str(), 2.0),
            ("examples", self.0.examples.as_str(), 1.0),
        ]
    }
}

/// `list_tools()` — prints (and returns, display-suppressed) a
/// signature catalogue of every non-hidden tool.
#[derive(Debug)]
struct ListTools {
    defs: Vec<ToolDef>,
    output: Rc<RefCell<OutputCapture>>,
}

impl ListTools {
    fn new(defs: &[ToolDef], output: Rc<RefCell<OutputCapture>>) -> Self {
        Self {
            defs: defs.to_vec(),
            output,
        }
    }
}

#[async_trait::async_trait(?Send)]
impl NativeFn for ListTools {
    fn name(&self) -> &str {
        "list_tools"
    }

    async fn call(&self, _args: Vec<Value>, _kwargs: Vec<(String, Value)>) -> Result<Value, ToolError> {
        let mut lines = vec!["Available tools:".to_string()];
        for def in self.defs.iter().filter(|d| !d.hidden) {
            let sig = def
                .params
                .iter()
                .map(|p| {
                    if p.required {
                        format!("{}: {}", p.name, p.r#type)
                    } else {
                        format!("{}: {} = None", p.name, p.r#type)
                    }
                })
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("  {}({}) -> {}", def.name, sig, def.returns));
            if !def.description.is_empty() {
                lines.push(format!("      {}", def.description));
            }
        }
        let result = lines.join("\n");
        self.output.borrow_mut().writeln(&result);
        Ok(Value::Done)
    }
}

/// `find_tools(query, mode="hybrid", limit=10, include_hidden=False,
/// injected_only=False, regex=None)`.
#[derive(Debug)]
struct FindTools {
    defs: Vec<ToolDef>,
}

impl FindTools {
    fn new(defs: &[ToolDef]) -> Self {
        Self { defs: defs.to_vec() }
    }
}

#[async_trait::async_trait(?Send)]
impl NativeFn for FindTools {
    fn name(&self) -> &str {
        "find_tools"
    }

    async fn call(&self, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Result<Value, ToolError> {
        let query = query_arg(&args, &kwargs);
        let mode = mode_from(kwarg(&kwargs, "mode"));
        let limit = clamp_limit(kwarg(&kwargs, "limit"));
        let include_hidden = kwarg(&kwargs, "include_hidden").map(Value::is_truthy).unwrap_or(false);
        let injected_only = kwarg(&kwargs, "injected_only").map(Value::is_truthy).unwrap_or(false);
        let regex_filter = regex_filter_arg(&kwargs);

        let candidates: Vec<&ToolDef> = self
            .defs
            .iter()
            .filter(|d| include_hidden || !d.hidden)
            .filter(|d| !injected_only || d.inject_into_prompt)
            .collect();
        let docs: Vec<ToolDoc<'_>> = candidates.iter().map(|d| ToolDoc(*d)).collect();
        let hits = arc_search::search(&docs, &query, mode, limit, regex_filter.as_deref());
        let results = hits
            .into_iter()
            .filter_map(|hit| candidates.get(hit.index))
            .map(|def| {
                Value::map(vec![
                    ("name".to_string(), Value::str(def.name.clone())),
                    ("description".to_string(), Value::str(def.description.clone())),
                    ("hidden".to_string(), Value::Bool(def.hidden)),
                ])
            })
            .collect();
        Ok(Value::list(results))
    }
}

/// `find_history(query, mode="hybrid", limit=10, since_turn=None,
/// fields=None, regex=None)`.
#[derive(Debug)]
struct FindHistory {
    history: Rc<RefCell<TurnHistory>>,
}

#[async_trait::async_trait(?Send)]
impl NativeFn for FindHistory {
    fn name(&self) -> &str {
        "find_history"
    }

    async fn call(&self, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Result<Value, ToolError> {
        let query = query_arg(&args, &kwargs);
        let mode = mode_from(kwarg(&kwargs, "mode"));
        let limit = clamp_limit(kwarg(&kwargs, "limit"));
        let regex_filter = regex_filter_arg(&kwargs);
        let since_turn = match kwarg(&kwargs, "since_turn") {
            Some(Value::Int(i)) => Some(*i as u64),
            _ => None,
        };
        let fields_filter: Option<Vec<String>> = match kwarg(&kwargs, "fields") {
            Some(Value::List(items)) => Some(
                items
                    .borrow()
                    .iter()
                    .filter_map(|v| match v {
                        Value::Str(s) => Some(s.clone()),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => None,
        };

        let history = self.history.borrow();
        let hits = history.find(&query, mode, limit, fields_filter.as_deref(), regex_filter.as_deref());
        let results = hits
            .into_iter()
            .filter(|t| since_turn.map(|since| t.index >= since).unwrap_or(true))
            .map(|turn| {
                let all_fields: Vec<(&str, &str)> = vec![
                    ("user_message", turn.user_message.as_str()),
                    ("code", turn.code.as_str()),
                    ("prose", turn.prose.as_str()),
                    ("output", turn.output.as_str()),
                ];
                let fields: Vec<&(&str, &str)> = all_fields
                    .iter()
                    .filter(|(name, _)| {
                        fields_filter.as_ref().map(|allowed| allowed.iter().any(|a| a == name)).unwrap_or(true)
                    })
                    .collect();
                let non_empty: Vec<&str> = fields.iter().filter(|(_, t)| !t.is_empty()).map(|(n, _)| *n).collect();
                let preview = fields
                    .iter()
                    .find(|(_, text)| !text.is_empty())
                    .map(|(_, text)| arc_search::truncate_preview(text, 220))
                    .unwrap_or_default();
                Value::map(vec![
                    ("turn".to_string(), Value::Int(turn.index as i64)),
                    ("preview".to_string(), Value::str(preview)),
                    (
                        "fields".to_string(),
                        Value::list(non_empty.into_iter().map(Value::str).collect()),
                    ),
                ])
            })
            .collect();
        Ok(Value::list(results))
    }
}

/// `find_mem(query, mode="hybrid", limit=10, keys=None, regex=None)`.
#[derive(Debug)]
struct FindMem {
    mem: Rc<RefCell<Mem>>,
}

#[async_trait::async_trait(?Send)]
impl NativeFn for FindMem {
    fn name(&self) -> &str {
        "find_mem"
    }

    async fn call(&self, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Result<Value, ToolError> {
        let query = query_arg(&args, &kwargs);
        let mode = mode_from(kwarg(&kwargs, "mode"));
        let limit = clamp_limit(kwarg(&kwargs, "limit"));
        let regex_filter = regex_filter_arg(&kwargs);
        let allowed_keys: Option<Vec<String>> = match kwarg(&kwargs, "keys") {
            Some(Value::List(items)) => Some(
                items
                    .borrow()
                    .iter()
                    .filter_map(|v| match v {
                        Value::Str(s) => Some(s.clone()),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => None,
        };

        let mem = self.mem.borrow();
        let hits = mem.find(&query, mode, limit, regex_filter.as_deref());
        let results = hits
            .into_iter()
            .filter(|e| allowed_keys.as_ref().map(|keys| keys.contains(&e.key)).unwrap_or(true))
            .map(|entry| {
                Value::map(vec![
                    ("key".to_string(), Value::str(entry.key.clone())),
                    ("description".to_string(), Value::str(entry.description.clone())),
                    ("value".to_string(), Value::str(entry.value.clone())),
                    ("turn".to_string(), Value::Int(entry.turn as i64)),
                ])
            })
            .collect();
        Ok(Value::list(results))
    }
}

/// `done(value="")` — the turn's terminal response. Always returns the
/// suppressed-display sentinel, regardless of whether the send
/// succeeds; a failed send surfaces as a raised error.
#[derive(Debug)]
struct DoneFn {
    dispatcher: Rc<Dispatcher>,
}

#[async_trait::async_trait(?Send)]
impl NativeFn for DoneFn {
    fn name(&self) -> &str {
        "done"
    }

    async fn call(&self, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Result<Value, ToolError> {
        let value = args.first().or_else(|| kwarg(&kwargs, "value")).cloned().unwrap_or(Value::str(""));
        let text = render_message(&value);
        self.dispatcher.send_message(&text, true).await?;
        Ok(Value::Done)
    }
}

/// `say(text)` — a non-terminal progress message.
#[derive(Debug)]
struct SayFn {
    dispatcher: Rc<Dispatcher>,
}

#[async_trait::async_trait(?Send)]
impl NativeFn for SayFn {
    fn name(&self) -> &str {
        "say"
    }

    async fn call(&self, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Result<Value, ToolError> {
        let value = args.first().or_else(|| kwarg(&kwargs, "text")).cloned().unwrap_or(Value::str(""));
        let text = render_message(&value);
        self.dispatcher.send_message(&text, false).await?;
        Ok(Value::Done)
    }
}

const MESSAGE_CAP: usize = 20_000;

fn render_message(value: &Value) -> String {
    let text = match value {
        Value::Str(s) => s.clone(),
        other => other.repr(),
    };
    if text.chars().count() <= MESSAGE_CAP {
        text
    } else {
        let truncated: String = text.chars().take(MESSAGE_CAP).collect();
        format!("{truncated}\n... [truncated, {} characters total]", text.chars().count())
    }
}

/// `ask(question, options=None)` — interactive-only; bound into the
/// namespace only when the session isn't headless.
#[derive(Debug)]
struct AskFn {
    dispatcher: Rc<Dispatcher>,
    output: Rc<RefCell<OutputCapture>>,
}

#[async_trait::async_trait(?Send)]
impl NativeFn for AskFn {
    fn name(&self) -> &str {
        "ask"
    }

    async fn call(&self, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Result<Value, ToolError> {
        let question = match args.first().or_else(|| kwarg(&kwargs, "question")) {
            Some(Value::Str(s)) => s.clone(),
            Some(other) => other.repr(),
            None => String::new(),
        };
        let answer = self.dispatcher.ask_user(&question).await?;
        self.output.borrow_mut().writeln(&format!("[User response: {answer}]"));
        Ok(Value::str(answer))
    }
}

/// `reset_repl()` — in the original this clears and rebuilds the whole
/// namespace in place; here that's the host's `reset` envelope's job
/// (spec.md §4.6), since only the owner of the `Interp` can clear its
/// scopes. This builtin is the script-callable confirmation alias the
/// original also exposes mid-script.
#[derive(Debug)]
struct ResetRepl {
    output: Rc<RefCell<OutputCapture>>,
}

#[async_trait::async_trait(?Send)]
impl NativeFn for ResetRepl {
    fn name(&self) -> &str {
        "reset_repl"
    }

    async fn call(&self, _args: Vec<Value>, _kwargs: Vec<(String, Value)>) -> Result<Value, ToolError> {
        self.output.borrow_mut().writeln("REPL reset: namespace cleared, tools re-registered.");
        Ok(Value::Done)
    }
}

#[cfg(test)]
mod mem_tests {
    use super::*;

    fn entries_of(value: &Value) -> Vec<(String, Value)> {
        let Value::Map(entries) = value else { panic!("expected a map") };
        entries.borrow().clone()
    }

    fn find<'a>(entries: &'a [(String, Value)], name: &str) -> &'a Value {
        &entries.iter().find(|(k, _)| k == name).unwrap().1
    }

    #[tokio::test]
    async fn set_then_overwrite_stamps_current_turn_and_entry_reflects_latest_write() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let mem = Rc::new(RefCell::new(Mem::new("agent-1")));

                let ns = mem_value(mem.clone(), 7);
                let entries = entries_of(&ns);
                let Value::Native(set_fn) = find(&entries, "set") else { panic!("set must be native") };
                set_fn
                    .call(vec![Value::str("k"), Value::str("d"), Value::str("v")], vec![])
                    .await
                    .unwrap();

                let ns = mem_value(mem.clone(), 9);
                let entries = entries_of(&ns);
                let Value::Native(set_fn) = find(&entries, "set") else { panic!("set must be native") };
                set_fn
                    .call(vec![Value::str("k"), Value::str("d2"), Value::str("v2")], vec![])
                    .await
                    .unwrap();

                let Value::Native(entry_fn) = find(&entries, "entry") else { panic!("entry must be native") };
                let result = entry_fn.call(vec![Value::str("k")], vec![]).await.unwrap();
                let result_entries = entries_of(&result);
                assert_eq!(*find(&result_entries, "turn"), Value::Int(9));
                assert_eq!(*find(&result_entries, "value"), Value::str("v2"));
            })
            .await;
    }

    #[tokio::test]
    async fn set_without_value_aliases_description() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let mem = Rc::new(RefCell::new(Mem::new("agent-1")));
                let ns = mem_value(mem, 1);
                let entries = entries_of(&ns);

                let Value::Native(set_fn) = find(&entries, "set") else { panic!("set must be native") };
                set_fn.call(vec![Value::str("k"), Value::str("d")], vec![]).await.unwrap();

                let Value::Native(get_fn) = find(&entries, "get") else { panic!("get must be native") };
                let value = get_fn.call(vec![Value::str("k")], vec![]).await.unwrap();
                assert_eq!(value, Value::str("d"));
            })
            .await;
    }

    #[tokio::test]
    async fn missing_entry_is_null_and_delete_reports_whether_it_existed() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let mem = Rc::new(RefCell::new(Mem::new("agent-1")));
                let ns = mem_value(mem, 1);
                let entries = entries_of(&ns);

                let Value::Native(entry_fn) = find(&entries, "entry") else { panic!("entry must be native") };
                assert_eq!(entry_fn.call(vec![Value::str("missing")], vec![]).await.unwrap(), Value::Null);

                let Value::Native(delete_fn) = find(&entries, "delete") else { panic!("delete must be native") };
                assert_eq!(delete_fn.call(vec![Value::str("missing")], vec![]).await.unwrap(), Value::Bool(false));

                let Value::Native(set_fn) = find(&entries, "set") else { panic!("set must be native") };
                set_fn.call(vec![Value::str("k"), Value::str("d"), Value::str("v")], vec![]).await.unwrap();
                assert_eq!(delete_fn.call(vec![Value::str("k")], vec![]).await.unwrap(), Value::Bool(true));
            })
            .await;
    }
}
