//! Session controller (C11): the single owner that wires the bridge,
//! tool registry, history, and memory together and threads them through
//! one turn at a time, replacing the original's process-global agent
//! id/headless flag/namespace with explicit fields on one struct
//! (spec.md §9, "Cyclic & global state").
//!
//! `Session` does not itself speak the host's wire protocol (that's
//! `arc-host`'s job) — it exposes the four operations the protocol
//! dispatches to: `exec`, `snapshot`, `restore`, `reset`.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;
use std::cell::RefCell;

use arc_bridge::Bridge;
use arc_domain::{ToolDef, Turn};
use arc_history::TurnHistory;
use arc_memory::Mem;
use arc_registry::{Dispatcher, RegistryConfig};
use arc_script::{Interp, Value};

/// Names every turn's namespace carries that are not user bindings:
/// the registry's own globals, plus the two builtins `Interp::new`
/// seeds directly. Never persisted into `Session::namespace` and never
/// candidates for `snapshot`.
fn is_user_binding(name: &str, registered_names: &HashSet<String>) -> bool {
    !name.starts_with('_') && !registered_names.contains(name) && name != "print" && name != "raise"
}

/// One agent's running REPL: persisted user namespace, turn history,
/// and key/value memory, plus the fixed (for the session's lifetime)
/// tool catalogue and dispatcher.
pub struct Session {
    agent_id: String,
    headless: bool,
    dispatcher: Rc<Dispatcher>,
    defs: Vec<ToolDef>,
    history: Rc<RefCell<TurnHistory>>,
    mem: Rc<RefCell<Mem>>,
    namespace: HashMap<String, Value>,
    next_turn: u64,
}

impl Session {
    pub fn new(bridge: Arc<dyn Bridge>, agent_id: impl Into<String>, headless: bool, defs: Vec<ToolDef>) -> Self {
        let agent_id = agent_id.into();
        let dispatcher = Rc::new(Dispatcher::new(bridge, agent_id.clone()));
        let history = Rc::new(RefCell::new(TurnHistory::new(agent_id.clone())));
        let mem = Rc::new(RefCell::new(Mem::new(agent_id.clone())));
        Self {
            agent_id,
            headless,
            dispatcher,
            defs,
            history,
            mem,
            namespace: HashMap::new(),
            next_turn: 0,
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn history(&self) -> &Rc<RefCell<TurnHistory>> {
        &self.history
    }

    pub fn mem(&self) -> &Rc<RefCell<Mem>> {
        &self.mem
    }

    /// Run one turn: compile `code`, execute it against the persisted
    /// namespace plus this turn's freshly-built registry globals, then
    /// fold namespace mutations and dispatched tool calls back in.
    /// Always appends the resulting `Turn` to history and returns it —
    /// a parse or exec error is data on the turn, never a Rust `Err`
    /// (spec.md §7: a failing turn must not abort the session).
    pub async fn exec(&mut self, code: &str) -> Turn {
        let index = self.next_turn;
        arc_domain::TraceEvent::TurnStarted {
            agent_id: self.agent_id.clone(),
            turn: index,
        }
        .emit();

        let mut interp = Interp::new(self.agent_id.clone());
        let output = interp.output_handle();
        let config = RegistryConfig {
            dispatcher: self.dispatcher.clone(),
            headless: self.headless,
            history: self.history.clone(),
            mem: self.mem.clone(),
            turn_index: index,
        };
        let registered = arc_registry::build(&self.defs, &config, output);

        let turn = match arc_script::compile(code, &registered.auto_await) {
            Err(parse_err) => Turn {
                index,
                user_message: code.to_string(),
                prose: leading_prose(code),
                code: code.to_string(),
                output: String::new(),
                error: Some(parse_err.to_string()),
                tool_calls: Vec::new(),
            },
            Ok(block) => {
                let registered_names: HashSet<String> = registered.globals.iter().map(|(n, _)| n.clone()).collect();
                for (name, value) in registered.globals {
                    interp.set_global(name, value);
                }
                interp.union_namespace(self.namespace.clone());

                let exec_error = interp.exec_block(&block).await.err();

                let namespace_view = interp.namespace_snapshot_view();
                self.namespace = namespace_view
                    .into_iter()
                    .filter(|(name, _)| is_user_binding(name, &registered_names))
                    .collect();
                let output_text = interp.finish_output();

                Turn {
                    index,
                    user_message: code.to_string(),
                    prose: leading_prose(code),
                    code: code.to_string(),
                    output: output_text,
                    error: exec_error.map(|e| e.to_string()),
                    tool_calls: self.dispatcher.take_calls(),
                }
            }
        };

        self.history.borrow_mut().append(turn.clone());
        self.next_turn += 1;
        turn
    }

    /// Hex-encoded snapshot of the persisted user namespace. Unlike the
    /// original's walk-and-skip over a live, registry-populated
    /// namespace, `self.namespace` already holds only user bindings
    /// (registry globals are filtered out at the end of every `exec`),
    /// so the skip set passed to `arc_snapshot::take` is always empty.
    pub fn snapshot(&self) -> arc_domain::Result<String> {
        let result = arc_snapshot::take(&self.agent_id, &self.namespace, &HashSet::new())?;
        Ok(result.blob)
    }

    /// Unions a snapshot blob into the persisted namespace, overwriting
    /// any existing bindings with the same name.
    pub fn restore(&mut self, blob: &str) -> arc_domain::Result<()> {
        let restored: HashMap<String, Value> = arc_snapshot::restore(&self.agent_id, blob)?;
        self.namespace.extend(restored);
        Ok(())
    }

    /// Clears the persisted user namespace. Tool re-registration and
    /// the agent id/headless flag need no action here since `exec`
    /// already rebuilds the registry from `self.defs`/`self.agent_id`/
    /// `self.headless` fresh every turn — there is no stale state to
    /// re-derive. History and memory are untouched (spec.md §4.6
    /// describes `reset` as a namespace operation only).
    pub fn reset(&mut self) {
        self.namespace.clear();
        arc_domain::TraceEvent::SessionReset {
            agent_id: self.agent_id.clone(),
            turns_cleared: 0,
        }
        .emit();
    }

    /// Spawns a child session inheriting this one's serialized history
    /// and memory (spec.md §4.6's "sub-agent state inheritance"),
    /// truncated to `TurnHistory`'s own cap during load. `dispatcher`
    /// is the child's own, since a sub-agent talks to the host under
    /// its own agent id, not its parent's.
    pub fn spawn_child(
        &self,
        child_agent_id: impl Into<String>,
        dispatcher: Rc<Dispatcher>,
        defs: Vec<ToolDef>,
    ) -> arc_domain::Result<Session> {
        let child_agent_id = child_agent_id.into();

        let history = if self.history.borrow().is_empty() {
            TurnHistory::new(child_agent_id.clone())
        } else {
            let bytes = self.history.borrow().serialize()?;
            TurnHistory::load(child_agent_id.clone(), &bytes)?
        };
        let inherited_turns = history.len();

        let mem = if self.mem.borrow().is_empty() {
            Mem::new(child_agent_id.clone())
        } else {
            let bytes = self.mem.borrow().serialize()?;
            Mem::load(child_agent_id.clone(), &bytes)?
        };

        arc_domain::TraceEvent::SubAgentSpawned {
            parent_agent_id: self.agent_id.clone(),
            child_agent_id: child_agent_id.clone(),
            inherited_turns,
        }
        .emit();

        Ok(Session {
            agent_id: child_agent_id,
            headless: self.headless,
            dispatcher,
            defs,
            history: Rc::new(RefCell::new(history)),
            mem: Rc::new(RefCell::new(mem)),
            namespace: HashMap::new(),
            next_turn: 0,
        })
    }
}

/// The leading run of blank/`#`-comment lines at the top of a
/// submitted block, joined without the comment marker — the closest
/// analogue the wire protocol's bare `code` field has to a separate
/// natural-language preamble (spec.md §3's `prose` field; the protocol
/// in §6 carries only `code`, so this is a deliberate, documented
/// convention rather than a distinct wire field).
fn leading_prose(code: &str) -> String {
    let mut lines = Vec::new();
    for line in code.lines() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(text) = trimmed.strip_prefix('#') {
            lines.push(text.trim().to_string());
        } else {
            break;
        }
    }
    lines.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use arc_domain::ToolParam;

    #[derive(Debug)]
    struct FakeBridge;

    #[async_trait::async_trait]
    impl Bridge for FakeBridge {
        async fn send_message(&self, _agent_id: &str, _text: &str, _terminal: bool) -> arc_domain::Result<()> {
            Ok(())
        }

        async fn invoke_tool(
            &self,
            _agent_id: &str,
            tool_name: &str,
            arguments: serde_json::Value,
        ) -> arc_domain::Result<serde_json::Value> {
            if tool_name == "claim_task" {
                return Ok(serde_json::json!({
                    "__type__": "task",
                    "id": "t1",
                    "subject": arguments.get("subject").cloned().unwrap_or(serde_json::json!("x")),
                    "status": "in_progress",
                }));
            }
            Ok(serde_json::json!({"echo": arguments}))
        }

        async fn ask_user(&self, _agent_id: &str, _prompt: &str) -> arc_domain::Result<String> {
            Ok("Execute plan".to_string())
        }
    }

    fn create_task_def() -> ToolDef {
        ToolDef {
            name: "create_task".to_string(),
            description: String::new(),
            params: vec![ToolParam {
                name: "subject".to_string(),
                r#type: "str".to_string(),
                required: true,
                description: String::new(),
            }],
            returns: "any".to_string(),
            examples: String::new(),
            hidden: false,
            inject_into_prompt: true,
        }
    }

    fn session() -> Session {
        Session::new(Arc::new(FakeBridge), "agent-1", true, vec![create_task_def()])
    }

    #[tokio::test]
    async fn exec_then_respond_produces_final_message_and_clean_turn() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let mut session = session();
                let turn = session.exec("x = 1 + 2\ndone(x)").await;
                assert!(turn.error.is_none());
                assert!(turn.output.is_empty());
            })
            .await;
    }

    #[tokio::test]
    async fn namespace_persists_across_turns() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let mut session = session();
                session.exec("x = 41").await;
                let turn = session.exec("x = x + 1\nprint(x)").await;
                assert!(turn.output.contains('4'));
            })
            .await;
    }

    #[tokio::test]
    async fn parse_error_records_error_and_skips_namespace_mutation() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let mut session = session();
                let turn = session.exec("let 1 = 2;").await;
                assert!(turn.error.is_some());
                assert!(session.namespace.is_empty());
            })
            .await;
    }

    #[tokio::test]
    async fn exec_error_halts_block_but_keeps_prior_output() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let mut session = session();
                let turn = session.exec("print('a')\nraise('boom')\nprint('b')").await;
                assert!(turn.output.contains('a'));
                assert!(!turn.output.contains('b'));
                assert!(turn.error.is_some());
            })
            .await;
    }

    #[tokio::test]
    async fn snapshot_then_restore_round_trips_user_namespace() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let mut session = session();
                session.exec("x = 7\nname = 'arc'").await;
                let blob = session.snapshot().unwrap();

                let mut restored = session();
                restored.restore(&blob).unwrap();
                let turn = restored.exec("print(x)\nprint(name)").await;
                assert!(turn.output.contains('7'));
                assert!(turn.output.contains("arc"));
            })
            .await;
    }

    #[tokio::test]
    async fn reset_clears_namespace_only() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let mut session = session();
                session.exec("x = 1").await;
                session.exec("done(1)").await;
                session.reset();
                assert!(session.namespace.is_empty());
                assert_eq!(session.history.borrow().len(), 2);
            })
            .await;
    }

    #[tokio::test]
    async fn spawn_child_inherits_parent_history_and_memory() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let mut parent = session();
                parent.exec("done(1)").await;
                parent.mem.borrow_mut().set("k", "d", "v", 0);

                let child_dispatcher = Rc::new(Dispatcher::new(Arc::new(FakeBridge), "agent-2"));
                let child = parent.spawn_child("agent-2", child_dispatcher, vec![create_task_def()]).unwrap();

                assert_eq!(child.history.borrow().len(), parent.history.borrow().len());
                assert_eq!(child.mem.borrow().len(), parent.mem.borrow().len());
            })
            .await;
    }
}
