//! Tool registry: turns a host-supplied `ToolDef` catalogue into the
//! script namespace a turn runs against — proxies bound onto `T`,
//! `inject_into_prompt` tools additionally bound as bare globals, and
//! the handful of always-present builtins. Mirrors the original's
//! `_register_tools`/`make_fn`, generalised to Rust's `NativeFn`/
//! `HandleObj` seams instead of Python closures and `__getattr__`.

pub mod dispatch;
pub mod handles;
pub mod namespace;
pub mod proxy;

pub use dispatch::{hydrate, json_to_value, value_to_json, Dispatcher};
pub use handles::{skill_summary_value, skill_value, task_value, AgentHandle, ShellHandle};
pub use namespace::{build, RegisteredNamespace, RegistryConfig};
pub use proxy::{map_args, schema_to_json, AgentCallProxy, ClaimTaskProxy, ExitPlanModeProxy, ToolProxy};

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    use arc_bridge::Bridge;
    use arc_domain::ToolDef;
    use arc_history::TurnHistory;
    use arc_memory::Mem;
    use arc_script::capture::OutputCapture;
    use arc_script::Value;

    use super::*;

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
                    "id": arguments.get("id").cloned().unwrap_or(serde_json::json!("t1")),
                    "subject": "x",
                    "status": "in_progress",
                }));
            }
            Ok(serde_json::json!({"echo": arguments}))
        }

        async fn ask_user(&self, _agent_id: &str, _prompt: &str) -> arc_domain::Result<String> {
            Ok("Execute plan".to_string())
        }
    }

    fn test_config() -> RegistryConfig {
        let dispatcher = Rc::new(Dispatcher::new(Arc::new(FakeBridge), "agent-1"));
        RegistryConfig {
            dispatcher,
            headless: false,
            history: Rc::new(RefCell::new(TurnHistory::new("agent-1"))),
            mem: Rc::new(RefCell::new(Mem::new("agent-1"))),
            turn_index: 0,
        }
    }

    fn sample_defs() -> Vec<ToolDef> {
        vec![
            ToolDef {
                name: "read_file".to_string(),
                description: "read a file".to_string(),
                params: vec![],
                returns: "str".to_string(),
                examples: String::new(),
                hidden: false,
                inject_into_prompt: false,
            },
            ToolDef {
                name: "claim_task".to_string(),
                description: String::new(),
                params: vec![],
                returns: "any".to_string(),
                examples: String::new(),
                hidden: false,
                inject_into_prompt: false,
            },
            ToolDef {
                name: "secret_internal".to_string(),
                description: String::new(),
                params: vec![],
                returns: "any".to_string(),
                examples: String::new(),
                hidden: true,
                inject_into_prompt: false,
            },
        ]
    }

    #[tokio::test]
    async fn hidden_tools_are_never_bound_onto_t() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let config = test_config();
                let defs = sample_defs();
                let output = Rc::new(RefCell::new(OutputCapture::new()));
                let ns = build(&defs, &config, output);
                let t = ns.globals.iter().find(|(name, _)| name == "T").unwrap().1.clone();
                let Value::Map(entries) = t else { panic!("T must be a map") };
                assert!(entries.borrow().iter().any(|(k, _)| k == "read_file"));
                assert!(!entries.borrow().iter().any(|(k, _)| k == "secret_internal"));
            })
            .await;
    }

    #[tokio::test]
    async fn claim_task_proxy_fills_owner_from_dispatcher() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let config = test_config();
                let proxy = ClaimTaskProxy::new(config.dispatcher.clone());
                use arc_script::NativeFn;
                let result = proxy.call(vec![], vec![]).await.unwrap();
                let Value::Map(entries) = result else { panic!("expected a task map") };
                assert!(entries.borrow().iter().any(|(k, v)| k == "id" && *v == Value::str("t1")));
            })
            .await;
    }
}
