//! In-process bridge between the script runtime and the host loop.
//!
//! The bridge is the one seam where the script runtime crosses into
//! host-controlled I/O: emitting a progress/final message, invoking a
//! tool, or asking the user a question. All three are request/response
//! pairs carried over channels rather than direct calls, so the host
//! loop — stdin/stdout, a test harness, any future transport — never
//! needs to be generic over the script runtime's internals.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, Semaphore};

use arc_domain::Error;


/// A message sent from the script runtime to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostMessage {
    /// Non-terminal progress output; does not end the turn.
    Say { agent_id: String, text: String },
    /// The turn's terminal response.
    Final { agent_id: String, text: String },
    /// A tool invocation the host must execute and answer.
    ToolRequest {
        request_id: String,
        agent_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },
    /// A question for the human operator, mid-turn.
    AskUser {
        request_id: String,
        agent_id: String,
        prompt: String,
    },
}

/// The host's answer to a request-shaped `HostMessage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostResponse {
    pub request_id: String,
    pub success: bool,
    pub value: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The seam the script runtime calls through. Implementations own
/// whatever transport actually connects to the host process.
#[async_trait]
pub trait Bridge: Send + Sync {
    /// Emit a `say` (non-terminal) or `final` (terminal) message.
    async fn send_message(&self, agent_id: &str, text: &str, terminal: bool) -> arc_domain::Result<()>;

    /// Invoke a host-defined tool and await its result.
    async fn invoke_tool(
        &self,
        agent_id: &str,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> arc_domain::Result<serde_json::Value>;

    /// Ask the user a question mid-turn and await their answer.
    async fn ask_user(&self, agent_id: &str, prompt: &str) -> arc_domain::Result<String>;
}

type PendingMap = Mutex<std::collections::HashMap<String, oneshot::Sender<HostResponse>>>;

/// `Bridge` implementation backed by an outbound `mpsc` channel (script
/// runtime → host) and a pending-request table of `oneshot` senders
/// (host → script runtime), matching the request/response shape of a
/// remote transport but over in-process channels: the bridge connects
/// two halves of one process rather than a gateway and a remote node.
pub struct ChannelBridge {
    outbound: mpsc::Sender<HostMessage>,
    pending: Arc<PendingMap>,
    /// Bounds the number of tool calls in flight at once.
    permits: Arc<Semaphore>,
}

impl ChannelBridge {
    /// `workers` bounds concurrent in-flight `invoke_tool`/`ask_user`
    /// calls.
    pub fn new(outbound: mpsc::Sender<HostMessage>, workers: usize) -> Self {
        Self {
            outbound,
            pending: Arc::new(Mutex::new(std::collections::HashMap::new())),
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Called by the host loop when a `HostResponse` arrives for a
    /// request this bridge issued. Unknown or already-resolved
    /// `request_id`s are silently dropped (the waiter may have been
    /// cancelled).
    pub fn deliver(&self, response: HostResponse) {
        if let Some(tx) = self.pending.lock().remove(&response.request_id) {
            let _ = tx.send(response);
        } else {
            tracing::warn!(request_id = %response.request_id, "dropping response for unknown or already-resolved request");
        }
    }

    async fn round_trip(
        &self,
        message: HostMessage,
        request_id: String,
    ) -> arc_domain::Result<HostResponse> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| Error::Bridge(e.to_string()))?;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id.clone(), tx);
        if self.outbound.send(message).await.is_err() {
            self.pending.lock().remove(&request_id);
            return Err(Error::Bridge("host channel closed".into()));
        }
        rx.await
            .map_err(|_| Error::Bridge("host dropped pending request".into()))
    }
}

#[async_trait]
impl Bridge for ChannelBridge {
    async fn send_message(&self, agent_id: &str, text: &str, terminal: bool) -> arc_domain::Result<()> {
        let message = if terminal {
            HostMessage::Final {
                agent_id: agent_id.to_string(),
                text: text.to_string(),
            }
        } else {
            HostMessage::Say {
                agent_id: agent_id.to_string(),
                text: text.to_string(),
            }
        };
        self.outbound
            .send(message)
            .await
            .map_err(|_| Error::Bridge("host channel closed".into()))
    }

    async fn invoke_tool(
        &self,
        agent_id: &str,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> arc_domain::Result<serde_json::Value> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let message = HostMessage::ToolRequest {
            request_id: request_id.clone(),
            agent_id: agent_id.to_string(),
            tool_name: tool_name.to_string(),
            arguments,
        };
        let response = self.round_trip(message, request_id).await?;
        if response.success {
            Ok(response.value)
        } else {
            Err(Error::Bridge(
                response.error.unwrap_or_else(|| "tool call failed".into()),
            ))
        }
    }

    async fn ask_user(&self, agent_id: &str, prompt: &str) -> arc_domain::Result<String> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let message = HostMessage::AskUser {
            request_id: request_id.clone(),
            agent_id: agent_id.to_string(),
            prompt: prompt.to_string(),
        };
        let response = self.round_trip(message, request_id).await?;
        if response.success {
            Ok(response
                .value
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| response.value.to_string()))
        } else {
            Err(Error::Bridge(
                response.error.unwrap_or_else(|| "ask_user failed".into()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invoke_tool_round_trips_success() {
        let (tx, mut rx) = mpsc::channel(8);
        let bridge = Arc::new(ChannelBridge::new(tx, 4));

        let bridge2 = bridge.clone();
        let handle = tokio::spawn(async move {
            bridge2
                .invoke_tool("agent-1", "read_file", serde_json::json!({"path": "a.rs"}))
                .await
        });

        let HostMessage::ToolRequest { request_id, .. } = rx.recv().await.unwrap() else {
            panic!("expected ToolRequest");
        };
        bridge.deliver(HostResponse {
            request_id,
            success: true,
            value: serde_json::json!("contents"),
            error: None,
        });

        let result = handle.await.unwrap().unwrap();
        assert_eq!(result, serde_json::json!("contents"));
    }

    #[tokio::test]
    async fn invoke_tool_propagates_host_error() {
        let (tx, mut rx) = mpsc::channel(8);
        let bridge = Arc::new(ChannelBridge::new(tx, 4));

        let bridge2 = bridge.clone();
        let handle = tokio::spawn(async move {
            bridge2.invoke_tool("agent-1", "glob", serde_json::json!({})).await
        });

        let HostMessage::ToolRequest { request_id, .. } = rx.recv().await.unwrap() else {
            panic!("expected ToolRequest");
        };
        bridge.deliver(HostResponse {
            request_id,
            success: false,
            value: serde_json::Value::Null,
            error: Some("no such path".into()),
        });

        let err = handle.await.unwrap().unwrap_err();
        assert!(err.to_string().contains("no such path"));
    }

    #[tokio::test]
    async fn deliver_for_unknown_request_id_is_a_noop() {
        let (tx, _rx) = mpsc::channel(8);
        let bridge = ChannelBridge::new(tx, 4);
        bridge.deliver(HostResponse {
            request_id: "nonexistent".into(),
            success: true,
            value: serde_json::Value::Null,
            error: None,
        });
    }
}
