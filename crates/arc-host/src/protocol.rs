//! Wire types for the newline-delimited-JSON protocol of spec.md §6.
//!
//! spec.md's envelope list names `init`/`exec`/`snapshot`/`restore`/
//! `reset`/`shutdown` inbound and `ready`/`message`/`exec_result`/
//! `snapshot_result`/`reset_result` outbound, but is silent on how a
//! `tool_request`/`ask_user` round trip initiated by the runtime is
//! answered, and names no confirmation frame for `restore` even though
//! `snapshot` gets one. Both are resolved here (and recorded in
//! DESIGN.md): a `tool_response` inbound variant answers any pending
//! `tool_request`/`ask_user`, keyed by the same `request_id`; a
//! `restore_result` outbound frame mirrors `snapshot_result`'s shape.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    Init {
        tools: serde_json::Value,
        agent_id: String,
        #[serde(default)]
        headless: bool,
    },
    Exec {
        id: String,
        code: String,
    },
    Snapshot {
        id: String,
    },
    Restore {
        id: String,
        data: String,
    },
    Reset {
        id: String,
    },
    ToolResponse {
        request_id: String,
        success: bool,
        #[serde(default)]
        value: serde_json::Value,
        #[serde(default)]
        error: Option<String>,
    },
    Shutdown,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Ready,
    Message {
        text: String,
        kind: MessageKind,
    },
    ToolRequest {
        request_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },
    AskUser {
        request_id: String,
        prompt: String,
    },
    ExecResult {
        id: String,
        output: String,
        /// Always empty — a vestige of the wire schema this protocol
        /// mirrors (spec.md §6); nothing in this implementation writes
        /// to it.
        response: String,
        error: Option<String>,
    },
    SnapshotResult {
        id: String,
        data: String,
    },
    RestoreResult {
        id: String,
    },
    ResetResult {
        id: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Final,
    Say,
    #[allow(dead_code)]
    Progress,
}
