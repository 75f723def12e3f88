use serde::Serialize;

/// Structured trace events emitted across all Agent REPL Core crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    TurnStarted {
        agent_id: String,
        turn: u64,
    },
    TurnAppended {
        agent_id: String,
        turn: u64,
        tool_call_count: usize,
        had_error: bool,
    },
    ToolDispatched {
        tool_name: String,
        duration_ms: u64,
        success: bool,
    },
    BridgeCallTimedOut {
        tool_name: String,
        timeout_ms: u64,
    },
    SearchPerformed {
        source: String,
        query: String,
        hits: usize,
    },
    MemorySet {
        key: String,
        turn: u64,
        overwrite: bool,
    },
    SnapshotTaken {
        agent_id: String,
        namespace_vars: usize,
        skipped_vars: usize,
        bytes: usize,
    },
    SnapshotRestored {
        agent_id: String,
        namespace_vars: usize,
        bytes: usize,
    },
    SessionReset {
        agent_id: String,
        turns_cleared: usize,
    },
    SubAgentSpawned {
        parent_agent_id: String,
        child_agent_id: String,
        inherited_turns: usize,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "arc_event");
    }
}
