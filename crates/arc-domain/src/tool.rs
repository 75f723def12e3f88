use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Recognised tool kinds used to derive `files_read`/`files_written` on a
/// turn. Anything not named here is `Other`, carrying the original tool
/// name so provenance isn't lost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name")]
pub enum ToolKind {
    ReadFile,
    Glob,
    Grep,
    WriteFile,
    EditFile,
    FindReplace,
    DiffFile,
    Other(String),
}

impl ToolKind {
    /// Classify a tool name into its `ToolKind`.
    pub fn classify(name: &str) -> Self {
        match name {
            "read_file" => ToolKind::ReadFile,
            "glob" => ToolKind::Glob,
            "grep" => ToolKind::Grep,
            "write_file" => ToolKind::WriteFile,
            "edit_file" => ToolKind::EditFile,
            "find_replace" => ToolKind::FindReplace,
            "diff_file" => ToolKind::DiffFile,
            other => ToolKind::Other(other.to_string()),
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, ToolKind::ReadFile | ToolKind::Glob | ToolKind::Grep)
    }

    pub fn is_write(&self) -> bool {
        matches!(
            self,
            ToolKind::WriteFile | ToolKind::EditFile | ToolKind::FindReplace | ToolKind::DiffFile
        )
    }
}

/// One tool invocation recorded against a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: ToolKind,
    pub args: serde_json::Map<String, serde_json::Value>,
    pub result: serde_json::Value,
    pub success: bool,
    pub duration_ms: u64,
}

impl ToolCall {
    /// The `path` argument, if this call's kind reads/writes a single path.
    pub fn path_arg(&self) -> Option<&str> {
        self.args.get("path").and_then(|v| v.as_str())
    }
}

/// One exec cycle: script block in, captured output and terminal frame
/// out. Created by the host after a turn completes and appended to
/// history; immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub index: u64,
    pub user_message: String,
    #[serde(default)]
    pub prose: String,
    pub code: String,
    pub output: String,
    pub error: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

impl Turn {
    pub fn files_read(&self) -> BTreeSet<String> {
        self.tool_calls
            .iter()
            .filter(|tc| tc.tool.is_read())
            .filter_map(|tc| tc.path_arg().map(str::to_owned))
            .collect()
    }

    pub fn files_written(&self) -> BTreeSet<String> {
        self.tool_calls
            .iter()
            .filter(|tc| tc.tool.is_write())
            .filter_map(|tc| tc.path_arg().map(str::to_owned))
            .collect()
    }
}

/// A single key/value memory entry. `value` is always the stringified
/// form of whatever was stored; `turn` is the session's turn counter at
/// the time of the write and never decreases for the same key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemEntry {
    pub key: String,
    pub description: String,
    pub value: String,
    pub turn: u64,
}

/// A single declared parameter on a `ToolDef`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParam {
    pub name: String,
    #[serde(default = "default_param_type")]
    pub r#type: String,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub description: String,
}

fn default_param_type() -> String {
    "any".to_string()
}

fn default_true() -> bool {
    true
}

/// A tool's process-wide descriptor, as supplied by the host at session
/// init. Frozen for the lifetime of the process (a `reset` re-reads the
/// same JSON blob rather than re-deriving it).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub params: Vec<ToolParam>,
    #[serde(default = "default_param_type")]
    pub returns: String,
    #[serde(default)]
    pub examples: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub inject_into_prompt: bool,
}

/// A task in the task management system. Hydrated from a tool result
/// carrying `__type__ == "task"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub subject: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_pending")]
    pub status: String,
    #[serde(default = "default_priority")]
    pub priority: String,
    #[serde(default)]
    pub blocks: Vec<String>,
    #[serde(default)]
    pub blocked_by: Vec<String>,
}

fn default_pending() -> String {
    "pending".to_string()
}

fn default_priority() -> String {
    "medium".to_string()
}

impl Task {
    pub fn status_symbol(&self) -> &'static str {
        match self.status.as_str() {
            "pending" => "\u{25cb}",
            "in_progress" => "~",
            "completed" => "\u{2713}",
            "cancelled" => "\u{2717}",
            _ => "?",
        }
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "[{} {}] {}  ({}, {})",
            self.status_symbol(),
            self.status,
            self.subject,
            self.id,
            self.priority
        )?;
        if !self.description.is_empty() {
            writeln!(f, "  {}", self.description)?;
        }
        if !self.blocked_by.is_empty() {
            writeln!(f, "  blocked_by: {}", self.blocked_by.join(", "))?;
        }
        if !self.blocks.is_empty() {
            writeln!(f, "  blocks: {}", self.blocks.join(", "))?;
        }
        Ok(())
    }
}

/// A skill's full documentation, hydrated from `__type__ == "skill"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    pub description: String,
    pub doc: String,
}

/// A skill's catalogue entry, hydrated from `__type__ == "skill_summary"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillSummary {
    pub name: String,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_known_read_kinds() {
        assert!(ToolKind::classify("read_file").is_read());
        assert!(ToolKind::classify("glob").is_read());
        assert!(ToolKind::classify("grep").is_read());
        assert!(!ToolKind::classify("read_file").is_write());
    }

    #[test]
    fn classify_known_write_kinds() {
        for name in ["write_file", "edit_file", "find_replace", "diff_file"] {
            assert!(ToolKind::classify(name).is_write(), "{name}");
        }
    }

    #[test]
    fn classify_unknown_is_other() {
        match ToolKind::classify("shell") {
            ToolKind::Other(n) => assert_eq!(n, "shell"),
            other => panic!("expected Other, got {other:?}"),
        }
    }

    fn tc(tool: ToolKind, path: &str) -> ToolCall {
        let mut args = serde_json::Map::new();
        args.insert("path".into(), serde_json::json!(path));
        ToolCall {
            tool,
            args,
            result: serde_json::Value::Null,
            success: true,
            duration_ms: 1,
        }
    }

    #[test]
    fn turn_derives_files_read_and_written() {
        let turn = Turn {
            index: 0,
            user_message: "x".into(),
            prose: String::new(),
            code: String::new(),
            output: String::new(),
            error: None,
            tool_calls: vec![
                tc(ToolKind::ReadFile, "a.rs"),
                tc(ToolKind::WriteFile, "b.rs"),
                tc(ToolKind::Grep, "a.rs"),
            ],
        };
        assert_eq!(turn.files_read(), BTreeSet::from(["a.rs".to_string()]));
        assert_eq!(turn.files_written(), BTreeSet::from(["b.rs".to_string()]));
    }
}
