//! Turn history: an append-only, bounded record of what happened in a
//! session, with aggregation and ranked search over past turns.

use std::collections::{BTreeSet, VecDeque};

use arc_domain::{Error, ToolCall, ToolKind, Turn};
use arc_search::{Document, SearchMode};
use serde::{Deserialize, Serialize};

/// Turns beyond this count are evicted oldest-first; a session that runs
/// long does not grow unbounded memory.
pub const MAX_TURNS: usize = 2000;

/// Aggregate view over the whole retained history window.
#[derive(Debug, Clone, Serialize)]
pub struct HistorySummary {
    pub turn_count: usize,
    pub error_count: usize,
    pub files_read: BTreeSet<String>,
    pub files_written: BTreeSet<String>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    turns: Vec<Turn>,
}

/// Bounded FIFO of completed turns, with positional and ranked lookup.
pub struct TurnHistory {
    turns: VecDeque<Turn>,
    agent_id: String,
}

impl TurnHistory {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            turns: VecDeque::new(),
            agent_id: agent_id.into(),
        }
    }

    /// Append a completed turn, evicting the oldest turn first if the
    /// history is already at `MAX_TURNS`.
    pub fn append(&mut self, turn: Turn) {
        if self.turns.len() >= MAX_TURNS {
            self.turns.pop_front();
        }
        arc_domain::TraceEvent::TurnAppended {
            agent_id: self.agent_id.clone(),
            turn: turn.index,
            tool_call_count: turn.tool_calls.len(),
            had_error: turn.error.is_some(),
        }
        .emit();
        self.turns.push_back(turn);
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Lookup by position within the currently retained window (0 is the
    /// oldest still-retained turn, not necessarily turn 0 of the session).
    pub fn get(&self, position: usize) -> Option<&Turn> {
        self.turns.get(position)
    }

    /// Lookup by the turn's own `index` field, which is monotonic for the
    /// whole session even across eviction.
    pub fn get_by_index(&self, index: u64) -> Option<&Turn> {
        self.turns.iter().find(|t| t.index == index)
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn files_read(&self) -> BTreeSet<String> {
        self.turns.iter().flat_map(Turn::files_read).collect()
    }

    pub fn files_written(&self) -> BTreeSet<String> {
        self.turns.iter().flat_map(Turn::files_written).collect()
    }

    /// `(turn_index, error_message)` pairs for every turn that ended in
    /// an error, oldest first.
    pub fn errors(&self) -> Vec<(u64, &str)> {
        self.turns
            .iter()
            .filter_map(|t| t.error.as_deref().map(|e| (t.index, e)))
            .collect()
    }

    pub fn user_messages(&self) -> Vec<&str> {
        self.turns.iter().map(|t| t.user_message.as_str()).collect()
    }

    pub fn summary(&self) -> HistorySummary {
        HistorySummary {
            turn_count: self.turns.len(),
            error_count: self.turns.iter().filter(|t| t.error.is_some()).count(),
            files_read: self.files_read(),
            files_written: self.files_written(),
        }
    }

    /// All tool calls across retained turns matching `predicate`.
    pub fn tool_calls(&self, predicate: impl Fn(&ToolKind) -> bool) -> Vec<&ToolCall> {
        self.turns
            .iter()
            .flat_map(|t| t.tool_calls.iter())
            .filter(|tc| predicate(&tc.tool))
            .collect()
    }

    /// Ranked search over turns. `fields`, when present, restricts which
    /// of `user_message`/`code`/`prose`/`output`/`tool_calls` participate
    /// in scoring; `regex_filter` is a conjunctive post-filter applied in
    /// every mode.
    pub fn find(
        &self,
        query: &str,
        mode: SearchMode,
        limit: usize,
        fields: Option<&[String]>,
        regex_filter: Option<&str>,
    ) -> Vec<&Turn> {
        let docs: Vec<TurnDoc<'_>> = self.turns.iter().map(|t| TurnDoc::new(t, fields)).collect();
        arc_search::search(&docs, query, mode, limit, regex_filter)
            .into_iter()
            .filter_map(|hit| self.turns.get(hit.index))
            .collect()
    }

    /// Serialize the retained window for sub-agent inheritance or later
    /// restore; round-trips through `load`.
    pub fn serialize(&self) -> arc_domain::Result<Vec<u8>> {
        let snapshot = Snapshot {
            turns: self.turns.iter().cloned().collect(),
        };
        serde_json::to_vec(&snapshot).map_err(Error::Json)
    }

    pub fn load(agent_id: impl Into<String>, bytes: &[u8]) -> arc_domain::Result<Self> {
        let snapshot: Snapshot = serde_json::from_slice(bytes).map_err(Error::Json)?;
        Ok(Self {
            turns: snapshot.turns.into(),
            agent_id: agent_id.into(),
        })
    }
}

struct TurnDoc<'a> {
    turn: &'a Turn,
    tool_call_text: String,
    fields: Option<&'a [String]>,
}

impl<'a> TurnDoc<'a> {
    fn new(turn: &'a Turn, fields: Option<&'a [String]>) -> Self {
        let tool_call_text = turn
            .tool_calls
            .iter()
            .map(|tc| format!("{:?}", tc.tool))
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            turn,
            tool_call_text,
            fields,
        }
    }
}

impl<'a> Document for TurnDoc<'a> {
    fn fields(&self) -> Vec<(&str, &str, f32)> {
        let all = vec![
            ("user_message", self.turn.user_message.as_str(), 3.5),
            ("code", self.turn.code.as_str(), 2.8),
            ("prose", self.turn.prose.as_str(), 1.5),
            ("output", self.turn.output.as_str(), 1.0),
            ("tool_calls", self.tool_call_text.as_str(), 1.2),
        ];
        match self.fields {
            Some(allowed) => all.into_iter().filter(|(name, _, _)| allowed.iter().any(|a| a == name)).collect(),
            None => all,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(index: u64, user_message: &str) -> Turn {
        Turn {
            index,
            user_message: user_message.to_string(),
            prose: String::new(),
            code: String::new(),
            output: String::new(),
            error: None,
            tool_calls: Vec::new(),
        }
    }

    #[test]
    fn append_evicts_oldest_beyond_cap() {
        let mut history = TurnHistory::new("agent-1");
        for i in 0..(MAX_TURNS as u64 + 5) {
            history.append(turn(i, "msg"));
        }
        assert_eq!(history.len(), MAX_TURNS);
        assert_eq!(history.get(0).unwrap().index, 5);
        assert_eq!(history.last().unwrap().index, MAX_TURNS as u64 + 4);
    }

    #[test]
    fn get_by_index_survives_eviction() {
        let mut history = TurnHistory::new("agent-1");
        for i in 0..3 {
            history.append(turn(i, "msg"));
        }
        assert!(history.get_by_index(1).is_some());
        assert!(history.get_by_index(99).is_none());
    }

    #[test]
    fn errors_collects_only_failed_turns() {
        let mut history = TurnHistory::new("agent-1");
        history.append(turn(0, "ok"));
        let mut failed = turn(1, "bad");
        failed.error = Some("boom".into());
        history.append(failed);

        let errors = history.errors();
        assert_eq!(errors, vec![(1, "boom")]);
    }

    #[test]
    fn find_ranks_by_user_message_relevance() {
        let mut history = TurnHistory::new("agent-1");
        history.append(turn(0, "please fix the parser"));
        history.append(turn(1, "unrelated cleanup"));

        let hits = history.find("parser", SearchMode::Hybrid, 10, None, None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].index, 0);
    }

    #[test]
    fn find_respects_fields_restriction() {
        let mut history = TurnHistory::new("agent-1");
        let mut turn_with_output_only = turn(0, "unrelated message");
        turn_with_output_only.output = "parser crashed here".to_string();
        history.append(turn_with_output_only);

        let restricted = history.find("parser", SearchMode::Hybrid, 10, Some(&["user_message".to_string()]), None);
        assert!(restricted.is_empty());

        let unrestricted = history.find("parser", SearchMode::Hybrid, 10, None, None);
        assert_eq!(unrestricted.len(), 1);
    }

    #[test]
    fn serialize_and_load_round_trips() {
        let mut history = TurnHistory::new("agent-1");
        history.append(turn(0, "hello"));
        history.append(turn(1, "world"));

        let bytes = history.serialize().unwrap();
        let restored = TurnHistory::load("agent-2", &bytes).unwrap();

        assert_eq!(restored.len(), 2);
        assert_eq!(restored.get(1).unwrap().user_message, "world");
    }
}
