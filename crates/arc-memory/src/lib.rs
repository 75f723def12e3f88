//! Key/value memory: small, named facts a session accumulates across
//! turns, each stamped with the turn it was last written on.

use std::collections::HashMap;

use arc_domain::{Error, MemEntry};
use arc_search::Document;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
struct Snapshot {
    entries: Vec<MemEntry>,
}

/// Insertion-ordered key/value store. Overwriting a key updates its
/// value/description/turn in place without moving it in iteration order.
pub struct Mem {
    entries: Vec<MemEntry>,
    index: HashMap<String, usize>,
    agent_id: String,
}

impl Mem {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            agent_id: agent_id.into(),
        }
    }

    /// Set `key` to `value` at the given turn, overwriting any prior
    /// entry for the same key.
    pub fn set(&mut self, key: impl Into<String>, description: impl Into<String>, value: impl Into<String>, turn: u64) {
        let key = key.into();
        let overwrite = self.index.contains_key(&key);
        let entry = MemEntry {
            key: key.clone(),
            description: description.into(),
            value: value.into(),
            turn,
        };
        arc_domain::TraceEvent::MemorySet {
            key: key.clone(),
            turn,
            overwrite,
        }
        .emit();
        if let Some(&position) = self.index.get(&key) {
            self.entries[position] = entry;
        } else {
            self.index.insert(key, self.entries.len());
            self.entries.push(entry);
        }
    }

    pub fn get(&self, key: &str) -> Option<&MemEntry> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    /// Alias for `get` that reads more naturally at a call site that
    /// just wants the stored value string.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.get(key).map(|e| e.value.as_str())
    }

    pub fn delete(&mut self, key: &str) -> Option<MemEntry> {
        let position = self.index.remove(key)?;
        let removed = self.entries.remove(position);
        for index in self.index.values_mut() {
            if *index > position {
                *index -= 1;
            }
        }
        Some(removed)
    }

    pub fn all(&self) -> &[MemEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries written at or after `turn`, insertion order.
    pub fn since(&self, turn: u64) -> Vec<&MemEntry> {
        self.entries.iter().filter(|e| e.turn >= turn).collect()
    }

    /// The `n` most recently written entries, most recent first.
    pub fn recent(&self, n: usize) -> Vec<&MemEntry> {
        let mut sorted: Vec<&MemEntry> = self.entries.iter().collect();
        sorted.sort_by(|a, b| b.turn.cmp(&a.turn));
        sorted.truncate(n);
        sorted
    }

    /// Ranked search over key, description, and value text. `regex_filter`
    /// is a conjunctive post-filter applied in every mode.
    pub fn find(
        &self,
        query: &str,
        mode: arc_search::SearchMode,
        limit: usize,
        regex_filter: Option<&str>,
    ) -> Vec<&MemEntry> {
        let docs: Vec<MemDoc<'_>> = self.entries.iter().map(MemDoc).collect();
        arc_search::search(&docs, query, mode, limit, regex_filter)
            .into_iter()
            .filter_map(|hit| self.entries.get(hit.index))
            .collect()
    }

    pub fn serialize(&self) -> arc_domain::Result<Vec<u8>> {
        let snapshot = Snapshot {
            entries: self.entries.clone(),
        };
        serde_json::to_vec(&snapshot).map_err(Error::Json)
    }

    pub fn load(agent_id: impl Into<String>, bytes: &[u8]) -> arc_domain::Result<Self> {
        let snapshot: Snapshot = serde_json::from_slice(bytes).map_err(Error::Json)?;
        let mut mem = Self::new(agent_id);
        for entry in snapshot.entries {
            mem.index.insert(entry.key.clone(), mem.entries.len());
            mem.entries.push(entry);
        }
        Ok(mem)
    }
}

struct MemDoc<'a>(&'a MemEntry);

impl<'a> Document for MemDoc<'a> {
    fn fields(&self) -> Vec<(&str, &str, f32)> {
        vec![
            ("key", self.0.key.as_str(), 4.0),
            ("description", self.0.description.as_str(), 2.0),
            ("value", self.0.value.as_str(), 1.0),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arc_search::SearchMode;

    #[test]
    fn set_then_overwrite_keeps_position_and_updates_fields() {
        let mut mem = Mem::new("agent-1");
        mem.set("a", "first", "1", 0);
        mem.set("b", "second", "2", 1);
        mem.set("a", "first-updated", "11", 5);

        assert_eq!(mem.all().len(), 2);
        assert_eq!(mem.all()[0].key, "a");
        assert_eq!(mem.get("a").unwrap().value, "11");
        assert_eq!(mem.get("a").unwrap().turn, 5);
    }

    #[test]
    fn delete_removes_entry_and_reindexes() {
        let mut mem = Mem::new("agent-1");
        mem.set("a", "", "1", 0);
        mem.set("b", "", "2", 1);
        mem.set("c", "", "3", 2);

        assert!(mem.delete("a").is_some());
        assert!(mem.get("a").is_none());
        assert_eq!(mem.get("c").unwrap().value, "3");
    }

    #[test]
    fn since_filters_by_turn() {
        let mut mem = Mem::new("agent-1");
        mem.set("a", "", "1", 0);
        mem.set("b", "", "2", 3);
        mem.set("c", "", "3", 5);

        let recent = mem.since(3);
        assert_eq!(recent.len(), 2);
    }

    #[test]
    fn recent_orders_by_turn_descending() {
        let mut mem = Mem::new("agent-1");
        mem.set("a", "", "1", 0);
        mem.set("b", "", "2", 5);
        mem.set("c", "", "3", 2);

        let top = mem.recent(2);
        assert_eq!(top[0].key, "b");
        assert_eq!(top[1].key, "c");
    }

    #[test]
    fn find_ranks_by_relevance() {
        let mut mem = Mem::new("agent-1");
        mem.set("project_name", "the name of the project", "arc", 0);
        mem.set("unrelated", "something else entirely", "x", 1);

        let hits = mem.find("project", SearchMode::Hybrid, 10, None);
        assert_eq!(hits[0].key, "project_name");
    }

    #[test]
    fn serialize_and_load_round_trips() {
        let mut mem = Mem::new("agent-1");
        mem.set("a", "desc", "1", 0);
        let bytes = mem.serialize().unwrap();
        let restored = Mem::load("agent-2", &bytes).unwrap();
        assert_eq!(restored.get("a").unwrap().value, "1");
    }
}
