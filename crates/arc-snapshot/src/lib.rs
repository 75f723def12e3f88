//! Namespace snapshot and restore.
//!
//! Taking a snapshot means: walk the live namespace, drop anything named
//! in the skip-set (builtins, injected helpers, registered tool names),
//! trial-convert everything else into the explicit `SnapshotValue`
//! allow-list, and binary-encode what survives. A value that has no
//! `SnapshotValue` representation — a shell handle, a closure — is
//! dropped rather than erroring the whole snapshot.

pub mod value;

use std::collections::{HashMap, HashSet};

use arc_domain::Error;
pub use value::SnapshotValue;

/// Implemented by a script runtime's own value type so this crate never
/// needs to know its shape.
pub trait Snapshotable: Sized {
    fn to_snapshot(&self) -> Option<SnapshotValue>;
    fn from_snapshot(value: SnapshotValue) -> Self;
}

#[derive(Debug, Clone)]
pub struct SnapshotResult {
    /// Hex-encoded, bincode-serialized snapshot blob.
    pub blob: String,
    pub included: usize,
    pub skipped: usize,
}

/// Take a snapshot of `namespace`, excluding any name present in `skip`.
pub fn take<T: Snapshotable>(
    agent_id: &str,
    namespace: &HashMap<String, T>,
    skip: &HashSet<String>,
) -> arc_domain::Result<SnapshotResult> {
    let mut kept: Vec<(String, SnapshotValue)> = Vec::new();
    let mut skipped = 0usize;

    for (name, value) in namespace {
        if skip.contains(name) {
            skipped += 1;
            continue;
        }
        match value.to_snapshot() {
            Some(snapshot_value) => kept.push((name.clone(), snapshot_value)),
            None => skipped += 1,
        }
    }

    let included = kept.len();
    let bytes = bincode::serialize(&kept).map_err(|e| Error::Other(e.to_string()))?;
    let blob = hex::encode(&bytes);

    arc_domain::TraceEvent::SnapshotTaken {
        agent_id: agent_id.to_string(),
        namespace_vars: included,
        skipped_vars: skipped,
        bytes: bytes.len(),
    }
    .emit();

    Ok(SnapshotResult {
        blob,
        included,
        skipped,
    })
}

/// Restore a namespace from a blob produced by `take`. The caller unions
/// the result into its live namespace; this function has no notion of
/// "live" state.
pub fn restore<T: Snapshotable>(agent_id: &str, blob: &str) -> arc_domain::Result<HashMap<String, T>> {
    let bytes = hex::decode(blob).map_err(|e| Error::Other(e.to_string()))?;
    let kept: Vec<(String, SnapshotValue)> =
        bincode::deserialize(&bytes).map_err(|e| Error::Other(e.to_string()))?;

    arc_domain::TraceEvent::SnapshotRestored {
        agent_id: agent_id.to_string(),
        namespace_vars: kept.len(),
        bytes: bytes.len(),
    }
    .emit();

    Ok(kept
        .into_iter()
        .map(|(name, value)| (name, T::from_snapshot(value)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum TestValue {
        Int(i64),
        Str(String),
        Handle, // not representable in a snapshot
    }

    impl Snapshotable for TestValue {
        fn to_snapshot(&self) -> Option<SnapshotValue> {
            match self {
                TestValue::Int(i) => Some(SnapshotValue::Int(*i)),
                TestValue::Str(s) => Some(SnapshotValue::Str(s.clone())),
                TestValue::Handle => None,
            }
        }

        fn from_snapshot(value: SnapshotValue) -> Self {
            match value {
                SnapshotValue::Int(i) => TestValue::Int(i),
                SnapshotValue::Str(s) => TestValue::Str(s),
                _ => TestValue::Handle,
            }
        }
    }

    #[test]
    fn take_then_restore_round_trips_plain_values() {
        let mut ns = HashMap::new();
        ns.insert("x".to_string(), TestValue::Int(42));
        ns.insert("name".to_string(), TestValue::Str("arc".to_string()));

        let skip = HashSet::new();
        let result = take("agent-1", &ns, &skip).unwrap();
        assert_eq!(result.included, 2);
        assert_eq!(result.skipped, 0);

        let restored: HashMap<String, TestValue> = restore("agent-1", &result.blob).unwrap();
        assert_eq!(restored.get("x"), Some(&TestValue::Int(42)));
        assert_eq!(restored.get("name"), Some(&TestValue::Str("arc".to_string())));
    }

    #[test]
    fn take_drops_unrepresentable_values() {
        let mut ns = HashMap::new();
        ns.insert("x".to_string(), TestValue::Int(1));
        ns.insert("shell".to_string(), TestValue::Handle);

        let result = take("agent-1", &ns, &HashSet::new()).unwrap();
        assert_eq!(result.included, 1);
        assert_eq!(result.skipped, 1);
    }

    #[test]
    fn take_drops_skip_set_names() {
        let mut ns = HashMap::new();
        ns.insert("x".to_string(), TestValue::Int(1));
        ns.insert("T".to_string(), TestValue::Int(2));

        let mut skip = HashSet::new();
        skip.insert("T".to_string());

        let result = take("agent-1", &ns, &skip).unwrap();
        assert_eq!(result.included, 1);
        assert_eq!(result.skipped, 1);

        let restored: HashMap<String, TestValue> = restore("agent-1", &result.blob).unwrap();
        assert!(!restored.contains_key("T"));
    }

    #[test]
    fn restore_rejects_garbage_blob() {
        let result: arc_domain::Result<HashMap<String, TestValue>> = restore("agent-1", "not-hex!!");
        assert!(result.is_err());
    }
}
