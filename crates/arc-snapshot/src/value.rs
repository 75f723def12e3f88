use serde::{Deserialize, Serialize};

/// The stable, explicit allow-list of snapshot-serialisable value kinds.
/// A script runtime's own value type converts into and out of this one
/// (see `Snapshotable`); anything that doesn't fit — closures, open
/// handles — has no variant here and so cannot round-trip, by
/// construction rather than by reflection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SnapshotValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<SnapshotValue>),
    Map(Vec<(String, SnapshotValue)>),
}
