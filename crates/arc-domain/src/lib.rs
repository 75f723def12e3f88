pub mod error;
pub mod tool;
pub mod trace;

pub use error::{Error, Result};
pub use tool::{
    MemEntry, Skill, SkillSummary, Task, ToolCall, ToolDef, ToolKind, ToolParam, Turn,
};
pub use trace::TraceEvent;
