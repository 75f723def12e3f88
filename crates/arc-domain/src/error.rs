/// Shared error type used across all Agent REPL Core crates.
///
/// This is the host-facing error type (I/O, JSON, config, bridge
/// transport). Script-level failures — parse errors, exec errors, tool
/// errors — are never represented as this type; per the error-handling
/// design they are captured as data on the `Turn` (or as a `ToolError`
/// value inside the script) rather than propagated as `Result::Err`,
/// because a failing statement must not abort the host process.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("bridge: {0}")]
    Bridge(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
