//! Command-line surface for the reference host binary.

use clap::Parser;

/// `arc-host` — a minimal stdin/stdout JSON host for `arc-session`.
///
/// Rich configuration (provider credentials, workspace roots, skills
/// paths) is out of scope for this core; this binary exists only to
/// make the runtime exercisable end to end over the wire protocol.
#[derive(Debug, Parser)]
#[command(name = "arc-host", version, about)]
pub struct Cli {
    /// Number of concurrent tool calls the bridge admits at once.
    #[arg(long, default_value_t = 8)]
    pub bridge_workers: usize,
}
