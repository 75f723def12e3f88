mod cli;
mod protocol;

use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use arc_bridge::{Bridge, ChannelBridge, HostMessage, HostResponse};
use arc_domain::ToolDef;
use arc_session::Session;

use crate::cli::Cli;
use crate::protocol::{Inbound, MessageKind, Outbound};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let local = tokio::task::LocalSet::new();
    local.run_until(run(cli)).await
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,arc_host=debug")))
        .json()
        .init();
}

/// Runs the host loop until `shutdown` or stdin closes. Single-threaded
/// by design (`current_thread` runtime + a `LocalSet`): `Session` and
/// everything it owns (`arc-script`'s `!Send` namespace) only ever runs
/// on this one task.
async fn run(cli: Cli) -> anyhow::Result<()> {
    let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(256);
    let writer = tokio::task::spawn_local(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(envelope) = out_rx.recv().await {
            let Ok(mut line) = serde_json::to_string(&envelope) else {
                continue;
            };
            line.push('\n');
            if stdout.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    let (bridge_tx, mut bridge_rx) = mpsc::channel::<HostMessage>(256);
    let bridge = Arc::new(ChannelBridge::new(bridge_tx, cli.bridge_workers));

    let relay_out = out_tx.clone();
    let relay = tokio::task::spawn_local(async move {
        while let Some(message) = bridge_rx.recv().await {
            let envelope = match message {
                HostMessage::Say { text, .. } => Outbound::Message { text, kind: MessageKind::Say },
                HostMessage::Final { text, .. } => Outbound::Message { text, kind: MessageKind::Final },
                HostMessage::ToolRequest {
                    request_id,
                    tool_name,
                    arguments,
                    ..
                } => Outbound::ToolRequest { request_id, tool_name, arguments },
                HostMessage::AskUser { request_id, prompt, .. } => Outbound::AskUser { request_id, prompt },
            };
            if relay_out.send(envelope).await.is_err() {
                break;
            }
        }
    });

    let mut session: Option<Session> = None;
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let inbound: Inbound = match serde_json::from_str(&line) {
            Ok(inbound) => inbound,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed inbound line");
                continue;
            }
        };

        match inbound {
            Inbound::Init { tools, agent_id, headless } => {
                let defs: Vec<ToolDef> = serde_json::from_value(tools).unwrap_or_default();
                session = Some(Session::new(bridge.clone() as Arc<dyn Bridge>, agent_id, headless, defs));
                out_tx.send(Outbound::Ready).await.ok();
            }
            Inbound::Exec { id, code } => {
                let Some(session) = session.as_mut() else {
                    tracing::warn!("exec before init; ignoring");
                    continue;
                };
                let turn = session.exec(&code).await;
                out_tx
                    .send(Outbound::ExecResult {
                        id,
                        output: turn.output,
                        response: String::new(),
                        error: turn.error,
                    })
                    .await
                    .ok();
            }
            Inbound::Snapshot { id } => {
                let Some(session) = session.as_ref() else {
                    tracing::warn!("snapshot before init; ignoring");
                    continue;
                };
                match session.snapshot() {
                    Ok(data) => {
                        out_tx.send(Outbound::SnapshotResult { id, data }).await.ok();
                    }
                    Err(e) => tracing::error!(error = %e, "snapshot failed"),
                }
            }
            Inbound::Restore { id, data } => {
                let Some(session) = session.as_mut() else {
                    tracing::warn!("restore before init; ignoring");
                    continue;
                };
                if let Err(e) = session.restore(&data) {
                    tracing::error!(error = %e, "restore failed");
                    continue;
                }
                out_tx.send(Outbound::RestoreResult { id }).await.ok();
            }
            Inbound::Reset { id } => {
                let Some(session) = session.as_mut() else {
                    tracing::warn!("reset before init; ignoring");
                    continue;
                };
                session.reset();
                out_tx.send(Outbound::ResetResult { id }).await.ok();
            }
            Inbound::ToolResponse { request_id, success, value, error } => {
                bridge.deliver(HostResponse { request_id, success, value, error });
            }
            Inbound::Shutdown => break,
        }
    }

    // Drop every handle that keeps `bridge_rx`/`out_rx` alive before
    // awaiting the relay/writer tasks, or they'd block forever waiting
    // for a close that never comes.
    drop(session);
    drop(bridge);
    drop(out_tx);
    let _ = relay.await;
    let _ = writer.await;
    Ok(())
}
