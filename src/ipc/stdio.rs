//! Newline-delimited JSON transport over a pair of byte streams
//!
//! The host binary runs this over its own stdin/stdout. Every invoke is
//! handled on its own task so a long `session.send` never blocks other
//! channels; replies and events share one writer.

use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::Instrument;

use super::{IpcMessage, IpcRouter, IpcSender};
use crate::tracing::{ErrorTraceExt, ResultTraceExt};

/// Upper bound for one inbound line
const MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

/// Outbound half backed by the transport's writer queue
#[derive(Debug, Clone)]
pub struct ChannelSender {
    tx: mpsc::UnboundedSender<IpcMessage>,
}

impl ChannelSender {
    /// Queue any message for the writer
    pub fn send_message(&self, message: IpcMessage) {
        if self.tx.send(message).is_err() {
            tracing::trace!("IPC writer closed, dropping message");
        }
    }
}

impl IpcSender for ChannelSender {
    fn send(&self, channel: &str, args: Vec<Value>) {
        self.send_message(IpcMessage::Event {
            channel: channel.to_string(),
            args,
        });
    }
}

/// Create the outbound queue shared by events and replies
pub fn channel() -> (ChannelSender, mpsc::UnboundedReceiver<IpcMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelSender { tx }, rx)
}

/// Serve invokes read from `reader` until it reaches EOF
///
/// Messages queued on `outbound` are written to `writer` by a background task
/// that outlives this call, so replies of in-flight invokes still go out.
pub async fn serve<R, W>(
    router: Arc<IpcRouter>,
    reader: R,
    writer: W,
    outbound: ChannelSender,
    queue: mpsc::UnboundedReceiver<IpcMessage>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(write_loop(writer, queue));

    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                tracing::warn!(max = MAX_LINE_LENGTH, "Skipping oversized IPC line");
                continue;
            }
            Err(LinesCodecError::Io(e)) => {
                tracing::error!(error = %e, "IPC input failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let Ok(message) = serde_json::from_str::<IpcMessage>(&line).trace_context() else {
            continue;
        };
        match message {
            IpcMessage::Invoke { id, channel, args } => {
                let span = tracing::info_span!("ipc_invoke", channel = %channel, id);
                let router = Arc::clone(&router);
                let outbound = outbound.clone();
                tokio::spawn(
                    async move {
                        let start = Instant::now();
                        let outcome = router.dispatch(&channel, args).await;
                        if let Err(e) = &outcome {
                            e.trace_error();
                        }
                        tracing::debug!(
                            elapsed_ms = start.elapsed().as_millis(),
                            ok = outcome.is_ok(),
                            "Invoke handled"
                        );
                        outbound.send_message(IpcMessage::reply(id, &outcome));
                    }
                    .instrument(span),
                );
            }
            other => {
                tracing::warn!(message = ?other, "Ignoring non-invoke message from UI");
            }
        }
    }
    tracing::info!("IPC input closed");
}

async fn write_loop<W>(writer: W, mut queue: mpsc::UnboundedReceiver<IpcMessage>)
where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(writer, LinesCodec::new());
    while let Some(message) = queue.recv().await {
        let line = match serde_json::to_string(&message) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize IPC message");
                continue;
            }
        };
        if let Err(e) = sink.send(line).await {
            tracing::error!(error = %e, "IPC output failed, stopping writer");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SharedClient;
    use crate::client::testing::FakeClientFactory;
    use crate::files::AllowedRoots;
    use crate::ipc::channels::SESSION_EVENT;
    use crate::permissions::PermissionCorrelator;
    use crate::session::AgentSessionManager;
    use crate::terminal::TerminalManager;
    use crate::terminal::testing::FakePtySpawner;
    use crate::types::HostConfig;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    fn router(sender: ChannelSender) -> Arc<IpcRouter> {
        let sender: Arc<dyn IpcSender> = Arc::new(sender);
        let sessions = Arc::new(AgentSessionManager::new(
            Arc::new(SharedClient::new(Arc::new(FakeClientFactory::new()))),
            Arc::new(AllowedRoots::new()),
            &HostConfig::default(),
        ));
        let terminals = Arc::new(TerminalManager::new(
            Arc::new(FakePtySpawner::new()),
            Arc::clone(&sender),
        ));
        let permissions = Arc::new(PermissionCorrelator::new(sender));
        Arc::new(IpcRouter::new(sessions, terminals, permissions))
    }

    /// Returns the UI side: a writer for invokes and a line reader for output
    fn start() -> (
        DuplexStream,
        tokio::io::Lines<BufReader<DuplexStream>>,
        ChannelSender,
        tokio::task::JoinHandle<()>,
    ) {
        let (ui_in, host_in) = tokio::io::duplex(64 * 1024);
        let (host_out, ui_out) = tokio::io::duplex(64 * 1024);
        let (sender, queue) = channel();
        let router = router(sender.clone());
        let task = tokio::spawn(serve(router, host_in, host_out, sender.clone(), queue));
        (ui_in, BufReader::new(ui_out).lines(), sender, task)
    }

    async fn next_message(lines: &mut tokio::io::Lines<BufReader<DuplexStream>>) -> Value {
        let line = lines.next_line().await.unwrap().unwrap();
        serde_json::from_str(&line).unwrap()
    }

    #[tokio::test]
    async fn test_stdio_invoke_produces_reply() {
        let (mut ui_in, mut lines, _sender, _task) = start();
        ui_in
            .write_all(b"{\"type\":\"invoke\",\"id\":1,\"channel\":\"session.has\",\"args\":[\"a1\"]}\n")
            .await
            .unwrap();

        assert_eq!(
            next_message(&mut lines).await,
            json!({"type": "reply", "id": 1, "result": false})
        );
    }

    #[tokio::test]
    async fn test_stdio_unknown_channel_and_bad_lines() {
        let (mut ui_in, mut lines, _sender, _task) = start();
        ui_in.write_all(b"not json\n\n").await.unwrap();
        ui_in
            .write_all(b"{\"type\":\"invoke\",\"id\":9,\"channel\":\"nope\"}\n")
            .await
            .unwrap();

        let reply = next_message(&mut lines).await;
        assert_eq!(reply["type"], json!("error"));
        assert_eq!(reply["id"], json!(9));
        assert_eq!(reply["error"]["code"], json!(-32601));
    }

    #[tokio::test]
    async fn test_stdio_events_are_written() {
        let (_ui_in, mut lines, sender, _task) = start();
        sender.send(SESSION_EVENT, vec![json!("a1"), json!({"kind": "session-idle"})]);

        assert_eq!(
            next_message(&mut lines).await,
            json!({
                "type": "event",
                "channel": "session.event",
                "args": ["a1", {"kind": "session-idle"}]
            })
        );
    }

    #[tokio::test]
    async fn test_stdio_serve_returns_at_eof() {
        let (ui_in, _lines, _sender, task) = start();
        drop(ui_in);
        tokio::time::timeout(std::time::Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }
}
