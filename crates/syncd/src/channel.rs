//! Channel adapter and transports.
//!
//! The adapter is the request loop for one session: it takes one inbound
//! frame, lets [`Syncd`] process it to completion, writes the response and
//! only then looks at the next frame. Responses therefore leave in request
//! order in both communication modes.
//!
//! Transports are plain tokio channels. [`duplex`] connects a client and the
//! daemon in-process; [`spawn_line_bridge`] carries the same frames as JSON
//! lines over any byte stream (the daemon binary uses a Unix socket).

use crate::error::{Result, SyncdError};
use crate::lifecycle::SessionState;
use crate::protocol::{Inbound, Request, Response, ServerFrame, ShutdownKind};
use crate::syncd::Syncd;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Cooperative shutdown flag shared between signal handlers and the adapter.
///
/// The adapter checks it between requests; a request already being processed
/// (including a bulk request) runs to completion first.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once `trigger` has been called.
    pub async fn triggered(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}

/// Daemon side of a channel.
#[derive(Debug)]
pub struct ServerEndpoint {
    pub inbound: mpsc::Receiver<Inbound>,
    pub outbound: mpsc::Sender<ServerFrame>,
}

/// Client side of a channel.
#[derive(Debug)]
pub struct ClientEndpoint {
    pub requests: mpsc::Sender<Request>,
    pub frames: mpsc::Receiver<ServerFrame>,
}

/// Connects a client and the daemon in-process.
pub fn duplex(capacity: usize) -> (ClientEndpoint, ServerEndpoint) {
    let (request_tx, mut request_rx) = mpsc::channel::<Request>(capacity);
    let (inbound_tx, inbound_rx) = mpsc::channel::<Inbound>(capacity);
    let (frame_tx, frame_rx) = mpsc::channel::<ServerFrame>(capacity);

    tokio::spawn(async move {
        while let Some(request) = request_rx.recv().await {
            if inbound_tx.send(Inbound::Request(request)).await.is_err() {
                break;
            }
        }
    });

    (
        ClientEndpoint {
            requests: request_tx,
            frames: frame_rx,
        },
        ServerEndpoint {
            inbound: inbound_rx,
            outbound: frame_tx,
        },
    )
}

/// Carries frames as JSON lines over a byte stream.
///
/// Returns a receiver of parsed inbound frames (parse failures come through
/// as `Err` with the parser message) and a sender whose frames are written to
/// `writer`. Both tasks end when their side of the stream closes.
pub fn spawn_line_bridge<In, Out, R, W>(
    reader: R,
    writer: W,
    capacity: usize,
) -> (
    mpsc::Receiver<std::result::Result<In, String>>,
    mpsc::Sender<Out>,
    JoinHandle<()>,
    JoinHandle<()>,
)
where
    In: DeserializeOwned + Send + 'static,
    Out: Serialize + Send + 'static,
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (in_tx, in_rx) = mpsc::channel(capacity);
    let (out_tx, mut out_rx) = mpsc::channel::<Out>(capacity);

    let read_task = tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => {
                    let parsed = serde_json::from_str::<In>(&line).map_err(|e| e.to_string());
                    if in_tx.send(parsed).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("channel read failed: {}", e);
                    break;
                }
            }
        }
        debug!("line reader finished");
    });

    let write_task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(frame) = out_rx.recv().await {
            let mut line = match serde_json::to_string(&frame) {
                Ok(line) => line,
                Err(e) => {
                    error!("failed to encode frame: {}", e);
                    continue;
                }
            };
            line.push('\n');
            if let Err(e) = writer.write_all(line.as_bytes()).await {
                warn!("channel write failed: {}", e);
                break;
            }
            if let Err(e) = writer.flush().await {
                warn!("channel flush failed: {}", e);
                break;
            }
        }
        debug!("line writer finished");
    });

    (in_rx, out_tx, read_task, write_task)
}

/// Serves a byte stream: JSON-line requests in, JSON-line frames out.
pub fn server_endpoint_over_stream<R, W>(reader: R, writer: W, capacity: usize) -> ServerEndpoint
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (mut parsed_rx, outbound, _reader, _writer) =
        spawn_line_bridge::<Request, ServerFrame, _, _>(reader, writer, capacity);
    let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
    tokio::spawn(async move {
        while let Some(parsed) = parsed_rx.recv().await {
            let inbound = match parsed {
                Ok(request) => Inbound::Request(request),
                Err(reason) => Inbound::Malformed(reason),
            };
            if inbound_tx.send(inbound).await.is_err() {
                break;
            }
        }
    });
    ServerEndpoint {
        inbound: inbound_rx,
        outbound,
    }
}

/// Client endpoint over a byte stream. Frames that fail to parse are logged
/// and skipped.
pub fn client_endpoint_over_stream<R, W>(reader: R, writer: W, capacity: usize) -> ClientEndpoint
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (mut parsed_rx, requests, _reader, _writer) =
        spawn_line_bridge::<ServerFrame, Request, _, _>(reader, writer, capacity);
    let (frame_tx, frame_rx) = mpsc::channel(capacity);
    tokio::spawn(async move {
        while let Some(parsed) = parsed_rx.recv().await {
            match parsed {
                Ok(frame) => {
                    if frame_tx.send(frame).await.is_err() {
                        break;
                    }
                }
                Err(reason) => warn!("dropping unparsable frame: {}", reason),
            }
        }
    });
    ClientEndpoint {
        requests,
        frames: frame_rx,
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The session reached `Terminated`.
    Terminated,
    /// The peer left before creating a switch; nothing to tear down.
    Disconnected,
}

/// How long a terminated session keeps answering requests that were queued
/// behind the shutdown.
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_millis(100);

/// The per-session request loop.
pub struct ChannelAdapter {
    syncd: Syncd,
    endpoint: ServerEndpoint,
    shutdown: ShutdownHandle,
    signal_shutdown_kind: ShutdownKind,
    drain_grace: Duration,
}

impl ChannelAdapter {
    pub fn new(syncd: Syncd, endpoint: ServerEndpoint, shutdown: ShutdownHandle) -> Self {
        Self {
            syncd,
            endpoint,
            shutdown,
            signal_shutdown_kind: ShutdownKind::Cold,
            drain_grace: DEFAULT_DRAIN_GRACE,
        }
    }

    /// Shutdown kind used when the shutdown handle fires.
    pub fn with_signal_shutdown_kind(mut self, kind: ShutdownKind) -> Self {
        self.signal_shutdown_kind = kind;
        self
    }

    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    pub fn syncd(&self) -> &Syncd {
        &self.syncd
    }

    /// Runs until the session terminates or the peer goes away.
    ///
    /// Losing the channel after the switch exists is fatal: the session is
    /// torn down and `ChannelClosed` is returned. Requests still arriving
    /// after termination are answered with a lifecycle rejection until the
    /// channel has been quiet for the drain grace period.
    pub async fn run(&mut self) -> Result<SessionEnd> {
        info!("session started");
        loop {
            if self.shutdown.is_triggered() {
                info!("shutdown signal received");
                let result = self.syncd.terminate(self.signal_shutdown_kind).await;
                self.drain().await;
                result?;
                return Ok(SessionEnd::Terminated);
            }

            let next = tokio::select! {
                biased;
                _ = self.shutdown.triggered() => continue,
                next = self.endpoint.inbound.recv() => next,
            };

            let response = match next {
                Some(inbound) => self.respond(inbound).await,
                None => return self.peer_gone().await,
            };

            if self
                .endpoint
                .outbound
                .send(ServerFrame::Response(response))
                .await
                .is_err()
            {
                return self.peer_gone().await;
            }

            if self.syncd.state() == SessionState::Terminated {
                info!("session terminated");
                self.drain().await;
                return Ok(SessionEnd::Terminated);
            }
        }
    }

    async fn respond(&mut self, inbound: Inbound) -> Response {
        match inbound {
            Inbound::Request(request) => self.syncd.handle(request).await,
            Inbound::Malformed(reason) => {
                warn!("malformed request: {}", reason);
                Response::from_error(0, &SyncdError::Protocol(reason))
            }
        }
    }

    /// Answers requests queued behind termination. The session is
    /// `Terminated`, so every request is rejected without touching the SDK.
    async fn drain(&mut self) {
        let mut drained = 0usize;
        loop {
            let next = match timeout(self.drain_grace, self.endpoint.inbound.recv()).await {
                Ok(Some(next)) => next,
                Ok(None) | Err(_) => break,
            };
            let response = self.respond(next).await;
            if self
                .endpoint
                .outbound
                .send(ServerFrame::Response(response))
                .await
                .is_err()
            {
                break;
            }
            drained += 1;
        }
        if drained > 0 {
            info!(drained, "rejected requests queued behind shutdown");
        }
    }

    async fn peer_gone(&mut self) -> Result<SessionEnd> {
        match self.syncd.state() {
            SessionState::Uninitialized => {
                info!("peer disconnected before switch create");
                self.syncd.terminate(ShutdownKind::Cold).await?;
                Ok(SessionEnd::Disconnected)
            }
            SessionState::Terminated => Ok(SessionEnd::Terminated),
            state => {
                error!(state = %state, "channel lost during established session");
                self.syncd.terminate(ShutdownKind::Cold).await?;
                Err(SyncdError::ChannelClosed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_handle_wakes_waiter() {
        let handle = ShutdownHandle::new();
        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.triggered().await })
        };
        tokio::task::yield_now().await;
        handle.trigger();
        tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(handle.is_triggered());
    }

    #[tokio::test]
    async fn test_triggered_before_wait_returns_immediately() {
        let handle = ShutdownHandle::new();
        handle.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle.triggered())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_line_bridge_over_duplex_stream() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server_io);
        let (client_read, client_write) = tokio::io::split(client_io);

        let mut server = server_endpoint_over_stream(server_read, server_write, 8);
        let mut client = client_endpoint_over_stream(client_read, client_write, 8);

        let request = Request::new(
            1,
            crate::protocol::Operation::Shutdown,
            sonic_sai::ObjectType::Null,
        );
        client.requests.send(request.clone()).await.unwrap();
        assert_eq!(server.inbound.recv().await, Some(Inbound::Request(request)));

        server
            .outbound
            .send(ServerFrame::Response(Response::success(1)))
            .await
            .unwrap();
        assert_eq!(
            client.frames.recv().await,
            Some(ServerFrame::Response(Response::success(1)))
        );
    }

    #[tokio::test]
    async fn test_garbage_line_becomes_malformed() {
        let (mut client_io, server_io) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server_io);
        let mut server = server_endpoint_over_stream(server_read, server_write, 8);

        client_io.write_all(b"{\"sequence\": \n").await.unwrap();
        assert!(matches!(server.inbound.recv().await, Some(Inbound::Malformed(_))));
    }
}
