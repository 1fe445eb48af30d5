//! Per-connection worker task.
//!
//! Each connection attempt gets its own task that owns the [`MediaLink`] and
//! reports back on a shared event channel. Every event carries the
//! [`ConnectionId`] of the attempt that produced it, so the supervisor can
//! ignore late events from connections it already abandoned.
//!
//! ```text
//! supervisor ── Frame ──► outbound mpsc ──► worker ──► MediaLink
//! supervisor ◄── SocketEvent { conn, .. } ◄── worker ◄── MediaLink
//! ```

use std::sync::Arc;
use std::time::Duration;

use kvmstream_core::TransportError;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::link::{Connector, Frame, MediaLink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Opened,
    Frame(Frame),
    /// The connection is gone. `reason` is `None` for a local close.
    Closed { reason: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketEvent {
    pub conn: ConnectionId,
    pub event: LinkEvent,
}

/// Sending half of a live connection. Dropping it closes the connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Frame>,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn send(&self, frame: Frame) -> Result<(), TransportError> {
        self.tx.send(frame).map_err(|_| TransportError::SendFailed {
            reason: format!("connection {} worker is gone", self.id),
        })
    }
}

/// Starts connecting to `url` in the background. An attempt that has not
/// opened within `connect_timeout` is reported as closed.
pub fn spawn_connection(
    connector: Arc<dyn Connector>,
    url: String,
    connect_timeout: Duration,
    id: ConnectionId,
    events: mpsc::UnboundedSender<SocketEvent>,
) -> ConnectionHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(connection_worker(connector, url, connect_timeout, id, rx, events));
    ConnectionHandle { id, tx }
}

async fn connection_worker(
    connector: Arc<dyn Connector>,
    url: String,
    connect_timeout: Duration,
    id: ConnectionId,
    mut outbound_rx: mpsc::UnboundedReceiver<Frame>,
    events: mpsc::UnboundedSender<SocketEvent>,
) {
    let emit = |event: LinkEvent| events.send(SocketEvent { conn: id, event }).is_ok();

    debug!(conn = %id, %url, "Connecting");
    let mut link = tokio::select! {
        result = tokio::time::timeout(connect_timeout, connector.connect(&url)) => match result {
            Ok(Ok(link)) => link,
            Ok(Err(e)) => {
                warn!(conn = %id, "Connect failed: {}", e);
                emit(LinkEvent::Closed { reason: Some(e.to_string()) });
                return;
            }
            Err(_) => {
                warn!(conn = %id, timeout = ?connect_timeout, "Connect timed out");
                emit(LinkEvent::Closed { reason: Some("connect timed out".into()) });
                return;
            }
        },
        _ = wait_closed(&mut outbound_rx) => {
            debug!(conn = %id, "Abandoned before connect finished");
            emit(LinkEvent::Closed { reason: None });
            return;
        }
    };

    info!(conn = %id, "Connection open");
    if !emit(LinkEvent::Opened) {
        link.close().await;
        return;
    }

    let reason = run_open(&mut *link, &mut outbound_rx, &emit).await;
    link.close().await;
    debug!(conn = %id, ?reason, "Connection worker exiting");
    emit(LinkEvent::Closed { reason });
}

async fn run_open(
    link: &mut dyn MediaLink,
    outbound_rx: &mut mpsc::UnboundedReceiver<Frame>,
    emit: &impl Fn(LinkEvent) -> bool,
) -> Option<String> {
    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => match outbound {
                Some(frame) => {
                    if let Err(e) = link.send(frame).await {
                        return Some(e.to_string());
                    }
                }
                None => return None,
            },
            inbound = link.recv() => match inbound {
                Some(Ok(frame)) => {
                    if !emit(LinkEvent::Frame(frame)) {
                        return None;
                    }
                }
                Some(Err(e)) => return Some(e.to_string()),
                None => return Some("closed by peer".into()),
            },
        }
    }
}

/// Resolves once the handle is dropped. Frames queued before the link is
/// open are discarded.
async fn wait_closed(rx: &mut mpsc::UnboundedReceiver<Frame>) {
    while rx.recv().await.is_some() {}
}
