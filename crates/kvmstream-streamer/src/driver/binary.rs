use std::pin::Pin;
use std::sync::Arc;

use kvmstream_transport::{spawn_connection, ConnectionHandle, Connector, SocketEvent};
use tokio::sync::mpsc;
use tokio::time::{Interval, Sleep};
use tracing::{debug, info, trace};

use super::{periodic, sleep_opt, tick_opt, Control, RefreshSource, StreamerControl, Vsync};
use crate::binary::{BinaryStreamer, DecoderOutputReceiver};
use crate::{Command, Streamer};

/// Runs a [`BinaryStreamer`] against a real socket, timers and display refresh.
pub struct BinaryDriver {
    streamer: BinaryStreamer,
    decoder_rx: DecoderOutputReceiver,
    connector: Arc<dyn Connector>,
    control_rx: mpsc::UnboundedReceiver<Control>,
    events_tx: mpsc::UnboundedSender<SocketEvent>,
    events_rx: mpsc::UnboundedReceiver<SocketEvent>,

    connection: Option<ConnectionHandle>,
    heartbeat: Option<Interval>,
    reconnect: Option<Pin<Box<Sleep>>>,
    refresh: RefreshSource,
    refresh_armed: bool,
}

impl BinaryDriver {
    pub fn new(
        streamer: BinaryStreamer,
        decoder_rx: DecoderOutputReceiver,
        connector: Arc<dyn Connector>,
        vsync: Vsync,
    ) -> (Self, StreamerControl) {
        let (control, control_rx) = StreamerControl::channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let driver = Self {
            streamer,
            decoder_rx,
            connector,
            control_rx,
            events_tx,
            events_rx,
            connection: None,
            heartbeat: None,
            reconnect: None,
            refresh: vsync.into_source(),
            refresh_armed: false,
        };
        (driver, control)
    }

    /// Runs until [`Control::Shutdown`] or every control handle is dropped.
    /// Returns the stopped streamer.
    pub async fn run(mut self) -> BinaryStreamer {
        info!(url = %self.streamer.media_url(), "Binary streamer driver started");
        loop {
            tokio::select! {
                control = self.control_rx.recv() => match control {
                    Some(Control::Ensure(snapshot)) => {
                        let commands = self.streamer.ensure_stream(snapshot.as_ref());
                        self.execute_all(commands);
                    }
                    Some(Control::Stop) => {
                        let commands = self.streamer.stop_stream();
                        self.execute_all(commands);
                    }
                    Some(Control::Shutdown) | None => break,
                },
                Some(event) = self.events_rx.recv() => {
                    let commands = self.streamer.on_socket_event(event);
                    self.execute_all(commands);
                }
                Some(output) = self.decoder_rx.recv() => {
                    let commands = self.streamer.on_decoder_output(output);
                    self.execute_all(commands);
                }
                _ = tick_opt(&mut self.heartbeat) => {
                    let commands = self.streamer.on_heartbeat_tick();
                    self.execute_all(commands);
                }
                _ = sleep_opt(&mut self.reconnect) => {
                    self.reconnect = None;
                    let commands = self.streamer.on_reconnect_timer();
                    self.execute_all(commands);
                }
                _ = self.refresh.next(), if self.refresh_armed => {
                    self.refresh_armed = false;
                    let commands = self.streamer.on_refresh();
                    self.execute_all(commands);
                }
            }
        }

        let commands = self.streamer.stop_stream();
        self.execute_all(commands);
        info!("Binary streamer driver stopped");
        self.streamer
    }

    fn execute_all(&mut self, commands: Vec<Command>) {
        for command in commands {
            self.execute(command);
        }
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::Connect { conn } => {
                let url = self.streamer.media_url().to_string();
                let handle = spawn_connection(
                    Arc::clone(&self.connector),
                    url,
                    self.streamer.connect_timeout(),
                    conn,
                    self.events_tx.clone(),
                );
                self.connection = Some(handle);
            }
            Command::Disconnect { conn } => {
                if self.connection.as_ref().map(ConnectionHandle::id) == Some(conn) {
                    self.connection = None;
                }
            }
            Command::Send { conn, frame } => match &self.connection {
                Some(handle) if handle.id() == conn => {
                    if let Err(e) = handle.send(frame) {
                        debug!(conn = %conn, "Send failed: {}", e);
                    }
                }
                _ => trace!(conn = %conn, "Dropping frame for a closed connection"),
            },
            Command::StartHeartbeat { period } => self.heartbeat = Some(periodic(period)),
            Command::StopHeartbeat => self.heartbeat = None,
            Command::ScheduleReconnect { delay } => self.reconnect = Some(Box::pin(tokio::time::sleep(delay))),
            Command::RequestRefresh => self.refresh_armed = true,
            other @ (Command::StartPolling { .. } | Command::StopPolling) => {
                debug!(command = ?other, "Polling command ignored by binary driver");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use kvmstream_core::{ExternalStreamSnapshot, StreamerConfig, TransportError};
    use kvmstream_transport::{Frame, MediaLink};
    use tokio::time::Instant;

    use super::*;
    use crate::testing::*;

    /// Server side of one accepted connection.
    struct Peer {
        sent: mpsc::UnboundedReceiver<Frame>,
        inbound: mpsc::UnboundedSender<Frame>,
    }

    struct TestLink {
        sent: mpsc::UnboundedSender<Frame>,
        inbound: mpsc::UnboundedReceiver<Frame>,
    }

    #[async_trait]
    impl MediaLink for TestLink {
        async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
            self.sent.send(frame).map_err(|_| TransportError::ConnectionClosed)
        }
        async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
            self.inbound.recv().await.map(Ok)
        }
        async fn close(&mut self) {}
    }

    struct TestConnector {
        peers: mpsc::UnboundedSender<Peer>,
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Connector for TestConnector {
        async fn connect(&self, _url: &str) -> Result<Box<dyn MediaLink>, TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let (sent_tx, sent_rx) = mpsc::unbounded_channel();
            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
            let _ = self.peers.send(Peer { sent: sent_rx, inbound: inbound_tx });
            Ok(Box::new(TestLink { sent: sent_tx, inbound: inbound_rx }))
        }
    }

    /// Accepts the attempt but never finishes the handshake.
    struct StalledConnector {
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Connector for StalledConnector {
        async fn connect(&self, _url: &str) -> Result<Box<dyn MediaLink>, TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    struct Rig {
        control: StreamerControl,
        peers: mpsc::UnboundedReceiver<Peer>,
        attempts: Arc<AtomicUsize>,
        callbacks: Arc<RecordingCallbacks>,
        surface: FakeSurface,
        task: tokio::task::JoinHandle<BinaryStreamer>,
    }

    fn start() -> Rig {
        let (peers_tx, peers) = mpsc::unbounded_channel();
        let attempts = Arc::new(AtomicUsize::new(0));
        let connector = TestConnector { peers: peers_tx, attempts: attempts.clone() };
        start_with(Arc::new(connector), peers, attempts)
    }

    fn start_with(
        connector: Arc<dyn Connector>,
        peers: mpsc::UnboundedReceiver<Peer>,
        attempts: Arc<AtomicUsize>,
    ) -> Rig {
        let callbacks = Arc::new(RecordingCallbacks::default());
        let surface = FakeSurface::default();
        let (streamer, decoder_rx) = BinaryStreamer::new(
            StreamerConfig::default(),
            callbacks.clone(),
            Arc::new(FakeCapabilities::default()),
            Arc::new(FakeDecoderFactory::default()),
            Box::new(surface.clone()),
        );
        let (driver, control) =
            BinaryDriver::new(streamer, decoder_rx, connector, Vsync::Interval(Duration::from_millis(16)));
        let task = tokio::spawn(driver.run());
        Rig { control, peers, attempts, callbacks, surface, task }
    }

    fn is_ping(frame: &Frame) -> bool {
        *frame == Frame::Binary(Bytes::from_static(&[0x00]))
    }

    #[tokio::test(start_paused = true)]
    async fn silent_server_is_dropped_after_five_beats_and_retried_once() {
        let mut rig = start();
        let started = Instant::now();
        rig.control.ensure_stream(Some(ExternalStreamSnapshot::online()));

        let mut first = rig.peers.recv().await.unwrap();
        let second = rig.peers.recv().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(6), "5 beats then a 1s backoff");
        assert_eq!(rig.attempts.load(Ordering::SeqCst), 2);

        let mut pings = 0;
        while let Ok(frame) = first.sent.try_recv() {
            assert!(is_ping(&frame));
            pings += 1;
        }
        assert_eq!(pings, 4);
        drop(second);
    }

    #[tokio::test(start_paused = true)]
    async fn answered_heartbeat_keeps_the_connection() {
        let mut rig = start();
        rig.control.ensure_stream(None);
        let mut peer = rig.peers.recv().await.unwrap();
        let responder = tokio::spawn(async move {
            let mut pings = 0;
            while let Some(frame) = peer.sent.recv().await {
                if is_ping(&frame) {
                    pings += 1;
                    let _ = peer.inbound.send(Frame::Binary(Bytes::from_static(&[0xFF])));
                }
            }
            pings
        });

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(rig.attempts.load(Ordering::SeqCst), 1);

        rig.control.shutdown();
        let streamer = rig.task.await.unwrap();
        assert!(streamer.is_stopped());
        assert!(responder.await.unwrap() >= 10);
    }

    #[tokio::test(start_paused = true)]
    async fn keyframe_is_decoded_and_drawn_on_refresh() {
        let mut rig = start();
        rig.control.ensure_stream(Some(ExternalStreamSnapshot::online()));
        let mut peer = rig.peers.recv().await.unwrap();

        let media = r#"{"event_type":"media","event":{"video":{"h264":{"profile_level_id":"64001f"}}}}"#;
        peer.inbound.send(Frame::Text(media.into())).unwrap();
        let start = peer.sent.recv().await.unwrap();
        assert!(matches!(start, Frame::Text(ref json) if json.contains("h264")));

        peer.inbound.send(Frame::Binary(Bytes::from_static(&[0x01, 0x01, 0x65]))).unwrap();
        for _ in 0..10 {
            if rig.surface.0.lock().unwrap().draws > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(16)).await;
        }
        assert_eq!(rig.surface.0.lock().unwrap().draws, 1);
        assert_eq!(rig.callbacks.count(&Seen::Active), 1);
        assert_eq!(rig.surface.0.lock().unwrap().size, (640, 480));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_closes_without_reconnecting() {
        let mut rig = start();
        rig.control.ensure_stream(None);
        let _peer = rig.peers.recv().await.unwrap();

        rig.control.stop_stream();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(rig.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(rig.callbacks.last_info(), Some((false, false, String::new())));

        drop(rig.control);
        let streamer = rig.task.await.unwrap();
        assert!(streamer.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_handshake_times_out_and_retries() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let connector = StalledConnector { attempts: attempts.clone() };
        let (_peers_tx, peers) = mpsc::unbounded_channel();
        let rig = start_with(Arc::new(connector), peers, attempts);
        rig.control.ensure_stream(Some(ExternalStreamSnapshot::online()));

        // 5s connect timeout, then a 1s backoff before the second attempt.
        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(rig.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(
            rig.callbacks.last_info(),
            Some((false, true, "Connection lost, reconnecting…".to_string()))
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(rig.attempts.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(rig.attempts.load(Ordering::SeqCst) > 2);

        rig.control.shutdown();
        let streamer = rig.task.await.unwrap();
        assert!(streamer.is_stopped());
    }
}
