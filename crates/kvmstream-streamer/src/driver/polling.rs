use tokio::sync::mpsc;
use tokio::time::Interval;
use tracing::{debug, info};

use super::{periodic, tick_opt, Control, StreamerControl};
use crate::polling::PollingStreamer;
use crate::{Command, Streamer};

/// Runs a [`PollingStreamer`] with its check timer.
pub struct PollingDriver {
    streamer: PollingStreamer,
    control_rx: mpsc::UnboundedReceiver<Control>,
    poll: Option<Interval>,
}

impl PollingDriver {
    pub fn new(streamer: PollingStreamer) -> (Self, StreamerControl) {
        let (control, control_rx) = StreamerControl::channel();
        (Self { streamer, control_rx, poll: None }, control)
    }

    /// Runs until [`Control::Shutdown`] or every control handle is dropped.
    pub async fn run(mut self) -> PollingStreamer {
        info!("Polling streamer driver started");
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
                _ = tick_opt(&mut self.poll) => {
                    let commands = self.streamer.on_poll_tick();
                    self.execute_all(commands);
                }
            }
        }

        let commands = self.streamer.stop_stream();
        self.execute_all(commands);
        info!("Polling streamer driver stopped");
        self.streamer
    }

    fn execute_all(&mut self, commands: Vec<Command>) {
        for command in commands {
            match command {
                Command::StartPolling { interval } => self.poll = Some(periodic(interval)),
                Command::StopPolling => self.poll = None,
                other => debug!(command = ?other, "Command ignored by polling driver"),
            }
        }
    }
}
