//! tokio drivers that execute streamer [`Command`](crate::Command)s.
//!
//! A driver owns its streamer and runs every handler on one task inside a
//! single `select!` loop, so handlers never interleave. Timers are plain
//! `tokio::time` primitives that are created and dropped as commands arrive.

mod binary;
mod polling;

use std::pin::Pin;
use std::time::Duration;

use kvmstream_core::ExternalStreamSnapshot;
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior, Sleep};

pub use binary::BinaryDriver;
pub use polling::PollingDriver;

#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    Ensure(Option<ExternalStreamSnapshot>),
    Stop,
    /// Stops the streamer and ends the driver loop.
    Shutdown,
}

/// Cloneable handle for feeding a running driver.
#[derive(Debug, Clone)]
pub struct StreamerControl {
    tx: mpsc::UnboundedSender<Control>,
}

impl StreamerControl {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<Control>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns `false` once the driver has exited.
    pub fn ensure_stream(&self, snapshot: Option<ExternalStreamSnapshot>) -> bool {
        self.tx.send(Control::Ensure(snapshot)).is_ok()
    }

    pub fn stop_stream(&self) -> bool {
        self.tx.send(Control::Stop).is_ok()
    }

    pub fn shutdown(&self) -> bool {
        self.tx.send(Control::Shutdown).is_ok()
    }
}

/// Display refresh source.
pub enum Vsync {
    /// Fixed refresh period, e.g. 16ms for a 60Hz display.
    Interval(Duration),
    /// Refresh ticks delivered by the windowing layer.
    External(mpsc::UnboundedReceiver<()>),
}

impl Vsync {
    pub(crate) fn into_source(self) -> RefreshSource {
        match self {
            Self::Interval(period) => RefreshSource::Interval(periodic(period)),
            Self::External(rx) => RefreshSource::External(rx),
        }
    }
}

pub(crate) enum RefreshSource {
    Interval(Interval),
    External(mpsc::UnboundedReceiver<()>),
}

impl RefreshSource {
    /// Waits for the next refresh. Pends forever once an external source is gone.
    pub(crate) async fn next(&mut self) {
        match self {
            Self::Interval(interval) => {
                interval.tick().await;
            }
            Self::External(rx) => {
                if rx.recv().await.is_none() {
                    std::future::pending::<()>().await;
                }
            }
        }
    }
}

/// Interval whose first tick fires one `period` from now.
pub(crate) fn periodic(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Ticks `timer` if armed, otherwise never resolves.
pub(crate) async fn tick_opt(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Waits for `timer` if armed, otherwise never resolves.
pub(crate) async fn sleep_opt(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending::<()>().await,
    }
}
