use std::time::Duration;

use kvmstream_transport::{ConnectionId, Frame};

/// Side effect requested by a streamer state transition.
///
/// Streamers never perform I/O or own timers themselves. A driver executes
/// these and feeds the resulting events back in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Open a new media connection tagged `conn`.
    Connect { conn: ConnectionId },
    /// Close connection `conn` without waiting for the peer.
    Disconnect { conn: ConnectionId },
    Send { conn: ConnectionId, frame: Frame },
    /// (Re)start the heartbeat timer; the first tick fires after `period`.
    StartHeartbeat { period: Duration },
    StopHeartbeat,
    /// Fire `on_reconnect_timer` once after `delay`.
    ScheduleReconnect { delay: Duration },
    /// Deliver `on_refresh` at the next display refresh.
    RequestRefresh,
    /// (Re)start the polling timer; the first tick fires after `interval`.
    StartPolling { interval: Duration },
    StopPolling,
}
