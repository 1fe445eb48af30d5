//! kvmstream-transport
//!
//! Client side of the media WebSocket: the binary/JSON sub-protocol spoken
//! over it and a worker task per connection attempt.
//!
//! # Architecture
//!
//! ```text
//! BinaryStreamer ── Command::Connect ──► spawn_connection ──► WsConnector (tokio-tungstenite)
//!        ▲                                     │
//!        └────────── SocketEvent { conn, .. } ◄┘
//! ```

pub mod connection;
pub mod link;
pub mod protocol;

pub use connection::{spawn_connection, ConnectionHandle, ConnectionId, LinkEvent, SocketEvent};
pub use link::{Connector, Frame, MediaLink, WsConnector};
pub use protocol::{BinaryMessage, ClientEvent, H264Offer, MediaOffer, ServerEvent, VideoOffer, PING};
