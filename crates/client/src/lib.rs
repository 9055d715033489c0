// crates/client/src/lib.rs
//! Live progress tracking for background jobs over server-sent events or
//! WebSockets.

pub mod config;
pub mod controller;
pub mod driver;
pub mod error;
pub mod event_stream;
pub mod socket;
pub mod transport;

pub use config::{TrackerConfig, DEFAULT_API_BASE};
pub use controller::{ConnectionState, JobProgressController, JobProgressView};
pub use error::TrackError;
pub use event_stream::EventStreamConnector;
pub use socket::SocketConnector;
pub use transport::{Connection, Connector, WireEvent};
