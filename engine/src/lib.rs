//! A reliable byte-stream transport over unreliable datagrams: pluggable
//! ARQ disciplines (Stop-and-Wait, Go-Back-N, Selective Repeat) driven by a
//! TCP-Tahoe-style congestion controller, running over
//! `std::net::UdpSocket` and `std::thread`.
//!
//! The [`connection::Sender`] and [`connection::Receiver`] types are the
//! entry points: construct one from a connected (sender) or bound
//! (receiver) [`std::net::UdpSocket`] and a [`config::Config`], then drive
//! it with [`connection::Sender::send`] or [`connection::Receiver::start`].

pub mod config;
pub mod congestion;
pub mod connection;
pub mod error;
pub mod events;
pub mod loss;
pub mod packet;
pub mod receive_buffer;
pub mod send_window;
pub mod seq;
pub mod stats;

pub use config::Config;
pub use connection::{ConnectionState, Receiver, Sender};
pub use error::{CodecError, ConfigError, Error, ProtocolError, Result, TransportError};
pub use events::{EventKind, EventLog, EventRecord};
pub use packet::{Flags, Packet};
pub use send_window::Protocol;
pub use seq::SeqNo;
pub use stats::{StatsSnapshot, StatusSnapshot};
