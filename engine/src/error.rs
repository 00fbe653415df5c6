//! Error taxonomy, grouped by origin: decode, protocol, transport, and
//! configuration each get their own nested type, and `Error` composes them,
//! since this crate's failure surface splits cleanly along those four axes.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    #[error("datagram shorter than the 13-byte header")]
    MalformedPacket,
    #[error("checksum mismatch")]
    ChecksumError,
    #[error("payload exceeds 1024 bytes")]
    OversizedPayload,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("handshake failed after exhausting retries")]
    HandshakeFailed,
    #[error("transfer aborted: retransmission cap exceeded for seq {seq}")]
    TransferAborted { seq: u32 },
    #[error("received FIN outside an open connection")]
    UnexpectedFin,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("datagram socket error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} out of range: {detail}")]
    InvalidConfiguration { field: &'static str, detail: String },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Transport(TransportError::Io(e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
