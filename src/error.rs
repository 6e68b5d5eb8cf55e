//! Error types for the ensemble node

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Role error: {0}")]
    Role(#[from] RoleError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Receive handler already registered")]
    HandlerAlreadySet,

    #[error("Link is down")]
    LinkDown,
}

/// Wire codec errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Unexpected frame length: {0} bytes")]
    WrongLength(usize),

    #[error("Unknown message type: {0:#04x}")]
    UnknownMessageType(u8),

    #[error("Invalid role byte: {0:#04x}")]
    InvalidRole(u8),

    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("Invalid link address: {0}")]
    InvalidAddress(String),

    #[error("Unknown song id: {0}")]
    UnknownSong(u8),
}

/// Local role resolution errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RoleError {
    #[error("Role already resolved to {0}")]
    AlreadyResolved(String),

    #[error("Not a performer role: {0}")]
    NotAPart(String),

    #[error("Part number out of range: {0}")]
    PartOutOfRange(u8),

    #[error("Only the conductor can originate control messages")]
    NotConductor,
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
