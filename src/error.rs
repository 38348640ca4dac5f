//! Error types for the audio link

use thiserror::Error;

use crate::signaling::NegotiationState;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Exchange store error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Signaling error: {0}")]
    Signaling(#[from] SignalingError),

    #[error("Parameter error: {0}")]
    Param(#[from] ParamError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio subsystem errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),
}

/// Errors raised by a shared exchange store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExchangeError {
    #[error("Exchange store unavailable: {0}")]
    Unavailable(String),

    #[error("Session record not found: {0}")]
    NotFound(String),
}

/// Errors raised by the peer transport collaborator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Description rejected: {0}")]
    DescriptionRejected(String),

    #[error("Candidate rejected: {0}")]
    CandidateRejected(String),

    #[error("Invalid transport state: {0}")]
    InvalidState(String),

    #[error("Transport closed")]
    Closed,
}

/// Negotiation failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignalingError {
    #[error("Exchange store error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Session record {0} is missing or has no offer")]
    MissingSession(String),

    #[error("Session record {0} has expired")]
    ExpiredSession(String),

    #[error("Timed out in state {0:?}")]
    Timeout(NegotiationState),

    #[error("Transport failed permanently: {0}")]
    TransportFailed(String),

    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: NegotiationState,
        to: NegotiationState,
    },

    #[error("Negotiation closed")]
    Closed,
}

/// Parameter validation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamError {
    #[error("Unknown parameter path: {0}")]
    UnknownPath(String),

    #[error("Type mismatch for {path}: expected {expected}")]
    TypeMismatch { path: String, expected: &'static str },

    #[error("Invalid value for {path}: {reason}")]
    InvalidValue { path: String, reason: String },
}

/// Parameter channel errors
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Channel is not open")]
    ChannelClosed,

    #[error("Malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Message does not name a changed parameter")]
    NothingChanged,

    #[error("Message has no value for {0}")]
    MissingLeaf(String),

    #[error("Parameter error: {0}")]
    Param(#[from] ParamError),
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Invalid packet length: {0} bytes")]
    InvalidPacket(usize),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
