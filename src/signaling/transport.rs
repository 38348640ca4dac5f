//! Peer transport interface
//!
//! The media/data transport being negotiated. It produces descriptions,
//! consumes the remote side's, discovers local candidates and reports
//! connectivity through [`TransportEvent`]s.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::signaling::types::{IceCandidate, SessionDescription};

/// Asynchronous notifications from the transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A local network path was discovered and should be published
    LocalCandidate(IceCandidate),
    /// No further local candidates will be discovered
    GatheringComplete,
    /// A usable path to the peer was established
    Connected,
    /// The transport failed permanently
    Failed(String),
    /// The transport was closed
    Closed,
}

#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, TransportError>;

    /// Requires the remote offer to be applied first
    async fn create_answer(&self) -> Result<SessionDescription, TransportError>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), TransportError>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), TransportError>;

    /// Apply a remote candidate
    ///
    /// Applying a candidate that was already applied must succeed and have
    /// no further effect.
    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError>;

    async fn close(&self);
}
