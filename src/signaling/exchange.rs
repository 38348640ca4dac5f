//! Exchange store interface
//!
//! Signaling data travels through a shared, subscribable document store
//! before any direct channel exists. A session is one record plus two
//! append-only candidate sub-collections, one per side.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ExchangeError;
use crate::signaling::types::{CandidateRecord, CandidateSide, IceCandidate, SessionId, SessionRecord};

/// Live feed of store changes; dropping it unsubscribes
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    pub fn new(rx: mpsc::UnboundedReceiver<T>) -> Self {
        Self { rx }
    }

    /// Next change, or `None` once the store ends the subscription
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn try_next(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Stop receiving changes
    pub fn cancel(mut self) {
        self.rx.close();
    }
}

/// Shared document store used as the signaling medium
///
/// Subscriptions deliver the current state first (the record as it is, or
/// every candidate already appended) and then each later change. Transient
/// connectivity problems are the implementation's to retry; errors returned
/// here are final for the call that produced them.
#[async_trait]
pub trait SignalExchange: Send + Sync {
    /// Create a new session record and return its identifier
    async fn create_record(&self, record: SessionRecord) -> Result<SessionId, ExchangeError>;

    /// Read a session record once
    async fn get_record(&self, id: &SessionId) -> Result<Option<SessionRecord>, ExchangeError>;

    /// Replace an existing session record
    async fn update_record(&self, id: &SessionId, record: SessionRecord) -> Result<(), ExchangeError>;

    /// Append a candidate to one side's sub-collection
    async fn append_candidate(
        &self,
        id: &SessionId,
        side: CandidateSide,
        candidate: IceCandidate,
    ) -> Result<(), ExchangeError>;

    /// Follow a session record
    async fn subscribe_record(&self, id: &SessionId) -> Result<Subscription<SessionRecord>, ExchangeError>;

    /// Follow additions to one side's candidate sub-collection
    async fn subscribe_candidates(
        &self,
        id: &SessionId,
        side: CandidateSide,
    ) -> Result<Subscription<CandidateRecord>, ExchangeError>;
}
