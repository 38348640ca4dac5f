//! In-process exchange store
//!
//! A complete [`SignalExchange`] kept in memory. Used to run both peers in
//! one process and as the store behind the integration tests. Taking it
//! offline makes every call fail with [`ExchangeError::Unavailable`].

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::config::SignalingConfig;
use crate::error::ExchangeError;
use crate::signaling::exchange::{SignalExchange, Subscription};
use crate::signaling::types::{CandidateRecord, CandidateSide, IceCandidate, SessionId, SessionRecord};

#[derive(Default)]
struct CandidateLog {
    records: Vec<CandidateRecord>,
    subscribers: Vec<mpsc::UnboundedSender<CandidateRecord>>,
}

impl CandidateLog {
    fn append(&mut self, record: CandidateRecord) {
        self.subscribers.retain(|tx| tx.send(record.clone()).is_ok());
        self.records.push(record);
    }
}

struct SessionEntry {
    record: SessionRecord,
    record_subscribers: Vec<mpsc::UnboundedSender<SessionRecord>>,
    offer_candidates: CandidateLog,
    answer_candidates: CandidateLog,
}

impl SessionEntry {
    fn new(record: SessionRecord) -> Self {
        Self {
            record,
            record_subscribers: Vec::new(),
            offer_candidates: CandidateLog::default(),
            answer_candidates: CandidateLog::default(),
        }
    }

    fn log_mut(&mut self, side: CandidateSide) -> &mut CandidateLog {
        match side {
            CandidateSide::Offer => &mut self.offer_candidates,
            CandidateSide::Answer => &mut self.answer_candidates,
        }
    }
}

/// Exchange store held in process memory
pub struct InMemoryExchange {
    collection: String,
    offer_candidates: String,
    answer_candidates: String,
    sessions: DashMap<SessionId, SessionEntry>,
    offline: AtomicBool,
}

impl InMemoryExchange {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            offer_candidates: CandidateSide::Offer.default_collection().to_string(),
            answer_candidates: CandidateSide::Answer.default_collection().to_string(),
            sessions: DashMap::new(),
            offline: AtomicBool::new(false),
        }
    }

    /// Store laid out with the configured collection names
    pub fn from_config(config: &SignalingConfig) -> Self {
        Self {
            offer_candidates: config.offer_candidates.clone(),
            answer_candidates: config.answer_candidates.clone(),
            ..Self::new(config.collection.clone())
        }
    }

    /// Name of the candidate sub-collection for `side`
    pub fn candidate_collection(&self, side: CandidateSide) -> &str {
        match side {
            CandidateSide::Offer => &self.offer_candidates,
            CandidateSide::Answer => &self.answer_candidates,
        }
    }

    /// Simulate loss of connectivity to the store
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Store a record under a caller-chosen identifier
    pub fn insert_record(&self, id: SessionId, record: SessionRecord) {
        self.sessions.insert(id, SessionEntry::new(record));
    }

    /// Delete a session, ending all of its subscriptions
    pub fn remove_record(&self, id: &SessionId) -> bool {
        self.sessions.remove(id).is_some()
    }

    /// Everything appended to one side so far
    pub fn candidates(&self, id: &SessionId, side: CandidateSide) -> Vec<CandidateRecord> {
        self.sessions
            .get_mut(id)
            .map(|mut entry| entry.log_mut(side).records.clone())
            .unwrap_or_default()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn check_online(&self) -> Result<(), ExchangeError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(ExchangeError::Unavailable(format!("{} is offline", self.collection)))
        } else {
            Ok(())
        }
    }

    fn not_found(&self, id: &SessionId) -> ExchangeError {
        ExchangeError::NotFound(format!("{}/{}", self.collection, id))
    }

    fn candidates_not_found(&self, id: &SessionId, side: CandidateSide) -> ExchangeError {
        ExchangeError::NotFound(format!(
            "{}/{}/{}",
            self.collection,
            id,
            self.candidate_collection(side)
        ))
    }
}

impl Default for InMemoryExchange {
    fn default() -> Self {
        Self::new(crate::constants::SESSION_COLLECTION)
    }
}

#[async_trait]
impl SignalExchange for InMemoryExchange {
    async fn create_record(&self, record: SessionRecord) -> Result<SessionId, ExchangeError> {
        self.check_online()?;
        let id = SessionId::new(Uuid::new_v4().simple().to_string());
        self.sessions.insert(id.clone(), SessionEntry::new(record));
        debug!(session = %id, "Created session record");
        Ok(id)
    }

    async fn get_record(&self, id: &SessionId) -> Result<Option<SessionRecord>, ExchangeError> {
        self.check_online()?;
        Ok(self.sessions.get(id).map(|entry| entry.record.clone()))
    }

    async fn update_record(&self, id: &SessionId, record: SessionRecord) -> Result<(), ExchangeError> {
        self.check_online()?;
        let mut entry = self.sessions.get_mut(id).ok_or_else(|| self.not_found(id))?;
        entry
            .record_subscribers
            .retain(|tx| tx.send(record.clone()).is_ok());
        entry.record = record;
        debug!(session = %id, "Updated session record");
        Ok(())
    }

    async fn append_candidate(
        &self,
        id: &SessionId,
        side: CandidateSide,
        candidate: IceCandidate,
    ) -> Result<(), ExchangeError> {
        self.check_online()?;
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| self.candidates_not_found(id, side))?;
        let log = entry.log_mut(side);
        let record = CandidateRecord {
            side,
            seq: log.records.len() as u64,
            candidate,
        };
        trace!(session = %id, collection = self.candidate_collection(side), seq = record.seq, "Appended candidate");
        log.append(record);
        Ok(())
    }

    async fn subscribe_record(&self, id: &SessionId) -> Result<Subscription<SessionRecord>, ExchangeError> {
        self.check_online()?;
        let mut entry = self.sessions.get_mut(id).ok_or_else(|| self.not_found(id))?;
        let (tx, rx) = mpsc::unbounded_channel();
        // Initial snapshot; the receiver is alive so this cannot fail
        let _ = tx.send(entry.record.clone());
        entry.record_subscribers.push(tx);
        Ok(Subscription::new(rx))
    }

    async fn subscribe_candidates(
        &self,
        id: &SessionId,
        side: CandidateSide,
    ) -> Result<Subscription<CandidateRecord>, ExchangeError> {
        self.check_online()?;
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| self.candidates_not_found(id, side))?;
        let log = entry.log_mut(side);
        let (tx, rx) = mpsc::unbounded_channel();
        for record in &log.records {
            let _ = tx.send(record.clone());
        }
        log.subscribers.push(tx);
        Ok(Subscription::new(rx))
    }
}
