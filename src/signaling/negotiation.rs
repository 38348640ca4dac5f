//! Negotiation state machine
//!
//! Drives one peer through offer or answer negotiation using a
//! [`SignalExchange`] as the only channel to the other side. Every input
//! (transport events, store subscriptions, teardown requests, timeouts)
//! is funnelled through a single `select!` loop, so transitions happen
//! one at a time on the task that owns the machine.
//!
//! ```text
//! Offerer:  Idle → LocalDescriptionCreated → LocalDescriptionPublished
//!                → AwaitingRemoteDescription → RemoteDescriptionApplied
//!                → CandidateExchangeActive → Connected
//!
//! Answerer: Idle → AwaitingRemoteDescription → RemoteDescriptionApplied
//!                → LocalDescriptionCreated → LocalDescriptionPublished
//!                → CandidateExchangeActive → Connected
//!
//! Failed / Closed are terminal and reachable from any non-terminal state.
//! ```

use chrono::Utc;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::error::SignalingError;
use crate::signaling::exchange::{SignalExchange, Subscription};
use crate::signaling::sdp::patch_description;
use crate::signaling::transport::{PeerTransport, TransportEvent};
use crate::signaling::types::{
    CandidateRecord, IceCandidate, Role, SdpType, SessionDescription, SessionId, SessionRecord,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NegotiationState {
    Idle,
    LocalDescriptionCreated,
    LocalDescriptionPublished,
    AwaitingRemoteDescription,
    RemoteDescriptionApplied,
    CandidateExchangeActive,
    Connected,
    Failed,
    Closed,
}

const OFFERER_PATH: [NegotiationState; 7] = [
    NegotiationState::Idle,
    NegotiationState::LocalDescriptionCreated,
    NegotiationState::LocalDescriptionPublished,
    NegotiationState::AwaitingRemoteDescription,
    NegotiationState::RemoteDescriptionApplied,
    NegotiationState::CandidateExchangeActive,
    NegotiationState::Connected,
];

const ANSWERER_PATH: [NegotiationState; 7] = [
    NegotiationState::Idle,
    NegotiationState::AwaitingRemoteDescription,
    NegotiationState::RemoteDescriptionApplied,
    NegotiationState::LocalDescriptionCreated,
    NegotiationState::LocalDescriptionPublished,
    NegotiationState::CandidateExchangeActive,
    NegotiationState::Connected,
];

impl NegotiationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NegotiationState::Failed | NegotiationState::Closed)
    }

    /// States that expire when held longer than the configured timeout
    pub fn has_timeout(&self) -> bool {
        !matches!(
            self,
            NegotiationState::Connected | NegotiationState::Failed | NegotiationState::Closed
        )
    }

    /// Whether `role` may move from `self` to `to`
    ///
    /// Forward moves go one step along the role's path. `Connected` may
    /// arrive early from any state once the remote description is applied,
    /// since connectivity is reported by the transport.
    pub fn can_transition(&self, role: Role, to: NegotiationState) -> bool {
        if self.is_terminal() || *self == to {
            return false;
        }
        let path = match role {
            Role::Offerer => &OFFERER_PATH,
            Role::Answerer => &ANSWERER_PATH,
        };
        let position = |state: NegotiationState| path.iter().position(|s| *s == state);

        match to {
            NegotiationState::Failed | NegotiationState::Closed => true,
            NegotiationState::Connected => {
                match (position(*self), position(NegotiationState::RemoteDescriptionApplied)) {
                    (Some(from), Some(applied)) => from >= applied,
                    _ => false,
                }
            }
            _ => match (position(*self), position(to)) {
                (Some(from), Some(next)) => next == from + 1,
                _ => false,
            },
        }
    }
}

/// Timing and retry policy for one negotiation
#[derive(Debug, Clone)]
pub struct NegotiationConfig {
    /// Longest time any single non-terminal state may be held
    pub state_timeout: Duration,
    /// Records older than this are treated as expired by the answerer
    pub session_ttl: Option<Duration>,
    /// Extra attempts for a failed candidate append
    pub append_retries: u32,
    /// Base delay between append attempts, multiplied by the attempt number
    pub append_backoff: Duration,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            state_timeout: Duration::from_secs(30),
            session_ttl: Some(Duration::from_secs(60 * 60)),
            append_retries: 3,
            append_backoff: Duration::from_millis(250),
        }
    }
}

/// One negotiation attempt
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: Option<SessionId>,
    pub role: Role,
    pub local_description: Option<SessionDescription>,
    pub remote_description: Option<SessionDescription>,
    pub state: NegotiationState,
}

impl Session {
    fn new(role: Role, id: Option<SessionId>) -> Self {
        Self {
            id,
            role,
            local_description: None,
            remote_description: None,
            state: NegotiationState::Idle,
        }
    }

    fn label(&self) -> String {
        self.id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string())
    }
}

enum Command {
    Close,
}

/// Cloneable remote control for a running machine
#[derive(Clone)]
pub struct NegotiationHandle {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<Session>,
}

impl NegotiationHandle {
    /// Request teardown; the machine moves to `Closed` on its own task
    pub fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }

    pub fn state(&self) -> NegotiationState {
        self.status.borrow().state
    }

    pub fn session(&self) -> Session {
        self.status.borrow().clone()
    }

    /// Wait until the session identifier is known
    ///
    /// Returns `None` if negotiation ends before a record was published.
    pub async fn session_id(&mut self) -> Option<SessionId> {
        self.wait_until(|s| s.id.is_some() || s.state.is_terminal())
            .await
            .id
    }

    /// Wait for `Connected`, `Failed` or `Closed`
    pub async fn settled(&mut self) -> NegotiationState {
        self.wait_until(|s| s.state == NegotiationState::Connected || s.state.is_terminal())
            .await
            .state
    }

    async fn wait_until(&mut self, done: impl Fn(&Session) -> bool) -> Session {
        loop {
            {
                let session = self.status.borrow_and_update();
                if done(&session) {
                    return session.clone();
                }
            }
            if self.status.changed().await.is_err() {
                return self.status.borrow().clone();
            }
        }
    }
}

/// Offer/answer negotiation over a shared exchange store
pub struct NegotiationStateMachine {
    config: NegotiationConfig,
    exchange: Arc<dyn SignalExchange>,
    transport: Arc<dyn PeerTransport>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    session: Session,
    status: watch::Sender<Session>,
    command_tx: mpsc::UnboundedSender<Command>,
    commands: mpsc::UnboundedReceiver<Command>,
    record_sub: Option<Subscription<SessionRecord>>,
    candidate_sub: Option<Subscription<CandidateRecord>>,
    deadline: Instant,
    history: Vec<NegotiationState>,
    failure: Option<SignalingError>,
    remote_candidates: u64,
}

impl NegotiationStateMachine {
    /// Machine that creates a new session and waits for an answer
    pub fn offerer(
        config: NegotiationConfig,
        exchange: Arc<dyn SignalExchange>,
        transport: Arc<dyn PeerTransport>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self::new(config, exchange, transport, events, Session::new(Role::Offerer, None))
    }

    /// Machine that answers the session identified by `session_id`
    pub fn answerer(
        config: NegotiationConfig,
        exchange: Arc<dyn SignalExchange>,
        transport: Arc<dyn PeerTransport>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
        session_id: SessionId,
    ) -> Self {
        Self::new(
            config,
            exchange,
            transport,
            events,
            Session::new(Role::Answerer, Some(session_id)),
        )
    }

    fn new(
        config: NegotiationConfig,
        exchange: Arc<dyn SignalExchange>,
        transport: Arc<dyn PeerTransport>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
        session: Session,
    ) -> Self {
        let (status, _) = watch::channel(session.clone());
        let (command_tx, commands) = mpsc::unbounded_channel();
        let deadline = Instant::now() + config.state_timeout;
        Self {
            config,
            exchange,
            transport,
            events,
            session,
            status,
            command_tx,
            commands,
            record_sub: None,
            candidate_sub: None,
            deadline,
            history: vec![NegotiationState::Idle],
            failure: None,
            remote_candidates: 0,
        }
    }

    pub fn handle(&self) -> NegotiationHandle {
        NegotiationHandle {
            commands: self.command_tx.clone(),
            status: self.status.subscribe(),
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.session.state
    }

    pub fn role(&self) -> Role {
        self.session.role
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Every state entered so far, starting with `Idle`
    pub fn history(&self) -> &[NegotiationState] {
        &self.history
    }

    /// Why the machine failed, once it has
    pub fn failure(&self) -> Option<&SignalingError> {
        self.failure.as_ref()
    }

    /// Remote candidate records observed (duplicates included)
    pub fn remote_candidates_seen(&self) -> u64 {
        self.remote_candidates
    }

    /// Negotiate until the transport connects
    ///
    /// On success the exchange store is no longer consulted for this
    /// session. On failure the machine is left in `Failed` (or `Closed` if
    /// teardown was requested) with the transport closed.
    pub async fn run(&mut self) -> Result<SessionId, SignalingError> {
        if self.session.state != NegotiationState::Idle {
            return Err(SignalingError::InvalidTransition {
                from: self.session.state,
                to: NegotiationState::Connected,
            });
        }
        self.deadline = Instant::now() + self.config.state_timeout;

        let negotiated = match self.session.role {
            Role::Offerer => self.offer().await,
            Role::Answerer => self.answer().await,
        };
        let outcome = match negotiated {
            Ok(()) => self.exchange_candidates().await,
            Err(err) => Err(err),
        };

        match outcome {
            Ok(()) => self
                .session
                .id
                .clone()
                .ok_or_else(|| SignalingError::MissingSession(self.session.label())),
            Err(SignalingError::Closed) => {
                self.shutdown(NegotiationState::Closed).await;
                Err(SignalingError::Closed)
            }
            Err(err) => {
                self.fail(err.clone()).await;
                Err(err)
            }
        }
    }

    /// Follow a connected session until the transport fails or closes
    pub async fn monitor(&mut self) -> NegotiationState {
        while self.session.state == NegotiationState::Connected {
            tokio::select! {
                Some(Command::Close) = self.commands.recv() => {
                    self.shutdown(NegotiationState::Closed).await;
                }
                event = self.events.recv() => match event {
                    Some(TransportEvent::Failed(reason)) => {
                        self.fail(SignalingError::TransportFailed(reason)).await;
                    }
                    Some(TransportEvent::Closed) | None => {
                        self.shutdown(NegotiationState::Closed).await;
                    }
                    Some(other) => trace!(event = ?other, "Ignoring transport event after connect"),
                },
            }
        }
        self.session.state
    }

    /// Tear the session down from the owning task
    pub async fn close(&mut self) {
        if !self.session.state.is_terminal() {
            self.shutdown(NegotiationState::Closed).await;
        }
    }

    async fn offer(&mut self) -> Result<(), SignalingError> {
        let transport = self.transport.clone();
        let offer = self
            .guarded(async move {
                transport
                    .create_offer()
                    .await
                    .map(patch_description)
                    .map_err(SignalingError::from)
            })
            .await?;

        let transport = self.transport.clone();
        let local = offer.clone();
        self.guarded(async move {
            transport
                .set_local_description(local)
                .await
                .map_err(SignalingError::from)
        })
        .await?;
        self.session.local_description = Some(offer.clone());
        self.transition(NegotiationState::LocalDescriptionCreated)?;

        let exchange = self.exchange.clone();
        let record = SessionRecord::with_offer(offer);
        let id = self
            .guarded(async move { exchange.create_record(record).await.map_err(SignalingError::from) })
            .await?;
        self.session.id = Some(id.clone());
        self.transition(NegotiationState::LocalDescriptionPublished)?;

        let exchange = self.exchange.clone();
        let subscription = self
            .guarded(async move { exchange.subscribe_record(&id).await.map_err(SignalingError::from) })
            .await?;
        self.record_sub = Some(subscription);
        self.transition(NegotiationState::AwaitingRemoteDescription)
    }

    async fn answer(&mut self) -> Result<(), SignalingError> {
        let id = self.session_id()?;
        self.transition(NegotiationState::AwaitingRemoteDescription)?;

        let exchange = self.exchange.clone();
        let lookup = id.clone();
        let record = self
            .guarded(async move { exchange.get_record(&lookup).await.map_err(SignalingError::from) })
            .await?;
        let mut record = self.validate_record(&id, record)?;
        let offer = record
            .offer
            .clone()
            .ok_or_else(|| SignalingError::MissingSession(id.to_string()))?;

        let transport = self.transport.clone();
        let remote = offer.clone();
        self.guarded(async move {
            transport
                .set_remote_description(remote)
                .await
                .map_err(SignalingError::from)
        })
        .await?;
        self.session.remote_description = Some(offer);
        self.transition(NegotiationState::RemoteDescriptionApplied)?;

        let transport = self.transport.clone();
        let answer = self
            .guarded(async move {
                transport
                    .create_answer()
                    .await
                    .map(patch_description)
                    .map_err(SignalingError::from)
            })
            .await?;
        let transport = self.transport.clone();
        let local = answer.clone();
        self.guarded(async move {
            transport
                .set_local_description(local)
                .await
                .map_err(SignalingError::from)
        })
        .await?;
        self.session.local_description = Some(answer.clone());
        self.transition(NegotiationState::LocalDescriptionCreated)?;

        record.answer = Some(answer);
        let exchange = self.exchange.clone();
        let target = id.clone();
        self.guarded(async move {
            exchange
                .update_record(&target, record)
                .await
                .map_err(SignalingError::from)
        })
        .await?;
        self.transition(NegotiationState::LocalDescriptionPublished)?;

        self.subscribe_remote_candidates(id).await?;
        self.transition(NegotiationState::CandidateExchangeActive)
    }

    fn validate_record(
        &self,
        id: &SessionId,
        record: Option<SessionRecord>,
    ) -> Result<SessionRecord, SignalingError> {
        let record = record.ok_or_else(|| SignalingError::MissingSession(id.to_string()))?;
        match &record.offer {
            Some(offer) if offer.kind == SdpType::Offer => {}
            _ => return Err(SignalingError::MissingSession(id.to_string())),
        }
        if let (Some(ttl), Some(created)) = (self.config.session_ttl, record.created_at) {
            let expired = chrono::Duration::from_std(ttl)
                .map(|ttl| Utc::now().signed_duration_since(created) > ttl)
                .unwrap_or(false);
            if expired {
                return Err(SignalingError::ExpiredSession(id.to_string()));
            }
        }
        if record.answer.is_some() {
            warn!(session = %id, "Session record already carries an answer, replacing it");
        }
        Ok(record)
    }

    async fn subscribe_remote_candidates(&mut self, id: SessionId) -> Result<(), SignalingError> {
        let exchange = self.exchange.clone();
        let side = self.session.role.remote_side();
        let subscription = self
            .guarded(async move {
                exchange
                    .subscribe_candidates(&id, side)
                    .await
                    .map_err(SignalingError::from)
            })
            .await?;
        self.candidate_sub = Some(subscription);
        Ok(())
    }

    async fn exchange_candidates(&mut self) -> Result<(), SignalingError> {
        while self.session.state != NegotiationState::Connected {
            let state = self.session.state;
            let deadline = self.deadline;
            tokio::select! {
                Some(Command::Close) = self.commands.recv() => return Err(SignalingError::Closed),
                event = self.events.recv() => match event {
                    Some(event) => self.on_transport_event(event)?,
                    None => {
                        return Err(SignalingError::TransportFailed(
                            "transport event stream ended".into(),
                        ))
                    }
                },
                record = next_change(&mut self.record_sub) => self.on_record(record).await?,
                candidate = next_change(&mut self.candidate_sub) => self.on_remote_candidate(candidate).await,
                _ = sleep_until(deadline) => return Err(SignalingError::Timeout(state)),
            }
        }

        self.record_sub = None;
        self.candidate_sub = None;
        info!(
            session = %self.session.label(),
            role = ?self.session.role,
            remote_candidates = self.remote_candidates,
            "Negotiation complete, exchange store released"
        );
        Ok(())
    }

    fn on_transport_event(&mut self, event: TransportEvent) -> Result<(), SignalingError> {
        match event {
            TransportEvent::LocalCandidate(candidate) => {
                self.publish_candidate(candidate);
                Ok(())
            }
            TransportEvent::GatheringComplete => {
                debug!(session = %self.session.label(), "Local candidate gathering complete");
                Ok(())
            }
            TransportEvent::Connected => self.transition(NegotiationState::Connected),
            TransportEvent::Failed(reason) => Err(SignalingError::TransportFailed(reason)),
            TransportEvent::Closed => Err(SignalingError::Closed),
        }
    }

    async fn on_record(&mut self, record: Option<SessionRecord>) -> Result<(), SignalingError> {
        let Some(record) = record else {
            self.record_sub = None;
            if self.session.remote_description.is_none() {
                return Err(SignalingError::MissingSession(self.session.label()));
            }
            return Ok(());
        };
        if self.session.remote_description.is_some() {
            return Ok(());
        }
        let Some(answer) = record.answer else {
            trace!(session = %self.session.label(), "Session record changed without an answer");
            return Ok(());
        };
        if answer.kind != SdpType::Answer {
            warn!(session = %self.session.label(), kind = ?answer.kind, "Ignoring non-answer description");
            return Ok(());
        }

        let transport = self.transport.clone();
        let remote = answer.clone();
        self.guarded(async move {
            transport
                .set_remote_description(remote)
                .await
                .map_err(SignalingError::from)
        })
        .await?;
        self.session.remote_description = Some(answer);
        self.transition(NegotiationState::RemoteDescriptionApplied)?;

        // The answer is all the offerer needs from the record
        self.record_sub = None;
        let id = self.session_id()?;
        self.subscribe_remote_candidates(id).await?;
        self.transition(NegotiationState::CandidateExchangeActive)
    }

    async fn on_remote_candidate(&mut self, record: Option<CandidateRecord>) {
        let Some(record) = record else {
            warn!(session = %self.session.label(), "Remote candidate feed ended");
            self.candidate_sub = None;
            return;
        };
        self.remote_candidates += 1;
        debug!(
            session = %self.session.label(),
            seq = record.seq,
            foundation = record.candidate.foundation().unwrap_or("?"),
            kind = record.candidate.kind().unwrap_or("?"),
            "Applying remote candidate"
        );
        if let Err(err) = self.transport.add_remote_candidate(record.candidate).await {
            warn!(session = %self.session.label(), error = %err, "Remote candidate rejected");
        }
    }

    /// Append a local candidate without blocking the event loop
    fn publish_candidate(&self, candidate: IceCandidate) {
        let Some(id) = self.session.id.clone() else {
            warn!("Dropping local candidate, session has no identifier");
            return;
        };
        let exchange = self.exchange.clone();
        let side = self.session.role.local_side();
        let retries = self.config.append_retries;
        let backoff = self.config.append_backoff;

        tokio::spawn(async move {
            let mut attempt = 0u32;
            loop {
                match exchange.append_candidate(&id, side, candidate.clone()).await {
                    Ok(()) => {
                        trace!(session = %id, ?side, "Published local candidate");
                        break;
                    }
                    Err(err) if attempt < retries => {
                        attempt += 1;
                        warn!(session = %id, attempt, error = %err, "Candidate append failed, retrying");
                        sleep(backoff * attempt).await;
                    }
                    Err(err) => {
                        warn!(session = %id, error = %err, "Giving up on local candidate");
                        break;
                    }
                }
            }
        });
    }

    /// Run one awaited step, racing it against teardown and the state deadline
    async fn guarded<T, F>(&mut self, step: F) -> Result<T, SignalingError>
    where
        F: Future<Output = Result<T, SignalingError>>,
    {
        let state = self.session.state;
        let deadline = self.deadline;
        tokio::select! {
            Some(Command::Close) = self.commands.recv() => Err(SignalingError::Closed),
            result = step => result,
            _ = sleep_until(deadline) => Err(SignalingError::Timeout(state)),
        }
    }

    fn transition(&mut self, to: NegotiationState) -> Result<(), SignalingError> {
        let from = self.session.state;
        if !from.can_transition(self.session.role, to) {
            return Err(SignalingError::InvalidTransition { from, to });
        }
        self.session.state = to;
        self.history.push(to);
        self.deadline = Instant::now() + self.config.state_timeout;
        info!(
            session = %self.session.label(),
            role = ?self.session.role,
            from = ?from,
            to = ?to,
            "Negotiation state changed"
        );
        self.status.send_replace(self.session.clone());
        Ok(())
    }

    async fn fail(&mut self, err: SignalingError) {
        error!(
            session = %self.session.label(),
            role = ?self.session.role,
            state = ?self.session.state,
            error = %err,
            "Negotiation failed"
        );
        self.failure = Some(err);
        self.shutdown(NegotiationState::Failed).await;
    }

    async fn shutdown(&mut self, to: NegotiationState) {
        self.record_sub = None;
        self.candidate_sub = None;
        self.transport.close().await;
        if let Err(err) = self.transition(to) {
            debug!(error = %err, "Negotiation already finished");
        }
    }

    fn session_id(&self) -> Result<SessionId, SignalingError> {
        self.session
            .id
            .clone()
            .ok_or_else(|| SignalingError::MissingSession(self.session.label()))
    }
}

async fn next_change<T>(subscription: &mut Option<Subscription<T>>) -> Option<T> {
    match subscription {
        Some(subscription) => subscription.next().await,
        None => std::future::pending().await,
    }
}
