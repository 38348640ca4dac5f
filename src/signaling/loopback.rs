//! In-process peer transport
//!
//! Stands in for a real media transport when both peers live in the same
//! process. Setting the local description "discovers" the configured
//! candidates; the transport reports itself connected once it holds a
//! remote description and enough remote candidates.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::TransportError;
use crate::signaling::transport::{PeerTransport, TransportEvent};
use crate::signaling::types::{IceCandidate, SdpType, SessionDescription};

#[derive(Default)]
struct LoopbackState {
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    applied: HashSet<IceCandidate>,
    applied_order: Vec<IceCandidate>,
    duplicate_applies: usize,
    connected: bool,
    closed: bool,
}

/// Transport that connects without touching the network
pub struct LoopbackTransport {
    name: String,
    candidates: Vec<IceCandidate>,
    required_remote: usize,
    events: mpsc::UnboundedSender<TransportEvent>,
    state: Mutex<LoopbackState>,
}

impl LoopbackTransport {
    /// Create a transport announcing a host and a server-reflexive candidate
    pub fn new(name: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let name = name.into();
        let candidates = vec![
            IceCandidate::new(format!(
                "candidate:{}h 1 udp 2122260223 192.168.1.10 50000 typ host generation 0",
                name
            )),
            IceCandidate::new(format!(
                "candidate:{}s 1 udp 1686052607 203.0.113.10 50001 typ srflx raddr 192.168.1.10 rport 50000",
                name
            )),
        ];
        Self::with_candidates(name, candidates, 1)
    }

    /// Create a transport that connects after `required_remote` distinct
    /// remote candidates have been applied
    pub fn with_candidates(
        name: impl Into<String>,
        candidates: Vec<IceCandidate>,
        required_remote: usize,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let transport = Self {
            name: name.into(),
            candidates,
            required_remote: required_remote.max(1),
            events,
            state: Mutex::new(LoopbackState::default()),
        };
        (transport, rx)
    }

    /// Distinct remote candidates applied, in first-application order
    pub fn applied_candidates(&self) -> Vec<IceCandidate> {
        self.state.lock().applied_order.clone()
    }

    /// Applications that repeated an already applied candidate
    pub fn duplicate_applies(&self) -> usize {
        self.state.lock().duplicate_applies
    }

    pub fn local_description(&self) -> Option<SessionDescription> {
        self.state.lock().local.clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.state.lock().remote.clone()
    }

    /// Report a permanent failure, as a real transport would on ICE failure
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Failed(reason.into()));
    }

    fn emit(&self, event: TransportEvent) {
        // The receiver goes away when negotiation is over; nothing to report then
        let _ = self.events.send(event);
    }

    fn check_connected(&self, state: &mut LoopbackState) {
        if !state.connected && state.remote.is_some() && state.applied.len() >= self.required_remote {
            state.connected = true;
            debug!(transport = %self.name, "Loopback transport connected");
            self.emit(TransportEvent::Connected);
        }
    }

    fn describe(&self, kind: &str) -> String {
        format!(
            "v=0\r\no=- {} 2 IN IP4 127.0.0.1\r\ns={}\r\nt=0 0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
             a=rtpmap:111 opus/48000/2\r\na=fmtp:111 minptime=10;useinbandfec=1\r\n",
            kind, self.name
        )
    }

    fn ensure_open(&self, state: &LoopbackState) -> Result<(), TransportError> {
        if state.closed {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PeerTransport for LoopbackTransport {
    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        self.ensure_open(&self.state.lock())?;
        Ok(SessionDescription::offer(self.describe("offer")))
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        let state = self.state.lock();
        self.ensure_open(&state)?;
        match &state.remote {
            Some(remote) if remote.kind == SdpType::Offer => {
                Ok(SessionDescription::answer(self.describe("answer")))
            }
            _ => Err(TransportError::InvalidState("no remote offer".into())),
        }
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), TransportError> {
        {
            let mut state = self.state.lock();
            self.ensure_open(&state)?;
            state.local = Some(description);
        }
        for candidate in &self.candidates {
            self.emit(TransportEvent::LocalCandidate(candidate.clone()));
        }
        self.emit(TransportEvent::GatheringComplete);
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        self.ensure_open(&state)?;
        if description.sdp.trim().is_empty() {
            return Err(TransportError::DescriptionRejected("empty description".into()));
        }
        state.remote = Some(description);
        self.check_connected(&mut state);
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        self.ensure_open(&state)?;
        if state.remote.is_none() {
            return Err(TransportError::InvalidState("remote description not set".into()));
        }
        if candidate.candidate.trim().is_empty() {
            return Err(TransportError::CandidateRejected("empty candidate".into()));
        }
        if state.applied.insert(candidate.clone()) {
            state.applied_order.push(candidate);
        } else {
            state.duplicate_applies += 1;
        }
        self.check_connected(&mut state);
        Ok(())
    }

    async fn close(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            self.emit(TransportEvent::Closed);
        }
    }
}
