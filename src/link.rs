//! One active call
//!
//! Ties a negotiation, the parameter channel and the audio bridge together
//! for the lifetime of a session and tears all three down on close.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audio::{AudioBridge, BridgeStats};
use crate::error::SignalingError;
use crate::params::ParameterStore;
use crate::signaling::{NegotiationHandle, NegotiationState, NegotiationStateMachine, Role, SessionId};
use crate::sync::{DataChannel, ParameterSyncChannel, SyncStats};

/// Point-in-time view of a call
#[derive(Debug, Clone, Serialize)]
pub struct LinkStatus {
    pub role: Role,
    pub state: NegotiationState,
    pub session_id: Option<SessionId>,
    pub bridge: BridgeStats,
    pub sync: SyncStats,
}

pub struct CallLink<C: DataChannel + 'static> {
    role: Role,
    store: Arc<ParameterStore>,
    bridge: Arc<AudioBridge>,
    sync: Arc<ParameterSyncChannel<C>>,
    negotiation: NegotiationHandle,
    negotiated: Option<oneshot::Receiver<Result<SessionId, SignalingError>>>,
    outcome: Option<Result<SessionId, SignalingError>>,
    negotiation_task: JoinHandle<NegotiationState>,
    sync_task: JoinHandle<()>,
}

impl<C: DataChannel + 'static> CallLink<C> {
    /// Start negotiating and pumping parameter messages
    ///
    /// `inbound` carries raw messages arriving on `channel`. Local edits
    /// made before the channel opens stay local.
    pub fn start(
        mut machine: NegotiationStateMachine,
        store: Arc<ParameterStore>,
        bridge: Arc<AudioBridge>,
        channel: Arc<C>,
        inbound: mpsc::UnboundedReceiver<String>,
    ) -> Self {
        let role = machine.role();
        let negotiation = machine.handle();
        let (negotiated_tx, negotiated) = oneshot::channel();

        let negotiation_task = tokio::spawn(async move {
            let result = machine.run().await;
            let connected = result.is_ok();
            let _ = negotiated_tx.send(result);
            if connected {
                machine.monitor().await
            } else {
                machine.state()
            }
        });

        let sync = Arc::new(ParameterSyncChannel::new(store.clone(), channel));
        let outbound = store.attach_outbound();
        let pump = sync.clone();
        let sync_task = tokio::spawn(async move { pump.run(outbound, inbound).await });

        info!(role = ?role, "Call link started");
        Self {
            role,
            store,
            bridge,
            sync,
            negotiation,
            negotiated: Some(negotiated),
            outcome: None,
            negotiation_task,
            sync_task,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn store(&self) -> &Arc<ParameterStore> {
        &self.store
    }

    pub fn bridge(&self) -> &Arc<AudioBridge> {
        &self.bridge
    }

    pub fn sync(&self) -> &Arc<ParameterSyncChannel<C>> {
        &self.sync
    }

    pub fn negotiation(&self) -> NegotiationHandle {
        self.negotiation.clone()
    }

    /// Wait for negotiation to finish
    ///
    /// Once connected, the offering side announces its non-default
    /// parameters so both peers start from the initiator's values.
    pub async fn connected(&mut self) -> Result<SessionId, SignalingError> {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        let outcome = match self.negotiated.take() {
            Some(rx) => rx.await.unwrap_or(Err(SignalingError::Closed)),
            None => Err(SignalingError::Closed),
        };

        if outcome.is_ok() && self.role == Role::Offerer {
            if self.sync.channel().is_open() {
                self.sync.push_snapshot();
            } else {
                warn!("Parameter channel not open after connect, skipping cold-start push");
            }
        }
        self.outcome = Some(outcome.clone());
        outcome
    }

    pub fn status(&self) -> LinkStatus {
        let session = self.negotiation.session();
        LinkStatus {
            role: self.role,
            state: session.state,
            session_id: session.id,
            bridge: self.bridge.stats(),
            sync: self.sync.stats(),
        }
    }

    /// End the call
    ///
    /// Unsubscribes from the exchange store, closes the transport, the
    /// parameter channel and the audio bridge. Messages in flight may be
    /// lost. Returns the final negotiation state.
    pub async fn close(self) -> NegotiationState {
        self.negotiation.close();
        self.sync.close();
        self.bridge.close();
        self.store.detach_outbound();

        if let Err(e) = self.sync_task.await {
            debug!("Parameter pump ended abnormally: {}", e);
        }
        let state = match self.negotiation_task.await {
            Ok(state) => state,
            Err(e) => {
                warn!("Negotiation task ended abnormally: {}", e);
                self.negotiation.state()
            }
        };
        info!(role = ?self.role, state = ?state, "Call link closed");
        state
    }
}
