//! Canonical parameter store
//!
//! The only place the parameter set is mutated. Local edits (UI, HTTP) and
//! remote edits (the peer's sync channel) both go through [`ParameterStore::apply`],
//! which is serialized by a single lock. Each apply carries its [`Origin`];
//! only locally originated changes are queued for the peer, so a change
//! received from the network is never echoed back.

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::ParamError;
use crate::params::set::{ParameterDelta, ParameterSet};

/// Where an edit came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// UI or API edit on this side; propagated to the peer
    Local,
    /// Edit received from the peer; never propagated
    Remote,
}

/// A locally originated change, queued for the peer
#[derive(Debug, Clone)]
pub struct ParameterChange {
    pub delta: ParameterDelta,
    /// The full set right after the change was applied
    pub snapshot: ParameterSet,
}

/// Serialized store of the shared parameter set
pub struct ParameterStore {
    values: Mutex<ParameterSet>,
    outbound: Mutex<Option<mpsc::UnboundedSender<ParameterChange>>>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::with_values(ParameterSet::default())
    }

    pub fn with_values(values: ParameterSet) -> Self {
        Self {
            values: Mutex::new(values),
            outbound: Mutex::new(None),
        }
    }

    /// Attach a new outbound queue, replacing any previous one
    ///
    /// Changes applied while no queue is attached are kept locally only.
    pub fn attach_outbound(&self) -> mpsc::UnboundedReceiver<ParameterChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.outbound.lock() = Some(tx);
        rx
    }

    /// Drop the outbound queue
    pub fn detach_outbound(&self) {
        self.outbound.lock().take();
    }

    /// Apply a single-leaf change
    ///
    /// Numeric values are clamped into bounds. Returns the delta as stored.
    /// When `origin` is [`Origin::Local`] the stored delta and a snapshot are
    /// queued for the peer while the lock is still held, so queue order
    /// always matches apply order.
    pub fn apply(&self, delta: ParameterDelta, origin: Origin) -> Result<ParameterDelta, ParamError> {
        let mut values = self.values.lock();
        let stored = values.set(&delta.path, delta.value)?;
        let applied = ParameterDelta {
            path: delta.path,
            value: stored,
        };
        debug!(path = %applied.path, value = %applied.value, ?origin, "Parameter applied");

        if origin == Origin::Local {
            let mut outbound = self.outbound.lock();
            if let Some(tx) = outbound.as_ref() {
                let change = ParameterChange {
                    delta: applied.clone(),
                    snapshot: values.clone(),
                };
                if tx.send(change).is_err() {
                    warn!("Outbound parameter queue closed, detaching");
                    outbound.take();
                }
            }
        }

        Ok(applied)
    }

    /// Queue every leaf that differs from the defaults, one change each
    ///
    /// Taken under the same lock as [`apply`](Self::apply), so the queued
    /// changes sit before any local edit applied afterwards. Returns the
    /// number of changes queued; zero when no queue is attached.
    pub fn enqueue_non_defaults(&self) -> usize {
        let values = self.values.lock();
        let mut outbound = self.outbound.lock();
        let Some(tx) = outbound.as_ref() else {
            debug!("No outbound queue attached, nothing to announce");
            return 0;
        };

        let mut queued = 0;
        for delta in values.diff(&ParameterSet::default()) {
            let change = ParameterChange {
                delta,
                snapshot: values.clone(),
            };
            if tx.send(change).is_err() {
                warn!("Outbound parameter queue closed, detaching");
                outbound.take();
                break;
            }
            queued += 1;
        }
        queued
    }

    /// Current values of every leaf
    pub fn snapshot(&self) -> ParameterSet {
        self.values.lock().clone()
    }
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}
