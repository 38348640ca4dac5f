//! Parameter synchronization over an unreliable side channel
//!
//! Outbound: locally originated changes queued by the [`ParameterStore`]
//! are encoded as [`FxMessage`]s and written to the data channel. If the
//! channel is not open yet the change is dropped (and counted); it stays
//! applied locally.
//!
//! Inbound: raw messages are decoded and applied with [`Origin::Remote`],
//! which is what keeps them from being sent back. Malformed messages and
//! unknown paths are logged and dropped; the channel stays open.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::params::{Origin, ParameterChange, ParameterDelta, ParameterStore};
use crate::protocol::FxMessage;

/// Message channel carrying the parameter protocol
///
/// Sends must not block; delivery may be lossy but is expected to keep
/// per-sender order.
pub trait DataChannel: Send + Sync {
    fn is_open(&self) -> bool;

    fn send_text(&self, text: String) -> Result<(), SyncError>;

    fn close(&self);
}

/// Parameter channel statistics
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SyncStats {
    pub sent: u64,
    pub dropped_unopened: u64,
    pub received: u64,
    pub rejected: u64,
}

/// Bidirectional parameter sync bound to one store and one channel
pub struct ParameterSyncChannel<C: DataChannel> {
    store: Arc<ParameterStore>,
    channel: Arc<C>,
    shutdown: Notify,
    sent: AtomicU64,
    dropped_unopened: AtomicU64,
    received: AtomicU64,
    rejected: AtomicU64,
}

impl<C: DataChannel> ParameterSyncChannel<C> {
    pub fn new(store: Arc<ParameterStore>, channel: Arc<C>) -> Self {
        Self {
            store,
            channel,
            shutdown: Notify::new(),
            sent: AtomicU64::new(0),
            dropped_unopened: AtomicU64::new(0),
            received: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn channel(&self) -> &Arc<C> {
        &self.channel
    }

    /// Transmit one locally originated change
    ///
    /// Returns whether the message was handed to the channel.
    pub fn send(&self, change: &ParameterChange) -> bool {
        self.transmit(FxMessage::from_change(change))
    }

    fn transmit(&self, message: FxMessage) -> bool {
        if !self.channel.is_open() {
            debug!(path = %message.what_changed, "Parameter channel not open, change kept local");
            self.dropped_unopened.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let encoded = match message.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("Failed to encode parameter message: {}", e);
                return false;
            }
        };

        match self.channel.send_text(encoded) {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                warn!(path = %message.what_changed, "Parameter send failed: {}", e);
                self.dropped_unopened.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Decode and apply one inbound message without re-sending it
    ///
    /// Returns the delta as stored, or `None` if the message was dropped.
    pub fn receive(&self, raw: &str) -> Option<ParameterDelta> {
        self.received.fetch_add(1, Ordering::Relaxed);
        match self.decode_and_apply(raw) {
            Ok(applied) => Some(applied),
            Err(e) => {
                warn!("Dropping parameter message: {}", e);
                self.rejected.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn decode_and_apply(&self, raw: &str) -> Result<ParameterDelta, SyncError> {
        let delta = FxMessage::decode_delta(raw)?;
        Ok(self.store.apply(delta, Origin::Remote)?)
    }

    /// Announce every leaf that differs from the defaults, one message each
    ///
    /// Used by the initiating side right after connecting so the peer
    /// converges on its values. The messages go through the store's
    /// outbound queue, the same path as live edits, and are written by
    /// [`run`](Self::run). Returns the number of messages queued.
    pub fn push_snapshot(&self) -> usize {
        let queued = self.store.enqueue_non_defaults();
        info!(queued, "Queued parameter snapshot for peer");
        queued
    }

    /// Pump outbound changes and inbound messages until the inbound side
    /// ends or [`close`](Self::close) is called
    pub async fn run(
        &self,
        mut outbound: mpsc::UnboundedReceiver<ParameterChange>,
        mut inbound: mpsc::UnboundedReceiver<String>,
    ) {
        let mut outbound_open = true;
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => break,
                change = outbound.recv(), if outbound_open => match change {
                    Some(change) => {
                        self.send(&change);
                    }
                    None => outbound_open = false,
                },
                raw = inbound.recv() => match raw {
                    Some(raw) => {
                        self.receive(&raw);
                    }
                    None => break,
                },
            }
        }
        debug!("Parameter sync loop finished");
    }

    /// Close the data channel and stop the pump loop
    pub fn close(&self) {
        self.channel.close();
        self.shutdown.notify_one();
    }

    pub fn stats(&self) -> SyncStats {
        SyncStats {
            sent: self.sent.load(Ordering::Relaxed),
            dropped_unopened: self.dropped_unopened.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ParamValue, ParameterSet};
    use crate::sync::loopback::LoopbackChannel;

    fn sync_pair() -> (
        (Arc<ParameterStore>, ParameterSyncChannel<LoopbackChannel>, mpsc::UnboundedReceiver<String>),
        (Arc<ParameterStore>, ParameterSyncChannel<LoopbackChannel>, mpsc::UnboundedReceiver<String>),
    ) {
        let ((a, a_rx), (b, b_rx)) = LoopbackChannel::pair();
        let a_store = Arc::new(ParameterStore::new());
        let b_store = Arc::new(ParameterStore::new());
        let a_sync = ParameterSyncChannel::new(a_store.clone(), Arc::new(a));
        let b_sync = ParameterSyncChannel::new(b_store.clone(), Arc::new(b));
        ((a_store, a_sync, a_rx), (b_store, b_sync, b_rx))
    }

    #[test]
    fn test_send_on_unopened_channel_is_dropped() {
        let ((store, sync, _), (_, _, mut peer_rx)) = sync_pair();
        let mut outbound = store.attach_outbound();
        store
            .apply(ParameterDelta::new("gain.gain", 5.0).unwrap(), Origin::Local)
            .unwrap();

        assert!(!sync.send(&outbound.try_recv().unwrap()));
        assert_eq!(sync.stats().dropped_unopened, 1);
        assert!(peer_rx.try_recv().is_err());
        assert_eq!(store.snapshot().gain.gain, 5.0);
    }

    #[test]
    fn test_receive_applies_without_echo() {
        let ((a_store, a_sync, _), (b_store, b_sync, mut b_rx)) = sync_pair();
        a_sync.channel().open();
        let mut a_out = a_store.attach_outbound();
        let mut b_out = b_store.attach_outbound();

        a_store
            .apply(ParameterDelta::new("comp.threshold", -18.0).unwrap(), Origin::Local)
            .unwrap();
        assert!(a_sync.send(&a_out.try_recv().unwrap()));

        let raw = b_rx.try_recv().unwrap();
        let applied = b_sync.receive(&raw).unwrap();
        assert_eq!(applied.value, ParamValue::Number(-18.0));
        assert_eq!(b_store.snapshot().comp.threshold, -18.0);
        // Remote apply queued nothing for the way back
        assert!(b_out.try_recv().is_err());
    }

    #[test]
    fn test_malformed_and_unknown_messages_are_dropped() {
        let ((_, _, _), (b_store, b_sync, _)) = sync_pair();
        assert!(b_sync.receive("garbage").is_none());

        let mut message = serde_json::to_value(FxMessage {
            values: ParameterSet::default(),
            what_changed: "comp.reduction".into(),
        })
        .unwrap();
        assert!(b_sync.receive(&message.to_string()).is_none());

        message["whatChanged"] = "comp.ratio".into();
        message["comp"]["ratio"] = serde_json::json!(500.0);
        let applied = b_sync.receive(&message.to_string()).unwrap();
        assert_eq!(applied.value, ParamValue::Number(20.0));

        let stats = b_sync.stats();
        assert_eq!(stats.received, 3);
        assert_eq!(stats.rejected, 2);
        assert_eq!(b_store.snapshot().comp.ratio, 20.0);
    }

    #[test]
    fn test_push_snapshot_sends_non_default_leaves() {
        let ((a_store, a_sync, _), (b_store, b_sync, mut b_rx)) = sync_pair();
        a_sync.channel().open();
        a_store
            .apply(ParameterDelta::new("pan.pan", 0.5).unwrap(), Origin::Local)
            .unwrap();
        a_store
            .apply(ParameterDelta::new("rev.type", "Deep Space").unwrap(), Origin::Local)
            .unwrap();

        let mut a_out = a_store.attach_outbound();
        assert_eq!(a_sync.push_snapshot(), 2);
        while let Ok(change) = a_out.try_recv() {
            assert!(a_sync.send(&change));
        }
        while let Ok(raw) = b_rx.try_recv() {
            b_sync.receive(&raw);
        }
        assert_eq!(b_store.snapshot(), a_store.snapshot());
    }

    #[tokio::test]
    async fn test_run_pumps_until_closed() {
        let ((a_store, a_sync, a_rx), (b_store, b_sync, b_rx)) = sync_pair();
        a_sync.channel().open();
        let a_out = a_store.attach_outbound();
        let b_out = b_store.attach_outbound();
        let a_sync = Arc::new(a_sync);
        let b_sync = Arc::new(b_sync);

        let a_task = tokio::spawn({
            let a_sync = a_sync.clone();
            async move { a_sync.run(a_out, a_rx).await }
        });
        let b_task = tokio::spawn({
            let b_sync = b_sync.clone();
            async move { b_sync.run(b_out, b_rx).await }
        });

        a_store
            .apply(ParameterDelta::new("eq.freq", 2500.0).unwrap(), Origin::Local)
            .unwrap();
        b_store
            .apply(ParameterDelta::new("comp.bypass", true).unwrap(), Origin::Local)
            .unwrap();

        for _ in 0..100 {
            if b_store.snapshot().eq.freq == 2500.0 && a_store.snapshot().comp.bypass {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(b_store.snapshot().eq.freq, 2500.0);
        assert!(a_store.snapshot().comp.bypass);

        a_sync.close();
        b_sync.close();
        a_task.await.unwrap();
        b_task.await.unwrap();

        // One message each way, no echoes
        assert_eq!(a_sync.stats().sent, 1);
        assert_eq!(b_sync.stats().sent, 1);
        assert_eq!(a_sync.stats().received, 1);
        assert_eq!(b_sync.stats().received, 1);
    }
}
