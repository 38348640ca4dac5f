//! End-to-end parameter synchronization between two peers.

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;

use fx_link::audio::AudioBridge;
use fx_link::error::SyncError;
use fx_link::link::CallLink;
use fx_link::params::{Origin, ParamValue, ParameterDelta, ParameterSet, ParameterStore};
use fx_link::signaling::{InMemoryExchange, LoopbackTransport, NegotiationConfig, NegotiationState, NegotiationStateMachine};
use fx_link::sync::{DataChannel, LoopbackChannel, ParameterSyncChannel};

struct Peer {
    store: Arc<ParameterStore>,
    sync: Arc<ParameterSyncChannel<LoopbackChannel>>,
    inbox: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedReceiver<fx_link::params::ParameterChange>,
}

fn peers() -> (Peer, Peer) {
    let ((a, a_inbox), (b, b_inbox)) = LoopbackChannel::pair();
    a.open();
    let make = |channel: LoopbackChannel, inbox| {
        let store = Arc::new(ParameterStore::new());
        let outbound = store.attach_outbound();
        Peer {
            sync: Arc::new(ParameterSyncChannel::new(store.clone(), Arc::new(channel))),
            store,
            inbox,
            outbound,
        }
    };
    (make(a, a_inbox), make(b, b_inbox))
}

#[test]
fn local_edit_produces_exact_wire_message_and_no_echo() {
    let (mut a, mut b) = peers();

    a.store
        .apply(ParameterDelta::new("comp.threshold", -18.0).unwrap(), Origin::Local)
        .unwrap();
    let change = a.outbound.try_recv().unwrap();
    assert!(a.outbound.try_recv().is_err(), "exactly one outbound change");
    assert!(a.sync.send(&change));

    let raw = b.inbox.try_recv().unwrap();
    let wire: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(wire["whatChanged"], "comp.threshold");
    assert_eq!(wire["comp"]["threshold"], -18.0);
    assert_eq!(wire["comp"]["ratio"], 12.0);
    assert_eq!(wire["comp"]["knee"], 30.0);
    for stage in ["comp", "rev", "eq", "pan", "gain"] {
        assert!(wire[stage].is_object(), "missing stage {}", stage);
    }

    let applied = b.sync.receive(&raw).unwrap();
    assert_eq!(applied.value, ParamValue::Number(-18.0));
    assert_eq!(b.store.snapshot().comp.threshold, -18.0);

    // Nothing queued on the receiving side, nothing travelled back
    assert!(b.outbound.try_recv().is_err());
    assert!(a.inbox.try_recv().is_err());
}

#[tokio::test]
async fn pumped_channels_converge_without_echo() {
    let (a, b) = peers();
    let Peer { store: a_store, sync: a_sync, inbox: a_inbox, outbound: a_outbound } = a;
    let Peer { store: b_store, sync: b_sync, inbox: b_inbox, outbound: b_outbound } = b;
    let a_task = {
        let sync = a_sync.clone();
        tokio::spawn(async move { sync.run(a_outbound, a_inbox).await })
    };
    let b_task = {
        let sync = b_sync.clone();
        tokio::spawn(async move { sync.run(b_outbound, b_inbox).await })
    };

    a_store
        .apply(ParameterDelta::new("rev.type", "Deep Space").unwrap(), Origin::Local)
        .unwrap();
    b_store
        .apply(ParameterDelta::new("eq.bypass", true).unwrap(), Origin::Local)
        .unwrap();
    a_store
        .apply(ParameterDelta::new("gain.gain", 50.0).unwrap(), Origin::Local)
        .unwrap();

    for _ in 0..100 {
        if a_store.snapshot() == b_store.snapshot() && b_sync.stats().received == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let snapshot = b_store.snapshot();
    assert_eq!(snapshot, a_store.snapshot());
    assert_eq!(snapshot.rev.kind, "Deep Space");
    assert!(snapshot.eq.bypass);
    assert_eq!(snapshot.gain.gain, 20.0);

    // Two sends from a, one from b, and nothing bounced back
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(a_sync.stats().sent, 2);
    assert_eq!(b_sync.stats().sent, 1);
    assert_eq!(a_sync.stats().received, 1);
    assert_eq!(b_sync.stats().received, 2);

    a_sync.close();
    b_sync.close();
    a_task.await.unwrap();
    b_task.await.unwrap();
}

#[test]
fn remote_applies_never_swallow_local_edits() {
    let (_a, mut b) = peers();
    let mut remote = ParameterSet::default();
    remote.pan.pan = 0.5;
    let raw = serde_json::json!({
        "comp": remote.comp, "rev": remote.rev, "eq": remote.eq,
        "pan": remote.pan, "gain": remote.gain, "whatChanged": "pan.pan"
    })
    .to_string();

    let receiver = {
        let sync = b.sync.clone();
        thread::spawn(move || {
            for _ in 0..500 {
                assert!(sync.receive(&raw).is_some());
            }
        })
    };
    for i in 0..500 {
        let value = (i % 20) as f64;
        b.store
            .apply(ParameterDelta::new("gain.gain", value).unwrap(), Origin::Local)
            .unwrap();
    }
    receiver.join().unwrap();

    let mut local = 0;
    while let Ok(change) = b.outbound.try_recv() {
        assert_eq!(change.delta.path.to_string(), "gain.gain");
        local += 1;
    }
    assert_eq!(local, 500);
}

#[test]
fn cold_start_push_converges_on_the_initiator() {
    let (mut a, mut b) = peers();
    for (path, value) in [
        ("comp.threshold", ParamValue::Number(-30.0)),
        ("rev.bypass", ParamValue::Bool(true)),
        ("eq.type", ParamValue::Choice("highshelf".into())),
    ] {
        a.store
            .apply(ParameterDelta::new(path, value).unwrap(), Origin::Remote)
            .unwrap();
    }

    assert_eq!(a.sync.push_snapshot(), 3);
    while let Ok(change) = a.outbound.try_recv() {
        assert!(a.sync.send(&change));
    }
    while let Ok(raw) = b.inbox.try_recv() {
        b.sync.receive(&raw).unwrap();
    }
    assert_eq!(b.store.snapshot(), a.store.snapshot());
    assert!(b.outbound.try_recv().is_err());
}

/// Data channel that stalls on its first write and records what it sends
struct StallingChannel {
    inner: LoopbackChannel,
    stall: Duration,
    writes: Mutex<Vec<String>>,
}

impl DataChannel for StallingChannel {
    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn send_text(&self, text: String) -> Result<(), SyncError> {
        let first = {
            let mut writes = self.writes.lock();
            let wire: serde_json::Value = serde_json::from_str(&text).unwrap();
            let path = wire["whatChanged"].as_str().unwrap().to_string();
            let (stage, field) = path.split_once('.').unwrap();
            writes.push(format!("{}={}", path, wire[stage][field]));
            writes.len() == 1
        };
        if first {
            thread::sleep(self.stall);
        }
        self.inner.send_text(text)
    }

    fn close(&self) {
        self.inner.close()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn edit_during_cold_start_push_is_not_overwritten() {
    let ((a, a_inbox), (b, b_inbox)) = LoopbackChannel::pair();
    a.open();
    let a_channel = Arc::new(StallingChannel {
        inner: a,
        stall: Duration::from_millis(50),
        writes: Mutex::new(Vec::new()),
    });

    let a_store = Arc::new(ParameterStore::new());
    let b_store = Arc::new(ParameterStore::new());
    for (path, value) in [("comp.ratio", 4.0), ("gain.gain", 6.0)] {
        a_store
            .apply(ParameterDelta::new(path, value).unwrap(), Origin::Remote)
            .unwrap();
    }
    let a_sync = Arc::new(ParameterSyncChannel::new(a_store.clone(), a_channel.clone()));
    let b_sync = Arc::new(ParameterSyncChannel::new(b_store.clone(), Arc::new(b)));
    let a_outbound = a_store.attach_outbound();
    let b_outbound = b_store.attach_outbound();
    let a_task = tokio::spawn({
        let sync = a_sync.clone();
        async move { sync.run(a_outbound, a_inbox).await }
    });
    let b_task = tokio::spawn({
        let sync = b_sync.clone();
        async move { sync.run(b_outbound, b_inbox).await }
    });

    assert_eq!(a_sync.push_snapshot(), 2);
    // Edit lands while the first snapshot message is still being written
    tokio::time::sleep(Duration::from_millis(10)).await;
    a_store
        .apply(ParameterDelta::new("gain.gain", 9.0).unwrap(), Origin::Local)
        .unwrap();

    for _ in 0..200 {
        if b_sync.stats().received == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(
        *a_channel.writes.lock(),
        vec!["comp.ratio=4.0", "gain.gain=6.0", "gain.gain=9.0"]
    );
    assert_eq!(a_store.snapshot().gain.gain, 9.0);
    assert_eq!(b_store.snapshot(), a_store.snapshot());

    a_sync.close();
    b_sync.close();
    a_task.await.unwrap();
    b_task.await.unwrap();
}

#[tokio::test]
async fn call_link_negotiates_then_syncs_and_closes() {
    let exchange = Arc::new(InMemoryExchange::default());
    let config = NegotiationConfig {
        state_timeout: Duration::from_secs(2),
        ..Default::default()
    };
    let ((offer_channel, offer_inbox), (answer_channel, answer_inbox)) = LoopbackChannel::pair();

    let offer_store = Arc::new(ParameterStore::new());
    offer_store
        .apply(ParameterDelta::new("pan.pan", -1.0).unwrap(), Origin::Local)
        .unwrap();
    let answer_store = Arc::new(ParameterStore::new());

    let (transport, events) = LoopbackTransport::new("offerer");
    let mut offer_link = CallLink::start(
        NegotiationStateMachine::offerer(config.clone(), exchange.clone(), Arc::new(transport), events),
        offer_store.clone(),
        Arc::new(AudioBridge::new(1024)),
        Arc::new(offer_channel),
        offer_inbox,
    );
    let mut handle = offer_link.negotiation();
    let id = handle.session_id().await.unwrap();

    let (transport, events) = LoopbackTransport::new("answerer");
    let mut answer_link = CallLink::start(
        NegotiationStateMachine::answerer(config, exchange, Arc::new(transport), events, id.clone()),
        answer_store.clone(),
        Arc::new(AudioBridge::new(1024)),
        Arc::new(answer_channel),
        answer_inbox,
    );

    assert_eq!(handle.settled().await, NegotiationState::Connected);
    offer_link.sync().channel().open();
    assert_eq!(offer_link.connected().await, Ok(id.clone()));
    assert_eq!(answer_link.connected().await, Ok(id));

    // Cold-start push carried the edit made before the channel opened
    for _ in 0..100 {
        if answer_store.snapshot().pan.pan == -1.0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(answer_store.snapshot().pan.pan, -1.0);

    answer_link.bridge().on_network_batch(&[0.5; 64]);
    assert_eq!(answer_link.status().bridge.buffer.size, 64);

    assert_eq!(offer_link.close().await, NegotiationState::Closed);
    assert_eq!(answer_link.close().await, NegotiationState::Closed);

    // Edits after close stay local
    answer_store
        .apply(ParameterDelta::new("gain.gain", 9.0).unwrap(), Origin::Local)
        .unwrap();
    assert_eq!(offer_store.snapshot().gain.gain, 2.0);
}
