//! In-process two-peer demo
//!
//! Runs an offerer and an answerer against an in-memory exchange store,
//! negotiates, then edits a parameter on one side and shows it arriving on
//! the other.

use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fx_link::{
    audio::AudioBridge,
    config::AppConfig,
    link::CallLink,
    params::{Origin, ParameterDelta, ParameterStore},
    signaling::{InMemoryExchange, LoopbackTransport, NegotiationState, NegotiationStateMachine},
    sync::LoopbackChannel,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;
    let negotiation = config.signaling.negotiation();

    let exchange = Arc::new(InMemoryExchange::from_config(&config.signaling));
    let ((offer_channel, offer_inbox), (answer_channel, answer_inbox)) = LoopbackChannel::pair();

    // The initiator's values win on first connect
    let offer_store = Arc::new(ParameterStore::new());
    offer_store.apply(ParameterDelta::new("rev.type", "Deep Space")?, Origin::Local)?;
    offer_store.apply(ParameterDelta::new("gain.gain", 6.0)?, Origin::Local)?;
    let answer_store = Arc::new(ParameterStore::new());

    let (offer_transport, offer_events) = LoopbackTransport::new("offerer");
    let offerer = NegotiationStateMachine::offerer(
        negotiation.clone(),
        exchange.clone(),
        Arc::new(offer_transport),
        offer_events,
    );
    let mut offer_link = CallLink::start(
        offerer,
        offer_store.clone(),
        Arc::new(AudioBridge::new(config.audio.ring_capacity)),
        Arc::new(offer_channel),
        offer_inbox,
    );

    let mut offer_handle = offer_link.negotiation();
    let Some(session_id) = offer_handle.session_id().await else {
        bail!("offerer failed before publishing a session");
    };
    println!("\nSession {} published in '{}'\n", session_id, config.signaling.collection);

    let (answer_transport, answer_events) = LoopbackTransport::new("answerer");
    let answerer = NegotiationStateMachine::answerer(
        negotiation,
        exchange.clone(),
        Arc::new(answer_transport),
        answer_events,
        session_id,
    );
    let mut answer_link = CallLink::start(
        answerer,
        answer_store.clone(),
        Arc::new(AudioBridge::new(config.audio.ring_capacity)),
        Arc::new(answer_channel),
        answer_inbox,
    );

    if offer_handle.settled().await != NegotiationState::Connected {
        bail!("negotiation did not connect: {:?}", offer_handle.state());
    }
    // A negotiated data channel opens with the transport
    offer_link.sync().channel().open();

    offer_link.connected().await?;
    answer_link.connected().await?;

    offer_store.apply(ParameterDelta::new("comp.threshold", -18.0)?, Origin::Local)?;
    answer_store.apply(ParameterDelta::new("pan.pan", -0.5)?, Origin::Local)?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let a = offer_store.snapshot();
    let b = answer_store.snapshot();
    println!("\n=== Parameters after sync ===");
    println!("  comp.threshold  offerer {:>6}  answerer {:>6}", a.comp.threshold, b.comp.threshold);
    println!("  gain.gain       offerer {:>6}  answerer {:>6}", a.gain.gain, b.gain.gain);
    println!("  pan.pan         offerer {:>6}  answerer {:>6}", a.pan.pan, b.pan.pan);
    println!("  rev.type        offerer {:?}  answerer {:?}", a.rev.kind, b.rev.kind);
    println!("  in sync: {}\n", a == b);

    let offer_state = offer_link.close().await;
    let answer_state = answer_link.close().await;
    tracing::info!("Closed: offerer {:?}, answerer {:?}", offer_state, answer_state);
    Ok(())
}
