//! Audio bridge application
//!
//! Receives raw `f32` audio over UDP, buffers it in the audio bridge and
//! renders it. Parameters can be edited through the HTTP control API.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fx_link::{
    audio::AudioBridge,
    config::AppConfig,
    network::{create_socket, AudioReceiver},
    params::ParameterStore,
    ui::{AppState, WebServer},
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

    tracing::info!("Starting audio bridge");

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;

    let bridge = Arc::new(AudioBridge::new(config.audio.ring_capacity));
    let store = Arc::new(ParameterStore::new());

    // Start web UI
    let web_server = WebServer::new(
        config.ui.clone(),
        AppState::new(store.clone(), bridge.clone(), None),
    );
    let _web_handle = web_server.start_background();
    tracing::info!(
        "Control API at http://{}:{}/api/status",
        config.ui.bind_address,
        config.ui.http_port
    );

    // Create and start network receiver
    let socket = create_socket(config.network.socket_addr()?, config.network.recv_buffer_size)?;
    let mut receiver = AudioReceiver::new(socket, bridge.clone());
    receiver.start()?;
    tracing::info!("Network receiver started on port {}", config.network.udp_port);

    #[cfg(feature = "playback")]
    let mut playback = {
        let mut playback = fx_link::audio::BridgePlayback::new(bridge.clone(), config.audio.sample_rate)?;
        playback.start()?;
        tracing::info!("Rendering to the default output device");
        playback
    };

    // Without an output device, pull at the renderer's cadence so the ring drains
    #[cfg(not(feature = "playback"))]
    let render_task = {
        let bridge = bridge.clone();
        let quantum = config.audio.render_quantum;
        let period = Duration::from_secs_f64(quantum as f64 / config.audio.sample_rate as f64);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            let mut frame = vec![0.0f32; quantum];
            loop {
                ticker.tick().await;
                bridge.pull_into(&mut frame);
            }
        })
    };

    let mut stats_interval = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = stats_interval.tick() => {
                receiver.check_errors();
                #[cfg(feature = "playback")]
                if let Some(e) = playback.check_errors() {
                    tracing::warn!("Playback error: {}", e);
                }

                let recv_stats = receiver.stats();
                let bridge_stats = bridge.stats();
                tracing::info!(
                    "Receiver: {} packets, {} samples, {} invalid | ring {}/{} ({} overruns, {} underruns) | {} silent frames",
                    recv_stats.packets_received,
                    recv_stats.samples_received,
                    recv_stats.invalid_packets,
                    bridge_stats.buffer.size,
                    bridge_stats.buffer.capacity,
                    bridge_stats.buffer.overruns,
                    bridge_stats.buffer.underruns,
                    bridge_stats.silence_frames
                );
            }
        }
    }

    tracing::info!("Shutting down");
    receiver.stop();
    bridge.close();
    #[cfg(feature = "playback")]
    playback.stop();
    #[cfg(not(feature = "playback"))]
    render_task.abort();
    Ok(())
}
