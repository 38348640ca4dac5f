//! # FX Link
//!
//! Two-party real-time audio link with a shared, synchronized set of
//! effect parameters.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────── PEER A ─────────────────────────────────┐
//! │                                                                          │
//! │  ┌───────────────┐   local edit   ┌──────────────────┐                   │
//! │  │ HTTP control  │ ─────────────▶ │  ParameterStore  │                   │
//! │  │   (ui)        │                │  (params::store) │                   │
//! │  └───────────────┘                └────────┬─────────┘                   │
//! │                                  outbound  │  ▲ Origin::Remote           │
//! │                                   queue    ▼  │                          │
//! │                                ┌──────────────────────┐                  │
//! │                                │ ParameterSyncChannel │ ◀── data channel ┼──▶ peer
//! │                                │      (sync)          │                  │
//! │                                └──────────────────────┘                  │
//! │                                                                          │
//! │  ┌───────────────────────┐  offer / answer / candidates                  │
//! │  │ NegotiationStateMachine│ ◀──────────────────────────▶ SignalExchange ─┼──▶ shared store
//! │  │   (signaling)          │                                              │
//! │  └───────────────────────┘                                               │
//! │                                                                          │
//! │  UDP f32 packets ──▶ AudioReceiver ──▶ AudioBridge ──▶ RingBuffer ──▶ pull(n)
//! │   (network)                           (audio::bridge)  (audio::buffer)  renderer
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod link;
pub mod network;
pub mod params;
pub mod protocol;
pub mod signaling;
pub mod sync;
pub mod ui;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Sample rate shared by the network stream and the renderer
    pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

    /// Samples carried by one network audio packet
    pub const SAMPLES_PER_PACKET: usize = 512;

    /// Ring buffer capacity in samples
    pub const RING_BUFFER_CAPACITY: usize = SAMPLES_PER_PACKET * 1000;

    /// Samples pulled per render callback
    pub const RENDER_QUANTUM: usize = 128;

    /// Default UDP port for audio ingress
    pub const DEFAULT_UDP_PORT: u16 = 41234;

    /// Default port for the HTTP control API
    pub const DEFAULT_HTTP_PORT: u16 = 8080;

    /// Exchange store collection holding session records
    pub const SESSION_COLLECTION: &str = "calls1";
}
