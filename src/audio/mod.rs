//! Audio subsystem module

pub mod bridge;
pub mod buffer;
#[cfg(feature = "playback")]
pub mod playback;

pub use bridge::{AudioBridge, BridgeStats};
pub use buffer::{RingBuffer, RingBufferStats, SILENCE};
#[cfg(feature = "playback")]
pub use playback::BridgePlayback;
