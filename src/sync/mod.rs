//! Parameter synchronization with the peer

pub mod channel;
pub mod loopback;

pub use channel::{DataChannel, ParameterSyncChannel, SyncStats};
pub use loopback::LoopbackChannel;
