//! Network subsystem for UDP audio ingress

pub mod receiver;
pub mod udp;

pub use receiver::{decode_packet, AudioReceiver, ReceiverStats};
pub use udp::create_socket;
