//! Session negotiation through a shared exchange store

pub mod exchange;
pub mod loopback;
pub mod memory;
pub mod negotiation;
pub mod sdp;
pub mod transport;
pub mod types;

pub use exchange::{SignalExchange, Subscription};
pub use loopback::LoopbackTransport;
pub use memory::InMemoryExchange;
pub use negotiation::{
    NegotiationConfig, NegotiationHandle, NegotiationState, NegotiationStateMachine, Session,
};
pub use transport::{PeerTransport, TransportEvent};
pub use types::{
    CandidateRecord, CandidateSide, IceCandidate, Role, SdpType, SessionDescription, SessionId,
    SessionRecord,
};
