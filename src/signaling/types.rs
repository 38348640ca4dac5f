//! Signaling data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque session identifier, assigned by the exchange store on creation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which side of the negotiation this peer plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Offerer,
    Answerer,
}

impl Role {
    /// Candidate sub-collection this role appends to
    pub fn local_side(&self) -> CandidateSide {
        match self {
            Role::Offerer => CandidateSide::Offer,
            Role::Answerer => CandidateSide::Answer,
        }
    }

    /// Candidate sub-collection this role listens to
    pub fn remote_side(&self) -> CandidateSide {
        match self {
            Role::Offerer => CandidateSide::Answer,
            Role::Answerer => CandidateSide::Offer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// Session description as stored in the session record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// The shared session document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer: Option<SessionDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<SessionDescription>,
    #[serde(default, rename = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn with_offer(offer: SessionDescription) -> Self {
        Self {
            offer: Some(offer),
            answer: None,
            created_at: Some(Utc::now()),
        }
    }
}

/// The two per-session candidate sub-collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateSide {
    Offer,
    Answer,
}

impl CandidateSide {
    /// Sub-collection name used when none is configured
    pub fn default_collection(&self) -> &'static str {
        match self {
            CandidateSide::Offer => "offerCandidates",
            CandidateSide::Answer => "answerCandidates",
        }
    }
}

/// A network path descriptor in its browser-compatible JSON shape
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
    #[serde(default)]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        }
    }

    fn attribute_fields(&self) -> impl Iterator<Item = &str> {
        self.candidate
            .strip_prefix("candidate:")
            .unwrap_or(&self.candidate)
            .split_whitespace()
    }

    /// Foundation token: first field of the candidate attribute
    pub fn foundation(&self) -> Option<&str> {
        self.attribute_fields().next()
    }

    /// Candidate type after the `typ` keyword (`host`, `srflx`, `relay`, ...)
    pub fn kind(&self) -> Option<&str> {
        let mut fields = self.attribute_fields();
        fields.find(|f| *f == "typ")?;
        fields.next()
    }
}

/// One appended entry of a candidate sub-collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub side: CandidateSide,
    /// Position in the sub-collection, assigned by the store
    pub seq: u64,
    pub candidate: IceCandidate,
}
