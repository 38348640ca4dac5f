//! Parameter channel wire format
//!
//! Every message carries the complete parameter set plus the dotted path of
//! the one leaf that changed:
//!
//! ```json
//! {"comp":{"attack":0.003,"bypass":false,...},"rev":{...},"eq":{...},
//!  "pan":{...},"gain":{...},"whatChanged":"comp.threshold"}
//! ```
//!
//! Only the leaf named by `whatChanged` is read on receipt; the other
//! leaves may be missing or stale without affecting the edit.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SyncError;
use crate::params::{ParamPath, ParamValue, ParameterChange, ParameterDelta, ParameterSet};

/// `whatChanged` value of a message that changes nothing
pub const NOTHING_CHANGED: &str = "none";

/// One message on the parameter channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FxMessage {
    #[serde(flatten)]
    pub values: ParameterSet,
    #[serde(rename = "whatChanged")]
    pub what_changed: String,
}

impl FxMessage {
    pub fn from_change(change: &ParameterChange) -> Self {
        Self {
            values: change.snapshot.clone(),
            what_changed: change.delta.path.to_string(),
        }
    }

    pub fn encode(&self) -> Result<String, SyncError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode the single-leaf change an inbound message announces
    pub fn decode_delta(raw: &str) -> Result<ParameterDelta, SyncError> {
        let incoming: Incoming = serde_json::from_str(raw)?;
        if incoming.what_changed == NOTHING_CHANGED {
            return Err(SyncError::NothingChanged);
        }
        let path = ParamPath::parse(&incoming.what_changed)?;
        let leaf = incoming
            .stages
            .get(path.stage().as_str())
            .and_then(|stage| stage.get(path.field()))
            .filter(|leaf| !leaf.is_null())
            .ok_or_else(|| SyncError::MissingLeaf(incoming.what_changed.clone()))?;
        Ok(ParameterDelta {
            path,
            value: ParamValue::deserialize(leaf)?,
        })
    }
}

/// Inbound message, read leniently
#[derive(Deserialize)]
struct Incoming {
    #[serde(rename = "whatChanged")]
    what_changed: String,
    #[serde(flatten)]
    stages: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{Origin, ParameterStore};
    use serde_json::json;

    #[test]
    fn test_encode_matches_wire_shape() {
        let store = ParameterStore::new();
        let mut rx = store.attach_outbound();
        store
            .apply(ParameterDelta::new("comp.threshold", -18.0).unwrap(), Origin::Local)
            .unwrap();

        let message = FxMessage::from_change(&rx.try_recv().unwrap());
        let json: serde_json::Value = serde_json::from_str(&message.encode().unwrap()).unwrap();

        assert_eq!(json["comp"]["threshold"], -18.0);
        assert_eq!(json["whatChanged"], "comp.threshold");
        assert_eq!(json["rev"]["type"], "Block Inside");
        assert_eq!(json["eq"]["type"], "lowshelf");
        assert_eq!(json["pan"]["bypass"], false);
        assert_eq!(json["gain"]["gain"], 2.0);
    }

    #[test]
    fn test_decode_picks_changed_leaf() {
        let mut values = ParameterSet::default();
        values.eq.bypass = true;
        values.gain.gain = 7.0;
        let raw = serde_json::to_string(&FxMessage {
            values,
            what_changed: "eq.bypass".into(),
        })
        .unwrap();

        let delta = FxMessage::decode_delta(&raw).unwrap();
        assert_eq!(delta.path.to_string(), "eq.bypass");
        assert_eq!(delta.value, ParamValue::Bool(true));
    }

    #[test]
    fn test_decode_ignores_missing_and_mistyped_siblings() {
        let raw = json!({
            "pan": {"pan": 0.5},
            "comp": {"threshold": null, "ratio": "loud"},
            "whatChanged": "pan.pan"
        })
        .to_string();
        let delta = FxMessage::decode_delta(&raw).unwrap();
        assert_eq!(delta, ParameterDelta::new("pan.pan", 0.5).unwrap());

        let raw = json!({"gain": {"gain": 3}, "whatChanged": "gain.gain"}).to_string();
        assert_eq!(
            FxMessage::decode_delta(&raw).unwrap().value,
            ParamValue::Number(3.0)
        );
    }

    #[test]
    fn test_decode_failures() {
        let decode = |value: serde_json::Value| FxMessage::decode_delta(&value.to_string());

        assert!(matches!(
            FxMessage::decode_delta("{not json"),
            Err(SyncError::Malformed(_))
        ));
        assert!(matches!(decode(json!({"pan": {"pan": 0.5}})), Err(SyncError::Malformed(_))));
        assert!(matches!(
            decode(json!({"whatChanged": NOTHING_CHANGED})),
            Err(SyncError::NothingChanged)
        ));
        assert!(matches!(
            decode(json!({"comp": {"reduction": 3.0}, "whatChanged": "comp.reduction"})),
            Err(SyncError::Param(_))
        ));
        assert!(matches!(
            decode(json!({"comp": {"ratio": 4.0}, "whatChanged": "comp.knee"})),
            Err(SyncError::MissingLeaf(path)) if path == "comp.knee"
        ));
        assert!(matches!(
            decode(json!({"eq": {"bypass": null}, "whatChanged": "eq.bypass"})),
            Err(SyncError::MissingLeaf(_))
        ));
        assert!(matches!(
            decode(json!({"eq": {"bypass": [1]}, "whatChanged": "eq.bypass"})),
            Err(SyncError::Malformed(_))
        ));
    }
}
