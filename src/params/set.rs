//! The shared effect parameter set
//!
//! A fixed tree of named leaves, one struct per processing stage. Field
//! names match the JSON wire representation exchanged with the peer.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ParamError;
use crate::params::spec::{lookup, ParamKind, ParamSpec, Stage, CATALOGUE};

/// Value of a single leaf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Bool(bool),
    Choice(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Number(v) => write!(f, "{}", v),
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Choice(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Number(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Choice(v.to_string())
    }
}

/// A validated `stage.field` address of one leaf
#[derive(Clone, Copy)]
pub struct ParamPath {
    spec: &'static ParamSpec,
}

impl ParamPath {
    /// Resolve a dotted path against the catalogue
    pub fn parse(path: &str) -> Result<Self, ParamError> {
        let unknown = || ParamError::UnknownPath(path.to_string());
        let (stage, field) = path.split_once('.').ok_or_else(unknown)?;
        let stage = Stage::parse(stage).ok_or_else(unknown)?;
        let spec = lookup(stage, field).ok_or_else(unknown)?;
        Ok(Self { spec })
    }

    pub fn from_spec(spec: &'static ParamSpec) -> Self {
        Self { spec }
    }

    pub fn stage(&self) -> Stage {
        self.spec.stage
    }

    pub fn field(&self) -> &'static str {
        self.spec.field
    }

    pub fn kind(&self) -> ParamKind {
        self.spec.kind
    }
}

impl PartialEq for ParamPath {
    fn eq(&self, other: &Self) -> bool {
        self.spec.stage == other.spec.stage && self.spec.field == other.spec.field
    }
}

impl Eq for ParamPath {}

impl fmt::Display for ParamPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.spec.stage, self.spec.field)
    }
}

impl fmt::Debug for ParamPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParamPath({})", self)
    }
}

impl Serialize for ParamPath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A single-leaf change: the unit exchanged with the peer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterDelta {
    pub path: ParamPath,
    pub value: ParamValue,
}

impl ParameterDelta {
    pub fn new(path: &str, value: impl Into<ParamValue>) -> Result<Self, ParamError> {
        Ok(Self {
            path: ParamPath::parse(path)?,
            value: value.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompressorParams {
    pub attack: f64,
    pub bypass: bool,
    pub knee: f64,
    pub ratio: f64,
    pub release: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReverbParams {
    #[serde(rename = "type")]
    pub kind: String,
    pub mix: f64,
    pub bypass: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EqualizerParams {
    pub low: f64,
    pub mid: f64,
    pub high: f64,
    pub bypass: bool,
    pub freq: f64,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PanParams {
    pub bypass: bool,
    pub pan: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GainParams {
    pub bypass: bool,
    pub gain: f64,
}

/// The complete set of effect controls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub comp: CompressorParams,
    pub rev: ReverbParams,
    pub eq: EqualizerParams,
    pub pan: PanParams,
    pub gain: GainParams,
}

enum Leaf<'a> {
    Number(&'a mut f64),
    Bool(&'a mut bool),
    Choice(&'a mut String),
}

impl Default for ParameterSet {
    fn default() -> Self {
        let mut set = Self {
            comp: CompressorParams::default(),
            rev: ReverbParams::default(),
            eq: EqualizerParams::default(),
            pan: PanParams::default(),
            gain: GainParams::default(),
        };
        for spec in CATALOGUE {
            let path = ParamPath::from_spec(spec);
            // Catalogue defaults are in range by construction
            let _ = set.set(&path, spec.kind.default_value());
        }
        set
    }
}

impl ParameterSet {
    fn leaf_mut(&mut self, path: &ParamPath) -> Leaf<'_> {
        match (path.stage(), path.field()) {
            (Stage::Comp, "attack") => Leaf::Number(&mut self.comp.attack),
            (Stage::Comp, "bypass") => Leaf::Bool(&mut self.comp.bypass),
            (Stage::Comp, "knee") => Leaf::Number(&mut self.comp.knee),
            (Stage::Comp, "ratio") => Leaf::Number(&mut self.comp.ratio),
            (Stage::Comp, "release") => Leaf::Number(&mut self.comp.release),
            (Stage::Comp, _) => Leaf::Number(&mut self.comp.threshold),
            (Stage::Rev, "type") => Leaf::Choice(&mut self.rev.kind),
            (Stage::Rev, "mix") => Leaf::Number(&mut self.rev.mix),
            (Stage::Rev, _) => Leaf::Bool(&mut self.rev.bypass),
            (Stage::Eq, "low") => Leaf::Number(&mut self.eq.low),
            (Stage::Eq, "mid") => Leaf::Number(&mut self.eq.mid),
            (Stage::Eq, "high") => Leaf::Number(&mut self.eq.high),
            (Stage::Eq, "bypass") => Leaf::Bool(&mut self.eq.bypass),
            (Stage::Eq, "freq") => Leaf::Number(&mut self.eq.freq),
            (Stage::Eq, _) => Leaf::Choice(&mut self.eq.kind),
            (Stage::Pan, "bypass") => Leaf::Bool(&mut self.pan.bypass),
            (Stage::Pan, _) => Leaf::Number(&mut self.pan.pan),
            (Stage::Gain, "bypass") => Leaf::Bool(&mut self.gain.bypass),
            (Stage::Gain, _) => Leaf::Number(&mut self.gain.gain),
        }
    }

    /// Read one leaf
    pub fn get(&self, path: &ParamPath) -> ParamValue {
        use ParamValue::{Bool, Choice, Number};
        match (path.stage(), path.field()) {
            (Stage::Comp, "attack") => Number(self.comp.attack),
            (Stage::Comp, "bypass") => Bool(self.comp.bypass),
            (Stage::Comp, "knee") => Number(self.comp.knee),
            (Stage::Comp, "ratio") => Number(self.comp.ratio),
            (Stage::Comp, "release") => Number(self.comp.release),
            (Stage::Comp, _) => Number(self.comp.threshold),
            (Stage::Rev, "type") => Choice(self.rev.kind.clone()),
            (Stage::Rev, "mix") => Number(self.rev.mix),
            (Stage::Rev, _) => Bool(self.rev.bypass),
            (Stage::Eq, "low") => Number(self.eq.low),
            (Stage::Eq, "mid") => Number(self.eq.mid),
            (Stage::Eq, "high") => Number(self.eq.high),
            (Stage::Eq, "bypass") => Bool(self.eq.bypass),
            (Stage::Eq, "freq") => Number(self.eq.freq),
            (Stage::Eq, _) => Choice(self.eq.kind.clone()),
            (Stage::Pan, "bypass") => Bool(self.pan.bypass),
            (Stage::Pan, _) => Number(self.pan.pan),
            (Stage::Gain, "bypass") => Bool(self.gain.bypass),
            (Stage::Gain, _) => Number(self.gain.gain),
        }
    }

    /// Write one leaf, clamping numbers into the declared bounds
    ///
    /// Returns the value actually stored.
    pub fn set(&mut self, path: &ParamPath, value: ParamValue) -> Result<ParamValue, ParamError> {
        let stored = validate(path, value)?;
        match (self.leaf_mut(path), &stored) {
            (Leaf::Number(slot), ParamValue::Number(v)) => *slot = *v,
            (Leaf::Bool(slot), ParamValue::Bool(v)) => *slot = *v,
            (Leaf::Choice(slot), ParamValue::Choice(v)) => slot.clone_from(v),
            _ => {
                return Err(ParamError::TypeMismatch {
                    path: path.to_string(),
                    expected: path.kind().type_name(),
                })
            }
        }
        Ok(stored)
    }

    /// Bypass flag of a stage
    pub fn is_bypassed(&self, stage: Stage) -> bool {
        match stage {
            Stage::Comp => self.comp.bypass,
            Stage::Eq => self.eq.bypass,
            Stage::Rev => self.rev.bypass,
            Stage::Gain => self.gain.bypass,
            Stage::Pan => self.pan.bypass,
        }
    }

    /// Stages that are in the signal path, in chain order
    pub fn active_chain(&self) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|stage| !self.is_bypassed(*stage))
            .collect()
    }

    /// Leaves where `self` differs from `other`, carrying `self`'s values
    pub fn diff(&self, other: &ParameterSet) -> Vec<ParameterDelta> {
        CATALOGUE
            .iter()
            .map(ParamPath::from_spec)
            .filter_map(|path| {
                let mine = self.get(&path);
                (mine != other.get(&path)).then_some(ParameterDelta { path, value: mine })
            })
            .collect()
    }
}

fn validate(path: &ParamPath, value: ParamValue) -> Result<ParamValue, ParamError> {
    match (path.kind(), value) {
        (ParamKind::Number { min, max, .. }, ParamValue::Number(v)) => {
            if v.is_nan() {
                return Err(ParamError::InvalidValue {
                    path: path.to_string(),
                    reason: "NaN".into(),
                });
            }
            Ok(ParamValue::Number(v.clamp(min, max)))
        }
        (ParamKind::Choice { options, .. }, ParamValue::Choice(v)) => {
            if options.contains(&v.as_str()) {
                Ok(ParamValue::Choice(v))
            } else {
                Err(ParamError::InvalidValue {
                    path: path.to_string(),
                    reason: format!("{:?} is not one of {:?}", v, options),
                })
            }
        }
        (ParamKind::Toggle { .. }, ParamValue::Bool(v)) => Ok(ParamValue::Bool(v)),
        (kind, _) => Err(ParamError::TypeMismatch {
            path: path.to_string(),
            expected: kind.type_name(),
        }),
    }
}
