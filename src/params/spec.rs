//! Parameter catalogue
//!
//! Every leaf of the parameter set, with its declared kind and bounds.

use crate::params::set::ParamValue;

/// Processing stages, in signal-chain order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Comp,
    Eq,
    Rev,
    Gain,
    Pan,
}

impl Stage {
    pub const ALL: [Stage; 5] = [Stage::Comp, Stage::Eq, Stage::Rev, Stage::Gain, Stage::Pan];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Comp => "comp",
            Stage::Eq => "eq",
            Stage::Rev => "rev",
            Stage::Gain => "gain",
            Stage::Pan => "pan",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Stage::ALL.into_iter().find(|s| s.as_str() == name)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared type and bounds of one leaf
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamKind {
    Number {
        min: f64,
        max: f64,
        /// UI granularity; informational, values are not snapped to it
        step: f64,
        default: f64,
    },
    Choice {
        options: &'static [&'static str],
        default: &'static str,
    },
    Toggle {
        default: bool,
    },
}

impl ParamKind {
    pub fn default_value(&self) -> ParamValue {
        match *self {
            ParamKind::Number { default, .. } => ParamValue::Number(default),
            ParamKind::Choice { default, .. } => ParamValue::Choice(default.to_string()),
            ParamKind::Toggle { default } => ParamValue::Bool(default),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ParamKind::Number { .. } => "number",
            ParamKind::Choice { .. } => "choice",
            ParamKind::Toggle { .. } => "bool",
        }
    }
}

/// One catalogue entry
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub stage: Stage,
    pub field: &'static str,
    pub kind: ParamKind,
}

impl ParamSpec {
    /// Dotted path, e.g. `comp.threshold`
    pub fn path(&self) -> String {
        format!("{}.{}", self.stage, self.field)
    }
}

pub const REVERB_TYPES: &[&str] = &[
    "Block Inside",
    "Bottle Hall",
    "Cement Blocks 1",
    "Cement Blocks 2",
    "Chateau de Logne, Outside",
    "Conic Long Echo Hall",
    "Deep Space",
    "Derlon Sanctuary",
    "Direct Cabinet N1",
    "Direct Cabinet N2",
];

pub const FILTER_TYPES: &[&str] = &["lowshelf", "highshelf"];

const fn number(stage: Stage, field: &'static str, min: f64, max: f64, step: f64, default: f64) -> ParamSpec {
    ParamSpec {
        stage,
        field,
        kind: ParamKind::Number { min, max, step, default },
    }
}

const fn toggle(stage: Stage, field: &'static str) -> ParamSpec {
    ParamSpec {
        stage,
        field,
        kind: ParamKind::Toggle { default: false },
    }
}

pub static CATALOGUE: &[ParamSpec] = &[
    number(Stage::Comp, "threshold", -100.0, 0.0, 1.0, -24.0),
    number(Stage::Comp, "knee", 0.0, 40.0, 1.0, 30.0),
    number(Stage::Comp, "ratio", 1.0, 20.0, 1.0, 12.0),
    number(Stage::Comp, "attack", 0.0, 1.0, 0.01, 0.003),
    number(Stage::Comp, "release", 0.0, 1.0, 0.05, 0.25),
    toggle(Stage::Comp, "bypass"),
    ParamSpec {
        stage: Stage::Rev,
        field: "type",
        kind: ParamKind::Choice {
            options: REVERB_TYPES,
            default: "Block Inside",
        },
    },
    number(Stage::Rev, "mix", 0.0, 20.0, 1.0, 10.0),
    toggle(Stage::Rev, "bypass"),
    ParamSpec {
        stage: Stage::Eq,
        field: "type",
        kind: ParamKind::Choice {
            options: FILTER_TYPES,
            default: "lowshelf",
        },
    },
    number(Stage::Eq, "freq", 20.0, 20_000.0, 100.0, 1000.0),
    number(Stage::Eq, "low", -20.0, 40.0, 0.0, 10.0),
    number(Stage::Eq, "mid", -20.0, 40.0, 0.0, 10.0),
    number(Stage::Eq, "high", -20.0, 40.0, 0.0, 10.0),
    toggle(Stage::Eq, "bypass"),
    number(Stage::Pan, "pan", -1.0, 1.0, 0.1, 0.0),
    toggle(Stage::Pan, "bypass"),
    number(Stage::Gain, "gain", 0.0, 20.0, 1.0, 2.0),
    toggle(Stage::Gain, "bypass"),
];

/// Look up a leaf by stage and field
pub fn lookup(stage: Stage, field: &str) -> Option<&'static ParamSpec> {
    CATALOGUE
        .iter()
        .find(|spec| spec.stage == stage && spec.field == field)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue_paths_are_unique() {
        let mut paths: Vec<String> = CATALOGUE.iter().map(|s| s.path()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), CATALOGUE.len());
    }

    #[test]
    fn test_every_stage_has_bypass() {
        for stage in Stage::ALL {
            let spec = lookup(stage, "bypass").unwrap();
            assert_eq!(spec.kind, ParamKind::Toggle { default: false });
        }
    }

    #[test]
    fn test_defaults_within_bounds() {
        for spec in CATALOGUE {
            match spec.kind {
                ParamKind::Number { min, max, default, .. } => {
                    assert!(default >= min && default <= max, "{}", spec.path());
                }
                ParamKind::Choice { options, default } => {
                    assert!(options.contains(&default), "{}", spec.path());
                }
                ParamKind::Toggle { .. } => {}
            }
        }
    }
}
