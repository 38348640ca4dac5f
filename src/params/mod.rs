//! Shared effect parameters

pub mod set;
pub mod spec;
pub mod store;

pub use set::{ParamPath, ParamValue, ParameterDelta, ParameterSet};
pub use spec::{ParamKind, ParamSpec, Stage, CATALOGUE};
pub use store::{Origin, ParameterChange, ParameterStore};
