//! Bidirectional auto-fit search over bounded style parameters.

pub mod engine;
pub mod params;
pub mod strategy;

pub use engine::{AutoFitEngine, FitResult, MeasuredRender, Termination};
pub use params::{ParamId, ParameterSet, StyleParameter};
pub use strategy::{Direction, FitConfig, StrategyStep};
