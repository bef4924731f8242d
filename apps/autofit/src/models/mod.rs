pub mod measurement;
pub mod style;

pub use measurement::{FillGeometry, Measurement};
pub use style::StyleSnapshot;

/// Rounds to two decimal places. Every numeric style delta passes through this
/// so that dozens of fit iterations never accumulate floating-point drift.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
