use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::autofit::params::{ParamId, ParameterSet};
use crate::models::Measurement;

pub const DEFAULT_SPARSITY_THRESHOLD: f64 = 0.85;
pub const DEFAULT_MAX_ITERATIONS: u32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    None,
    Shrink,
    Expand,
}

/// Lowest visual cost first: whitespace goes before anything a reader notices.
pub const SHRINK_ORDER: [ParamId; 6] = [
    ParamId::PageMargin,
    ParamId::ParagraphSpacing,
    ParamId::ListItemSpacing,
    ParamId::HeadingScale,
    ParamId::LineHeight,
    ParamId::FontSize,
];

/// Readability first: the most visible attributes are restored first.
pub const EXPAND_ORDER: [ParamId; 6] = [
    ParamId::FontSize,
    ParamId::LineHeight,
    ParamId::HeadingScale,
    ParamId::ParagraphSpacing,
    ParamId::ListItemSpacing,
    ParamId::PageMargin,
];

/// Everything the auto-fit search can be tuned with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    pub parameters: ParameterSet,
    pub shrink_order: Vec<ParamId>,
    pub expand_order: Vec<ParamId>,
    pub sparsity_threshold: f64,
    pub max_iterations: u32,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            parameters: ParameterSet::default(),
            shrink_order: SHRINK_ORDER.to_vec(),
            expand_order: EXPAND_ORDER.to_vec(),
            sparsity_threshold: DEFAULT_SPARSITY_THRESHOLD,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl FitConfig {
    /// Loads a JSON profile. Fields the profile omits keep their defaults.
    pub fn load_profile(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading fit profile {}", path.display()))?;
        let config: FitConfig = serde_json::from_str(&raw)
            .with_context(|| format!("parsing fit profile {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for param in &self.parameters.parameters {
            anyhow::ensure!(
                param.min <= param.max,
                "{:?}: min {} exceeds max {}",
                param.id,
                param.min,
                param.max
            );
            anyhow::ensure!(param.step > 0.0, "{:?}: step must be positive", param.id);
            anyhow::ensure!(
                (param.min..=param.max).contains(&param.value),
                "{:?}: value {} lies outside {}..={}",
                param.id,
                param.value,
                param.min,
                param.max
            );
        }
        for id in self.shrink_order.iter().chain(&self.expand_order) {
            anyhow::ensure!(
                self.parameters.get(*id).is_some(),
                "strategy names {id:?}, which has no parameter"
            );
        }
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.sparsity_threshold),
            "sparsity threshold must be within 0..=1"
        );
        Ok(())
    }

    pub fn select_direction(&self, measurement: &Measurement) -> Direction {
        if measurement.page_count > 1 {
            Direction::Shrink
        } else if measurement.is_sparse(self.sparsity_threshold) {
            Direction::Expand
        } else {
            Direction::None
        }
    }

    /// One strategy step per entry of the active order: the signed delta and the
    /// bound it must not cross.
    pub fn steps(&self, direction: Direction) -> Vec<StrategyStep> {
        let (order, sign) = match direction {
            Direction::Shrink => (&self.shrink_order, -1.0),
            Direction::Expand => (&self.expand_order, 1.0),
            Direction::None => return Vec::new(),
        };
        order
            .iter()
            .filter_map(|id| self.parameters.get(*id))
            .map(|p| StrategyStep {
                param: p.id,
                delta: sign * p.step,
                bound: if sign < 0.0 { p.min } else { p.max },
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategyStep {
    pub param: ParamId,
    pub delta: f64,
    pub bound: f64,
}
