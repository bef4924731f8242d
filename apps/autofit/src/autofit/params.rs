//! Bounded, steppable style parameters.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::style::parse_length;
use crate::models::{round2, StyleSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamId {
    PageMargin,
    ParagraphSpacing,
    ListItemSpacing,
    HeadingScale,
    LineHeight,
    FontSize,
}

impl ParamId {
    pub const ALL: [ParamId; 6] = [
        ParamId::PageMargin,
        ParamId::ParagraphSpacing,
        ParamId::ListItemSpacing,
        ParamId::HeadingScale,
        ParamId::LineHeight,
        ParamId::FontSize,
    ];

    /// The style variable this parameter drives.
    pub const fn variable(self) -> &'static str {
        match self {
            ParamId::PageMargin => "--page-margin",
            ParamId::ParagraphSpacing => "--paragraph-spacing",
            ParamId::ListItemSpacing => "--list-item-spacing",
            ParamId::HeadingScale => "--heading-scale",
            ParamId::LineHeight => "--line-height",
            ParamId::FontSize => "--body-font-size",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleParameter {
    pub id: ParamId,
    pub variable: String,
    /// CSS unit appended to the value; empty for unitless values.
    pub unit: String,
    /// Optional linear factor applied when writing the CSS value.
    #[serde(default)]
    pub scale: Option<f64>,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub value: f64,
}

impl StyleParameter {
    pub fn new(id: ParamId, unit: &str, min: f64, max: f64, step: f64, value: f64) -> Self {
        Self {
            id,
            variable: id.variable().to_string(),
            unit: unit.to_string(),
            scale: None,
            min,
            max,
            step,
            value: value.clamp(min, max),
        }
    }

    pub fn css_value(&self) -> String {
        let value = round2(self.value * self.scale.unwrap_or(1.0));
        format!("{value}{}", self.unit)
    }

    /// Whether a move by `delta` keeps the value within `[min, max]`.
    pub fn can_apply(&self, delta: f64) -> bool {
        let next = round2(self.value + delta);
        next >= self.min && next <= self.max
    }

    /// Moves the value by `delta` (rounded to two decimals). Moves that would
    /// leave `[min, max]` are refused and return `false`.
    pub fn apply_delta(&mut self, delta: f64) -> bool {
        if !self.can_apply(delta) {
            return false;
        }
        self.value = round2(self.value + delta);
        true
    }

    /// Sets the value directly, clamped into `[min, max]`.
    pub fn set_value(&mut self, value: f64) {
        self.value = round2(value.clamp(self.min, self.max));
    }
}

/// The full set of auto-fit parameters, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub parameters: Vec<StyleParameter>,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self {
            parameters: vec![
                StyleParameter::new(ParamId::PageMargin, "mm", 7.0, 21.0, 1.0, 12.0),
                StyleParameter::new(ParamId::ParagraphSpacing, "em", 0.2, 1.0, 0.1, 0.6),
                StyleParameter::new(ParamId::ListItemSpacing, "em", 0.0, 0.5, 0.05, 0.25),
                StyleParameter::new(ParamId::HeadingScale, "", 0.8, 1.3, 0.05, 1.0),
                StyleParameter::new(ParamId::LineHeight, "", 1.2, 1.8, 0.05, 1.5),
                StyleParameter::new(ParamId::FontSize, "pt", 9.0, 13.0, 0.5, 11.0),
            ],
        }
    }
}

impl ParameterSet {
    pub fn get(&self, id: ParamId) -> Option<&StyleParameter> {
        self.parameters.iter().find(|p| p.id == id)
    }

    pub fn get_mut(&mut self, id: ParamId) -> Option<&mut StyleParameter> {
        self.parameters.iter_mut().find(|p| p.id == id)
    }

    /// Current values as style variables.
    pub fn snapshot(&self) -> StyleSnapshot {
        self.parameters
            .iter()
            .map(|p| (p.variable.clone(), p.css_value()))
            .collect()
    }

    /// Seeds values from a style snapshot. Variables that are missing or do not
    /// parse leave the parameter at its current value.
    pub fn seed_from(&mut self, styles: &StyleSnapshot) {
        for param in &mut self.parameters {
            let Some(raw) = styles.get(&param.variable) else {
                continue;
            };
            match parse_length(raw) {
                Some((number, unit)) if unit.is_empty() || unit == param.unit => {
                    param.set_value(number / param.scale.unwrap_or(1.0));
                }
                _ => warn!(
                    variable = %param.variable,
                    value = %raw,
                    "Style value not usable for auto-fit seed"
                ),
            }
        }
    }
}
