use serde::{Deserialize, Serialize};

use crate::autofit::FitResult;
use crate::models::{Measurement, StyleSnapshot};

/// Every state transition the store knows about. The reducer matches exhaustively,
/// so an action without a transition does not compile.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    ContentLoaded { markdown: String },
    StylesUpdated { styles: StyleSnapshot },
    /// A single parameter change made by an auto-fit run. Never schedules a render
    /// task: the auto-fit loop awaits its own passes.
    FitStepApplied { variable: String, value: String },
    RenderStarted,
    RenderSucceeded { measurement: Measurement },
    RenderFailed { message: String },
    AutoFitStarted,
    AutoFitFinished { result: FitResult },
    ViewOptionChanged { name: String, value: String },
}

/// Subscription scope of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Content,
    Styles,
    RenderStatus,
    Ui,
}

impl Action {
    pub fn topic(&self) -> Topic {
        match self {
            Action::ContentLoaded { .. } => Topic::Content,
            Action::StylesUpdated { .. } | Action::FitStepApplied { .. } => Topic::Styles,
            Action::RenderStarted
            | Action::RenderSucceeded { .. }
            | Action::RenderFailed { .. } => Topic::RenderStatus,
            Action::AutoFitStarted
            | Action::AutoFitFinished { .. }
            | Action::ViewOptionChanged { .. } => Topic::Ui,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::ContentLoaded { .. } => "content_loaded",
            Action::StylesUpdated { .. } => "styles_updated",
            Action::FitStepApplied { .. } => "fit_step_applied",
            Action::RenderStarted => "render_started",
            Action::RenderSucceeded { .. } => "render_succeeded",
            Action::RenderFailed { .. } => "render_failed",
            Action::AutoFitStarted => "auto_fit_started",
            Action::AutoFitFinished { .. } => "auto_fit_finished",
            Action::ViewOptionChanged { .. } => "view_option_changed",
        }
    }
}
