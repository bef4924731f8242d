use std::collections::BTreeMap;

use serde::Serialize;

use crate::autofit::FitResult;
use crate::models::style::merge_styles;
use crate::models::{Measurement, StyleSnapshot};
use crate::store::actions::Action;

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct StoreState {
    pub content: Option<String>,
    /// Bumped on every content load.
    pub content_revision: u64,
    pub styles: StyleSnapshot,
    pub render: RenderStatus,
    pub ui: UiStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderPhase {
    #[default]
    Idle,
    Rendering,
    Rendered,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RenderStatus {
    pub phase: RenderPhase,
    pub last_measurement: Option<Measurement>,
    pub last_error: Option<String>,
    pub passes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UiStatus {
    /// Controls are disabled while a pass or an auto-fit run is in progress.
    pub controls_enabled: bool,
    pub auto_fitting: bool,
    pub last_fit: Option<FitResult>,
    pub view_options: BTreeMap<String, String>,
}

impl Default for UiStatus {
    fn default() -> Self {
        Self {
            controls_enabled: true,
            auto_fitting: false,
            last_fit: None,
            view_options: BTreeMap::new(),
        }
    }
}

/// Pure transition function: computes the next snapshot without touching `state`.
pub fn reduce(state: &StoreState, action: &Action) -> StoreState {
    let mut next = state.clone();
    match action {
        Action::ContentLoaded { markdown } => {
            next.content = Some(markdown.clone());
            next.content_revision += 1;
        }
        Action::StylesUpdated { styles } => merge_styles(&mut next.styles, styles),
        Action::FitStepApplied { variable, value } => {
            next.styles.insert(variable.clone(), value.clone());
        }
        Action::RenderStarted => {
            next.render.phase = RenderPhase::Rendering;
            next.ui.controls_enabled = false;
        }
        Action::RenderSucceeded { measurement } => {
            next.render.phase = RenderPhase::Rendered;
            next.render.last_measurement = Some(measurement.clone());
            next.render.last_error = None;
            next.render.passes += 1;
            next.ui.controls_enabled = !next.ui.auto_fitting;
        }
        Action::RenderFailed { message } => {
            next.render.phase = RenderPhase::Failed;
            next.render.last_error = Some(message.clone());
            next.render.passes += 1;
            next.ui.controls_enabled = !next.ui.auto_fitting;
        }
        Action::AutoFitStarted => {
            next.ui.auto_fitting = true;
            next.ui.controls_enabled = false;
        }
        Action::AutoFitFinished { result } => {
            next.ui.auto_fitting = false;
            next.ui.controls_enabled = next.render.phase != RenderPhase::Rendering;
            next.ui.last_fit = Some(result.clone());
            merge_styles(&mut next.styles, &result.styles);
        }
        Action::ViewOptionChanged { name, value } => {
            next.ui.view_options.insert(name.clone(), value.clone());
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measurement(pages: u32) -> Measurement {
        Measurement {
            page_count: pages,
            fill_ratio: Some(0.9),
            overflow_px: 0.0,
            overflow_percentage: 0,
        }
    }

    #[test]
    fn test_reduce_does_not_mutate_input() {
        let state = StoreState::default();
        let next = reduce(
            &state,
            &Action::ContentLoaded {
                markdown: "# Jane".to_string(),
            },
        );
        assert_eq!(state.content, None);
        assert_eq!(next.content.as_deref(), Some("# Jane"));
        assert_eq!(next.content_revision, 1);
    }

    #[test]
    fn test_styles_merge() {
        let mut batch = StyleSnapshot::new();
        batch.insert("--line-height".to_string(), "1.4".to_string());
        let s1 = reduce(&StoreState::default(), &Action::StylesUpdated { styles: batch });
        let s2 = reduce(
            &s1,
            &Action::FitStepApplied {
                variable: "--page-margin".to_string(),
                value: "8mm".to_string(),
            },
        );
        assert_eq!(s2.styles.len(), 2);
        assert_eq!(s2.styles["--page-margin"], "8mm");
    }

    #[test]
    fn test_render_cycle_toggles_controls() {
        let s1 = reduce(&StoreState::default(), &Action::RenderStarted);
        assert_eq!(s1.render.phase, RenderPhase::Rendering);
        assert!(!s1.ui.controls_enabled);

        let s2 = reduce(
            &s1,
            &Action::RenderSucceeded {
                measurement: measurement(1),
            },
        );
        assert_eq!(s2.render.phase, RenderPhase::Rendered);
        assert!(s2.ui.controls_enabled);
        assert_eq!(s2.render.passes, 1);
    }

    #[test]
    fn test_controls_stay_disabled_during_auto_fit() {
        let s1 = reduce(&StoreState::default(), &Action::AutoFitStarted);
        let s2 = reduce(&s1, &Action::RenderStarted);
        let s3 = reduce(
            &s2,
            &Action::RenderSucceeded {
                measurement: measurement(2),
            },
        );
        assert!(!s3.ui.controls_enabled);
    }

    #[test]
    fn test_view_option_recorded_without_touching_styles() {
        let s1 = reduce(
            &StoreState::default(),
            &Action::ViewOptionChanged {
                name: "show-guides".to_string(),
                value: "on".to_string(),
            },
        );
        assert_eq!(s1.ui.view_options["show-guides"], "on");
        assert!(s1.styles.is_empty());
    }

    #[test]
    fn test_render_failure_recorded() {
        let s1 = reduce(
            &StoreState::default(),
            &Action::RenderFailed {
                message: "oracle crashed".to_string(),
            },
        );
        assert_eq!(s1.render.phase, RenderPhase::Failed);
        assert_eq!(s1.render.last_error.as_deref(), Some("oracle crashed"));
        assert!(s1.ui.controls_enabled);
    }
}
