//! Auto-fit search: steers style parameters toward one well-filled page.
//!
//! # Algorithm
//! 1. Render once with the seeded parameters and pick a direction: more than one
//!    page shrinks, a sparse single page expands, anything else is accepted.
//! 2. Shrink: apply one step of the first parameter in the shrink order that still
//!    has headroom, re-render, repeat until the content fits one page.
//! 3. Expand: while the page is sparse, apply one step of the first parameter in
//!    the expand order with headroom and re-render. A step that spills onto a
//!    second page is reverted on that parameter, followed by one corrective render.
//!
//! Both loops stop at the iteration ceiling or when no parameter has headroom.
//! Every iteration awaits its render before deciding the next move.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::autofit::params::{ParameterSet, StyleParameter};
use crate::autofit::strategy::{Direction, FitConfig, StrategyStep};
use crate::models::style::merge_styles;
use crate::models::{Measurement, StyleSnapshot};
use crate::render::{PaginationOracle, RenderError, RenderExecutor};

/// One measured render of a full style snapshot.
#[async_trait]
pub trait MeasuredRender: Send + Sync {
    async fn render(&self, styles: &StyleSnapshot) -> Result<Measurement, RenderError>;
}

#[async_trait]
impl<O: PaginationOracle> MeasuredRender for RenderExecutor<O> {
    async fn render(&self, styles: &StyleSnapshot) -> Result<Measurement, RenderError> {
        self.execute(styles).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The first measurement was already one page and not sparse.
    AlreadyAcceptable,
    /// The loop reached its target.
    Converged,
    /// No parameter had headroom left in the active direction.
    BoundsExhausted,
    IterationCeiling,
    /// An expand step overshot onto a second page and was undone.
    OvershootReverted,
    RenderFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub success: bool,
    pub direction: Direction,
    /// Parameter steps applied.
    pub iterations: u32,
    pub page_count: u32,
    pub fill_ratio: Option<f64>,
    pub termination: Termination,
    /// Style snapshot of the final state.
    pub styles: StyleSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct AutoFitEngine {
    config: FitConfig,
}

struct Search<'a, R: ?Sized> {
    renderer: &'a R,
    base: &'a StyleSnapshot,
    params: ParameterSet,
}

impl<R: MeasuredRender + ?Sized> Search<'_, R> {
    fn styles(&self) -> StyleSnapshot {
        let mut styles = self.base.clone();
        merge_styles(&mut styles, &self.params.snapshot());
        styles
    }

    async fn render(&self) -> Result<Measurement, RenderError> {
        self.renderer.render(&self.styles()).await
    }

    /// Applies the first step in `steps` whose parameter still has headroom.
    fn advance(&mut self, steps: &[StrategyStep]) -> Option<(StrategyStep, StyleParameter)> {
        steps.iter().find_map(|step| {
            self.params
                .get_mut(step.param)
                .filter(|p| p.can_apply(step.delta))
                .map(|p| {
                    p.apply_delta(step.delta);
                    if p.value == step.bound {
                        debug!(param = ?p.id, bound = step.bound, "Parameter reached its bound");
                    }
                    (*step, p.clone())
                })
        })
    }

    /// Undoes `step`, returning the parameter at its previous value.
    fn revert(&mut self, step: &StrategyStep) -> Option<StyleParameter> {
        self.params.get_mut(step.param).map(|p| {
            p.set_value(p.value - step.delta);
            p.clone()
        })
    }
}

impl AutoFitEngine {
    pub fn new(config: FitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    /// Runs one search from `base_styles`. `on_step` sees every parameter change,
    /// reverts included. Failures come back as data in the result.
    pub async fn run<R, F>(&self, renderer: &R, base_styles: &StyleSnapshot, mut on_step: F) -> FitResult
    where
        R: MeasuredRender + ?Sized,
        F: FnMut(&StyleParameter) + Send,
    {
        let mut params = self.config.parameters.clone();
        params.seed_from(base_styles);
        let mut search = Search {
            renderer,
            base: base_styles,
            params,
        };

        let initial = match search.render().await {
            Ok(m) => m,
            Err(e) => return self.failed(&search, Direction::None, 0, None, e),
        };
        let direction = self.config.select_direction(&initial);
        info!(
            ?direction,
            page_count = initial.page_count,
            fill_ratio = ?initial.fill_ratio,
            "Auto-fit started"
        );

        let outcome = match direction {
            Direction::None => Ok((initial, 0, Termination::AlreadyAcceptable)),
            Direction::Shrink => self.shrink(&mut search, initial, &mut on_step).await,
            Direction::Expand => self.expand(&mut search, initial, &mut on_step).await,
        };

        match outcome {
            Ok((measurement, iterations, termination)) => {
                let result = FitResult {
                    success: measurement.page_count == 1,
                    direction,
                    iterations,
                    page_count: measurement.page_count,
                    fill_ratio: measurement.fill_ratio,
                    termination,
                    styles: search.styles(),
                    error: None,
                };
                if result.success {
                    info!(
                        iterations,
                        ?termination,
                        fill_ratio = ?result.fill_ratio,
                        "Auto-fit finished"
                    );
                } else {
                    warn!(
                        iterations,
                        ?termination,
                        page_count = result.page_count,
                        "Auto-fit could not reach one page"
                    );
                }
                result
            }
            Err((iterations, last, e)) => self.failed(&search, direction, iterations, last, e),
        }
    }

    async fn shrink<R, F>(
        &self,
        search: &mut Search<'_, R>,
        mut current: Measurement,
        on_step: &mut F,
    ) -> Result<(Measurement, u32, Termination), (u32, Option<Measurement>, RenderError)>
    where
        R: MeasuredRender + ?Sized,
        F: FnMut(&StyleParameter) + Send,
    {
        let steps = self.config.steps(Direction::Shrink);
        let mut iterations = 0;
        loop {
            if current.page_count <= 1 {
                return Ok((current, iterations, Termination::Converged));
            }
            if iterations >= self.config.max_iterations {
                return Ok((current, iterations, Termination::IterationCeiling));
            }
            let Some((step, param)) = search.advance(&steps) else {
                return Ok((current, iterations, Termination::BoundsExhausted));
            };
            iterations += 1;
            debug!(iteration = iterations, param = ?param.id, value = param.value, "Shrink step");
            on_step(&param);

            current = match search.render().await {
                Ok(next) => next,
                Err(e) => {
                    // the failed step was never measured; keep the last measured state
                    if let Some(reverted) = search.revert(&step) {
                        on_step(&reverted);
                    }
                    return Err((iterations, Some(current), e));
                }
            };
        }
    }

    async fn expand<R, F>(
        &self,
        search: &mut Search<'_, R>,
        mut current: Measurement,
        on_step: &mut F,
    ) -> Result<(Measurement, u32, Termination), (u32, Option<Measurement>, RenderError)>
    where
        R: MeasuredRender + ?Sized,
        F: FnMut(&StyleParameter) + Send,
    {
        let steps = self.config.steps(Direction::Expand);
        let mut iterations = 0;
        loop {
            if !current.is_sparse(self.config.sparsity_threshold) {
                return Ok((current, iterations, Termination::Converged));
            }
            if iterations >= self.config.max_iterations {
                return Ok((current, iterations, Termination::IterationCeiling));
            }
            let Some((step, param)) = search.advance(&steps) else {
                return Ok((current, iterations, Termination::BoundsExhausted));
            };
            iterations += 1;
            debug!(iteration = iterations, param = ?param.id, value = param.value, "Expand step");
            on_step(&param);

            let next = match search.render().await {
                Ok(next) => next,
                Err(e) => {
                    if let Some(reverted) = search.revert(&step) {
                        on_step(&reverted);
                    }
                    return Err((iterations, Some(current), e));
                }
            };
            if next.page_count > 1 {
                let Some(reverted) = search.revert(&step) else {
                    return Ok((current, iterations, Termination::OvershootReverted));
                };
                debug!(param = ?reverted.id, value = reverted.value, "Expand overshoot reverted");
                on_step(&reverted);

                let corrected = search
                    .render()
                    .await
                    .map_err(|e| (iterations, Some(current.clone()), e))?;
                return Ok((corrected, iterations, Termination::OvershootReverted));
            }
            current = next;
        }
    }

    fn failed<R: MeasuredRender + ?Sized>(
        &self,
        search: &Search<'_, R>,
        direction: Direction,
        iterations: u32,
        last: Option<Measurement>,
        error: RenderError,
    ) -> FitResult {
        warn!(iterations, "Auto-fit aborted by render failure: {error}");
        FitResult {
            success: false,
            direction,
            iterations,
            page_count: last.as_ref().map_or(1, |m| m.page_count),
            fill_ratio: last.and_then(|m| m.fill_ratio),
            termination: Termination::RenderFailed,
            styles: search.styles(),
            error: Some(error.to_string()),
        }
    }
}
