use std::collections::BTreeMap;

use anyhow::Context;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::layout::MetricOracle;
use crate::models::StyleSnapshot;
use crate::render::RenderReport;
use crate::session::{run_render_job, RenderJob};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    pub markdown: String,
    #[serde(default)]
    pub styles: Option<StyleSnapshot>,
    #[serde(default)]
    pub view_options: BTreeMap<String, String>,
    #[serde(default = "default_auto_fit")]
    pub auto_fit: bool,
}

fn default_auto_fit() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct RenderResponse {
    pub job_id: Uuid,
    #[serde(flatten)]
    pub report: RenderReport,
}

/// POST /api/v1/render
pub async fn handle_render(
    State(state): State<AppState>,
    Json(req): Json<RenderRequest>,
) -> Result<Json<RenderResponse>, AppError> {
    if req.markdown.trim().is_empty() {
        return Err(AppError::EmptyContent);
    }
    if let Some(styles) = &req.styles {
        if let Some(bad) = styles.keys().find(|k| !k.starts_with("--")) {
            return Err(AppError::Validation(format!(
                "style key '{bad}' is not a custom property"
            )));
        }
    }

    let job_id = Uuid::new_v4();
    info!(%job_id, auto_fit = req.auto_fit, bytes = req.markdown.len(), "Render job accepted");

    let job = RenderJob {
        markdown: req.markdown,
        styles: req.styles,
        view_options: req.view_options,
        auto_fit: req.auto_fit,
    };
    let oracle = MetricOracle::new(state.config.font);
    let settings = state.settings.clone();
    // The session runs in its own task so a panic inside it surfaces as a 500.
    let report = tokio::spawn(async move { run_render_job(oracle, &settings, job).await })
        .await
        .context("render job task failed")??;

    info!(
        %job_id,
        pages = report.current_pages,
        fill_ratio = ?report.fill_ratio,
        "Render job finished"
    );
    Ok(Json(RenderResponse { job_id, report }))
}
