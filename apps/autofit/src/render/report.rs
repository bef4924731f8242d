//! What the automation harness reads back once a render has completed.

use serde::{Deserialize, Serialize};

use crate::autofit::FitResult;
use crate::layout::markup::ContentStats;
use crate::models::{Measurement, StyleSnapshot};

/// Fill ratio under which a fitted page is still reported as sparse.
const SPARSE_REPORT_THRESHOLD: f64 = 0.8;
/// Fill the expansion hints aim for.
const TARGET_FILL: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Success,
    Overflow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoFitStatus {
    pub run: bool,
    pub result: Option<FitResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderReport {
    pub status: ReportStatus,
    pub current_pages: u32,
    pub fill_ratio: Option<f64>,
    /// Overflow as a percentage of one page.
    pub overflow_amount: u32,
    pub overflow_px: f64,
    pub content_stats: ContentStats,
    pub hint: String,
    pub message: String,
    pub suggestion: String,
    pub next_action: String,
    pub auto_fit_status: AutoFitStatus,
    /// The style snapshot the final measurement was taken with.
    pub styles: StyleSnapshot,
}

impl RenderReport {
    pub fn build(
        measurement: &Measurement,
        stats: ContentStats,
        auto_fit: Option<FitResult>,
        styles: StyleSnapshot,
        sparsity_threshold: f64,
    ) -> Self {
        let hint = generate_hint(measurement, Some(&stats), sparsity_threshold);
        let overflow = measurement.overflow_percentage;

        let (status, message, suggestion, next_action) = if measurement.fits_one_page() {
            let fill = measurement.fill_ratio.unwrap_or(1.0);
            if fill < SPARSE_REPORT_THRESHOLD {
                (
                    ReportStatus::Success,
                    format!(
                        "Content fits one page but is sparse (fill ratio: {}%). Consider adding more content for better visual balance.",
                        (fill * 100.0).round()
                    ),
                    "Add more achievements, skills, or project details to fill the page better."
                        .to_string(),
                    "Review the hint for specific expansion suggestions, or accept the current result."
                        .to_string(),
                )
            } else {
                (
                    ReportStatus::Success,
                    "Content fits one page.".to_string(),
                    "The document is ready. Save it or keep refining.".to_string(),
                    "Deliver the output or continue refining content.".to_string(),
                )
            }
        } else {
            (
                ReportStatus::Overflow,
                format!(
                    "Content overflows by {overflow}%, rendered {} pages.",
                    measurement.page_count
                ),
                "Apply a reduction strategy sized to the overflow. See the hint for specifics."
                    .to_string(),
                format!(
                    "Reduce content by approximately {overflow}% following the level in the hint, then render again."
                ),
            )
        };

        Self {
            status,
            current_pages: measurement.page_count,
            fill_ratio: measurement.fill_ratio,
            overflow_amount: overflow,
            overflow_px: measurement.overflow_px,
            content_stats: stats,
            hint,
            message,
            suggestion,
            next_action,
            auto_fit_status: AutoFitStatus {
                run: auto_fit.is_some(),
                result: auto_fit,
            },
            styles,
        }
    }
}

/// Suggests how much content to cut or add, in three levels per direction.
pub fn generate_hint(
    measurement: &Measurement,
    stats: Option<&ContentStats>,
    sparsity_threshold: f64,
) -> String {
    let overflow = measurement.overflow_percentage;
    let fill = measurement.fill_ratio.unwrap_or(1.0);
    let multi_page = measurement.page_count > 1;

    let mut parts = Vec::new();
    if multi_page {
        parts.push(if overflow < 5 {
            format!("Content slightly overflows (about {overflow}%). Suggestion: Level 1 compress (merge short list items, condense skills).")
        } else if overflow < 15 {
            format!("Content moderately overflows (about {overflow}%). Suggestion: Level 2 trim (tighten project descriptions, drop minor skills).")
        } else {
            format!("Content heavily overflows (over {overflow}%). Suggestion: Level 3 cut (remove about {overflow}% of the text, or drop unrelated roles and projects).")
        });
    } else if fill < sparsity_threshold {
        let fill_pct = (fill * 100.0).round();
        let missing_pct = ((TARGET_FILL - fill) * 100.0).round();
        parts.push(if fill > 0.75 {
            format!("Page looks slightly empty (fill {fill_pct}%). Suggestion: Level 1 expand (add one or two quantified results to existing items).")
        } else if fill > 0.5 {
            format!("Page is light on content (fill {fill_pct}%). Suggestion: Level 2 expand (add a full role or a detailed project, about {missing_pct}% more content).")
        } else {
            format!("Page is mostly empty (fill {fill_pct}%). Suggestion: Level 3 expand (content covers about half a page, roughly double it).")
        });
    } else {
        parts.push("Content fits one page.".to_string());
    }

    if let Some(stats) = stats {
        let mut details = Vec::new();
        if multi_page {
            if stats.word_count > 600 {
                details.push(format!(
                    "word count {} is high, aim for under 500",
                    stats.word_count
                ));
            }
            if stats.li_count > 25 {
                details.push(format!(
                    "{} list items, merge similar ones",
                    stats.li_count
                ));
            }
        } else if fill < 0.7 && stats.word_count < 300 {
            details.push(format!(
                "word count {} is low, aim for over 400",
                stats.word_count
            ));
        }
        if !details.is_empty() {
            parts.push(format!("Details: {}", details.join("; ")));
        }
    }

    parts.join(" | ")
}
