//! The narrow boundary to the pagination oracle.
//!
//! Any engine that can reload a document, take style variables and head rules,
//! run a layout pass, and report page count plus descendant geometry can stand in.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::layout::markup::Markup;
use crate::models::FillGeometry;

/// Physical page geometry. Injected last on every pass so it overrides the
/// oracle's own default page box.
pub const PAGE_GEOMETRY_RULE: &str = "@page { size: A4; margin: 0; }";

/// Head rules every baseline starts from.
pub const BASE_HEAD_RULES: &[&str] = &[
    ":root { --page-margin: 12mm; --body-font-size: 11pt; --line-height: 1.5; }",
    "li { margin-bottom: var(--list-item-spacing); }",
    "p, h1, h2, h3 { margin-bottom: var(--paragraph-spacing); }",
];

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct OracleError(pub String);

/// Pristine content captured once per content load.
///
/// Every pass restores this before applying styles, so passes never build on a
/// previous pass's pagination artifacts.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentBaseline {
    pub markup: Arc<Markup>,
    pub head_rules: Vec<String>,
    pub captured_at: DateTime<Utc>,
}

impl ContentBaseline {
    pub fn capture(markup: Markup) -> Arc<Self> {
        Arc::new(Self {
            markup: Arc::new(markup),
            head_rules: BASE_HEAD_RULES.iter().map(|r| r.to_string()).collect(),
            captured_at: Utc::now(),
        })
    }
}

#[async_trait]
pub trait PaginationOracle: Send + 'static {
    /// Replaces the live document and head with the baseline, discarding any
    /// previous pass's output and style overrides.
    fn load(&mut self, baseline: &ContentBaseline);

    fn set_style_variable(&mut self, name: &str, value: &str);

    fn append_head_rule(&mut self, rule: &str);

    /// Performs layout. May take engine-controlled, unbounded time.
    async fn preview(&mut self) -> Result<(), OracleError>;

    /// Number of page boxes produced by the last successful preview.
    fn page_count(&self) -> u32;

    fn geometry(&self) -> FillGeometry;

    /// Printable output for the current document.
    fn printable(&self) -> Result<String, OracleError>;
}
