//! Metric oracle: a deterministic pagination oracle driven by font-metric tables.
//!
//! # Model
//! - A4 page, 96 dpi, 1120 px tall. The page box loses the `@page` margin on each
//!   side (the oracle's default when no `@page` rule sets one), the content box
//!   then loses `--page-margin` on each side.
//! - Blocks flow top to bottom. Text is greedy-wrapped with the static width
//!   tables; every line is placed individually so long blocks split across pages.
//! - A line that does not fit the remaining height starts a new page. Trailing
//!   block margins count toward scroll height but never toward the last visible
//!   bottom edge.
//!
//! # spawn_blocking pattern
//! `preview` hands owned copies of the blocks and resolved style to
//! `tokio::task::spawn_blocking` so the wrap loop never stalls the scheduler.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::layout::font_metrics::{get_metrics, FontFamily, FontMetricTable};
use crate::layout::markup::{Block, BlockKind, Markup};
use crate::models::style::parse_length;
use crate::models::{FillGeometry, StyleSnapshot};
use crate::render::oracle::{ContentBaseline, OracleError, PaginationOracle};

// ────────────────────────────────────────────────────────────────────────────
// Page constants
// ────────────────────────────────────────────────────────────────────────────

pub const A4_WIDTH_PX: f64 = 793.7;
pub const A4_HEIGHT_PX: f64 = 1120.0;

const PX_PER_MM: f64 = 96.0 / 25.4;
const PX_PER_PT: f64 = 96.0 / 72.0;

/// Page-box margin used when no `@page` rule overrides it.
pub const DEFAULT_PAGE_BOX_MARGIN_MM: f64 = 10.0;

/// List items are indented by this many body ems.
const LIST_INDENT_EM: f64 = 1.5;
/// Code blocks use a slightly smaller font.
const CODE_FONT_FACTOR: f64 = 0.9;

// ────────────────────────────────────────────────────────────────────────────
// Resolved style
// ────────────────────────────────────────────────────────────────────────────

/// Style variables resolved to pixels and multipliers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedStyle {
    pub page_margin_px: f64,
    pub font_px: f64,
    pub line_height: f64,
    pub heading_scale: f64,
    pub paragraph_spacing_px: f64,
    pub list_item_spacing_px: f64,
}

impl Default for ResolvedStyle {
    fn default() -> Self {
        let font_px = 11.0 * PX_PER_PT;
        Self {
            page_margin_px: 12.0 * PX_PER_MM,
            font_px,
            line_height: 1.5,
            heading_scale: 1.0,
            paragraph_spacing_px: 0.6 * font_px,
            list_item_spacing_px: 0.25 * font_px,
        }
    }
}

impl ResolvedStyle {
    /// Resolves the known variables, keeping the default for any value that does
    /// not parse. Unknown variables are ignored.
    pub fn from_variables(variables: &StyleSnapshot) -> Self {
        let mut style = Self::default();

        // Font size first: em-relative values below depend on it.
        if let Some(px) = resolve(variables, "--body-font-size", |n, unit| {
            to_px(n, unit, style.font_px)
        }) {
            style.font_px = px;
            style.paragraph_spacing_px = 0.6 * px;
            style.list_item_spacing_px = 0.25 * px;
        }
        let em = style.font_px;

        if let Some(px) = resolve(variables, "--page-margin", |n, unit| {
            to_px(n, if unit.is_empty() { "mm" } else { unit }, em)
        }) {
            style.page_margin_px = px;
        }
        if let Some(v) = resolve(variables, "--line-height", unitless) {
            style.line_height = v;
        }
        if let Some(v) = resolve(variables, "--heading-scale", unitless) {
            style.heading_scale = v;
        }
        if let Some(px) = resolve(variables, "--paragraph-spacing", |n, unit| {
            to_px(n, if unit.is_empty() { "em" } else { unit }, em)
        }) {
            style.paragraph_spacing_px = px;
        }
        if let Some(px) = resolve(variables, "--list-item-spacing", |n, unit| {
            to_px(n, if unit.is_empty() { "em" } else { unit }, em)
        }) {
            style.list_item_spacing_px = px;
        }
        style
    }
}

fn resolve(
    variables: &StyleSnapshot,
    name: &str,
    convert: impl Fn(f64, &str) -> Option<f64>,
) -> Option<f64> {
    let raw = variables.get(name)?;
    let value = parse_length(raw).and_then(|(n, unit)| convert(n, unit));
    if value.is_none() {
        warn!(variable = name, value = %raw, "Ignoring unparseable style value");
    }
    value.filter(|v| *v >= 0.0)
}

fn unitless(n: f64, unit: &str) -> Option<f64> {
    unit.is_empty().then_some(n)
}

/// Converts a CSS length to pixels. `em_px` is the font size `em` refers to.
pub fn to_px(value: f64, unit: &str, em_px: f64) -> Option<f64> {
    let px = match unit {
        "" | "px" => value,
        "mm" => value * PX_PER_MM,
        "cm" => value * PX_PER_MM * 10.0,
        "in" => value * 96.0,
        "pt" => value * PX_PER_PT,
        "em" | "rem" => value * em_px,
        _ => return None,
    };
    Some(px)
}

/// Margin set by the last `@page` rule carrying one, in pixels.
fn page_rule_margin_px(head_rules: &[String]) -> Option<f64> {
    head_rules
        .iter()
        .filter(|rule| rule.trim_start().starts_with("@page"))
        .filter_map(|rule| {
            let start = rule.find("margin:")? + "margin:".len();
            let value = rule[start..].split([';', '}']).next()?.trim();
            let (n, unit) = parse_length(value)?;
            to_px(n, unit, 16.0)
        })
        .last()
}

// ────────────────────────────────────────────────────────────────────────────
// Pagination
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
struct PageBox {
    content_top: f64,
    content_width: f64,
    content_height: f64,
}

impl PageBox {
    fn new(page_box_margin_px: f64, style: &ResolvedStyle) -> Self {
        let inset = page_box_margin_px + style.page_margin_px;
        Self {
            content_top: inset,
            content_width: (A4_WIDTH_PX - 2.0 * inset).max(1.0),
            content_height: (A4_HEIGHT_PX - 2.0 * inset).max(1.0),
        }
    }
}

/// Result of one layout pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLayout {
    pub page_count: u32,
    pub geometry: FillGeometry,
}

struct Cursor {
    page: u32,
    y: f64,
    first_page_bottom: Option<f64>,
    first_page_scroll: f64,
}

impl Cursor {
    fn place_line(&mut self, height: f64, content_height: f64) {
        if self.y > 0.0 && self.y + height > content_height {
            self.page += 1;
            self.y = 0.0;
        }
        self.y += height;
        if self.page == 1 {
            self.first_page_bottom = Some(self.y);
            self.first_page_scroll = self.y;
        }
    }

    fn add_margin(&mut self, margin: f64) {
        self.y += margin;
        if self.page == 1 {
            self.first_page_scroll = self.y;
        }
    }
}

fn heading_factor(level: u8) -> f64 {
    match level {
        1 => 1.6,
        2 => 1.3,
        3 => 1.15,
        _ => 1.0,
    }
}

fn paginate(
    blocks: &[Block],
    style: &ResolvedStyle,
    page: &PageBox,
    metrics: &FontMetricTable,
) -> PageLayout {
    let mut cursor = Cursor {
        page: 1,
        y: 0.0,
        first_page_bottom: None,
        first_page_scroll: 0.0,
    };

    for block in blocks {
        let (font_px, width_px, margin) = match block.kind {
            BlockKind::Heading(level) => (
                style.font_px * heading_factor(level) * style.heading_scale,
                page.content_width,
                style.paragraph_spacing_px,
            ),
            BlockKind::Paragraph | BlockKind::Rule => {
                (style.font_px, page.content_width, style.paragraph_spacing_px)
            }
            BlockKind::ListItem => (
                style.font_px,
                page.content_width - LIST_INDENT_EM * style.font_px,
                style.list_item_spacing_px,
            ),
            BlockKind::CodeBlock => (
                style.font_px * CODE_FONT_FACTOR,
                page.content_width,
                style.paragraph_spacing_px,
            ),
        };
        let line_px = font_px * style.line_height;
        let width_em = (width_px.max(font_px) / font_px) as f32;

        let lines = match block.kind {
            BlockKind::Rule => {
                cursor.place_line(1.0, page.content_height);
                0
            }
            BlockKind::CodeBlock => block
                .text
                .lines()
                .map(|line| metrics.wrap_lines(line, width_em).max(1))
                .sum(),
            _ => metrics.wrap_lines(&block.text, width_em).max(1),
        };
        for _ in 0..lines {
            cursor.place_line(line_px, page.content_height);
        }
        cursor.add_margin(margin);
    }

    PageLayout {
        page_count: cursor.page,
        geometry: FillGeometry {
            content_top: page.content_top,
            last_visible_bottom: cursor.first_page_bottom.map(|b| page.content_top + b),
            scroll_height: cursor.first_page_scroll,
            page_height: page.content_height,
        },
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Oracle
// ────────────────────────────────────────────────────────────────────────────

pub struct MetricOracle {
    font: FontFamily,
    document: Option<Arc<Markup>>,
    head_rules: Vec<String>,
    variables: StyleSnapshot,
    layout: Option<PageLayout>,
}

impl MetricOracle {
    pub fn new(font: FontFamily) -> Self {
        Self {
            font,
            document: None,
            head_rules: Vec::new(),
            variables: StyleSnapshot::new(),
            layout: None,
        }
    }
}

#[async_trait]
impl PaginationOracle for MetricOracle {
    fn load(&mut self, baseline: &ContentBaseline) {
        self.document = Some(Arc::clone(&baseline.markup));
        self.head_rules = baseline.head_rules.clone();
        self.variables.clear();
        self.layout = None;
    }

    fn set_style_variable(&mut self, name: &str, value: &str) {
        self.variables.insert(name.to_string(), value.to_string());
    }

    fn append_head_rule(&mut self, rule: &str) {
        self.head_rules.push(rule.to_string());
    }

    async fn preview(&mut self) -> Result<(), OracleError> {
        let document = self
            .document
            .clone()
            .ok_or_else(|| OracleError("no document loaded".to_string()))?;

        let style = ResolvedStyle::from_variables(&self.variables);
        let page_box_margin = page_rule_margin_px(&self.head_rules)
            .unwrap_or(DEFAULT_PAGE_BOX_MARGIN_MM * PX_PER_MM);
        let page = PageBox::new(page_box_margin, &style);
        let metrics = get_metrics(self.font);

        let layout =
            tokio::task::spawn_blocking(move || paginate(document.blocks(), &style, &page, metrics))
                .await
                .map_err(|e| OracleError(format!("layout task failed: {e}")))?;

        debug!(
            pages = layout.page_count,
            last_visible_bottom = ?layout.geometry.last_visible_bottom,
            "Metric oracle laid out document"
        );
        self.layout = Some(layout);
        Ok(())
    }

    fn page_count(&self) -> u32 {
        self.layout.map_or(0, |l| l.page_count)
    }

    fn geometry(&self) -> FillGeometry {
        self.layout.map_or(
            FillGeometry {
                content_top: 0.0,
                last_visible_bottom: None,
                scroll_height: 0.0,
                page_height: A4_HEIGHT_PX,
            },
            |l| l.geometry,
        )
    }

    fn printable(&self) -> Result<String, OracleError> {
        let document = self
            .document
            .as_ref()
            .ok_or_else(|| OracleError("no document loaded".to_string()))?;

        let mut css = self.head_rules.join("\n");
        if !self.variables.is_empty() {
            let declarations: Vec<String> = self
                .variables
                .iter()
                .map(|(name, value)| format!("{name}: {value};"))
                .collect();
            css.push_str(&format!("\n:root {{ {} }}", declarations.join(" ")));
        }

        Ok(format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<style>\n{css}\n</style>\n</head>\n<body>\n<div id=\"content\">\n{}</div>\n</body>\n</html>\n",
            document.to_html()
        ))
    }
}
