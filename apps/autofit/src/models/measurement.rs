use serde::{Deserialize, Serialize};

use crate::models::round2;

/// Geometry read back from the pagination oracle after a preview pass.
///
/// All values are in CSS pixels, in the coordinate space of the first page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FillGeometry {
    /// Top edge of the first page's content box.
    pub content_top: f64,
    /// Bottom edge of the last visible descendant on the first page.
    /// `None` when the first page has no visible descendants.
    pub last_visible_bottom: Option<f64>,
    /// Scroll height of the first page's content box (includes trailing margins).
    pub scroll_height: f64,
    /// Available content height of one page.
    pub page_height: f64,
}

/// The result of one measured render pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Number of rendered page boxes (always ≥ 1).
    pub page_count: u32,
    /// Content height divided by one page's available height.
    /// Only defined when the content occupies exactly one page.
    pub fill_ratio: Option<f64>,
    /// Height of everything beyond the first page.
    pub overflow_px: f64,
    /// `overflow_px` as a rounded percentage of one page.
    pub overflow_percentage: u32,
}

impl Measurement {
    /// Builds a measurement from the oracle's page count and geometry.
    ///
    /// The fill ratio uses the last visible descendant's bottom edge rather than the
    /// raw scroll height: collapsed trailing margins would otherwise hide real overflow.
    pub fn from_geometry(page_count: u32, geometry: &FillGeometry) -> Self {
        let page_count = page_count.max(1);

        let fill_ratio = if page_count == 1 && geometry.page_height > 0.0 {
            let content_height = match geometry.last_visible_bottom {
                Some(bottom) => bottom - geometry.content_top,
                None => geometry.scroll_height,
            };
            Some(round2((content_height / geometry.page_height).max(0.0)))
        } else {
            None
        };

        let overflow_px = (page_count - 1) as f64 * geometry.page_height.max(0.0);
        let overflow_percentage = if geometry.page_height > 0.0 {
            (overflow_px / geometry.page_height * 100.0).round() as u32
        } else {
            0
        };

        Self {
            page_count,
            fill_ratio,
            overflow_px,
            overflow_percentage,
        }
    }

    pub fn fits_one_page(&self) -> bool {
        self.page_count == 1
    }

    /// True when the content fits one page but leaves too much of it empty.
    pub fn is_sparse(&self, threshold: f64) -> bool {
        self.page_count == 1 && self.fill_ratio.is_some_and(|ratio| ratio < threshold)
    }
}
