use std::collections::HashMap;

use serde::Serialize;

use super::samples::{JourneySample, SampleKind};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HotSpot {
    pub page: String,
    /// Top-left corner of the grid cell
    pub x: f64,
    pub y: f64,
    pub clicks: u64,
}

/// Click counts per grid cell and dwell time per element, per page.
#[derive(Debug, Clone)]
pub struct Heatmap {
    cell_px: f64,
    clicks: HashMap<(String, i64, i64), u64>,
    attention_ms: HashMap<String, u64>,
    scroll_reach: HashMap<String, f64>,
}

impl Heatmap {
    pub fn new(cell_px: f64) -> Self {
        Self {
            cell_px: if cell_px > 0.0 { cell_px } else { 50.0 },
            clicks: HashMap::new(),
            attention_ms: HashMap::new(),
            scroll_reach: HashMap::new(),
        }
    }

    pub fn observe(&mut self, sample: &JourneySample) {
        let page = sample.page.clone().unwrap_or_default();
        match sample.kind {
            SampleKind::Click { x, y } => {
                let cell = (
                    page,
                    (x / self.cell_px).floor() as i64,
                    (y / self.cell_px).floor() as i64,
                );
                *self.clicks.entry(cell).or_insert(0) += 1;
            }
            SampleKind::Attention { dwell_ms, .. } => {
                let key = sample.element.clone().unwrap_or(page);
                *self.attention_ms.entry(key).or_insert(0) += dwell_ms;
            }
            SampleKind::Scroll { depth } => {
                let reach = self.scroll_reach.entry(page).or_insert(0.0);
                *reach = reach.max(depth);
            }
            _ => {}
        }
    }

    /// Busiest cells across all pages, most clicks first.
    pub fn hot_spots(&self, limit: usize) -> Vec<HotSpot> {
        let mut spots: Vec<HotSpot> = self
            .clicks
            .iter()
            .map(|((page, cx, cy), clicks)| HotSpot {
                page: page.clone(),
                x: *cx as f64 * self.cell_px,
                y: *cy as f64 * self.cell_px,
                clicks: *clicks,
            })
            .collect();
        spots.sort_by(|a, b| {
            b.clicks
                .cmp(&a.clicks)
                .then_with(|| a.page.cmp(&b.page))
                .then_with(|| a.y.total_cmp(&b.y))
                .then_with(|| a.x.total_cmp(&b.x))
        });
        spots.truncate(limit);
        spots
    }

    /// Elements by accumulated dwell time, longest first.
    pub fn attention(&self, limit: usize) -> Vec<(String, u64)> {
        let mut ranked: Vec<(String, u64)> = self
            .attention_ms
            .iter()
            .map(|(element, ms)| (element.clone(), *ms))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(limit);
        ranked
    }

    pub fn scroll_reach(&self, page: &str) -> Option<f64> {
        self.scroll_reach.get(page).copied()
    }
}
