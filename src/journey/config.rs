/// Thresholds for frustration detection and path analysis.
#[derive(Debug, Clone)]
pub struct JourneyConfig {
    /// Ring buffer size for raw samples
    pub buffer_capacity: usize,

    /// Rage clicks: this many clicks within the radius of their mean inside the window
    pub rage_click_window_ms: i64,
    pub rage_click_radius_px: f64,
    pub rage_click_threshold: usize,

    /// Rapid scrolling: depth swing (percentage points) inside the window
    pub rapid_scroll_window_ms: i64,
    pub rapid_scroll_delta: f64,

    /// Transition exit rate above which it is reported as a drop-off point
    pub drop_off_threshold: f64,
    /// Path conversion rate at or above which it counts as high-converting
    pub high_conversion_rate: f64,
    pub top_paths: usize,

    pub heatmap_cell_px: f64,
}

impl Default for JourneyConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 500,
            rage_click_window_ms: 2_000,
            rage_click_radius_px: 50.0,
            rage_click_threshold: 5,
            rapid_scroll_window_ms: 500,
            rapid_scroll_delta: 50.0,
            drop_off_threshold: 0.5,
            high_conversion_rate: 0.3,
            top_paths: 5,
            heatmap_cell_px: 50.0,
        }
    }
}
