use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::config::JourneyConfig;
use super::samples::{JourneySample, SampleBuffer, SampleKind};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FrustrationKind {
    RageClick,
    RapidScroll,
    FormAbandonment,
}

impl FrustrationKind {
    pub fn event_name(&self) -> &'static str {
        match self {
            FrustrationKind::RageClick => "rage_click",
            FrustrationKind::RapidScroll => "rapid_scroll",
            FrustrationKind::FormAbandonment => "form_abandonment",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FrustrationSignal {
    pub kind: FrustrationKind,
    pub at: DateTime<Utc>,
    pub page: Option<String>,
    pub element: Option<String>,
    /// Clicks in the cluster, scroll swing, or abandoned form id
    pub detail: String,
}

/// Fires once per burst of clustered clicks. Clicks that already took part
/// in a fired burst are not counted again.
#[derive(Debug, Clone)]
pub struct RageClickDetector {
    window: Duration,
    radius: f64,
    threshold: usize,
    last_fired: Option<DateTime<Utc>>,
}

impl RageClickDetector {
    pub fn new(config: &JourneyConfig) -> Self {
        Self {
            window: Duration::milliseconds(config.rage_click_window_ms),
            radius: config.rage_click_radius_px,
            threshold: config.rage_click_threshold.max(1),
            last_fired: None,
        }
    }

    pub fn check(
        &mut self,
        buffer: &SampleBuffer,
        latest: &JourneySample,
    ) -> Option<FrustrationSignal> {
        if !matches!(latest.kind, SampleKind::Click { .. }) {
            return None;
        }

        let from = latest.timestamp - self.window;
        let clicks: Vec<(f64, f64)> = buffer
            .between(from, latest.timestamp)
            .filter(|sample| self.last_fired.map_or(true, |fired| sample.timestamp > fired))
            .filter_map(|sample| match sample.kind {
                SampleKind::Click { x, y } => Some((x, y)),
                _ => None,
            })
            .collect();

        if clicks.len() < self.threshold {
            return None;
        }

        let n = clicks.len() as f64;
        let (mean_x, mean_y) = clicks
            .iter()
            .fold((0.0, 0.0), |(sx, sy), (x, y)| (sx + x / n, sy + y / n));
        let clustered = clicks
            .iter()
            .filter(|(x, y)| ((x - mean_x).powi(2) + (y - mean_y).powi(2)).sqrt() <= self.radius)
            .count();

        if clustered < self.threshold {
            return None;
        }

        self.last_fired = Some(latest.timestamp);
        Some(FrustrationSignal {
            kind: FrustrationKind::RageClick,
            at: latest.timestamp,
            page: latest.page.clone(),
            element: latest.element.clone(),
            detail: format!("{clustered} clicks around ({mean_x:.0}, {mean_y:.0})"),
        })
    }
}

/// Large scroll swings in a short window: skimming or hunting for something.
#[derive(Debug, Clone)]
pub struct RapidScrollDetector {
    window: Duration,
    delta: f64,
    last_fired: Option<DateTime<Utc>>,
}

impl RapidScrollDetector {
    pub fn new(config: &JourneyConfig) -> Self {
        Self {
            window: Duration::milliseconds(config.rapid_scroll_window_ms),
            delta: config.rapid_scroll_delta,
            last_fired: None,
        }
    }

    pub fn check(
        &mut self,
        buffer: &SampleBuffer,
        latest: &JourneySample,
    ) -> Option<FrustrationSignal> {
        if !matches!(latest.kind, SampleKind::Scroll { .. }) {
            return None;
        }

        let from = latest.timestamp - self.window;
        let depths: Vec<f64> = buffer
            .between(from, latest.timestamp)
            .filter(|sample| self.last_fired.map_or(true, |fired| sample.timestamp > fired))
            .filter_map(|sample| match sample.kind {
                SampleKind::Scroll { depth } => Some(depth),
                _ => None,
            })
            .collect();

        let reversals = depths
            .windows(3)
            .filter(|w| (w[1] - w[0]).signum() * (w[2] - w[1]).signum() < 0.0)
            .count();
        let swing = depths.iter().copied().fold(f64::NEG_INFINITY, f64::max)
            - depths.iter().copied().fold(f64::INFINITY, f64::min);

        if depths.len() < 2 || swing < self.delta {
            return None;
        }

        self.last_fired = Some(latest.timestamp);
        Some(FrustrationSignal {
            kind: FrustrationKind::RapidScroll,
            at: latest.timestamp,
            page: latest.page.clone(),
            element: None,
            detail: format!("{swing:.0}% swing, {reversals} reversals"),
        })
    }
}

/// Forms started on the current page and not yet submitted.
#[derive(Debug, Clone, Default)]
pub struct FormAbandonmentTracker {
    open_forms: BTreeSet<String>,
}

impl FormAbandonmentTracker {
    pub fn observe(&mut self, sample: &JourneySample) {
        match &sample.kind {
            SampleKind::FormStart { form } => {
                self.open_forms.insert(form.clone());
            }
            SampleKind::FormSubmit { form } => {
                self.open_forms.remove(form);
            }
            _ => {}
        }
    }

    /// Called when the visitor leaves `page`; drains every open form.
    pub fn page_left(&mut self, page: Option<&str>, at: DateTime<Utc>) -> Vec<FrustrationSignal> {
        std::mem::take(&mut self.open_forms)
            .into_iter()
            .map(|form| FrustrationSignal {
                kind: FrustrationKind::FormAbandonment,
                at,
                page: page.map(str::to_string),
                element: Some(form.clone()),
                detail: form,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(detector: &mut RageClickDetector, clicks: &[(f64, f64, i64)]) -> usize {
        let start = Utc::now();
        let mut buffer = SampleBuffer::new(100);
        let mut fired = 0;
        for (x, y, offset_ms) in clicks {
            let sample = JourneySample::click(*x, *y, start + Duration::milliseconds(*offset_ms));
            buffer.push(sample.clone());
            if detector.check(&buffer, &sample).is_some() {
                fired += 1;
            }
        }
        fired
    }

    #[test]
    fn five_clustered_clicks_inside_two_seconds_fire() {
        let mut detector = RageClickDetector::new(&JourneyConfig::default());
        let clicks = [
            (100.0, 100.0, 0),
            (110.0, 95.0, 300),
            (95.0, 108.0, 600),
            (104.0, 102.0, 900),
            (99.0, 97.0, 1_200),
        ];
        assert_eq!(feed(&mut detector, &clicks), 1);
    }

    #[test]
    fn same_clicks_spread_over_three_seconds_do_not_fire() {
        let mut detector = RageClickDetector::new(&JourneyConfig::default());
        let clicks = [
            (100.0, 100.0, 0),
            (110.0, 95.0, 750),
            (95.0, 108.0, 1_500),
            (104.0, 102.0, 2_250),
            (99.0, 97.0, 3_000),
        ];
        assert_eq!(feed(&mut detector, &clicks), 0);
    }

    #[test]
    fn scattered_clicks_do_not_fire() {
        let mut detector = RageClickDetector::new(&JourneyConfig::default());
        let clicks = [
            (0.0, 0.0, 0),
            (400.0, 0.0, 100),
            (0.0, 400.0, 200),
            (400.0, 400.0, 300),
            (200.0, 200.0, 400),
        ];
        assert_eq!(feed(&mut detector, &clicks), 0);
    }

    #[test]
    fn a_burst_fires_only_once() {
        let mut detector = RageClickDetector::new(&JourneyConfig::default());
        let clicks: Vec<(f64, f64, i64)> = (0..7).map(|i| (50.0, 50.0, i * 100)).collect();
        assert_eq!(feed(&mut detector, &clicks), 1);
    }

    #[test]
    fn rapid_scroll_swing_fires() {
        let start = Utc::now();
        let mut detector = RapidScrollDetector::new(&JourneyConfig::default());
        let mut buffer = SampleBuffer::new(10);
        let mut signals = Vec::new();
        for (depth, ms) in [(10.0, 0), (40.0, 150), (75.0, 300)] {
            let sample = JourneySample::scroll(depth, start + Duration::milliseconds(ms));
            buffer.push(sample.clone());
            signals.extend(detector.check(&buffer, &sample));
        }
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].kind, FrustrationKind::RapidScroll);
    }

    #[test]
    fn unsubmitted_forms_are_abandoned_on_page_leave() {
        let now = Utc::now();
        let mut tracker = FormAbandonmentTracker::default();
        let sample = |kind: SampleKind| JourneySample::new(kind, now);
        tracker.observe(&sample(SampleKind::FormStart { form: "contact".into() }));
        tracker.observe(&sample(SampleKind::FormStart { form: "newsletter".into() }));
        tracker.observe(&sample(SampleKind::FormSubmit { form: "newsletter".into() }));

        let signals = tracker.page_left(Some("/contact"), now);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].detail, "contact");
        assert!(tracker.page_left(Some("/contact"), now).is_empty());
    }
}
