use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{
    config::JourneyConfig,
    frustration::{
        FormAbandonmentTracker, FrustrationKind, FrustrationSignal, RageClickDetector,
        RapidScrollDetector,
    },
    heatmap::{Heatmap, HotSpot},
    patterns::{DropOffPoint, JourneyPattern, PatternStore},
    samples::{JourneySample, SampleBuffer, SampleKind},
};
use crate::{log_debug, log_info};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "journey";

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JourneyInsights {
    pub common_paths: Vec<JourneyPattern>,
    pub high_converting_paths: Vec<JourneyPattern>,
    pub drop_off_points: Vec<DropOffPoint>,
    pub frustration_counts: HashMap<FrustrationKind, u64>,
    pub hot_spots: Vec<HotSpot>,
    pub recommendations: Vec<String>,
}

impl JourneyInsights {
    pub fn frustration_total(&self) -> u64 {
        self.frustration_counts.values().sum()
    }
}

struct ActiveJourney {
    pages: Vec<String>,
    started_at: DateTime<Utc>,
    converted: bool,
}

/// Records samples and page sequences; every derived view is recomputed on demand.
pub struct JourneyAnalyzer {
    config: JourneyConfig,
    buffer: SampleBuffer,
    patterns: PatternStore,
    heatmap: Heatmap,
    rage_clicks: RageClickDetector,
    rapid_scroll: RapidScrollDetector,
    forms: FormAbandonmentTracker,
    frustration_counts: HashMap<FrustrationKind, u64>,
    current: Option<ActiveJourney>,
}

impl Default for JourneyAnalyzer {
    fn default() -> Self {
        Self::new(JourneyConfig::default())
    }
}

impl JourneyAnalyzer {
    pub fn new(config: JourneyConfig) -> Self {
        Self {
            buffer: SampleBuffer::new(config.buffer_capacity),
            heatmap: Heatmap::new(config.heatmap_cell_px),
            rage_clicks: RageClickDetector::new(&config),
            rapid_scroll: RapidScrollDetector::new(&config),
            forms: FormAbandonmentTracker::default(),
            patterns: PatternStore::default(),
            frustration_counts: HashMap::new(),
            current: None,
            config,
        }
    }

    /// Appends a sample and runs the frustration passes against it.
    /// Returns the signals that fired for this sample.
    pub fn record(&mut self, mut sample: JourneySample) -> Vec<FrustrationSignal> {
        let current_page = self.current_page().map(str::to_string);
        if sample.page.is_none() {
            sample.page = current_page.clone();
        }

        let mut fired = Vec::new();
        if let SampleKind::PageView { page } = &sample.kind {
            fired.extend(self.forms.page_left(current_page.as_deref(), sample.timestamp));
            let journey = self.current.get_or_insert_with(|| ActiveJourney {
                pages: Vec::new(),
                started_at: sample.timestamp,
                converted: false,
            });
            journey.pages.push(page.clone());
        }

        self.buffer.push(sample.clone());
        self.heatmap.observe(&sample);
        self.forms.observe(&sample);
        fired.extend(self.rage_clicks.check(&self.buffer, &sample));
        fired.extend(self.rapid_scroll.check(&self.buffer, &sample));

        for signal in &fired {
            log_debug!("{:?} on {:?}: {}", signal.kind, signal.page, signal.detail);
        }
        self.count(&fired);
        fired
    }

    pub fn mark_conversion(&mut self) {
        if let Some(journey) = self.current.as_mut() {
            journey.converted = true;
        }
    }

    /// Closes the active journey into the path patterns. Open forms count as abandoned.
    pub fn end_journey(&mut self, at: DateTime<Utc>) -> Vec<FrustrationSignal> {
        let current_page = self.current_page().map(str::to_string);
        let abandoned = self.forms.page_left(current_page.as_deref(), at);
        self.count(&abandoned);

        if let Some(journey) = self.current.take() {
            let duration_ms = (at - journey.started_at).num_milliseconds().max(0) as u64;
            self.patterns
                .record(&journey.pages, duration_ms, journey.converted);
            log_info!(
                "journey closed: {} pages, converted={}",
                journey.pages.len(),
                journey.converted
            );
        }
        abandoned
    }

    /// Folds an externally captured page sequence into the patterns and
    /// returns fresh insights.
    pub fn analyze_sequence(
        &mut self,
        sequence: &[String],
        duration_ms: u64,
        converted: bool,
    ) -> JourneyInsights {
        self.patterns.record(sequence, duration_ms, converted);
        self.insights()
    }

    pub fn insights(&self) -> JourneyInsights {
        let common_paths = self.patterns.common_paths(self.config.top_paths);
        let high_converting_paths = self
            .patterns
            .high_converting_paths(self.config.high_conversion_rate, self.config.top_paths);
        let drop_off_points = self.patterns.drop_off_points(self.config.drop_off_threshold);

        let frustration_counts = self.frustration_counts.clone();
        let recommendations = recommend(
            &common_paths,
            &high_converting_paths,
            &drop_off_points,
            &frustration_counts,
        );

        JourneyInsights {
            common_paths,
            high_converting_paths,
            drop_off_points,
            frustration_counts,
            hot_spots: self.heatmap.hot_spots(self.config.top_paths),
            recommendations,
        }
    }

    /// Session totals per frustration kind.
    pub fn frustration_counts(&self) -> &HashMap<FrustrationKind, u64> {
        &self.frustration_counts
    }

    fn count(&mut self, signals: &[FrustrationSignal]) {
        for signal in signals {
            *self.frustration_counts.entry(signal.kind).or_insert(0) += 1;
        }
    }

    pub fn samples(&self) -> &SampleBuffer {
        &self.buffer
    }

    pub fn heatmap(&self) -> &Heatmap {
        &self.heatmap
    }

    pub fn current_page(&self) -> Option<&str> {
        self.current
            .as_ref()
            .and_then(|journey| journey.pages.last())
            .map(String::as_str)
    }
}

fn recommend(
    common: &[JourneyPattern],
    converting: &[JourneyPattern],
    drop_offs: &[DropOffPoint],
    frustration: &HashMap<FrustrationKind, u64>,
) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(top) = common.first() {
        out.push(format!(
            "Streamline the most common path ({}): {} visits",
            top.path, top.count
        ));
    }
    if let Some(best) = converting.first() {
        out.push(format!(
            "Promote the high-converting path ({}): {:.0}% conversion",
            best.path,
            best.conversion_rate() * 100.0
        ));
    }
    if let Some(worst) = drop_offs.first() {
        let step = match &worst.from {
            Some(from) => format!("{from}{}{}", super::PATH_SEPARATOR, worst.to),
            None => format!("landing on {}", worst.to),
        };
        out.push(format!(
            "Reduce drop-off after {step}: {:.0}% of visitors leave",
            worst.rate * 100.0
        ));
    }
    if frustration.get(&FrustrationKind::RageClick).copied().unwrap_or(0) > 0 {
        out.push(
            "Investigate rage-clicked elements; they likely look interactive but are not".into(),
        );
    }
    if frustration
        .get(&FrustrationKind::FormAbandonment)
        .copied()
        .unwrap_or(0)
        > 0
    {
        out.push("Shorten or clarify forms that visitors start but abandon".into());
    }
    out
}
