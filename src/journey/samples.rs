use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SampleKind {
    PageView { page: String },
    Click { x: f64, y: f64 },
    /// Scroll position as a percentage of the page
    Scroll { depth: f64 },
    /// Pointer resting over a region
    Attention { x: f64, y: f64, dwell_ms: u64 },
    FormStart { form: String },
    FormSubmit { form: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JourneySample {
    #[serde(flatten)]
    pub kind: SampleKind,
    pub timestamp: DateTime<Utc>,
    /// Selector-ish description of the element involved, if any
    #[serde(default)]
    pub element: Option<String>,
    #[serde(default)]
    pub page: Option<String>,
}

impl JourneySample {
    pub fn new(kind: SampleKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            timestamp,
            element: None,
            page: None,
        }
    }

    pub fn click(x: f64, y: f64, timestamp: DateTime<Utc>) -> Self {
        Self::new(SampleKind::Click { x, y }, timestamp)
    }

    pub fn scroll(depth: f64, timestamp: DateTime<Utc>) -> Self {
        Self::new(SampleKind::Scroll { depth }, timestamp)
    }

    pub fn with_element(mut self, element: impl Into<String>) -> Self {
        self.element = Some(element.into());
        self
    }

    pub fn on_page(mut self, page: impl Into<String>) -> Self {
        self.page = Some(page.into());
        self
    }
}

/// Fixed-capacity FIFO of samples; the oldest sample is dropped first.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: VecDeque<JourneySample>,
    capacity: usize,
}

impl SampleBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: JourneySample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &JourneySample> {
        self.samples.iter()
    }

    /// Samples with `from <= timestamp <= to`, oldest first.
    pub fn between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Iterator<Item = &JourneySample> {
        self.samples
            .iter()
            .filter(move |sample| sample.timestamp >= from && sample.timestamp <= to)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn buffer_evicts_oldest_first() {
        let start = Utc::now();
        let mut buffer = SampleBuffer::new(3);
        for i in 0..5 {
            buffer.push(JourneySample::scroll(i as f64, start + Duration::seconds(i)));
        }
        let depths: Vec<f64> = buffer
            .iter()
            .map(|s| match s.kind {
                SampleKind::Scroll { depth } => depth,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(depths, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn samples_serialize_with_a_type_tag() {
        let sample = JourneySample::click(1.0, 2.0, Utc::now()).with_element("button#cta");
        let value = serde_json::to_value(&sample).unwrap();
        assert_eq!(value["type"], "click");
        assert_eq!(value["element"], "button#cta");
    }
}
