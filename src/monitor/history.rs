use std::{collections::VecDeque, fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::types::MetricSample;

/// Bounded measurement history. Oldest entries are evicted first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct History {
    cap: usize,
    samples: VecDeque<MetricSample>,
}

impl History {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            cap,
            samples: VecDeque::with_capacity(cap),
        }
    }

    /// Reads a history file. A missing file is an empty history; an
    /// unreadable or malformed one is an error.
    pub fn load(path: &Path, cap: usize) -> Result<Self> {
        let mut history = Self::new(cap);
        if !path.exists() {
            return Ok(history);
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read history from {}", path.display()))?;
        let samples: Vec<MetricSample> = serde_json::from_str(&contents)
            .with_context(|| format!("Malformed history file {}", path.display()))?;
        for sample in samples {
            history.push(sample);
        }
        Ok(history)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let serialized = serde_json::to_string_pretty(&self.samples)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write history to {}", path.display()))
    }

    pub fn push(&mut self, sample: MetricSample) {
        self.samples.push_back(sample);
        while self.samples.len() > self.cap {
            self.samples.pop_front();
        }
    }

    /// Values of `metric` across the newest `window` entries, oldest first.
    /// Entries that lack the metric are skipped.
    pub fn recent_values(&self, metric: &str, window: usize) -> Vec<f64> {
        let skip = self.samples.len().saturating_sub(window);
        self.samples
            .iter()
            .skip(skip)
            .filter_map(|sample| sample.get(metric))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &MetricSample> {
        self.samples.iter()
    }

    pub fn latest(&self) -> Option<&MetricSample> {
        self.samples.back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tempfile::tempdir;

    fn sample(i: i64, value: f64) -> MetricSample {
        MetricSample::new(Utc::now() + Duration::seconds(i), "test").with("js", value)
    }

    #[test]
    fn evicts_oldest_past_cap() {
        let mut history = History::new(100);
        for i in 0..105 {
            history.push(sample(i, i as f64));
        }
        assert_eq!(history.len(), 100);
        assert_eq!(history.iter().next().and_then(|s| s.get("js")), Some(5.0));
        assert_eq!(history.latest().and_then(|s| s.get("js")), Some(104.0));
    }

    #[test]
    fn recent_values_take_the_newest_window() {
        let mut history = History::new(10);
        for i in 0..6 {
            history.push(sample(i, i as f64 * 10.0));
        }
        assert_eq!(history.recent_values("js", 3), vec![30.0, 40.0, 50.0]);
        assert!(history.recent_values("css", 3).is_empty());
    }

    #[test]
    fn round_trips_through_disk_and_reapplies_cap() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("history.json");

        let mut history = History::new(100);
        for i in 0..20 {
            history.push(sample(i, i as f64));
        }
        history.save(&path).unwrap();

        let reloaded = History::load(&path, 100).unwrap();
        assert_eq!(reloaded, history);
        assert_eq!(History::load(&path, 5).unwrap().len(), 5);
    }

    #[test]
    fn missing_file_is_empty_but_garbage_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");
        assert!(History::load(&path, 100).unwrap().is_empty());

        fs::write(&path, "{not json").unwrap();
        assert!(History::load(&path, 100).is_err());
    }
}
