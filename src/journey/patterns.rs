use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const PATH_SEPARATOR: &str = "→";

pub fn path_key(pages: &[String]) -> String {
    pages.join(PATH_SEPARATOR)
}

/// Accumulated counters for one exact page sequence. Never decremented.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JourneyPattern {
    pub path: String,
    pub pages: Vec<String>,
    pub count: u64,
    pub total_time_ms: u64,
    pub conversions: u64,
}

impl JourneyPattern {
    pub fn conversion_rate(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.conversions as f64 / self.count as f64
        }
    }

    pub fn drop_off_rate(&self) -> f64 {
        1.0 - self.conversion_rate()
    }

    pub fn average_time_ms(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            self.total_time_ms / self.count
        }
    }
}

/// Exit rate of one page-to-page step, measured over the journeys that took it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DropOffPoint {
    /// `None` when the journey ended on its landing page
    pub from: Option<String>,
    pub to: String,
    pub traversals: u64,
    pub exits: u64,
    pub rate: f64,
}

#[derive(Debug, Clone, Default)]
pub struct PatternStore {
    patterns: HashMap<String, JourneyPattern>,
}

impl PatternStore {
    pub fn record(&mut self, pages: &[String], duration_ms: u64, converted: bool) {
        if pages.is_empty() {
            return;
        }
        let path = path_key(pages);
        let pattern = self
            .patterns
            .entry(path.clone())
            .or_insert_with(|| JourneyPattern {
                path,
                pages: pages.to_vec(),
                count: 0,
                total_time_ms: 0,
                conversions: 0,
            });
        pattern.count += 1;
        pattern.total_time_ms = pattern.total_time_ms.saturating_add(duration_ms);
        if converted {
            pattern.conversions += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&JourneyPattern> {
        self.patterns.get(path)
    }

    /// Most travelled paths first; ties by path for stable output.
    pub fn common_paths(&self, limit: usize) -> Vec<JourneyPattern> {
        let mut all: Vec<JourneyPattern> = self.patterns.values().cloned().collect();
        all.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.path.cmp(&b.path)));
        all.truncate(limit);
        all
    }

    pub fn high_converting_paths(&self, min_rate: f64, limit: usize) -> Vec<JourneyPattern> {
        let mut matching: Vec<JourneyPattern> = self
            .patterns
            .values()
            .filter(|p| p.conversions > 0 && p.conversion_rate() >= min_rate)
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.conversion_rate()
                .total_cmp(&a.conversion_rate())
                .then_with(|| b.count.cmp(&a.count))
                .then_with(|| a.path.cmp(&b.path))
        });
        matching.truncate(limit);
        matching
    }

    /// Steps after which non-converting journeys most often end.
    ///
    /// Each step is charged only for the journeys that actually exited right
    /// after it, so early steps of a long path are not blamed for a late exit.
    pub fn drop_off_points(&self, threshold: f64) -> Vec<DropOffPoint> {
        let mut traversals: HashMap<(Option<String>, String), u64> = HashMap::new();
        let mut exits: HashMap<(Option<String>, String), u64> = HashMap::new();

        for pattern in self.patterns.values() {
            let steps = std::iter::once(None)
                .chain(pattern.pages.iter().map(Some))
                .zip(pattern.pages.iter());
            for (from, to) in steps {
                *traversals
                    .entry((from.cloned(), to.clone()))
                    .or_insert(0) += pattern.count;
            }

            let non_converting = pattern.count.saturating_sub(pattern.conversions);
            if non_converting > 0 {
                let last = pattern.pages.len() - 1;
                let from = last.checked_sub(1).map(|i| pattern.pages[i].clone());
                *exits
                    .entry((from, pattern.pages[last].clone()))
                    .or_insert(0) += non_converting;
            }
        }

        let mut points: Vec<DropOffPoint> = exits
            .into_iter()
            .filter_map(|((from, to), exit_count)| {
                let total = traversals.get(&(from.clone(), to.clone())).copied().unwrap_or(0);
                if total == 0 {
                    return None;
                }
                let rate = exit_count as f64 / total as f64;
                (rate > threshold).then(|| DropOffPoint {
                    from,
                    to,
                    traversals: total,
                    exits: exit_count,
                    rate,
                })
            })
            .collect();
        points.sort_by(|a, b| {
            b.rate
                .total_cmp(&a.rate)
                .then_with(|| b.exits.cmp(&a.exits))
                .then_with(|| a.to.cmp(&b.to))
        });
        points
    }
}
