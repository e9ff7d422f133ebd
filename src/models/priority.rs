use serde::{Deserialize, Serialize};

/// Shared priority tier for segments and recommendations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    /// Lead-score multiplier for the highest-priority matched segment.
    pub fn score_multiplier(&self) -> f64 {
        match self {
            Priority::Critical => 2.0,
            Priority::High => 1.5,
            Priority::Medium => 1.0,
            Priority::Low => 0.5,
        }
    }

    /// Ordering weight for recommendation lists.
    pub fn weight(&self) -> u32 {
        match self {
            Priority::Critical => 10,
            Priority::High => 5,
            Priority::Medium => 3,
            Priority::Low => 1,
        }
    }

    /// Confidence multiplier for recommendations.
    pub fn confidence_multiplier(&self) -> f64 {
        match self {
            Priority::Critical => 1.2,
            Priority::High => 1.1,
            Priority::Medium => 1.0,
            Priority::Low => 0.9,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
