use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::monitor::config::{SeriesConfig, SeriesOverrides};

pub const DEFAULT_SETTINGS_FILE: &str = "performance.config.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathSettings {
    pub dist_dir: PathBuf,
    pub reports_dir: PathBuf,
    /// Where each series keeps its `<name>-history.json`
    pub history_dir: PathBuf,
    pub dashboard_output: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            dist_dir: "dist".into(),
            reports_dir: "reports".into(),
            history_dir: "reports/history".into(),
            dashboard_output: "reports/performance-dashboard.html".into(),
        }
    }
}

impl PathSettings {
    pub fn history_file(&self, series: &str) -> PathBuf {
        self.history_dir.join(format!("{series}-history.json"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProbeSettings {
    pub base_url: String,
    pub pages: Vec<String>,
    pub timeout_ms: u64,
    /// Lighthouse JSON report to prefer over the HTTP probe
    pub lighthouse_report: Option<PathBuf>,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".into(),
            pages: vec!["/".into()],
            timeout_ms: 10_000,
            lighthouse_report: None,
        }
    }
}

impl ProbeSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
struct RawSettings {
    web_vitals: SeriesOverrides,
    bundle: SeriesOverrides,
    lighthouse: SeriesOverrides,
    paths: PathSettings,
    probe: ProbeSettings,
}

/// Monitor configuration: built-in series defaults with the settings file
/// layered on top.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    pub web_vitals: SeriesConfig,
    pub bundle: SeriesConfig,
    pub lighthouse: SeriesConfig,
    pub paths: PathSettings,
    pub probe: ProbeSettings,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from_raw(RawSettings::default())
    }
}

impl MonitorSettings {
    fn from_raw(raw: RawSettings) -> Self {
        Self {
            web_vitals: raw.web_vitals.apply(SeriesConfig::web_vitals()),
            bundle: raw.bundle.apply(SeriesConfig::bundle()),
            lighthouse: raw.lighthouse.apply(SeriesConfig::lighthouse()),
            paths: raw.paths,
            probe: raw.probe,
        }
    }

    /// A missing file means defaults. A file that exists but cannot be read
    /// or parsed is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("Malformed settings file {}", path.display()))
    }

    /// Loads `explicit` when given (and then it must exist), else the
    /// default file in the working directory if present.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("settings file {} not found", path.display());
                }
                Self::load(path)
            }
            None => Self::load(Path::new(DEFAULT_SETTINGS_FILE)),
        }
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let raw: RawSettings = serde_json::from_str(contents)?;
        Ok(Self::from_raw(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let settings = MonitorSettings::load(&dir.path().join("none.json")).unwrap();
        assert_eq!(settings, MonitorSettings::default());
        assert_eq!(settings.bundle.budgets["js"], 600.0);
        assert_eq!(settings.web_vitals.baseline_window, 5);
        assert_eq!(settings.bundle.baseline_window, 10);
    }

    #[test]
    fn sections_override_defaults() {
        let settings = MonitorSettings::parse(
            r#"{
                "bundle": {"budgets": {"js": 400}},
                "paths": {"dist_dir": "public"},
                "probe": {"base_url": "https://example.test", "timeout_ms": 2500}
            }"#,
        )
        .unwrap();
        assert_eq!(settings.bundle.budgets["js"], 400.0);
        assert_eq!(settings.bundle.budgets["total"], 2000.0);
        assert_eq!(settings.paths.dist_dir, PathBuf::from("public"));
        assert_eq!(settings.paths.reports_dir, PathBuf::from("reports"));
        assert_eq!(settings.probe.timeout(), Duration::from_millis(2500));
        assert_eq!(settings.probe.pages, vec!["/".to_string()]);
    }

    #[test]
    fn malformed_file_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("performance.config.json");
        fs::write(&path, "{\"bundle\": ").unwrap();
        assert!(MonitorSettings::load(&path).is_err());
        assert!(MonitorSettings::resolve(Some(&dir.path().join("other.json"))).is_err());
    }
}
