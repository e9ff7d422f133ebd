pub mod analytics;
pub mod experiments;
pub mod journey;
pub mod models;
pub mod monitor;
pub mod optimization;
pub mod profile;
pub mod segmentation;
pub mod settings;
pub mod storage;
pub mod utils;

pub use analytics::{AnalyticsClient, AnalyticsConfig};
pub use settings::MonitorSettings;

/// Installs the `env_logger` backend at info level; `RUST_LOG` overrides.
/// Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init();
}
