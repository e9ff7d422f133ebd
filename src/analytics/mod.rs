//! The in-page analytics layer: one explicitly constructed client that owns
//! the profile store, journey analyzer, experiments and recommendations,
//! and forwards everything through a consent-gated event sink.

pub mod client;
pub mod config;
pub mod sink;

pub use client::{spawn_background, spawn_reevaluation, AnalyticsClient, Behavior};
pub use config::AnalyticsConfig;
pub use sink::{AnalyticsBackend, AnalyticsEvent, Consent, EventSink, RecordingBackend, SinkMode};
