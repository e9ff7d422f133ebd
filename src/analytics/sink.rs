use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::storage::{self, KeyValueStore};
use crate::{log_error, log_info, log_warn};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "analytics::sink";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AnalyticsEvent {
    pub name: String,
    pub params: Map<String, Value>,
    pub recorded_at: DateTime<Utc>,
}

/// The external analytics collector (the page's `gtag`-style global).
pub trait AnalyticsBackend: Send + Sync {
    /// Whether the collector script has finished loading.
    fn is_loaded(&self) -> bool;

    fn send(&self, event: &AnalyticsEvent) -> Result<()>;
}

/// Keeps every event it receives; used by tests and local development.
#[derive(Default)]
pub struct RecordingBackend {
    loaded: std::sync::atomic::AtomicBool,
    events: Mutex<Vec<AnalyticsEvent>>,
}

impl RecordingBackend {
    pub fn loaded() -> Self {
        let backend = Self::default();
        backend.set_loaded(true);
        backend
    }

    pub fn set_loaded(&self, loaded: bool) {
        self.loaded
            .store(loaded, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<AnalyticsEvent> {
        lock(&self.events).clone()
    }

    pub fn names(&self) -> Vec<String> {
        lock(&self.events).iter().map(|e| e.name.clone()).collect()
    }
}

impl AnalyticsBackend for RecordingBackend {
    fn is_loaded(&self) -> bool {
        self.loaded.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn send(&self, event: &AnalyticsEvent) -> Result<()> {
        lock(&self.events).push(event.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Consent {
    Granted,
    Denied,
}

impl Consent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Consent::Granted => "granted",
            Consent::Denied => "denied",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkMode {
    /// Waiting for the collector script
    Loading,
    Ready,
    /// Collector never loaded; events go to the log
    Fallback,
}

struct SinkState {
    mode: SinkMode,
    consent: Consent,
    queue: VecDeque<AnalyticsEvent>,
}

/// Consent-gated forwarder to the analytics collector.
///
/// Events are queued until consent is granted and the collector is ready,
/// then flushed in arrival order. Delivery is a single attempt.
pub struct EventSink {
    backend: Arc<dyn AnalyticsBackend>,
    store: Arc<dyn KeyValueStore>,
    state: Mutex<SinkState>,
}

impl EventSink {
    pub fn new(backend: Arc<dyn AnalyticsBackend>, store: Arc<dyn KeyValueStore>) -> Self {
        let consent = match store.get(storage::CONSENT_KEY) {
            Ok(Some(Value::String(flag))) if flag == Consent::Granted.as_str() => Consent::Granted,
            Ok(_) => Consent::Denied,
            Err(err) => {
                log_warn!("could not read consent flag, treating as denied: {err}");
                Consent::Denied
            }
        };
        let mode = if backend.is_loaded() {
            SinkMode::Ready
        } else {
            SinkMode::Loading
        };

        Self {
            backend,
            store,
            state: Mutex::new(SinkState {
                mode,
                consent,
                queue: VecDeque::new(),
            }),
        }
    }

    pub fn consent(&self) -> Consent {
        lock(&self.state).consent
    }

    pub fn mode(&self) -> SinkMode {
        lock(&self.state).mode
    }

    pub fn queued(&self) -> usize {
        lock(&self.state).queue.len()
    }

    pub fn track(&self, name: &str, params: Map<String, Value>) {
        let event = AnalyticsEvent {
            name: name.to_string(),
            params,
            recorded_at: Utc::now(),
        };

        let mut state = lock(&self.state);
        if state.consent == Consent::Granted && state.mode != SinkMode::Loading {
            let mode = state.mode;
            drop(state);
            self.deliver(mode, &event);
        } else {
            state.queue.push_back(event);
        }
    }

    /// Persists the flag; granting flushes everything queued so far.
    pub fn set_consent(&self, consent: Consent) {
        if let Err(err) = self
            .store
            .set(storage::CONSENT_KEY, Value::String(consent.as_str().to_string()))
        {
            log_warn!("consent flag not persisted: {err}");
        }
        lock(&self.state).consent = consent;
        log_info!("analytics consent {}", consent.as_str());
        self.flush();
    }

    /// Polls the collector up to `attempts` times, `interval` apart.
    /// Gives up into fallback mode if it never reports loaded.
    pub async fn wait_for_backend(&self, attempts: u32, interval: Duration) -> SinkMode {
        for attempt in 0..attempts.max(1) {
            if self.backend.is_loaded() {
                lock(&self.state).mode = SinkMode::Ready;
                self.flush();
                return SinkMode::Ready;
            }
            if attempt + 1 < attempts {
                tokio::time::sleep(interval).await;
            }
        }

        log_warn!("analytics collector did not load after {attempts} checks; using fallback mode");
        lock(&self.state).mode = SinkMode::Fallback;
        self.flush();
        SinkMode::Fallback
    }

    fn flush(&self) {
        let (mode, pending) = {
            let mut state = lock(&self.state);
            if state.consent != Consent::Granted || state.mode == SinkMode::Loading {
                return;
            }
            (state.mode, std::mem::take(&mut state.queue))
        };

        for event in pending {
            self.deliver(mode, &event);
        }
    }

    fn deliver(&self, mode: SinkMode, event: &AnalyticsEvent) {
        match mode {
            SinkMode::Ready => {
                if let Err(err) = self.backend.send(event) {
                    log_error!("dropping event '{}': {err:#}", event.name);
                }
            }
            _ => {
                log::info!(
                    target: "analytics::fallback",
                    "{} {}",
                    event.name,
                    Value::Object(event.params.clone())
                );
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn events_wait_for_consent_and_flush_in_order() {
        let backend = Arc::new(RecordingBackend::loaded());
        let sink = EventSink::new(backend.clone(), Arc::new(MemoryStore::new()));

        for name in ["page_view", "scroll_depth", "click"] {
            sink.track(name, params(json!({"page": "/"})));
        }
        assert!(backend.events().is_empty());
        assert_eq!(sink.queued(), 3);

        sink.set_consent(Consent::Granted);
        assert_eq!(backend.names(), vec!["page_view", "scroll_depth", "click"]);
        assert_eq!(sink.queued(), 0);

        sink.track("resume_download", Map::new());
        assert_eq!(backend.events().len(), 4);
    }

    #[test]
    fn consent_is_remembered_across_sinks() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        EventSink::new(Arc::new(RecordingBackend::loaded()), store.clone())
            .set_consent(Consent::Granted);

        let sink = EventSink::new(Arc::new(RecordingBackend::loaded()), store);
        assert_eq!(sink.consent(), Consent::Granted);
    }

    #[tokio::test]
    async fn late_collector_flushes_once_loaded() {
        let backend = Arc::new(RecordingBackend::default());
        let sink = EventSink::new(backend.clone(), Arc::new(MemoryStore::new()));
        sink.set_consent(Consent::Granted);
        sink.track("page_view", Map::new());
        assert_eq!(sink.queued(), 1);

        backend.set_loaded(true);
        let mode = sink.wait_for_backend(20, Duration::from_millis(1)).await;
        assert_eq!(mode, SinkMode::Ready);
        assert_eq!(backend.names(), vec!["page_view"]);
    }

    #[tokio::test]
    async fn missing_collector_falls_back_to_the_log() {
        let backend = Arc::new(RecordingBackend::default());
        let sink = EventSink::new(backend.clone(), Arc::new(MemoryStore::new()));
        sink.set_consent(Consent::Granted);
        sink.track("page_view", Map::new());

        let mode = sink.wait_for_backend(3, Duration::from_millis(1)).await;
        assert_eq!(mode, SinkMode::Fallback);
        assert_eq!(sink.queued(), 0);
        assert!(backend.events().is_empty());
    }
}
