//! Client-side feature dispatcher.
//!
//! Receives [`PagePayload`]s (possibly several per page), activates the
//! matching initializer for each feature exactly once and drives remote
//! toggle round-trips. Initializers run while the dispatcher state is locked,
//! so they must not call back into the dispatcher. A panicking initializer is
//! reported as failed.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

use crate::models::{
    is_toggleable, toggle_action, FeatureConfig, FeatureError, FeatureParams, PagePayload,
};
use crate::registry::panic_message;

/// Errors from the remote-call channel.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("No remote-call handle has been provided")]
    NotConnected,

    #[error("Remote action rejected: {0}")]
    Rejected(String),

    #[error("Remote call failed: {0}")]
    Transport(String),
}

/// Channel used to invoke server-side actions (e.g. `toggle-<feature>`).
pub trait RemoteCall: Send + Sync {
    fn ajax(&self, action: &str) -> impl Future<Output = Result<String, RemoteError>> + Send;
}

/// Capability that applies one feature to the page.
pub trait Initializer: Send {
    /// Host signal this initializer has to wait for. `None` activates at once.
    fn ready_signal(&self) -> Option<&str> {
        None
    }

    fn activate(&mut self, params: &FeatureParams) -> Result<(), String>;
}

impl<F> Initializer for F
where
    F: FnMut(&FeatureParams) -> Result<(), String> + Send,
{
    fn activate(&mut self, params: &FeatureParams) -> Result<(), String> {
        self(params)
    }
}

/// Initializer that waits for a named host ready signal before activating.
pub struct Deferred<I> {
    signal: String,
    inner: I,
}

pub fn deferred<I: Initializer>(signal: impl Into<String>, inner: I) -> Deferred<I> {
    Deferred {
        signal: signal.into(),
        inner,
    }
}

impl<I: Initializer> Initializer for Deferred<I> {
    fn ready_signal(&self) -> Option<&str> {
        Some(&self.signal)
    }

    fn activate(&mut self, params: &FeatureParams) -> Result<(), String> {
        self.inner.activate(params)
    }
}

/// What a single `init` call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitReport {
    pub activated: Vec<String>,
    /// Features waiting for a host ready signal.
    pub deferred: Vec<String>,
    /// Identifiers without an initializer.
    pub unknown: Vec<String>,
    /// Features whose initializer returned an error.
    pub failed: Vec<(String, String)>,
}

/// Result of a [`FeatureDispatcher::toggle`] request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// The server flipped the state and returned the new display fragment.
    Toggled(String),
    /// A toggle for this feature is still pending; the request was ignored.
    InFlight,
    /// The feature cannot be toggled.
    NotToggleable,
}

struct Entry {
    init: Box<dyn Initializer>,
    added: bool,
}

#[derive(Default)]
struct DispatchState {
    initialized: bool,
    version: String,
    debug: bool,
    entries: HashMap<String, Entry>,
    features: Vec<FeatureConfig>,
    errors: Vec<FeatureError>,
    activated: Vec<String>,
    pending: Vec<(String, FeatureConfig)>,
    fired: HashSet<String>,
    in_flight: HashSet<String>,
    toggle_display: HashMap<String, String>,
}

pub struct FeatureDispatcher<R> {
    state: Mutex<DispatchState>,
    remote: Mutex<Option<Arc<R>>>,
}

impl<R> Default for FeatureDispatcher<R> {
    fn default() -> Self {
        Self {
            state: Mutex::new(DispatchState::default()),
            remote: Mutex::new(None),
        }
    }
}

impl<R: RemoteCall> FeatureDispatcher<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a feature identifier to its initializer.
    pub fn with_initializer<I>(self, feature: impl Into<String>, init: I) -> Self
    where
        I: Initializer + 'static,
    {
        self.lock().entries.insert(
            feature.into(),
            Entry {
                init: Box::new(init),
                added: false,
            },
        );
        self
    }

    /// Receive a payload. The first call adopts version, debug flag and the
    /// remote handle; later calls only merge new features in. Features that
    /// were activated before are never activated again.
    pub fn init(&self, payload: PagePayload, remote: Option<R>) -> InitReport {
        if let Some(remote) = remote {
            let mut slot = self.remote.lock().expect("dispatcher lock poisoned");
            if slot.is_none() {
                *slot = Some(Arc::new(remote));
            }
        }

        let mut state = self.lock();
        if !state.initialized {
            state.initialized = true;
            state.version = payload.version.clone();
            state.debug = payload.debug;
            if state.debug {
                tracing::info!(version = %state.version, "Dispatcher initialized");
            }
        } else if state.version.is_empty() && !payload.version.is_empty() {
            state.version = payload.version.clone();
        }

        for error in &payload.config.errors {
            if state.debug {
                tracing::warn!(msg = %error.msg, details = %error.details, "Server reported feature error");
            }
            state.errors.push(error.clone());
        }

        let mut report = InitReport::default();
        for feature in payload.config.features {
            if state.features.iter().any(|f| f.feature == feature.feature) {
                continue;
            }
            state.features.push(feature.clone());

            let id = feature.feature.clone();
            let signal = match state.entries.get(&id) {
                None => {
                    if state.debug {
                        tracing::warn!(feature = %id, "No initializer for feature");
                    }
                    report.unknown.push(id);
                    continue;
                }
                Some(entry) if entry.added => continue,
                Some(entry) => entry.init.ready_signal().map(str::to_string),
            };

            match signal {
                Some(signal) if !state.fired.contains(&signal) => {
                    if state.debug {
                        tracing::debug!(feature = %id, signal = %signal, "Deferring feature");
                    }
                    state.pending.push((signal, feature));
                    report.deferred.push(id);
                }
                _ => state.activate(feature, &mut report),
            }
        }
        report
    }

    /// The host raised `signal`. Runs every activation that waited for it;
    /// later features waiting on the same signal activate immediately.
    pub fn signal_ready(&self, signal: &str) -> InitReport {
        let mut state = self.lock();
        state.fired.insert(signal.to_string());

        let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut state.pending)
            .into_iter()
            .partition(|(s, _)| s == signal);
        state.pending = waiting;

        let mut report = InitReport::default();
        for (_, feature) in ready {
            state.activate(feature, &mut report);
        }
        report
    }

    /// Ask the server to flip a feature's toggle state.
    ///
    /// Requests for a feature that already has a toggle in flight are
    /// ignored. Failures are returned as-is; they are not retried. Dropping
    /// the returned future clears the in-flight flag.
    pub async fn toggle(&self, feature: &str) -> Result<ToggleOutcome, RemoteError> {
        if !is_toggleable(feature) {
            if self.debug() {
                tracing::debug!(feature, "Ignoring toggle of unrecognized feature");
            }
            return Ok(ToggleOutcome::NotToggleable);
        }

        let remote = self
            .remote
            .lock()
            .expect("dispatcher lock poisoned")
            .clone()
            .ok_or(RemoteError::NotConnected)?;

        let Some(guard) = self.begin_toggle(feature) else {
            return Ok(ToggleOutcome::InFlight);
        };

        let result = remote.ajax(&toggle_action(feature)).await;
        drop(guard);
        self.finish_toggle(feature, result)
    }

    fn begin_toggle(&self, feature: &str) -> Option<InFlightGuard<'_>> {
        if !self.lock().in_flight.insert(feature.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            state: &self.state,
            feature: feature.to_string(),
        })
    }

    fn finish_toggle(
        &self,
        feature: &str,
        result: Result<String, RemoteError>,
    ) -> Result<ToggleOutcome, RemoteError> {
        let mut state = self.lock();
        match result {
            Ok(display) => {
                if state.debug {
                    tracing::info!(feature, "Toggled feature");
                }
                state
                    .toggle_display
                    .insert(feature.to_string(), display.clone());
                Ok(ToggleOutcome::Toggled(display))
            }
            Err(e) => {
                tracing::error!(feature, error = %e, "Failed to toggle feature");
                Err(e)
            }
        }
    }

    pub fn is_toggling(&self, feature: &str) -> bool {
        self.lock().in_flight.contains(feature)
    }

    /// Last display fragment returned for a feature's toggle.
    pub fn toggle_display(&self, feature: &str) -> Option<String> {
        self.lock().toggle_display.get(feature).cloned()
    }

    pub fn is_active(&self, feature: &str) -> bool {
        self.lock().activated.iter().any(|f| f == feature)
    }

    /// Activated features in activation order.
    pub fn activated(&self) -> Vec<String> {
        self.lock().activated.clone()
    }

    /// All features received so far, without duplicates.
    pub fn features(&self) -> Vec<FeatureConfig> {
        self.lock().features.clone()
    }

    pub fn errors(&self) -> Vec<FeatureError> {
        self.lock().errors.clone()
    }

    pub fn debug(&self) -> bool {
        self.lock().debug
    }

    pub fn version(&self) -> String {
        self.lock().version.clone()
    }

    fn lock(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().expect("dispatcher lock poisoned")
    }
}

/// Clears a feature's in-flight flag when the toggle completes or its future
/// is dropped.
struct InFlightGuard<'a> {
    state: &'a Mutex<DispatchState>,
    feature: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.in_flight.remove(&self.feature);
        }
    }
}

impl DispatchState {
    fn activate(&mut self, feature: FeatureConfig, report: &mut InitReport) {
        let Some(entry) = self.entries.get_mut(&feature.feature) else {
            return;
        };
        if entry.added {
            return;
        }
        entry.added = true;

        if self.debug {
            tracing::info!(feature = %feature.feature, "Adding feature");
        }
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| entry.init.activate(&feature.params)))
            .unwrap_or_else(|payload| {
                Err(format!("initializer panicked: {}", panic_message(payload.as_ref())))
            });
        match outcome {
            Ok(()) => {
                self.activated.push(feature.feature.clone());
                report.activated.push(feature.feature);
            }
            Err(e) => {
                tracing::error!(feature = %feature.feature, error = %e, "Feature initializer failed");
                report.failed.push((feature.feature, e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AggregateConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct FakeRemote {
        calls: Arc<AtomicUsize>,
        fail: bool,
        delay: Option<Duration>,
    }

    impl RemoteCall for FakeRemote {
        fn ajax(&self, action: &str) -> impl Future<Output = Result<String, RemoteError>> + Send {
            let calls = self.calls.clone();
            let fail = self.fail;
            let delay = self.delay.unwrap_or(Duration::from_millis(20));
            let action = action.to_string();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                if fail {
                    Err(RemoteError::Rejected("Insufficient rights.".into()))
                } else {
                    Ok(format!("<i>{action}</i>"))
                }
            }
        }
    }

    fn payload(features: &[&str]) -> PagePayload {
        PagePayload::new(
            AggregateConfig {
                features: features
                    .iter()
                    .map(|f| FeatureConfig::new(*f, FeatureParams::new()))
                    .collect(),
                errors: vec![],
            },
            "0.3.0",
            true,
        )
    }

    fn counting(counter: &Arc<AtomicUsize>) -> impl Initializer + 'static {
        let counter = counter.clone();
        move |_: &FeatureParams| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<(), String>(())
        }
    }

    #[test]
    fn overlapping_inits_activate_each_feature_once() {
        let reveal = Arc::new(AtomicUsize::new(0));
        let annotations = Arc::new(AtomicUsize::new(0));
        let dispatcher = FeatureDispatcher::<FakeRemote>::new()
            .with_initializer("reveal-hidden", counting(&reveal))
            .with_initializer("data-entry-annotations", counting(&annotations));

        let first = dispatcher.init(payload(&["reveal-hidden"]), None);
        let second = dispatcher.init(payload(&["reveal-hidden", "data-entry-annotations"]), None);
        dispatcher.init(payload(&["data-entry-annotations"]), None);

        assert_eq!(first.activated, vec!["reveal-hidden"]);
        assert_eq!(second.activated, vec!["data-entry-annotations"]);
        assert_eq!(reveal.load(Ordering::SeqCst), 1);
        assert_eq!(annotations.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.features().len(), 2);
    }

    #[test]
    fn unknown_features_are_reported() {
        let dispatcher = FeatureDispatcher::<FakeRemote>::new();
        let report = dispatcher.init(payload(&["not-a-feature"]), None);

        assert_eq!(report.unknown, vec!["not-a-feature"]);
        assert!(dispatcher.activated().is_empty());
    }

    #[test]
    fn later_inits_keep_first_version_and_debug() {
        let dispatcher = FeatureDispatcher::<FakeRemote>::new();
        dispatcher.init(payload(&[]), None);
        dispatcher.init(PagePayload::new(AggregateConfig::default(), "9.9.9", false), None);

        assert_eq!(dispatcher.version(), "0.3.0");
        assert!(dispatcher.debug());
    }

    #[test]
    fn deferred_features_wait_for_ready_signal() {
        let counter = Arc::new(AtomicUsize::new(0));
        let dispatcher = FeatureDispatcher::<FakeRemote>::new()
            .with_initializer("query-record-rhp", deferred("dom-ready", counting(&counter)));

        let report = dispatcher.init(payload(&["query-record-rhp"]), None);
        assert_eq!(report.deferred, vec!["query-record-rhp"]);
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        let report = dispatcher.signal_ready("dom-ready");
        assert_eq!(report.activated, vec!["query-record-rhp"]);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        dispatcher.signal_ready("dom-ready");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn features_arriving_after_signal_activate_immediately() {
        let counter = Arc::new(AtomicUsize::new(0));
        let dispatcher = FeatureDispatcher::<FakeRemote>::new()
            .with_initializer("reveal-hidden", deferred("dom-ready", counting(&counter)));

        dispatcher.signal_ready("dom-ready");
        let report = dispatcher.init(payload(&["reveal-hidden"]), None);

        assert_eq!(report.activated, vec!["reveal-hidden"]);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_initializer_is_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let dispatcher = FeatureDispatcher::<FakeRemote>::new().with_initializer(
            "reveal-hidden",
            move |_: &FeatureParams| {
                seen.fetch_add(1, Ordering::SeqCst);
                Err::<(), String>("auto-fill button missing".to_string())
            },
        );

        let report = dispatcher.init(payload(&["reveal-hidden"]), None);
        dispatcher.init(payload(&["reveal-hidden"]), None);

        assert_eq!(report.failed.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!dispatcher.is_active("reveal-hidden"));
    }

    #[tokio::test]
    async fn toggle_ignores_requests_while_in_flight() {
        let remote = FakeRemote::default();
        let calls = remote.calls.clone();
        let dispatcher = FeatureDispatcher::new();
        dispatcher.init(payload(&[]), Some(remote));

        let (first, second) = tokio::join!(
            dispatcher.toggle("designer-enhancements"),
            dispatcher.toggle("designer-enhancements")
        );

        assert_eq!(
            first.unwrap(),
            ToggleOutcome::Toggled("<i>toggle-designer-enhancements</i>".into())
        );
        assert_eq!(second.unwrap(), ToggleOutcome::InFlight);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!dispatcher.is_toggling("designer-enhancements"));
        assert_eq!(
            dispatcher.toggle_display("designer-enhancements").as_deref(),
            Some("<i>toggle-designer-enhancements</i>")
        );
    }

    #[tokio::test]
    async fn toggle_failure_clears_in_flight_flag() {
        let remote = FakeRemote {
            fail: true,
            ..Default::default()
        };
        let dispatcher = FeatureDispatcher::new();
        dispatcher.init(payload(&[]), Some(remote));

        let err = dispatcher.toggle("survey-annotations").await.unwrap_err();
        assert_eq!(err, RemoteError::Rejected("Insufficient rights.".into()));
        assert!(!dispatcher.is_toggling("survey-annotations"));
        assert!(dispatcher.toggle_display("survey-annotations").is_none());
    }

    #[tokio::test]
    async fn cancelled_toggle_clears_in_flight_flag() {
        let remote = FakeRemote {
            delay: Some(Duration::from_millis(200)),
            ..Default::default()
        };
        let calls = remote.calls.clone();
        let dispatcher = FeatureDispatcher::new();
        dispatcher.init(payload(&[]), Some(remote));

        let timed_out = tokio::time::timeout(
            Duration::from_millis(10),
            dispatcher.toggle("designer-enhancements"),
        )
        .await;
        assert!(timed_out.is_err());
        assert!(!dispatcher.is_toggling("designer-enhancements"));

        let next = dispatcher.toggle("designer-enhancements").await.unwrap();
        assert_eq!(
            next,
            ToggleOutcome::Toggled("<i>toggle-designer-enhancements</i>".into())
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_initializer_is_reported_as_failed() {
        let counter = Arc::new(AtomicUsize::new(0));
        let dispatcher = FeatureDispatcher::<FakeRemote>::new()
            .with_initializer("reveal-hidden", |_: &FeatureParams| -> Result<(), String> {
                panic!("dom missing")
            })
            .with_initializer("data-entry-annotations", counting(&counter));

        let report = dispatcher.init(payload(&["reveal-hidden", "data-entry-annotations"]), None);

        assert_eq!(report.activated, vec!["data-entry-annotations"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "reveal-hidden");
        assert!(report.failed[0].1.contains("dom missing"));
        assert_eq!(dispatcher.activated(), vec!["data-entry-annotations"]);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn toggle_of_unrecognized_feature_is_ignored() {
        let remote = FakeRemote::default();
        let calls = remote.calls.clone();
        let dispatcher = FeatureDispatcher::new();
        dispatcher.init(payload(&[]), Some(remote));

        let outcome = dispatcher.toggle("reveal-hidden").await.unwrap();
        assert_eq!(outcome, ToggleOutcome::NotToggleable);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn toggle_without_remote_is_an_error() {
        let dispatcher = FeatureDispatcher::<FakeRemote>::new();
        let err = dispatcher.toggle("designer-enhancements").await.unwrap_err();
        assert_eq!(err, RemoteError::NotConnected);
    }
}
