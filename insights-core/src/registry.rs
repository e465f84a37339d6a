//! Feature registry: identifier → setup handler, evaluated once per render.
//!
//! Each requested feature is run in isolation. A handler can include its
//! feature (`Ok(true)`), leave it out (`Ok(false)`), or fail. Failures and
//! unknown identifiers are recorded in the aggregate `errors` list and never
//! stop the remaining features from being processed.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;

use crate::models::{AggregateConfig, FeatureConfig, FeatureError, FeatureParams, PageContext};

/// Errors a feature handler can report while setting up its parameters.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Missing context value: {0}")]
    MissingContext(&'static str),

    #[error("Invalid parameter '{name}': {value}")]
    InvalidParameter { name: String, value: String },

    #[error("Metadata unavailable: {0}")]
    Metadata(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors raised while building a registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Feature '{0}' is already registered")]
    Duplicate(String),

    #[error("Feature identifier must not be empty")]
    EmptyIdentifier,
}

/// Setup function for one feature.
///
/// `E` is the environment shared by all handlers of a registry (storage,
/// host settings). Handlers write into `params` and return whether the
/// feature should be included.
pub type Handler<E> =
    Arc<dyn Fn(&E, &PageContext, &mut FeatureParams) -> Result<bool, HandlerError> + Send + Sync>;

/// Per-feature result of a registry pass.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureOutcome {
    Included(FeatureConfig),
    Skipped(String),
    Failed(FeatureError),
}

/// Static table of feature handlers, built once at startup.
pub struct FeatureRegistry<E> {
    order: Vec<String>,
    handlers: HashMap<String, Handler<E>>,
}

impl<E> Default for FeatureRegistry<E> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            handlers: HashMap::new(),
        }
    }
}

impl<E> Clone for FeatureRegistry<E> {
    fn clone(&self) -> Self {
        Self {
            order: self.order.clone(),
            handlers: self.handlers.clone(),
        }
    }
}

impl<E> std::fmt::Debug for FeatureRegistry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureRegistry")
            .field("features", &self.order)
            .finish()
    }
}

impl<E> FeatureRegistry<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `id`. Identifiers are unique.
    pub fn register<F>(&mut self, id: impl Into<String>, handler: F) -> Result<(), RegistryError>
    where
        F: Fn(&E, &PageContext, &mut FeatureParams) -> Result<bool, HandlerError>
            + Send
            + Sync
            + 'static,
    {
        let id = id.into();
        if id.is_empty() {
            return Err(RegistryError::EmptyIdentifier);
        }
        if self.handlers.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        self.order.push(id.clone());
        self.handlers.insert(id, Arc::new(handler));
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<F>(mut self, id: impl Into<String>, handler: F) -> Result<Self, RegistryError>
    where
        F: Fn(&E, &PageContext, &mut FeatureParams) -> Result<bool, HandlerError>
            + Send
            + Sync
            + 'static,
    {
        self.register(id, handler)?;
        Ok(self)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.handlers.contains_key(id)
    }

    /// Registered identifiers in registration order.
    pub fn features(&self) -> &[String] {
        &self.order
    }

    /// Run every requested feature and return one outcome per identifier,
    /// in request order.
    pub fn run<S: AsRef<str>>(
        &self,
        requested: &[S],
        ctx: &PageContext,
        env: &E,
    ) -> Vec<(String, FeatureOutcome)> {
        requested
            .iter()
            .map(|id| {
                let id = id.as_ref();
                (id.to_string(), self.run_one(id, ctx, env))
            })
            .collect()
    }

    /// Run the requested features and fold the outcomes into one config.
    pub fn assemble<S: AsRef<str>>(
        &self,
        requested: &[S],
        ctx: &PageContext,
        env: &E,
    ) -> AggregateConfig {
        let mut config = AggregateConfig::default();
        for (_, outcome) in self.run(requested, ctx, env) {
            match outcome {
                FeatureOutcome::Included(feature) => config.features.push(feature),
                FeatureOutcome::Skipped(_) => {}
                FeatureOutcome::Failed(error) => config.errors.push(error),
            }
        }
        config
    }

    fn run_one(&self, id: &str, ctx: &PageContext, env: &E) -> FeatureOutcome {
        let Some(handler) = self.handlers.get(id) else {
            tracing::warn!(feature = id, "Requested feature has no handler");
            return FeatureOutcome::Failed(FeatureError::unknown(id));
        };

        let mut params = FeatureParams::new();
        let result = panic::catch_unwind(AssertUnwindSafe(|| handler(env, ctx, &mut params)));

        match result {
            Ok(Ok(true)) => {
                tracing::debug!(feature = id, params = params.len(), "Feature included");
                FeatureOutcome::Included(FeatureConfig::new(id, params))
            }
            Ok(Ok(false)) => {
                tracing::debug!(feature = id, "Feature has nothing to contribute");
                FeatureOutcome::Skipped(id.to_string())
            }
            Ok(Err(e)) => {
                tracing::warn!(feature = id, error = %e, "Feature setup failed");
                FeatureOutcome::Failed(FeatureError::failed(id, e.to_string()))
            }
            Err(payload) => {
                let details = panic_message(payload.as_ref());
                tracing::error!(feature = id, details = %details, "Feature handler panicked");
                FeatureOutcome::Failed(FeatureError::failed(id, details))
            }
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> FeatureRegistry<()> {
        FeatureRegistry::new()
            .with("reveal-hidden", |_, ctx, params| {
                params.insert("isSurvey".into(), json!(ctx.is_survey));
                Ok(true)
            })
            .unwrap()
            .with("data-entry-annotations", |_, _, _| Ok(false))
            .unwrap()
            .with("designer-enhancements", |_, _, _| {
                Err(HandlerError::MissingContext("form"))
            })
            .unwrap()
    }

    #[test]
    fn unknown_features_are_reported_and_skipped() {
        let config = registry().assemble(&["not-a-feature"], &PageContext::default(), &());

        assert!(config.features.is_empty());
        assert_eq!(config.errors.len(), 1);
        assert!(config.errors[0].msg.contains("not-a-feature"));
    }

    #[test]
    fn failing_handler_does_not_stop_later_features() {
        let config = registry().assemble(
            &["designer-enhancements", "bogus", "reveal-hidden"],
            &PageContext::default(),
            &(),
        );

        assert_eq!(config.feature_ids(), vec!["reveal-hidden"]);
        assert_eq!(config.errors.len(), 2);
        assert_eq!(
            config.errors[0].msg,
            "Failed to add feature 'designer-enhancements'."
        );
        assert_eq!(config.errors[0].details, "Missing context value: form");
        assert!(config.errors[1].msg.contains("bogus"));
    }

    #[test]
    fn skipped_features_leave_no_trace() {
        let config = registry().assemble(
            &["data-entry-annotations", "reveal-hidden"],
            &PageContext::default().survey(),
            &(),
        );

        assert_eq!(config.feature_ids(), vec!["reveal-hidden"]);
        assert!(config.errors.is_empty());
        assert_eq!(
            config.feature("reveal-hidden").unwrap().param("isSurvey"),
            Some(&json!(true))
        );
    }

    #[test]
    fn features_keep_request_order() {
        let registry = FeatureRegistry::<()>::new()
            .with("a", |_, _, _| Ok(true))
            .unwrap()
            .with("b", |_, _, _| Ok(true))
            .unwrap();

        let config = registry.assemble(&["b", "a"], &PageContext::default(), &());
        assert_eq!(config.feature_ids(), vec!["b", "a"]);
    }

    #[test]
    fn panicking_handler_is_recorded_as_failure() {
        let registry = FeatureRegistry::<()>::new()
            .with("boom", |_, _, _| panic!("metadata exploded"))
            .unwrap()
            .with("fine", |_, _, _| Ok(true))
            .unwrap();

        let config = registry.assemble(&["boom", "fine"], &PageContext::default(), &());
        assert_eq!(config.feature_ids(), vec!["fine"]);
        assert_eq!(config.errors[0].details, "metadata exploded");
    }

    #[test]
    fn run_reports_outcome_per_request() {
        let outcomes = registry().run(
            &["reveal-hidden", "data-entry-annotations", "nope"],
            &PageContext::default(),
            &(),
        );

        assert!(matches!(outcomes[0].1, FeatureOutcome::Included(_)));
        assert!(matches!(outcomes[1].1, FeatureOutcome::Skipped(_)));
        assert!(matches!(outcomes[2].1, FeatureOutcome::Failed(_)));
    }

    #[test]
    fn handlers_receive_the_environment() {
        let registry = FeatureRegistry::<String>::new()
            .with("echo", |env, _, params| {
                params.insert("env".into(), json!(env));
                Ok(true)
            })
            .unwrap();

        let config = registry.assemble(&["echo"], &PageContext::default(), &"host".to_string());
        assert_eq!(config.features[0].param("env"), Some(&json!("host")));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = registry();
        let err = registry
            .register("reveal-hidden", |_, _, _| Ok(true))
            .unwrap_err();
        assert_eq!(err, RegistryError::Duplicate("reveal-hidden".into()));
        assert_eq!(registry.features().len(), 3);
    }
}
