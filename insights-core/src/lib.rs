//! Host-independent core of admin-insights.
//!
//! # Core Concepts
//!
//! - [`registry::FeatureRegistry`]: maps feature identifiers to setup handlers and
//!   assembles the per-render [`models::AggregateConfig`].
//! - [`toggle::ToggleStore`]: per-project on/off flag for each toggleable feature.
//! - [`dispatcher::FeatureDispatcher`]: the receiving side of the page payload.
//!   Activates each feature's initializer exactly once and drives remote toggles.

pub mod dispatcher;
pub mod models;
pub mod registry;
pub mod toggle;
