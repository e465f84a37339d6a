//! Domain models for admin-insights.
//!
//! # Core Concepts
//!
//! ## Shared with the client
//!
//! Re-exported from `insights_core`: [`PageContext`], [`FeatureConfig`],
//! [`AggregateConfig`], [`PagePayload`] and the well-known feature identifiers.
//!
//! ## Host hooks
//!
//! - [`HostUser`]: who the page is rendered for. Privileges come from the host.
//! - [`DataEntryFormHook`], [`SurveyPageHook`], [`EveryPageTopHook`],
//!   [`LinkCheckHook`], [`AjaxRequest`]: one input per host page event.
//! - [`PageOutput`]: what a hook contributes to the page.
//!
//! ## Host metadata
//!
//! - [`ProjectInfo`] and [`FieldMetadata`]: the slice of the host's project
//!   metadata the built-in features read. Pushed by the host, replaced wholesale.

mod hook;
mod metadata;

pub use hook::*;
pub use insights_core::models::*;
pub use metadata::*;
