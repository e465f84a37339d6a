//! Domain models shared by the server registry and the client dispatcher.
//!
//! ## Per-request
//!
//! - [`PageContext`]: page-scoped values handed over by a host hook. Created
//!   fresh for each render and dropped once the response is produced.
//!
//! ## Payload
//!
//! - [`FeatureConfig`]: one active feature plus the parameters its handler wrote.
//! - [`AggregateConfig`]: all features and errors of a single registry pass.
//! - [`PagePayload`]: what actually gets embedded into the page.

mod config;
mod context;
mod feature;

pub use config::*;
pub use context::*;
pub use feature::*;
