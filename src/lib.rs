pub mod api;
pub mod client;
pub mod config;
pub mod db;
pub mod features;
pub mod hooks;
pub mod models;

pub use insights_core::{dispatcher, registry, toggle};
