//! Travel Window Recommender
//!
//! Coordinates a weather-statistics backend to recommend travel periods:
//! - Cache-first lookups
//! - Parallel rain volume and temperature collection
//! - Parallel analysis of the collected history
//! - Stage-level status reporting

pub mod config;
pub mod gateway;
pub mod pipeline;
pub mod server;
pub mod utils;

// Re-exports for convenience
pub use config::{AppConfig, CacheMode};
pub use gateway::Gateways;
pub use pipeline::{PipelineController, PipelineError, PipelineStatus, Query, Recommendation};
