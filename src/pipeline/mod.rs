//! Recommendation Pipeline
//!
//! Turns one travel query into a cache check, parallel collection, parallel
//! analysis and a final recommendation request, reporting every stage
//! transition along the way.

pub mod controller;
pub mod error;
pub mod status;
pub mod types;

pub use controller::{PipelineController, RunRecord};
pub use error::{GatewayError, GatewayResult, PipelineError, PipelineResult, Stage};
pub use status::{BroadcastReporter, ChannelReporter, PipelineStatus, StatusEvent, StatusReporter, TracingReporter};
pub use types::{
    is_valid_day_span, Analysis, DatePeriod, Metric, Place, ProbabilityProfile, Query, RawSeries, Recommendation,
    RecommendationInput, ScoreProfile, MAX_DAY_SPAN, MIN_DAY_SPAN,
};
