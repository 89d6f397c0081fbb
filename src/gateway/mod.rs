//! Gateway Interfaces
//!
//! Capability contracts the pipeline depends on. Each gateway is one opaque
//! request/response call; the request structs mirror the backend wire fields.

mod http;
mod memory;

pub use http::{BackendClient, HttpAnalyzer, HttpCache, HttpCollector, HttpRecommender, HttpTestRunner};
pub use memory::MemoryCache;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::config::{AppConfig, CacheMode};
use crate::pipeline::error::GatewayResult;
use crate::pipeline::types::{Analysis, Metric, ProbabilityProfile, RawSeries, Recommendation, ScoreProfile};

/// Cache lookup key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheRequest {
    pub place: String,
    pub this_year: i32,
    pub past_span: u32,
    pub day_span: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectRequest {
    pub place: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub this_year: i32,
    pub past_span: u32,
}

/// Input to one metric's analyzer
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzeRequest {
    pub place: String,
    pub this_year: i32,
    pub past_span: u32,
    pub day_span: i32,
    pub series: RawSeries,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendRequest {
    pub place: String,
    pub this_year: i32,
    pub past_span: u32,
    pub day_span: i32,
    pub rain_volume_probabilities: Vec<ProbabilityProfile>,
    pub temperature_probabilities: Vec<ProbabilityProfile>,
    pub rain_volume_scores: Vec<ScoreProfile>,
    pub temperature_scores: Vec<ScoreProfile>,
}

/// The whole query collapsed into one call, for the alternate test entrypoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestRunRequest {
    pub place: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub this_year: i32,
    pub past_span: u32,
    pub day_span: i32,
}

#[async_trait]
pub trait CacheGateway: Send + Sync {
    /// `Ok(None)` on a miss
    async fn lookup(&self, request: &CacheRequest) -> GatewayResult<Option<Recommendation>>;

    /// Records a freshly computed recommendation. The remote cache is filled
    /// by the backend itself, so the default does nothing.
    async fn store(&self, _request: &CacheRequest, _recommendation: &Recommendation) -> GatewayResult<()> {
        Ok(())
    }
}

#[async_trait]
pub trait CollectorGateway: Send + Sync {
    fn metric(&self) -> Metric;
    async fn collect(&self, request: &CollectRequest) -> GatewayResult<RawSeries>;
}

#[async_trait]
pub trait AnalyzerGateway: Send + Sync {
    fn metric(&self) -> Metric;
    async fn analyze(&self, request: &AnalyzeRequest) -> GatewayResult<Analysis>;
}

#[async_trait]
pub trait RecommenderGateway: Send + Sync {
    async fn recommend(&self, request: &RecommendRequest) -> GatewayResult<Recommendation>;
}

#[async_trait]
pub trait TestGateway: Send + Sync {
    async fn run_test(&self, request: &TestRunRequest) -> GatewayResult<Recommendation>;
}

/// Everything a controller needs to talk to the backend
#[derive(Clone)]
pub struct Gateways {
    pub cache: Arc<dyn CacheGateway>,
    pub rain_collector: Arc<dyn CollectorGateway>,
    pub temperature_collector: Arc<dyn CollectorGateway>,
    pub rain_analyzer: Arc<dyn AnalyzerGateway>,
    pub temperature_analyzer: Arc<dyn AnalyzerGateway>,
    pub recommender: Arc<dyn RecommenderGateway>,
    pub test: Option<Arc<dyn TestGateway>>,
}

impl Gateways {
    /// HTTP gateways for every endpoint, sharing one client
    pub fn http(client: BackendClient) -> Self {
        Self {
            cache: Arc::new(HttpCache::new(client.clone())),
            rain_collector: Arc::new(HttpCollector::new(client.clone(), Metric::RainVolume)),
            temperature_collector: Arc::new(HttpCollector::new(client.clone(), Metric::Temperature)),
            rain_analyzer: Arc::new(HttpAnalyzer::new(client.clone(), Metric::RainVolume)),
            temperature_analyzer: Arc::new(HttpAnalyzer::new(client.clone(), Metric::Temperature)),
            recommender: Arc::new(HttpRecommender::new(client.clone())),
            test: Some(Arc::new(HttpTestRunner::new(client))),
        }
    }

    /// HTTP gateways for `config.api_url`, with the cache picked by `config.cache`
    pub fn from_config(config: &AppConfig) -> GatewayResult<Self> {
        let gateways = Self::http(BackendClient::new(&config.api_url, config.request_timeout)?);
        Ok(match config.cache {
            CacheMode::Http => gateways,
            CacheMode::Memory => gateways.with_cache(Arc::new(MemoryCache::new())),
        })
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheGateway>) -> Self {
        self.cache = cache;
        self
    }
}
