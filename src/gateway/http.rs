//! HTTP Gateways
//!
//! reqwest-backed clients for the recommendation backend. All endpoints are
//! JSON POSTs relative to one base URL.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{
    AnalyzeRequest, AnalyzerGateway, CacheGateway, CacheRequest, CollectRequest, CollectorGateway,
    RecommendRequest, RecommenderGateway, TestGateway, TestRunRequest,
};
use crate::pipeline::error::{GatewayError, GatewayResult};
use crate::pipeline::types::{Analysis, Metric, RawSeries, Recommendation};

/// Shared HTTP client bound to the backend base URL
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POSTs `body` and returns the decoded JSON, `Value::Null` for an empty body.
    pub async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> GatewayResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);

        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

fn take_field<T: DeserializeOwned>(payload: &mut Value, field: &str) -> GatewayResult<T> {
    match payload.get_mut(field).map(Value::take) {
        Some(Value::Null) | None => Err(GatewayError::Decode(format!("missing field '{}'", field))),
        Some(value) => Ok(serde_json::from_value(value)?),
    }
}

fn is_empty_payload(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// `/recommend/cache`
pub struct HttpCache {
    client: BackendClient,
}

impl HttpCache {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CacheGateway for HttpCache {
    async fn lookup(&self, request: &CacheRequest) -> GatewayResult<Option<Recommendation>> {
        let payload = self.client.post_json("/recommend/cache", request).await?;
        if is_empty_payload(&payload) {
            return Ok(None);
        }
        let recommendation: Recommendation = serde_json::from_value(payload)?;
        Ok(Some(recommendation).filter(|r| !r.is_empty()))
    }
}

/// `/rainvolumecollector` or `/temperaturecollector`
pub struct HttpCollector {
    client: BackendClient,
    metric: Metric,
}

impl HttpCollector {
    pub fn new(client: BackendClient, metric: Metric) -> Self {
        Self { client, metric }
    }
}

#[async_trait]
impl CollectorGateway for HttpCollector {
    fn metric(&self) -> Metric {
        self.metric
    }

    async fn collect(&self, request: &CollectRequest) -> GatewayResult<RawSeries> {
        let mut payload = self.client.post_json(self.metric.collector_path(), request).await?;
        if is_empty_payload(&payload) {
            return Err(GatewayError::EmptyPayload);
        }
        take_field(&mut payload, self.metric.series_field())
    }
}

/// `/rainvolumeanalyzer` or `/temperatureanalyzer`
pub struct HttpAnalyzer {
    client: BackendClient,
    metric: Metric,
}

impl HttpAnalyzer {
    pub fn new(client: BackendClient, metric: Metric) -> Self {
        Self { client, metric }
    }
}

#[async_trait]
impl AnalyzerGateway for HttpAnalyzer {
    fn metric(&self) -> Metric {
        self.metric
    }

    async fn analyze(&self, request: &AnalyzeRequest) -> GatewayResult<Analysis> {
        let mut body = json!({
            "place": request.place,
            "this_year": request.this_year,
            "past_span": request.past_span,
            "day_span": request.day_span,
        });
        body[self.metric.series_field()] = serde_json::to_value(&request.series)?;

        let mut payload = self.client.post_json(self.metric.analyzer_path(), &body).await?;
        if is_empty_payload(&payload) {
            return Err(GatewayError::EmptyPayload);
        }
        Ok(Analysis {
            probabilities: take_field(&mut payload, self.metric.probabilities_field())?,
            scores: take_field(&mut payload, self.metric.scores_field())?,
        })
    }
}

/// `/recommend`
pub struct HttpRecommender {
    client: BackendClient,
}

impl HttpRecommender {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RecommenderGateway for HttpRecommender {
    async fn recommend(&self, request: &RecommendRequest) -> GatewayResult<Recommendation> {
        let payload = self.client.post_json("/recommend", request).await?;
        if is_empty_payload(&payload) {
            return Err(GatewayError::EmptyPayload);
        }
        Ok(serde_json::from_value(payload)?)
    }
}

/// `/test`
pub struct HttpTestRunner {
    client: BackendClient,
}

impl HttpTestRunner {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TestGateway for HttpTestRunner {
    async fn run_test(&self, request: &TestRunRequest) -> GatewayResult<Recommendation> {
        let payload = self.client.post_json("/test", request).await?;
        if is_empty_payload(&payload) {
            return Err(GatewayError::EmptyPayload);
        }
        Ok(serde_json::from_value(payload)?)
    }
}
