//! Pipeline Controller
//!
//! Owns one query's lifecycle: validation, cache check, parallel collection,
//! parallel analysis and the final recommendation request.

use chrono::Datelike;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::error::{GatewayResult, PipelineError, PipelineResult};
use super::status::{BroadcastReporter, PipelineStatus, RunStatus, StatusEvent, StatusReporter, TracingReporter};
use super::types::{is_valid_day_span, Analysis, Metric, Place, Query, RawSeries, Recommendation};
use crate::gateway::{AnalyzeRequest, CacheRequest, CollectRequest, Gateways, RecommendRequest, TestRunRequest};

/// Owned result slot of the most recent successful run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub query: Query,
    pub recommendation: Recommendation,
}

pub struct PipelineController {
    gateways: Gateways,
    past_span: u32,
    /// Single permit; a run must hold it for its whole lifetime
    run_token: Arc<Semaphore>,
    broadcast: Arc<BroadcastReporter>,
    reporters: Vec<Arc<dyn StatusReporter>>,
    status: Arc<watch::Sender<PipelineStatus>>,
    last_result: Mutex<Option<RunRecord>>,
}

impl PipelineController {
    pub fn new(gateways: Gateways, past_span: u32) -> Self {
        let broadcast = Arc::new(BroadcastReporter::default());
        let (status, _) = watch::channel(PipelineStatus::Idle);
        Self {
            gateways,
            past_span,
            run_token: Arc::new(Semaphore::new(1)),
            reporters: vec![broadcast.clone(), Arc::new(TracingReporter)],
            broadcast,
            status: Arc::new(status),
            last_result: Mutex::new(None),
        }
    }

    /// Replaces the broadcast channel behind `subscribe()`
    pub fn with_status_buffer(mut self, capacity: usize) -> Self {
        let broadcast = Arc::new(BroadcastReporter::new(capacity));
        self.reporters[0] = broadcast.clone();
        self.broadcast = broadcast;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn StatusReporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    pub fn past_span(&self) -> u32 {
        self.past_span
    }

    /// Builds a query for the current year with this instance's look-back span
    pub fn query_for(&self, place: Option<Place>, day_span: i32) -> Query {
        Query::new(place, chrono::Utc::now().year(), self.past_span, day_span)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.broadcast.subscribe()
    }

    /// Status of the latest run, `Idle` before the first one
    pub fn status(&self) -> PipelineStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<PipelineStatus> {
        self.status.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.run_token.available_permits() == 0
    }

    pub async fn last_result(&self) -> Option<RunRecord> {
        self.last_result.lock().await.clone()
    }

    pub async fn run(&self, query: Query) -> PipelineResult<Recommendation> {
        self.run_with_cancel(query, CancellationToken::new()).await
    }

    #[tracing::instrument(skip(self, query, cancel), fields(place = query.place_name().unwrap_or("<none>"), day_span = query.day_span))]
    pub async fn run_with_cancel(&self, query: Query, cancel: CancellationToken) -> PipelineResult<Recommendation> {
        let _permit = self.run_token.try_acquire().map_err(|_| {
            warn!("Rejecting overlapping pipeline run");
            PipelineError::Busy
        })?;

        let mut status = self.start_status();
        let outcome = self.execute(&query, &mut status, &cancel).await;
        self.finish(query, outcome, &mut status).await
    }

    /// Alternate entrypoint for the backend's `/test` endpoint.
    ///
    /// Validates like `run`, then makes exactly one call to the test gateway.
    /// The cache is not consulted.
    #[tracing::instrument(skip(self, query), fields(place = query.place_name().unwrap_or("<none>"), day_span = query.day_span))]
    pub async fn run_test(&self, query: Query) -> PipelineResult<Recommendation> {
        let _permit = self.run_token.try_acquire().map_err(|_| PipelineError::Busy)?;

        let mut status = self.start_status();
        let outcome = self.execute_test(&query, &mut status).await;
        self.finish(query, outcome, &mut status).await
    }

    fn start_status(&self) -> RunStatus {
        RunStatus::start(Arc::new(self.reporters.clone()), self.status.clone())
    }

    async fn finish(
        &self,
        query: Query,
        outcome: PipelineResult<Recommendation>,
        status: &mut RunStatus,
    ) -> PipelineResult<Recommendation> {
        match outcome {
            Ok(recommendation) => {
                if !status.current().is_terminal() {
                    status.advance(
                        PipelineStatus::Completed,
                        format!("Recommended {} travel period(s)", recommendation.recommend_date.len()),
                    );
                }
                *self.last_result.lock().await = Some(RunRecord {
                    run_id: status.run_id(),
                    query,
                    recommendation: recommendation.clone(),
                });
                Ok(recommendation)
            }
            Err(err) => {
                status.fail(err.status_reason(), err.to_string());
                Err(err)
            }
        }
    }

    fn validate<'q>(&self, query: &'q Query) -> PipelineResult<&'q str> {
        let place = query
            .place_name()
            .ok_or_else(|| PipelineError::Validation("missing place".to_string()))?;
        if !is_valid_day_span(query.day_span) {
            return Err(PipelineError::Validation("day span out of range".to_string()));
        }
        if query.past_span == 0 {
            return Err(PipelineError::Validation("look-back span must be positive".to_string()));
        }
        Ok(place)
    }

    async fn execute(
        &self,
        query: &Query,
        status: &mut RunStatus,
        cancel: &CancellationToken,
    ) -> PipelineResult<Recommendation> {
        status.advance(PipelineStatus::Validating, PipelineStatus::Validating.label());
        let place = self.validate(query)?;

        // Cache
        status.advance(PipelineStatus::CheckingCache, PipelineStatus::CheckingCache.label());
        let cache_request = CacheRequest {
            place: place.to_string(),
            this_year: query.this_year,
            past_span: query.past_span,
            day_span: query.day_span,
        };
        let cached = until_cancelled(cancel, self.gateways.cache.lookup(&cache_request))
            .await?
            .map_err(PipelineError::Transport)?;
        if let Some(recommendation) = cached.filter(|r| !r.is_empty()) {
            info!("Serving {} from cache", place);
            status.advance(PipelineStatus::Completed, "Recommendation served from cache");
            return Ok(recommendation);
        }

        // Collection
        status.advance(PipelineStatus::Collecting, PipelineStatus::Collecting.label());
        let (lat, lon) = query.place.as_ref().map(|p| (p.lat, p.lon)).unwrap_or((None, None));
        let collect_request = CollectRequest {
            place: place.to_string(),
            lat,
            lon,
            this_year: query.this_year,
            past_span: query.past_span,
        };
        let rain_collector = &self.gateways.rain_collector;
        let temperature_collector = &self.gateways.temperature_collector;
        let (rain, temperature) = until_cancelled(cancel, async {
            tokio::join!(
                rain_collector.collect(&collect_request),
                temperature_collector.collect(&collect_request)
            )
        })
        .await?;
        let rain_series = collected(rain_collector.metric(), rain)?;
        let temperature_series = collected(temperature_collector.metric(), temperature)?;
        info!(
            rain_len = rain_series.len(),
            temperature_len = temperature_series.len(),
            "Collected historical series"
        );

        // Analysis
        status.advance(PipelineStatus::Analyzing, PipelineStatus::Analyzing.label());
        let analyze_request = |series: RawSeries| AnalyzeRequest {
            place: place.to_string(),
            this_year: query.this_year,
            past_span: query.past_span,
            day_span: query.day_span,
            series,
        };
        let rain_request = analyze_request(rain_series);
        let temperature_request = analyze_request(temperature_series);
        let rain_analyzer = &self.gateways.rain_analyzer;
        let temperature_analyzer = &self.gateways.temperature_analyzer;
        let (rain, temperature) = until_cancelled(cancel, async {
            tokio::join!(
                rain_analyzer.analyze(&rain_request),
                temperature_analyzer.analyze(&temperature_request)
            )
        })
        .await?;
        let rain = analyzed(rain_analyzer.metric(), rain)?;
        let temperature = analyzed(temperature_analyzer.metric(), temperature)?;

        // Recommendation
        status.advance(PipelineStatus::Recommending, PipelineStatus::Recommending.label());
        let recommend_request = RecommendRequest {
            place: place.to_string(),
            this_year: query.this_year,
            past_span: query.past_span,
            day_span: query.day_span,
            rain_volume_probabilities: rain.probabilities,
            temperature_probabilities: temperature.probabilities,
            rain_volume_scores: rain.scores,
            temperature_scores: temperature.scores,
        };
        let recommendation = until_cancelled(cancel, self.gateways.recommender.recommend(&recommend_request))
            .await?
            .map_err(|e| PipelineError::Recommendation(e.to_string()))?;
        let recommendation = checked_shape(recommendation)?;

        if let Err(e) = self.gateways.cache.store(&cache_request, &recommendation).await {
            warn!("Could not store recommendation for {}: {}", place, e);
        }
        Ok(recommendation)
    }

    async fn execute_test(&self, query: &Query, status: &mut RunStatus) -> PipelineResult<Recommendation> {
        status.advance(PipelineStatus::Validating, PipelineStatus::Validating.label());
        let place = self.validate(query)?;

        let gateway = self
            .gateways
            .test
            .clone()
            .ok_or_else(|| PipelineError::Unsupported("no test endpoint configured".to_string()))?;

        status.advance(PipelineStatus::Recommending, "Running the combined test endpoint");
        let (lat, lon) = query.place.as_ref().map(|p| (p.lat, p.lon)).unwrap_or((None, None));
        let request = TestRunRequest {
            place: place.to_string(),
            lat,
            lon,
            this_year: query.this_year,
            past_span: query.past_span,
            day_span: query.day_span,
        };
        let recommendation = gateway
            .run_test(&request)
            .await
            .map_err(|e| PipelineError::Recommendation(e.to_string()))?;
        checked_shape(recommendation)
    }
}

async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> PipelineResult<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        out = fut => Ok(out),
    }
}

fn collected(metric: Metric, result: GatewayResult<RawSeries>) -> PipelineResult<RawSeries> {
    match result {
        Ok(series) if series.is_empty() => Err(PipelineError::Collection {
            metric,
            reason: "collector returned an empty series".to_string(),
        }),
        Ok(series) => Ok(series),
        Err(e) => Err(PipelineError::Collection {
            metric,
            reason: e.to_string(),
        }),
    }
}

fn analyzed(metric: Metric, result: GatewayResult<Analysis>) -> PipelineResult<Analysis> {
    let analysis = result.map_err(|e| PipelineError::Analysis {
        metric,
        reason: e.to_string(),
    })?;
    match analysis.incompleteness() {
        Some(reason) => Err(PipelineError::Analysis { metric, reason }),
        None => Ok(analysis),
    }
}

fn checked_shape(recommendation: Recommendation) -> PipelineResult<Recommendation> {
    match recommendation.shape_error() {
        Some(problem) => Err(PipelineError::Recommendation(problem)),
        None => Ok(recommendation),
    }
}
