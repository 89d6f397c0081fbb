//! Shared mock gateways for pipeline tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use travel_recommender::gateway::{
    AnalyzeRequest, AnalyzerGateway, CacheGateway, CacheRequest, CollectRequest, CollectorGateway, Gateways,
    RecommendRequest, RecommenderGateway, TestGateway, TestRunRequest,
};
use travel_recommender::pipeline::{
    Analysis, DatePeriod, GatewayError, GatewayResult, Metric, Place, ProbabilityProfile, Query, RawSeries,
    Recommendation, RecommendationInput, ScoreProfile,
};

/// Ordered record of every gateway call
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.entries().iter().filter(|e| e.starts_with(prefix)).count()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }
}

pub fn tokyo() -> Place {
    Place::new("Tokyo").with_coordinates(35.68, 139.76)
}

pub fn tokyo_query() -> Query {
    Query::new(Some(tokyo()), 2024, 5, 7)
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn series(len: usize) -> RawSeries {
    RawSeries((0..len).map(|i| json!([i as f64, i as f64 + 0.5])).collect())
}

pub fn analysis(metric: Metric, days: usize) -> Analysis {
    let (wet, dry) = match metric {
        Metric::RainVolume => ("heavy_rain", "no_rain"),
        Metric::Temperature => ("hot", "mild"),
    };
    Analysis {
        probabilities: (0..days)
            .map(|d| ProbabilityProfile::from_pairs([(wet, 0.1 * (d % 5) as f64), (dry, 1.0 - 0.1 * (d % 5) as f64)]))
            .collect(),
        scores: (0..days).map(|d| ScoreProfile(json!(d as f64 * 1.5))).collect(),
    }
}

pub fn tokyo_recommendation() -> Recommendation {
    Recommendation {
        input: RecommendationInput {
            place: Some("Tokyo".into()),
            this_year: Some(2024),
            past_span: Some(5),
            day_span: Some(7),
            ..Default::default()
        },
        recommend_date: vec![DatePeriod::new(date(2024, 5, 1), date(2024, 5, 7))],
        recommend_date_probability: vec![vec![
            ProbabilityProfile::from_pairs([("no_rain", 0.8), ("heavy_rain", 0.2)]),
            ProbabilityProfile::from_pairs([("mild", 0.7), ("hot", 0.3)]),
            ProbabilityProfile::from_pairs([("no_rain", 0.6), ("heavy_rain", 0.4)]),
            ProbabilityProfile::from_pairs([("mild", 0.9), ("hot", 0.1)]),
        ]],
        ..Default::default()
    }
}

pub struct MockCache {
    pub log: CallLog,
    pub result: GatewayResult<Option<Recommendation>>,
}

#[async_trait]
impl CacheGateway for MockCache {
    async fn lookup(&self, request: &CacheRequest) -> GatewayResult<Option<Recommendation>> {
        self.log.push(format!("cache:{}", request.place));
        self.result.clone()
    }
}

pub struct MockCollector {
    pub log: CallLog,
    pub metric: Metric,
    pub result: GatewayResult<RawSeries>,
    /// When set, the call parks until notified
    pub gate: Option<Arc<Notify>>,
}

#[async_trait]
impl CollectorGateway for MockCollector {
    fn metric(&self) -> Metric {
        self.metric
    }

    async fn collect(&self, request: &CollectRequest) -> GatewayResult<RawSeries> {
        self.log.push(format!("collect:{:?}", self.metric));
        assert_eq!(request.lat, Some(35.68));
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        tokio::task::yield_now().await;
        self.result.clone()
    }
}

pub struct MockAnalyzer {
    pub log: CallLog,
    pub metric: Metric,
    pub result: GatewayResult<Analysis>,
}

#[async_trait]
impl AnalyzerGateway for MockAnalyzer {
    fn metric(&self) -> Metric {
        self.metric
    }

    async fn analyze(&self, request: &AnalyzeRequest) -> GatewayResult<Analysis> {
        assert!(!request.series.is_empty());
        self.log.push(format!("analyze:{:?}", self.metric));
        tokio::task::yield_now().await;
        self.result.clone()
    }
}

pub struct MockRecommender {
    pub log: CallLog,
    pub result: GatewayResult<Recommendation>,
    pub seen: Mutex<Option<RecommendRequest>>,
}

#[async_trait]
impl RecommenderGateway for MockRecommender {
    async fn recommend(&self, request: &RecommendRequest) -> GatewayResult<Recommendation> {
        self.log.push("recommend");
        *self.seen.lock().unwrap() = Some(request.clone());
        self.result.clone()
    }
}

pub struct MockTestRunner {
    pub log: CallLog,
    pub result: GatewayResult<Recommendation>,
}

#[async_trait]
impl TestGateway for MockTestRunner {
    async fn run_test(&self, request: &TestRunRequest) -> GatewayResult<Recommendation> {
        self.log.push(format!("test:{}", request.place));
        self.result.clone()
    }
}

/// Mock backend answering the Tokyo scenario on a cache miss
pub struct Harness {
    pub log: CallLog,
    pub recommender: Arc<MockRecommender>,
    pub gateways: Gateways,
}

impl Harness {
    pub fn new() -> Self {
        let log = CallLog::default();
        let recommender = Arc::new(MockRecommender {
            log: log.clone(),
            result: Ok(tokyo_recommendation()),
            seen: Mutex::new(None),
        });
        let gateways = Gateways {
            cache: Arc::new(MockCache {
                log: log.clone(),
                result: Ok(None),
            }),
            rain_collector: Arc::new(MockCollector {
                log: log.clone(),
                metric: Metric::RainVolume,
                result: Ok(series(5)),
                gate: None,
            }),
            temperature_collector: Arc::new(MockCollector {
                log: log.clone(),
                metric: Metric::Temperature,
                result: Ok(series(5)),
                gate: None,
            }),
            rain_analyzer: Arc::new(MockAnalyzer {
                log: log.clone(),
                metric: Metric::RainVolume,
                result: Ok(analysis(Metric::RainVolume, 7)),
            }),
            temperature_analyzer: Arc::new(MockAnalyzer {
                log: log.clone(),
                metric: Metric::Temperature,
                result: Ok(analysis(Metric::Temperature, 7)),
            }),
            recommender: recommender.clone(),
            test: None,
        };
        Self {
            log,
            recommender,
            gateways,
        }
    }

    pub fn with_cache(mut self, result: GatewayResult<Option<Recommendation>>) -> Self {
        self.gateways.cache = Arc::new(MockCache {
            log: self.log.clone(),
            result,
        });
        self
    }

    pub fn with_collector(mut self, metric: Metric, result: GatewayResult<RawSeries>, gate: Option<Arc<Notify>>) -> Self {
        let collector = Arc::new(MockCollector {
            log: self.log.clone(),
            metric,
            result,
            gate,
        });
        match metric {
            Metric::RainVolume => self.gateways.rain_collector = collector,
            Metric::Temperature => self.gateways.temperature_collector = collector,
        }
        self
    }

    pub fn with_analyzer(mut self, metric: Metric, result: GatewayResult<Analysis>) -> Self {
        let analyzer = Arc::new(MockAnalyzer {
            log: self.log.clone(),
            metric,
            result,
        });
        match metric {
            Metric::RainVolume => self.gateways.rain_analyzer = analyzer,
            Metric::Temperature => self.gateways.temperature_analyzer = analyzer,
        }
        self
    }

    pub fn with_recommendation(mut self, result: GatewayResult<Recommendation>) -> Self {
        self.recommender = Arc::new(MockRecommender {
            log: self.log.clone(),
            result,
            seen: Mutex::new(None),
        });
        self.gateways.recommender = self.recommender.clone();
        self
    }

    pub fn with_test_runner(mut self, result: GatewayResult<Recommendation>) -> Self {
        self.gateways.test = Some(Arc::new(MockTestRunner {
            log: self.log.clone(),
            result,
        }));
        self
    }
}

pub fn transport_error() -> GatewayError {
    GatewayError::Transport("connection refused".into())
}
