//! HTTP gateways against an in-process fake backend

use axum::{extract::Json, http::StatusCode, response::IntoResponse, routing::post, Router};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use travel_recommender::gateway::{BackendClient, Gateways};
use travel_recommender::pipeline::{Metric, Place, PipelineController, PipelineError, Query};

#[derive(Clone, Default)]
struct Recorded(Arc<Mutex<Vec<(String, Value)>>>);

impl Recorded {
    fn push(&self, path: &str, body: Value) {
        self.0.lock().unwrap().push((path.to_string(), body));
    }

    fn paths(&self) -> Vec<String> {
        self.0.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
    }

    fn body(&self, path: &str) -> Value {
        self.0
            .lock()
            .unwrap()
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, b)| b.clone())
            .unwrap_or(Value::Null)
    }
}

fn recommendation_json() -> Value {
    json!({
        "input": { "place": "Tokyo", "this_year": 2024, "past_span": 5, "day_span": 7 },
        "recommend_date": [["2024-05-01", "2024-05-07"], ["2024-10-02", "2024-10-08"]],
        "recommend_date_probability": [
            [{ "no_rain": 0.8 }, { "mild": 0.6 }, { "no_rain": 0.7 }, { "mild": 0.5 }],
            [{ "no_rain": 0.6 }, { "mild": 0.9 }, { "no_rain": 0.5 }, { "mild": 0.8 }]
        ]
    })
}

fn analysis_json(metric: &str) -> Value {
    let mut payload = json!({});
    payload[format!("{}_probabilities", metric)] = Value::Array(vec![json!({ "low": 0.4, "high": 0.6 }); 7]);
    payload[format!("{}_scores", metric)] = json!([1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
    payload
}

/// Routes answering a cache miss followed by the full pipeline
struct FakeBackend {
    recorded: Recorded,
    cache: (StatusCode, String),
    rain_collector: (StatusCode, Value),
    temperature_analyzer: Value,
}

impl FakeBackend {
    fn new() -> Self {
        Self {
            recorded: Recorded::default(),
            cache: (StatusCode::OK, String::new()),
            rain_collector: (StatusCode::OK, json!({ "rain_volume_lists": [[0.0, 1.2], [3.4], [0.0], [5.1], [0.2]] })),
            temperature_analyzer: analysis_json("temperature"),
        }
    }

    fn route(router: Router, recorded: &Recorded, path: &'static str, status: StatusCode, body: String) -> Router {
        let recorded = recorded.clone();
        router.route(
            path,
            post(move |Json(request): Json<Value>| async move {
                recorded.push(path, request);
                (status, body).into_response()
            }),
        )
    }

    async fn spawn(self) -> (String, Recorded) {
        let r = &self.recorded;
        let mut router = Router::new();
        router = Self::route(router, r, "/recommend/cache", self.cache.0, self.cache.1.clone());
        router = Self::route(router, r, "/rainvolumecollector", self.rain_collector.0, self.rain_collector.1.to_string());
        router = Self::route(
            router,
            r,
            "/temperaturecollector",
            StatusCode::OK,
            json!({ "temperature_lists": [[21.0], [22.5], [19.8], [20.1], [23.3]] }).to_string(),
        );
        router = Self::route(router, r, "/rainvolumeanalyzer", StatusCode::OK, analysis_json("rain_volume").to_string());
        router = Self::route(router, r, "/temperatureanalyzer", StatusCode::OK, self.temperature_analyzer.to_string());
        router = Self::route(router, r, "/recommend", StatusCode::OK, recommendation_json().to_string());
        router = Self::route(router, r, "/test", StatusCode::OK, recommendation_json().to_string());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{}", addr), self.recorded)
    }
}

fn controller_for(base_url: &str) -> PipelineController {
    let client = BackendClient::new(base_url, Duration::from_secs(5)).unwrap();
    PipelineController::new(Gateways::http(client), 5)
}

fn tokyo_query() -> Query {
    Query::new(Some(Place::new("Tokyo").with_coordinates(35.68, 139.76)), 2024, 5, 7)
}

#[tokio::test]
async fn test_full_pipeline_speaks_the_wire_format() {
    let (url, recorded) = FakeBackend::new().spawn().await;
    let controller = controller_for(&url);

    let recommendation = controller.run(tokyo_query()).await.unwrap();

    assert_eq!(serde_json::to_value(&recommendation).unwrap(), recommendation_json());

    let paths = recorded.paths();
    assert_eq!(paths.len(), 6);
    assert_eq!(paths[0], "/recommend/cache");
    assert_eq!(paths[5], "/recommend");

    assert_eq!(
        recorded.body("/recommend/cache"),
        json!({ "place": "Tokyo", "this_year": 2024, "past_span": 5, "day_span": 7 })
    );
    assert_eq!(
        recorded.body("/temperaturecollector"),
        json!({ "place": "Tokyo", "lat": 35.68, "lon": 139.76, "this_year": 2024, "past_span": 5 })
    );

    let analyzer = recorded.body("/rainvolumeanalyzer");
    assert_eq!(analyzer["day_span"], json!(7));
    assert_eq!(analyzer["rain_volume_lists"].as_array().unwrap().len(), 5);

    let recommend = recorded.body("/recommend");
    for field in [
        "rain_volume_probabilities",
        "temperature_probabilities",
        "rain_volume_scores",
        "temperature_scores",
    ] {
        assert_eq!(recommend[field].as_array().unwrap().len(), 7, "{}", field);
    }
}

#[tokio::test]
async fn test_cache_hit_over_http() {
    let mut backend = FakeBackend::new();
    backend.cache = (StatusCode::OK, recommendation_json().to_string());
    let (url, recorded) = backend.spawn().await;

    let recommendation = controller_for(&url).run(tokyo_query()).await.unwrap();

    assert_eq!(serde_json::to_value(&recommendation).unwrap(), recommendation_json());
    assert_eq!(recorded.paths(), vec!["/recommend/cache".to_string()]);
}

#[tokio::test]
async fn test_sparse_cache_payload_is_returned_verbatim() {
    let cached = json!({
        "input": { "place": "Tokyo" },
        "recommend_date": [["2024-05-01T00:00:00", "2024-05-07T00:00:00"]],
        "recommend_date_probability": [[{ "no_rain": 1 }, { "mild": 0.6 }]],
        "cached_at": "2024-04-01T10:00:00Z"
    });
    let mut backend = FakeBackend::new();
    backend.cache = (StatusCode::OK, cached.to_string());
    let (url, recorded) = backend.spawn().await;

    let recommendation = controller_for(&url).run(tokyo_query()).await.unwrap();

    assert_eq!(serde_json::to_value(&recommendation).unwrap(), cached);
    assert_eq!(recommendation.extra.get("cached_at"), Some(&json!("2024-04-01T10:00:00Z")));
    assert_eq!(recommendation.input.day_span, None);
    assert_eq!(recorded.paths(), vec!["/recommend/cache".to_string()]);
}

#[tokio::test]
async fn test_empty_cache_bodies_are_misses() {
    for body in ["", "null", "{}", r#"{"recommend_date": [], "recommend_date_probability": []}"#] {
        let mut backend = FakeBackend::new();
        backend.cache = (StatusCode::OK, body.to_string());
        let (url, recorded) = backend.spawn().await;

        controller_for(&url).run(tokyo_query()).await.unwrap();

        assert_eq!(recorded.paths().len(), 6, "cache body {:?}", body);
    }
}

#[tokio::test]
async fn test_collector_http_error_is_a_collection_error() {
    let mut backend = FakeBackend::new();
    backend.rain_collector = (StatusCode::INTERNAL_SERVER_ERROR, json!({ "detail": "upstream down" }));
    let (url, recorded) = backend.spawn().await;

    let err = controller_for(&url).run(tokyo_query()).await.unwrap_err();

    match err {
        PipelineError::Collection { metric, reason } => {
            assert_eq!(metric, Metric::RainVolume);
            assert!(reason.contains("500"), "{}", reason);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(!recorded.paths().iter().any(|p| p.ends_with("analyzer")));
}

#[tokio::test]
async fn test_analyzer_missing_scores_is_an_analysis_error() {
    let mut backend = FakeBackend::new();
    backend.temperature_analyzer = json!({ "temperature_probabilities": [{ "mild": 0.5 }] });
    let (url, recorded) = backend.spawn().await;

    let err = controller_for(&url).run(tokyo_query()).await.unwrap_err();

    assert_eq!(
        err,
        PipelineError::Analysis {
            metric: Metric::Temperature,
            reason: "could not decode response: missing field 'temperature_scores'".into(),
        }
    );
    assert!(!recorded.paths().contains(&"/recommend".to_string()));
}

#[tokio::test]
async fn test_unreachable_backend_fails_at_cache() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let err = controller_for(&url).run(tokyo_query()).await.unwrap_err();

    assert!(matches!(err, PipelineError::Transport(_)));
}

#[tokio::test]
async fn test_run_test_posts_the_collapsed_request() {
    let (url, recorded) = FakeBackend::new().spawn().await;

    let recommendation = controller_for(&url).run_test(tokyo_query()).await.unwrap();

    assert_eq!(recommendation.recommend_date.len(), 2);
    assert_eq!(recorded.paths(), vec!["/test".to_string()]);
    assert_eq!(
        recorded.body("/test"),
        json!({ "place": "Tokyo", "lat": 35.68, "lon": 139.76, "this_year": 2024, "past_span": 5, "day_span": 7 })
    );
}
