//! End-to-end tests for the fetch layer: cache, rate limiter and HTTP together

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dealsource::cache::CacheStore;
use dealsource::fetch::{CachePolicy, FetchError, FetchSource, Fetcher};
use dealsource::rate_limit::{RateLimitRule, RateLimiterRegistry};
use tempfile::TempDir;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};
use wiremock::matchers::method;

/// Responds 200 and records when each request arrived
#[derive(Clone, Default)]
struct ArrivalRecorder {
    arrivals: Arc<Mutex<Vec<Instant>>>,
}

impl Respond for ArrivalRecorder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        self.arrivals.lock().unwrap().push(Instant::now());
        ResponseTemplate::new(200).set_body_string(request.url.path().to_string())
    }
}

fn fetcher_in(dir: &TempDir, limiter: RateLimiterRegistry) -> Fetcher {
    let cache = Arc::new(CacheStore::open(dir.path()));
    Fetcher::new(cache, Arc::new(limiter)).expect("Fetcher creation should succeed")
}

#[tokio::test]
async fn test_one_per_second_destination_spaces_concurrent_fetches() {
    let server = MockServer::start().await;
    let recorder = ArrivalRecorder::default();
    Mock::given(method("GET"))
        .respond_with(recorder.clone())
        .expect(3)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let limiter = RateLimiterRegistry::new(RateLimitRule::per_second(100).unwrap())
        .with_rule("127.0.0.1", RateLimitRule::per_second(1).unwrap());
    let fetcher = fetcher_in(&temp_dir, limiter);
    let urls: Vec<String> = (1..=3)
        .map(|n| format!("{}/company/{}", server.uri(), n))
        .collect();

    let results = fetcher.fetch_all(&urls, CachePolicy::UseCache).await;

    assert!(results.iter().all(Result::is_ok));
    let mut arrivals = recorder.arrivals.lock().unwrap().clone();
    arrivals.sort();
    assert_eq!(arrivals.len(), 3);
    for pair in arrivals.windows(2) {
        // Permits are a full second apart; allow for request latency jitter.
        assert!(
            pair[1].duration_since(pair[0]) >= Duration::from_millis(950),
            "requests arrived {:?} apart",
            pair[1].duration_since(pair[0])
        );
    }
}

#[tokio::test]
async fn test_cache_survives_a_new_fetcher() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("registry page"))
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let url = format!("{}/company/7", server.uri());

    let first_run = fetcher_in(&temp_dir, RateLimiterRegistry::default());
    assert_eq!(first_run.fetch(&url).await.unwrap().source, FetchSource::Network);
    drop(first_run);

    // A restarted pipeline picks up where the last one stopped.
    let resumed = fetcher_in(&temp_dir, RateLimiterRegistry::default());
    let fetched = resumed.fetch(&url).await.unwrap();

    assert_eq!(fetched.source, FetchSource::Cache);
    assert_eq!(fetched.body, "registry page");
}

#[tokio::test]
async fn test_concurrent_fetches_of_same_url_leave_one_entry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("same body"))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let limiter = RateLimiterRegistry::new(RateLimitRule::per_second(100).unwrap());
    let fetcher = fetcher_in(&temp_dir, limiter);
    let url = format!("{}/feed", server.uri());
    let urls = vec![url.clone(); 5];

    let results = fetcher.fetch_all(&urls, CachePolicy::Refresh).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(fetcher.cache().get::<String>(&url).as_deref(), Some("same body"));
    assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn test_failed_item_is_skipped_by_the_pipeline() {
    let server = MockServer::start().await;
    let recorder = ArrivalRecorder::default();
    Mock::given(method("GET"))
        .and(wiremock::matchers::path("/company/2"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(recorder)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let limiter = RateLimiterRegistry::new(RateLimitRule::per_second(100).unwrap());
    let fetcher = fetcher_in(&temp_dir, limiter);
    let urls: Vec<String> = (1..=3)
        .map(|n| format!("{}/company/{}", server.uri(), n))
        .collect();

    let bodies: Vec<Option<String>> = fetcher
        .fetch_all(&urls, CachePolicy::UseCache)
        .await
        .into_iter()
        .map(|result| result.ok().map(|fetched| fetched.body))
        .collect();

    assert_eq!(
        bodies,
        vec![Some("/company/1".to_string()), None, Some("/company/3".to_string())]
    );
    assert!(matches!(
        fetcher.fetch(&urls[1]).await,
        Err(FetchError::Http { status: 503, .. })
    ));
}
