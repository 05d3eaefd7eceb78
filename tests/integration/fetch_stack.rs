use novel_fetch::config::parse_config;
use novel_fetch::{build_site_fetcher, CircuitStatus, FetchError, Fetcher, SiteFetcher};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Short timings so recovery runs in well under a second
const STACK_CONFIG: &str = r#"
[[site]]
name = "flaky"

[site.fetcher]
request-timeout = 1000

[site.circuit-breaker]
open-threshold = 6
acquire-timeout = 20
max-concurrency = 10
recover-ladder = [1, 2, 5]
open-duration = 100
recover-stage-duration = 100

[[site.circuit-breaker.failure-checks]]
kind = "status-codes"
value = [500]

[[site]]
name = "retrying"

[site.fetcher]
request-timeout = 1000

[site.circuit-breaker]
open-threshold = 10
acquire-timeout = 20
max-concurrency = 10
recover-ladder = [1, 5]
open-duration = 100
recover-stage-duration = 100

[[site.circuit-breaker.failure-checks]]
kind = "status-codes"
value = [503]

[site.retry]
max-retry-weight = 3

[[site.retry.conditions]]
kind = "status-codes"
value = [503]
weight = 1
pause-interval = 10
pause-interval-type = "const"
"#;

fn create_site_fetcher(name: &str) -> SiteFetcher {
    let config = parse_config(STACK_CONFIG).expect("Failed to parse config");
    let site = config.site(name).expect("Site missing from config");
    build_site_fetcher(site).expect("Failed to build fetch stack")
}

/// Mounts `/broken` answering 500 and `/chapter` answering 200
async fn start_mock_site() -> MockServer {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/chapter"))
        .respond_with(ResponseTemplate::new(200).set_body_string("chapter text"))
        .mount(&mock_server)
        .await;

    mock_server
}

/// Polls the breaker until it reports `status` or `within` runs out
async fn wait_for_status(fetcher: &SiteFetcher, status: CircuitStatus, within: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < within {
        if fetcher.snapshot().status == status {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    fetcher.snapshot().status == status
}

#[tokio::test]
async fn test_consecutive_failures_open_then_recover_to_closed() {
    let mock_server = start_mock_site().await;
    let fetcher = create_site_fetcher("flaky");
    let cancel = CancellationToken::new();
    let broken = format!("{}/broken", mock_server.uri());
    let chapter = format!("{}/chapter", mock_server.uri());

    for i in 0..5 {
        let result = fetcher.fetch(&cancel, &broken).await;
        assert_eq!(result, Err(FetchError::StatusCode(500)));
        assert_eq!(fetcher.snapshot().failure_count, i + 1);
        assert_eq!(fetcher.snapshot().status, CircuitStatus::Closed);
    }

    let result = fetcher.fetch(&cancel, &broken).await;
    assert_eq!(result, Err(FetchError::StatusCode(500)));

    let snapshot = fetcher.snapshot();
    assert_eq!(snapshot.status, CircuitStatus::Open);
    assert_eq!(snapshot.failure_count, 0);

    // Three successes spread across the open period and recovery stages
    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(120)).await;
        let result = fetcher.fetch(&cancel, &chapter).await;
        assert_eq!(result, Ok("chapter text".to_string()));
    }

    assert!(wait_for_status(&fetcher, CircuitStatus::Closed, Duration::from_secs(2)).await);
    let snapshot = fetcher.snapshot();
    assert_eq!(snapshot.half_open_level, 0);
    assert_eq!(snapshot.available_permits, 10);
}

#[tokio::test]
async fn test_fetch_while_open_waits_for_half_open() {
    let mock_server = start_mock_site().await;
    let fetcher = create_site_fetcher("flaky");
    let cancel = CancellationToken::new();
    let broken = format!("{}/broken", mock_server.uri());

    for _ in 0..6 {
        let _ = fetcher.fetch(&cancel, &broken).await;
    }
    assert_eq!(fetcher.snapshot().status, CircuitStatus::Open);

    let start = Instant::now();
    let result = fetcher
        .fetch(&cancel, &format!("{}/chapter", mock_server.uri()))
        .await;

    assert_eq!(result, Ok("chapter text".to_string()));
    // Admission only reopens once recovery begins
    assert!(start.elapsed() >= Duration::from_millis(50));
}

#[tokio::test]
async fn test_fetch_while_open_respects_cancellation() {
    let mock_server = start_mock_site().await;
    let fetcher = create_site_fetcher("flaky");
    let cancel = CancellationToken::new();
    let broken = format!("{}/broken", mock_server.uri());

    for _ in 0..6 {
        let _ = fetcher.fetch(&cancel, &broken).await;
    }
    assert_eq!(fetcher.snapshot().status, CircuitStatus::Open);

    let deadline = novel_fetch::with_deadline(&cancel, Duration::from_millis(10));
    let result = fetcher
        .fetch(&deadline, &format!("{}/chapter", mock_server.uri()))
        .await;

    assert_eq!(result, Err(FetchError::Cancelled));
    assert!(!cancel.is_cancelled());
}

#[tokio::test]
async fn test_failure_during_half_open_reopens() {
    let mock_server = start_mock_site().await;
    let fetcher = create_site_fetcher("flaky");
    let cancel = CancellationToken::new();
    let broken = format!("{}/broken", mock_server.uri());

    for _ in 0..6 {
        let _ = fetcher.fetch(&cancel, &broken).await;
    }
    assert!(wait_for_status(&fetcher, CircuitStatus::HalfOpen, Duration::from_secs(2)).await);

    let result = fetcher.fetch(&cancel, &broken).await;
    assert_eq!(result, Err(FetchError::StatusCode(500)));

    assert!(wait_for_status(&fetcher, CircuitStatus::Open, Duration::from_secs(2)).await);
    let snapshot = fetcher.snapshot();
    assert_eq!(snapshot.half_open_level, 0);
    assert_eq!(snapshot.failure_count, 0);
}

#[tokio::test]
async fn test_retry_layer_recovers_from_transient_status() {
    let mock_server = MockServer::start().await;

    // Two 503s, then the page comes back
    Mock::given(method("GET"))
        .and(path("/chapter"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/chapter"))
        .respond_with(ResponseTemplate::new(200).set_body_string("chapter text"))
        .mount(&mock_server)
        .await;

    let fetcher = create_site_fetcher("retrying");
    let result = fetcher
        .fetch(
            &CancellationToken::new(),
            &format!("{}/chapter", mock_server.uri()),
        )
        .await;

    assert_eq!(result, Ok("chapter text".to_string()));

    let requests = mock_server
        .received_requests()
        .await
        .expect("Request recording is enabled");
    assert_eq!(requests.len(), 3);

    // The success after the retries clears the breaker's failure streak
    let snapshot = fetcher.snapshot();
    assert_eq!(snapshot.status, CircuitStatus::Closed);
    assert_eq!(snapshot.failure_count, 0);
}

#[tokio::test]
async fn test_retry_budget_exhausted_returns_last_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/chapter"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let fetcher = create_site_fetcher("retrying");
    let result = fetcher
        .fetch(
            &CancellationToken::new(),
            &format!("{}/chapter", mock_server.uri()),
        )
        .await;

    assert_eq!(result, Err(FetchError::StatusCode(503)));

    let requests = mock_server
        .received_requests()
        .await
        .expect("Request recording is enabled");
    assert_eq!(requests.len(), 3);
    assert_eq!(fetcher.snapshot().failure_count, 3);
}
