use novel_fetch::config::{DecoderConfig, FetcherConfig};
use novel_fetch::{BaseFetcher, FetchError, Fetcher};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a base fetcher with a short request timeout
fn create_fetcher(decode_method: &str) -> BaseFetcher {
    let fetcher = FetcherConfig {
        request_timeout: 200,
        user_agent: Some("novel-fetch-test/1.0".to_string()),
    };
    let decoder = DecoderConfig {
        method: decode_method.to_string(),
    };
    BaseFetcher::from_config(&fetcher, &decoder).expect("Failed to build base fetcher")
}

#[tokio::test]
async fn test_fetch_success_returns_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/book/1"))
        .and(header("user-agent", "novel-fetch-test/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Chapter 1"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = create_fetcher("");
    let url = format!("{}/book/1", mock_server.uri());
    let result = fetcher.fetch(&CancellationToken::new(), &url).await;

    assert_eq!(result, Ok("Chapter 1".to_string()));
}

#[tokio::test]
async fn test_fetch_empty_body_is_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/empty"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let fetcher = create_fetcher("");
    let url = format!("{}/empty", mock_server.uri());
    let result = fetcher.fetch(&CancellationToken::new(), &url).await;

    assert_eq!(result, Ok(String::new()));
}

#[tokio::test]
async fn test_fetch_non_success_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/bad-gateway"))
        .respond_with(ResponseTemplate::new(502).set_body_string("upstream down"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let fetcher = create_fetcher("");
    let cancel = CancellationToken::new();

    let result = fetcher
        .fetch(&cancel, &format!("{}/bad-gateway", mock_server.uri()))
        .await;
    assert_eq!(result, Err(FetchError::StatusCode(502)));

    let result = fetcher
        .fetch(&cancel, &format!("{}/missing", mock_server.uri()))
        .await;
    assert_eq!(result, Err(FetchError::StatusCode(404)));
}

#[tokio::test]
async fn test_fetch_slow_response_times_out() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("too late")
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&mock_server)
        .await;

    let fetcher = create_fetcher("");
    let url = format!("{}/slow", mock_server.uri());
    let result = fetcher.fetch(&CancellationToken::new(), &url).await;

    assert_eq!(result, Err(FetchError::Timeout));
}

#[tokio::test]
async fn test_fetch_decodes_big5_body() {
    let mock_server = MockServer::start().await;

    // "第一章" in Big5
    Mock::given(method("GET"))
        .and(path("/big5"))
        .respond_with(
            ResponseTemplate::new(200).set_body_bytes(vec![0xb2, 0xc4, 0xa4, 0x40, 0xb3, 0xb9]),
        )
        .mount(&mock_server)
        .await;

    let fetcher = create_fetcher("big5");
    let url = format!("{}/big5", mock_server.uri());
    let result = fetcher.fetch(&CancellationToken::new(), &url).await;

    assert_eq!(result, Ok("第一章".to_string()));
}

#[tokio::test]
async fn test_fetch_malformed_big5_body_is_replaced() {
    let mock_server = MockServer::start().await;

    // "第一章" in Big5 followed by a stray byte
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0xb2, 0xc4, 0xa4, 0x40, 0xb3, 0xb9, 0xff]),
        )
        .mount(&mock_server)
        .await;

    let fetcher = create_fetcher("big5");
    let url = format!("{}/broken", mock_server.uri());
    let result = fetcher.fetch(&CancellationToken::new(), &url).await;

    assert_eq!(result, Ok("第一章\u{fffd}".to_string()));
}

#[tokio::test]
async fn test_fetch_invalid_utf8_body_is_replaced() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"a\xff".to_vec()))
        .mount(&mock_server)
        .await;

    let fetcher = create_fetcher("utf8");
    let url = format!("{}/broken", mock_server.uri());
    let result = fetcher.fetch(&CancellationToken::new(), &url).await;

    assert_eq!(result, Ok("a\u{fffd}".to_string()));
}

#[tokio::test]
async fn test_fetch_cancelled_mid_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&mock_server)
        .await;

    // Long request timeout so only cancellation can end the fetch early
    let fetcher = BaseFetcher::from_config(
        &FetcherConfig {
            request_timeout: 10_000,
            user_agent: None,
        },
        &DecoderConfig::default(),
    )
    .expect("Failed to build base fetcher");

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let url = format!("{}/slow", mock_server.uri());
    let result = fetcher.fetch(&cancel, &url).await;

    assert_eq!(result, Err(FetchError::Cancelled));
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_fetch_unreachable_host_is_other_error() {
    // Bind and drop a listener so the port is very likely closed
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to read address");
    drop(listener);

    let fetcher = create_fetcher("");
    let result = fetcher
        .fetch(&CancellationToken::new(), &format!("http://{}/", addr))
        .await;

    assert!(matches!(result, Err(FetchError::Other(_))));
}
