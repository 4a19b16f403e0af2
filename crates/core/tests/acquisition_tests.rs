//! Text acquisition chain against stubbed scraping providers
use precis_core::{Acquirer, FetchConfig, MIN_ARTICLE_CHARS, RetryPolicy, Scraper};
use reqwest::Client;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TARGET: &str = "https://example.com/post";

fn article(paragraphs: usize) -> String {
    (1..=paragraphs)
        .map(|i| format!("Paragraph {i} of a long article about backoff strategies and provider fallback."))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn config() -> FetchConfig {
    FetchConfig { timeout: 5, retry: RetryPolicy::immediate(3), ..Default::default() }
}

fn chain(server: &MockServer) -> Acquirer {
    Acquirer::new(
        Client::new(),
        vec![
            Scraper::Reader { endpoint: server.uri() },
            Scraper::Crawler { endpoint: format!("{}/crawl", server.uri()), api_key: "sp-key".to_string() },
        ],
        config(),
    )
}

async fn mount_reader(server: &MockServer, response: ResponseTemplate, times: u64) {
    Mock::given(method("GET")).respond_with(response).expect(times).mount(server).await;
}

async fn mount_crawler(server: &MockServer, response: ResponseTemplate, times: u64) {
    Mock::given(method("POST"))
        .and(path("/crawl"))
        .respond_with(response)
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_long_reader_text_is_accepted_without_crawling() {
    let server = MockServer::start().await;
    mount_reader(&server, ResponseTemplate::new(200).set_body_string(article(10)), 1).await;
    mount_crawler(&server, ResponseTemplate::new(200).set_body_json(json!([])), 0).await;

    let text = chain(&server).acquire(TARGET).await.expect("reader text");
    assert!(text.chars().count() >= 500);
    assert!(text.starts_with("Paragraph 1"));
}

#[tokio::test]
async fn test_reader_receives_target_url_as_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/https://example.com/post"))
        .respond_with(ResponseTemplate::new(200).set_body_string(article(10)))
        .expect(1)
        .mount(&server)
        .await;

    let acquirer = Acquirer::new(Client::new(), vec![Scraper::Reader { endpoint: server.uri() }], config());
    assert!(acquirer.acquire(TARGET).await.is_some());
}

#[tokio::test]
async fn test_short_reader_text_falls_back_to_crawler() {
    let server = MockServer::start().await;
    mount_reader(&server, ResponseTemplate::new(200).set_body_string("Please enable JavaScript."), 1).await;
    mount_crawler(
        &server,
        ResponseTemplate::new(200).set_body_json(json!([{ "url": TARGET, "content": article(12) }])),
        1,
    )
    .await;

    let text = chain(&server).acquire(TARGET).await.expect("crawler text");
    assert!(text.contains("Paragraph 12"));
}

#[tokio::test]
async fn test_failing_reader_is_retried_then_crawler_used() {
    let server = MockServer::start().await;
    mount_reader(&server, ResponseTemplate::new(503), 3).await;
    mount_crawler(&server, ResponseTemplate::new(200).set_body_json(json!([{ "content": article(8) }])), 1).await;

    assert!(chain(&server).acquire(TARGET).await.is_some());
}

#[tokio::test]
async fn test_empty_reader_body_counts_as_failed_attempt() {
    let server = MockServer::start().await;
    mount_reader(&server, ResponseTemplate::new(200).set_body_string(""), 3).await;
    mount_crawler(&server, ResponseTemplate::new(200).set_body_json(json!([{ "content": article(8) }])), 1).await;

    assert!(chain(&server).acquire(TARGET).await.is_some());
}

#[tokio::test]
async fn test_crawler_request_shape() {
    let server = MockServer::start().await;
    mount_reader(&server, ResponseTemplate::new(500), 3).await;
    Mock::given(method("POST"))
        .and(path("/crawl"))
        .and(header("authorization", "Bearer sp-key"))
        .and(body_json(json!({ "url": TARGET, "limit": 1, "return_format": "markdown" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "content": article(8) }])))
        .expect(1)
        .mount(&server)
        .await;

    assert!(chain(&server).acquire(TARGET).await.is_some());
}

#[tokio::test]
async fn test_last_provider_short_text_is_accepted() {
    let server = MockServer::start().await;
    mount_reader(&server, ResponseTemplate::new(200).set_body_string("Tiny."), 1).await;
    mount_crawler(&server, ResponseTemplate::new(200).set_body_json(json!([{ "content": "Also tiny." }])), 1).await;

    assert_eq!(chain(&server).acquire(TARGET).await.as_deref(), Some("Also tiny."));
}

#[tokio::test]
async fn test_crawler_without_content_is_retried() {
    let server = MockServer::start().await;
    mount_reader(&server, ResponseTemplate::new(500), 3).await;
    mount_crawler(&server, ResponseTemplate::new(200).set_body_json(json!([{ "url": TARGET }])), 3).await;

    assert!(chain(&server).acquire(TARGET).await.is_none());
}

#[tokio::test]
async fn test_all_providers_failing_yields_none() {
    let server = MockServer::start().await;
    mount_reader(&server, ResponseTemplate::new(500), 3).await;
    mount_crawler(&server, ResponseTemplate::new(500), 3).await;

    assert!(chain(&server).acquire(TARGET).await.is_none());
}

#[tokio::test]
async fn test_markup_is_purified() {
    let server = MockServer::start().await;
    let body = format!("![banner](https://cdn/x.png)\r\n<nav>Home</nav>\r\n\r\n---\r\n{}", article(10));
    mount_reader(&server, ResponseTemplate::new(200).set_body_string(body), 1).await;

    let acquirer = Acquirer::new(Client::new(), vec![Scraper::Reader { endpoint: server.uri() }], config());
    let text = acquirer.acquire(TARGET).await.unwrap();
    assert!(text.starts_with("Home\nParagraph 1"));
    assert!(!text.contains('\r'));
    assert!(!text.contains("banner"));
}

#[tokio::test]
async fn test_unreachable_provider_yields_none() {
    let acquirer = Acquirer::new(
        Client::new(),
        vec![Scraper::Reader { endpoint: "http://127.0.0.1:9".to_string() }],
        config(),
    );
    assert!(acquirer.acquire(TARGET).await.is_none());
}

#[tokio::test]
async fn test_length_floor_counts_chars_not_bytes() {
    // Two bytes per char: 499 chars is 998 bytes and still too short.
    let short = "é".repeat(MIN_ARTICLE_CHARS - 1);
    let server = MockServer::start().await;
    mount_reader(&server, ResponseTemplate::new(200).set_body_string(short), 1).await;
    mount_crawler(&server, ResponseTemplate::new(200).set_body_json(json!([{ "content": article(12) }])), 1).await;
    let text = chain(&server).acquire(TARGET).await.unwrap();
    assert!(text.starts_with("Paragraph 1"));

    let exact = "é".repeat(MIN_ARTICLE_CHARS);
    let server = MockServer::start().await;
    mount_reader(&server, ResponseTemplate::new(200).set_body_string(exact.clone()), 1).await;
    mount_crawler(&server, ResponseTemplate::new(200).set_body_json(json!([])), 0).await;
    assert_eq!(chain(&server).acquire(TARGET).await, Some(exact));
}
