//! Integration tests for the scrape tool against fake article pages

use news_agent::config::ScrapeSection;
use news_agent::tools::builtin::ScrapeWebsiteTool;
use news_agent::tools::{Tool, ToolError};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ARTICLE_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>Rust 2.0 Announced</title></head>
<body>
    <nav>Home | World | Tech</nav>
    <article>
        <h1>Rust 2.0 Announced</h1>
        <p>The Rust project announced a new edition today, focusing on async ergonomics and compile times.</p>
        <p>Maintainers said the release follows two years of community consultation and testing.</p>
        <p>Existing crates will keep compiling thanks to the edition mechanism.</p>
    </article>
    <script>trackVisitor();</script>
</body>
</html>"#;

#[tokio::test(flavor = "multi_thread")]
async fn test_scrape_extracts_article_text() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/news/rust"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string(ARTICLE_HTML),
        )
        .mount(&mock_server)
        .await;

    let tool = ScrapeWebsiteTool::new(&ScrapeSection::default()).unwrap();
    let url = format!("{}/news/rust", mock_server.uri());
    let result = tool.execute(&json!({"url": url})).await.unwrap();

    assert_eq!(result["title"], "Rust 2.0 Announced");
    let content = result["content"].as_str().unwrap();
    assert!(content.contains("async ergonomics"));
    assert!(!content.contains("trackVisitor"));
    assert!(!content.contains("<p>"));
    assert_eq!(result["truncated"], false);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_scrape_truncates_long_content() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/long"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ARTICLE_HTML))
        .mount(&mock_server)
        .await;

    let section = ScrapeSection {
        max_content_chars: 40,
        ..Default::default()
    };
    let tool = ScrapeWebsiteTool::new(&section).unwrap();
    let result = tool
        .execute(&json!({"url": format!("{}/long", mock_server.uri())}))
        .await
        .unwrap();

    assert_eq!(result["content"].as_str().unwrap().chars().count(), 40);
    assert_eq!(result["truncated"], true);
}

#[tokio::test]
async fn test_scrape_rejects_oversized_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/huge"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(4096)))
        .mount(&mock_server)
        .await;

    let section = ScrapeSection {
        max_response_size: 1024,
        ..Default::default()
    };
    let tool = ScrapeWebsiteTool::new(&section).unwrap();
    let error = tool
        .execute(&json!({"url": format!("{}/huge", mock_server.uri())}))
        .await
        .unwrap_err();

    assert!(matches!(error, ToolError::ExecutionError(ref m) if m.contains("too large")));
}

#[tokio::test]
async fn test_scrape_stops_reading_body_without_content_length() {
    // Serves a body with no Content-Length, one 1 KiB chunk at a time,
    // until the client hangs up
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let chunks_sent = Arc::new(AtomicUsize::new(0));
    let sent = Arc::clone(&chunks_sent);

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 1024];
        let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut request).await;
        socket
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: text/html\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();
        let chunk = vec![b'x'; 1024];
        for _ in 0..1024 {
            if socket.write_all(&chunk).await.is_err() || socket.flush().await.is_err() {
                break;
            }
            sent.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
        }
    });

    let section = ScrapeSection {
        max_response_size: 4096,
        ..Default::default()
    };
    let tool = ScrapeWebsiteTool::new(&section).unwrap();
    let error = tool
        .execute(&json!({"url": format!("http://{addr}/stream")}))
        .await
        .unwrap_err();

    assert!(matches!(error, ToolError::ExecutionError(ref m) if m.contains("too large")));
    // The whole megabyte was never needed to reject the page
    assert!(chunks_sent.load(Ordering::SeqCst) < 1024);
}

#[tokio::test]
async fn test_scrape_reports_http_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let tool = ScrapeWebsiteTool::new(&ScrapeSection::default()).unwrap();
    let error = tool
        .execute(&json!({"url": format!("{}/missing", mock_server.uri())}))
        .await
        .unwrap_err();

    assert!(matches!(error, ToolError::ExecutionError(ref m) if m.contains("404")));
}

#[tokio::test]
async fn test_scrape_rejects_non_http_urls() {
    let tool = ScrapeWebsiteTool::new(&ScrapeSection::default()).unwrap();

    for url in ["file:///etc/hosts", "ftp://files.example/a", "not a url"] {
        let result = tool.execute(&json!({"url": url})).await;
        assert!(
            matches!(result, Err(ToolError::ExecutionError(_))),
            "expected rejection for {url}"
        );
    }
}
