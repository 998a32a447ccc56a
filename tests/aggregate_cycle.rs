//! End-to-end fetch cycles through the real HTTP/file transport.
//!
//! HTTP sources are served by a local wiremock server, file sources are
//! written to a per-test directory under the system temp dir.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use feedmux::{
    aggregate, fetch, Client, Config, FetchOutcome, SchemaKind, SortOrder, Source, SourceError,
    SourceKind, Transport,
};
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn rss(prefix: &str, dates: &[&str]) -> String {
    let items: String = dates
        .iter()
        .enumerate()
        .map(|(i, date)| {
            format!(
                "<item><title>{prefix}-{i}</title><link>https://example.com/{prefix}/{i}</link><pubDate>{date}</pubDate></item>"
            )
        })
        .collect();
    format!(r#"<?xml version="1.0"?><rss version="2.0"><channel><title>{prefix}</title>{items}</channel></rss>"#)
}

const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>atom</title>
  <entry>
    <title>atom-0</title>
    <id>tag:example.com,2024:0</id>
    <summary></summary>
    <content>full text</content>
    <updated>2024-01-09T00:00:00Z</updated>
    <published>2024-01-04T12:00:00Z</published>
  </entry>
</feed>"#;

async fn serve(server: &MockServer, route: &str, body: String, delay: Duration) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("Content-Type", "application/rss+xml")
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

fn http(server: &MockServer, route: &str) -> Source {
    Source::new(format!("{}{}", server.uri(), route), route.trim_start_matches('/'), SourceKind::Http)
}

fn storage_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(name);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn titles(client: &Client) -> Vec<String> {
    client.feed().iter().map(|i| i.title.clone()).collect()
}

// ============================================================================
// Completeness and ordering
// ============================================================================

#[tokio::test]
async fn test_two_rss_sources_merge_descending() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/a",
        rss("a", &["Mon, 01 Jan 2024 00:00:00 GMT", "Wed, 03 Jan 2024 00:00:00 GMT", "Fri, 05 Jan 2024 00:00:00 GMT"]),
        Duration::ZERO,
    )
    .await;
    serve(
        &server,
        "/b",
        rss("b", &["Tue, 2 Jan 2024 00:00:00 GMT", "Thu, 4 Jan 2024 00:00:00 GMT", "Sat, 6 Jan 2024 00:00:00 GMT"]),
        Duration::ZERO,
    )
    .await;

    let mut client = Client::new(&Config::default()).unwrap();
    client.add_sources([http(&server, "/a"), http(&server, "/b")]);
    client.load_all().await;

    assert_eq!(client.feed().len(), 6);
    assert!(client.diagnostics().is_empty());
    assert_eq!(titles(&client), ["b-2", "a-2", "b-1", "a-1", "b-0", "a-0"]);
}

#[tokio::test]
async fn test_http_and_file_sources_with_both_schemas() {
    let server = MockServer::start().await;
    serve(&server, "/atom", ATOM.to_string(), Duration::ZERO).await;

    let dir = storage_dir("feedmux_it_mixed");
    std::fs::write(
        dir.join("local.xml"),
        rss("local", &["Tue, 02 Jan 2024 00:00:00 +0000"]),
    )
    .unwrap();

    let config = Config {
        storage_root: Some(dir.clone()),
        sort_order: SortOrder::Ascending,
        ..Config::default()
    };
    let mut client = Client::new(&config).unwrap();
    client.add_sources([http(&server, "/atom"), Source::guess("local.xml", "Local")]);
    client.load_all().await;

    let feed = client.feed();
    assert_eq!(feed.len(), 2);
    assert_eq!(feed.items()[0].title, "local-0");
    assert_eq!(feed.items()[0].schema, SchemaKind::RssV2);
    assert_eq!(feed.items()[0].source().unwrap().title, "Local");

    let atom = &feed.items()[1];
    assert_eq!(atom.schema, SchemaKind::Atom);
    assert_eq!(atom.content, "full text");
    assert_eq!(atom.link, "tag:example.com,2024:0");
    assert_eq!(atom.date.unwrap().to_rfc3339(), "2024-01-04T12:00:00+00:00");

    std::fs::remove_dir_all(&dir).ok();
}

// ============================================================================
// Partial failure
// ============================================================================

#[tokio::test]
async fn test_unresponsive_source_cut_off_at_deadline() {
    let server = MockServer::start().await;
    serve(&server, "/one", rss("one", &["Mon, 01 Jan 2024 00:00:00 GMT"]), Duration::ZERO).await;
    serve(&server, "/two", rss("two", &["Tue, 02 Jan 2024 00:00:00 GMT"]), Duration::from_millis(100)).await;
    serve(&server, "/stuck", rss("stuck", &["Wed, 03 Jan 2024 00:00:00 GMT"]), Duration::from_secs(30)).await;

    let mut client = Client::new(&Config::default()).unwrap();
    client.add_sources([http(&server, "/one"), http(&server, "/stuck"), http(&server, "/two")]);

    let started = Instant::now();
    client.load_all().await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(3), "returned early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(6), "returned late: {elapsed:?}");
    assert_eq!(titles(&client), ["two-0", "one-0"]);

    let diagnostics = client.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].source.title, "stuck");
    assert_eq!(diagnostics[0].error, SourceError::FetchTimeout);
}

#[tokio::test]
async fn test_failures_reported_once_per_source() {
    let server = MockServer::start().await;
    serve(&server, "/good", rss("good", &["Mon, 01 Jan 2024 00:00:00 GMT"]), Duration::ZERO).await;
    serve(&server, "/broken", "<rss><channel><item>".to_string(), Duration::ZERO).await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = storage_dir("feedmux_it_failures");
    std::fs::write(dir.join("ok.xml"), rss("file", &["Tue, 02 Jan 2024 00:00:00 GMT"])).unwrap();

    let config = Config {
        storage_root: Some(dir.clone()),
        ..Config::default()
    };
    let mut client = Client::new(&config).unwrap();
    client.add_sources([
        http(&server, "/good"),
        http(&server, "/broken"),
        http(&server, "/gone"),
        Source::guess("ok.xml", "ok.xml"),
        Source::guess("missing.xml", "missing.xml"),
    ]);
    client.load_all().await;

    assert_eq!(titles(&client), ["file-0", "good-0"]);

    let reported: Vec<_> = client
        .diagnostics()
        .iter()
        .map(|d| (d.source.title.as_str(), std::mem::discriminant(&d.error)))
        .collect();
    assert_eq!(
        reported,
        [
            ("broken", std::mem::discriminant(&SourceError::DocumentParse(String::new()))),
            ("gone", std::mem::discriminant(&SourceError::FetchIo(String::new()))),
            ("missing.xml", std::mem::discriminant(&SourceError::FetchIo(String::new()))),
        ]
    );

    std::fs::remove_dir_all(&dir).ok();
}

// ============================================================================
// Determinism
// ============================================================================

#[tokio::test]
async fn test_order_independent_of_completion_order() {
    let same_day = "Mon, 01 Jan 2024 00:00:00 GMT";
    let server = MockServer::start().await;
    // First source finishes last, last source finishes first.
    serve(&server, "/x", rss("x", &[same_day, same_day]), Duration::from_millis(400)).await;
    serve(&server, "/y", rss("y", &[same_day]), Duration::from_millis(200)).await;
    serve(&server, "/z", rss("z", &[same_day]), Duration::ZERO).await;

    let sources: Vec<Arc<Source>> = ["/x", "/y", "/z"]
        .iter()
        .map(|route| Arc::new(http(&server, route)))
        .collect();
    let retriever = Arc::new(Transport::new(".", feedmux::feed::MAX_FEED_SIZE).unwrap());

    let mut runs = Vec::new();
    for _ in 0..2 {
        let outcomes = fetch(retriever.clone(), &sources, Duration::from_secs(5)).await;
        assert!(outcomes.iter().all(|o| matches!(o, FetchOutcome::Bytes(_))));

        let result = aggregate(sources.iter().cloned().zip(outcomes), SortOrder::Ascending);
        let order: Vec<_> = result.feed.iter().map(|i| i.title.clone()).collect();
        runs.push(order);
    }

    assert_eq!(runs[0], ["x-0", "x-1", "y-0", "z-0"]);
    assert_eq!(runs[0], runs[1]);
}

#[tokio::test]
async fn test_sort_feed_reverses_exactly() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/a",
        rss("a", &["Mon, 01 Jan 2024 00:00:00 GMT", "Mon, 01 Jan 2024 00:00:00 GMT", "Tue, 02 Jan 2024 00:00:00 GMT"]),
        Duration::ZERO,
    )
    .await;
    serve(&server, "/b", rss("b", &["Mon, 01 Jan 2024 00:00:00 GMT", "not a date"]), Duration::ZERO).await;

    let mut client = Client::new(&Config::default()).unwrap();
    client.add_sources([http(&server, "/a"), http(&server, "/b")]);
    client.load_all().await;

    client.sort_feed(SortOrder::Ascending);
    let ascending = titles(&client);
    assert_eq!(ascending, ["b-1", "a-0", "a-1", "b-0", "a-2"]);

    client.sort_feed(SortOrder::Descending);
    let mut reversed = ascending.clone();
    reversed.reverse();
    assert_eq!(titles(&client), reversed);

    client.sort_feed(SortOrder::Ascending);
    assert_eq!(titles(&client), ascending);
}
