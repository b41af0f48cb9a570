//! End-to-end engine runs against a mock WordPress site.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use pdf_mirror_core::parser::{HtmlLinkExtractor, Link, LinkExtractor, ParseError};
use pdf_mirror_core::{EngineError, HttpClient, MirrorConfig, MirrorEngine, PostRecord};
use serde_json::{Value, json};
use tempfile::TempDir;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer, output: &Path) -> MirrorConfig {
    let mut config = MirrorConfig::new(server.uri());
    config.output_dir = output.to_path_buf();
    config.retries = 1;
    config.retry_backoff = Duration::ZERO;
    config
}

fn client_for(config: &MirrorConfig) -> HttpClient {
    HttpClient::new(&config.client_settings()).expect("client should build")
}

async fn mount_collection(server: &MockServer, endpoint: &str, items: Value) {
    Mock::given(method("GET"))
        .and(path(endpoint))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(items))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(endpoint))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

async fn mount_pdf(server: &MockServer, file: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!("/files/{file}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

#[derive(Debug)]
struct CapturedEvent {
    level: Level,
    fields: HashMap<String, String>,
}

#[derive(Default)]
struct EventFieldVisitor {
    fields: HashMap<String, String>,
}

impl Visit for EventFieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields
            .insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.fields
            .insert(field.name().to_string(), format!("{value:?}"));
    }
}

#[derive(Clone)]
struct EventCaptureLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl<S> Layer<S> for EventCaptureLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = EventFieldVisitor::default();
        event.record(&mut visitor);
        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            fields: visitor.fields,
        });
    }
}

fn read_record(dir: &Path) -> PostRecord {
    let raw = std::fs::read_to_string(dir.join("metadata.json")).expect("metadata.json exists");
    serde_json::from_str(&raw).expect("metadata.json parses")
}

#[tokio::test]
async fn test_duplicate_links_collapse_into_one_record_entry() {
    let server = MockServer::start().await;
    mount_collection(
        &server,
        "/wp-json/wp/v2/categories",
        json!([{"id": 3, "name": "Reports &amp; Data"}]),
    )
    .await;
    mount_collection(
        &server,
        "/wp-json/wp/v2/posts",
        json!([{
            "id": 7,
            "date": "2024-04-02T10:00:00",
            "title": {"rendered": "Q1 Report &lt;2024&gt;"},
            "content": {"rendered": "<p><a href=\"/files/q1.pdf\">Quarterly results</a></p><p>Again: <a href=\"/files/q1.pdf\">here</a></p>"},
            "categories": [3, 42]
        }]),
    )
    .await;
    mount_pdf(&server, "q1.pdf", b"%PDF-q1").await;

    let output = TempDir::new().unwrap();
    let config = config_for(&server, output.path());
    let engine = MirrorEngine::new(&config).unwrap();

    let summary = engine.run(&client_for(&config)).await.unwrap();

    assert_eq!(summary.processed(), 1);
    assert!(summary.failed.is_empty());

    let post_dir = output.path().join("Q1 Report -2024-");
    assert!(post_dir.is_dir(), "sanitized directory should exist");

    let record = read_record(&post_dir);
    assert_eq!(record, summary.records[0]);
    assert_eq!(record.post_id, 7);
    assert_eq!(record.post_title, "Q1 Report <2024>");
    assert_eq!(record.date, "2024-04-02T10:00:00");
    assert_eq!(record.category_ids, vec![3, 42]);
    assert_eq!(
        record.category_names,
        vec!["Reports & Data".to_string(), String::new()]
    );
    assert_eq!(record.pdfs.len(), 1);

    let pdf = &record.pdfs[0];
    assert_eq!(pdf.url, format!("{}/files/q1.pdf", server.uri()));
    assert_eq!(pdf.link_text, "Quarterly results");
    assert_eq!(pdf.file_name, "Quarterly results.pdf");
    assert!(pdf.downloaded);
    assert_eq!(pdf.error, "");
    assert_eq!(
        std::fs::read(post_dir.join("Quarterly results.pdf")).unwrap(),
        b"%PDF-q1"
    );
}

/// Fails extraction for any post whose content carries a marker.
struct FailOnMarker;

impl LinkExtractor for FailOnMarker {
    fn extract(&self, html: &str, base_url: &str) -> Result<Vec<Link>, ParseError> {
        if html.contains("data-broken") {
            return Err(ParseError::malformed("unparseable fragment"));
        }
        HtmlLinkExtractor.extract(html, base_url)
    }
}

#[tokio::test]
async fn test_failing_post_is_isolated_from_the_rest() {
    let server = MockServer::start().await;
    mount_collection(&server, "/wp-json/wp/v2/categories", json!([])).await;
    mount_collection(
        &server,
        "/wp-json/wp/v2/posts",
        json!([
            {"id": 1, "title": {"rendered": "First"}, "content": {"rendered": "<a href=\"/files/one.pdf\">One</a>"}},
            {"id": 2, "title": {"rendered": "Second"}, "content": {"rendered": "<div data-broken><a href=\"/files/two.pdf\">Two</a></div>"}},
            {"id": 3, "title": {"rendered": "Third"}, "content": {"rendered": "<a href=\"/files/three.pdf\">Three</a>"}}
        ]),
    )
    .await;
    mount_pdf(&server, "one.pdf", b"1").await;
    mount_pdf(&server, "three.pdf", b"3").await;

    let output = TempDir::new().unwrap();
    let config = config_for(&server, output.path());
    let engine = MirrorEngine::new(&config)
        .unwrap()
        .with_link_extractor(FailOnMarker);

    let events = Arc::new(Mutex::new(Vec::<CapturedEvent>::new()));
    let subscriber = tracing_subscriber::registry()
        .with(LevelFilter::WARN)
        .with(EventCaptureLayer {
            events: Arc::clone(&events),
        });
    let guard = tracing::subscriber::set_default(subscriber);
    // Callsites cached as disabled by other tests must see this subscriber.
    tracing::callsite::rebuild_interest_cache();

    let summary = engine.run(&client_for(&config)).await.unwrap();
    drop(guard);

    let mut processed: Vec<u64> = summary.records.iter().map(|r| r.post_id).collect();
    processed.sort_unstable();
    assert_eq!(processed, vec![1, 3]);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].post_id, Some(2));
    assert!(summary.failed[0].reason.contains("unparseable fragment"));

    assert!(output.path().join("First/metadata.json").exists());
    assert!(output.path().join("Third/metadata.json").exists());
    assert!(!output.path().join("Second").exists());

    let events = events.lock().unwrap();
    let failures: Vec<&CapturedEvent> = events
        .iter()
        .filter(|event| {
            event.fields.get("message").map(String::as_str) == Some("post failed")
        })
        .collect();
    assert_eq!(failures.len(), 1, "captured: {events:?}");
    assert_eq!(failures[0].level, Level::WARN);
    assert_eq!(
        failures[0].fields.get("post_id").map(String::as_str),
        Some("Some(2)")
    );

    let stats = engine.stats();
    assert_eq!(stats.posts_total(), 3);
    assert_eq!(stats.posts_finished(), 2);
    assert_eq!(stats.posts_failed(), 1);
    assert_eq!(stats.pdfs_downloaded(), 2);
}

#[tokio::test]
async fn test_failed_download_is_recorded_not_fatal() {
    let server = MockServer::start().await;
    mount_collection(&server, "/wp-json/wp/v2/categories", json!([])).await;
    mount_collection(
        &server,
        "/wp-json/wp/v2/posts",
        json!([{
            "id": 5,
            "title": {"rendered": "Mixed"},
            "content": {"rendered": "<a href=\"/files/missing.pdf\">Gone</a><a href=\"/files/ok.pdf\"></a>"}
        }]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/files/missing.pdf"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    mount_pdf(&server, "ok.pdf", b"ok").await;

    let output = TempDir::new().unwrap();
    let config = config_for(&server, output.path());
    let summary = MirrorEngine::new(&config)
        .unwrap()
        .run(&client_for(&config))
        .await
        .unwrap();

    let record = read_record(&output.path().join("Mixed"));
    assert_eq!(record, summary.records[0]);
    assert_eq!(record.pdfs.len(), 2);

    assert_eq!(record.pdfs[0].file_name, "Gone.pdf");
    assert!(!record.pdfs[0].downloaded);
    assert!(record.pdfs[0].error.contains("404"));
    assert!(!output.path().join("Mixed/Gone.pdf").exists());

    // Empty link text falls back to the URL's last segment.
    assert_eq!(record.pdfs[1].file_name, "ok.pdf");
    assert!(record.pdfs[1].downloaded);
    assert_eq!(summary.pdfs_failed(), 1);
}

#[tokio::test]
async fn test_posts_with_same_title_get_distinct_directories() {
    let server = MockServer::start().await;
    mount_collection(&server, "/wp-json/wp/v2/categories", json!([])).await;
    mount_collection(
        &server,
        "/wp-json/wp/v2/posts",
        json!([
            {"id": 10, "title": {"rendered": "Minutes"}, "content": {"rendered": ""}},
            {"id": 11, "title": {"rendered": "Minutes"}, "content": {"rendered": ""}},
            {"id": 12, "title": {"rendered": "   "}, "content": {"rendered": ""}}
        ]),
    )
    .await;

    let output = TempDir::new().unwrap();
    let mut config = config_for(&server, output.path());
    config.max_concurrent_posts = 1;

    let summary = MirrorEngine::new(&config)
        .unwrap()
        .run(&client_for(&config))
        .await
        .unwrap();

    assert_eq!(summary.processed(), 3);
    assert_eq!(read_record(&output.path().join("Minutes")).post_id, 10);
    assert_eq!(read_record(&output.path().join("Minutes-11")).post_id, 11);
    assert_eq!(read_record(&output.path().join("post-12")).post_id, 12);
}

#[tokio::test]
async fn test_download_slots_bound_transfers_across_posts() {
    let server = MockServer::start().await;
    mount_collection(&server, "/wp-json/wp/v2/categories", json!([])).await;
    let posts: Vec<Value> = (1..=4)
        .map(|id| {
            json!({
                "id": id,
                "title": {"rendered": format!("Post {id}")},
                "content": {"rendered": format!("<a href=\"/files/{id}.pdf\">doc</a>")}
            })
        })
        .collect();
    mount_collection(&server, "/wp-json/wp/v2/posts", Value::Array(posts)).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/files/\d\.pdf$"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"pdf".to_vec())
                .set_delay(Duration::from_millis(250)),
        )
        .expect(4)
        .mount(&server)
        .await;

    let output = TempDir::new().unwrap();
    let mut config = config_for(&server, output.path());
    config.max_concurrent_posts = 4;
    config.max_concurrent_downloads = 1;

    let engine = MirrorEngine::new(&config).unwrap();
    let client = client_for(&config);
    let started = Instant::now();
    let summary = engine.run(&client).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(summary.processed(), 4);
    assert_eq!(summary.pdfs_downloaded(), 4);
    assert!(
        elapsed >= Duration::from_millis(1000),
        "one download slot should serialize transfers, took {elapsed:?}"
    );
}

/// Mounts three single-link posts whose PDFs each answer after 250ms.
async fn mount_slow_posts(server: &MockServer) {
    mount_collection(server, "/wp-json/wp/v2/categories", json!([])).await;
    let posts: Vec<Value> = (1..=3)
        .map(|id| {
            json!({
                "id": id,
                "title": {"rendered": format!("Slow {id}")},
                "content": {"rendered": format!("<a href=\"/files/{id}.pdf\">doc</a>")}
            })
        })
        .collect();
    mount_collection(server, "/wp-json/wp/v2/posts", Value::Array(posts)).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/files/\d\.pdf$"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"pdf".to_vec())
                .set_delay(Duration::from_millis(250)),
        )
        .mount(server)
        .await;
}

async fn timed_run(server: &MockServer, max_concurrent_posts: usize) -> Duration {
    let output = TempDir::new().unwrap();
    let mut config = config_for(server, output.path());
    config.max_concurrent_posts = max_concurrent_posts;
    config.max_concurrent_downloads = 4;

    let engine = MirrorEngine::new(&config).unwrap();
    let client = client_for(&config);
    let started = Instant::now();
    let summary = engine.run(&client).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(summary.processed(), 3);
    assert_eq!(summary.pdfs_downloaded(), 3);
    elapsed
}

#[tokio::test]
async fn test_post_slots_bound_posts_in_flight() {
    let server = MockServer::start().await;
    mount_slow_posts(&server).await;

    let serial = timed_run(&server, 1).await;
    assert!(
        serial >= Duration::from_millis(750),
        "one post slot should serialize posts, took {serial:?}"
    );

    let parallel = timed_run(&server, 3).await;
    assert!(
        parallel * 2 < serial,
        "three post slots should overlap posts, took {parallel:?} vs {serial:?}"
    );
}

#[tokio::test]
async fn test_listing_failure_aborts_run() {
    let server = MockServer::start().await;
    mount_collection(&server, "/wp-json/wp/v2/categories", json!([])).await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/posts"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let output = TempDir::new().unwrap();
    let config = config_for(&server, output.path());

    let error = MirrorEngine::new(&config)
        .unwrap()
        .run(&client_for(&config))
        .await
        .unwrap_err();

    assert!(matches!(error, EngineError::Collection(_)), "got {error:?}");
}

#[tokio::test]
async fn test_output_root_that_is_a_file_is_fatal() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    let blocked = temp.path().join("not-a-dir");
    std::fs::write(&blocked, b"file").unwrap();

    let config = config_for(&server, &blocked);
    let error = MirrorEngine::new(&config)
        .unwrap()
        .run(&client_for(&config))
        .await
        .unwrap_err();

    assert!(matches!(error, EngineError::OutputDir { .. }), "got {error:?}");
}
