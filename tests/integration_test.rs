//! Integration tests for the tag collector
//!
//! These run the full fetch -> render -> extract -> batch -> merge pipeline
//! against in-memory transports and a local mock server.

use async_trait::async_trait;
use httpmock::prelude::*;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tag_collector::{
    collector::{
        merge_records, BatchResources, FetchEngine, FetchStatus, FetchTarget, RawResponse,
        RenderError, Renderer, ReqwestTransport, TagCollector, Transport, TransportError,
    },
    config::CollectorConfig,
    table::Table,
};
use tempfile::TempDir;
use url::Url;

/// Routes by host; unknown hosts refuse the connection
#[derive(Default)]
struct MemoryTransport {
    pages: HashMap<String, RawResponse>,
    /// Hosts whose certificate fails verification
    bad_certs: Vec<String>,
    requests: Mutex<Vec<(String, bool)>>,
}

impl MemoryTransport {
    fn page(mut self, host: &str, html: &str) -> Self {
        self.pages
            .insert(host.to_string(), RawResponse::new(200, Some("text/html; charset=utf-8"), html.to_string()));
        self
    }

    fn response(mut self, host: &str, response: RawResponse) -> Self {
        self.pages.insert(host.to_string(), response);
        self
    }

    fn bad_cert(mut self, host: &str) -> Self {
        self.bad_certs.push(host.to_string());
        self
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn get(&self, url: &Url, verify_tls: bool) -> Result<RawResponse, TransportError> {
        let host = url.host_str().unwrap_or_default().to_string();
        self.requests.lock().unwrap().push((url.to_string(), verify_tls));

        if verify_tls && self.bad_certs.contains(&host) {
            return Err(TransportError::Tls("invalid peer certificate: UnknownIssuer".into()));
        }
        self.pages
            .get(&host)
            .cloned()
            .ok_or_else(|| TransportError::Connect(format!("connection refused: {}", host)))
    }
}

/// Never finishes rendering
struct HangingRenderer;

#[async_trait]
impl Renderer for HangingRenderer {
    async fn render(&self, _url: &Url, _html: &str) -> Result<String, RenderError> {
        std::future::pending::<()>().await;
        Ok(String::new())
    }
}

struct TestResources {
    transport: Arc<MemoryTransport>,
    hanging_renderer: bool,
    batches: AtomicUsize,
}

impl TestResources {
    fn new(transport: MemoryTransport) -> Arc<Self> {
        Arc::new(Self {
            transport: Arc::new(transport),
            hanging_renderer: false,
            batches: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl BatchResources for TestResources {
    fn transport(&self, _config: &CollectorConfig) -> Result<Arc<dyn Transport>, TransportError> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(self.transport.clone())
    }

    async fn renderer(&self, _config: &CollectorConfig) -> Option<Box<dyn Renderer>> {
        if self.hanging_renderer {
            Some(Box::new(HangingRenderer))
        } else {
            None
        }
    }
}

fn article(title: &str) -> String {
    format!(
        r#"<html><head><title>{title}</title><meta name="description" content="About {title}"></head>
        <body><nav><h2><a href="/">Home</a></h2></nav><h1>{title}</h1><div>Body of {title}</div></body></html>"#
    )
}

fn config(batch_size: usize) -> CollectorConfig {
    CollectorConfig {
        batch_size,
        concurrency: 16,
        ..CollectorConfig::default()
    }
}

#[test]
fn test_every_input_gets_one_record_in_order() {
    let mut transport = MemoryTransport::default();
    for i in 0..12 {
        transport = transport.page(&format!("site{}.example", i), &article(&format!("Site {}", i)));
    }
    let resources = TestResources::new(transport);

    // Good, unreachable and malformed URLs interleaved
    let urls: Vec<String> = (0..30)
        .map(|i| match i % 3 {
            0 => format!("site{}.example/page/{}", i % 12, i),
            1 => format!("https://unreachable{}.example/", i),
            _ => "http://".to_string(),
        })
        .collect();

    let collector = TagCollector::with_resources(config(7), resources.clone()).quiet(true);
    let collection = collector.collect(&urls).unwrap();

    assert_eq!(resources.batches.load(Ordering::SeqCst), 5);
    assert_eq!(collection.records.len(), urls.len());
    for (i, record) in collection.records.iter().enumerate() {
        assert_eq!(record.index, i);
        assert_eq!(record.url, urls[i]);
        match i % 3 {
            0 => {
                assert_eq!(record.http_response_code, 200);
                assert_eq!(record.html_title, format!("Site {}", i % 12));
                assert_eq!(record.url_path, format!("page/{}", i));
                assert_eq!(record.h2, "[]");
            }
            _ => {
                assert_eq!(record.http_response_code, -1);
                assert_eq!(record.html_title, "");
            }
        }
    }
    assert_eq!(collection.stats.ok + collection.stats.discarded + collection.stats.failed, 30);
}

#[test]
fn test_oversized_payload_is_discarded_but_recorded() {
    let mut huge = RawResponse::new(200, Some("text/html"), "<title>Huge</title>");
    huge.declared_length = Some(12_000_000);
    let resources = TestResources::new(MemoryTransport::default().response("big.example", huge));

    let collector = TagCollector::with_resources(config(200), resources).quiet(true);
    let records = collector
        .collect(&["https://big.example/reports/annual/".to_string()])
        .unwrap()
        .records;

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].http_response_code, 200);
    assert_eq!(records[0].url_path, "reports/annual");
    assert_eq!(records[0].html_title, "");
    assert_eq!(records[0].div_text, "");
}

#[test]
fn test_certificate_failure_retries_without_verification() {
    let resources = TestResources::new(
        MemoryTransport::default()
            .page("legacy.example", &article("Legacy"))
            .bad_cert("legacy.example"),
    );

    let collector = TagCollector::with_resources(config(200), resources.clone()).quiet(true);
    let records = collector.collect(&["legacy.example/about".to_string()]).unwrap().records;

    assert_eq!(records[0].html_title, "Legacy");
    assert_eq!(records[0].meta_description, "About Legacy");
    assert_eq!(records[0].root_page_title, "Legacy");
    let requests = resources.transport.requests.lock().unwrap();
    assert!(requests.contains(&("https://legacy.example/about".to_string(), true)));
    assert!(requests.contains(&("https://legacy.example/about".to_string(), false)));
}

#[test]
fn test_hanging_render_is_bounded_and_degrades() {
    let transport = MemoryTransport::default()
        .page("spa1.example", &article("First"))
        .page("spa2.example", &article("Second"));
    let resources = Arc::new(TestResources {
        transport: Arc::new(transport),
        hanging_renderer: true,
        batches: AtomicUsize::new(0),
    });
    let config = CollectorConfig {
        render_javascript: true,
        render_timeout_secs: 1,
        ..config(200)
    };

    let collector = TagCollector::with_resources(config, resources).quiet(true);
    let start = Instant::now();
    let collection = collector
        .collect(&["spa1.example".to_string(), "spa2.example".to_string()])
        .unwrap();
    let elapsed = start.elapsed();

    // One deadline per page, run one after another
    assert!(elapsed >= Duration::from_secs(2));
    assert!(elapsed < Duration::from_secs(10));
    assert_eq!(collection.stats.render_timeouts, 2);
    assert_eq!(collection.records[0].html_title, "First");
    assert_eq!(collection.records[1].html_title, "Second");
}

#[test]
fn test_duplicate_urls_merge_to_first_rows() {
    let resources = TestResources::new(
        MemoryTransport::default()
            .page("a.com", &article("A"))
            .page("b.com", &article("B")),
    );
    let input = Table::read_csv("url,label\na.com,news\na.com,blog\nb.com,shop\n".as_bytes()).unwrap();

    let collector = TagCollector::with_resources(config(200), resources).quiet(true);
    let collection = collector.collect(&input.urls().unwrap()).unwrap();
    let merged = merge_records(&input, &collection.records).unwrap();

    assert_eq!(merged.len(), 2);
    assert_eq!(merged.column("url").unwrap(), vec!["a.com", "b.com"]);
    assert_eq!(merged.column("label").unwrap(), vec!["news", "shop"]);
    assert_eq!(merged.column("html_title").unwrap(), vec!["A", "B"]);
    assert_eq!(merged.column("h1").unwrap(), vec![r#"["A"]"#, r#"["B"]"#]);

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out").join("labeled-source-text.csv");
    merged.write_csv_path(&path).unwrap();
    assert_eq!(Table::read_path(&path).unwrap(), merged);
}

#[tokio::test]
async fn test_reqwest_transport_against_mock_server() {
    let server = MockServer::start();
    let page = server.mock(|when, then| {
        when.method(GET).path("/about").header_exists("user-agent").header_exists("accept");
        then.status(200)
            .header("content-type", "text/html; charset=iso-8859-1")
            .body(b"<title>Caf\xe9</title>".as_slice());
    });
    server.mock(|when, then| {
        when.method(GET).path("/report.pdf");
        then.status(200).header("content-type", "application/pdf").body("%PDF-1.7");
    });
    server.mock(|when, then| {
        when.method(GET).path("/missing");
        then.status(404).header("content-type", "text/html").body("<title>Not found</title>");
    });
    server.mock(|when, then| {
        when.method(GET).path("/huge");
        then.status(200)
            .header("content-type", "text/html")
            .body(vec![b'a'; 12_000_000]);
    });

    let config = CollectorConfig::default();
    let transport = Arc::new(ReqwestTransport::new(&config).unwrap());
    let engine = FetchEngine::new(transport, &config);

    let ok = engine.fetch_one(&FetchTarget::new(0, server.url("/about"))).await;
    assert_eq!(ok.status, FetchStatus::Ok);
    assert_eq!(ok.body.as_deref(), Some("<title>Café</title>"));
    page.assert();

    let pdf = engine.fetch_one(&FetchTarget::new(1, server.url("/report.pdf"))).await;
    assert_eq!(pdf.status, FetchStatus::Discarded);
    assert_eq!(pdf.http_status, 200);

    let missing = engine.fetch_one(&FetchTarget::new(2, server.url("/missing"))).await;
    assert_eq!(missing.status, FetchStatus::Discarded);
    assert_eq!(missing.http_status, 404);

    let huge = engine.fetch_one(&FetchTarget::new(3, server.url("/huge"))).await;
    assert_eq!(huge.status, FetchStatus::Discarded);
    assert!(huge.body.is_none());
}

/// Serves one chunked response of `chunks` x `chunk_size` bytes with no
/// `Content-Length`, returning the URL to fetch
fn serve_chunked(chunks: usize, chunk_size: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }
        let head = "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n";
        if stream.write_all(head.as_bytes()).is_err() {
            return;
        }
        let chunk = vec![b'a'; chunk_size];
        for _ in 0..chunks {
            // The client hangs up once it has read past its cap
            if stream.write_all(format!("{:x}\r\n", chunk_size).as_bytes()).is_err()
                || stream.write_all(&chunk).is_err()
                || stream.write_all(b"\r\n").is_err()
            {
                return;
            }
        }
        let _ = stream.write_all(b"0\r\n\r\n");
    });
    format!("http://{}/stream", addr)
}

#[tokio::test]
async fn test_streamed_body_without_length_is_capped() {
    let config = CollectorConfig {
        max_body_bytes: 4096,
        ..CollectorConfig::default()
    };
    let url = serve_chunked(64, 512);
    let transport = Arc::new(ReqwestTransport::new(&config).unwrap());

    let raw = transport.get(&Url::parse(&url).unwrap(), true).await.unwrap();
    assert_eq!(raw.status, 200);
    assert_eq!(raw.declared_length, None);
    let read = raw.body.as_ref().map(|b| b.len()).unwrap_or_default();
    assert!(read > 4096, "read {} bytes", read);
    assert!(read <= 4096 + 512, "read {} bytes", read);

    let engine = FetchEngine::new(transport, &config);
    let outcome = engine.fetch_one(&FetchTarget::new(0, serve_chunked(64, 512))).await;
    assert_eq!(outcome.status, FetchStatus::Discarded);
    assert_eq!(outcome.http_status, 200);
    assert!(outcome.body.is_none());
}
