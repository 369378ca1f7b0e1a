//! End-to-end uploads over HTTP against a local fake submit-chunk endpoint.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use pwx_xfer_client::{
    HttpTransport, MemorySource, TransportError, UploadConfig, UploadError, UploadSession,
};
use tokio_util::sync::CancellationToken;
use xfer_seal::open_chunks;
use xfer_types::{ContentRange, ErrorKind, SessionMetadata};

const CHUNK: u64 = 4 * 1024;
const SERVER_FILE_ID: &str = "srv-7f3a";

/// What the fake endpoint saw for one request.
#[derive(Debug, Clone)]
struct Received {
    fields: HashMap<String, String>,
    content_range: Option<String>,
    file_name: Option<String>,
    payload: Vec<u8>,
}

impl Received {
    fn index(&self) -> u32 {
        self.fields["currentChunk"].parse().unwrap()
    }
}

#[derive(Debug, Clone, Copy)]
enum Behavior {
    Normal,
    Status(u16),
    Garbage,
    Slow(Duration),
}

#[derive(Clone)]
struct Endpoint {
    behavior: Behavior,
    received: Arc<Mutex<Vec<Received>>>,
}

async fn submit_chunk(
    State(endpoint): State<Endpoint>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> (StatusCode, String) {
    let mut received = Received {
        fields: HashMap::new(),
        content_range: headers
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        file_name: None,
        payload: Vec::new(),
    };

    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            received.file_name = field.file_name().map(str::to_string);
            received.payload = field.bytes().await.unwrap().to_vec();
        } else {
            received.fields.insert(name, field.text().await.unwrap());
        }
    }

    let index = received.index();
    let total: u32 = received.fields["totalChunks"].parse().unwrap();
    endpoint.received.lock().unwrap().push(received);

    match endpoint.behavior {
        Behavior::Status(code) => {
            return (
                StatusCode::from_u16(code).unwrap(),
                "upstream unavailable".to_string(),
            )
        }
        Behavior::Garbage => return (StatusCode::OK, "<html>oops</html>".to_string()),
        Behavior::Slow(delay) => tokio::time::sleep(delay).await,
        Behavior::Normal => {}
    }

    let body = if index == total {
        serde_json::json!({
            "fileID": SERVER_FILE_ID,
            "URL": format!("https://pwx.test/d/{SERVER_FILE_ID}"),
        })
    } else {
        serde_json::json!({ "fileID": SERVER_FILE_ID })
    };
    (StatusCode::OK, body.to_string())
}

async fn spawn_endpoint(behavior: Behavior) -> (SocketAddr, Arc<Mutex<Vec<Received>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/upload", post(submit_chunk))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .with_state(Endpoint {
            behavior,
            received: Arc::clone(&received),
        });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, received)
}

fn sample(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

#[tokio::test]
async fn uploads_sealed_chunks_over_http() {
    let (addr, received) = spawn_endpoint(Behavior::Normal).await;
    let data = sample(10 * 1024);
    let metadata = SessionMetadata::from_pairs([
        ("firstname", "Grace"),
        ("other_email", "bob@example.com"),
        ("form_message", "the quarterly numbers"),
    ])
    .unwrap();

    let transport = HttpTransport::new(format!("http://{addr}/upload")).unwrap();
    let config = UploadConfig::default()
        .with_chunk_size(CHUNK)
        .with_file_name("numbers.xlsx")
        .with_metadata(metadata);
    let mut session = UploadSession::new(MemorySource::new(data.clone()), transport, config);
    let progress = session.progress();

    let outcome = session.run(CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.file_id.as_str(), SERVER_FILE_ID);
    assert_eq!(outcome.url, "https://pwx.test/d/srv-7f3a");
    let share = outcome.share_url();
    let (base, fragment) = share.split_once('#').unwrap();
    assert_eq!(base, outcome.url);
    assert_eq!(fragment, outcome.key.to_fragment());
    assert_eq!(*progress.borrow(), 1.0);

    let mut requests = received.lock().unwrap().clone();
    assert_eq!(requests.len(), 3);
    // First chunk arrives alone, final chunk last
    assert_eq!(requests[0].index(), 1);
    assert_eq!(requests[2].index(), 3);
    requests.sort_by_key(Received::index);

    let first = &requests[0];
    assert_eq!(first.fields.get("firstname").map(String::as_str), Some("Grace"));
    assert_eq!(
        first.fields.get("form_message").map(String::as_str),
        Some("the quarterly numbers")
    );
    assert!(!first.fields.contains_key("fileID"));

    for later in &requests[1..] {
        assert_eq!(later.fields["fileID"], SERVER_FILE_ID);
        assert!(!later.fields.contains_key("firstname"));
    }

    for request in &requests {
        assert_eq!(request.fields["totalChunks"], "3");
        assert_eq!(request.file_name.as_deref(), Some("numbers.xlsx"));
    }

    let ranges: Vec<ContentRange> = requests
        .iter()
        .map(|r| ContentRange::parse(r.content_range.as_deref().unwrap()).unwrap())
        .collect();
    assert_eq!(
        requests[0].content_range.as_deref(),
        Some("bytes 0-4095/10240")
    );
    assert_eq!(ranges[1].start, 4096);
    assert_eq!(ranges[2].end, 10240);
    assert!(ranges.iter().all(|r| r.total == 10240));

    let payloads: Vec<&[u8]> = requests.iter().map(|r| r.payload.as_slice()).collect();
    assert_eq!(open_chunks(&outcome.key, &payloads).unwrap(), data);
}

#[tokio::test]
async fn server_error_fails_the_upload() {
    let (addr, received) = spawn_endpoint(Behavior::Status(503)).await;
    let transport = HttpTransport::new(format!("http://{addr}/upload")).unwrap();
    let mut session = UploadSession::new(
        MemorySource::new(sample(9000)),
        transport,
        UploadConfig::default().with_chunk_size(CHUNK),
    );

    let err = session.run(CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Network);
    assert!(matches!(
        err,
        UploadError::Transport {
            index: 1,
            source: TransportError::Status { status: 503, .. }
        }
    ));
    assert_eq!(received.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn unparsable_response_is_protocol_violation() {
    let (addr, _) = spawn_endpoint(Behavior::Garbage).await;
    let transport = HttpTransport::new(format!("http://{addr}/upload")).unwrap();
    let mut session = UploadSession::new(
        MemorySource::new(b"tiny".to_vec()),
        transport,
        UploadConfig::default(),
    );

    let err = session.run(CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
    assert!(matches!(
        err,
        UploadError::Transport {
            source: TransportError::ProtocolViolation(_),
            ..
        }
    ));
}

#[tokio::test]
async fn slow_endpoint_times_out() {
    let (addr, _) = spawn_endpoint(Behavior::Slow(Duration::from_secs(5))).await;
    let transport = HttpTransport::new(format!("http://{addr}/upload"))
        .unwrap()
        .with_timeout(Duration::from_millis(200));
    let mut session = UploadSession::new(
        MemorySource::new(b"tiny".to_vec()),
        transport,
        UploadConfig::default(),
    );

    let err = session.run(CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Network);
    assert!(matches!(
        err,
        UploadError::Transport {
            source: TransportError::Timeout(_),
            ..
        }
    ));
}
