use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use aria2_host::{EngineClient, Gid, TaskStatus};

/// A request as the fake engine saw it
#[derive(Debug, Clone)]
struct Recorded {
    request_line: String,
    headers: Vec<(String, String)>,
    body: Value,
}

impl Recorded {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

type Handler = fn(&Value) -> (u16, Option<Value>);

async fn read_request(stream: &mut TcpStream) -> (String, Vec<(String, String)>, Vec<u8>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before headers");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8(buf[..header_end].to_vec()).unwrap();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let length: usize = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .map(|(_, v)| v.parse().unwrap())
        .unwrap_or(0);

    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < length {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before body");
        body.extend_from_slice(&chunk[..n]);
    }
    (request_line, headers, body)
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// Minimal HTTP/1.1 engine stand-in answering with `handler`
async fn start_engine(handler: Handler) -> (SocketAddr, Arc<Mutex<Vec<Recorded>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let recorded = Arc::new(Mutex::new(Vec::new()));
    let log = recorded.clone();

    tokio::spawn(async move {
        loop {
            let (mut stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let log = log.clone();
            tokio::spawn(async move {
                let (request_line, headers, body) = read_request(&mut stream).await;
                let body: Value = serde_json::from_slice(&body).unwrap();
                let (status, reply) = handler(&body);
                log.lock().unwrap().push(Recorded {
                    request_line,
                    headers,
                    body,
                });

                let payload = reply.map(|v| v.to_string()).unwrap_or_default();
                let response = format!(
                    "HTTP/1.1 {} {}\r\nContent-Type: application/json-rpc\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    reason(status),
                    payload.len(),
                    payload
                );
                stream.write_all(response.as_bytes()).await.unwrap();
                stream.shutdown().await.ok();
            });
        }
    });

    (addr, recorded)
}

fn client_for(addr: SocketAddr, secret: &str) -> EngineClient {
    EngineClient::connect(&format!("http://{}/", addr), secret, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_request_wire_format() {
    let (addr, recorded) = start_engine(|req| {
        (
            200,
            Some(json!({
                "jsonrpc": "2.0",
                "id": req["id"],
                "result": {"version": "1.37.0", "enabledFeatures": ["BitTorrent", "Metalink"]}
            })),
        )
    })
    .await;

    let client = client_for(addr, "s3cret");
    let version = client.get_version().await.unwrap();
    assert_eq!(version.version, "1.37.0");
    assert_eq!(version.enabled_features, vec!["BitTorrent", "Metalink"]);

    let recorded = recorded.lock().unwrap();
    assert_eq!(recorded.len(), 1);
    let req = &recorded[0];
    assert!(req.request_line.starts_with("POST /jsonrpc "));
    assert_eq!(req.header("content-type"), Some("application/json"));
    let length: usize = req.header("content-length").unwrap().parse().unwrap();
    assert_eq!(length, req.body.to_string().len());

    assert_eq!(req.body["jsonrpc"], "2.0");
    assert!(req.body["id"].is_string());
    assert_eq!(req.body["method"], "aria2.getVersion");
    assert_eq!(req.body["params"], json!(["token:s3cret"]));
}

#[tokio::test]
async fn test_status_decoding_over_http() {
    let (addr, _) = start_engine(|req| {
        (
            200,
            Some(json!({
                "jsonrpc": "2.0",
                "id": req["id"],
                "result": {
                    "gid": "2089b05ecca3d829",
                    "status": "active",
                    "totalLength": "1048576",
                    "completedLength": "524288",
                    "downloadSpeed": "2048",
                    "followedBy": ["000000000000000a"]
                }
            })),
        )
    })
    .await;

    let client = client_for(addr, "s3cret");
    let gid = Gid::new(0x2089b05ecca3d829);
    let snapshot = client.tell_status(gid, None).await.unwrap();
    assert_eq!(snapshot.gid, Some(gid));
    assert_eq!(snapshot.status, TaskStatus::Active);
    assert_eq!(snapshot.progress(), 0.5);
    assert_eq!(snapshot.followed_by(), &[Gid::new(10)]);
}

#[tokio::test]
async fn test_error_status_carries_protocol_error() {
    let (addr, recorded) = start_engine(|req| {
        (
            400,
            Some(json!({
                "jsonrpc": "2.0",
                "id": req["id"],
                "error": {"code": 1, "message": "GID 000000000000002a is not found"}
            })),
        )
    })
    .await;

    let client = client_for(addr, "s3cret");
    let err = client.pause(Gid::new(42)).await.unwrap_err();
    assert!(err.is_protocol());
    assert_eq!(err.code(), Some(1));
    assert!(!client.is_closed());

    let recorded = recorded.lock().unwrap();
    assert_eq!(recorded[0].body["params"], json!(["token:s3cret", "000000000000002a"]));
}

#[tokio::test]
async fn test_empty_error_body_is_transport_error() {
    let (addr, _) = start_engine(|_| (500, None)).await;

    let client = client_for(addr, "s3cret");
    let err = client.get_global_stat().await.unwrap_err();
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_nobody_listening_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client_for(addr, "s3cret");
    let err = client.get_version().await.unwrap_err();
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_shutdown_closes_client() {
    let (addr, recorded) = start_engine(|req| (200, Some(json!({"jsonrpc": "2.0", "id": req["id"], "result": "OK"})))).await;

    let client = client_for(addr, "s3cret");
    assert!(client.shutdown().await.unwrap());
    assert!(client.is_closed());

    let err = client.get_version().await.unwrap_err();
    assert!(!err.is_transport());
    assert_eq!(recorded.lock().unwrap().len(), 1);
}
