use std::sync::{Arc, Mutex};

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use picbed_core::contract::{
    FormPart, HttpRequest, ImageFile, ProgressFn, RequestBody, Transport,
};
use picbed_core::error::{NetworkFailure, TransportError, UploadError};
use picbed_core::transport::ReqwestTransport;

const OK_REPLY: &str = "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok";

/// What the local server saw: lowercased request head and the raw body.
struct Captured {
    head: String,
    body: Vec<u8>,
}

async fn read_request(socket: &mut TcpStream) -> Captured {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let head_end = loop {
        let n = socket.read(&mut chunk).await.expect("read request head");
        assert!(n > 0, "client closed before sending headers");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
    let length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .map(|value| value.trim().parse::<usize>().expect("numeric content-length"))
        .unwrap_or(0);
    while buf.len() < head_end + length {
        let n = socket.read(&mut chunk).await.expect("read request body");
        assert!(n > 0, "client closed mid-body");
        buf.extend_from_slice(&chunk[..n]);
    }
    Captured {
        head,
        body: buf[head_end..head_end + length].to_vec(),
    }
}

/// Accepts one connection, reads the full request, then answers with `reply` or hangs up.
async fn serve_once(reply: Option<&'static str>) -> (String, JoinHandle<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let url = format!("http://{}/upload", listener.local_addr().expect("local addr"));
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let captured = read_request(&mut socket).await;
        if let Some(reply) = reply {
            socket.write_all(reply.as_bytes()).await.expect("write reply");
            let _ = socket.shutdown().await;
        }
        captured
    });
    (url, handle)
}

fn transport() -> ReqwestTransport {
    let client = reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("client builds");
    ReqwestTransport::with_client(client)
}

fn recorder() -> (ProgressFn, Arc<Mutex<Vec<(u64, u64)>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let progress: ProgressFn = Arc::new(move |loaded, total| {
        sink.lock().unwrap().push((loaded, total));
    });
    (progress, seen)
}

fn assert_monotonic(seen: &[(u64, u64)], total: u64) {
    assert!(!seen.is_empty(), "no progress reported");
    assert!(seen.iter().all(|&(loaded, t)| t == total && loaded <= total));
    assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0), "{seen:?}");
    assert_eq!(seen.last().copied(), Some((total, total)));
}

#[tokio::test]
async fn bytes_body_streams_in_chunks_with_progress() {
    let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let (url, server) = serve_once(Some(OK_REPLY)).await;
    let (progress, seen) = recorder();

    let response = transport()
        .send(
            HttpRequest::put(url).body(RequestBody::Bytes {
                content_type: "image/png".to_string(),
                data: data.clone(),
            }),
            Some(progress),
        )
        .await
        .expect("request succeeds");
    assert_eq!(response.status, 200);
    assert_eq!(response.text(), "ok");

    let captured = server.await.expect("server task");
    assert!(captured.head.starts_with("put /upload "));
    assert!(captured.head.contains("content-type: image/png"));
    assert!(captured.head.contains("content-length: 200000"));
    assert_eq!(captured.body, data);

    let seen = seen.lock().unwrap().clone();
    // 64 KiB chunks: three full ones and the remainder.
    assert_eq!(seen.len(), 4);
    assert_monotonic(&seen, 200_000);
}

#[tokio::test]
async fn form_body_is_urlencoded_with_length() {
    let (url, server) = serve_once(Some(OK_REPLY)).await;
    let request = HttpRequest::post(url).body(RequestBody::Form(vec![
        ("content".to_string(), "Bw+H/w==".to_string()),
        ("access_token".to_string(), "T".to_string()),
    ]));

    transport().send(request, None).await.expect("request succeeds");

    let captured = server.await.expect("server task");
    let expected = b"content=Bw%2BH%2Fw%3D%3D&access_token=T";
    assert!(captured
        .head
        .contains("content-type: application/x-www-form-urlencoded"));
    assert!(captured
        .head
        .contains(&format!("content-length: {}", expected.len())));
    assert_eq!(captured.body, expected);
}

#[tokio::test]
async fn json_body_and_custom_headers_are_sent() {
    let (url, server) = serve_once(Some(OK_REPLY)).await;
    let value = json!({ "content": "BwcHBw==", "message": "picbed upload picture" });
    let request = HttpRequest::put(url)
        .header("Authorization", "token T")
        .body(RequestBody::Json(value.clone()));

    transport().send(request, None).await.expect("request succeeds");

    let captured = server.await.expect("server task");
    assert!(captured.head.contains("content-type: application/json"));
    assert!(captured.head.contains("authorization: token t"));
    let sent: serde_json::Value = serde_json::from_slice(&captured.body).expect("json body");
    assert_eq!(sent, value);
}

#[tokio::test]
async fn multipart_file_part_carries_name_type_and_progress() {
    let (url, server) = serve_once(Some(OK_REPLY)).await;
    let (progress, seen) = recorder();
    let file = ImageFile::new("photo.png", vec![7u8; 1000]);
    let request = HttpRequest::post(url).body(RequestBody::Multipart(vec![
        FormPart::text("token", "abc"),
        FormPart::file("file", &file),
    ]));

    transport()
        .send(request, Some(progress))
        .await
        .expect("request succeeds");

    let captured = server.await.expect("server task");
    assert!(captured.head.contains("content-type: multipart/form-data; boundary="));
    let body = String::from_utf8_lossy(&captured.body);
    assert!(body.contains("name=\"token\"\r\n\r\nabc"));
    assert!(body.contains("name=\"file\"; filename=\"photo.png\""));
    assert!(body.contains("Content-Type: image/png"));
    assert!(captured
        .body
        .windows(1000)
        .any(|w| w.iter().all(|&b| b == 7)));

    assert_monotonic(&seen.lock().unwrap(), 1000);
}

#[tokio::test]
async fn non_success_status_is_returned_not_raised() {
    let reply = "HTTP/1.1 409 Conflict\r\nContent-Length: 6\r\nConnection: close\r\n\r\nexists";
    let (url, server) = serve_once(Some(reply)).await;

    let response = transport()
        .send(HttpRequest::get(url), None)
        .await
        .expect("status is not a transport failure");
    server.await.expect("server task");
    assert_eq!(response.status, 409);
    assert!(!response.is_success());
    assert_eq!(response.text(), "exists");
}

#[tokio::test]
async fn refused_connection_is_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let error = transport()
        .send(HttpRequest::get(format!("http://{addr}/upload")), None)
        .await
        .expect_err("nothing is listening");
    assert!(matches!(error, TransportError::Connect(_)), "{error:?}");
    assert!(matches!(
        UploadError::from(error),
        UploadError::Network {
            kind: NetworkFailure::Unreachable,
            ..
        }
    ));
}

#[tokio::test]
async fn hang_up_after_request_is_no_response() {
    let (url, server) = serve_once(None).await;
    let request = HttpRequest::post(url).body(RequestBody::Bytes {
        content_type: "image/png".to_string(),
        data: vec![1, 2, 3],
    });

    let error = transport()
        .send(request, None)
        .await
        .expect_err("server closed without replying");
    let captured = server.await.expect("server task");
    assert_eq!(captured.body, vec![1, 2, 3]);

    assert!(matches!(error, TransportError::NoResponse(_)), "{error:?}");
    let error = UploadError::from(error);
    assert!(matches!(
        error,
        UploadError::Network {
            kind: NetworkFailure::NoResponse,
            ..
        }
    ));
    assert!(error.user_message("SM.MS").contains("did not respond"));
}

#[tokio::test]
async fn malformed_url_is_a_configuration_error() {
    let error = transport()
        .send(HttpRequest::post("not a url"), None)
        .await
        .expect_err("URL cannot be parsed");
    assert!(matches!(error, TransportError::Request(_)), "{error:?}");
    assert!(UploadError::from(error).is_configuration());
}
