//! End-to-end probes through the real `reqwest` transport against local stubs

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rcgen::{CertificateParams, KeyPair};
use tokio::io::{copy_bidirectional, AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tokio_test::assert_ok;

use proxyprobe::models::{CaptureMode, ProxyConfig, ResponsePayload, DIRECT_LABEL};
use proxyprobe::output::MemorySink;
use proxyprobe::probe::{Prober, ReqwestTransport, ACCEPT_LANGUAGE_VALUE};
use proxyprobe::scheduler::{RunOutcome, Schedule, Scheduler};

/// Serve one canned HTTP response and hand back the raw request text
async fn serve_once(
    status_line: &'static str,
    body: &'static str,
) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }

        let response = format!(
            concat!(
                "HTTP/1.1 {}\r\n",
                "content-type: text/plain\r\n",
                "content-length: {}\r\n",
                "connection: close\r\n\r\n{}",
            ),
            status_line,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        let _ = tx.send(String::from_utf8_lossy(&request).to_string());
    });

    (format!("127.0.0.1:{}", addr.port()), rx)
}

/// Read from `socket` until the end of the request head
async fn read_head<S: AsyncRead + Unpin>(socket: &mut S) -> std::io::Result<String> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if socket.read(&mut buf).await? == 0 {
            break;
        }
        head.push(buf[0]);
    }
    Ok(String::from_utf8_lossy(&head).to_string())
}

/// HTTPS server for `localhost` behind a freshly generated self-signed certificate
async fn serve_self_signed(body: &'static str) -> u16 {
    let key_pair = KeyPair::generate().unwrap();
    let cert = CertificateParams::new(vec!["localhost".to_string()])
        .unwrap()
        .self_signed(&key_pair)
        .unwrap();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

    let tls = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert.der().clone()], key)
        .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(tls));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                // Clients that reject the certificate abort the handshake here.
                let Ok(mut stream) = acceptor.accept(socket).await else {
                    return;
                };
                if read_head(&mut stream).await.is_err() {
                    return;
                }
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    port
}

/// Plain HTTP proxy that only supports `CONNECT`, tunnelling every request to
/// `127.0.0.1:upstream_port`. Each received request head is forwarded on `heads`.
async fn serve_connect_proxy(upstream_port: u16) -> (u16, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut client, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let Ok(head) = read_head(&mut client).await else {
                    return;
                };
                let is_connect = head.starts_with("CONNECT ");
                let _ = tx.send(head);
                if !is_connect {
                    let _ = client.write_all(b"HTTP/1.1 405 Method Not Allowed\r\n\r\n").await;
                    return;
                }

                let Ok(mut upstream) = TcpStream::connect(("127.0.0.1", upstream_port)).await
                else {
                    let _ = client.write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n").await;
                    return;
                };
                if client
                    .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
                    .await
                    .is_err()
                {
                    return;
                }
                let _ = copy_bidirectional(&mut client, &mut upstream).await;
            });
        }
    });

    (port, rx)
}

/// A port with nothing listening on it
async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn prober(url: String, capture: CaptureMode) -> Prober {
    let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
    Prober::new(url, Arc::new(transport), capture)
}

#[tokio::test]
async fn test_direct_probe_non_2xx_is_success() {
    let (addr, request) = serve_once("503 Service Unavailable", "try later").await;
    let prober = prober(format!("http://{}/item", addr), CaptureMode::Raw);

    let result = prober.probe_direct().await;

    assert!(result.is_success(), "unexpected failure: {:?}", result.error());
    assert_eq!(result.target, DIRECT_LABEL);
    assert!(result.latency_ms > 0.0);
    assert_eq!(
        result.response(),
        Some(&ResponsePayload::Raw {
            status: 503,
            body: "try later".to_string()
        })
    );

    let request = assert_ok!(request.await).to_lowercase();
    assert!(request.starts_with("get /item http/1.1"));
    let accept_language = format!("accept-language: {}", ACCEPT_LANGUAGE_VALUE.to_lowercase());
    assert!(request.contains(&accept_language));
}

#[tokio::test]
async fn test_direct_probe_json_capture() {
    let (addr, _request) = serve_once(
        "200 OK",
        r#"{"data":{"first_listed_at":"2024-01-02","category":"art","title":"Vase"}}"#,
    )
    .await;
    let prober = prober(format!("http://{}/", addr), CaptureMode::Json);

    let result = prober.probe_direct().await;

    match result.response() {
        Some(ResponsePayload::Json { status, payload }) => {
            assert_eq!(*status, 200);
            assert_eq!(payload.first_listed_at(), "2024-01-02");
            assert_eq!(payload.category(), "art");
            assert_eq!(payload.title(), "Vase");
        }
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_target_is_failure_with_latency() {
    let port = closed_port().await;
    let prober = prober(format!("http://127.0.0.1:{}/", port), CaptureMode::Raw);

    let result = prober.probe_direct().await;

    assert!(!result.is_success());
    assert!(result.response().is_none());
    assert!(!result.error().unwrap_or_default().is_empty());
    assert!(result.latency_ms > 0.0);
}

#[tokio::test]
async fn test_proxied_probe_sends_credentials_to_proxy() {
    let (proxy_addr, request) = serve_once("200 OK", "via proxy").await;
    let (ip, port) = proxy_addr.rsplit_once(':').unwrap();
    let proxy = ProxyConfig::new(ip, port.parse().unwrap(), "alice", "s3cret");
    let prober = prober("http://target.invalid/page".to_string(), CaptureMode::Raw);

    let result = prober.probe_via_proxy(&proxy).await;

    assert!(result.is_success(), "unexpected failure: {:?}", result.error());
    assert_eq!(result.target, proxy_addr);

    let request = assert_ok!(request.await).to_lowercase();
    assert!(request.starts_with("get http://target.invalid/page http/1.1"));
    let expected = format!(
        "proxy-authorization: basic {}",
        BASE64.encode("alice:s3cret").to_lowercase()
    );
    assert!(request.contains(&expected), "request was: {}", request);
    assert!(request.contains("accept-language:"));
}

#[tokio::test]
async fn test_proxied_https_accepts_self_signed_certificate() {
    let target_port = serve_self_signed("tunnelled").await;
    let (proxy_port, mut heads) = serve_connect_proxy(target_port).await;
    let proxy = ProxyConfig::new("127.0.0.1", proxy_port, "alice", "s3cret");
    let prober = prober(
        format!("https://localhost:{}/", target_port),
        CaptureMode::Raw,
    );

    let result = prober.probe_via_proxy(&proxy).await;

    assert!(result.is_success(), "unexpected failure: {:?}", result.error());
    assert_eq!(
        result.response(),
        Some(&ResponsePayload::Raw {
            status: 200,
            body: "tunnelled".to_string()
        })
    );

    let head = assert_ok!(heads.try_recv()).to_lowercase();
    assert!(head.starts_with(&format!("connect localhost:{} http/1.1", target_port)));
    assert!(head.contains("proxy-authorization: basic"), "head was: {}", head);
}

#[tokio::test]
async fn test_direct_https_rejects_self_signed_certificate() {
    let target_port = serve_self_signed("unreachable").await;
    let prober = prober(
        format!("https://localhost:{}/", target_port),
        CaptureMode::Raw,
    );

    let result = prober.probe_direct().await;

    assert!(!result.is_success());
    let error = result.error().unwrap_or_default().to_lowercase();
    assert!(error.contains("certificate"), "error was: {}", error);
}

#[tokio::test]
async fn test_unreachable_proxy_is_failure_labelled_with_proxy() {
    let port = closed_port().await;
    let proxy = ProxyConfig::new("127.0.0.1", port, "alice", "s3cret");
    let prober = prober("http://target.invalid/".to_string(), CaptureMode::Raw);

    let result = prober.probe_via_proxy(&proxy).await;

    assert!(!result.is_success());
    assert_eq!(result.target, format!("127.0.0.1:{}", port));
    assert!(result.latency_ms > 0.0);
}

#[tokio::test]
async fn test_schedule_against_unreachable_target_still_completes() {
    let port = closed_port().await;
    let mut scheduler = Scheduler::new(
        prober(format!("http://127.0.0.1:{}/", port), CaptureMode::Raw),
        vec![],
    );
    let mut sink = MemorySink::new();
    let (_tx, rx) = watch::channel(false);

    let summary = scheduler
        .run(
            &Schedule {
                interval: Duration::from_millis(20),
                count: 3,
                use_proxy: true,
            },
            &mut sink,
            rx,
        )
        .await;

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.completed, 3);
    assert_eq!(sink.results.len(), 3);
    assert!(sink.results.iter().all(|r| !r.is_success() && r.is_direct()));
}
