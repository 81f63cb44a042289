//! End-to-end checks that drive a real accepted socket through
//! `connection::run`: RFC6455 and Hixie-75 handshakes each followed by
//! one round trip over their respective wire codec, asserting on the
//! bytes that actually cross the wire.

use socket_flow::acl::Acl;
use socket_flow::config::{Route, WebSocketConfig};
use socket_flow::connection::{self, ConnectionContext};
use socket_flow::registry::{Registry, SessionIdGenerator};
use socket_flow::socket::Socket;
use socket_flow::worker::Shutdown;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn spawn_server(route: Route) -> (std::net::SocketAddr, Arc<Registry>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let registry = Arc::new(Registry::new());
    let ctx = Arc::new(ConnectionContext {
        config: WebSocketConfig::default(),
        route,
        acl: Arc::new(Acl::allow_all()),
        registry: registry.clone(),
        shutdown: Shutdown::new(),
        listen_port: addr.port(),
    });
    let ids = Arc::new(SessionIdGenerator::default());

    tokio::spawn(async move {
        let (stream, peer) = listener.accept().await.unwrap();
        let id = ids.next();
        let _ = connection::run(Socket::Plain(stream), peer, id, ctx).await;
    });

    (addr, registry)
}

#[tokio::test]
async fn rfc6455_handshake_then_echo_roundtrip() {
    let (addr, _registry) = spawn_server(Route::Echo).await;
    let mut client = TcpStream::connect(addr).await.unwrap();

    let request = format!(
        "GET / HTTP/1.1\r\n\
         Host: {addr}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
         Sec-WebSocket-Version: 13\r\n\r\n"
    );
    client.write_all(request.as_bytes()).await.unwrap();

    let mut buf = vec![0u8; 1024];
    let n = client.read(&mut buf).await.unwrap();
    let response = String::from_utf8_lossy(&buf[..n]);
    assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
    assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo="));

    // Masked "Hi" text frame, client -> server.
    let mask = [0x01u8, 0x02, 0x03, 0x04];
    let payload: Vec<u8> = b"Hi".iter().enumerate().map(|(i, b)| b ^ mask[i % 4]).collect();
    let mut frame = vec![0x81, 0x80 | 2];
    frame.extend_from_slice(&mask);
    frame.extend_from_slice(&payload);
    client.write_all(&frame).await.unwrap();

    let mut reply = vec![0u8; 16];
    let n = client.read(&mut reply).await.unwrap();
    assert_eq!(reply[0], 0x81); // FIN + text
    assert_eq!(reply[1] & 0x7F, 2); // unmasked server frame, length 2
    assert_eq!(&reply[2..n], b"Hi");
}

#[tokio::test]
async fn hixie75_handshake_then_codec_roundtrip() {
    let (addr, _registry) = spawn_server(Route::Echo).await;
    let mut client = TcpStream::connect(addr).await.unwrap();

    // No Sec-WebSocket-Version/Key1/Key2: classifies as Hixie-75.
    let request = format!(
        "GET /chat HTTP/1.1\r\n\
         Host: {addr}\r\n\
         Upgrade: WebSocket\r\n\
         Connection: Upgrade\r\n\
         Origin: http://example.com\r\n\r\n"
    );
    client.write_all(request.as_bytes()).await.unwrap();

    let mut buf = vec![0u8; 1024];
    let n = client.read(&mut buf).await.unwrap();
    let response = String::from_utf8_lossy(&buf[..n]);
    assert!(response.starts_with("HTTP/1.1 101 Web Socket Protocol Handshake\r\n"));
    assert!(response.contains("WebSocket-Origin: http://example.com\r\n"));
    assert!(response.contains(&format!("WebSocket-Location: ws://{addr}/chat\r\n")));
    assert!(response.ends_with("\r\n\r\n"));

    // Byte-stuffed hybi00 framing: 0x00 <payload> 0xFF, echoed back unchanged.
    let mut frame = vec![0x00];
    frame.extend_from_slice(b"hello");
    frame.push(0xFF);
    client.write_all(&frame).await.unwrap();

    let mut reply = vec![0u8; 16];
    let n = client.read(&mut reply).await.unwrap();
    assert_eq!(&reply[..n], &frame[..]);
}

#[tokio::test]
async fn handshake_rejects_host_outside_acl() {
    let hosts_path = std::env::temp_dir().join("wsgated-test-hosts.dat");
    tokio::fs::write(&hosts_path, "1\r\nallowed.example\r\n").await.unwrap();
    let acl = Acl::load(Some(hosts_path.to_str().unwrap()), None, false).await.unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let registry = Arc::new(Registry::new());
    let ctx = Arc::new(ConnectionContext {
        config: WebSocketConfig::default(),
        route: Route::Echo,
        acl: Arc::new(acl),
        registry,
        shutdown: Shutdown::new(),
        listen_port: addr.port(),
    });
    let ids = Arc::new(SessionIdGenerator::default());

    tokio::spawn(async move {
        let (stream, peer) = listener.accept().await.unwrap();
        let id = ids.next();
        let _ = connection::run(Socket::Plain(stream), peer, id, ctx).await;
    });

    let mut client = TcpStream::connect(addr).await.unwrap();
    let request = b"GET / HTTP/1.1\r\nHost: not-allowed.example\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n";
    client.write_all(request).await.unwrap();

    let mut buf = vec![0u8; 512];
    let n = client.read(&mut buf).await.unwrap();
    let response = String::from_utf8_lossy(&buf[..n]);
    assert!(response.starts_with("HTTP/1.1 403 Forbidden\r\n"));

    let _ = tokio::fs::remove_file(&hosts_path).await;
}
