//! Shared helpers for the integration suite: building a fresh, isolated
//! `ServerConfig`/`Rocket` per test (per SPEC_FULL.md §9 "instantiate a fresh
//! server per test to avoid cross-test leakage") and a couple of raw-socket
//! utilities for the literal-I/O scenarios in spec.md §8.

use instant::config::ServerConfig;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// A `ServerConfig` pointed at a fresh temp directory, insecure cookies (no
/// TLS in tests), and a short cache TTL so producer-chain tests don't need to
/// wait out a long-lived cache entry.
pub fn test_config(port: u16) -> ServerConfig {
    ServerConfig {
        port,
        host: "127.0.0.1".to_string(),
        webroot: std::env::temp_dir().join(format!("instant-test-webroot-{port}")),
        http_log: "-".to_string(),
        debug_log: "-".to_string(),
        log_level: "error".to_string(),
        startup_cmd: None,
        cookies_keyfile: None,
        cookies_insecure: true,
        cache_max_age: Duration::from_secs(60),
    }
}

pub fn webroot_for(port: u16) -> PathBuf {
    std::env::temp_dir().join(format!("instant-test-webroot-{port}"))
}

/// Launch a full server on `127.0.0.1:<port>` in the background and give it a
/// moment to bind before returning. Each test picks its own port so the suite
/// can run concurrently.
pub async fn spawn_server(port: u16) {
    let config = test_config(port);
    let figment = rocket::Config::figment()
        .merge(("port", config.port))
        .merge(("address", config.bind_address().to_string()));
    let rocket = instant::build_rocket(config)
        .expect("test server builds with a generated signing key")
        .configure(figment);
    tokio::spawn(async move {
        let _ = rocket.launch().await;
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
}

/// Like [`spawn_server`], but returns a [`rocket::Shutdown`] handle so a test
/// can trigger the §5 graceful-shutdown path directly instead of waiting for
/// a process signal.
pub async fn spawn_server_with_shutdown(port: u16) -> rocket::Shutdown {
    let config = test_config(port);
    let figment = rocket::Config::figment()
        .merge(("port", config.port))
        .merge(("address", config.bind_address().to_string()))
        .merge(("shutdown.grace", 5))
        .merge(("shutdown.mercy", 2));
    let rocket = instant::build_rocket(config)
        .expect("test server builds with a generated signing key")
        .configure(figment)
        .ignite()
        .await
        .expect("rocket ignites");
    let shutdown = rocket.shutdown();
    tokio::spawn(rocket.launch());
    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown
}

/// Send `request` verbatim over a fresh TCP connection to `127.0.0.1:<port>`
/// and return everything read back before the peer stops sending (or a short
/// idle timeout elapses) as a lossy UTF-8 string.
pub async fn raw_http_roundtrip(port: u16, request: &str) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", port))
        .await
        .expect("connect to test server");
    stream
        .write_all(request.as_bytes())
        .await
        .expect("write request");

    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match tokio::time::timeout(Duration::from_millis(500), stream.read(&mut chunk)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => buf.extend_from_slice(&chunk[..n]),
            _ => break,
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

pub fn status_line(response: &str) -> &str {
    response.lines().next().unwrap_or("")
}

pub fn header_value<'a>(response: &'a str, name: &str) -> Option<&'a str> {
    response
        .lines()
        .skip(1)
        .take_while(|line| !line.is_empty())
        .find_map(|line| {
            let (k, v) = line.split_once(':')?;
            k.trim().eq_ignore_ascii_case(name).then(|| v.trim())
        })
}
