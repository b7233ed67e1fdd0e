//! End-to-end WebSocket protocol tests: real handshakes and real frames
//! against a server bound to a loopback port, driven with
//! `tokio_tungstenite::connect_async` (grounded on the same pattern used for
//! the pack's own gateway chat tests) plus one literal raw-socket handshake
//! to pin the exact `Sec-WebSocket-Accept` computation.

mod common;

use common::{header_value, raw_http_roundtrip, spawn_server, spawn_server_with_shutdown, status_line};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

async fn recv_json<S>(socket: &mut S) -> Value
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        match tokio::time::timeout(std::time::Duration::from_secs(2), socket.next())
            .await
            .expect("reply within timeout")
            .expect("stream still open")
            .expect("no transport error")
        {
            Message::Text(text) => return serde_json::from_str(&text).expect("valid json frame"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

// S3: the canonical RFC 6455 test vector must produce the canonical accept
// value, and the response must carry an X-Magic-Cookie header.
#[tokio::test]
async fn literal_upgrade_handshake_matches_the_rfc_test_vector() {
    let port = 18090;
    spawn_server(port).await;

    let request = format!(
        "GET /api/ws HTTP/1.1\r\n\
         Host: 127.0.0.1:{port}\r\n\
         Connection: Upgrade\r\n\
         Upgrade: websocket\r\n\
         Sec-WebSocket-Version: 13\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
         \r\n"
    );
    let response = raw_http_roundtrip(port, &request).await;

    assert_eq!(status_line(&response).trim(), "HTTP/1.1 101 Switching Protocols");
    assert_eq!(
        header_value(&response, "Sec-WebSocket-Accept"),
        Some("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=")
    );
    assert!(header_value(&response, "X-Magic-Cookie").is_some());
}

// S4: two clients join a room; a broadcast reaches both members as the
// identical stamped envelope, with no per-recipient `seq` echo.
#[tokio::test]
async fn broadcast_reaches_both_members_as_an_identical_envelope() {
    let port = 18091;
    spawn_server(port).await;
    let url = format!("ws://127.0.0.1:{port}/room/lobby/ws");

    let (mut a, _) = connect_async(&url).await.expect("client a connects");
    let (mut b, _) = connect_async(&url).await.expect("client b connects");

    // Drain each client's own `joined` presence event(s) before exchanging
    // the message under test.
    let _ = recv_json(&mut a).await;
    let _ = recv_json(&mut b).await;

    let frame = json!({"type": "broadcast", "seq": 42, "data": {"text": "hi"}});
    a.send(Message::Text(frame.to_string().into())).await.unwrap();

    let a_frame = recv_json(&mut a).await;
    let b_frame = recv_json(&mut b).await;

    assert_eq!(a_frame["type"], "broadcast");
    assert_eq!(a_frame["data"]["text"], "hi");
    assert!(a_frame.get("seq").is_none());
    assert_eq!(a_frame, b_frame);

    a.close(None).await.ok();
    b.close(None).await.ok();
}

// S5: unicast to a connection id that doesn't exist replies a typed error,
// echoing the request's own seq.
#[tokio::test]
async fn unicast_to_missing_member_replies_typed_error() {
    let port = 18092;
    spawn_server(port).await;
    let url = format!("ws://127.0.0.1:{port}/api/ws");

    let (mut client, _) = connect_async(&url).await.expect("client connects");
    let frame = json!({"type": "unicast", "to": "999999", "seq": 7, "data": {}});
    client.send(Message::Text(frame.to_string().into())).await.unwrap();

    let reply = recv_json(&mut client).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["data"]["reason"], "no-such-member");
    assert_eq!(reply["seq"], 7);

    client.close(None).await.ok();
}

// S6: when one member disconnects, the remaining member gets a `left`
// presence event promptly.
#[tokio::test]
async fn disconnect_emits_left_presence_to_remaining_member() {
    let port = 18093;
    spawn_server(port).await;
    let url = format!("ws://127.0.0.1:{port}/room/lobby2/ws");

    let (mut a, _) = connect_async(&url).await.expect("client a connects");
    let (b, _) = connect_async(&url).await.expect("client b connects");

    let _ = recv_json(&mut a).await; // a's own `joined`
    let _ = recv_json(&mut a).await; // b's `joined`, broadcast to a

    drop(b);

    let left = tokio::time::timeout(std::time::Duration::from_secs(2), recv_json(&mut a))
        .await
        .expect("left event within 2s");
    assert_eq!(left["type"], "left");

    a.close(None).await.ok();
}

// §5: a process shutdown sends a close frame (code 1001) to every open
// connection rather than just dropping the socket out from under it.
#[tokio::test]
async fn shutdown_sends_going_away_close_to_open_connections() {
    let port = 18095;
    let shutdown = spawn_server_with_shutdown(port).await;
    let url = format!("ws://127.0.0.1:{port}/api/ws");

    let (mut client, _) = connect_async(&url).await.expect("client connects");

    shutdown.notify();

    let close = tokio::time::timeout(std::time::Duration::from_secs(5), client.next())
        .await
        .expect("close frame within the 5s shutdown grace period")
        .expect("stream yields a final message")
        .expect("no transport error");

    match close {
        Message::Close(Some(frame)) => {
            assert_eq!(frame.code, tokio_tungstenite::tungstenite::protocol::CloseCode::Away);
        }
        other => panic!("expected a close frame, got {other:?}"),
    }
}

// The `ping`/`pong` keepalive round-trip, echoing the originator's seq.
#[tokio::test]
async fn ping_replies_pong_with_the_same_seq() {
    let port = 18094;
    spawn_server(port).await;
    let url = format!("ws://127.0.0.1:{port}/api/ws");

    let (mut client, _) = connect_async(&url).await.expect("client connects");
    let frame = json!({"type": "ping", "seq": 1, "data": {}});
    client.send(Message::Text(frame.to_string().into())).await.unwrap();

    let reply = recv_json(&mut client).await;
    assert_eq!(reply["type"], "pong");
    assert_eq!(reply["seq"], 1);

    client.close(None).await.ok();
}
