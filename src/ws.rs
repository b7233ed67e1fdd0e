//! Request pipeline entry points: the static/redirect/404 catch-all, the two
//! WebSocket upgrade routes, and the per-connection read/write tasks.
//!
//! Per the design notes' Open Question, HTTP and WS are split cleanly at the
//! upgrade boundary — only the hook chain's whitelist lookup is shared.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::{SinkExt, StreamExt};
use rand::RngCore;
use rocket::http::{CookieJar, Status};
use rocket::outcome::Outcome;
use rocket::request::{self, FromRequest, Request};
use rocket::response::{self, Responder};
use rocket::{get, State};
use rocket_ws::{Message, WebSocket};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use crate::error::AppError;
use crate::hooks::{HookReply, RequestData};
use crate::room::{Client, CloseReason};
use crate::AppState;

/// Extracts everything a [`RequestData`] needs from a raw Rocket request.
pub struct RequestContext(pub RequestData);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequestContext {
    type Error = Infallible;

    async fn from_request(request: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let headers: HashMap<String, String> = request
            .headers()
            .iter()
            .map(|h| (h.name().to_string().to_lowercase(), h.value().to_string()))
            .collect();

        let cookies: HashMap<String, String> = request
            .cookies()
            .iter()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect();

        let query = request
            .uri()
            .query()
            .map(|q| {
                q.as_str()
                    .split('&')
                    .filter_map(|pair| {
                        let mut parts = pair.splitn(2, '=');
                        let key = parts.next()?.to_string();
                        let value = parts.next().unwrap_or("").to_string();
                        Some((key, value))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let data = RequestData {
            method: request.method().to_string(),
            path: request.uri().path().to_string(),
            query,
            referer: headers.get("referer").cloned(),
            user_agent: headers.get("user-agent").cloned(),
            remote_addr: request
                .client_ip()
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            timestamp_millis: crate::now_epoch_millis(),
            headers,
            cookies,
            extra_data: HashMap::new(),
        };

        Outcome::Success(RequestContext(data))
    }
}

/// Ensures the `sid` cookie is present, issuing a freshly signed one if it's
/// missing or fails verification. Returns the session id either way.
fn ensure_identity_cookie(state: &AppState, cookies: &CookieJar<'_>) -> String {
    if let Some(existing) = cookies.get("sid") {
        if let Some(payload) = state.signing_key.verify(existing.value()) {
            if let Ok(session_id) = String::from_utf8(payload) {
                return session_id;
            }
        }
    }

    let mut session_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut session_bytes);
    let session_id = STANDARD.encode(session_bytes);
    let token = state.signing_key.sign(session_id.as_bytes());

    let mut cookie = rocket::http::Cookie::new("sid", token);
    cookie.set_http_only(true);
    cookie.set_same_site(rocket::http::SameSite::Lax);
    cookie.set_path("/");
    cookie.set_max_age(rocket::time::Duration::seconds(31_536_000));
    cookie.set_secure(!state.config.cookies_insecure);
    cookies.add(cookie);

    session_id
}

fn reply_to_response(reply: HookReply) -> rocket::Response<'static> {
    let mut builder = rocket::Response::build();
    builder
        .status(Status::new(reply.status))
        .header(rocket::http::ContentType::parse_flexible(&reply.content_type).unwrap_or(rocket::http::ContentType::Binary))
        .sized_body(reply.body.len(), std::io::Cursor::new(reply.body));
    for (name, value) in reply.headers {
        builder.raw_header(name, value);
    }
    builder.finalize()
}

/// The catch-all entry point for every non-upgrade GET request: walks the
/// hook registry (file-alias → static-file → redirect → 404).
#[get("/<_path..>", rank = 10)]
pub async fn catch_all(
    _path: std::path::PathBuf,
    ctx: RequestContext,
    cookies: &CookieJar<'_>,
    state: &State<Arc<AppState>>,
) -> Result<rocket::response::Response<'static>, AppError> {
    ensure_identity_cookie(state, cookies);
    let mut req = ctx.0;
    let reply = state.hooks.evaluate(&mut req).await?;
    Ok(reply_to_response(reply))
}

fn magic_cookie() -> String {
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("\"{}\"", STANDARD.encode(bytes))
}

struct WithMagicCookie(rocket_ws::Channel<'static>, String);

impl<'r> Responder<'r, 'static> for WithMagicCookie {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        let mut built = self.0.respond_to(request)?;
        built.set_raw_header("X-Magic-Cookie", self.1);
        built.set_raw_header("Content-Type", "application/x-websocket");
        Ok(built)
    }
}

/// `GET /api/ws` — the unrouted "null room" connection.
#[get("/api/ws")]
pub fn api_ws(
    ws: WebSocket,
    ctx: RequestContext,
    cookies: &CookieJar<'_>,
    state: &State<Arc<AppState>>,
) -> Result<WithMagicCookie, AppError> {
    upgrade(ws, ctx, cookies, state, None)
}

/// `GET /room/<room>/ws` — joins (and lazily creates) a named room.
#[get("/room/<room>/ws")]
pub fn room_ws(
    ws: WebSocket,
    room: String,
    ctx: RequestContext,
    cookies: &CookieJar<'_>,
    state: &State<Arc<AppState>>,
) -> Result<WithMagicCookie, AppError> {
    let path = format!("/room/{room}/ws");
    if state.ws_whitelist.tag_for(&path).is_none() {
        return Err(AppError::UpgradeRejected);
    }
    upgrade(ws, ctx, cookies, state, Some(room))
}

fn upgrade(
    ws: WebSocket,
    ctx: RequestContext,
    cookies: &CookieJar<'_>,
    state: &State<Arc<AppState>>,
    room_name: Option<String>,
) -> Result<WithMagicCookie, AppError> {
    if !ctx.0.is_websocket_upgrade() {
        return Err(AppError::UpgradeRejected);
    }
    let session_id = ensure_identity_cookie(state, cookies);
    let auth_cookie = cookies.get("sid").map(|c| c.value().to_string());
    let req = ctx.0;
    let state = Arc::clone(state.inner());
    let cookie_value = magic_cookie();

    let channel = ws.channel(move |stream| {
        Box::pin(async move {
            run_connection(state, room_name, req, auth_cookie, session_id, stream).await
        })
    });

    Ok(WithMagicCookie(channel, cookie_value))
}

async fn run_connection(
    state: Arc<AppState>,
    room_name: Option<String>,
    req: RequestData,
    auth_cookie: Option<String>,
    session_id: String,
    stream: rocket_ws::stream::DuplexStream,
) -> rocket_ws::result::Result<()> {
    let connection_id = state.distributor.ids.connections.next();
    let (client, mut outbox, mut close_rx) = Client::new(
        connection_id,
        req.remote_addr.clone(),
        req.user_agent.clone(),
        req.referer.clone(),
        auth_cookie,
        session_id,
    );

    let room = match &room_name {
        Some(name) => {
            let (room, joined) = state.distributor.groups.join(name, client.clone());
            if joined {
                state.distributor.emit_presence(&room, "joined", &client);
            }
            room
        }
        None => state.distributor.groups.null_room(),
    };

    // Tracked for the lifetime of this connection so a process shutdown (§5)
    // can reach it even while it's sitting in the null room.
    state.distributor.connections.register(client.clone());

    let (mut sink, mut source) = stream.split();

    // Same close signal the read loop below selects on: the distributor can
    // request an overload close (§4.7) or the process can request a shutdown
    // close (§5), independent of whatever this task is currently doing.
    let mut writer_close_rx = close_rx.clone();
    let mut writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = outbox.recv() => {
                    match frame {
                        Some(frame) => {
                            if sink.send(Message::Text(frame)).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                changed = writer_close_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let requested = *writer_close_rx.borrow();
                    if let Some(reason) = requested {
                        let (code, text) = match reason {
                            CloseReason::Overload => (rocket_ws::frame::CloseCode::Error, "internal overload"),
                            CloseReason::ShuttingDown => (rocket_ws::frame::CloseCode::Away, "server shutting down"),
                        };
                        let _ = sink
                            .send(Message::Close(Some(rocket_ws::frame::CloseFrame {
                                code,
                                reason: text.into(),
                            })))
                            .await;
                        break;
                    }
                }
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            message = source.next() => {
                match message {
                    Some(message) => match message? {
                        Message::Text(text) => {
                            if let Some(reply) = state.distributor.handle_frame(&room, &client, &text) {
                                // Own reply queue full: this connection is already
                                // being torn down, so just stop reading rather than
                                // race our own writer task for the close handshake.
                                if client.enqueue(reply.0).is_err() {
                                    break;
                                }
                            }
                        }
                        Message::Close(_) => break,
                        Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_) => {}
                    },
                    None => break,
                }
            }
            changed = close_rx.changed() => {
                if changed.is_err() || close_rx.borrow().is_some() {
                    break;
                }
            }
        }
    }

    // Give the writer task up to 1s to drain/close on its own (e.g. to send
    // an in-flight close frame) before severing it, per the default
    // discard-after-grace cancellation policy in §5.
    if tokio::time::timeout(std::time::Duration::from_secs(1), &mut writer)
        .await
        .is_err()
    {
        writer.abort();
    }

    state.distributor.connections.unregister(connection_id);

    if let Some(_name) = &room_name {
        if state.distributor.groups.leave(&room, connection_id) {
            state.distributor.emit_presence(&room, "left", &client);
        }
    }

    Ok(())
}
