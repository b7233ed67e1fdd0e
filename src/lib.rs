pub mod config;
pub mod cookie;
pub mod distributor;
pub mod envelope;
pub mod error;
pub mod hooks;
pub mod id;
pub mod producers;
pub mod room;
pub mod ws;

use rocket::{Build, Rocket};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use config::ServerConfig;
use cookie::SigningKey;
use distributor::Distributor;
use error::AppError;
use hooks::{FileAliasHook, HookRegistry, NotFoundHook, RedirectHook, StaticFileHook, WsWhitelist};
use producers::{ContentTypeMap, FilesystemProducer, ProducerChain, ResourceProducer, SyntheticProducer};

/// Current epoch time in milliseconds, used to stamp envelopes and request
/// timestamps. Centralized here so every caller agrees on the clock source.
pub fn now_epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// The crate's own version, surfaced via `/static/version.js`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct AppState {
    pub config: ServerConfig,
    pub signing_key: SigningKey,
    pub hooks: HookRegistry,
    pub ws_whitelist: WsWhitelist,
    pub distributor: Distributor,
}

fn build_producer_chain(config: &ServerConfig) -> ProducerChain {
    let content_types = ContentTypeMap::default_map();
    let mut chain = ProducerChain::new(config.cache_max_age);

    let mut synthetic = SyntheticProducer::new();
    let revision = option_env!("INSTANT_GIT_REVISION").unwrap_or("unknown");
    synthetic.register(
        "/static/version.js",
        producers::version_js(VERSION, revision),
        "application/javascript; charset=utf-8",
    );
    chain.push(Arc::new(synthetic));

    chain.push(Arc::new(FilesystemProducer::new(
        config.webroot.clone(),
        vec![
            regex::Regex::new(r"^/pages/.*").expect("valid filesystem whitelist regex"),
            regex::Regex::new(r"^/static/.*").expect("valid filesystem whitelist regex"),
        ],
        ContentTypeMap::default_map(),
    )));

    chain.push(Arc::new(ResourceProducer::new(content_types)));

    chain
}

/// Assembles the managed state and mounts the routes. Fails only if an
/// explicitly configured `INSTANT_COOKIES_KEYFILE` can't be loaded — that's a
/// startup-time fatal error (§7), not something to panic past.
pub fn build_rocket(config: ServerConfig) -> Result<Rocket<Build>, AppError> {
    let signing_key = SigningKey::load_or_generate(config.cookies_keyfile.as_deref())
        .map_err(|err| AppError::ServerFatal(format!("loading cookie signing key: {err}")))?;

    let producer_chain = Arc::new(build_producer_chain(&config));
    let aliases = Arc::new(producers::default_aliases());

    let hook_registry = HookRegistry::new()
        .register(Arc::new(FileAliasHook::new(aliases)))
        .register(Arc::new(StaticFileHook::new(producer_chain)))
        .register(Arc::new(RedirectHook::new(RedirectHook::default_rules())))
        .register(Arc::new(NotFoundHook));

    let state = Arc::new(AppState {
        config,
        signing_key,
        hooks: hook_registry,
        ws_whitelist: WsWhitelist::default_whitelist(),
        distributor: Distributor::new(),
    });

    Ok(rocket::build()
        .manage(state)
        .attach(shutdown_fairing())
        .mount(
            "/",
            rocket::routes![ws::api_ws, ws::room_ws, ws::catch_all],
        ))
}

/// §5: "Server shutdown sends close (1001) to all clients, waits up to 5s,
/// then severs remaining sockets." Rocket's own shutdown sequence already
/// stops accepting new connections before firing `on_shutdown`; this fairing
/// handles the WS-specific half, broadcasting a close request through the
/// connection registry and giving already-open sockets a window to drain
/// before the process exits out from under them.
fn shutdown_fairing() -> rocket::fairing::AdHoc {
    rocket::fairing::AdHoc::on_shutdown("close open WebSocket connections", |rocket| {
        // Clone the managed `Arc<AppState>` out synchronously: the closure
        // only gets `&Rocket<Orbit>` for the duration of this call, but the
        // returned future must be `'static`.
        let state = rocket.state::<Arc<AppState>>().cloned();
        Box::pin(async move {
            let Some(state) = state else {
                return;
            };
            let connections = &state.distributor.connections;
            if connections.is_empty() {
                return;
            }
            tracing::info!(count = connections.len(), "shutting down: closing open connections");
            connections.request_close_all(room::CloseReason::ShuttingDown);

            let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
            while !connections.is_empty() && tokio::time::Instant::now() < deadline {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
            if !connections.is_empty() {
                tracing::warn!(
                    remaining = connections.len(),
                    "severing connections that did not close within the grace period"
                );
            }
        })
    })
}
