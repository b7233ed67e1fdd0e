//! Hook registry: an ordered, append-only chain of request hooks consulted
//! for every inbound HTTP request. Hooks are transport-agnostic — they operate
//! on [`RequestData`]/[`HookReply`], not Rocket types directly — so they can be
//! unit tested without spinning up a server.

mod file_alias;
mod not_found;
mod redirect;
mod static_file;
mod ws_whitelist;

pub use file_alias::FileAliasHook;
pub use not_found::NotFoundHook;
pub use redirect::{RedirectHook, RedirectRule};
pub use static_file::StaticFileHook;
pub use ws_whitelist::WsWhitelist;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct RequestData {
    pub method: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    pub remote_addr: String,
    pub timestamp_millis: u64,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
    /// A mutable bag hooks use to pass data to later hooks in the same chain
    /// (e.g. the file-alias hook stashes the resolved path here).
    pub extra_data: HashMap<String, String>,
}

impl RequestData {
    pub fn is_websocket_upgrade(&self) -> bool {
        self.headers
            .get("upgrade")
            .map(|v| v.eq_ignore_ascii_case("websocket"))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct HookReply {
    pub status: u16,
    pub content_type: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HookReply {
    pub fn ok(body: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: content_type.into(),
            headers: Vec::new(),
            body,
        }
    }

    pub fn status(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8".to_string(),
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn redirect(status: u16, location: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8".to_string(),
            headers: vec![("Location".to_string(), location.into())],
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

pub enum HookOutcome {
    Handled(HookReply),
    Declined,
    /// The hook itself is sound but hit a server-side fault handling this one
    /// request (e.g. a producer I/O error) — distinct from `Declined`, which
    /// means "not mine, try the next hook."
    Error(AppError),
}

#[async_trait]
pub trait Hook: Send + Sync {
    async fn evaluate(&self, req: &mut RequestData) -> HookOutcome;
}

/// Append-only list of hooks, walked in registration order. Registration
/// happens once at startup; iteration afterward takes no lock.
pub struct HookRegistry {
    hooks: Vec<Arc<dyn Hook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    pub fn register(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Walk the chain; the first hook to claim the request wins. Every
    /// outcome is logged on the `http_access` target (routed to `--http-log`
    /// by `main`'s logging setup), independent of the application-level
    /// `--debug-log` stream the individual hooks log to. A hook-level
    /// `Error` short-circuits the chain and propagates to the caller instead
    /// of falling through to the next hook — a producer fault on this one
    /// path is not "not found," it's a 500 (spec §7).
    pub async fn evaluate(&self, req: &mut RequestData) -> Result<HookReply, AppError> {
        for hook in &self.hooks {
            match hook.evaluate(req).await {
                HookOutcome::Handled(reply) => {
                    tracing::info!(
                        target: "http_access",
                        method = %req.method,
                        path = %req.path,
                        status = reply.status,
                        remote = %req.remote_addr,
                        "request"
                    );
                    return Ok(reply);
                }
                HookOutcome::Error(err) => {
                    tracing::info!(
                        target: "http_access",
                        method = %req.method,
                        path = %req.path,
                        status = 500,
                        remote = %req.remote_addr,
                        "request"
                    );
                    return Err(err);
                }
                HookOutcome::Declined => continue,
            }
        }
        let reply = HookReply::status(404, "not found");
        tracing::info!(
            target: "http_access",
            method = %req.method,
            path = %req.path,
            status = reply.status,
            remote = %req.remote_addr,
            "request"
        );
        Ok(reply)
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) fn test_request(path: &str) -> RequestData {
    RequestData {
        method: "GET".to_string(),
        path: path.to_string(),
        query: Vec::new(),
        headers: HashMap::new(),
        cookies: HashMap::new(),
        remote_addr: "127.0.0.1".to_string(),
        timestamp_millis: 0,
        referer: None,
        user_agent: None,
        extra_data: HashMap::new(),
    }
}
