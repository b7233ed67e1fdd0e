//! The error kinds distinguished in §7, collapsed into one enum so the
//! pipeline can convert any of them to an HTTP status and optional JSON body
//! at a single boundary.

use rocket::http::Status;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use rocket::{Request, Response};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed envelope, unknown type, oversized frame. Handled inline in
    /// the WS dispatch loop — never escapes to an HTTP responder.
    #[error("client protocol error: {reason}")]
    ClientProtocol { reason: &'static str },

    /// Send queue overflow, slow read. Handled by closing the connection.
    #[error("client resource exhausted")]
    ClientResource,

    /// A single request's producer I/O failed; other requests are unaffected.
    #[error("transient server error: {0}")]
    ServerTransient(String),

    /// Cannot bind, cannot load an explicitly configured key. Fatal at startup.
    #[error("fatal server error: {0}")]
    ServerFatal(String),

    /// Non-whitelisted upgrade path or unsupported subprotocol.
    #[error("upgrade rejected")]
    UpgradeRejected,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl<'r> Responder<'r, 'static> for AppError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        tracing::warn!(error = %self, "request failed");
        let (status, message) = match &self {
            AppError::ServerTransient(msg) => (Status::InternalServerError, msg.clone()),
            AppError::UpgradeRejected => (Status::NotFound, "upgrade rejected".to_string()),
            AppError::ClientProtocol { reason } => (Status::BadRequest, reason.to_string()),
            AppError::ClientResource => (Status::InternalServerError, "resource exhausted".to_string()),
            AppError::ServerFatal(msg) => (Status::InternalServerError, msg.clone()),
        };
        let body = Json(ErrorBody { error: message });
        let mut builder = Response::build_from(body.respond_to(request)?);
        builder.status(status);
        if matches!(self, AppError::UpgradeRejected) {
            builder.raw_header("Connection", "close");
        }
        builder.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::get;
    use rocket::local::blocking::Client;

    #[get("/boom")]
    fn boom() -> Result<(), AppError> {
        Err(AppError::UpgradeRejected)
    }

    #[test]
    fn upgrade_rejected_sets_connection_close_and_404() {
        let rocket = rocket::build().mount("/", rocket::routes![boom]);
        let client = Client::tracked(rocket).expect("valid rocket instance");
        let response = client.get("/boom").dispatch();
        assert_eq!(response.status(), Status::NotFound);
        assert_eq!(response.headers().get_one("Connection"), Some("close"));
    }

    #[test]
    fn client_protocol_error_maps_to_bad_request() {
        let rocket = rocket::build().mount(
            "/",
            rocket::routes![bad_request_route],
        );
        let client = Client::tracked(rocket).expect("valid rocket instance");
        let response = client.get("/bad").dispatch();
        assert_eq!(response.status(), Status::BadRequest);
    }

    #[get("/bad")]
    fn bad_request_route() -> Result<(), AppError> {
        Err(AppError::ClientProtocol { reason: "bad-frame" })
    }
}
