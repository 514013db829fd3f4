//! HTTP routes for insurance-predictor
//!
//! - `GET /health` - liveness and component status
//! - `POST /auth/register`, `POST /auth/login`, `POST /auth/logout`
//! - `GET /session`, `POST /session/view`
//! - `POST /predict`, `GET /reports/{file}`
//! - `GET /admin/records`, `POST /admin/records/delete`
//! - `GET /admin/model`, `POST /admin/model/reload`

pub mod admin;
pub mod auth_routes;
pub mod health;
pub mod predict;
pub mod session_routes;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::HeaderMap;
use hyper::{header, Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::error::{PredictorError, Result};
use crate::server::AppState;
use crate::session::Session;

pub use admin::{handle_delete_records, handle_list_records, handle_model_reload, handle_model_status};
pub use auth_routes::{handle_login, handle_logout, handle_register};
pub use health::health_check;
pub use predict::{handle_get_report, handle_predict};
pub use session_routes::{handle_get_session, handle_select_view};

const MAX_BODY_BYTES: usize = 10240;

/// Error type request bodies must convert into
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(json)))
        .unwrap()
}

/// HTTP status for an error surfaced at the route boundary
pub fn status_for(err: &PredictorError) -> StatusCode {
    match err {
        PredictorError::DuplicateUser(_) => StatusCode::CONFLICT,
        PredictorError::WeakPassword(_)
        | PredictorError::InvalidInput(_)
        | PredictorError::Json(_) => StatusCode::BAD_REQUEST,
        PredictorError::UnknownUser(_)
        | PredictorError::BadCredentials
        | PredictorError::Unauthorized => StatusCode::UNAUTHORIZED,
        PredictorError::NotFound(_) => StatusCode::NOT_FOUND,
        PredictorError::ShapeMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        PredictorError::StoreEmpty => StatusCode::OK,
        PredictorError::DatasetError(_)
        | PredictorError::StoreReadError(_)
        | PredictorError::Io(_)
        | PredictorError::Csv(_)
        | PredictorError::Config(_)
        | PredictorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn error_response(err: &PredictorError) -> Response<Full<Bytes>> {
    json_response(
        status_for(err),
        &ErrorResponse {
            error: err.to_string(),
            code: err.code().to_string(),
        },
    )
}

/// Read and decode a JSON request body
///
/// Reading stops once the body passes `MAX_BODY_BYTES`.
pub async fn parse_json_body<T, B>(req: Request<B>) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
    B: Body,
    B::Error: Into<BoxError>,
{
    let body = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                PredictorError::InvalidInput("Request body too large".into())
            } else {
                PredictorError::InvalidInput(format!("Failed to read body: {}", e))
            }
        })?;

    serde_json::from_slice(&body.to_bytes())
        .map_err(|e| PredictorError::InvalidInput(format!("Invalid JSON: {}", e)))
}

/// Token from `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// The session behind the request's bearer token, with the token itself
pub fn require_session(headers: &HeaderMap, state: &AppState) -> Result<(String, Session)> {
    let token = bearer_token(headers).ok_or(PredictorError::Unauthorized)?;
    let session = state.sessions.get(token).ok_or(PredictorError::Unauthorized)?;
    Ok((token.to_string(), session))
}

/// Route a request to its handler
///
/// Handler errors become JSON error bodies here; nothing propagates to the
/// connection.
pub async fn handle_request<B>(req: Request<B>, state: Arc<AppState>) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!(method = %method, path = %path, "Incoming request");

    let result = match (&method, path.as_str()) {
        (&Method::GET, "/health") => Ok(health_check(&state).await),

        (&Method::POST, "/auth/register") => handle_register(req, &state).await,
        (&Method::POST, "/auth/login") => handle_login(req, &state).await,
        (&Method::POST, "/auth/logout") => handle_logout(req, &state).await,

        (&Method::GET, "/session") => Ok(handle_get_session(req, &state)),
        (&Method::POST, "/session/view") => handle_select_view(req, &state).await,

        (&Method::POST, "/predict") => handle_predict(req, &state).await,
        (&Method::GET, p) if p.starts_with("/reports/") => {
            let name = p.strip_prefix("/reports/").unwrap_or("");
            handle_get_report(req.headers(), &state, name).await
        }

        (&Method::GET, "/admin/records") => handle_list_records(req.headers(), &state).await,
        (&Method::POST, "/admin/records/delete") => handle_delete_records(req, &state).await,
        (&Method::GET, "/admin/model") => handle_model_status(req.headers(), &state).await,
        (&Method::POST, "/admin/model/reload") => handle_model_reload(req.headers(), &state).await,

        _ => Err(PredictorError::NotFound(format!("{} {}", method, path))),
    };

    match result {
        Ok(response) => response,
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() {
                error!(method = %method, path = %path, error = %e, "Request error");
            } else {
                warn!(method = %method, path = %path, status = status.as_u16(), error = %e, "Request rejected");
            }
            error_response(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&PredictorError::DuplicateUser("a".into())), StatusCode::CONFLICT);
        assert_eq!(status_for(&PredictorError::BadCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_for(&PredictorError::ShapeMismatch { expected: 7, actual: 6 }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&PredictorError::DatasetError("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer abc-123".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc-123"));

        headers.insert(header::AUTHORIZATION, "Basic xyz".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }

    #[tokio::test]
    async fn test_parse_json_body_rejects_large_and_invalid() {
        let big = format!("{{\"pad\":\"{}\"}}", "x".repeat(MAX_BODY_BYTES));
        let req = Request::new(Full::new(Bytes::from(big)));
        let err = parse_json_body::<serde_json::Value, _>(req).await.unwrap_err();
        assert!(err.to_string().contains("too large"));

        let req = Request::new(Full::new(Bytes::from_static(b"{nope")));
        let err = parse_json_body::<serde_json::Value, _>(req).await.unwrap_err();
        assert!(matches!(err, PredictorError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_parse_json_body_limit_is_inclusive() {
        let pad = "x".repeat(MAX_BODY_BYTES - "{\"pad\":\"\"}".len());
        let exact = format!("{{\"pad\":\"{}\"}}", pad);
        assert_eq!(exact.len(), MAX_BODY_BYTES);
        let req = Request::new(Full::new(Bytes::from(exact)));
        assert!(parse_json_body::<serde_json::Value, _>(req).await.is_ok());

        let over = format!("{{\"pad\":\"{}x\"}}", pad);
        let req = Request::new(Full::new(Bytes::from(over)));
        let err = parse_json_body::<serde_json::Value, _>(req).await.unwrap_err();
        assert!(err.to_string().contains("too large"));
    }
}
