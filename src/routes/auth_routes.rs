//! Registration, login and logout
//!
//! Registration never opens a session; the client logs in afterwards.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Body;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{bearer_token, json_response, parse_json_body, BoxError, SuccessResponse};
use crate::error::{PredictorError, Result};
use crate::server::AppState;
use crate::session::{SessionEvent, SessionState, View};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
    pub view: View,
    pub message: String,
}

/// POST /auth/register
pub async fn handle_register<B>(req: Request<B>, state: &AppState) -> Result<Response<Full<Bytes>>>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let body: RegisterRequest = parse_json_body(req).await?;
    let username = body.username.trim();

    if username.is_empty() || body.password.is_empty() || body.confirm_password.is_empty() {
        return Err(PredictorError::InvalidInput("All fields are required!".into()));
    }
    if body.password != body.confirm_password {
        return Err(PredictorError::InvalidInput("Passwords do not match!".into()));
    }

    state.credentials.register(username, &body.password).await?;

    Ok(json_response(
        StatusCode::CREATED,
        &SuccessResponse {
            success: true,
            message: "Registration successful!".into(),
        },
    ))
}

/// POST /auth/login
pub async fn handle_login<B>(req: Request<B>, state: &AppState) -> Result<Response<Full<Bytes>>>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let body: LoginRequest = parse_json_body(req).await?;
    let username = body.username.trim();

    if username.is_empty() || body.password.is_empty() {
        return Err(PredictorError::InvalidInput("Both fields are required!".into()));
    }

    let session = state.credentials.authenticate(username, &body.password).await?;
    let token = state.sessions.insert(session);
    let next = state
        .sessions
        .apply(&token, SessionEvent::LoginSucceeded(username.to_string()));

    let view = match next {
        SessionState::Authenticated { view, .. } => view,
        SessionState::Unauthenticated => View::default(),
    };

    Ok(json_response(
        StatusCode::OK,
        &LoginResponse {
            token,
            username: username.to_string(),
            view,
            message: format!("Welcome, {}!", username),
        },
    ))
}

/// POST /auth/logout
pub async fn handle_logout<B>(req: Request<B>, state: &AppState) -> Result<Response<Full<Bytes>>> {
    let token = bearer_token(req.headers()).ok_or(PredictorError::Unauthorized)?;
    let username = state
        .sessions
        .get(token)
        .map(|s| s.username)
        .ok_or(PredictorError::Unauthorized)?;

    state.sessions.apply(token, SessionEvent::Logout);
    info!(username = %username, "Logged out");

    Ok(json_response(
        StatusCode::OK,
        &SuccessResponse {
            success: true,
            message: "Logged out successfully".into(),
        },
    ))
}
