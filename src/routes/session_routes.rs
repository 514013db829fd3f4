//! Session state and view selection

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Body;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;

use super::{bearer_token, json_response, parse_json_body, require_session, BoxError};
use crate::error::Result;
use crate::server::AppState;
use crate::session::{SessionEvent, View};

#[derive(Debug, Deserialize)]
pub struct SelectViewRequest {
    pub view: View,
}

/// GET /session
///
/// Missing or unknown tokens report the unauthenticated state.
pub fn handle_get_session<B>(req: Request<B>, state: &AppState) -> Response<Full<Bytes>> {
    let current = state.sessions.state(bearer_token(req.headers()));
    json_response(StatusCode::OK, &current)
}

/// POST /session/view
pub async fn handle_select_view<B>(req: Request<B>, state: &AppState) -> Result<Response<Full<Bytes>>>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let (token, _) = require_session(req.headers(), state)?;
    let body: SelectViewRequest = parse_json_body(req).await?;

    let next = state.sessions.apply(&token, SessionEvent::SelectView(body.view));
    Ok(json_response(StatusCode::OK, &next))
}
