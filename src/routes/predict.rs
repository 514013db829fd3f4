//! Prediction form submission and report download

use bytes::Bytes;
use chrono::{Local, Timelike};
use http_body_util::Full;
use hyper::body::Body;
use hyper::header::HeaderMap;
use hyper::{header, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{json_response, parse_json_body, require_session, BoxError};
use crate::error::{PredictorError, Result};
use crate::ledger::{PredictionInput, PredictionRecord};
use crate::report::report_belongs_to;
use crate::server::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub predicted_cost: f64,
    /// `Rs. <cost>` to two decimals
    pub display: String,
    pub record: PredictionRecord,
    /// File name under `/reports/`
    pub report: String,
}

pub fn display_cost(cost: f64) -> String {
    format!("Rs. {:.2}", cost)
}

/// POST /predict
///
/// Scores the form, appends it to the history and writes the PDF report.
pub async fn handle_predict<B>(req: Request<B>, state: &AppState) -> Result<Response<Full<Bytes>>>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let (_, session) = require_session(req.headers(), state)?;
    let input: PredictionInput = parse_json_body(req).await?;
    input.validate()?;

    let model = state.models.get_or_train().await?;
    let cost = model.predict_tuple(&input.features())?;

    let now = Local::now().naive_local();
    let timestamp = now.with_nanosecond(0).unwrap_or(now);
    let record = input.into_record(&session.username, cost, timestamp);

    state.ledger.append(&record).await?;
    let report = state.reports.write(&record).await?;

    info!(
        username = %session.username,
        cost = %display_cost(cost),
        report = %report,
        "Prediction saved"
    );

    Ok(json_response(
        StatusCode::OK,
        &PredictResponse {
            predicted_cost: cost,
            display: display_cost(cost),
            record,
            report,
        },
    ))
}

/// GET /reports/{file}
///
/// Only the user a report was generated for can download it; anyone else
/// gets the same 404 as for a missing file.
pub async fn handle_get_report(
    headers: &HeaderMap,
    state: &AppState,
    filename: &str,
) -> Result<Response<Full<Bytes>>> {
    let (_, session) = require_session(headers, state)?;
    if !report_belongs_to(filename, &session.username) {
        return Err(PredictorError::NotFound(filename.to_string()));
    }
    let bytes = state.reports.read(filename).await?;

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(Full::new(Bytes::from(bytes)))
        .unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_cost() {
        assert_eq!(display_cost(4321.5), "Rs. 4321.50");
        assert_eq!(display_cost(1725.5523), "Rs. 1725.55");
    }
}
