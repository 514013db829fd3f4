//! Admin panel: prediction history and model maintenance

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Body;
use hyper::header::HeaderMap;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;

use super::{json_response, parse_json_body, require_session, BoxError};
use crate::error::{PredictorError, Result};
use crate::ledger::{DietType, LedgerEntry, Region, Sex, StressLevel, YesNo, TIMESTAMP_FORMAT};
use crate::server::AppState;

/// One row of the admin table; the owning username is not shown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminRow {
    #[serde(rename = "Record ID")]
    pub record_id: usize,
    #[serde(rename = "Full Name")]
    pub full_name: String,
    #[serde(rename = "Age")]
    pub age: u32,
    #[serde(rename = "Sex")]
    pub sex: Sex,
    #[serde(rename = "BMI")]
    pub bmi: f64,
    #[serde(rename = "Smoker")]
    pub smoker: YesNo,
    #[serde(rename = "Region")]
    pub region: Region,
    #[serde(rename = "Children")]
    pub children: u32,
    #[serde(rename = "Alcohol Consumption")]
    pub alcohol_consumption: YesNo,
    #[serde(rename = "Family Disease History")]
    pub family_history: YesNo,
    #[serde(rename = "Stress Level")]
    pub stress_level: StressLevel,
    #[serde(rename = "Exercise Days")]
    pub exercise_days: u32,
    #[serde(rename = "Sleep Hours")]
    pub sleep_hours: u32,
    #[serde(rename = "Diet Type")]
    pub diet_type: DietType,
    #[serde(rename = "Predicted Cost")]
    pub predicted_cost: f64,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
}

impl From<LedgerEntry> for AdminRow {
    fn from(entry: LedgerEntry) -> Self {
        let r = entry.record;
        Self {
            record_id: entry.record_id,
            full_name: r.full_name,
            age: r.age,
            sex: r.sex,
            bmi: r.bmi,
            smoker: r.smoker,
            region: r.region,
            children: r.children,
            alcohol_consumption: r.alcohol_consumption,
            family_history: r.family_history,
            stress_level: r.stress_level,
            exercise_days: r.exercise_days,
            sleep_hours: r.sleep_hours,
            diet_type: r.diet_type,
            predicted_cost: r.predicted_cost,
            timestamp: r.timestamp.format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordsResponse {
    pub records: Vec<AdminRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    pub ids: BTreeSet<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub deleted: usize,
    pub message: String,
}

/// GET /admin/records
pub async fn handle_list_records(headers: &HeaderMap, state: &AppState) -> Result<Response<Full<Bytes>>> {
    require_session(headers, state)?;

    let body = match state.ledger.list().await {
        Ok(entries) if entries.is_empty() => RecordsResponse {
            records: Vec::new(),
            message: Some("No records found in prediction history.".into()),
        },
        Ok(entries) => RecordsResponse {
            records: entries.into_iter().map(AdminRow::from).collect(),
            message: None,
        },
        Err(PredictorError::StoreEmpty) => {
            let message = if state.ledger.exists().await {
                "Prediction history file is empty!".to_string()
            } else {
                PredictorError::StoreEmpty.to_string()
            };
            RecordsResponse {
                records: Vec::new(),
                message: Some(message),
            }
        }
        Err(e) => return Err(e),
    };

    Ok(json_response(StatusCode::OK, &body))
}

/// POST /admin/records/delete
///
/// Ids are the `Record ID`s of the most recent listing.
pub async fn handle_delete_records<B>(req: Request<B>, state: &AppState) -> Result<Response<Full<Bytes>>>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let (_, session) = require_session(req.headers(), state)?;
    let body: DeleteRequest = parse_json_body(req).await?;

    if body.ids.is_empty() {
        return Ok(json_response(
            StatusCode::OK,
            &DeleteResponse {
                deleted: 0,
                message: "No records selected for deletion.".into(),
            },
        ));
    }

    let deleted = state.ledger.delete(&body.ids).await?;
    info!(username = %session.username, requested = body.ids.len(), deleted, "Admin deleted records");

    Ok(json_response(
        StatusCode::OK,
        &DeleteResponse {
            deleted,
            message: format!("Deleted {} record(s).", deleted),
        },
    ))
}

/// GET /admin/model
pub async fn handle_model_status(headers: &HeaderMap, state: &AppState) -> Result<Response<Full<Bytes>>> {
    require_session(headers, state)?;
    Ok(json_response(StatusCode::OK, &state.models.status().await))
}

/// POST /admin/model/reload
pub async fn handle_model_reload(headers: &HeaderMap, state: &AppState) -> Result<Response<Full<Bytes>>> {
    let (_, session) = require_session(headers, state)?;
    state.models.reload().await?;
    info!(username = %session.username, "Model reloaded by admin");
    Ok(json_response(StatusCode::OK, &state.models.status().await))
}
