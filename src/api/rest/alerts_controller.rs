use crate::api::rest::{ApiResult, AppState};
use crate::db::models::{Alert, AlertFilter};
use crate::error::Error;
use crate::services::inference::{run_inference, FrameJob};
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::response::Json;
use chrono::Utc;
use log::{info, warn};
use serde::Deserialize;
use serde_json::{json, Value};

/// Body of a single delete. Older clients send the image path; the stored
/// record decides which file is removed.
#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub image_path: Option<String>,
}

/// Fields of an image upload form
struct UploadForm {
    file_name: Option<String>,
    bytes: Bytes,
    lat: Option<f64>,
    lon: Option<f64>,
}

impl UploadForm {
    fn gps(&self, default_gps: &str) -> String {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => format!("{},{}", lat, lon),
            _ => default_gps.to_string(),
        }
    }
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, Error> {
    let mut file = None;
    let mut lat = None;
    let mut lon = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidInput(format!("Malformed multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| Error::InvalidInput(format!("Failed to read file: {}", e)))?;
                file = Some((file_name, bytes));
            }
            Some(coord @ ("lat" | "lon")) => {
                let coord = coord.to_string();
                let text = field
                    .text()
                    .await
                    .map_err(|e| Error::InvalidInput(format!("Failed to read {}: {}", coord, e)))?;
                let value = parse_coordinate(&coord, &text)?;
                if coord == "lat" {
                    lat = value;
                } else {
                    lon = value;
                }
            }
            _ => {}
        }
    }

    let (file_name, bytes) =
        file.ok_or_else(|| Error::InvalidInput("Missing file field".to_string()))?;

    Ok(UploadForm {
        file_name,
        bytes,
        lat,
        lon,
    })
}

fn parse_coordinate(name: &str, text: &str) -> Result<Option<f64>, Error> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    text.parse::<f64>()
        .map(Some)
        .map_err(|_| Error::InvalidInput(format!("Invalid {}: {}", name, text)))
}

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "AI-SAR backend is live" }))
}

pub async fn health(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let healthy = state.store.health_check().await?;
    Ok(Json(json!({
        "status": if healthy { "ok" } else { "degraded" },
        "store": healthy,
    })))
}

/// Single image upload: inference runs inline and the outcome is returned
pub async fn create_alert(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let form = read_upload_form(multipart).await?;
    let stored = state
        .store
        .uploads()
        .save(form.file_name.as_deref(), &form.bytes)
        .await?;
    let gps = form.gps(&state.default_gps);

    let result = run_inference(state.detector.clone(), stored.path.clone()).await?;

    match state.pipeline.process(&result, &stored.filename, &gps).await? {
        Some(alert) => Ok(Json(json!({ "message": "Alert saved", "alert": alert }))),
        None => Ok(Json(json!({ "message": "No alert generated" }))),
    }
}

/// Webcam frame: queued for inference, acknowledged immediately
pub async fn handle_webcam_frame(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let form = read_upload_form(multipart).await?;
    let stored = state
        .store
        .uploads()
        .save(form.file_name.as_deref(), &form.bytes)
        .await?;

    let job = FrameJob {
        path: stored.path,
        filename: stored.filename,
        gps: form.gps(&state.default_gps),
        accepted_at: Utc::now(),
    };

    if let Err(job) = state.inference_pool.dispatch(job) {
        warn!("Inference queue full, dropping frame {}", job.filename);
        if let Err(e) = state.store.uploads().remove(&job.filename).await {
            warn!("Failed to remove dropped frame {}: {}", job.filename, e);
        }
        return Err(Error::Unavailable("Inference queue is full".to_string()).into());
    }

    Ok(Json(json!({ "message": "Frame accepted for processing" })))
}

pub async fn get_alerts(State(state): State<AppState>) -> ApiResult<Json<Vec<Alert>>> {
    let alerts = state.store.list_all().await?;
    Ok(Json(alerts))
}

pub async fn mark_seen(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let updated = state.store.mark_seen(&id).await?;
    Ok(Json(json!({ "updated": updated })))
}

pub async fn mark_all_seen(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let updated = state.store.mark_all_seen().await?;
    Ok(Json(json!({ "updated": updated })))
}

pub async fn delete_alert(
    State(state): State<AppState>,
    Path(id): Path<String>,
    _payload: Option<Json<DeleteRequest>>,
) -> ApiResult<Json<Value>> {
    let outcome = state.store.delete_by_id(&id).await?;
    info!("Deleted alert {}: {} record(s)", id, outcome.deleted);
    Ok(Json(json!({ "deleted": outcome.deleted })))
}

pub async fn delete_by_filter(
    State(state): State<AppState>,
    payload: Result<Json<AlertFilter>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(filter) =
        payload.map_err(|e| Error::InvalidInput(format!("Invalid filter: {}", e.body_text())))?;
    let outcome = state.store.delete_by_filter(&filter).await?;
    Ok(Json(json!({
        "deleted": outcome.deleted,
        "files_deleted": outcome.files_deleted,
    })))
}
