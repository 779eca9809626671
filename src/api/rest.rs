use crate::config::ApiConfig;
use crate::error::Error;
use crate::services::{AlertPipeline, AlertStore, Detector, InferencePool};
use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use log::info;
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;

pub mod alerts_controller;


// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<AlertStore>,
    pub pipeline: Arc<AlertPipeline>,
    pub detector: Arc<dyn Detector>,
    pub inference_pool: Arc<InferencePool>,
    /// Coordinates recorded when an upload has no lat/lon
    pub default_gps: String,
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(rename = "error")]
    pub message: String,
    #[serde(skip)]
    pub status: u16,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match err {
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        ApiError {
            message: err.to_string(),
            status: status.as_u16(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(err) = err.downcast_ref::<Error>() {
            return (*err).clone().into();
        }

        ApiError {
            message: err.to_string(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(self);
        (status, body).into_response()
    }
}

pub struct RestApi {
    config: ApiConfig,
    state: AppState,
}

impl RestApi {
    pub fn new(config: &ApiConfig, state: AppState) -> Self {
        Self {
            config: config.clone(),
            state,
        }
    }

    /// Build the full application router
    pub fn router(&self) -> Router {
        let uploads = self.state.store.uploads().clone();

        let cors = if self.config.allowed_origins.is_empty() {
            CorsLayer::new().allow_origin(Any)
        } else {
            let origins: Vec<HeaderValue> = self
                .config
                .allowed_origins
                .iter()
                .filter_map(|origin| origin.parse().ok())
                .collect();
            CorsLayer::new().allow_origin(AllowOrigin::list(origins))
        }
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600));

        Router::new()
            .route("/", get(alerts_controller::root))
            .route("/api/health", get(alerts_controller::health))
            .route("/api/alert", post(alerts_controller::create_alert))
            .route("/api/webcam", post(alerts_controller::handle_webcam_frame))
            .route("/api/alerts", get(alerts_controller::get_alerts))
            .route("/api/alerts/seen", patch(alerts_controller::mark_all_seen))
            .route(
                "/api/alerts/delete_by_filter",
                post(alerts_controller::delete_by_filter),
            )
            .route("/api/alerts/:id", delete(alerts_controller::delete_alert))
            .route("/api/alerts/:id/seen", patch(alerts_controller::mark_seen))
            .with_state(self.state.clone())
            // Uploaded images are served back to clients
            .nest_service(uploads.public_prefix(), ServeDir::new(uploads.dir()))
            .layer(DefaultBodyLimit::max(self.config.max_upload_mb * 1024 * 1024))
            .layer(cors)
    }

    /// Serve until `shutdown` resolves
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let app = self.router();

        // Build the server address
        let addr = self.config.address.clone() + ":" + &self.config.port.to_string();
        let addr: SocketAddr = addr.parse()?;

        info!("API server listening on {}", addr);

        let listener = TcpListener::bind(addr).await?;

        axum::Server::from_tcp(listener.into_std()?)?
            .serve(app.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
