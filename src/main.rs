use anyhow::Result;
use log::{error, info};
use sar_alerts::api::rest::{AppState, RestApi};
use sar_alerts::config;
use sar_alerts::db;
use sar_alerts::services::{
    AlertPipeline, AlertStore, AlertWindowService, CandidateWindow, Classifier, Detector,
    InferencePool, SidecarDetector, UploadStore,
};
use std::path::PathBuf;
use std::sync::Arc;

async fn run_app() -> Result<()> {
    // Config path from the first argument, then the environment
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("ALERTS_CONFIG").ok())
        .map(PathBuf::from);
    let config = config::load_config(config_path.as_deref())?;

    // Initialize logging
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.api.log_level.as_str()),
    )
    .init();
    info!("Starting SAR alert service");
    info!("Configuration loaded");

    let repository = db::build_repository(&config.database).await?;

    let uploads = Arc::new(UploadStore::from_config(&config.uploads)?);
    info!("Storing uploads in {}", uploads.dir().display());

    let store = Arc::new(AlertStore::new(
        repository,
        uploads.clone(),
        config.alerts.utc_offset_hours,
    )?);

    let classifier = Classifier::from_config(&config.alerts, uploads.public_prefix());
    let pipeline = Arc::new(AlertPipeline::new(classifier, store.clone()));

    let detector: Arc<dyn Detector> = Arc::new(SidecarDetector::from_config(&config.inference));

    // Webcam frames flow through the pool into the debounce window
    let window = Arc::new(CandidateWindow::new());
    let inference_pool = Arc::new(InferencePool::start(
        detector.clone(),
        window.clone(),
        config.inference.workers,
        config.inference.queue_capacity,
    ));

    let window_service = Arc::new(AlertWindowService::new(
        window,
        pipeline.clone(),
        config.alerts.window_secs,
    ));
    let window_task = window_service.clone().start();
    info!("Alert window service started");

    let state = AppState {
        store,
        pipeline,
        detector,
        inference_pool: inference_pool.clone(),
        default_gps: config.alerts.default_gps.clone(),
    };

    let http_server = RestApi::new(&config.api, state);
    http_server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutting down...");
        })
        .await?;

    // Pending frames and the open window are dropped
    inference_pool.shutdown();
    window_task.abort();
    info!("Alert window service stopped");

    Ok(())
}

fn main() {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run_app()) {
        eprintln!("Application error: {}", e);
        std::process::exit(1);
    }
}
