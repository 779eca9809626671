use crate::config::InferenceConfig;
use crate::error::Error;
use crate::services::debounce::{AlertCandidate, CandidateWindow};
use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Output of one model call on one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
    /// Detection confidence in [0, 1]
    pub confidence: f64,
    pub label: String,
}

/// Opaque object detector. Calls block and may be CPU-heavy; run them
/// through [`run_inference`] from async code.
pub trait Detector: Send + Sync {
    fn infer(&self, image: &Path) -> Result<InferenceResult>;
}

/// Runs an external detector process per image.
///
/// The image path is appended to the configured arguments and the process
/// must print a JSON object `{"confidence": <0..1>, "label": "<name>"}` on
/// stdout. Earlier non-JSON lines (model loading chatter) are ignored.
pub struct SidecarDetector {
    program: String,
    args: Vec<String>,
}

impl SidecarDetector {
    pub fn new(program: &str, args: &[String]) -> Self {
        Self {
            program: program.to_string(),
            args: args.to_vec(),
        }
    }

    pub fn from_config(config: &InferenceConfig) -> Self {
        Self::new(&config.command, &config.args)
    }
}

impl Detector for SidecarDetector {
    fn infer(&self, image: &Path) -> Result<InferenceResult> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(image)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::Inference(format!("Failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Inference(format!(
                "Detector exited with {}: {}",
                output.status,
                stderr.trim()
            ))
            .into());
        }

        parse_detector_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Take the last line of detector stdout that parses as a result
fn parse_detector_output(stdout: &str) -> Result<InferenceResult> {
    let result = stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .find_map(|line| serde_json::from_str::<InferenceResult>(line).ok())
        .ok_or_else(|| Error::Inference("Detector produced no result".to_string()))?;

    if !(0.0..=1.0).contains(&result.confidence) {
        return Err(Error::Inference(format!(
            "Detector confidence out of range: {}",
            result.confidence
        ))
        .into());
    }

    Ok(result)
}

/// Run a blocking detector call off the async executor
pub async fn run_inference(detector: Arc<dyn Detector>, image: PathBuf) -> Result<InferenceResult> {
    tokio::task::spawn_blocking(move || detector.infer(&image))
        .await
        .map_err(|e| Error::Internal(format!("Inference task failed: {}", e)))?
}

/// A webcam frame waiting for inference
#[derive(Debug, Clone)]
pub struct FrameJob {
    pub path: PathBuf,
    pub filename: String,
    pub gps: String,
    pub accepted_at: DateTime<Utc>,
}

/// Bounded queue of webcam frames drained by a fixed set of workers. Each
/// qualifying result is submitted to the candidate window.
pub struct InferencePool {
    sender: mpsc::Sender<FrameJob>,
    workers: Vec<JoinHandle<()>>,
}

impl InferencePool {
    /// Spawn `workers` tasks consuming a queue of `capacity` frames
    pub fn start(
        detector: Arc<dyn Detector>,
        window: Arc<CandidateWindow>,
        workers: usize,
        capacity: usize,
    ) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        info!(
            "Starting inference pool with {} workers, queue capacity {}",
            workers,
            capacity.max(1)
        );

        let handles = (0..workers)
            .map(|worker_id| {
                let receiver = receiver.clone();
                let detector = detector.clone();
                let window = window.clone();
                tokio::spawn(async move {
                    loop {
                        let job = receiver.lock().await.recv().await;
                        let Some(job) = job else {
                            debug!("Inference worker {} stopping", worker_id);
                            break;
                        };
                        process_frame(detector.clone(), &window, job).await;
                    }
                })
            })
            .collect();

        Self {
            sender,
            workers: handles,
        }
    }

    /// Queue a frame without waiting. Hands the job back when the queue is full.
    pub fn dispatch(&self, job: FrameJob) -> std::result::Result<(), FrameJob> {
        self.sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(job) | mpsc::error::TrySendError::Closed(job) => job,
        })
    }

    pub fn shutdown(&self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}

async fn process_frame(detector: Arc<dyn Detector>, window: &CandidateWindow, job: FrameJob) {
    match run_inference(detector, job.path.clone()).await {
        Ok(result) => {
            let confidence = result.confidence;
            let accepted = window
                .submit(AlertCandidate {
                    result,
                    filename: job.filename.clone(),
                    gps: job.gps,
                    received_at: job.accepted_at,
                })
                .await;

            if accepted {
                debug!("Frame {} queued as candidate ({:.2})", job.filename, confidence);
            } else {
                debug!("Frame {} below threshold ({:.2})", job.filename, confidence);
            }
        }
        Err(e) => {
            error!("Inference failed for {}: {}", job.filename, e);
        }
    }
}
