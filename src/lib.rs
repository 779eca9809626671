pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod services;

pub use error::Error;

// Re-export main components for easier use
pub use services::{
    AlertPipeline, AlertStore, AlertWindowService, CandidateWindow, Classifier, Detector,
    InferencePool, SidecarDetector, UploadStore,
};
