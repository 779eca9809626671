pub mod alert_store;
pub mod classifier;
pub mod debounce;
pub mod inference;
pub mod pipeline;
pub mod uploads;

pub use alert_store::AlertStore;
pub use classifier::Classifier;
pub use debounce::{AlertCandidate, AlertWindowService, CandidateWindow};
pub use inference::{Detector, InferencePool, InferenceResult, SidecarDetector};
pub use pipeline::AlertPipeline;
pub use uploads::UploadStore;
