use crate::db::models::Alert;
use crate::services::alert_store::AlertStore;
use crate::services::classifier::Classifier;
use crate::services::inference::InferenceResult;
use anyhow::Result;
use log::debug;
use std::sync::Arc;

/// Classifier followed by the store: the path every inference result takes
/// to become an alert
pub struct AlertPipeline {
    classifier: Classifier,
    store: Arc<AlertStore>,
}

impl AlertPipeline {
    pub fn new(classifier: Classifier, store: Arc<AlertStore>) -> Self {
        Self { classifier, store }
    }

    /// Classify and persist. `Ok(None)` when the result does not qualify.
    pub async fn process(
        &self,
        result: &InferenceResult,
        filename: &str,
        gps: &str,
    ) -> Result<Option<Alert>> {
        let Some(alert) = self.classifier.classify(result, filename, gps) else {
            debug!(
                "No alert for {} ({} at {:.2})",
                filename, result.label, result.confidence
            );
            return Ok(None);
        };

        let saved = self.store.save(&alert).await?;
        Ok(Some(saved))
    }
}
