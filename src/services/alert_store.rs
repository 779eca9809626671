use crate::db::models::{Alert, AlertFilter, DeleteOutcome, NewAlert};
use crate::db::repositories::AlertRepository;
use crate::services::uploads::UploadStore;
use anyhow::Result;
use crate::error::Error;
use chrono::FixedOffset;
use log::{info, warn};
use std::sync::Arc;
use uuid::Uuid;

/// Alert records together with their image files. Every delete goes through
/// here, so removing a record also removes its image.
pub struct AlertStore {
    repo: Arc<dyn AlertRepository>,
    uploads: Arc<UploadStore>,
    offset: FixedOffset,
}

impl AlertStore {
    pub fn new(
        repo: Arc<dyn AlertRepository>,
        uploads: Arc<UploadStore>,
        utc_offset_hours: i32,
    ) -> Result<Self> {
        let offset = utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                Error::Config(format!("UTC offset out of range: {} hours", utc_offset_hours))
            })?;

        Ok(Self {
            repo,
            uploads,
            offset,
        })
    }

    pub fn uploads(&self) -> &Arc<UploadStore> {
        &self.uploads
    }

    /// Persist a classified alert; it is always stored unseen
    pub async fn save(&self, alert: &NewAlert) -> Result<Alert> {
        let saved = self.repo.insert(alert).await?;
        info!(
            "Alert saved: {} ({}, {}, {:.2})",
            saved.id, saved.alert_type, saved.label, saved.confidence
        );
        Ok(saved)
    }

    pub async fn list_all(&self) -> Result<Vec<Alert>> {
        self.repo.list_all().await
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<Alert>> {
        match parse_id(id) {
            Some(id) => self.repo.get_by_id(&id).await,
            None => Ok(None),
        }
    }

    pub async fn mark_seen(&self, id: &str) -> Result<u64> {
        match parse_id(id) {
            Some(id) => self.repo.mark_seen(&id).await,
            None => Ok(0),
        }
    }

    pub async fn mark_all_seen(&self) -> Result<u64> {
        self.repo.mark_all_seen().await
    }

    /// Delete one alert and its image. Unknown ids delete nothing.
    pub async fn delete_by_id(&self, id: &str) -> Result<DeleteOutcome> {
        let Some(alert) = self.get_by_id(id).await? else {
            return Ok(DeleteOutcome::default());
        };

        let mut outcome = DeleteOutcome::default();
        self.delete_alert(&alert, &mut outcome).await?;
        Ok(outcome)
    }

    /// Delete every alert matching the filter along with its image.
    ///
    /// Not atomic as a whole: matches are looked up once, then removed one by
    /// one. Alerts inserted meanwhile may or may not be included.
    pub async fn delete_by_filter(&self, filter: &AlertFilter) -> Result<DeleteOutcome> {
        let query = filter.resolve(self.offset);
        let alerts = self.repo.find_by_filter(&query).await?;

        let mut outcome = DeleteOutcome::default();
        for alert in &alerts {
            self.delete_alert(alert, &mut outcome).await?;
        }

        info!(
            "Deleted {} of {} alerts matching filter, {} files removed",
            outcome.deleted,
            alerts.len(),
            outcome.files_deleted.len()
        );

        Ok(outcome)
    }

    pub async fn health_check(&self) -> Result<bool> {
        self.repo.health_check().await
    }

    async fn delete_alert(&self, alert: &Alert, outcome: &mut DeleteOutcome) -> Result<()> {
        // A file that cannot be removed never blocks removing the record
        match self.uploads.remove(&alert.image).await {
            Ok(true) => outcome.files_deleted.push(alert.image.clone()),
            Ok(false) => {}
            Err(e) => warn!("Failed to delete image for alert {}: {}", alert.id, e),
        }

        outcome.deleted += self.repo.delete_by_id(&alert.id).await?;
        Ok(())
    }
}

fn parse_id(id: &str) -> Option<Uuid> {
    Uuid::parse_str(id).ok()
}
