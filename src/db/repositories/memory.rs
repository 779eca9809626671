use crate::db::models::{Alert, AlertQuery, NewAlert};
use crate::db::repositories::AlertRepository;
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-process alert repository. Nothing survives a restart; used for local
/// runs without Postgres and by tests.
#[derive(Default)]
pub struct MemoryAlertRepository {
    alerts: RwLock<Vec<Alert>>,
}

impl MemoryAlertRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlertRepository for MemoryAlertRepository {
    async fn insert(&self, alert: &NewAlert) -> Result<Alert> {
        let alert = alert.clone().into_alert(Uuid::new_v4());
        self.alerts.write().await.push(alert.clone());
        Ok(alert)
    }

    async fn list_all(&self) -> Result<Vec<Alert>> {
        let mut alerts = self.alerts.read().await.clone();
        alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(alerts)
    }

    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Alert>> {
        Ok(self.alerts.read().await.iter().find(|a| a.id == *id).cloned())
    }

    async fn mark_seen(&self, id: &Uuid) -> Result<u64> {
        let mut alerts = self.alerts.write().await;
        match alerts.iter_mut().find(|a| a.id == *id && !a.seen) {
            Some(alert) => {
                alert.seen = true;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn mark_all_seen(&self) -> Result<u64> {
        let mut alerts = self.alerts.write().await;
        let mut updated = 0;
        for alert in alerts.iter_mut().filter(|a| !a.seen) {
            alert.seen = true;
            updated += 1;
        }
        Ok(updated)
    }

    async fn delete_by_id(&self, id: &Uuid) -> Result<u64> {
        let mut alerts = self.alerts.write().await;
        let before = alerts.len();
        alerts.retain(|a| a.id != *id);
        Ok((before - alerts.len()) as u64)
    }

    async fn find_by_filter(&self, query: &AlertQuery) -> Result<Vec<Alert>> {
        let mut found: Vec<Alert> = self
            .alerts
            .read()
            .await
            .iter()
            .filter(|a| query.matches(a))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(found)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::AlertType;
    use chrono::NaiveDateTime;

    fn new_alert(alert_type: AlertType, confidence: f64, timestamp: &str) -> NewAlert {
        NewAlert {
            alert_type,
            label: "human".to_string(),
            confidence,
            image: "/uploads/x.jpg".to_string(),
            gps: "24.7136,46.6753".to_string(),
            gps_url: "https://www.google.com/maps?q=24.7136,46.6753".to_string(),
            timestamp: NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S").unwrap(),
        }
    }

    #[tokio::test]
    async fn list_all_is_newest_first() {
        let repo = MemoryAlertRepository::new();
        repo.insert(&new_alert(AlertType::Alert, 0.7, "2024-05-01T10:00:00"))
            .await
            .unwrap();
        repo.insert(&new_alert(AlertType::Critical, 0.9, "2024-05-02T10:00:00"))
            .await
            .unwrap();

        let alerts = repo.list_all().await.unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].alert_type, AlertType::Critical);
        assert!(alerts.iter().all(|a| !a.seen));
    }

    #[tokio::test]
    async fn mark_all_seen_counts_only_unseen() {
        let repo = MemoryAlertRepository::new();
        let first = repo
            .insert(&new_alert(AlertType::Alert, 0.7, "2024-05-01T10:00:00"))
            .await
            .unwrap();
        repo.insert(&new_alert(AlertType::Alert, 0.7, "2024-05-01T11:00:00"))
            .await
            .unwrap();

        assert_eq!(repo.mark_seen(&first.id).await.unwrap(), 1);
        assert_eq!(repo.mark_all_seen().await.unwrap(), 1);
        assert_eq!(repo.mark_all_seen().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_id_is_a_zero_count() {
        let repo = MemoryAlertRepository::new();
        let id = Uuid::new_v4();
        assert_eq!(repo.mark_seen(&id).await.unwrap(), 0);
        assert_eq!(repo.delete_by_id(&id).await.unwrap(), 0);
        assert!(repo.get_by_id(&id).await.unwrap().is_none());
    }
}
