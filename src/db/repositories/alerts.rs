use crate::db::models::{Alert, AlertQuery, NewAlert};
use crate::db::repositories::AlertRepository;
use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

const ALERT_COLUMNS: &str =
    "id, alert_type, label, confidence, image, gps, gps_url, timestamp, seen";

/// Alerts repository backed by PostgreSQL
#[derive(Clone)]
pub struct PgAlertRepository {
    pool: Arc<PgPool>,
}

impl PgAlertRepository {
    /// Create a new alerts repository
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlertRepository for PgAlertRepository {
    async fn insert(&self, alert: &NewAlert) -> Result<Alert> {
        let result = sqlx::query_as::<_, Alert>(&format!(
            r#"
            INSERT INTO alerts (
                id, alert_type, label, confidence, image, gps, gps_url, timestamp, seen
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, FALSE)
            RETURNING {}
            "#,
            ALERT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(alert.alert_type)
        .bind(&alert.label)
        .bind(alert.confidence)
        .bind(&alert.image)
        .bind(&alert.gps)
        .bind(&alert.gps_url)
        .bind(alert.timestamp)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to create alert: {}", e)))?;

        Ok(result)
    }

    async fn list_all(&self) -> Result<Vec<Alert>> {
        let result = sqlx::query_as::<_, Alert>(&format!(
            "SELECT {} FROM alerts ORDER BY timestamp DESC",
            ALERT_COLUMNS
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list alerts: {}", e)))?;

        Ok(result)
    }

    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Alert>> {
        let result = sqlx::query_as::<_, Alert>(&format!(
            "SELECT {} FROM alerts WHERE id = $1",
            ALERT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get alert by ID: {}", e)))?;

        Ok(result)
    }

    async fn mark_seen(&self, id: &Uuid) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE alerts
            SET seen = TRUE
            WHERE id = $1 AND seen = FALSE
            "#,
        )
        .bind(id)
        .execute(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to mark alert seen: {}", e)))?;

        Ok(result.rows_affected())
    }

    async fn mark_all_seen(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE alerts SET seen = TRUE WHERE seen = FALSE")
            .execute(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to mark all alerts seen: {}", e)))?;

        Ok(result.rows_affected())
    }

    async fn delete_by_id(&self, id: &Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM alerts WHERE id = $1")
            .bind(id)
            .execute(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete alert: {}", e)))?;

        Ok(result.rows_affected())
    }

    async fn find_by_filter(&self, query: &AlertQuery) -> Result<Vec<Alert>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM alerts WHERE 1=1", ALERT_COLUMNS));

        if let Some(alert_type) = &query.alert_type {
            builder.push(" AND alert_type = ").push_bind(alert_type.clone());
        }

        if let Some((min, max)) = query.confidence {
            builder
                .push(" AND confidence >= ")
                .push_bind(min)
                .push(" AND confidence <= ")
                .push_bind(max);
        }

        if let Some((from, to)) = query.timestamp {
            builder
                .push(" AND timestamp >= ")
                .push_bind(from)
                .push(" AND timestamp <= ")
                .push_bind(to);
        }

        builder.push(" ORDER BY timestamp DESC");

        let result = builder
            .build_query_as::<Alert>()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to search alerts: {}", e)))?;

        Ok(result)
    }

    async fn health_check(&self) -> Result<bool> {
        match sqlx::query("SELECT 1").execute(&*self.pool).await {
            Ok(_) => Ok(true),
            Err(e) => {
                error!("Database health check failed: {}", e);
                Ok(false)
            }
        }
    }
}
