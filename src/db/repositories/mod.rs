use crate::db::models::{Alert, AlertQuery, NewAlert};
use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

pub mod alerts;
pub mod memory;

pub use alerts::PgAlertRepository;
pub use memory::MemoryAlertRepository;

/// Record-level contract of the alert store. Each call is atomic on its own;
/// nothing spans more than one call.
#[async_trait]
pub trait AlertRepository: Send + Sync {
    /// Insert a new alert. The stored record is always unseen.
    async fn insert(&self, alert: &NewAlert) -> Result<Alert>;

    /// All alerts, newest first
    async fn list_all(&self) -> Result<Vec<Alert>>;

    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Alert>>;

    /// Returns 1 if an unseen alert was flipped, 0 otherwise
    async fn mark_seen(&self, id: &Uuid) -> Result<u64>;

    /// Returns the number of alerts flipped from unseen to seen
    async fn mark_all_seen(&self) -> Result<u64>;

    async fn delete_by_id(&self, id: &Uuid) -> Result<u64>;

    async fn find_by_filter(&self, query: &AlertQuery) -> Result<Vec<Alert>>;

    async fn health_check(&self) -> Result<bool>;
}
