use crate::db::models::Alert;
use crate::services::classifier::is_qualifying;
use crate::services::inference::InferenceResult;
use crate::services::pipeline::AlertPipeline;
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// A qualifying webcam result waiting for its window to close
#[derive(Debug, Clone)]
pub struct AlertCandidate {
    pub result: InferenceResult,
    pub filename: String,
    pub gps: String,
    pub received_at: DateTime<Utc>,
}

/// Candidates collected during the current window.
///
/// Producers only append through [`submit`](Self::submit); the window task is
/// the only caller of [`drain_and_select_best`](Self::drain_and_select_best).
#[derive(Default)]
pub struct CandidateWindow {
    candidates: Mutex<Vec<AlertCandidate>>,
}

impl CandidateWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a candidate in arrival order. Non-qualifying results are
    /// dropped and `false` is returned.
    pub async fn submit(&self, candidate: AlertCandidate) -> bool {
        if !is_qualifying(candidate.result.confidence) {
            return false;
        }

        self.candidates.lock().await.push(candidate);
        true
    }

    /// Empty the window and return its highest-confidence candidate.
    /// On ties the earliest arrival wins.
    pub async fn drain_and_select_best(&self) -> Option<AlertCandidate> {
        let drained = std::mem::take(&mut *self.candidates.lock().await);
        let count = drained.len();

        let best = select_best(drained);
        if let Some(best) = &best {
            debug!(
                "Window closed with {} candidates, best {} at {:.2}",
                count, best.filename, best.result.confidence
            );
        }
        best
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.candidates.lock().await.len()
    }

    #[cfg(test)]
    pub async fn is_empty(&self) -> bool {
        self.candidates.lock().await.is_empty()
    }
}

fn select_best(candidates: Vec<AlertCandidate>) -> Option<AlertCandidate> {
    candidates.into_iter().reduce(|best, candidate| {
        if candidate.result.confidence > best.result.confidence {
            candidate
        } else {
            best
        }
    })
}

/// Closes a debounce window every period and persists its best candidate
pub struct AlertWindowService {
    window: Arc<CandidateWindow>,
    pipeline: Arc<AlertPipeline>,
    period: Duration,
}

impl AlertWindowService {
    pub fn new(window: Arc<CandidateWindow>, pipeline: Arc<AlertPipeline>, period_secs: u64) -> Self {
        Self {
            window,
            pipeline,
            period: Duration::from_secs(period_secs),
        }
    }

    pub fn window(&self) -> &Arc<CandidateWindow> {
        &self.window
    }

    /// Start the window loop in the background
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        info!(
            "Starting alert window service with a {} second window",
            self.period.as_secs()
        );

        tokio::spawn(async move {
            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; the first window closes one period later
            ticker.tick().await;

            loop {
                ticker.tick().await;
                self.process_window().await;
            }
        })
    }

    /// Close the current window. Failures are logged and the window's
    /// winner is dropped; the next window is unaffected.
    pub async fn process_window(&self) -> Option<Alert> {
        let best = self.window.drain_and_select_best().await?;

        match self
            .pipeline
            .process(&best.result, &best.filename, &best.gps)
            .await
        {
            Ok(Some(alert)) => {
                info!(
                    "Window alert {} from frame {} received at {}",
                    alert.id, best.filename, best.received_at
                );
                Some(alert)
            }
            Ok(None) => None,
            Err(e) => {
                error!("Failed to save alert for frame {}: {}", best.filename, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{AlertQuery, AlertType, NewAlert};
    use crate::db::repositories::{AlertRepository, MemoryAlertRepository};
    use crate::services::alert_store::AlertStore;
    use crate::services::classifier::Classifier;
    use crate::services::uploads::UploadStore;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use uuid::Uuid;

    fn candidate(confidence: f64, filename: &str) -> AlertCandidate {
        AlertCandidate {
            result: InferenceResult {
                confidence,
                label: "human".to_string(),
            },
            filename: filename.to_string(),
            gps: "24.7136,46.6753".to_string(),
            received_at: Utc::now(),
        }
    }

    /// Memory repository whose inserts can be made to fail
    #[derive(Default)]
    struct FlakyRepository {
        inner: MemoryAlertRepository,
        fail_inserts: AtomicBool,
    }

    #[async_trait]
    impl AlertRepository for FlakyRepository {
        async fn insert(&self, alert: &NewAlert) -> Result<Alert> {
            if self.fail_inserts.load(Ordering::SeqCst) {
                anyhow::bail!("store unavailable");
            }
            self.inner.insert(alert).await
        }
        async fn list_all(&self) -> Result<Vec<Alert>> {
            self.inner.list_all().await
        }
        async fn get_by_id(&self, id: &Uuid) -> Result<Option<Alert>> {
            self.inner.get_by_id(id).await
        }
        async fn mark_seen(&self, id: &Uuid) -> Result<u64> {
            self.inner.mark_seen(id).await
        }
        async fn mark_all_seen(&self) -> Result<u64> {
            self.inner.mark_all_seen().await
        }
        async fn delete_by_id(&self, id: &Uuid) -> Result<u64> {
            self.inner.delete_by_id(id).await
        }
        async fn find_by_filter(&self, query: &AlertQuery) -> Result<Vec<Alert>> {
            self.inner.find_by_filter(query).await
        }
        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        repo: Arc<FlakyRepository>,
        service: Arc<AlertWindowService>,
    }

    fn fixture(period_secs: u64) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let uploads = Arc::new(UploadStore::new(dir.path(), "/uploads").unwrap());
        let repo = Arc::new(FlakyRepository::default());
        let store = Arc::new(AlertStore::new(repo.clone(), uploads, 3).unwrap());
        let classifier = Classifier::new("/uploads", "https://www.google.com/maps?q=", 3);
        let pipeline = Arc::new(AlertPipeline::new(classifier, store));
        let service = Arc::new(AlertWindowService::new(
            Arc::new(CandidateWindow::new()),
            pipeline,
            period_secs,
        ));
        Fixture {
            _dir: dir,
            repo,
            service,
        }
    }

    #[tokio::test]
    async fn submit_drops_non_qualifying_results() {
        let window = CandidateWindow::new();
        assert!(!window.submit(candidate(0.19, "low.jpg")).await);
        assert!(window.submit(candidate(0.20, "edge.jpg")).await);
        assert_eq!(window.len().await, 1);
    }

    #[tokio::test]
    async fn drain_selects_highest_and_empties_window() {
        let window = CandidateWindow::new();
        for (confidence, name) in [(0.3, "a.jpg"), (0.9, "b.jpg"), (0.5, "c.jpg")] {
            window.submit(candidate(confidence, name)).await;
        }

        let best = window.drain_and_select_best().await.unwrap();
        assert_eq!(best.filename, "b.jpg");
        assert!(window.is_empty().await);
        assert!(window.drain_and_select_best().await.is_none());
    }

    #[tokio::test]
    async fn ties_go_to_first_arrival() {
        let window = CandidateWindow::new();
        window.submit(candidate(0.7, "first.jpg")).await;
        window.submit(candidate(0.7, "second.jpg")).await;
        window.submit(candidate(0.4, "third.jpg")).await;

        let best = window.drain_and_select_best().await.unwrap();
        assert_eq!(best.filename, "first.jpg");
    }

    #[tokio::test]
    async fn window_persists_only_the_best_candidate() {
        let f = fixture(10);
        for (confidence, name) in [(0.3, "a.jpg"), (0.9, "b.jpg"), (0.5, "c.jpg")] {
            f.service.window().submit(candidate(confidence, name)).await;
        }

        let alert = f.service.process_window().await.unwrap();
        assert_eq!(alert.alert_type, AlertType::Critical);
        assert_eq!(alert.image, "/uploads/b.jpg");

        let stored = f.repo.list_all().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(!stored[0].seen);
    }

    #[tokio::test]
    async fn empty_window_creates_nothing() {
        let f = fixture(10);
        assert!(f.service.process_window().await.is_none());
        assert!(f.repo.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_failure_drops_only_that_window() {
        let f = fixture(10);
        f.repo.fail_inserts.store(true, Ordering::SeqCst);
        f.service.window().submit(candidate(0.8, "lost.jpg")).await;
        assert!(f.service.process_window().await.is_none());
        assert!(f.service.window().is_empty().await);

        f.repo.fail_inserts.store(false, Ordering::SeqCst);
        f.service.window().submit(candidate(0.4, "next.jpg")).await;
        let alert = f.service.process_window().await.unwrap();
        assert_eq!(alert.alert_type, AlertType::FalsePositive);
        assert_eq!(f.repo.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_producers_lose_no_candidates() {
        let window = Arc::new(CandidateWindow::new());
        let handles: Vec<_> = (0..50)
            .map(|i| {
                let window = window.clone();
                tokio::spawn(async move {
                    window
                        .submit(candidate(0.2 + i as f64 / 100.0, &format!("{}.jpg", i)))
                        .await
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        assert_eq!(window.len().await, 50);
        let best = window.drain_and_select_best().await.unwrap();
        assert_eq!(best.filename, "49.jpg");
    }

    #[tokio::test(start_paused = true)]
    async fn background_loop_closes_windows_on_the_period() {
        let f = fixture(10);
        let handle = f.service.clone().start();

        f.service.window().submit(candidate(0.9, "a.jpg")).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(f.repo.list_all().await.unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(f.repo.list_all().await.unwrap().len(), 1);

        // The next window is independent of the first
        f.service.window().submit(candidate(0.5, "b.jpg")).await;
        f.service.window().submit(candidate(0.6, "c.jpg")).await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        let stored = f.repo.list_all().await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().any(|a| a.image == "/uploads/c.jpg"));

        handle.abort();
    }
}
