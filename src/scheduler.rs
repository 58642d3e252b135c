use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

use crate::archive::fetch::{ArchiveFetcher, FeedTransport, FetchOutcome};
use crate::archive::file_sha256;
use crate::config::now_ts;
use crate::error::FetchError;
use crate::logging::{log, log_fetch_failure, obj, v_str, Domain, Level};
use crate::retention::{cleanup_now, CleanupReport};
use crate::service::AlertService;
use crate::storage::{FetchRecord, Ledger};

/// Drives periodic fetch and cleanup against the service's store.
///
/// A failed cycle is logged and recorded; the loop waits for the next tick.
pub struct Scheduler<T: FeedTransport> {
    fetcher: ArchiveFetcher<T>,
    service: Arc<AlertService>,
    ledger: Option<Ledger>,
    fetch_every: Duration,
    cleanup_every: Duration,
}

impl<T: FeedTransport> Scheduler<T> {
    pub fn new(fetcher: ArchiveFetcher<T>, service: Arc<AlertService>, ledger: Option<Ledger>) -> Self {
        let cfg = service.config();
        Self {
            fetch_every: Duration::from_secs(cfg.fetch_every_secs.max(1)),
            cleanup_every: Duration::from_secs(cfg.cleanup_every_secs.max(1)),
            fetcher,
            service,
            ledger,
        }
    }

    pub fn ledger(&self) -> Option<&Ledger> {
        self.ledger.as_ref()
    }

    /// One fetch cycle. A new download invalidates every cached query; otherwise
    /// only expired entries are dropped.
    pub async fn fetch_once(&mut self) -> Result<FetchOutcome, FetchError> {
        let result = self.fetcher.fetch_latest().await;
        let record = match &result {
            Ok(FetchOutcome::Downloaded { path, bytes }) => {
                self.service.clear_cache();
                let hashed = path.clone();
                let sha256 = tokio::task::spawn_blocking(move || file_sha256(&hashed))
                    .await
                    .ok()
                    .and_then(|r| r.ok());
                FetchRecord {
                    ts: now_ts(),
                    status: "downloaded".to_string(),
                    path: Some(path.display().to_string()),
                    bytes: *bytes,
                    sha256,
                    error: None,
                }
            }
            Ok(FetchOutcome::AlreadyPresent { path }) => FetchRecord {
                ts: now_ts(),
                status: "already_present".to_string(),
                path: Some(path.display().to_string()),
                bytes: 0,
                sha256: None,
                error: None,
            },
            Err(err) => {
                log_fetch_failure(err.kind(), &err.to_string());
                FetchRecord {
                    ts: now_ts(),
                    status: "failed".to_string(),
                    path: None,
                    bytes: 0,
                    sha256: None,
                    error: Some(format!("{}: {}", err.kind(), err)),
                }
            }
        };
        self.record(|ledger| ledger.record_fetch(&record));

        let purged = self.service.cache().purge_expired();
        if purged > 0 {
            log(
                Level::Debug,
                Domain::Cache,
                "cache_purged",
                obj(&[("removed", serde_json::json!(purged))]),
            );
        }
        result
    }

    /// One cleanup cycle, run on a blocking thread. `None` when it failed.
    pub async fn cleanup_once(&mut self) -> Option<CleanupReport> {
        let store = self.service.store().clone();
        let keep_days = self.service.config().keep_days;
        let outcome = tokio::task::spawn_blocking(move || cleanup_now(&store, keep_days)).await;
        match outcome {
            Ok(Ok(report)) => {
                self.record(|ledger| ledger.record_cleanup(now_ts(), report.removed));
                Some(report)
            }
            Ok(Err(err)) => {
                log(
                    Level::Error,
                    Domain::Retention,
                    "cleanup_failed",
                    obj(&[("msg", v_str(&err.to_string()))]),
                );
                None
            }
            Err(err) => {
                log(
                    Level::Error,
                    Domain::Retention,
                    "cleanup_panicked",
                    obj(&[("msg", v_str(&err.to_string()))]),
                );
                None
            }
        }
    }

    /// Run forever. Both timers fire immediately on start.
    pub async fn run(mut self) {
        let mut fetch_tick = interval(self.fetch_every);
        fetch_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cleanup_tick = interval(self.cleanup_every);
        cleanup_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        log(
            Level::Info,
            Domain::System,
            "scheduler_start",
            obj(&[
                ("fetch_every_secs", serde_json::json!(self.fetch_every.as_secs())),
                ("cleanup_every_secs", serde_json::json!(self.cleanup_every.as_secs())),
            ]),
        );

        loop {
            tokio::select! {
                _ = fetch_tick.tick() => {
                    let _ = self.fetch_once().await;
                }
                _ = cleanup_tick.tick() => {
                    self.cleanup_once().await;
                }
            }
        }
    }

    fn record(&mut self, write: impl FnOnce(&mut Ledger) -> anyhow::Result<()>) {
        if let Some(ledger) = self.ledger.as_mut() {
            if let Err(err) = write(ledger) {
                log(
                    Level::Warn,
                    Domain::System,
                    "ledger_write_failed",
                    obj(&[("msg", v_str(&err.to_string()))]),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::date_dir;
    use crate::config::Config;
    use crate::filter::QueryParameters;
    use crate::store::ArchiveStore;
    use async_trait::async_trait;
    use chrono::{Duration as Days, Utc};
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    struct StubFeed {
        down: AtomicBool,
    }

    #[async_trait]
    impl FeedTransport for StubFeed {
        async fn get_text(&self, url: &str) -> Result<String, FetchError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(FetchError::Status {
                    status: 500,
                    url: url.to_string(),
                });
            }
            Ok("1 h 20240105120000.export.CSV\n".to_string())
        }

        async fn download(&self, _url: &str, dest: &Path) -> Result<u64, FetchError> {
            tokio::fs::write(dest, b"x").await?;
            Ok(1)
        }
    }

    fn scheduler(root: &Path, down: bool) -> Scheduler<StubFeed> {
        scheduler_with(Config::for_root(root), down)
    }

    fn scheduler_with(cfg: Config, down: bool) -> Scheduler<StubFeed> {
        let store = ArchiveStore::new(cfg.storage_root.clone());
        let service = Arc::new(AlertService::with_store(cfg, store.clone()));
        let feed = StubFeed {
            down: AtomicBool::new(down),
        };
        let fetcher = ArchiveFetcher::new(feed, store, "http://x/lastupdate.txt", "http://x/");
        let mut ledger = Ledger::in_memory().unwrap();
        ledger.init().unwrap();
        Scheduler::new(fetcher, service, Some(ledger))
    }

    #[tokio::test]
    async fn download_clears_cache_and_is_recorded() {
        let tmp = TempDir::new().unwrap();
        let mut sched = scheduler(tmp.path(), false);
        sched.service.cached_alerts(&QueryParameters::default());
        assert_eq!(sched.service.cache().len(), 1);

        let outcome = sched.fetch_once().await.unwrap();
        assert!(matches!(outcome, FetchOutcome::Downloaded { bytes: 1, .. }));
        assert!(sched.service.cache().is_empty());

        sched.service.cached_alerts(&QueryParameters::default());
        let again = sched.fetch_once().await.unwrap();
        assert!(matches!(again, FetchOutcome::AlreadyPresent { .. }));
        assert_eq!(sched.service.cache().len(), 1);

        let history = sched.ledger().unwrap().recent_fetches(10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].status, "downloaded");
        assert_eq!(history[1].sha256.as_deref().map(str::len), Some(64));
        assert_eq!(history[0].status, "already_present");
    }

    #[tokio::test]
    async fn failed_fetch_is_recorded_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let mut sched = scheduler(tmp.path(), true);
        let err = sched.fetch_once().await.unwrap_err();
        assert_eq!(err.kind(), "http_status");
        sched.fetcher_transport_up();
        assert!(sched.fetch_once().await.is_ok());

        let history = sched.ledger().unwrap().recent_fetches(10).unwrap();
        assert_eq!(history[1].status, "failed");
        assert!(history[1].error.as_deref().unwrap().starts_with("http_status"));
    }

    #[tokio::test]
    async fn fetch_tick_purges_expired_entries() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = Config::for_root(tmp.path());
        cfg.cache_ttl_secs = 0;
        let mut sched = scheduler_with(cfg, true);
        sched.service.cached_alerts(&QueryParameters::default());
        assert_eq!(sched.service.cache().len(), 1);

        assert!(sched.fetch_once().await.is_err());
        assert!(sched.service.cache().is_empty());
    }

    #[tokio::test]
    async fn cleanup_cycle_records_removals() {
        let tmp = TempDir::new().unwrap();
        let today = Utc::now().date_naive();
        for back in [0, 30, 31] {
            std::fs::create_dir_all(date_dir(tmp.path(), today - Days::days(back))).unwrap();
        }
        let mut sched = scheduler(tmp.path(), false);
        let report = sched.cleanup_once().await.unwrap();
        assert_eq!(report.removed, 2);
        assert_eq!(report.kept, 1);
        assert_eq!(sched.ledger().unwrap().total_removed().unwrap(), 2);
    }

    impl Scheduler<StubFeed> {
        fn fetcher_transport_up(&self) {
            self.fetcher.transport().down.store(false, Ordering::SeqCst);
        }
    }
}
