//! Refresh policy and refresh cycle.
//!
//! On every dashboard load the policy decides whether the persisted snapshot
//! is still fresh or a new fetch cycle should run. Two policy shapes are
//! supported: a sliding interval and a fixed allow-list of times of day.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{Local, NaiveDateTime, NaiveTime, Timelike};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::DataProvider;
use crate::config::Config;
use crate::snapshot::{truncate_to_minute, Snapshot, SnapshotStore};

/// How long a snapshot counts as fresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FreshnessPolicy {
    /// Refetch once the snapshot is at least this old.
    Interval(chrono::Duration),
    /// Refetch only when the current HH:MM exactly matches an allowed time.
    FixedTimes(Vec<NaiveTime>),
}

impl FreshnessPolicy {
    /// Short human-readable form for logs and the status endpoint.
    pub fn describe(&self) -> String {
        match self {
            FreshnessPolicy::Interval(d) => format!("every {}m", d.num_minutes()),
            FreshnessPolicy::FixedTimes(times) => {
                let list: Vec<String> =
                    times.iter().map(|t| t.format("%H:%M").to_string()).collect();
                format!("at {}", list.join(", "))
            }
        }
    }
}

/// The refresh decision. An explicit override always wins; a missing or
/// unparsable capture time counts as "no prior snapshot" and forces a fetch.
pub fn should_refetch(
    now: NaiveDateTime,
    last_captured_at: Option<NaiveDateTime>,
    override_requested: bool,
    policy: &FreshnessPolicy,
) -> bool {
    if override_requested {
        return true;
    }
    let Some(last) = last_captured_at else {
        return true;
    };
    match policy {
        FreshnessPolicy::Interval(interval) => now.signed_duration_since(last) >= *interval,
        FreshnessPolicy::FixedTimes(times) => times
            .iter()
            .any(|t| t.hour() == now.hour() && t.minute() == now.minute()),
    }
}

/// Result of one dashboard-load refresh check.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    /// Whether this load ran a fetch cycle (as opposed to reusing the cache).
    pub refreshed: bool,
    pub snapshot: Snapshot,
    /// Dataset names whose fetch failed and were substituted with empty.
    pub failed_datasets: Vec<String>,
}

/// Runs the per-load freshness check and, when stale, the fetch cycle.
///
/// Loads are serialized through a mutex so a slow refresh cannot interleave
/// with a concurrent read of the snapshot.
pub struct Refresher {
    config: Config,
    policy: FreshnessPolicy,
    provider: Arc<dyn DataProvider>,
    store: SnapshotStore,
    current: Mutex<Option<Snapshot>>,
}

impl Refresher {
    pub fn new(config: Config, provider: Arc<dyn DataProvider>) -> Result<Self> {
        let policy = config.freshness_policy()?;
        let store = SnapshotStore::new(&config.cache_file);
        Ok(Refresher {
            config,
            policy,
            provider,
            store,
            current: Mutex::new(None),
        })
    }

    pub fn policy(&self) -> &FreshnessPolicy {
        &self.policy
    }

    /// Run the refresh check against the wall clock.
    pub async fn ensure_fresh(&self, override_requested: bool) -> Result<RefreshOutcome> {
        let now = truncate_to_minute(Local::now().naive_local());
        self.ensure_fresh_at(now, override_requested).await
    }

    /// Run the refresh check at an explicit point in time.
    pub async fn ensure_fresh_at(
        &self,
        now: NaiveDateTime,
        override_requested: bool,
    ) -> Result<RefreshOutcome> {
        let mut current = self.current.lock().await;

        if current.is_none() {
            *current = self.load_prior();
        }

        if let Some(snapshot) = current.as_ref() {
            if !should_refetch(now, snapshot.captured_at(), override_requested, &self.policy) {
                debug!("Using cached data (last_update={})", snapshot.last_update);
                return Ok(RefreshOutcome {
                    refreshed: false,
                    snapshot: snapshot.clone(),
                    failed_datasets: Vec::new(),
                });
            }
        }

        info!("Fetching new data from {}", self.provider.name());
        let mut payloads = BTreeMap::new();
        let mut failed_datasets = Vec::new();
        for dataset in self.config.datasets(now.date()) {
            match self.provider.fetch(&dataset).await {
                Ok(records) => {
                    info!("Fetched {} '{}' records", records.len(), dataset.name);
                    payloads.insert(dataset.name, records);
                }
                Err(e) => {
                    warn!("Fetch for '{}' failed, substituting empty: {:#}", dataset.name, e);
                    failed_datasets.push(dataset.name.clone());
                    payloads.insert(dataset.name, Vec::new());
                }
            }
        }

        let snapshot = Snapshot::new(now, payloads);

        // Historic behavior overwrites the cache even when every fetch came
        // back empty; the opt-in partial-success mode keeps the prior data.
        if self.config.require_partial_success && snapshot.is_empty() {
            if let Some(prior) = current.as_ref() {
                warn!("All dataset fetches empty; keeping prior snapshot from {}", prior.last_update);
                return Ok(RefreshOutcome {
                    refreshed: false,
                    snapshot: prior.clone(),
                    failed_datasets,
                });
            }
        }

        self.store.save(&snapshot)?;
        *current = Some(snapshot.clone());
        Ok(RefreshOutcome {
            refreshed: true,
            snapshot,
            failed_datasets,
        })
    }

    /// The current snapshot without running the freshness check or any
    /// network activity. Loads the persisted file on first use.
    pub async fn peek(&self) -> Option<Snapshot> {
        let mut current = self.current.lock().await;
        if current.is_none() {
            *current = self.load_prior();
        }
        current.clone()
    }

    /// Load the persisted snapshot, degrading a corrupt file to "no prior
    /// snapshot" with a warning.
    fn load_prior(&self) -> Option<Snapshot> {
        match self.store.load() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Ignoring unreadable snapshot file {:?}: {}", self.store.path(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use clap::Parser;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    enum Scripted {
        Records(Vec<Value>),
        Fail,
    }

    /// Provider stand-in with per-dataset scripted results and a call counter.
    struct ScriptedProvider {
        calls: AtomicUsize,
        responses: HashMap<String, Scripted>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<(&str, Scripted)>) -> Self {
            ScriptedProvider {
                calls: AtomicUsize::new(0),
                responses: responses
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
            }
        }

        fn all_empty() -> Self {
            Self::new(vec![])
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DataProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn fetch(&self, dataset: &crate::api::Dataset) -> Result<Vec<Value>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.responses.get(&dataset.name) {
                Some(Scripted::Records(r)) => Ok(r.clone()),
                Some(Scripted::Fail) => anyhow::bail!("scripted transport error"),
                None => Ok(Vec::new()),
            }
        }
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 10)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn interval(mins: i64) -> FreshnessPolicy {
        FreshnessPolicy::Interval(chrono::Duration::minutes(mins))
    }

    fn fixed_times(times: &[(u32, u32)]) -> FreshnessPolicy {
        FreshnessPolicy::FixedTimes(
            times
                .iter()
                .map(|(h, m)| NaiveTime::from_hms_opt(*h, *m, 0).unwrap())
                .collect(),
        )
    }

    #[test]
    fn test_absent_snapshot_forces_refetch() {
        assert!(should_refetch(at(9, 0), None, false, &interval(30)));
        assert!(should_refetch(at(9, 0), None, false, &fixed_times(&[(7, 0)])));
    }

    #[test]
    fn test_fresh_interval_reuses_cache() {
        assert!(!should_refetch(at(9, 10), Some(at(9, 0)), false, &interval(15)));
    }

    #[test]
    fn test_elapsed_interval_refetches_at_boundary() {
        assert!(should_refetch(at(9, 15), Some(at(9, 0)), false, &interval(15)));
        assert!(should_refetch(at(10, 0), Some(at(9, 0)), false, &interval(15)));
    }

    #[test]
    fn test_override_always_wins() {
        assert!(should_refetch(at(9, 1), Some(at(9, 0)), true, &interval(60)));
        assert!(should_refetch(at(9, 1), Some(at(9, 0)), true, &fixed_times(&[(7, 0)])));
    }

    #[test]
    fn test_fixed_times_boundary_minutes() {
        let policy = fixed_times(&[(7, 0), (12, 0), (15, 0), (22, 0)]);
        let last = Some(at(1, 0));
        assert!(!should_refetch(at(6, 59), last, false, &policy));
        assert!(should_refetch(at(7, 0), last, false, &policy));
        assert!(!should_refetch(at(7, 1), last, false, &policy));
        assert!(should_refetch(at(22, 0), last, false, &policy));
    }

    #[test]
    fn test_fixed_times_ignore_seconds() {
        let policy = fixed_times(&[(12, 0)]);
        let now = NaiveDate::from_ymd_opt(2026, 1, 10)
            .unwrap()
            .and_hms_opt(12, 0, 45)
            .unwrap();
        assert!(should_refetch(now, Some(at(1, 0)), false, &policy));
    }

    fn test_config(dir: &TempDir, extra: &[&str]) -> Config {
        let cache = dir.path().join("nba_data.json");
        let mut args = vec![
            "courtside".to_string(),
            "--cache-file".to_string(),
            cache.to_string_lossy().into_owned(),
        ];
        args.extend(extra.iter().map(|s| s.to_string()));
        Config::parse_from(args)
    }

    fn seeded_store(config: &Config, captured_at: NaiveDateTime) -> Snapshot {
        let mut payloads = BTreeMap::new();
        payloads.insert("games".to_string(), vec![json!({"id": 1})]);
        payloads.insert("live_games".to_string(), vec![json!({"id": 2})]);
        payloads.insert("upcoming_games".to_string(), vec![]);
        payloads.insert("player_stats".to_string(), vec![json!({"player": "x"})]);
        let snapshot = Snapshot::new(captured_at, payloads);
        SnapshotStore::new(&config.cache_file).save(&snapshot).unwrap();
        snapshot
    }

    #[tokio::test]
    async fn test_fresh_cache_issues_zero_fetches() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, &["--refresh-interval-mins", "15"]);
        let seeded = seeded_store(&config, at(9, 0));

        let provider = Arc::new(ScriptedProvider::all_empty());
        let refresher = Refresher::new(config, provider.clone()).unwrap();

        let outcome = refresher.ensure_fresh_at(at(9, 10), false).await.unwrap();
        assert!(!outcome.refreshed);
        assert_eq!(outcome.snapshot, seeded);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_reuse_path_never_mutates_persisted_snapshot() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, &["--refresh-interval-mins", "60"]);
        seeded_store(&config, at(9, 0));
        let before = std::fs::read_to_string(&config.cache_file).unwrap();

        let refresher =
            Refresher::new(config.clone(), Arc::new(ScriptedProvider::all_empty())).unwrap();
        for _ in 0..3 {
            let outcome = refresher.ensure_fresh_at(at(9, 30), false).await.unwrap();
            assert!(!outcome.refreshed);
        }

        let after = std::fs::read_to_string(&config.cache_file).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_partial_failure_substitutes_empty_and_succeeds() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, &[]);
        let provider = Arc::new(ScriptedProvider::new(vec![
            ("games", Scripted::Records(vec![json!({"id": 10}), json!({"id": 11})])),
            ("live_games", Scripted::Fail),
            ("upcoming_games", Scripted::Records(vec![json!({"id": 12})])),
            ("player_stats", Scripted::Records(vec![json!({"p": 1})])),
        ]));
        let refresher = Refresher::new(config.clone(), provider.clone()).unwrap();

        let outcome = refresher.ensure_fresh_at(at(9, 0), false).await.unwrap();
        assert!(outcome.refreshed);
        assert_eq!(outcome.failed_datasets, vec!["live_games".to_string()]);
        assert_eq!(outcome.snapshot.records("games").len(), 2);
        assert!(outcome.snapshot.records("live_games").is_empty());
        assert_eq!(outcome.snapshot.records("upcoming_games").len(), 1);
        assert_eq!(provider.call_count(), 4);

        // The partially-failed cycle still persisted a complete snapshot
        let reloaded = SnapshotStore::new(&config.cache_file)
            .load()
            .unwrap()
            .unwrap();
        assert_eq!(reloaded, outcome.snapshot);
    }

    #[tokio::test]
    async fn test_total_outage_overwrites_by_default() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, &["--refresh-interval-mins", "15"]);
        seeded_store(&config, at(8, 0));

        let provider = Arc::new(ScriptedProvider::new(vec![
            ("games", Scripted::Fail),
            ("live_games", Scripted::Fail),
            ("upcoming_games", Scripted::Fail),
            ("player_stats", Scripted::Fail),
        ]));
        let refresher = Refresher::new(config.clone(), provider).unwrap();

        let outcome = refresher.ensure_fresh_at(at(9, 0), false).await.unwrap();
        assert!(outcome.refreshed);
        assert!(outcome.snapshot.is_empty());
        assert_eq!(outcome.failed_datasets.len(), 4);

        let reloaded = SnapshotStore::new(&config.cache_file)
            .load()
            .unwrap()
            .unwrap();
        assert!(reloaded.is_empty());
        assert_eq!(reloaded.last_update, "2026-01-10 09:00");
    }

    #[tokio::test]
    async fn test_total_outage_keeps_prior_with_partial_success_mode() {
        let dir = TempDir::new().unwrap();
        let config = test_config(
            &dir,
            &["--refresh-interval-mins", "15", "--require-partial-success"],
        );
        let seeded = seeded_store(&config, at(8, 0));

        let provider = Arc::new(ScriptedProvider::new(vec![
            ("games", Scripted::Fail),
            ("live_games", Scripted::Fail),
            ("upcoming_games", Scripted::Fail),
            ("player_stats", Scripted::Fail),
        ]));
        let refresher = Refresher::new(config.clone(), provider).unwrap();

        let outcome = refresher.ensure_fresh_at(at(9, 0), false).await.unwrap();
        assert!(!outcome.refreshed);
        assert_eq!(outcome.snapshot, seeded);
        assert_eq!(outcome.failed_datasets.len(), 4);

        let reloaded = SnapshotStore::new(&config.cache_file)
            .load()
            .unwrap()
            .unwrap();
        assert_eq!(reloaded, seeded);
    }

    #[tokio::test]
    async fn test_corrupt_cache_degrades_to_fresh_fetch() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, &[]);
        std::fs::write(&config.cache_file, "{broken").unwrap();

        let provider = Arc::new(ScriptedProvider::new(vec![(
            "games",
            Scripted::Records(vec![json!({"id": 1})]),
        )]));
        let refresher = Refresher::new(config, provider.clone()).unwrap();

        let outcome = refresher.ensure_fresh_at(at(9, 0), false).await.unwrap();
        assert!(outcome.refreshed);
        assert_eq!(outcome.snapshot.records("games").len(), 1);
        assert_eq!(provider.call_count(), 4);
    }

    #[tokio::test]
    async fn test_unparsable_last_update_forces_refetch() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, &["--refresh-interval-mins", "60"]);
        let snapshot = Snapshot {
            last_update: "not-a-timestamp".to_string(),
            payloads: BTreeMap::new(),
        };
        SnapshotStore::new(&config.cache_file).save(&snapshot).unwrap();

        let provider = Arc::new(ScriptedProvider::all_empty());
        let refresher = Refresher::new(config, provider.clone()).unwrap();

        let outcome = refresher.ensure_fresh_at(at(9, 0), false).await.unwrap();
        assert!(outcome.refreshed);
        assert_eq!(provider.call_count(), 4);
    }

    #[tokio::test]
    async fn test_manual_override_refetches_fresh_cache() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, &["--refresh-interval-mins", "60"]);
        seeded_store(&config, at(9, 0));

        let provider = Arc::new(ScriptedProvider::new(vec![(
            "games",
            Scripted::Records(vec![json!({"id": 99})]),
        )]));
        let refresher = Refresher::new(config, provider.clone()).unwrap();

        let outcome = refresher.ensure_fresh_at(at(9, 1), true).await.unwrap();
        assert!(outcome.refreshed);
        assert_eq!(outcome.snapshot.records("games")[0]["id"], 99);
        assert_eq!(provider.call_count(), 4);
    }
}
