//! Ingestion orchestrator.
//!
//! One call to [`Ingestor::run_once`] is one scheduled collection:
//!
//! 1. every series of the catalog is fetched and written independently
//! 2. the population dataset is fetched and written once
//! 3. a summary lists what succeeded and what failed with which error kind
//!
//! A failure in one unit of work never stops the others. There is no timer
//! here; the external scheduler decides when to call `run_once`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::{Datelike, NaiveDate};
use rayon::prelude::*;
use tracing::{info, info_span, warn};

use crate::config::{Catalog, PipelineConfig, RetryPolicy};
use crate::data::{PopulationSource, RateLimiter, SeriesSource, call_with_retry};
use crate::domain::{IngestionRecord, Payload, Source, StorageKey};
use crate::error::{AppError, PipelineError};
use crate::notify::{NoopNotifier, Notification, Notifier};
use crate::store::{ObjectStore, put_document};

pub mod clock;
pub mod summary;

pub use clock::{Clock, FixedClock, SystemClock};
pub use summary::{IngestSummary, OutcomeStatus, PopulationOutcome, SeriesOutcome};

/// Immutable inputs of a run.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub catalog: Catalog,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    /// Minimum spacing between consecutive upstream calls.
    pub request_delay: Duration,
    pub retry: RetryPolicy,
    /// Wall-clock budget; work not started before it runs out is failed.
    pub budget: Duration,
    pub workers: usize,
    pub population_dataset: String,
}

impl IngestSettings {
    pub fn from_config(config: &PipelineConfig) -> Result<Self, AppError> {
        Ok(Self {
            catalog: config.catalog()?,
            start_year: config.start_year,
            end_year: config.end_year,
            request_delay: Duration::from_millis(config.request_delay_ms),
            retry: config.retry,
            budget: Duration::from_secs(config.budget_secs),
            workers: config.workers.max(1),
            population_dataset: config.population_api.dataset.clone(),
        })
    }

    /// Fetch range for a run on `as_of`: configured years, or the current
    /// year and the two before it.
    ///
    /// A start year after the resolved end year is a configuration error.
    pub fn year_range(&self, as_of: NaiveDate) -> Result<(i32, i32), AppError> {
        let end = self.end_year.unwrap_or_else(|| as_of.year());
        let start = self.start_year.unwrap_or(end - 2);
        if start > end {
            return Err(AppError::new(
                2,
                format!("start_year {start} is after the end of the fetch range ({end})."),
            ));
        }
        Ok((start, end))
    }
}

/// State shared by the workers of one run.
struct RunContext {
    as_of: NaiveDate,
    start_year: i32,
    end_year: i32,
    deadline: Instant,
    limiter: RateLimiter,
    notifications_failed: AtomicUsize,
}

impl RunContext {
    fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

pub struct Ingestor {
    settings: IngestSettings,
    series: Arc<dyn SeriesSource>,
    population: Arc<dyn PopulationSource>,
    store: Arc<dyn ObjectStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    pool: rayon::ThreadPool,
}

impl Ingestor {
    pub fn new(
        settings: IngestSettings,
        series: Arc<dyn SeriesSource>,
        population: Arc<dyn PopulationSource>,
        store: Arc<dyn ObjectStore>,
    ) -> Result<Self, AppError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.workers.max(1))
            .thread_name(|i| format!("ingest-{i}"))
            .build()
            .map_err(|e| AppError::new(2, format!("Failed to start ingestion workers: {e}")))?;
        Ok(Self {
            settings,
            series,
            population,
            store,
            notifier: Arc::new(NoopNotifier),
            clock: Arc::new(SystemClock),
            pool,
        })
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn notifier(&self) -> Arc<dyn Notifier> {
        Arc::clone(&self.notifier)
    }

    /// Fetch and store every catalog series, then the population dataset.
    ///
    /// Only an unusable year range fails the call; every other failure is
    /// recorded in the summary.
    pub fn run_once(&self, as_of: NaiveDate) -> Result<IngestSummary, AppError> {
        let (start_year, end_year) = self.settings.year_range(as_of)?;
        let _span = info_span!("ingest", %as_of, start_year, end_year).entered();

        let started_at = self.clock.now();
        let ctx = RunContext {
            as_of,
            start_year,
            end_year,
            deadline: Instant::now() + self.settings.budget,
            limiter: RateLimiter::new(self.settings.request_delay),
            notifications_failed: AtomicUsize::new(0),
        };

        info!(
            series = self.settings.catalog.len(),
            workers = self.settings.workers,
            "starting ingestion run"
        );

        // Collecting an indexed parallel iterator keeps catalog order.
        let series: Vec<SeriesOutcome> = self.pool.install(|| {
            self.settings
                .catalog
                .ids()
                .par_iter()
                .map(|series_id| SeriesOutcome {
                    series_id: series_id.clone(),
                    status: self.ingest_series(&ctx, series_id),
                })
                .collect()
        });

        let population = PopulationOutcome {
            dataset: self.settings.population_dataset.clone(),
            status: self.ingest_population(&ctx),
        };

        let summary = IngestSummary {
            as_of,
            start_year,
            end_year,
            started_at,
            finished_at: self.clock.now(),
            series,
            population,
            notifications_failed: ctx.notifications_failed.load(Ordering::Relaxed),
        };

        info!(
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            population_ok = summary.population.status.is_success(),
            "ingestion run complete"
        );
        Ok(summary)
    }

    fn ingest_series(&self, ctx: &RunContext, series_id: &str) -> OutcomeStatus {
        if ctx.expired() {
            warn!(series_id, "budget exhausted before series started");
            return OutcomeStatus::failed(PipelineError::budget(format!(
                "Run budget exhausted before {series_id} was fetched."
            )));
        }

        let fetched = call_with_retry(&self.settings.retry, &ctx.limiter, series_id, || {
            self.series.fetch(series_id, ctx.start_year, ctx.end_year)
        });
        let observations = match fetched {
            Ok(observations) => observations,
            Err(err) => {
                warn!(series_id, kind = %err.kind, error = %err.message, "series fetch failed");
                return OutcomeStatus::failed(err);
            }
        };

        let key = StorageKey::series(series_id, ctx.as_of);
        let payload = Payload::Series {
            series_id: series_id.to_string(),
            observations,
        };
        let record = IngestionRecord::new(Source::SeriesApi, self.clock.now(), ctx.as_of, payload);
        match self.write(ctx, &key, &record) {
            Ok(()) => {
                info!(series_id, key = %key, records = record.record_count, "series stored");
                OutcomeStatus::succeeded(&key, record.record_count)
            }
            Err(err) => {
                warn!(series_id, kind = %err.kind, error = %err.message, "series write failed");
                OutcomeStatus::failed(err)
            }
        }
    }

    fn ingest_population(&self, ctx: &RunContext) -> OutcomeStatus {
        let dataset = self.settings.population_dataset.as_str();
        if ctx.expired() {
            warn!(dataset, "budget exhausted before population fetch");
            return OutcomeStatus::failed(PipelineError::budget(
                "Run budget exhausted before the population dataset was fetched.",
            ));
        }

        let fetched = call_with_retry(&self.settings.retry, &ctx.limiter, dataset, || {
            self.population.fetch_population()
        });
        let observations = match fetched {
            Ok(observations) => observations,
            Err(err) => {
                warn!(dataset, kind = %err.kind, error = %err.message, "population fetch failed");
                return OutcomeStatus::failed(err);
            }
        };

        let key = StorageKey::population(dataset, ctx.as_of);
        let payload = Payload::Population {
            dataset: dataset.to_string(),
            observations,
        };
        let record = IngestionRecord::new(Source::PopulationApi, self.clock.now(), ctx.as_of, payload);
        match self.write(ctx, &key, &record) {
            Ok(()) => {
                info!(dataset, key = %key, records = record.record_count, "population stored");
                OutcomeStatus::succeeded(&key, record.record_count)
            }
            Err(err) => {
                warn!(dataset, kind = %err.kind, error = %err.message, "population write failed");
                OutcomeStatus::failed(err)
            }
        }
    }

    /// Store `record` and, only once the write succeeded, notify.
    fn write(&self, ctx: &RunContext, key: &StorageKey, record: &IngestionRecord) -> Result<(), PipelineError> {
        put_document(self.store.as_ref(), key, record)?;

        let notification = Notification::for_key(key, self.clock.now());
        if let Err(err) = self.notifier.notify(&notification) {
            warn!(key = %key, error = %err, "notification not delivered");
            ctx.notifications_failed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted upstreams and stores shared by ingestion and pipeline tests.

    use std::collections::{BTreeMap, HashMap, HashSet};
    use std::sync::Mutex;

    use super::*;
    use crate::domain::{DatasetGroup, PopulationObservation, SeriesObservation};

    /// Serves fixed observations; ids listed in `failing` always error and
    /// ids in `flaky` fail their first call only.
    #[derive(Default)]
    pub struct ScriptedSeries {
        pub data: HashMap<String, Vec<SeriesObservation>>,
        pub failing: HashSet<String>,
        pub flaky: Mutex<HashSet<String>>,
        pub calls: Mutex<Vec<String>>,
    }

    impl ScriptedSeries {
        pub fn with_series(mut self, series_id: &str, rows: &[(i32, &str, &str)]) -> Self {
            let obs = rows
                .iter()
                .map(|(year, period, value)| SeriesObservation {
                    series_id: series_id.to_string(),
                    year: *year,
                    period: period.to_string(),
                    period_name: None,
                    value: value.to_string(),
                })
                .collect();
            self.data.insert(series_id.to_string(), obs);
            self
        }

        pub fn failing(mut self, series_id: &str) -> Self {
            self.failing.insert(series_id.to_string());
            self
        }

        pub fn call_count(&self, series_id: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|c| *c == series_id).count()
        }
    }

    impl SeriesSource for ScriptedSeries {
        fn fetch(&self, series_id: &str, _start: i32, _end: i32) -> Result<Vec<SeriesObservation>, PipelineError> {
            self.calls.lock().unwrap().push(series_id.to_string());
            if self.failing.contains(series_id) {
                return Err(PipelineError::upstream(format!("scripted failure for {series_id}")));
            }
            if self.flaky.lock().unwrap().remove(series_id) {
                return Err(PipelineError::upstream(format!("scripted flake for {series_id}")));
            }
            Ok(self.data.get(series_id).cloned().unwrap_or_default())
        }
    }

    pub struct ScriptedPopulation {
        pub rows: Result<Vec<PopulationObservation>, PipelineError>,
    }

    impl ScriptedPopulation {
        pub fn ok(rows: &[(i32, u64)]) -> Self {
            Self {
                rows: Ok(rows
                    .iter()
                    .map(|&(year, population)| PopulationObservation { year, population })
                    .collect()),
            }
        }

        pub fn failing() -> Self {
            Self {
                rows: Err(PipelineError::upstream("scripted population failure")),
            }
        }
    }

    impl PopulationSource for ScriptedPopulation {
        fn fetch_population(&self) -> Result<Vec<PopulationObservation>, PipelineError> {
            self.rows.clone()
        }
    }

    /// Memory store that rejects writes to the listed identifiers.
    #[derive(Default)]
    pub struct RejectingStore {
        pub inner: crate::store::MemoryStore,
        pub reject: HashSet<String>,
    }

    impl ObjectStore for RejectingStore {
        fn put(&self, key: &StorageKey, body: &[u8]) -> Result<(), PipelineError> {
            if self.reject.contains(&key.identifier) {
                return Err(PipelineError::storage(format!("permission denied for {key}")));
            }
            self.inner.put(key, body)
        }

        fn get(&self, key: &StorageKey) -> Result<Option<Vec<u8>>, PipelineError> {
            self.inner.get(key)
        }

        fn list(&self, group: DatasetGroup) -> Result<Vec<StorageKey>, PipelineError> {
            self.inner.list(group)
        }
    }

    pub fn settings(ids: &[&str]) -> IngestSettings {
        IngestSettings {
            catalog: Catalog::new(ids.iter().copied()).unwrap(),
            start_year: Some(2017),
            end_year: Some(2018),
            request_delay: Duration::ZERO,
            retry: RetryPolicy { max_attempts: 2, backoff_ms: 0 },
            budget: Duration::from_secs(60),
            workers: 1,
            population_dataset: "nation".to_string(),
        }
    }

    pub fn fixed_clock() -> Arc<dyn Clock> {
        let ts = NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
            .and_utc();
        Arc::new(FixedClock(ts))
    }

    pub fn snapshot(store: &crate::store::MemoryStore) -> BTreeMap<String, Vec<u8>> {
        store.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::testing::*;
    use super::*;
    use crate::domain::SeriesObservation;
    use crate::error::ErrorKind;
    use crate::notify::MemoryQueue;
    use crate::store::{MemoryStore, get_document};

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    fn upstream() -> ScriptedSeries {
        ScriptedSeries::default()
            .with_series("PRS30006032", &[(2017, "Q01", "1.5"), (2018, "Q01", "1.9")])
            .with_series("CUUR0000SA0", &[(2018, "M01", "247.867")])
            .with_series("LNS14000000", &[(2018, "M01", "4.1")])
    }

    fn population() -> ScriptedPopulation {
        ScriptedPopulation::ok(&[(2017, 325_719_178), (2018, 327_167_439)])
    }

    #[test]
    fn one_failing_series_does_not_stop_the_others() {
        let store = Arc::new(MemoryStore::new());
        let series = Arc::new(upstream().failing("CUUR0000SA0"));
        let ingestor = Ingestor::new(
            settings(&["PRS30006032", "CUUR0000SA0", "LNS14000000"]),
            series.clone(),
            Arc::new(population()),
            store.clone(),
        )
        .unwrap();

        let summary = ingestor.run_once(as_of()).unwrap();

        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.failed(), 1);
        let failed: Vec<_> = summary.failed_series().map(|s| s.series_id.as_str()).collect();
        assert_eq!(failed, vec!["CUUR0000SA0"]);
        assert_eq!(summary.series[1].status.error_kind(), Some(ErrorKind::Upstream));
        assert!(summary.population.status.is_success());

        let keys: Vec<String> = store.snapshot().into_keys().collect();
        assert_eq!(
            keys,
            vec![
                "population/nation/2025-03-01.json",
                "series/LNS14000000/2025-03-01.json",
                "series/PRS30006032/2025-03-01.json",
            ]
        );
        // Failing series was attempted max_attempts times.
        assert_eq!(series.call_count("CUUR0000SA0"), 2);
    }

    #[test]
    fn rerun_on_same_date_overwrites_identically() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = Ingestor::new(
            settings(&["PRS30006032", "LNS14000000"]),
            Arc::new(upstream()),
            Arc::new(population()),
            store.clone(),
        )
        .unwrap()
        .with_clock(fixed_clock());

        ingestor.run_once(as_of()).unwrap();
        let first = snapshot(&store);
        ingestor.run_once(as_of()).unwrap();
        let second = snapshot(&store);

        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
    }

    #[test]
    fn stored_record_wraps_observations_with_metadata() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = Ingestor::new(
            settings(&["PRS30006032"]),
            Arc::new(upstream()),
            Arc::new(population()),
            store.clone(),
        )
        .unwrap()
        .with_clock(fixed_clock());
        ingestor.run_once(as_of()).unwrap();

        let key = StorageKey::series("PRS30006032", as_of());
        let record: IngestionRecord = get_document(store.as_ref(), &key).unwrap().unwrap();
        assert_eq!(record.source, Source::SeriesApi);
        assert_eq!(record.ingestion_date, as_of());
        assert_eq!(record.record_count, 2);
        assert_eq!(record.year_range, Some([2017, 2018]));

        let key = StorageKey::population("nation", as_of());
        let record: IngestionRecord = get_document(store.as_ref(), &key).unwrap().unwrap();
        assert_eq!(record.source, Source::PopulationApi);
    }

    #[test]
    fn notifies_once_per_successful_write_only() {
        let store = Arc::new(RejectingStore {
            reject: HashSet::from(["LNS14000000".to_string()]),
            ..RejectingStore::default()
        });
        let queue = Arc::new(MemoryQueue::new());
        let ingestor = Ingestor::new(
            settings(&["PRS30006032", "LNS14000000", "CUUR0000SA0"]),
            Arc::new(upstream()),
            Arc::new(population()),
            store,
        )
        .unwrap()
        .with_notifier(queue.clone());

        let summary = ingestor.run_once(as_of()).unwrap();
        assert_eq!(summary.series[1].status.error_kind(), Some(ErrorKind::StorageUnavailable));

        let mut keys: Vec<String> = queue.drain().into_iter().map(|n| n.key).collect();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "population/nation/2025-03-01.json",
                "series/CUUR0000SA0/2025-03-01.json",
                "series/PRS30006032/2025-03-01.json",
            ]
        );
    }

    #[test]
    fn transient_upstream_failure_is_retried_once() {
        let series = upstream();
        series.flaky.lock().unwrap().insert("PRS30006032".to_string());
        let series = Arc::new(series);
        let ingestor = Ingestor::new(
            settings(&["PRS30006032"]),
            series.clone(),
            Arc::new(population()),
            Arc::new(MemoryStore::new()),
        )
        .unwrap();

        let summary = ingestor.run_once(as_of()).unwrap();
        assert_eq!(summary.succeeded(), 1);
        assert_eq!(series.call_count("PRS30006032"), 2);
    }

    #[test]
    fn population_failure_is_reported_separately() {
        let ingestor = Ingestor::new(
            settings(&["PRS30006032"]),
            Arc::new(upstream()),
            Arc::new(ScriptedPopulation::failing()),
            Arc::new(MemoryStore::new()),
        )
        .unwrap();

        let summary = ingestor.run_once(as_of()).unwrap();
        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.population.status.error_kind(), Some(ErrorKind::Upstream));
        assert!(!summary.is_clean());
    }

    #[test]
    fn exhausted_budget_fails_remaining_work_without_fetching() {
        let mut settings = settings(&["PRS30006032", "LNS14000000"]);
        settings.budget = Duration::ZERO;
        let series = Arc::new(upstream());
        let store = Arc::new(MemoryStore::new());
        let ingestor = Ingestor::new(settings, series.clone(), Arc::new(population()), store.clone()).unwrap();

        let summary = ingestor.run_once(as_of()).unwrap();
        assert_eq!(summary.failed(), 2);
        assert_eq!(
            summary.failures_by_kind().get(&ErrorKind::BudgetExhausted).copied(),
            Some(2)
        );
        assert_eq!(
            summary.population.status.error_kind(),
            Some(ErrorKind::BudgetExhausted)
        );
        assert!(series.calls.lock().unwrap().is_empty());
        assert!(store.is_empty());
    }

    /// Every fetch takes `delay`, then returns no observations.
    struct SlowSeries {
        delay: Duration,
    }

    impl SeriesSource for SlowSeries {
        fn fetch(&self, _series_id: &str, _start: i32, _end: i32) -> Result<Vec<SeriesObservation>, PipelineError> {
            std::thread::sleep(self.delay);
            Ok(Vec::new())
        }
    }

    #[test]
    fn budget_running_out_mid_run_fails_only_unstarted_work() {
        let mut settings = settings(&["PRS30006032", "CUUR0000SA0", "LNS14000000"]);
        settings.budget = Duration::from_millis(100);
        let ingestor = Ingestor::new(
            settings,
            Arc::new(SlowSeries {
                delay: Duration::from_millis(150),
            }),
            Arc::new(population()),
            Arc::new(MemoryStore::new()),
        )
        .unwrap();

        let summary = ingestor.run_once(as_of()).unwrap();
        let kinds: Vec<_> = summary.series.iter().map(|s| s.status.error_kind()).collect();
        assert_eq!(
            kinds,
            vec![None, Some(ErrorKind::BudgetExhausted), Some(ErrorKind::BudgetExhausted)]
        );
        assert_eq!(
            summary.population.status.error_kind(),
            Some(ErrorKind::BudgetExhausted)
        );
    }

    #[test]
    fn parallel_workers_keep_isolation_and_order() {
        let mut settings = settings(&["PRS30006032", "CUUR0000SA0", "LNS14000000"]);
        settings.workers = 3;
        let store = Arc::new(MemoryStore::new());
        let ingestor = Ingestor::new(
            settings,
            Arc::new(upstream().failing("PRS30006032")),
            Arc::new(population()),
            store.clone(),
        )
        .unwrap();

        let summary = ingestor.run_once(as_of()).unwrap();
        let ids: Vec<_> = summary.series.iter().map(|s| s.series_id.as_str()).collect();
        assert_eq!(ids, vec!["PRS30006032", "CUUR0000SA0", "LNS14000000"]);
        assert_eq!(summary.succeeded(), 2);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn default_year_range_trails_as_of() {
        let mut s = settings(&["A"]);
        s.start_year = None;
        s.end_year = None;
        assert_eq!(s.year_range(as_of()).unwrap(), (2023, 2025));
        s.end_year = Some(2018);
        assert_eq!(s.year_range(as_of()).unwrap(), (2016, 2018));
    }

    #[test]
    fn start_year_after_as_of_year_is_rejected() {
        let mut s = settings(&["A"]);
        s.start_year = Some(2030);
        s.end_year = None;
        let err = s.year_range(as_of()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("2030"));

        let ingestor = Ingestor::new(
            s,
            Arc::new(upstream()),
            Arc::new(population()),
            Arc::new(MemoryStore::new()),
        )
        .unwrap();
        assert!(ingestor.run_once(as_of()).is_err());
    }
}
