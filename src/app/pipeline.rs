//! Shared wiring used by every subcommand.
//!
//! Builds the store, upstream clients and notifier from configuration, and
//! chains ingestion into analytics for `harvest run`:
//!
//! ingest -> notifications -> (population written?) -> load tables -> statistics

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use crate::analytics::{AnalyticsReport, analyze, load_tables};
use crate::config::{AnalyticsConfig, PipelineConfig};
use crate::data::{BlsClient, DataUsaClient};
use crate::error::AppError;
use crate::ingest::{IngestSettings, IngestSummary, Ingestor};
use crate::notify::{Fanout, MemoryQueue, NoopNotifier, Notifier, WebhookNotifier, triggers_analytics};
use crate::store::{LocalFsStore, MemoryStore, ObjectStore};

/// All outputs of a single `harvest run`.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub summary: IngestSummary,
    /// `None` when no write of this run triggers analytics.
    pub analytics: Option<AnalyticsReport>,
}

pub fn open_store(config: &PipelineConfig) -> Arc<LocalFsStore> {
    Arc::new(LocalFsStore::new(config.store.root.clone()))
}

/// Store an ingestion run writes to. A dry run keeps every document in memory.
pub fn ingest_store(config: &PipelineConfig, dry_run: bool) -> Arc<dyn ObjectStore> {
    if dry_run {
        Arc::new(MemoryStore::new())
    } else {
        open_store(config)
    }
}

pub fn build_notifier(config: &PipelineConfig) -> Result<Arc<dyn Notifier>, AppError> {
    match &config.notify.webhook_url {
        Some(url) => Ok(Arc::new(WebhookNotifier::new(url.clone())?)),
        None => Ok(Arc::new(NoopNotifier)),
    }
}

/// Ingestor backed by the real upstream APIs.
pub fn build_ingestor(config: &PipelineConfig, store: Arc<dyn ObjectStore>) -> Result<Ingestor, AppError> {
    let settings = IngestSettings::from_config(config)?;
    let series = Arc::new(BlsClient::from_env(&config.series_api)?);
    let population = Arc::new(DataUsaClient::new(&config.population_api)?);
    Ok(Ingestor::new(settings, series, population, store)?.with_notifier(build_notifier(config)?))
}

/// Load the stored documents and compute all statistics.
pub fn run_analytics(
    store: &dyn ObjectStore,
    params: &AnalyticsConfig,
    as_of: Option<NaiveDate>,
) -> Result<AnalyticsReport, AppError> {
    let tables = load_tables(store, as_of)?;
    Ok(analyze(&tables, params, as_of))
}

/// Ingest once, then run analytics if any write of the run triggers it.
///
/// Analytics read the latest document of every dataset, so series that
/// failed today still contribute their previous values.
pub fn run_and_analyze(
    ingestor: Ingestor,
    store: &dyn ObjectStore,
    params: &AnalyticsConfig,
    as_of: NaiveDate,
) -> Result<RunOutput, AppError> {
    let queue = Arc::new(MemoryQueue::new());
    let fanout = Fanout::new()
        .with(ingestor.notifier())
        .with(Arc::clone(&queue) as Arc<dyn Notifier>);
    let ingestor = ingestor.with_notifier(Arc::new(fanout));

    let summary = ingestor.run_once(as_of)?;

    let triggered = queue.drain().iter().any(triggers_analytics);
    let analytics = if triggered {
        Some(run_analytics(store, params, None)?)
    } else {
        info!("no population write in this run; analytics skipped");
        None
    };

    Ok(RunOutput { summary, analytics })
}
