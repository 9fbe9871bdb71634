//! 統合テスト用の上流スタブとスケジューラ組み立て。
#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use arxiv_ingest_worker::{
    clients::{FeedPage, PageRequest, UpstreamClient, UpstreamError},
    observability::Telemetry,
    pipeline::PipelineBuilder,
    scheduler::{IntervalCadence, Scheduler},
    store::{InMemoryPaperStore, Record},
    util::retry::RetryConfig,
};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use prometheus::Registry;
use reqwest::StatusCode;
use tokio::{
    sync::{Notify, Semaphore},
    time::Instant,
};
use tokio_util::sync::CancellationToken;

pub const POLITENESS: Duration = Duration::from_secs(3);

/// Records `<prefix>-0000`, `<prefix>-0001`, ...
pub fn records(prefix: &str, count: usize) -> Vec<Record> {
    let published = Utc
        .with_ymd_and_hms(2024, 3, 1, 0, 0, 0)
        .single()
        .expect("timestamp");
    (0..count)
        .map(|i| Record::new(format!("{prefix}-{i:04}"), format!("{prefix} paper {i}"), published))
        .collect()
}

/// Serves each query from a fixed catalogue, sliced by offset and page size.
///
/// The same catalogue answers every sweep, so repeated runs see the same upstream.
#[derive(Default)]
pub struct CatalogUpstream {
    catalogs: HashMap<String, Vec<Record>>,
    failing_pages: HashSet<(String, usize)>,
    gate: Option<Gate>,
    cancel_on_fetch: Mutex<Option<CancellationToken>>,
    calls: Mutex<Vec<(PageRequest, Instant)>>,
}

struct Gate {
    entered: Arc<Notify>,
    release: Arc<Semaphore>,
}

impl CatalogUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(mut self, query: &str, records: Vec<Record>) -> Self {
        self.catalogs.insert(query.to_string(), records);
        self
    }

    /// The page at `offset` for `query` answers 503 on every attempt.
    pub fn failing_at(mut self, query: &str, offset: usize) -> Self {
        self.failing_pages.insert((query.to_string(), offset));
        self
    }

    /// Every fetch signals `entered` and then waits for a permit on `release`.
    pub fn gated(mut self, entered: Arc<Notify>, release: Arc<Semaphore>) -> Self {
        self.gate = Some(Gate { entered, release });
        self
    }

    /// The next fetch cancels `token` and is then answered normally.
    pub fn cancel_during_next_fetch(&self, token: CancellationToken) {
        *self.cancel_on_fetch.lock().expect("cancel lock") = Some(token);
    }

    pub fn calls(&self) -> Vec<PageRequest> {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .map(|(request, _)| request.clone())
            .collect()
    }

    pub fn call_instants(&self) -> Vec<Instant> {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .map(|(_, at)| *at)
            .collect()
    }
}

#[async_trait]
impl UpstreamClient for CatalogUpstream {
    async fn fetch(&self, request: &PageRequest) -> Result<FeedPage, UpstreamError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push((request.clone(), Instant::now()));

        let pending_cancel = self.cancel_on_fetch.lock().expect("cancel lock").take();
        if let Some(token) = pending_cancel {
            token.cancel();
        }

        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release
                .acquire()
                .await
                .expect("gate semaphore open")
                .forget();
        }

        if self
            .failing_pages
            .contains(&(request.query.clone(), request.offset))
        {
            return Err(UpstreamError::Status {
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: "upstream overloaded".to_string(),
            });
        }

        let page = self
            .catalogs
            .get(&request.query)
            .map(|catalog| {
                catalog
                    .iter()
                    .skip(request.offset)
                    .take(request.page_size)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(FeedPage::new(page))
    }
}

/// Scheduler over `upstream` and `store` with a 3s politeness interval and a daily cadence.
pub fn scheduler(
    upstream: Arc<CatalogUpstream>,
    store: &InMemoryPaperStore,
    chunk_size: usize,
) -> (Scheduler, Telemetry) {
    let telemetry = Telemetry::with_registry(Registry::new()).expect("telemetry");
    let metrics = telemetry.metrics_handle();
    let pipeline = PipelineBuilder::new(Arc::clone(&metrics))
        .politeness_interval(POLITENESS)
        .commit_chunk_size(chunk_size)
        .build(upstream, Arc::new(store.clone()));
    let cadence = IntervalCadence::new(
        Duration::from_secs(5),
        Duration::from_secs(86_400),
        RetryConfig::new(Duration::from_secs(60), Duration::from_secs(3_600)),
    );
    let scheduler = Scheduler::new(
        Arc::new(pipeline),
        Arc::new(store.clone()),
        cadence,
        10,
        metrics,
    );
    (scheduler, telemetry)
}
