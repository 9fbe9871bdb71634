use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tokio::{
    sync::Mutex,
    time::{Instant, sleep_until},
};
use tracing::{debug, info, warn};

use crate::{
    clients::arxiv::{PageRequest, SortKey, SortOrder, UpstreamClient, UpstreamError},
    observability::metrics::Metrics,
    store::Record,
};

use super::plan::Partition;

/// 1パーティション分の取得結果。
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionBatch {
    pub partition: String,
    pub records: Vec<Record>,
    pub pages: usize,
    pub malformed: usize,
}

/// A partition abandoned part-way; everything it fetched is discarded.
#[derive(Debug, Error)]
#[error("page {page} failed: {source}")]
pub struct PartitionFailure {
    pub partition: String,
    pub page: usize,
    pub pages_fetched: usize,
    pub malformed: usize,
    #[source]
    pub source: UpstreamError,
}

#[async_trait]
pub(crate) trait FetchStage: Send + Sync {
    async fn fetch_partition(
        &self,
        partition: &Partition,
        sort_key: SortKey,
        sort_order: SortOrder,
    ) -> Result<PartitionBatch, PartitionFailure>;
}

/// 上流ホストへの連続リクエストの最小間隔を守る。
///
/// 直前の呼び出し時刻だけを覚えるので、最後のページの後に待機が入ることはない。
#[derive(Debug)]
pub struct Pacer {
    interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Pacer {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_call: Mutex::new(None),
        }
    }

    /// Waits until `interval` has elapsed since the previous call, then claims the slot.
    pub async fn wait_turn(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let ready_at = previous + self.interval;
            if ready_at > Instant::now() {
                debug!(wait_ms = (ready_at - Instant::now()).as_millis(), "pacing upstream call");
                sleep_until(ready_at).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}

/// パーティションごとにページを順に取得する。空ページで早期終了する。
pub struct PaginatingFetcher {
    client: Arc<dyn UpstreamClient>,
    pacer: Arc<Pacer>,
    metrics: Arc<Metrics>,
}

impl PaginatingFetcher {
    #[must_use]
    pub fn new(client: Arc<dyn UpstreamClient>, pacer: Arc<Pacer>, metrics: Arc<Metrics>) -> Self {
        Self {
            client,
            pacer,
            metrics,
        }
    }
}

#[async_trait]
impl FetchStage for PaginatingFetcher {
    async fn fetch_partition(
        &self,
        partition: &Partition,
        sort_key: SortKey,
        sort_order: SortOrder,
    ) -> Result<PartitionBatch, PartitionFailure> {
        let mut records = Vec::new();
        let mut pages = 0;
        let mut malformed = 0;

        for page_index in 0..partition.max_pages() {
            let request = PageRequest {
                query: partition.query().to_string(),
                page_size: partition.request_size(records.len()),
                offset: page_index * partition.page_size(),
                sort_key,
                sort_order,
            };

            self.pacer.wait_turn().await;
            let timer = self.metrics.page_fetch_duration.start_timer();
            let result = self.client.fetch(&request).await;
            timer.observe_duration();

            let page = match result {
                Ok(page) => page,
                Err(source) => {
                    warn!(
                        partition = partition.name(),
                        page = page_index,
                        error_kind = source.kind().as_str(),
                        error = %source,
                        "partition fetch failed; discarding partition"
                    );
                    return Err(PartitionFailure {
                        partition: partition.name().to_string(),
                        page: page_index,
                        pages_fetched: pages,
                        malformed,
                        source,
                    });
                }
            };

            pages += 1;
            self.metrics.pages_fetched.inc();
            malformed += page.malformed;

            if page.is_exhausted() {
                debug!(partition = partition.name(), page = page_index, "upstream exhausted");
                break;
            }

            records.extend(page.records);
            if let Some(cap) = partition.max_records().filter(|cap| records.len() >= *cap) {
                records.truncate(cap);
                break;
            }
        }

        info!(
            partition = partition.name(),
            pages,
            records = records.len(),
            malformed,
            "partition fetched"
        );

        Ok(PartitionBatch {
            partition: partition.name().to_string(),
            records,
            pages,
            malformed,
        })
    }
}
