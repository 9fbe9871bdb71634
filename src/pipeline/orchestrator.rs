use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dedup::Deduplicator,
    fetch::FetchStage,
    plan::{CategoryPlan, PlanError},
    writer::{IncrementalWriter, WriteFailure, WriteReport},
};
use crate::observability::metrics::Metrics;

/// パーティション単位の結果。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionReport {
    pub name: String,
    pub pages: usize,
    pub records: usize,
    pub malformed: usize,
    pub error: Option<String>,
}

/// Everything one sweep produced, before it is folded into an `IngestionRun`.
#[derive(Debug)]
pub struct SweepReport {
    pub requested: usize,
    pub partitions: Vec<PartitionReport>,
    pub fetched: usize,
    pub malformed: usize,
    pub run_duplicates: usize,
    pub cancelled: bool,
    pub write: Result<WriteReport, WriteFailure>,
}

impl SweepReport {
    /// `"<partition>: <message>"` for every failed partition.
    #[must_use]
    pub fn partition_errors(&self) -> Vec<String> {
        self.partitions
            .iter()
            .filter_map(|p| p.error.as_ref().map(|e| format!("{}: {e}", p.name)))
            .collect()
    }
}

/// 1回のスイープ本体: パーティション順次取得 → 実行内重複除去 → チャンク書き込み。
pub struct IngestionPipeline {
    fetch: Arc<dyn FetchStage>,
    writer: IncrementalWriter,
    metrics: Arc<Metrics>,
}

impl IngestionPipeline {
    pub(crate) fn new(fetch: Arc<dyn FetchStage>, writer: IncrementalWriter, metrics: Arc<Metrics>) -> Self {
        Self {
            fetch,
            writer,
            metrics,
        }
    }

    /// Runs one sweep of `plan`. Partitions are fetched one after another and
    /// cancellation is honoured only between partitions.
    ///
    /// # Errors
    /// 計画が不正な場合、上流を呼ぶ前に [`PlanError`] を返す。
    pub async fn execute(
        &self,
        run_id: Uuid,
        plan: &CategoryPlan,
        cancel: &CancellationToken,
    ) -> Result<SweepReport, PlanError> {
        plan.validate()?;

        let mut partitions = Vec::with_capacity(plan.partitions().len());
        let mut collected = Vec::new();
        let mut malformed = 0;
        let mut cancelled = false;

        for (index, partition) in plan.partitions().iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(
                    %run_id,
                    remaining = plan.partitions().len() - index,
                    "sweep cancelled at partition boundary"
                );
                cancelled = true;
                break;
            }

            match self
                .fetch
                .fetch_partition(partition, plan.sort_key(), plan.sort_order())
                .await
            {
                Ok(batch) => {
                    malformed += batch.malformed;
                    partitions.push(PartitionReport {
                        name: batch.partition,
                        pages: batch.pages,
                        records: batch.records.len(),
                        malformed: batch.malformed,
                        error: None,
                    });
                    collected.extend(batch.records);
                }
                Err(failure) => {
                    self.metrics.partition_failures.inc();
                    malformed += failure.malformed;
                    partitions.push(PartitionReport {
                        name: failure.partition.clone(),
                        pages: failure.pages_fetched,
                        records: 0,
                        malformed: failure.malformed,
                        error: Some(failure.to_string()),
                    });
                }
            }
        }

        let fetched = collected.len();
        let deduplicated = Deduplicator::new().deduplicate(collected);
        info!(
            %run_id,
            fetched,
            unique = deduplicated.records.len(),
            run_duplicates = deduplicated.duplicates,
            "partitions merged"
        );

        let write = self.writer.write(deduplicated.records).await;

        Ok(SweepReport {
            requested: plan.requested_count(),
            partitions,
            fetched,
            malformed,
            run_duplicates: deduplicated.duplicates,
            cancelled,
            write,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        clients::arxiv::{FeedPage, UpstreamError},
        pipeline::fetch::{
            Pacer, PaginatingFetcher,
            tests::{ScriptedUpstream, records, test_metrics},
        },
        store::InMemoryPaperStore,
    };

    fn pipeline(upstream: Arc<ScriptedUpstream>, store: &InMemoryPaperStore) -> IngestionPipeline {
        let metrics = test_metrics();
        let fetcher = PaginatingFetcher::new(
            upstream,
            Arc::new(Pacer::new(Duration::from_millis(5))),
            Arc::clone(&metrics),
        );
        let writer = IncrementalWriter::new(Arc::new(store.clone()), 10, Arc::clone(&metrics));
        IngestionPipeline::new(Arc::new(fetcher), writer, metrics)
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_partitions_are_absorbed_by_dedup() {
        let shared = records("s", 3);
        let mut second = shared.clone();
        second.extend(records("t", 2));
        let upstream = Arc::new(ScriptedUpstream::new(vec![
            Ok(FeedPage::new(shared)),
            Ok(FeedPage::new(Vec::new())),
            Ok(FeedPage::new(second)),
            Ok(FeedPage::new(Vec::new())),
        ]));
        let store = InMemoryPaperStore::new();
        let plan = CategoryPlan::categories(["cs.AI", "cs.LG"], 10, 3).expect("plan");

        let report = pipeline(upstream, &store)
            .execute(Uuid::new_v4(), &plan, &CancellationToken::new())
            .await
            .expect("sweep");

        assert_eq!(report.fetched, 8);
        assert_eq!(report.run_duplicates, 3);
        assert_eq!(report.write.expect("write").inserted, 5);
        assert_eq!(store.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_partition_is_reported_and_skipped() {
        let upstream = Arc::new(ScriptedUpstream::new(vec![
            Ok(FeedPage::new(records("a", 10))),
            Err(UpstreamError::MalformedPage { entries: 10 }),
            Ok(FeedPage::new(records("b", 4))),
            Ok(FeedPage::new(Vec::new())),
        ]));
        let store = InMemoryPaperStore::new();
        let plan = CategoryPlan::categories(["cs.AI", "cs.LG"], 10, 5).expect("plan");

        let report = pipeline(upstream, &store)
            .execute(Uuid::new_v4(), &plan, &CancellationToken::new())
            .await
            .expect("sweep");

        assert_eq!(report.fetched, 4);
        assert_eq!(report.partition_errors().len(), 1);
        assert!(report.partition_errors()[0].starts_with("cs.AI: page 1 failed"));
        assert_eq!(store.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_plan_fails_before_any_call() {
        let upstream = Arc::new(ScriptedUpstream::new(Vec::new()));
        let store = InMemoryPaperStore::new();
        let plan = CategoryPlan::all(0, 5);

        let error = pipeline(Arc::clone(&upstream), &store)
            .execute(Uuid::new_v4(), &plan, &CancellationToken::new())
            .await
            .expect_err("invalid plan");

        assert!(matches!(error, PlanError::PageSize { .. }));
        assert_eq!(upstream.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_at_partition_boundary() {
        let upstream = Arc::new(ScriptedUpstream::new(Vec::new()));
        let store = InMemoryPaperStore::new();
        let plan = CategoryPlan::categories(["cs.AI", "cs.LG"], 10, 5).expect("plan");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = pipeline(Arc::clone(&upstream), &store)
            .execute(Uuid::new_v4(), &plan, &cancel)
            .await
            .expect("sweep");

        assert!(report.cancelled);
        assert!(report.partitions.is_empty());
        assert_eq!(upstream.call_count(), 0);
    }
}
