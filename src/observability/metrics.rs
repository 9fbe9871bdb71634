/// Prometheusメトリクス定義。
use prometheus::{
    Counter, Gauge, Histogram, HistogramOpts, Registry, register_counter_with_registry,
    register_gauge_with_registry, register_histogram_with_registry,
};
use std::sync::Arc;

/// メトリクスコレクター。
#[derive(Debug, Clone)]
pub struct Metrics {
    // カウンター
    pub records_fetched: Counter,
    pub records_inserted: Counter,
    pub run_duplicates: Counter,
    pub store_duplicates: Counter,
    pub records_malformed: Counter,
    pub pages_fetched: Counter,
    pub partition_failures: Counter,
    pub chunks_committed: Counter,
    pub chunks_rolled_back: Counter,
    pub runs_completed: Counter,
    pub runs_failed: Counter,
    pub runs_skipped: Counter,

    // ヒストグラム
    pub page_fetch_duration: Histogram,
    pub sweep_duration: Histogram,

    // ゲージ
    pub sweep_in_progress: Gauge,
    pub last_success_timestamp: Gauge,
}

impl Metrics {
    /// 新しいメトリクスコレクターを作成する。
    ///
    /// # Errors
    /// 同じレジストリに二重登録した場合はエラーを返す。
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            records_fetched: register_counter_with_registry!(
                "arxiv_ingest_records_fetched_total",
                "Total number of records returned by the upstream",
                registry
            )?,
            records_inserted: register_counter_with_registry!(
                "arxiv_ingest_records_inserted_total",
                "Total number of records inserted into the store",
                registry
            )?,
            run_duplicates: register_counter_with_registry!(
                "arxiv_ingest_run_duplicates_total",
                "Records dropped because the same external id was already seen in the run",
                registry
            )?,
            store_duplicates: register_counter_with_registry!(
                "arxiv_ingest_store_duplicates_total",
                "Records skipped because the external id already exists in the store",
                registry
            )?,
            records_malformed: register_counter_with_registry!(
                "arxiv_ingest_records_malformed_total",
                "Feed entries dropped because they could not be parsed",
                registry
            )?,
            pages_fetched: register_counter_with_registry!(
                "arxiv_ingest_pages_fetched_total",
                "Number of upstream pages fetched",
                registry
            )?,
            partition_failures: register_counter_with_registry!(
                "arxiv_ingest_partition_failures_total",
                "Number of partitions abandoned because of an upstream error",
                registry
            )?,
            chunks_committed: register_counter_with_registry!(
                "arxiv_ingest_chunks_committed_total",
                "Number of committed insert chunks",
                registry
            )?,
            chunks_rolled_back: register_counter_with_registry!(
                "arxiv_ingest_chunks_rolled_back_total",
                "Number of insert chunks rolled back after a persistence failure",
                registry
            )?,
            runs_completed: register_counter_with_registry!(
                "arxiv_ingest_runs_completed_total",
                "Number of sweeps that reached COMPLETED",
                registry
            )?,
            runs_failed: register_counter_with_registry!(
                "arxiv_ingest_runs_failed_total",
                "Number of sweeps that reached FAILED",
                registry
            )?,
            runs_skipped: register_counter_with_registry!(
                "arxiv_ingest_runs_skipped_total",
                "Number of triggers skipped because a sweep was already running",
                registry
            )?,
            page_fetch_duration: register_histogram_with_registry!(
                HistogramOpts::new(
                    "arxiv_ingest_page_fetch_duration_seconds",
                    "Latency of a single upstream page fetch",
                )
                .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
                registry
            )?,
            sweep_duration: register_histogram_with_registry!(
                HistogramOpts::new(
                    "arxiv_ingest_sweep_duration_seconds",
                    "Duration of a full ingestion sweep",
                )
                .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]),
                registry
            )?,
            sweep_in_progress: register_gauge_with_registry!(
                "arxiv_ingest_sweep_in_progress",
                "1 while a sweep is running",
                registry
            )?,
            last_success_timestamp: register_gauge_with_registry!(
                "arxiv_ingest_last_success_timestamp_seconds",
                "Unix time at which the last COMPLETED sweep finished",
                registry
            )?,
        })
    }
}
