use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    observability::metrics::Metrics,
    store::{ChunkTransaction, NewStoredRecord, PaperStore, Record, StoreError},
};

/// 書き込みの集計。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub inserted: usize,
    pub store_duplicates: usize,
    pub chunks_committed: usize,
}

/// Fatal persistence failure. Chunks committed before it stay durable and
/// are reflected in `committed`; `unwritten` counts every record that was
/// neither inserted nor found in the store.
#[derive(Debug, Error)]
#[error("persistence failed after {} committed chunks: {source}", committed.chunks_committed)]
pub struct WriteFailure {
    pub committed: WriteReport,
    pub unwritten: usize,
    #[source]
    pub source: StoreError,
}

/// 既存チェックのうえ未登録レコードだけを固定サイズのチャンクでコミットする。
pub struct IncrementalWriter {
    store: Arc<dyn PaperStore>,
    chunk_size: usize,
    metrics: Arc<Metrics>,
}

impl IncrementalWriter {
    #[must_use]
    pub fn new(store: Arc<dyn PaperStore>, chunk_size: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            chunk_size: chunk_size.max(1),
            metrics,
        }
    }

    /// Writes `records`, which must already be free of repeated external ids.
    ///
    /// # Errors
    /// 永続化層のエラーで [`WriteFailure`] を返す。進行中のチャンクのみロールバックされる。
    pub async fn write(&self, records: Vec<Record>) -> Result<WriteReport, WriteFailure> {
        let total = records.len();
        let mut report = WriteReport::default();
        let mut chunk: Option<Box<dyn ChunkTransaction>> = None;
        let mut staged = 0;

        for record in records {
            match self.store.exists_by_external_id(record.external_id()).await {
                Ok(true) => {
                    debug!(external_id = record.external_id(), "already stored; skipping");
                    report.store_duplicates += 1;
                    continue;
                }
                Ok(false) => {}
                Err(source) => return Err(self.abort(chunk, report, total, source).await),
            }

            let mut open = match chunk.take() {
                Some(open) => open,
                None => match self.store.begin_chunk().await {
                    Ok(begun) => begun,
                    Err(source) => return Err(self.abort(None, report, total, source).await),
                },
            };
            if let Err(source) = open.insert(&NewStoredRecord::from_record(record)).await {
                return Err(self.abort(Some(open), report, total, source).await);
            }
            staged += 1;

            if staged == self.chunk_size {
                self.commit(open, staged, &mut report, total).await?;
                staged = 0;
            } else {
                chunk = Some(open);
            }
        }

        if let Some(partial) = chunk.take() {
            self.commit(partial, staged, &mut report, total).await?;
        }

        info!(
            inserted = report.inserted,
            store_duplicates = report.store_duplicates,
            chunks = report.chunks_committed,
            "incremental write finished"
        );
        Ok(report)
    }

    async fn commit(
        &self,
        chunk: Box<dyn ChunkTransaction>,
        staged: usize,
        report: &mut WriteReport,
        total: usize,
    ) -> Result<(), WriteFailure> {
        match chunk.commit().await {
            Ok(()) => {
                report.inserted += staged;
                report.chunks_committed += 1;
                self.metrics.chunks_committed.inc();
                debug!(chunk = report.chunks_committed, size = staged, "chunk committed");
                Ok(())
            }
            Err(source) => {
                // a failed commit leaves nothing of the chunk behind
                self.metrics.chunks_rolled_back.inc();
                error!(size = staged, error = %source, "chunk commit failed");
                Err(failure(*report, total, source))
            }
        }
    }

    async fn abort(
        &self,
        chunk: Option<Box<dyn ChunkTransaction>>,
        report: WriteReport,
        total: usize,
        source: StoreError,
    ) -> WriteFailure {
        if let Some(chunk) = chunk {
            self.metrics.chunks_rolled_back.inc();
            if let Err(rollback_error) = chunk.rollback().await {
                warn!(error = %rollback_error, "rollback of in-flight chunk failed");
            }
        }
        error!(error = %source, "persistence failure; in-flight chunk rolled back");
        failure(report, total, source)
    }
}

fn failure(committed: WriteReport, total: usize, source: StoreError) -> WriteFailure {
    WriteFailure {
        committed,
        unwritten: total - committed.inserted - committed.store_duplicates,
        source,
    }
}
