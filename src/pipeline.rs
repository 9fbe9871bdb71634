use std::{sync::Arc, time::Duration};

use crate::{
    clients::arxiv::UpstreamClient, observability::metrics::Metrics, store::PaperStore,
};

pub mod dedup;
pub mod fetch;
pub mod orchestrator;
pub mod plan;
pub mod writer;

pub use dedup::{DeduplicatedBatch, Deduplicator};
pub use fetch::{Pacer, PaginatingFetcher, PartitionBatch, PartitionFailure};
pub use orchestrator::{IngestionPipeline, PartitionReport, SweepReport};
pub use plan::{CategoryPlan, Partition, PlanError};
pub use writer::{IncrementalWriter, WriteFailure, WriteReport};

/// Assembles an [`IngestionPipeline`] from its collaborators.
pub struct PipelineBuilder {
    metrics: Arc<Metrics>,
    politeness_interval: Duration,
    commit_chunk_size: usize,
}

impl PipelineBuilder {
    #[must_use]
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            metrics,
            politeness_interval: Duration::from_secs(3),
            commit_chunk_size: 10,
        }
    }

    #[must_use]
    pub fn politeness_interval(mut self, interval: Duration) -> Self {
        self.politeness_interval = interval;
        self
    }

    #[must_use]
    pub fn commit_chunk_size(mut self, chunk_size: usize) -> Self {
        self.commit_chunk_size = chunk_size;
        self
    }

    #[must_use]
    pub fn build(
        self,
        client: Arc<dyn UpstreamClient>,
        store: Arc<dyn PaperStore>,
    ) -> IngestionPipeline {
        let pacer = Arc::new(Pacer::new(self.politeness_interval));
        let fetcher = PaginatingFetcher::new(client, pacer, Arc::clone(&self.metrics));
        let writer = IncrementalWriter::new(store, self.commit_chunk_size, Arc::clone(&self.metrics));
        IngestionPipeline::new(Arc::new(fetcher), writer, self.metrics)
    }
}
