//! Persistence contract consumed by the ingestion writer.
//!
//! Each chunk of inserts is one transaction: staged rows become visible to
//! readers only after `commit`, and `rollback` discards the chunk without
//! touching chunks that were already committed.

mod memory;
mod postgres;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::InMemoryPaperStore;
pub use postgres::PgPaperStore;

use super::models::NewStoredRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database operation failed while {context}: {source}")]
    Database {
        context: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("unique constraint violated for external id {0}")]
    Constraint(String),
}

impl StoreError {
    pub(crate) fn database(context: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self::Database { context, source }
    }
}

/// 記事ストアへのアクセス層。
#[async_trait]
pub trait PaperStore: Send + Sync {
    /// 外部IDのレコードがコミット済みで存在するかを返す。
    async fn exists_by_external_id(&self, external_id: &str) -> Result<bool, StoreError>;

    /// 新しいチャンク（トランザクション）を開始する。
    async fn begin_chunk(&self) -> Result<Box<dyn ChunkTransaction>, StoreError>;

    /// 永続化済みレコードの総数。
    async fn count_records(&self) -> Result<u64, StoreError>;

    /// 接続確認。
    async fn ping(&self) -> Result<(), StoreError>;
}

/// One chunk-scoped transaction.
#[async_trait]
pub trait ChunkTransaction: Send {
    async fn insert(&mut self, record: &NewStoredRecord) -> Result<(), StoreError>;

    /// Makes every staged insert durable. On error nothing from this chunk is kept.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
