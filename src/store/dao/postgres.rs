use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction, types::Json};

use super::{ChunkTransaction, PaperStore, StoreError};
use crate::store::models::NewStoredRecord;

const SCHEMA_SQL: &str = include_str!("../../../migrations/0001_create_papers.sql");

/// PostgreSQL 上の `papers` テーブルを扱うストア。
#[derive(Debug, Clone)]
pub struct PgPaperStore {
    pool: PgPool,
}

impl PgPaperStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// `papers` テーブルとインデックスを作成する（冪等）。
    ///
    /// # Errors
    /// SQLの実行に失敗した場合は [`StoreError`] を返す。
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .await
            .map_err(StoreError::database("applying papers schema"))?;
        Ok(())
    }
}

#[async_trait]
impl PaperStore for PgPaperStore {
    async fn exists_by_external_id(&self, external_id: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM papers WHERE external_id = $1)")
            .bind(external_id)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::database("checking paper existence"))?;

        row.try_get::<bool, _>(0)
            .map_err(StoreError::database("decoding paper existence"))
    }

    async fn begin_chunk(&self) -> Result<Box<dyn ChunkTransaction>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(StoreError::database("beginning chunk transaction"))?;
        Ok(Box::new(PgChunk { tx }))
    }

    async fn count_records(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) FROM papers")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::database("counting papers"))?;
        let count: i64 = row
            .try_get(0)
            .map_err(StoreError::database("decoding paper count"))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(StoreError::database("pinging database"))?;
        Ok(())
    }
}

struct PgChunk {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ChunkTransaction for PgChunk {
    async fn insert(&mut self, record: &NewStoredRecord) -> Result<(), StoreError> {
        let paper = record.record();
        let categories: Vec<&str> = paper.categories().iter().map(String::as_str).collect();

        sqlx::query(
            r"
            INSERT INTO papers
                (external_id, version, title, authors, abstract, primary_category, categories,
                 published_at, updated_at, journal_ref, doi, note, pdf_url, abs_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ",
        )
        .bind(paper.external_id())
        .bind(i32::try_from(paper.version()).unwrap_or(i32::MAX))
        .bind(paper.title())
        .bind(Json(paper.authors()))
        .bind(paper.abstract_text())
        .bind(paper.primary_category())
        .bind(Json(categories))
        .bind(paper.published_at())
        .bind(paper.updated_at())
        .bind(paper.journal_ref())
        .bind(paper.doi())
        .bind(paper.note())
        .bind(paper.pdf_url())
        .bind(paper.abs_url())
        .execute(&mut *self.tx)
        .await
        .map_err(|error| {
            let unique = matches!(&error, sqlx::Error::Database(db) if db.is_unique_violation());
            if unique {
                StoreError::Constraint(paper.external_id().to_string())
            } else {
                StoreError::Database {
                    context: "inserting paper",
                    source: error,
                }
            }
        })?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(StoreError::database("committing chunk"))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(StoreError::database("rolling back chunk"))
    }
}
