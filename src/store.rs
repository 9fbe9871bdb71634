pub mod dao;
pub mod models;

pub use dao::{ChunkTransaction, InMemoryPaperStore, PaperStore, PgPaperStore, StoreError};
pub use models::{NewStoredRecord, Record, StoredRecord};
