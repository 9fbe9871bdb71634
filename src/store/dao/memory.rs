use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use chrono::Utc;

use super::{ChunkTransaction, PaperStore, StoreError};
use crate::store::models::{NewStoredRecord, Record, StoredRecord};

/// プロセス内ストア。DSN未設定時のローカル実行とテストで使用する。
///
/// チャンク内の挿入はコミットされるまで他から見えない。
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaperStore {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    rows: Vec<StoredRecord>,
    index: HashMap<String, usize>,
    commit_attempts: usize,
    committed_chunks: usize,
    fail_commit_at: Option<usize>,
    unavailable: bool,
}

impl MemoryState {
    fn apply(&mut self, staged: Vec<NewStoredRecord>) {
        let now = Utc::now();
        for new in staged {
            let position = self.rows.len();
            let id = i64::try_from(position).unwrap_or(i64::MAX).saturating_add(1);
            self.index.insert(new.external_id().to_string(), position);
            self.rows.push(StoredRecord {
                id,
                record: new.record,
                vote_count: 0,
                comment_count: 0,
                created_at: now,
            });
        }
    }
}

impl InMemoryPaperStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 既存レコードを1チャンクとしてコミット済みの状態で投入する。
    #[must_use]
    pub fn with_records(self, records: impl IntoIterator<Item = Record>) -> Self {
        {
            let mut state = self.lock();
            let staged = records
                .into_iter()
                .filter(|record| !state.index.contains_key(record.external_id()))
                .map(NewStoredRecord::from_record)
                .collect();
            state.apply(staged);
        }
        self
    }

    /// Makes the `n`-th commit attempt (1-based, counted from now on) fail.
    pub fn fail_commit_at(&self, n: usize) {
        let mut state = self.lock();
        state.fail_commit_at = Some(state.commit_attempts + n);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    #[must_use]
    pub fn committed_chunks(&self) -> usize {
        self.lock().committed_chunks
    }

    #[must_use]
    pub fn contains(&self, external_id: &str) -> bool {
        self.lock().index.contains_key(external_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn records(&self) -> Vec<StoredRecord> {
        self.lock().rows.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.lock().unavailable {
            return Err(StoreError::Unavailable("in-memory store marked unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaperStore for InMemoryPaperStore {
    async fn exists_by_external_id(&self, external_id: &str) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(self.contains(external_id))
    }

    async fn begin_chunk(&self) -> Result<Box<dyn ChunkTransaction>, StoreError> {
        self.check_available()?;
        Ok(Box::new(MemoryChunk {
            state: Arc::clone(&self.state),
            staged: Vec::new(),
        }))
    }

    async fn count_records(&self) -> Result<u64, StoreError> {
        self.check_available()?;
        Ok(u64::try_from(self.len()).unwrap_or(u64::MAX))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }
}

struct MemoryChunk {
    state: Arc<Mutex<MemoryState>>,
    staged: Vec<NewStoredRecord>,
}

#[async_trait]
impl ChunkTransaction for MemoryChunk {
    async fn insert(&mut self, record: &NewStoredRecord) -> Result<(), StoreError> {
        self.staged.push(record.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryChunk { state, staged } = *self;
        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);

        state.commit_attempts += 1;
        if state.unavailable || state.fail_commit_at == Some(state.commit_attempts) {
            return Err(StoreError::Unavailable(format!(
                "commit {} rejected",
                state.commit_attempts
            )));
        }
        if let Some(conflict) = staged
            .iter()
            .find(|new| state.index.contains_key(new.external_id()))
        {
            return Err(StoreError::Constraint(conflict.external_id().to_string()));
        }

        state.apply(staged);
        state.committed_chunks += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
