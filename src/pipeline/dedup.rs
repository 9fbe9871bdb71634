use std::collections::HashSet;

use crate::store::Record;

/// 実行内の重複除去結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeduplicatedBatch {
    pub records: Vec<Record>,
    pub duplicates: usize,
}

/// 外部IDの完全一致だけで重複を判定する。最初の出現を残し、順序は保つ。
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<String>,
}

impl Deduplicator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time `record`'s external id is offered.
    pub fn admit(&mut self, record: &Record) -> bool {
        self.seen.insert(record.external_id().to_string())
    }

    pub fn deduplicate(&mut self, records: impl IntoIterator<Item = Record>) -> DeduplicatedBatch {
        let mut kept = Vec::new();
        let mut duplicates = 0;
        for record in records {
            if self.admit(&record) {
                kept.push(record);
            } else {
                duplicates += 1;
            }
        }
        DeduplicatedBatch {
            records: kept,
            duplicates,
        }
    }
}
