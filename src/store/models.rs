use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// 上流（arXiv）から取得した1件のメタデータ。
///
/// `UpstreamClient` のパース結果としてのみ生成され、生成後は変更されない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    external_id: String,
    version: u32,
    title: String,
    authors: Vec<String>,
    abstract_text: String,
    primary_category: String,
    categories: BTreeSet<String>,
    published_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    journal_ref: Option<String>,
    doi: Option<String>,
    note: Option<String>,
    pdf_url: Option<String>,
    abs_url: Option<String>,
}

impl Record {
    /// 必須フィールドのみでレコードを作成する。`updated_at` は `published_at` で初期化される。
    #[must_use]
    pub fn new(
        external_id: impl Into<String>,
        title: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            version: 1,
            title: title.into(),
            authors: Vec::new(),
            abstract_text: String::new(),
            primary_category: String::new(),
            categories: BTreeSet::new(),
            published_at,
            updated_at: published_at,
            journal_ref: None,
            doi: None,
            note: None,
            pdf_url: None,
            abs_url: None,
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub fn with_authors(mut self, authors: Vec<String>) -> Self {
        self.authors = authors;
        self
    }

    #[must_use]
    pub fn with_abstract(mut self, abstract_text: impl Into<String>) -> Self {
        self.abstract_text = abstract_text.into();
        self
    }

    /// 主カテゴリを設定する。主カテゴリは常にカテゴリ集合にも含まれる。
    #[must_use]
    pub fn with_primary_category(mut self, category: impl Into<String>) -> Self {
        let category = category.into();
        if !category.is_empty() {
            self.categories.insert(category.clone());
        }
        self.primary_category = category;
        self
    }

    #[must_use]
    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories
            .extend(categories.into_iter().map(Into::into).filter(|c| !c.is_empty()));
        self
    }

    #[must_use]
    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = updated_at;
        self
    }

    #[must_use]
    pub fn with_journal_ref(mut self, journal_ref: Option<String>) -> Self {
        self.journal_ref = journal_ref;
        self
    }

    #[must_use]
    pub fn with_doi(mut self, doi: Option<String>) -> Self {
        self.doi = doi;
        self
    }

    #[must_use]
    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }

    #[must_use]
    pub fn with_links(mut self, pdf_url: Option<String>, abs_url: Option<String>) -> Self {
        self.pdf_url = pdf_url;
        self.abs_url = abs_url;
        self
    }

    #[must_use]
    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn authors(&self) -> &[String] {
        &self.authors
    }

    #[must_use]
    pub fn abstract_text(&self) -> &str {
        &self.abstract_text
    }

    #[must_use]
    pub fn primary_category(&self) -> &str {
        &self.primary_category
    }

    #[must_use]
    pub fn categories(&self) -> &BTreeSet<String> {
        &self.categories
    }

    #[must_use]
    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    #[must_use]
    pub fn journal_ref(&self) -> Option<&str> {
        self.journal_ref.as_deref()
    }

    #[must_use]
    pub fn doi(&self) -> Option<&str> {
        self.doi.as_deref()
    }

    #[must_use]
    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    #[must_use]
    pub fn pdf_url(&self) -> Option<&str> {
        self.pdf_url.as_deref()
    }

    #[must_use]
    pub fn abs_url(&self) -> Option<&str> {
        self.abs_url.as_deref()
    }
}

/// 挿入待ちのレコード。IDとカウンタはストア側が割り当てる。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStoredRecord {
    pub(crate) record: Record,
}

impl NewStoredRecord {
    #[must_use]
    pub fn from_record(record: Record) -> Self {
        Self { record }
    }

    #[must_use]
    pub fn record(&self) -> &Record {
        &self.record
    }

    #[must_use]
    pub fn external_id(&self) -> &str {
        self.record.external_id()
    }
}

/// 永続化済みのレコード。
///
/// `vote_count` / `comment_count` はCRUD層が管理し、取り込み処理からは変更しない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredRecord {
    pub id: i64,
    #[serde(flatten)]
    pub record: Record,
    pub vote_count: i64,
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
}
