//! arXiv export API の Atom フィードを [`Record`] に変換する。
//!
//! エントリ単位のパース失敗はそのエントリだけを捨てる。ページ全体が
//! 使えない場合は [`UpstreamError::MalformedPage`] になる。

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::UpstreamError;
use crate::store::models::Record;

static ABS_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/abs/(?P<id>.+?)(?:v(?P<version>\d+))?$").expect("static regex is valid")
});

/// One decoded page of the feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedPage {
    pub records: Vec<Record>,
    /// Entries dropped because a required field was missing or unparsable.
    pub malformed: usize,
}

impl FeedPage {
    #[must_use]
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            malformed: 0,
        }
    }

    /// 上流がこのオフセットで結果を返さなかった（枯渇した）ことを示す。
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.records.is_empty() && self.malformed == 0
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum EntryError {
    #[error("entry has no id")]
    MissingId,
    #[error("unrecognised entry id {0}")]
    UnrecognisedId(String),
    #[error("entry {0} has no title")]
    MissingTitle(String),
    #[error("entry {id} has invalid {field} timestamp {value:?}")]
    InvalidTimestamp {
        id: String,
        field: &'static str,
        value: String,
    },
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct AtomEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    published: Option<String>,
    #[serde(default)]
    updated: Option<String>,
    #[serde(rename = "author", default)]
    authors: Vec<AtomAuthor>,
    #[serde(rename = "category", default)]
    categories: Vec<AtomCategory>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    #[serde(rename = "arxiv:primary_category", alias = "primary_category", default)]
    primary_category: Option<AtomCategory>,
    #[serde(rename = "arxiv:comment", alias = "comment", default)]
    comment: Option<TextNode>,
    #[serde(rename = "arxiv:journal_ref", alias = "journal_ref", default)]
    journal_ref: Option<TextNode>,
    #[serde(rename = "arxiv:doi", alias = "doi", default)]
    doi: Option<TextNode>,
}

#[derive(Debug, Default, Deserialize)]
struct AtomAuthor {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AtomCategory {
    #[serde(rename = "@term", default)]
    term: String,
}

#[derive(Debug, Default, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href", default)]
    href: String,
    #[serde(rename = "@rel", default)]
    rel: Option<String>,
    #[serde(rename = "@type", default)]
    link_type: Option<String>,
    #[serde(rename = "@title", default)]
    title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TextNode {
    #[serde(rename = "$text", default)]
    value: String,
}

/// レスポンス本文を1ページ分のレコードに変換する。
pub(crate) fn parse_page(body: &str) -> Result<FeedPage, UpstreamError> {
    let feed: AtomFeed = quick_xml::de::from_str(body)
        .map_err(|error| UpstreamError::MalformedFeed(error.to_string()))?;

    if let Some(message) = api_error_message(&feed.entries) {
        return Err(UpstreamError::Api(message));
    }

    let entries = feed.entries.len();
    let mut page = FeedPage::default();
    for entry in feed.entries {
        match entry_into_record(entry) {
            Ok(record) => page.records.push(record),
            Err(error) => {
                debug!(%error, "dropping malformed feed entry");
                page.malformed += 1;
            }
        }
    }

    if page.records.is_empty() && page.malformed > 0 {
        return Err(UpstreamError::MalformedPage { entries });
    }

    Ok(page)
}

// arXiv reports query errors as a single entry whose id points at /api/errors.
fn api_error_message(entries: &[AtomEntry]) -> Option<String> {
    entries
        .iter()
        .find(|entry| {
            entry
                .id
                .as_deref()
                .is_some_and(|id| id.contains("/api/errors"))
        })
        .map(|entry| {
            entry
                .summary
                .as_deref()
                .map(normalize_whitespace)
                .unwrap_or_else(|| "unknown arXiv API error".to_string())
        })
}

fn entry_into_record(entry: AtomEntry) -> Result<Record, EntryError> {
    let raw_id = entry
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(EntryError::MissingId)?;
    let (external_id, version) = split_versioned_id(raw_id)?;

    let title = entry
        .title
        .as_deref()
        .map(normalize_whitespace)
        .filter(|title| !title.is_empty())
        .ok_or_else(|| EntryError::MissingTitle(external_id.clone()))?;

    let published_at = parse_timestamp(&external_id, "published", entry.published.as_deref())?;
    let updated_at = match entry.updated.as_deref() {
        Some(raw) => parse_timestamp(&external_id, "updated", Some(raw))?,
        None => published_at,
    };

    let categories: Vec<String> = entry
        .categories
        .into_iter()
        .map(|category| category.term.trim().to_string())
        .filter(|term| !term.is_empty())
        .collect();
    let primary_category = entry
        .primary_category
        .map(|category| category.term.trim().to_string())
        .filter(|term| !term.is_empty())
        .or_else(|| categories.first().cloned())
        .unwrap_or_default();

    let authors = entry
        .authors
        .into_iter()
        .filter_map(|author| author.name)
        .map(|name| normalize_whitespace(&name))
        .filter(|name| !name.is_empty())
        .collect();

    let pdf_url = entry
        .links
        .iter()
        .find(|link| {
            link.title.as_deref() == Some("pdf")
                || link.link_type.as_deref() == Some("application/pdf")
        })
        .map(|link| link.href.clone());
    let abs_url = entry
        .links
        .iter()
        .find(|link| link.rel.as_deref() == Some("alternate"))
        .map(|link| link.href.clone())
        .or_else(|| Some(raw_id.to_string()));

    Ok(Record::new(external_id, title, published_at)
        .with_version(version)
        .with_updated_at(updated_at)
        .with_authors(authors)
        .with_abstract(entry.summary.as_deref().map(normalize_whitespace).unwrap_or_default())
        .with_categories(categories)
        .with_primary_category(primary_category)
        .with_note(optional_text(entry.comment))
        .with_journal_ref(optional_text(entry.journal_ref))
        .with_doi(optional_text(entry.doi))
        .with_links(pdf_url, abs_url))
}

/// `http://arxiv.org/abs/2401.12345v2` → (`2401.12345`, 2)
pub(crate) fn split_versioned_id(raw: &str) -> Result<(String, u32), EntryError> {
    let captures = ABS_ID
        .captures(raw)
        .ok_or_else(|| EntryError::UnrecognisedId(raw.to_string()))?;
    let id = captures
        .name("id")
        .map(|m| m.as_str().trim_end_matches('/'))
        .filter(|id| !id.is_empty())
        .ok_or_else(|| EntryError::UnrecognisedId(raw.to_string()))?;
    let version = captures
        .name("version")
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(1);
    Ok((id.to_string(), version))
}

fn parse_timestamp(
    id: &str,
    field: &'static str,
    raw: Option<&str>,
) -> Result<DateTime<Utc>, EntryError> {
    let value = raw.map(str::trim).unwrap_or_default();
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| EntryError::InvalidTimestamp {
            id: id.to_string(),
            field,
            value: value.to_string(),
        })
}

fn optional_text(node: Option<TextNode>) -> Option<String> {
    node.map(|node| normalize_whitespace(&node.value))
        .filter(|text| !text.is_empty())
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
