/// arXiv export API（Atomフィード）のクライアント。
///
/// 1回の呼び出しで1ページだけ取得する。再試行・ページング・ペーシングは呼び出し側の責務。
pub(crate) mod feed;

use std::{fmt, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use feed::FeedPage;

/// Hard cap the export API places on `max_results`.
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    Relevance,
    LastUpdatedDate,
    SubmittedDate,
}

impl SortKey {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Relevance => "relevance",
            SortKey::LastUpdatedDate => "lastUpdatedDate",
            SortKey::SubmittedDate => "submittedDate",
        }
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "relevance" => Ok(SortKey::Relevance),
            "lastUpdatedDate" => Ok(SortKey::LastUpdatedDate),
            "submittedDate" => Ok(SortKey::SubmittedDate),
            other => Err(format!("unknown sort key: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Ascending => "ascending",
            SortOrder::Descending => "descending",
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "ascending" | "asc" => Ok(SortOrder::Ascending),
            "descending" | "desc" => Ok(SortOrder::Descending),
            other => Err(format!("unknown sort order: {other}")),
        }
    }
}

/// 1ページ分の取得要求。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub query: String,
    pub page_size: usize,
    pub offset: usize,
    pub sort_key: SortKey,
    pub sort_order: SortOrder,
}

impl fmt::Display for PageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [offset={}, size={}]",
            self.query, self.offset, self.page_size
        )
    }
}

/// Coarse classification used for logging, metrics and run error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    /// Network failure, timeout, 5xx/429 or a page with no usable entries.
    Transient,
    /// The feed body could not be decoded at all.
    Malformed,
    /// The request itself was refused (4xx, API error entry, invalid page size).
    Rejected,
}

impl UpstreamErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            UpstreamErrorKind::Transient => "transient",
            UpstreamErrorKind::Malformed => "malformed",
            UpstreamErrorKind::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("arxiv request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("arxiv returned status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("arxiv api error: {0}")]
    Api(String),
    #[error("arxiv feed could not be decoded: {0}")]
    MalformedFeed(String),
    #[error("arxiv page had {entries} entries but none were usable")]
    MalformedPage { entries: usize },
    #[error("page size {0} is outside 1..={MAX_PAGE_SIZE}")]
    PageSizeOutOfRange(usize),
}

impl UpstreamError {
    #[must_use]
    pub fn kind(&self) -> UpstreamErrorKind {
        match self {
            UpstreamError::Transport(_) | UpstreamError::MalformedPage { .. } => {
                UpstreamErrorKind::Transient
            }
            UpstreamError::Status { status, .. }
                if status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS =>
            {
                UpstreamErrorKind::Transient
            }
            UpstreamError::MalformedFeed(_) => UpstreamErrorKind::Malformed,
            UpstreamError::Status { .. }
            | UpstreamError::Api(_)
            | UpstreamError::PageSizeOutOfRange(_) => UpstreamErrorKind::Rejected,
        }
    }
}

/// 上流ソースへの1ページ取得の抽象。
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// 指定オフセットの1ページを取得する。空のページは「これ以上結果がない」ことを示し、エラーではない。
    async fn fetch(&self, request: &PageRequest) -> Result<FeedPage, UpstreamError>;
}

#[derive(Debug, Clone)]
pub struct ArxivConfig {
    pub base_url: String,
    pub user_agent: String,
    pub connect_timeout: Duration,
    pub total_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ArxivClient {
    client: Client,
    base_url: Url,
}

impl ArxivClient {
    /// 新しい arXiv クライアントを作成する。
    ///
    /// # Errors
    /// URLのパースまたはHTTPクライアントの構築に失敗した場合はエラーを返します。
    pub fn new(config: ArxivConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent)
            .connect_timeout(config.connect_timeout)
            .timeout(config.total_timeout)
            .build()
            .context("failed to build arXiv HTTP client")?;

        let base_url = Url::parse(&config.base_url).context("invalid arXiv base URL")?;

        Ok(Self { client, base_url })
    }

    fn page_url(&self, request: &PageRequest) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("search_query", &search_query(&request.query))
            .append_pair("start", &request.offset.to_string())
            .append_pair("max_results", &request.page_size.to_string())
            .append_pair("sortBy", request.sort_key.as_str())
            .append_pair("sortOrder", request.sort_order.as_str());
        url
    }
}

#[async_trait]
impl UpstreamClient for ArxivClient {
    async fn fetch(&self, request: &PageRequest) -> Result<FeedPage, UpstreamError> {
        if request.page_size == 0 || request.page_size > MAX_PAGE_SIZE {
            return Err(UpstreamError::PageSizeOutOfRange(request.page_size));
        }

        let url = self.page_url(request);
        debug!(%url, "requesting arXiv page");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status { status, body });
        }

        let body = response.text().await?;
        feed::parse_page(&body)
    }
}

/// Queries without a field prefix search every field, e.g. `all` → `all:all`.
fn search_query(query: &str) -> String {
    let query = query.trim();
    if query.contains(':') {
        query.to_string()
    } else {
        format!("all:{query}")
    }
}
