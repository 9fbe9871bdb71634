pub mod arxiv;

pub use arxiv::{
    ArxivClient, ArxivConfig, FeedPage, PageRequest, SortKey, SortOrder, UpstreamClient,
    UpstreamError, UpstreamErrorKind,
};
