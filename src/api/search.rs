use super::{ApiClient, ApiResult};
use crate::models::{Gallery, TagToken, Video};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::marker::PhantomData;

/// Paging + filter parameters shared by every list/search endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageQuery {
    /// 1-based.
    pub page: u32,
    pub size: u32,
    /// Free-form search text (`s` on the wire).
    pub s: String,
    pub extra: BTreeMap<String, String>,
}

impl PageQuery {
    pub fn new(size: u32) -> Self {
        Self {
            page: 1,
            size,
            s: String::new(),
            extra: BTreeMap::new(),
        }
    }

    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("page".to_string(), self.page.to_string()),
            ("size".to_string(), self.size.to_string()),
        ];
        if !self.s.is_empty() {
            pairs.push(("s".to_string(), self.s.clone()));
        }
        for (k, v) in &self.extra {
            if k != "page" && k != "size" && k != "s" {
                pairs.push((k.clone(), v.clone()));
            }
        }
        pairs
    }
}

/// One page of records for an incremental source.
///
/// An empty page means the source is exhausted.
#[allow(async_fn_in_trait)]
pub trait PageFetcher<R> {
    async fn fetch(&self, query: &PageQuery) -> ApiResult<Vec<R>>;
}

/// `GET {path}?page=..&size=..&s=..` returning a JSON array of `R`.
#[derive(Clone, Debug)]
pub struct SearchEndpoint<R> {
    client: ApiClient,
    path: String,
    _record: PhantomData<fn() -> R>,
}

impl<R> SearchEndpoint<R> {
    pub fn new(client: ApiClient, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl SearchEndpoint<Gallery> {
    pub fn galleries(client: ApiClient) -> Self {
        Self::new(client, "/api/v1/gallery/search")
    }
}

impl SearchEndpoint<Video> {
    pub fn videos(client: ApiClient) -> Self {
        Self::new(client, "/api/v1/video/search")
    }
}

impl SearchEndpoint<TagToken> {
    pub fn tag_tokens(client: ApiClient) -> Self {
        Self::new(client, "/api/v1/tag/token-startswith")
    }
}

impl<R: DeserializeOwned> PageFetcher<R> for SearchEndpoint<R> {
    async fn fetch(&self, query: &PageQuery) -> ApiResult<Vec<R>> {
        self.client.get(&self.path, &query.to_pairs()).await
    }
}
