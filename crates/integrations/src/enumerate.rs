//! Cursor-paginated enumeration.
//!
//! An [`Enumerator`] turns a list endpoint into a finite, restartable sequence of pages.
//! An empty or absent next-page token ends the sequence after the page carrying it;
//! a token seen before is reported instead of looping.

use async_trait::async_trait;
use std::collections::HashSet;
use tracing::debug;

/// Errors that can occur while enumerating pages.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Failed to fetch page: {source}")]
    Fetch {
        #[source]
        source: crate::client::Error,
    },
    #[error("Server returned page token {token} twice")]
    RepeatedPageToken { token: String },
}

/// List parameters sent with every page request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub page_size: Option<u32>,
    pub filter: Option<String>,
    pub order_by: Option<String>,
}

impl PageRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    /// Query parameters for a request carrying `page_token`.
    pub fn query(&self, page_token: Option<&str>) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(page_size) = self.page_size {
            query.push(("pageSize", page_size.to_string()));
        }
        if let Some(filter) = &self.filter {
            query.push(("filter", filter.clone()));
        }
        if let Some(order_by) = &self.order_by {
            query.push(("orderBy", order_by.clone()));
        }
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }
        query
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

/// Fetches a single page from a list endpoint.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    type Item: Send;

    async fn fetch(
        &self,
        request: &PageRequest,
        page_token: Option<&str>,
    ) -> Result<Page<Self::Item>, crate::client::Error>;
}

/// Lazy sequence of pages.
pub struct Enumerator<F: PageFetcher> {
    fetcher: F,
    request: PageRequest,
    next_token: Option<String>,
    seen_tokens: HashSet<String>,
    finished: bool,
}

impl<F: PageFetcher> Enumerator<F> {
    pub fn new(fetcher: F, request: PageRequest) -> Self {
        Self {
            fetcher,
            request,
            next_token: None,
            seen_tokens: HashSet::new(),
            finished: false,
        }
    }

    /// Fetches the next page, `None` once the sequence is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Vec<F::Item>>, Error> {
        if self.finished {
            return Ok(None);
        }

        let page = self
            .fetcher
            .fetch(&self.request, self.next_token.as_deref())
            .await
            .map_err(|source| Error::Fetch { source })?;

        match page.next_page_token.filter(|token| !token.is_empty()) {
            None => {
                self.finished = true;
                self.next_token = None;
            }
            Some(token) => {
                if !self.seen_tokens.insert(token.clone()) {
                    self.finished = true;
                    return Err(Error::RepeatedPageToken { token });
                }
                debug!(items = page.items.len(), "Fetched page, more pages follow");
                self.next_token = Some(token);
            }
        }

        Ok(Some(page.items))
    }

    /// Drains every remaining page.
    pub async fn collect_all(&mut self) -> Result<Vec<F::Item>, Error> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await? {
            items.extend(page);
        }
        Ok(items)
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Restarts the sequence from the first page.
    pub fn reset(&mut self) {
        self.next_token = None;
        self.seen_tokens.clear();
        self.finished = false;
    }
}
