use crate::{concurrent::fetch_all, error::StreamError};
use connectors::{connection::Connector, sql::base::requests::FetchRowsRequest};
use futures::{
    StreamExt,
    stream::{self, BoxStream},
};
use model::{pagination::page::Page, records::row::Row};
use std::sync::Arc;
use tracing::debug;

pub type PageStream = BoxStream<'static, Result<Page, StreamError>>;

/// Fetches `limit` rows of `request` starting at `offset` on a connection
/// opened for this call alone.
pub async fn fetch_page(
    connector: &dyn Connector,
    request: &FetchRowsRequest,
    limit: usize,
    offset: usize,
) -> Result<Vec<Row>, StreamError> {
    fetch_all(connector, &request.page(limit, offset)).await
}

/// Walks `request` page by page, fetching a page only when asked for it.
///
/// Each fetch asks for one row more than `page_size`; the extra row is
/// discarded and only tells whether another page exists. A source of `n`
/// rows is therefore read in `ceil(n / page_size)` fetches, or a single
/// fetch when it is empty.
pub struct Paginator {
    connector: Arc<dyn Connector>,
    request: FetchRowsRequest,
    page_size: usize,
    index: usize,
    done: bool,
}

impl Paginator {
    pub fn new(
        connector: Arc<dyn Connector>,
        request: FetchRowsRequest,
        page_size: usize,
    ) -> Result<Self, StreamError> {
        if page_size == 0 {
            return Err(StreamError::InvalidArgument(
                "page_size must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            connector,
            request,
            page_size,
            index: 0,
            done: false,
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Offset the next fetch will use.
    pub fn offset(&self) -> usize {
        self.index.saturating_mul(self.page_size)
    }

    /// Fetches the next page, or returns `None` once the source is drained.
    /// A failed fetch leaves the position unchanged.
    pub async fn next_page(&mut self) -> Option<Result<Page, StreamError>> {
        if self.done {
            return None;
        }

        let offset = self.offset();
        let mut rows = match fetch_page(
            self.connector.as_ref(),
            &self.request,
            self.page_size.saturating_add(1),
            offset,
        )
        .await
        {
            Ok(rows) => rows,
            Err(err) => return Some(Err(err)),
        };

        if rows.is_empty() {
            self.done = true;
            debug!(table = %self.request.table, offset, "Pagination finished");
            return None;
        }

        let last = rows.len() <= self.page_size;
        rows.truncate(self.page_size);
        let page = Page {
            index: self.index,
            offset,
            page_size: self.page_size,
            rows,
            last,
        };

        debug!(
            table = %self.request.table,
            page = page.index,
            offset,
            rows = page.len(),
            last,
            "Fetched page"
        );

        self.index += 1;
        self.done = last;
        Some(Ok(page))
    }

    /// Stream of the remaining pages. The stream ends after the first error.
    pub fn into_stream(self) -> PageStream {
        stream::unfold(Some(self), |state| async move {
            let mut paginator = state?;
            match paginator.next_page().await? {
                Ok(page) => Some((Ok(page), Some(paginator))),
                Err(err) => Some((Err(err), None)),
            }
        })
        .boxed()
    }
}

/// Lazily pages through `request`, `page_size` rows at a time.
pub fn lazy_paginate(
    connector: Arc<dyn Connector>,
    request: FetchRowsRequest,
    page_size: usize,
) -> Result<PageStream, StreamError> {
    Ok(Paginator::new(connector, request, page_size)?.into_stream())
}
