use std::collections::VecDeque;

use crate::{
    backoff::ExponentialBackoff,
    http::{SearchBackend, SearchRequest},
    scan_log, ClientError, Hit, Result,
};

/// Streams every hit matching a request, page by page, following the
/// `search_after` cursor of the last hit on each page.
pub struct SearchAfterScan<'a, B: SearchBackend + ?Sized> {
    backend: &'a B,
    request: SearchRequest,
    backoff: ExponentialBackoff,
    buffer: VecDeque<Hit>,
    pages: usize,
    done: bool,
}

impl<'a, B: SearchBackend + ?Sized> SearchAfterScan<'a, B> {
    pub fn new(backend: &'a B, request: SearchRequest) -> Self {
        Self::with_backoff(backend, request, ExponentialBackoff::default())
    }

    pub fn with_backoff(backend: &'a B, request: SearchRequest, backoff: ExponentialBackoff) -> Self {
        Self {
            backend,
            request,
            backoff,
            buffer: VecDeque::new(),
            pages: 0,
            done: false,
        }
    }

    /// Number of pages fetched so far
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Hits fetched but not yet yielded, zero at a page boundary
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn fetch_page(&mut self) -> Result<()> {
        let backend = self.backend;
        let request = &self.request;
        let response = self
            .backoff
            .retry(|| backend.search(request), ClientError::is_transient)?;
        self.pages += 1;

        let hits = response.hits.hits;
        scan_log!(
            debug,
            "scan",
            self.request.index,
            "page {} returned {} hits in {}ms",
            self.pages,
            hits.len(),
            response.took
        );

        match hits.last() {
            None => self.done = true,
            Some(last) if last.sort.is_empty() => {
                scan_log!(
                    warn,
                    "scan",
                    self.request.index,
                    "hit {} carries no sort values, stopping after this page",
                    last.id
                );
                self.done = true;
            }
            Some(last) => self.request.search_after = Some(last.sort.clone()),
        }
        self.buffer.extend(hits);
        Ok(())
    }
}

impl<B: SearchBackend + ?Sized> Iterator for SearchAfterScan<'_, B> {
    type Item = Result<Hit>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(hit) = self.buffer.pop_front() {
                return Some(Ok(hit));
            }
            if self.done {
                return None;
            }
            if let Err(err) = self.fetch_page() {
                self.done = true;
                return Some(Err(err));
            }
        }
    }
}
