use std::collections::VecDeque;
use std::iter::FusedIterator;

use serde_json::Value;
use tracing::debug;

use crate::error::SourceError;
use crate::source::ActivitySource;

pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Newest-first walk over a source's activity listing, one page at a time.
///
/// Always starts at offset zero. Iteration ends when the offset reaches the
/// total reported by the most recent page, when a page comes back short, or
/// when `limit` items have been yielded. A listing error is yielded once and
/// ends the walk.
pub struct ActivityPages<'a, S: ?Sized> {
    source: &'a S,
    batch_size: usize,
    limit: Option<usize>,
    offset: usize,
    yielded: usize,
    total: Option<usize>,
    buffer: VecDeque<Value>,
    finished: bool,
}

impl<'a, S: ActivitySource + ?Sized> ActivityPages<'a, S> {
    pub fn new(source: &'a S, batch_size: usize) -> Self {
        Self {
            source,
            batch_size: batch_size.max(1),
            limit: None,
            offset: 0,
            yielded: 0,
            total: None,
            buffer: VecDeque::new(),
            finished: false,
        }
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Total reported by the most recent page, if any page was fetched.
    pub fn last_total(&self) -> Option<usize> {
        self.total
    }

    fn limit_reached(&self) -> bool {
        self.limit.is_some_and(|limit| self.yielded >= limit)
    }

    fn fetch_page(&mut self) -> Result<(), SourceError> {
        let mut count = self.batch_size;
        if let Some(limit) = self.limit {
            count = count.min(limit.saturating_sub(self.yielded));
        }
        let page = self.source.list_activities(self.offset, count)?;
        let received = page.items.len();
        debug!(
            target: "fitmirror::pages",
            offset = self.offset,
            requested = count,
            received,
            total_found = page.total_found,
            "listed page"
        );
        self.offset += received;
        self.total = Some(page.total_found);
        if received < count {
            self.finished = true;
        }
        self.buffer.extend(page.items);
        Ok(())
    }
}

impl<S: ActivitySource + ?Sized> Iterator for ActivityPages<'_, S> {
    type Item = Result<Value, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.limit_reached() {
                return None;
            }
            if let Some(item) = self.buffer.pop_front() {
                self.yielded += 1;
                return Some(Ok(item));
            }
            if self.finished {
                return None;
            }
            if self.total.is_some_and(|total| self.offset >= total) {
                self.finished = true;
                return None;
            }
            if let Err(err) = self.fetch_page() {
                self.finished = true;
                self.buffer.clear();
                return Some(Err(err));
            }
        }
    }
}

impl<S: ActivitySource + ?Sized> FusedIterator for ActivityPages<'_, S> {}
