//! Shared, replayable view over a row stream.
//!
//! Wrapping a stream in [`SharedRows`] lets several cursors enumerate the
//! same results while the underlying fetch runs at most once. Rows are
//! pulled lazily, appended to a cache, and replayed to every cursor in
//! order. A terminal error is cached too and replayed to late cursors.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{QueryError, Result};

type Inner<'a, R> = Box<dyn Iterator<Item = Result<R>> + 'a>;

struct CacheState<R> {
    rows: Vec<R>,
    failed: Option<Arc<QueryError>>,
    finished: bool,
}

struct Shared<'a, R> {
    state: RwLock<CacheState<R>>,
    // Held only while pulling the next row from the source.
    fetch: Mutex<Option<Inner<'a, R>>>,
}

/// Handle to a cached row sequence. Cheap to clone; all clones share the
/// cache and the single underlying fetch.
pub struct SharedRows<'a, R> {
    shared: Arc<Shared<'a, R>>,
}

impl<R> Clone for SharedRows<'_, R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<'a, R: Clone> SharedRows<'a, R> {
    /// Wraps a stream. Nothing is fetched until a cursor advances past the
    /// cached prefix.
    pub fn new(inner: impl Iterator<Item = Result<R>> + 'a) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(CacheState {
                    rows: Vec::new(),
                    failed: None,
                    finished: false,
                }),
                fetch: Mutex::new(Some(Box::new(inner))),
            }),
        }
    }

    /// Opens a cursor positioned at the start of the sequence.
    pub fn cursor(&self) -> SharedCursor<'a, R> {
        SharedCursor {
            shared: Arc::clone(&self.shared),
            pos: 0,
            errored: false,
        }
    }

    /// Number of rows cached so far.
    pub fn cached_len(&self) -> usize {
        self.shared.state.read().rows.len()
    }
}

/// Independent read position over a [`SharedRows`] cache.
pub struct SharedCursor<'a, R> {
    shared: Arc<Shared<'a, R>>,
    pos: usize,
    errored: bool,
}

impl<R: Clone> Iterator for SharedCursor<'_, R> {
    type Item = Result<R>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.errored {
            return None;
        }
        loop {
            {
                let state = self.shared.state.read();
                if self.pos < state.rows.len() {
                    let row = state.rows[self.pos].clone();
                    self.pos += 1;
                    return Some(Ok(row));
                }
                if let Some(err) = &state.failed {
                    self.errored = true;
                    return Some(Err(QueryError::Shared(Arc::clone(err))));
                }
                if state.finished {
                    return None;
                }
            }
            let mut fetch = self.shared.fetch.lock();
            {
                // Another cursor may have advanced the cache while this one
                // waited for the fetch lock.
                let state = self.shared.state.read();
                if self.pos < state.rows.len() || state.failed.is_some() || state.finished {
                    continue;
                }
            }
            let item = fetch.as_mut().and_then(Iterator::next);
            let mut state = self.shared.state.write();
            match item {
                Some(Ok(row)) => state.rows.push(row),
                Some(Err(err)) => {
                    state.failed = Some(Arc::new(err));
                    *fetch = None;
                }
                None => {
                    state.finished = true;
                    *fetch = None;
                }
            }
        }
    }
}
