//! Sequential merge of the per-descriptor row streams.
//!
//! Descriptors execute strictly one after another, each fetch deferred until
//! the previous stream is exhausted. When a query fans out into several
//! requests the same remote object can come back more than once; the first
//! occurrence wins and later ones are dropped.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use tracing::trace;

use crate::error::Result;
use crate::source::{CancelToken, RowStream};
use crate::types::RowAccess;
use crate::value::ValueKey;

use super::request::TableRequest;

type KeyFn<R> = dyn Fn(&R) -> Vec<ValueKey> + Send + Sync;

/// How rows are recognized as duplicates across requests.
pub enum RowIdentity<R> {
    /// By the remote object identifier. The default.
    ById,
    /// By a caller-supplied key extractor over the full row.
    ByKey(Arc<KeyFn<R>>),
}

impl<R> Clone for RowIdentity<R> {
    fn clone(&self) -> Self {
        match self {
            RowIdentity::ById => RowIdentity::ById,
            RowIdentity::ByKey(f) => RowIdentity::ByKey(Arc::clone(f)),
        }
    }
}

impl<R> Default for RowIdentity<R> {
    fn default() -> Self {
        RowIdentity::ById
    }
}

impl<R> std::fmt::Debug for RowIdentity<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowIdentity::ById => f.write_str("ById"),
            RowIdentity::ByKey(_) => f.write_str("ByKey(..)"),
        }
    }
}

#[derive(Hash, PartialEq, Eq)]
enum RowKey {
    Id(i64),
    Key(Vec<ValueKey>),
}

impl<R: RowAccess> RowIdentity<R> {
    fn key(&self, row: &R) -> RowKey {
        match self {
            RowIdentity::ById => RowKey::Id(row.id().0),
            RowIdentity::ByKey(f) => RowKey::Key(f(row)),
        }
    }
}

/// Lazy, fused iterator over the concatenated per-descriptor streams.
///
/// Nothing is fetched until the first `next()`. A transport or row error
/// ends the enumeration: the error is yielded once and the iterator fuses.
/// Cancellation is checked between descriptors, never mid-stream.
pub struct MergedRows<R, F> {
    requests: std::vec::IntoIter<TableRequest>,
    fetch: F,
    current: Option<RowStream<R>>,
    seen: Option<FxHashSet<RowKey>>,
    identity: RowIdentity<R>,
    cancel: Option<CancelToken>,
    started: bool,
    done: bool,
}

impl<R, F> MergedRows<R, F>
where
    R: RowAccess,
    F: FnMut(&TableRequest) -> Result<RowStream<R>>,
{
    /// Builds the merged stream. Deduplication state is only allocated when
    /// more than one descriptor is present.
    pub fn new(
        requests: Vec<TableRequest>,
        identity: RowIdentity<R>,
        cancel: Option<CancelToken>,
        fetch: F,
    ) -> Self {
        let seen = (requests.len() > 1).then(FxHashSet::default);
        Self {
            requests: requests.into_iter(),
            fetch,
            current: None,
            seen,
            identity,
            cancel,
            started: false,
            done: false,
        }
    }

    fn advance(&mut self) -> Option<Result<RowStream<R>>> {
        let request = self.requests.next()?;
        if self.started {
            if let Some(token) = &self.cancel {
                if token.is_cancelled() {
                    return Some(Err(crate::error::QueryError::Cancelled));
                }
            }
        }
        self.started = true;
        trace!(request = %request, "executing descriptor");
        Some((self.fetch)(&request))
    }
}

impl<R, F> Iterator for MergedRows<R, F>
where
    R: RowAccess,
    F: FnMut(&TableRequest) -> Result<RowStream<R>>,
{
    type Item = Result<R>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            if self.current.is_none() {
                match self.advance() {
                    Some(Ok(stream)) => self.current = Some(stream),
                    Some(Err(err)) => {
                        self.done = true;
                        return Some(Err(err));
                    }
                    None => {
                        self.done = true;
                        return None;
                    }
                }
            }
            let item = self.current.as_mut().and_then(Iterator::next);
            match item {
                Some(Ok(row)) => {
                    if let Some(seen) = &mut self.seen {
                        if !seen.insert(self.identity.key(&row)) {
                            continue;
                        }
                    }
                    return Some(Ok(row));
                }
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err));
                }
                None => self.current = None,
            }
        }
    }
}
