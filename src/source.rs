//! Transport seam: the engine drives fetches, the transport owns the wire.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::query::request::TableRequest;
use crate::types::TableRow;

/// Lazy, fallible row sequence produced by one physical request.
pub type RowStream<R> = Box<dyn Iterator<Item = Result<R>>>;

/// Executes one request descriptor against the remote table API.
///
/// Implemented by the (external) transport layer. Fetch errors are passed
/// through the engine unmodified; the engine never retries.
pub trait TableSource {
    /// Row type materialized by this source.
    type Row: TableRow;

    /// Starts one physical request and returns its lazy row stream.
    fn fetch(&self, request: &TableRequest) -> Result<RowStream<Self::Row>>;
}

/// Cooperative cancellation flag honored between descriptors, never
/// mid-descriptor: partial cancellation of a single remote fetch is not
/// guaranteed by the remote protocol.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
