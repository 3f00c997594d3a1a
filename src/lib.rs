#![forbid(unsafe_code)]

//! Client-side query translation for remote tabular monitoring APIs.
//!
//! Callers describe a query with the fluent [`TableQuery`] builder; the
//! engine decides which parts can be pushed to the remote server as
//! filter/sort/paging parameters and which parts must run locally after the
//! fetch, then streams and deduplicates the results of one or more physical
//! requests as a single logical sequence.
//!
//! The transport layer, the column catalogue, and the concrete row types are
//! external collaborators reached through the [`TableSource`], [`ColumnMap`],
//! and [`TableRow`] seams.

pub mod error;
pub mod expr;
pub mod query;
pub mod source;
pub mod types;
pub mod value;

pub use error::{QueryError, Result};
pub use expr::Expr;
pub use query::cache::SharedRows;
pub use query::ops::{Selector, SortDirection};
pub use query::provider::{EngineOptions, LocalRows, QueryExplain, TableClient, TableQuery};
pub use query::request::TableRequest;
pub use query::stream::RowIdentity;
pub use query::validate::Strictness;
pub use source::{CancelToken, RowStream, TableSource};
pub use types::{ColumnMap, ObjectId, RowAccess, StaticColumnMap, TableRow};
pub use value::{Value, ValueKey};
