//! Row and column seams connecting the engine to external collaborators.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Remote object identity used for cross-request deduplication.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct ObjectId(pub i64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Object-safe view of one table row. The engine reads rows exclusively
/// through this trait; the concrete object model lives elsewhere.
pub trait RowAccess {
    /// Remote identity of the row.
    fn id(&self) -> ObjectId;
    /// Value of a logical property, if the row carries it.
    fn get(&self, property: &str) -> Option<Value>;
}

/// A row type the engine can materialize and hand back to callers.
pub trait TableRow: RowAccess + Clone + 'static {}

impl<T: RowAccess + Clone + 'static> TableRow for T {}

/// Lookup from logical property names to remote column names.
///
/// Supplied by the (external) static mapping layer. An unknown filtered or
/// sorted property is a fatal configuration error surfaced by the parameter
/// builder.
pub trait ColumnMap: Send + Sync {
    /// Remote column name for a logical property, if one exists.
    fn column(&self, property: &str) -> Option<&str>;

    /// Column holding the row identity. Always requested when a query fans
    /// out into more than one physical request.
    fn id_column(&self) -> &str {
        "objid"
    }
}

/// In-memory [`ColumnMap`] built from `(property, column)` pairs.
#[derive(Clone, Debug, Default)]
pub struct StaticColumnMap {
    columns: HashMap<String, String>,
    id_column: String,
}

impl StaticColumnMap {
    /// Builds a map from property/column pairs with the default id column.
    pub fn new<I, P, C>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        Self {
            columns: pairs
                .into_iter()
                .map(|(p, c)| (p.into(), c.into()))
                .collect(),
            id_column: "objid".to_owned(),
        }
    }

    /// Overrides the identity column name.
    pub fn with_id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = column.into();
        self
    }
}

impl ColumnMap for StaticColumnMap {
    fn column(&self, property: &str) -> Option<&str> {
        self.columns.get(property).map(String::as_str)
    }

    fn id_column(&self) -> &str {
        &self.id_column
    }
}
