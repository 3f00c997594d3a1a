//! Request descriptors and their wire rendering.
//!
//! The transport layer owns the actual HTTP exchange; the engine owns the
//! query-string shape produced here.

use std::fmt;

use serde::Serialize;
use smallvec::SmallVec;
use xxhash_rust::xxh64::xxh64;

use crate::query::ops::SortDirection;
use crate::value::Value;

/// Server-translatable filter operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum FilterOperator {
    /// `filter_<column>=<value>`
    Equals,
    /// `filter_<column>=@sub(<value>)`
    Contains,
    /// `filter_<column>=@above(<value>)`
    GreaterThan,
    /// `filter_<column>=@below(<value>)`
    LessThan,
}

/// One atomic server-side filter.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Filter {
    /// Logical property the caller filtered on.
    pub property: String,
    /// Resolved remote column name.
    pub column: String,
    /// Operator.
    pub op: FilterOperator,
    /// Comparand.
    pub value: Value,
}

impl Filter {
    fn render(&self) -> String {
        let value = encode_component(&self.value.to_wire_string());
        match self.op {
            FilterOperator::Equals => format!("filter_{}={}", self.column, value),
            FilterOperator::Contains => format!("filter_{}=@sub({})", self.column, value),
            FilterOperator::GreaterThan => format!("filter_{}=@above({})", self.column, value),
            FilterOperator::LessThan => format!("filter_{}=@below({})", self.column, value),
        }
    }
}

/// AND-combination of filters forming one physical request. Multiple sets on
/// one logical query are OR'd across requests.
#[derive(Clone, Debug, PartialEq, Default, Serialize)]
pub struct FilterSet {
    /// Conjoined filters.
    pub filters: SmallVec<[Filter; 4]>,
}

impl FilterSet {
    /// Whether the set constrains anything.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Appends one filter.
    pub fn push(&mut self, filter: Filter) {
        self.filters.push(filter);
    }
}

/// Server-side sort directive.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SortDirective {
    /// Remote column to sort by.
    pub column: String,
    /// Direction; descending renders a `-` prefix.
    pub direction: SortDirection,
}

/// Full parameter set for one physical remote fetch.
#[derive(Clone, Debug, PartialEq, Default, Serialize)]
pub struct TableRequest {
    /// AND-combined filters.
    pub filters: FilterSet,
    /// Columns to request; `None` fetches all columns.
    pub columns: Option<Vec<String>>,
    /// Server-side sort, if pushed down.
    pub sort: Option<SortDirective>,
    /// Row offset, if pushed down.
    pub start: Option<usize>,
    /// Row limit, if pushed down.
    pub count: Option<usize>,
}

impl TableRequest {
    /// Renders the query-string parameters this descriptor contributes.
    pub fn query_string(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        for filter in &self.filters.filters {
            parts.push(filter.render());
        }
        if let Some(sort) = &self.sort {
            match sort.direction {
                SortDirection::Ascending => parts.push(format!("sortby={}", sort.column)),
                SortDirection::Descending => parts.push(format!("sortby=-{}", sort.column)),
            }
        }
        if let Some(start) = self.start {
            parts.push(format!("start={start}"));
        }
        if let Some(count) = self.count {
            parts.push(format!("count={count}"));
        }
        if let Some(columns) = &self.columns {
            parts.push(format!("columns={}", columns.join(",")));
        }
        parts.join("&")
    }

    /// Deterministic fingerprint of the rendered descriptor.
    pub fn fingerprint(&self) -> u64 {
        xxh64(self.query_string().as_bytes(), 0)
    }
}

impl fmt::Display for TableRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.query_string())
    }
}

/// Form-style component encoding: space becomes `+`, unreserved ASCII is
/// kept, everything else is percent-encoded.
fn encode_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b' ' => out.push('+'),
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            other => {
                out.push('%');
                out.push(char::from_digit(u32::from(other >> 4), 16).unwrap_or('0').to_ascii_uppercase());
                out.push(char::from_digit(u32::from(other & 0xf), 16).unwrap_or('0').to_ascii_uppercase());
            }
        }
    }
    out
}
