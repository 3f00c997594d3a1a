#![allow(dead_code)]

//! Shared fixture: an in-memory table source that honors the request
//! descriptor the same way the remote API would, plus a request log.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;
use std::sync::Arc;

use monql::query::request::{Filter, FilterOperator, TableRequest};
use monql::{
    CancelToken, ObjectId, QueryError, Result, RowAccess, RowStream, SortDirection,
    StaticColumnMap, TableClient, TableSource, Value,
};

#[derive(Clone, Debug, PartialEq)]
pub struct Sensor {
    pub id: i64,
    pub name: String,
    pub device: String,
    pub value: i64,
}

impl Sensor {
    pub fn new(id: i64, name: &str, device: &str, value: i64) -> Self {
        Self {
            id,
            name: name.to_owned(),
            device: device.to_owned(),
            value,
        }
    }
}

impl RowAccess for Sensor {
    fn id(&self) -> ObjectId {
        ObjectId(self.id)
    }

    fn get(&self, property: &str) -> Option<Value> {
        match property {
            "name" => Some(Value::String(self.name.clone())),
            "device" => Some(Value::String(self.device.clone())),
            "value" => Some(Value::Int(self.value)),
            _ => None,
        }
    }
}

pub fn sensors() -> Vec<Sensor> {
    vec![
        Sensor::new(1, "alpha", "core", 10),
        Sensor::new(2, "beta", "core", 20),
        Sensor::new(3, "gamma", "edge", 30),
        Sensor::new(4, "delta", "edge", 5),
        Sensor::new(5, "alpha beta", "lab", 15),
    ]
}

pub fn columns() -> StaticColumnMap {
    StaticColumnMap::new([("name", "name"), ("device", "device"), ("value", "lastvalue")])
}

pub type RequestLog = Rc<RefCell<Vec<String>>>;

/// Table source that evaluates descriptors against in-memory rows with the
/// remote API's semantics: filters, then sort, then start/count.
pub struct MockSource {
    rows: Vec<Sensor>,
    log: RequestLog,
    /// Zero-based request index that fails with a transport error.
    pub fail_on: Option<usize>,
    /// Token cancelled as a side effect of serving any request.
    pub cancel_on_fetch: Option<CancelToken>,
}

impl MockSource {
    pub fn new(rows: Vec<Sensor>) -> Self {
        Self {
            rows,
            log: Rc::new(RefCell::new(Vec::new())),
            fail_on: None,
            cancel_on_fetch: None,
        }
    }

    pub fn log(&self) -> RequestLog {
        Rc::clone(&self.log)
    }
}

fn column_property(column: &str) -> &str {
    match column {
        "lastvalue" => "value",
        other => other,
    }
}

fn filter_matches(filter: &Filter, row: &Sensor) -> bool {
    let Some(actual) = row.get(&filter.property) else {
        return false;
    };
    match filter.op {
        FilterOperator::Equals => actual.to_wire_string() == filter.value.to_wire_string(),
        FilterOperator::Contains => actual
            .to_wire_string()
            .to_lowercase()
            .contains(&filter.value.to_wire_string().to_lowercase()),
        FilterOperator::GreaterThan => {
            actual.partial_cmp_value(&filter.value) == Some(Ordering::Greater)
        }
        FilterOperator::LessThan => {
            actual.partial_cmp_value(&filter.value) == Some(Ordering::Less)
        }
    }
}

impl TableSource for MockSource {
    type Row = Sensor;

    fn fetch(&self, request: &TableRequest) -> Result<RowStream<Sensor>> {
        let index = {
            let mut log = self.log.borrow_mut();
            log.push(request.query_string());
            log.len() - 1
        };
        if let Some(token) = &self.cancel_on_fetch {
            token.cancel();
        }
        if self.fail_on == Some(index) {
            return Err(QueryError::transport("connection reset"));
        }

        let mut rows: Vec<Sensor> = self
            .rows
            .iter()
            .filter(|row| {
                request
                    .filters
                    .filters
                    .iter()
                    .all(|filter| filter_matches(filter, row))
            })
            .cloned()
            .collect();

        if let Some(sort) = &request.sort {
            let property = column_property(&sort.column).to_owned();
            rows.sort_by(|a, b| {
                let ord = a
                    .get(&property)
                    .unwrap_or(Value::Null)
                    .partial_cmp_value(&b.get(&property).unwrap_or(Value::Null))
                    .unwrap_or(Ordering::Equal);
                match sort.direction {
                    SortDirection::Ascending => ord,
                    SortDirection::Descending => ord.reverse(),
                }
            });
        }

        if let Some(start) = request.start {
            rows.drain(..start.min(rows.len()));
        }
        if let Some(count) = request.count {
            rows.truncate(count);
        }
        Ok(Box::new(rows.into_iter().map(Ok)))
    }
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn client(rows: Vec<Sensor>) -> (TableClient<MockSource>, RequestLog) {
    init_logging();
    let source = MockSource::new(rows);
    let log = source.log();
    (TableClient::new(source, Arc::new(columns())), log)
}

pub fn client_with(source: MockSource) -> (TableClient<MockSource>, RequestLog) {
    init_logging();
    let log = source.log();
    (TableClient::new(source, Arc::new(columns())), log)
}

pub fn lenient_client(rows: Vec<Sensor>) -> (TableClient<MockSource>, RequestLog) {
    init_logging();
    let source = MockSource::new(rows);
    let log = source.log();
    let options = monql::EngineOptions {
        strictness: monql::Strictness::Lenient,
    };
    (
        TableClient::with_options(source, Arc::new(columns()), options),
        log,
    )
}

pub fn names(rows: &[Sensor]) -> Vec<&str> {
    rows.iter().map(|r| r.name.as_str()).collect()
}
