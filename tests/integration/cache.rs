//! Shared re-enumeration over one fetch.

mod support;

use monql::{Expr, SharedRows};

use support::{client, client_with, names, sensors, MockSource};

#[test]
fn multiple_cursors_share_one_round_trip() {
    let (client, log) = client(sensors());
    let rows = client
        .query()
        .filter(Expr::prop("device").eq(Expr::lit("core")))
        .rows()
        .unwrap();
    let shared = SharedRows::new(rows);

    let first: Vec<_> = shared.cursor().map(Result::unwrap).collect();
    let second: Vec<_> = shared.cursor().map(Result::unwrap).collect();
    assert_eq!(names(&first), vec!["alpha", "beta"]);
    assert_eq!(first, second);
    assert_eq!(log.borrow().len(), 1);
}

#[test]
fn cache_fills_lazily_as_cursors_advance() {
    let (client, log) = client(sensors());
    let shared = SharedRows::new(client.query().rows().unwrap());
    assert!(log.borrow().is_empty());
    assert_eq!(shared.cached_len(), 0);

    let mut cursor = shared.cursor();
    cursor.next().unwrap().unwrap();
    assert_eq!(shared.cached_len(), 1);
    cursor.next().unwrap().unwrap();
    assert_eq!(shared.cached_len(), 2);
}

#[test]
fn fetch_failures_replay_to_every_cursor() {
    let mut source = MockSource::new(sensors());
    source.fail_on = Some(0);
    let (client, _log) = client_with(source);
    let shared = SharedRows::new(client.query().rows().unwrap());

    let mut first = shared.cursor();
    assert!(first.next().unwrap().is_err());
    assert!(first.next().is_none());

    let mut late = shared.cursor();
    let err = late.next().unwrap().unwrap_err();
    assert_eq!(err.code(), "Transport");
    assert_eq!(err.to_string(), "connection reset");
}
