//! Streaming behavior: laziness, error pass-through, cancellation, dedup.

mod support;

use std::sync::Arc;

use monql::{CancelToken, Expr, QueryError, RowIdentity, ValueKey};

use support::{client, client_with, names, sensors, MockSource, Sensor};

fn fan_out(client: &monql::TableClient<MockSource>) -> monql::TableQuery<'_, MockSource> {
    client.query().filter(
        Expr::prop("device")
            .eq(Expr::lit("core"))
            .or(Expr::prop("device").eq(Expr::lit("edge"))),
    )
}

#[test]
fn nothing_is_fetched_before_the_first_row_is_pulled() {
    let (client, log) = client(sensors());
    let mut rows = client.query().rows().unwrap();
    assert!(log.borrow().is_empty());
    rows.next().unwrap().unwrap();
    assert_eq!(log.borrow().len(), 1);
}

#[test]
fn second_request_waits_for_the_first_stream_to_drain() {
    let (client, log) = client(sensors());
    let mut rows = fan_out(&client).rows().unwrap();
    rows.next().unwrap().unwrap();
    assert_eq!(log.borrow().len(), 1);
    // core has two sensors; the third pull crosses into the edge request
    rows.next().unwrap().unwrap();
    assert_eq!(log.borrow().len(), 1);
    rows.next().unwrap().unwrap();
    assert_eq!(log.borrow().len(), 2);
}

#[test]
fn transport_errors_pass_through_verbatim_and_abort() {
    let mut source = MockSource::new(sensors());
    source.fail_on = Some(1);
    let (client, log) = client_with(source);
    let collected: Vec<_> = fan_out(&client).rows().unwrap().collect();
    assert_eq!(log.borrow().len(), 2);

    // both core rows arrive, then the edge request fails and the stream ends
    assert_eq!(collected.len(), 3);
    assert!(collected[0].is_ok());
    assert!(collected[1].is_ok());
    let err = collected[2].as_ref().unwrap_err();
    assert_eq!(err.to_string(), "connection reset");
}

#[test]
fn cancellation_is_checked_between_requests() {
    let token = CancelToken::new();
    let mut source = MockSource::new(sensors());
    source.cancel_on_fetch = Some(token.clone());
    let (client, log) = client_with(source);

    let collected: Vec<_> = fan_out(&client)
        .with_cancel(token)
        .rows()
        .unwrap()
        .collect();
    // the first request runs to completion; the second never starts
    assert_eq!(log.borrow().len(), 1);
    assert_eq!(collected.len(), 3);
    assert!(matches!(
        collected[2].as_ref().unwrap_err(),
        QueryError::Cancelled
    ));
}

#[test]
fn custom_identity_deduplicates_across_requests() {
    let rows = vec![
        Sensor::new(1, "alpha", "core", 10),
        Sensor::new(2, "beta", "edge", 10),
        Sensor::new(3, "gamma", "core", 20),
    ];
    let (client, _log) = client(rows);
    let identity: RowIdentity<Sensor> = RowIdentity::ByKey(Arc::new(|row: &Sensor| {
        vec![ValueKey::Int(row.value)]
    }));
    let rows = fan_out(&client).with_identity(identity).to_vec().unwrap();
    // beta shares alpha's key and is dropped; first seen wins
    assert_eq!(names(&rows), vec!["alpha", "gamma"]);
}

#[test]
fn fan_out_results_concatenate_in_request_order() {
    let (client, _log) = client(sensors());
    let rows = client
        .query()
        .filter(
            Expr::prop("device")
                .eq(Expr::lit("edge"))
                .or(Expr::prop("device").eq(Expr::lit("core"))),
        )
        .to_vec()
        .unwrap();
    assert_eq!(names(&rows), vec!["gamma", "delta", "alpha", "beta"]);
}
