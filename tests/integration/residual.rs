//! Client-side residual execution and the terminal materializers.

mod support;

use monql::{Expr, QueryError, SortDirection};

use support::{client, client_with, lenient_client, names, sensors, MockSource};

#[test]
fn inclusive_comparison_runs_client_side_with_correct_results() {
    let (client, log) = client(sensors());
    let rows = client
        .query()
        .filter(Expr::prop("value").ge(Expr::lit(15)))
        .to_vec()
        .unwrap();
    assert_eq!(names(&rows), vec!["beta", "gamma", "alpha beta"]);
    // nothing was pushed to the server
    assert_eq!(log.borrow().as_slice(), [""]);
}

#[test]
fn arithmetic_predicates_stay_client_side() {
    let (client, log) = client(sensors());
    let doubled = Expr::Arith {
        op: monql::expr::ArithOp::Mul,
        lhs: Box::new(Expr::prop("value")),
        rhs: Box::new(Expr::lit(2)),
    };
    let rows = client.query().filter(doubled.gt(Expr::lit(30))).to_vec().unwrap();
    assert_eq!(names(&rows), vec!["beta", "gamma"]);
    assert_eq!(log.borrow().as_slice(), [""]);
}

#[test]
fn multi_key_sort_is_fully_client_side() {
    let (client, log) = client(sensors());
    let rows = client
        .query()
        .order_by("device", SortDirection::Ascending)
        .then_by("value", SortDirection::Descending)
        .to_vec()
        .unwrap();
    assert_eq!(names(&rows), vec!["beta", "alpha", "gamma", "delta", "alpha beta"]);
    assert_eq!(log.borrow().as_slice(), [""]);
}

#[test]
fn take_before_filter_limits_the_unfiltered_sequence() {
    let (client, log) = client(sensors());
    let rows = client
        .query()
        .take(3)
        .filter(Expr::prop("device").eq(Expr::lit("edge")))
        .to_vec()
        .unwrap();
    // take(3) sees alpha/beta/gamma; only gamma survives the filter
    assert_eq!(names(&rows), vec!["gamma"]);
    assert_eq!(log.borrow().as_slice(), [""]);
}

#[test]
fn skip_after_client_filter_counts_filtered_rows() {
    let (client, log) = client(sensors());
    let rows = client
        .query()
        .filter(Expr::prop("value").ge(Expr::lit(15)))
        .skip(1)
        .to_vec()
        .unwrap();
    assert_eq!(names(&rows), vec!["gamma", "alpha beta"]);
    let log = log.borrow();
    assert!(!log[0].contains("start="));
}

#[test]
fn consecutive_filters_apply_in_written_order() {
    let (client, _log) = client(sensors());
    let rows = client
        .query()
        .filter(Expr::prop("value").ge(Expr::lit(10)))
        .filter(Expr::prop("device").ne(Expr::lit("core")))
        .to_vec()
        .unwrap();
    assert_eq!(names(&rows), vec!["gamma", "alpha beta"]);
}

#[test]
fn lenient_mode_runs_custom_operators_after_the_fetch() {
    let (client, _log) = lenient_client(sensors());
    let rows = client
        .query()
        .filter(Expr::prop("device").eq(Expr::lit("core")))
        .custom("reverse", |mut rows| {
            rows.reverse();
            rows
        })
        .to_vec()
        .unwrap();
    assert_eq!(names(&rows), vec!["beta", "alpha"]);
}

#[test]
fn predicate_type_error_surfaces_once_and_fuses() {
    let (client, _log) = client(sensors());
    let mut rows = client
        .query()
        .filter(Expr::prop("name").ge(Expr::lit(5)))
        .rows()
        .unwrap();
    let err = rows.next().unwrap().unwrap_err();
    assert!(matches!(err, QueryError::TypeMismatch { .. }));
    assert!(rows.next().is_none());
}

#[test]
fn missing_property_reads_as_null_and_filters_out() {
    let (client, log) = client(sensors());
    // "uptime" is unmapped but only projected, never filtered server-side
    let rows = client
        .query()
        .filter(Expr::opaque("has_uptime", |row| {
            Ok(monql::Value::Bool(row.get("uptime").is_some()))
        }))
        .to_vec()
        .unwrap();
    assert!(rows.is_empty());
    // the opaque predicate contributes no server filter
    assert_eq!(log.borrow().as_slice(), [""]);
}

#[test]
fn count_first_single_any_materializers() {
    let (client, _log) = client(sensors());
    assert_eq!(client.query().count().unwrap(), 5);

    let first = client
        .query()
        .order_by("value", SortDirection::Ascending)
        .first()
        .unwrap()
        .unwrap();
    assert_eq!(first.name, "delta");

    let single = client
        .query()
        .filter(Expr::prop("name").eq(Expr::lit("gamma")))
        .single()
        .unwrap();
    assert_eq!(single.id, 3);

    assert!(client
        .query()
        .filter(Expr::prop("device").eq(Expr::lit("lab")))
        .any()
        .unwrap());
    assert!(!client
        .query()
        .filter(Expr::prop("device").eq(Expr::lit("cloud")))
        .any()
        .unwrap());
}

#[test]
fn single_reports_zero_and_many() {
    let (client, _log) = client(sensors());
    let err = client
        .query()
        .filter(Expr::prop("device").eq(Expr::lit("cloud")))
        .single()
        .unwrap_err();
    assert!(matches!(err, QueryError::NotSingle { found: 0 }));

    let err = client
        .query()
        .filter(Expr::prop("device").eq(Expr::lit("core")))
        .single()
        .unwrap_err();
    assert!(matches!(err, QueryError::NotSingle { found: 2 }));
}

#[test]
fn single_propagates_a_mid_stream_error_instead_of_counting_it() {
    let mut source = MockSource::new(sensors());
    source.fail_on = Some(1);
    let (client, log) = client_with(source);
    // request 1 yields exactly one row, request 2 fails in transport
    let err = client
        .query()
        .filter(
            Expr::prop("name")
                .eq(Expr::lit("alpha"))
                .or(Expr::prop("name").eq(Expr::lit("zeta"))),
        )
        .single()
        .unwrap_err();
    assert_eq!(log.borrow().len(), 2);
    assert!(matches!(err, QueryError::Transport(_)));
    assert_eq!(err.to_string(), "connection reset");
}

#[test]
fn empty_query_returns_everything_once() {
    let (client, log) = client(sensors());
    let rows = client.query().to_vec().unwrap();
    assert_eq!(rows.len(), 5);
    assert_eq!(log.borrow().as_slice(), [""]);
}
