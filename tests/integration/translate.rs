//! Server pushdown: what reaches the wire for each operator shape.

mod support;

use monql::{Expr, QueryError, Selector, SortDirection, Value};

use support::{client, lenient_client, names, sensors};

#[test]
fn equality_filter_is_pushed_as_filter_parameter() {
    let (client, log) = client(sensors());
    let rows = client
        .query()
        .filter(Expr::prop("name").eq(Expr::lit("alpha")))
        .to_vec()
        .unwrap();
    assert_eq!(names(&rows), vec!["alpha"]);
    assert_eq!(log.borrow().as_slice(), ["filter_name=alpha"]);
}

#[test]
fn contains_filter_renders_substring_syntax() {
    let (client, log) = client(sensors());
    let rows = client
        .query()
        .filter(Expr::prop("name").contains(Expr::lit("alpha")))
        .to_vec()
        .unwrap();
    assert_eq!(names(&rows), vec!["alpha", "alpha beta"]);
    assert_eq!(log.borrow().as_slice(), ["filter_name=@sub(alpha)"]);
}

#[test]
fn strict_comparisons_render_above_and_below() {
    let (client, log) = client(sensors());
    let rows = client
        .query()
        .filter(Expr::prop("value").gt(Expr::lit(10)).and(Expr::prop("value").lt(Expr::lit(30))))
        .to_vec()
        .unwrap();
    assert_eq!(names(&rows), vec!["beta", "alpha beta"]);
    assert_eq!(
        log.borrow().as_slice(),
        ["filter_lastvalue=@above(10)&filter_lastvalue=@below(30)"]
    );
}

#[test]
fn reversed_operands_flip_the_comparison() {
    let (client, log) = client(sensors());
    // 20 < value  ==  value > 20
    client
        .query()
        .filter(Expr::lit(20).lt(Expr::prop("value")))
        .to_vec()
        .unwrap();
    assert_eq!(log.borrow().as_slice(), ["filter_lastvalue=@above(20)"]);
}

#[test]
fn captured_values_collapse_before_translation() {
    let (client, log) = client(sensors());
    let rows = client
        .query()
        .filter(Expr::prop("name").contains(Expr::thunk(|| Ok(Value::from("gam")))))
        .to_vec()
        .unwrap();
    assert_eq!(names(&rows), vec!["gamma"]);
    assert_eq!(log.borrow().as_slice(), ["filter_name=@sub(gam)"]);
}

#[test]
fn captured_counter_name_renders_the_documented_wire_form() {
    let (client, log) = client(sensors());
    let counter = "Volume IO _Total0".to_owned();
    client
        .query()
        .filter(Expr::prop("name").contains(Expr::thunk(move || Ok(Value::from(counter.clone())))))
        .to_vec()
        .unwrap();
    assert_eq!(log.borrow().as_slice(), ["filter_name=@sub(Volume+IO+_Total0)"]);
}

#[test]
fn prebuilt_and_inline_predicates_translate_identically() {
    let prebuilt = Expr::prop("value").gt(Expr::lit(10));
    let (client_a, log_a) = client(sensors());
    client_a.query().filter(prebuilt).to_vec().unwrap();

    let (client_b, log_b) = client(sensors());
    client_b
        .query()
        .filter(Expr::prop("value").gt(Expr::lit(10)))
        .to_vec()
        .unwrap();
    assert_eq!(log_a.borrow().as_slice(), log_b.borrow().as_slice());
}

#[test]
fn or_of_equalities_fans_out_into_sequential_requests() {
    let (client, log) = client(sensors());
    let rows = client
        .query()
        .filter(
            Expr::prop("name")
                .eq(Expr::lit("beta"))
                .or(Expr::prop("name").eq(Expr::lit("delta"))),
        )
        .to_vec()
        .unwrap();
    assert_eq!(names(&rows), vec!["beta", "delta"]);
    assert_eq!(
        log.borrow().as_slice(),
        ["filter_name=beta", "filter_name=delta"]
    );
}

#[test]
fn single_mapped_sort_key_is_pushed() {
    let (client, log) = client(sensors());
    let rows = client
        .query()
        .order_by("value", SortDirection::Descending)
        .to_vec()
        .unwrap();
    assert_eq!(names(&rows), vec!["gamma", "beta", "alpha beta", "alpha", "delta"]);
    assert_eq!(log.borrow().as_slice(), ["sortby=-lastvalue"]);
}

#[test]
fn clean_paging_becomes_start_and_count() {
    let (client, log) = client(sensors());
    let rows = client.query().skip(1).take(2).to_vec().unwrap();
    assert_eq!(names(&rows), vec!["beta", "gamma"]);
    assert_eq!(log.borrow().as_slice(), ["start=1&count=2"]);
}

#[test]
fn reshaping_projection_prunes_columns() {
    let (client, log) = client(sensors());
    client
        .query()
        .select(Selector::properties(["name", "value"]))
        .to_vec()
        .unwrap();
    assert_eq!(log.borrow().as_slice(), ["columns=name,lastvalue"]);
}

#[test]
fn computed_projection_fetches_all_columns() {
    let (client, log) = client(sensors());
    client
        .query()
        .select(Selector::computed(["name"]))
        .to_vec()
        .unwrap();
    assert_eq!(log.borrow().as_slice(), [""]);
}

#[test]
fn fan_out_with_projection_requests_the_id_column() {
    let (client, log) = client(sensors());
    client
        .query()
        .filter(
            Expr::prop("name")
                .eq(Expr::lit("alpha"))
                .or(Expr::prop("name").eq(Expr::lit("beta"))),
        )
        .select(Selector::properties(["name"]))
        .to_vec()
        .unwrap();
    assert_eq!(
        log.borrow().as_slice(),
        [
            "filter_name=alpha&columns=objid,name",
            "filter_name=beta&columns=objid,name"
        ]
    );
}

#[test]
fn unmapped_filtered_property_fails_translation() {
    let (client, log) = client(sensors());
    let err = client
        .query()
        .filter(Expr::prop("uptime").gt(Expr::lit(1)))
        .to_vec()
        .unwrap_err();
    assert!(matches!(err, QueryError::UnmappedProperty { .. }));
    assert!(log.borrow().is_empty());
}

#[test]
fn strict_mode_rejects_custom_operators_before_fetching() {
    let (client, log) = client(sensors());
    let err = client
        .query()
        .custom("reverse", |mut rows| {
            rows.reverse();
            rows
        })
        .to_vec()
        .unwrap_err();
    assert!(matches!(err, QueryError::UnsupportedExpression { .. }));
    assert!(log.borrow().is_empty());
}

#[test]
fn explain_reports_requests_and_residual() {
    let (client, log) = lenient_client(sensors());
    let explain = client
        .query()
        .filter(Expr::prop("value").ge(Expr::lit(10)))
        .skip(1)
        .explain()
        .unwrap();
    assert_eq!(explain.requests.len(), 1);
    assert_eq!(explain.requests[0].query_string(), "");
    assert_eq!(explain.residual, vec!["filter", "skip"]);
    assert_eq!(explain.to_json()["residual"][0], "filter");
    assert!(log.borrow().is_empty());

    let again = client
        .query()
        .filter(Expr::prop("value").ge(Expr::lit(10)))
        .skip(1)
        .explain()
        .unwrap();
    assert_eq!(explain.fingerprint, again.fingerprint);
}
