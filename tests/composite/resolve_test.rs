// tests/composite/resolve_test.rs
use mantis_composite::config::ResolverSettings;
use mantis_composite::model::{
    Annotation, AtomicType, Expr, FieldDef, FieldUsage, FilterCondition, JoinTarget, QuerySegment,
    Relation, SourceDef, SourceKind,
};
use mantis_composite::semantic::composite::{
    has_composites_anywhere, resolve_composite_sources, Resolver,
};
use mantis_composite::semantic::{CompositeError, CompositeIssue};

fn table(name: &str, columns: &[&str]) -> SourceDef {
    SourceDef::table(name, format!("warehouse.{name}")).with_fields(
        columns
            .iter()
            .map(|c| FieldDef::column(*c, AtomicType::Number)),
    )
}

/// A composite over `inputs` exposing `fields` as placeholders.
fn compose(name: &str, inputs: Vec<SourceDef>, fields: &[&str]) -> SourceDef {
    SourceDef::composite(name, inputs).with_fields(
        fields
            .iter()
            .map(|f| FieldDef::composite_field(*f, AtomicType::Number)),
    )
}

fn query(fields: &[&str]) -> mantis_composite::model::PipeSegment {
    fields
        .iter()
        .fold(QuerySegment::reduce(), |q, f| q.field_ref(f))
        .into_segment()
}

fn resolved_name(source: &SourceDef, fields: &[&str]) -> Option<String> {
    resolve_composite_sources(source, &query(fields))
        .unwrap()
        .map(|s| s.name)
}

#[test]
fn test_picks_input_defining_every_field() {
    let sales = compose(
        "sales",
        vec![
            table("daily", &["day", "amount"]),
            table("by_store", &["day", "amount", "store"]),
        ],
        &["day", "amount", "store"],
    );

    assert_eq!(resolved_name(&sales, &["store", "amount"]), Some("by_store".into()));
    assert_eq!(resolved_name(&sales, &["day", "amount"]), Some("daily".into()));
}

#[test]
fn test_declaration_order_breaks_ties() {
    let c = compose("c", vec![table("a", &["x"]), table("b", &["x"])], &["x"]);
    assert_eq!(resolved_name(&c, &["x"]), Some("a".into()));
}

#[test]
fn test_resolved_source_is_concrete() {
    let c = compose("c", vec![table("a", &["x"]), table("b", &["x", "y"])], &["x", "y"]);
    let resolved = resolve_composite_sources(&c, &query(&["y"]))
        .unwrap()
        .unwrap();

    assert_eq!(
        resolved.kind,
        SourceKind::Plain(Relation::Table {
            table_path: "warehouse.b".into()
        })
    );
    assert!(resolved.fields.iter().all(|f| !f.is_composite_field()));
    assert!(!has_composites_anywhere(&resolved));
}

#[test]
fn test_every_candidate_failing_reports_each() {
    let c = compose(
        "c",
        vec![table("a", &["x"]), table("b", &["y"]), table("d", &["w"])],
        &["x", "y", "w", "z"],
    );
    let err = resolve_composite_sources(&c, &query(&["z"])).unwrap_err();

    let CompositeError::NoSuitableCompositeSourceInput {
        failures,
        usage,
        path,
    } = err
    else {
        panic!("expected no suitable input");
    };
    assert!(path.is_empty());
    assert_eq!(usage, vec![FieldUsage::dotted("z")]);
    let names: Vec<&str> = failures.iter().map(|f| f.source.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "d"]);
    for failure in &failures {
        assert!(matches!(
            failure.issues.as_slice(),
            [CompositeIssue::MissingField { field }] if field.dotted_path() == "z"
        ));
    }
}

#[test]
fn test_source_filter_must_be_satisfied_by_input() {
    let c = compose("c", vec![table("a", &["x"]), table("b", &["x", "live"])], &["x", "live"])
        .with_filter(FilterCondition::new(Expr::field("live").eq(Expr::int(1))));
    let resolved = resolve_composite_sources(&c, &query(&["x"])).unwrap().unwrap();

    assert_eq!(resolved.name, "b");
    assert_eq!(resolved.filter_list.len(), 1);
}

#[test]
fn test_input_filter_is_kept_and_checked() {
    let archived = table("archived", &["x"])
        .with_filter(FilterCondition::new(Expr::field("year").lt(Expr::int(2020))));
    let current = table("current", &["x", "year"]);
    let c = compose("c", vec![archived, current], &["x", "year"]);

    // `archived` filters on a column it does not have
    assert_eq!(resolved_name(&c, &["x"]), Some("current".into()));
}

#[test]
fn test_non_composite_fields_survive() {
    let c = compose("c", vec![table("a", &["x"])], &["x"]).with_field(FieldDef::dimension(
        "x_plus_one",
        AtomicType::Number,
        Expr::field("x"),
    ));
    let resolved = resolve_composite_sources(&c, &query(&["x_plus_one"]))
        .unwrap()
        .unwrap();
    let names: Vec<&str> = resolved.fields.iter().map(FieldDef::name).collect();
    assert_eq!(names, vec!["x_plus_one", "x"]);
}

#[test]
fn test_private_input_field_does_not_count() {
    let hidden = SourceDef::table("hidden", "warehouse.hidden")
        .with_field(FieldDef::column("x", AtomicType::Number).private());
    let c = compose("c", vec![hidden, table("open", &["x"])], &["x"]);
    assert_eq!(resolved_name(&c, &["x"]), Some("open".into()));
}

#[test]
fn test_annotations_compose() {
    let c = compose(
        "c",
        vec![table("a", &["x"]).with_annotation(Annotation::note("# input"))],
        &["x"],
    )
    .with_annotation(Annotation::note("# composite"));
    let resolved = resolve_composite_sources(&c, &query(&["x"])).unwrap().unwrap();
    assert_eq!(
        resolved.annotation.map(|a| a.notes),
        Some(vec!["# composite".to_string(), "# input".to_string()])
    );
}

#[test]
fn test_nested_composite() {
    let inner = compose("inner", vec![table("a", &["x"]), table("b", &["x", "y"])], &["x", "y"]);
    let outer = compose("outer", vec![table("c", &["z"]), inner], &["x", "y", "z"]);
    assert_eq!(resolved_name(&outer, &["y"]), Some("b".into()));
    assert_eq!(resolved_name(&outer, &["z"]), Some("c".into()));
}

#[test]
fn test_join_to_composite_is_narrowed() {
    let stores = compose(
        "stores",
        vec![table("store_names", &["id", "name"]), table("store_sizes", &["id", "size"])],
        &["id", "name", "size"],
    );
    let sales = table("sales", &["store_id", "amount"]).with_field(FieldDef::join_one(
        "store",
        stores,
        Some(Expr::field("store.id").eq(Expr::field("store_id"))),
    ));

    let resolved = resolve_composite_sources(&sales, &query(&["store.size", "amount"]))
        .unwrap()
        .unwrap();
    assert_eq!(resolved.name, "sales");
    let join = resolved.field("store").and_then(FieldDef::as_join).unwrap();
    let JoinTarget::Source(target) = &join.target else {
        panic!("expected a source join");
    };
    assert_eq!(target.name, "store_sizes");
    // join metadata is kept
    assert_eq!(join.name, "store");
    assert!(join.on_expression.is_some());
}

#[test]
fn test_plain_source_with_plain_joins_needs_nothing() {
    let sales = table("sales", &["amount"])
        .with_field(FieldDef::join_one("store", table("stores", &["name"]), None));
    assert_eq!(resolved_name(&sales, &["store.name", "amount"]), None);
}

#[test]
fn test_resolution_is_idempotent() {
    let stores = compose(
        "stores",
        vec![table("store_names", &["id", "name"]), table("store_sizes", &["id", "size"])],
        &["id", "name", "size"],
    );
    let sales = table("sales", &["amount"]).with_field(FieldDef::join_one("store", stores, None));
    let q = query(&["store.name"]);

    let once = resolve_composite_sources(&sales, &q).unwrap().unwrap();
    assert_eq!(resolve_composite_sources(&once, &q), Ok(None));
}

#[test]
fn test_resolution_is_deterministic() {
    let c = compose(
        "c",
        vec![table("a", &["x"]), table("b", &["y"]), table("d", &["x", "y"])],
        &["x", "y"],
    );
    let q = query(&["x", "y"]);
    let first = resolve_composite_sources(&c, &q);
    for _ in 0..5 {
        assert_eq!(resolve_composite_sources(&c, &q), first);
    }
    assert_eq!(first.unwrap().map(|s| s.name), Some("d".into()));
}

#[test]
fn test_resolve_composite_source_with_usage() {
    let c = compose("c", vec![table("a", &["x"]), table("b", &["y"])], &["x", "y"]);
    let resolver = Resolver::new(&ResolverSettings::default());
    let resolved = resolver
        .resolve_composite_source(&c, &[FieldUsage::dotted("y")])
        .unwrap();
    assert_eq!(resolved.name, "b");

    let err = resolver
        .resolve_composite_source(&table("t", &["x"]), &[])
        .unwrap_err();
    assert!(matches!(err, CompositeError::NotACompositeSource { .. }));
}

#[test]
fn test_depth_limit_from_settings() {
    let mut nested = compose("c0", vec![table("t", &["x"])], &["x"]);
    for i in 1..4 {
        nested = compose(&format!("c{i}"), vec![nested], &["x"]);
    }
    let shallow = Resolver::new(&ResolverSettings { max_depth: 1 });
    let err = shallow
        .resolve_composite_sources(&nested, &query(&["x"]))
        .unwrap_err();
    assert_eq!(err.code(), "resolution_too_deep");
    assert!(!err.is_recoverable());
}
