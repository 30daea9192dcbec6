// tests/composite/segment_test.rs
use mantis_composite::model::{
    AggregateUngrouping, AtomicField, AtomicType, Expr, ExpressionType, FieldDef, FieldUsage,
    IndexSegment, PipeSegment, QueryField, QuerySegment, SourceDef, TurtleField,
};
use mantis_composite::semantic::composite::{expand_segment, resolve_composite_sources};
use mantis_composite::semantic::CompositeError;

fn paths(usage: &[FieldUsage]) -> Vec<String> {
    usage.iter().map(FieldUsage::dotted_path).collect()
}

fn query_stage(segment: PipeSegment) -> QuerySegment {
    match segment {
        PipeSegment::Query(q) => q,
        other => panic!("expected a query stage, got {other:?}"),
    }
}

fn orders() -> SourceDef {
    SourceDef::table("orders", "warehouse.orders").with_fields([
        FieldDef::column("status", AtomicType::String),
        FieldDef::column("amount", AtomicType::Number),
        FieldDef::measure("total", Expr::aggregate("sum", Expr::field("amount"))),
    ])
}

/// `sales` joined to a composite `stores` that resolves per query.
fn sales() -> SourceDef {
    let stores = SourceDef::composite(
        "stores",
        vec![
            SourceDef::table("store_names", "warehouse.store_names").with_fields([
                FieldDef::column("id", AtomicType::Number),
                FieldDef::column("name", AtomicType::String),
            ]),
            SourceDef::table("store_sizes", "warehouse.store_sizes").with_fields([
                FieldDef::column("id", AtomicType::Number),
                FieldDef::column("size", AtomicType::Number),
            ]),
        ],
    )
    .with_fields([
        FieldDef::composite_field("id", AtomicType::Number),
        FieldDef::composite_field("name", AtomicType::String),
        FieldDef::composite_field("size", AtomicType::Number),
    ]);
    SourceDef::table("sales", "warehouse.sales")
        .with_fields([
            FieldDef::column("store_id", AtomicType::Number),
            FieldDef::column("amount", AtomicType::Number),
        ])
        .with_field(FieldDef::join_one(
            "store",
            stores,
            Some(Expr::field("store.id").eq(Expr::field("store_id"))),
        ))
}

#[test]
fn test_expand_against_resolved_source() {
    let q = QuerySegment::reduce()
        .field_ref("store.size")
        .field_ref("amount")
        .into_segment();
    let resolved = resolve_composite_sources(&sales(), &q).unwrap().unwrap();
    let out = query_stage(expand_segment(&q, &resolved).unwrap());

    let joins: Vec<String> = out
        .active_joins
        .unwrap()
        .iter()
        .map(|j| j.dotted_path())
        .collect();
    assert_eq!(joins, vec!["store"]);

    let usage = paths(&out.expanded_field_usage.unwrap());
    assert_eq!(usage[0], "store.size");
    for path in ["amount", "store.id", "store_id"] {
        assert!(usage.iter().any(|u| u == path), "missing {path}");
    }
}

#[test]
fn test_source_extension_is_in_scope() {
    let q = QuerySegment::reduce()
        .extend(FieldDef::dimension(
            "amount_copy",
            AtomicType::Number,
            Expr::field("amount"),
        ))
        .field_ref("amount_copy")
        .into_segment();
    let out = query_stage(expand_segment(&q, &orders()).unwrap());
    assert_eq!(
        paths(&out.expanded_field_usage.unwrap()),
        vec!["amount_copy", "amount"]
    );
}

#[test]
fn test_multi_stage_view_uses_stage_output() {
    let by_status_out = SourceDef::table("by_status", "by_status").with_fields([
        FieldDef::column("status", AtomicType::String),
        FieldDef::column("total", AtomicType::Number),
    ]);
    let mut first = QuerySegment::reduce().field_ref("status").field_ref("total");
    first.output_struct = Some(Box::new(by_status_out));
    let second = QuerySegment::project().field_ref("total");

    let mut outer = QuerySegment::reduce();
    outer.field_usage.extend(first.field_usage.iter().cloned());
    outer.query_fields.push(QueryField::Turtle(TurtleField {
        name: "by_status".into(),
        as_name: None,
        access: Default::default(),
        pipeline: vec![first.into_segment(), second.into_segment()],
    }));

    let out = query_stage(expand_segment(&outer.into_segment(), &orders()).unwrap());
    let QueryField::Turtle(turtle) = &out.query_fields[0] else {
        panic!("expected a nested view");
    };
    let stage_usage = |i: usize| {
        turtle.pipeline[i]
            .as_query()
            .and_then(|q| q.expanded_field_usage.as_deref())
            .map(paths)
    };
    assert_eq!(stage_usage(0), Some(vec!["status".into(), "total".into(), "amount".into()]));
    // `total` is a plain column of the first stage's output
    assert_eq!(stage_usage(1), Some(vec!["total".into()]));
}

#[test]
fn test_later_stage_ungroupings_reach_outer_stage() {
    let mut first = QuerySegment::reduce().field_ref("status").field_ref("total");
    first.output_struct = Some(Box::new(SourceDef::table("by_status", "by_status").with_fields([
        FieldDef::column("status", AtomicType::String),
        FieldDef::column("total", AtomicType::Number),
    ])));
    let mut all_total = AtomicField::computed(
        "all_total",
        AtomicType::Number,
        Expr::aggregate("sum", Expr::field("total")),
        ExpressionType::Aggregate,
    );
    all_total.ungroupings.push(AggregateUngrouping::all());
    let second = QuerySegment::reduce().field_ref("status").with_field(all_total);

    let mut outer = QuerySegment::reduce();
    outer.field_usage.extend(first.field_usage.iter().cloned());
    outer.query_fields.push(QueryField::Turtle(TurtleField {
        name: "by_status".into(),
        as_name: None,
        access: Default::default(),
        pipeline: vec![first.into_segment(), second.into_segment()],
    }));

    let out = query_stage(expand_segment(&outer.into_segment(), &orders()).unwrap());
    let ungroupings = out.expanded_ungroupings.unwrap();
    assert_eq!(ungroupings.len(), 1);
    assert_eq!(ungroupings[0].path, vec!["by_status".to_string()]);
}

#[test]
fn test_stage_without_output_shape_stops_expansion() {
    let first = QuerySegment::reduce().field_ref("status");
    let second = QuerySegment::project().field_ref("whatever");
    let mut outer = QuerySegment::reduce();
    outer.query_fields.push(QueryField::Turtle(TurtleField {
        name: "v".into(),
        as_name: None,
        access: Default::default(),
        pipeline: vec![first.into_segment(), second.into_segment()],
    }));

    let out = query_stage(expand_segment(&outer.into_segment(), &orders()).unwrap());
    let QueryField::Turtle(turtle) = &out.query_fields[0] else {
        panic!("expected a nested view");
    };
    assert!(turtle.pipeline[0].as_query().unwrap().expanded_field_usage.is_some());
    assert!(turtle.pipeline[1].as_query().unwrap().expanded_field_usage.is_none());
}

#[test]
fn test_index_stage_through_join() {
    let q = QuerySegment::reduce().field_ref("store.name").into_segment();
    let resolved = resolve_composite_sources(&sales(), &q).unwrap().unwrap();
    let idx = PipeSegment::Index(IndexSegment::new(&["store.name", "amount"]));

    let PipeSegment::Index(out) = expand_segment(&idx, &resolved).unwrap() else {
        panic!("expected an index stage");
    };
    assert_eq!(out.active_joins.map(|j| j.len()), Some(1));
}

#[test]
fn test_unknown_field_after_resolution_is_an_error() {
    let q = QuerySegment::reduce().field_ref("store.size").into_segment();
    let resolved = resolve_composite_sources(&sales(), &q).unwrap().unwrap();

    // `store.name` lives in the other input
    let later = QuerySegment::reduce().field_ref("store.name").into_segment();
    let err = expand_segment(&later, &resolved).unwrap_err();
    assert!(matches!(
        err,
        CompositeError::CouldNotFindField { ref field, .. } if field.dotted_path() == "store.name"
    ));
}
