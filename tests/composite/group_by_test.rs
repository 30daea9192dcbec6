// tests/composite/group_by_test.rs
use mantis_composite::model::{
    AggregateUngrouping, AtomicField, AtomicType, Expr, ExpressionType, FieldDef, FieldUsage,
    FilterCondition, FilterDataType, QuerySegment, SourceDef,
};
use mantis_composite::semantic::composite::{
    check_required_group_bys, extract_nest_levels, resolve_composite_sources,
};
use mantis_composite::semantic::{CompositeError, CompositeIssue};

/// Regional totals only make sense per region.
fn regional() -> SourceDef {
    SourceDef::table("regional", "warehouse.regional").with_fields([
        FieldDef::column("region", AtomicType::String),
        FieldDef::column("day", AtomicType::Date),
        FieldDef::column("amount", AtomicType::Number),
        FieldDef::measure("regional_total", Expr::aggregate("sum", Expr::field("amount")))
            .requires_group_by(&["region"]),
    ])
}

/// Same measure, no obligation.
fn national() -> SourceDef {
    SourceDef::table("national", "warehouse.national").with_fields([
        FieldDef::column("day", AtomicType::Date),
        FieldDef::column("amount", AtomicType::Number),
        FieldDef::measure("regional_total", Expr::aggregate("sum", Expr::field("amount"))),
    ])
}

fn sales() -> SourceDef {
    SourceDef::composite("sales", vec![regional(), national()]).with_fields([
        FieldDef::composite_field("region", AtomicType::String),
        FieldDef::composite_field("day", AtomicType::Date),
        FieldDef::composite_field("amount", AtomicType::Number),
        FieldDef::composite_field("regional_total", AtomicType::Number),
    ])
}

fn unsatisfied(source: &SourceDef, q: QuerySegment) -> Vec<String> {
    check_required_group_bys(source, &q.into_segment())
        .iter()
        .map(|r| r.path.join("."))
        .collect()
}

#[test]
fn test_group_by_satisfies_requirement() {
    let q = QuerySegment::reduce()
        .field_ref("region")
        .field_ref("regional_total")
        .into_segment();
    let resolved = resolve_composite_sources(&sales(), &q).unwrap().unwrap();
    assert_eq!(resolved.name, "regional");
}

#[test]
fn test_unsatisfied_requirement_moves_to_next_input() {
    let q = QuerySegment::reduce()
        .field_ref("day")
        .field_ref("regional_total")
        .into_segment();
    let resolved = resolve_composite_sources(&sales(), &q).unwrap().unwrap();
    assert_eq!(resolved.name, "national");
}

#[test]
fn test_single_value_filter_satisfies_requirement() {
    let q = QuerySegment::reduce()
        .field_ref("day")
        .field_ref("regional_total")
        .with_filter(FilterCondition::new(
            Expr::field("region").filter_match(FilterDataType::String, "West"),
        ))
        .into_segment();
    let resolved = resolve_composite_sources(&sales(), &q).unwrap().unwrap();
    assert_eq!(resolved.name, "regional");
}

#[test]
fn test_multi_value_filter_does_not_satisfy() {
    let q = QuerySegment::reduce()
        .field_ref("day")
        .field_ref("regional_total")
        .with_filter(FilterCondition::new(
            Expr::field("region").filter_match(FilterDataType::String, "West, East"),
        ));
    assert_eq!(unsatisfied(&regional(), q), vec!["region"]);
}

#[test]
fn test_requirement_failure_is_reported_per_input() {
    let only_regional = SourceDef::composite("sales", vec![regional()]).with_fields([
        FieldDef::composite_field("day", AtomicType::Date),
        FieldDef::composite_field("regional_total", AtomicType::Number),
    ]);
    let q = QuerySegment::reduce()
        .field_ref("day")
        .field_ref("regional_total")
        .into_segment();
    let err = resolve_composite_sources(&only_regional, &q).unwrap_err();
    let CompositeError::NoSuitableCompositeSourceInput { failures, .. } = err else {
        panic!("expected no suitable input");
    };
    assert_eq!(failures.len(), 1);
    let [CompositeIssue::MissingRequiredGroupBy { required_group_by }] =
        failures[0].issues.as_slice()
    else {
        panic!("expected a missing group by");
    };
    assert_eq!(required_group_by.path, vec!["region".to_string()]);
    assert_eq!(
        required_group_by.field_usage.as_ref().map(|u| u.dotted_path()),
        Some("regional_total".to_string())
    );
}

#[test]
fn test_exclude_makes_requirement_unsatisfiable() {
    let mut share = AtomicField::computed(
        "share_of_day",
        AtomicType::Number,
        Expr::aggregate("sum", Expr::field("amount")),
        ExpressionType::Aggregate,
    );
    share.ungroupings.push(
        AggregateUngrouping::exclude(&["region"])
            .with_field_usage(vec![FieldUsage::dotted("regional_total")]),
    );
    let q = QuerySegment::reduce()
        .field_ref("region")
        .field_ref("day")
        .with_field(share);

    // grouping by region does not help once exclude(region) removes it
    assert_eq!(unsatisfied(&regional(), q), vec!["region"]);
}

#[test]
fn test_all_inside_nest_is_unsatisfiable() {
    let mut total = AtomicField::computed(
        "overall",
        AtomicType::Number,
        Expr::aggregate("sum", Expr::field("amount")),
        ExpressionType::Aggregate,
    );
    total
        .ungroupings
        .push(AggregateUngrouping::all().with_field_usage(vec![FieldUsage::dotted("regional_total")]));
    let nested = QuerySegment::reduce().field_ref("day").with_field(total);
    let q = QuerySegment::reduce().field_ref("region").nest("by_day", nested);

    assert_eq!(unsatisfied(&regional(), q), vec!["region"]);
}

#[test]
fn test_nested_requirement_met_by_outer_group_by() {
    let nested = QuerySegment::reduce().field_ref("day").field_ref("regional_total");
    let q = QuerySegment::reduce().field_ref("region").nest("by_day", nested);
    assert!(unsatisfied(&regional(), q).is_empty());
}

#[test]
fn test_nest_levels_follow_query_shape() {
    let nested = QuerySegment::reduce().field_ref("day");
    let q = QuerySegment::reduce()
        .field_ref("region")
        .nest("by_day", nested)
        .with_filter(FilterCondition::new(Expr::field("region").eq(Expr::string("West"))))
        .into_segment();
    let levels = extract_nest_levels(&q);

    assert_eq!(levels.fields_referenced_directly.len(), 1);
    assert_eq!(levels.nested.len(), 1);
    assert_eq!(levels.nested[0].fields_referenced_directly.len(), 1);
    assert_eq!(levels.single_value_filters, vec![vec!["region".to_string()]]);
}
