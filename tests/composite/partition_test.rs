// tests/composite/partition_test.rs
use mantis_composite::model::{
    AtomicType, Expr, FieldDef, Partition, PartitionCompositeDesc, QuerySegment, Relation,
    SourceDef, SourceKind,
};
use mantis_composite::semantic::composite::{resolve_composite_sources, PartitionSpecError};
use mantis_composite::semantic::{CompositeError, CompositeIssue};

fn events(partitions: Vec<Partition>) -> SourceDef {
    let desc = PartitionCompositeDesc {
        partition_field: "kind".into(),
        composite_fields: vec!["clicks".into(), "views".into(), "revenue".into()],
        partitions,
    };
    SourceDef::partitioned("events", "warehouse.events", desc).with_fields([
        FieldDef::column("kind", AtomicType::String),
        FieldDef::column("day", AtomicType::Date),
        FieldDef::column("clicks", AtomicType::Number),
        FieldDef::column("views", AtomicType::Number),
        FieldDef::column("revenue", AtomicType::Number),
    ])
}

fn query(fields: &[&str]) -> mantis_composite::model::PipeSegment {
    fields
        .iter()
        .fold(QuerySegment::reduce(), |q, f| q.field_ref(f))
        .into_segment()
}

#[test]
fn test_first_covering_partition_is_selected() {
    let source = events(vec![
        Partition::new("traffic", &["clicks"]),
        Partition::new("engagement", &["clicks", "views"]),
        Partition::new("everything", &["clicks", "views", "revenue"]),
    ]);
    let resolved = resolve_composite_sources(&source, &query(&["day", "views"]))
        .unwrap()
        .unwrap();

    assert_eq!(
        resolved.kind,
        SourceKind::Plain(Relation::Table {
            table_path: "warehouse.events".into()
        })
    );
    assert_eq!(resolved.filter_list.len(), 1);
    assert_eq!(resolved.filter_list[0].code, "kind = 'engagement'");
    assert_eq!(
        resolved.filter_list[0].expr,
        Expr::field("kind").eq(Expr::string("engagement"))
    );
}

#[test]
fn test_fields_outside_partitions_do_not_constrain() {
    let source = events(vec![Partition::new("traffic", &["clicks"])]);
    let resolved = resolve_composite_sources(&source, &query(&["day"]))
        .unwrap()
        .unwrap();
    assert_eq!(resolved.filter_list[0].code, "kind = 'traffic'");
}

#[test]
fn test_no_partition_reports_every_partition() {
    let source = events(vec![
        Partition::new("traffic", &["clicks"]),
        Partition::new("money", &["revenue"]),
    ]);
    let err = resolve_composite_sources(&source, &query(&["clicks", "revenue"])).unwrap_err();

    let CompositeError::NoSuitableCompositeSourceInput {
        failures,
        usage,
        path,
    } = err
    else {
        panic!("expected no suitable input");
    };
    assert!(path.is_empty());
    assert_eq!(usage.len(), 2);
    assert_eq!(failures.len(), 2);
    let missing: Vec<Vec<String>> = failures
        .iter()
        .map(|f| {
            assert_eq!(f.source.name, "events");
            f.issues
                .iter()
                .filter_map(|i| match i {
                    CompositeIssue::MissingField { field } => Some(field.dotted_path()),
                    _ => None,
                })
                .collect()
        })
        .collect();
    assert_eq!(
        missing,
        vec![vec!["revenue".to_string()], vec!["clicks".to_string()]]
    );
}

#[test]
fn test_partition_composite_behind_join() {
    let source = events(vec![
        Partition::new("traffic", &["clicks"]),
        Partition::new("money", &["revenue"]),
    ]);
    let campaigns = SourceDef::table("campaigns", "warehouse.campaigns")
        .with_field(FieldDef::column("id", AtomicType::Number))
        .with_field(FieldDef::join_many("events", source, None));

    let resolved = resolve_composite_sources(&campaigns, &query(&["id", "events.revenue"]))
        .unwrap()
        .unwrap();
    let joined = resolved
        .field("events")
        .and_then(FieldDef::as_join)
        .and_then(|j| j.source())
        .unwrap();
    assert!(!joined.is_partition_composite());
    assert_eq!(joined.filter_list[0].code, "kind = 'money'");
}

#[test]
fn test_descriptor_from_tag_block() {
    let plain = SourceDef::table("events", "warehouse.events").with_fields([
        FieldDef::column("kind", AtomicType::String),
        FieldDef::column("clicks", AtomicType::Number),
        FieldDef::column("views", AtomicType::Number),
    ]);
    let tag: toml::Table = toml::from_str(
        r#"
        partition_field = "kind"

        [partitions.web]
        fields = ["clicks", "views"]

        [partitions.app]
        fields = ["clicks"]
        "#,
    )
    .unwrap();

    let desc = PartitionCompositeDesc::from_tag(&tag, &plain).unwrap();
    assert_eq!(desc.partitions[0], Partition::new("web", &["clicks", "views"]));
    assert_eq!(desc.partitions[1], Partition::new("app", &["clicks"]));
    assert_eq!(desc.composite_fields, vec!["clicks", "views"]);

    let missing: toml::Table = toml::from_str("partition_field = \"kind\"").unwrap();
    assert_eq!(
        PartitionCompositeDesc::from_tag(&missing, &plain),
        Err(PartitionSpecError::MissingPartitions)
    );
    assert_eq!(
        PartitionSpecError::FieldNotPresent("zz".into()).to_string(),
        "Composite partition field `zz` not present in source"
    );
}
