mod common;

use bson::{Bson, doc};
use common::*;
use nexusrel::config::DatasourceOptions;
use nexusrel::query::{
    AggregateOperation, Aggregation, ConditionTree, DateOperation, Operator, Page, PaginatedFilter, Projection,
    SortClause,
};
use nexusrel::schema::{NativeField, NativeModel, NativeSchema, NativeType};
use nexusrel::{Collection, Datasource, DsError, MemoryStore};

fn datasource() -> Datasource<MemoryStore> {
    Datasource::new(&models(), &DatasourceOptions::default(), seeded_store()).unwrap()
}

fn by(field: &str, value: impl Into<Bson>) -> PaginatedFilter {
    PaginatedFilter::with_tree(ConditionTree::leaf(field, Operator::Equal, value))
}

#[tokio::test]
async fn max_through_many_to_one() {
    let ds = datasource();
    let owners = ds.collection("owner").unwrap();
    let rows = owners
        .aggregate(None, &Aggregation::new(AggregateOperation::Max, Some("storeId__manyToOne:name")), None)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].value, Bson::String("B".into()));
    assert!(rows[0].group.is_empty());
}

#[tokio::test]
async fn count_grouped_by_related_name() {
    let ds = datasource();
    let owners = ds.collection("owner").unwrap();
    let aggregation =
        Aggregation::new(AggregateOperation::Count, None).group_by("storeId__manyToOne:name", None);
    let rows = owners.aggregate(None, &aggregation, Some(10)).await.unwrap();
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row.value, Bson::Int32(1));
        assert!(matches!(row.group.get("storeId__manyToOne:name"), Some(Bson::String(_))));
    }
}

#[tokio::test]
async fn auto_flattened_leaf_filters_and_reads() {
    let ds = datasource();
    let owners = ds.collection("owner").unwrap();
    assert!(owners.schema().columns.contains_key("engine@@@identification@@@manufacturer"));
    assert!(owners.schema().columns.contains_key("engine@@@horsePower"));
    assert!(!owners.schema().columns.contains_key("engine"));

    let rows = owners
        .list(
            &by("engine@@@identification@@@manufacturer", "Renault"),
            &Projection::new(["name", "engine@@@identification@@@manufacturer"]),
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_str("name").unwrap(), "Ada");
    assert_eq!(rows[0].get_str("engine@@@identification@@@manufacturer").unwrap(), "Renault");
    assert!(!rows[0].contains_key("_id"));
}

#[tokio::test]
async fn join_collection_filters_by_foreign_key() {
    let ds = datasource();
    let links = ds.collection("ownerStore").unwrap();
    let rows = links.list(&by("storeId", STORE_A), &Projection::default()).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_object_id("ownerId").unwrap(), oid(OWNER_1));
    assert!(!rows[0].contains_key("__v"));
}

#[tokio::test]
async fn sort_through_many_to_one() {
    // store names run opposite to their ids, so the local key would give Ada first
    let store = MemoryStore::new()
        .with_collection(
            "store",
            vec![
                doc! { "_id": oid(STORE_A), "name": "Z", "__v": 0 },
                doc! { "_id": oid(STORE_B), "name": "A", "__v": 0 },
            ],
        )
        .with_collection("owner", owners());
    let ds = Datasource::new(&models(), &DatasourceOptions::default(), store).unwrap();
    let owners = ds.collection("owner").unwrap();
    let projection = Projection::new(["name", "storeId__manyToOne:name"]);

    let filter = PaginatedFilter::default().sorted(vec![SortClause::asc("storeId__manyToOne:name")]);
    let rows = owners.list(&filter, &projection).await.unwrap();
    let names: Vec<_> = rows.iter().map(|r| r.get_str("name").unwrap()).collect();
    assert_eq!(names, vec!["Bob", "Ada"]);
    assert_eq!(rows[0].get_document("storeId__manyToOne").unwrap().get_str("name").unwrap(), "A");

    let filter = PaginatedFilter::default().sorted(vec![SortClause::desc("storeId__manyToOne:name")]);
    let rows = owners.list(&filter, &projection).await.unwrap();
    let names: Vec<_> = rows.iter().map(|r| r.get_str("name").unwrap()).collect();
    assert_eq!(names, vec!["Ada", "Bob"]);
}

#[tokio::test]
async fn present_skips_null_and_missing_values() {
    let store = seeded_store().with_collection(
        "owner",
        vec![
            doc! { "_id": "plain-null", "name": "Cid", "age": Bson::Null },
            doc! { "_id": "plain-missing", "name": "Dee" },
        ],
    );
    let ds = Datasource::new(&models(), &DatasourceOptions::default(), store).unwrap();
    let owners = ds.collection("owner").unwrap();
    let rows = owners
        .list(&PaginatedFilter::with_tree(ConditionTree::present("age")), &Projection::new(["name"]))
        .await
        .unwrap();
    let names: Vec<_> = rows.iter().map(|r| r.get_str("name").unwrap()).collect();
    assert_eq!(names, vec!["Ada", "Bob"]);
}

#[tokio::test]
async fn string_operators_on_numbers_use_a_coerced_copy() {
    let ds = datasource();
    let owners = ds.collection("owner").unwrap();
    let filter = PaginatedFilter::with_tree(ConditionTree::leaf("age", Operator::Like, "3%"));
    let rows = owners.list(&filter, &Projection::default()).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_str("name").unwrap(), "Ada");
    assert!(rows[0].keys().all(|k| !k.starts_with("__string__")));

    let filter = PaginatedFilter::with_tree(ConditionTree::leaf("name", Operator::ILike, "b%"));
    let rows = owners.list(&filter, &Projection::new(["name"])).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_str("name").unwrap(), "Bob");
}

#[tokio::test]
async fn promoted_array_lists_elements_with_composite_ids() {
    let ds = datasource();
    let stores = ds.collection("owner_stores").unwrap();
    let rows = stores.list(&PaginatedFilter::default(), &Projection::default()).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get_str("_id").unwrap(), format!("{OWNER_1}.stores.0"));
    assert_eq!(rows[1].get_str("_id").unwrap(), format!("{OWNER_1}.stores.1"));
    assert_eq!(rows[1].get_object_id("parentId").unwrap(), oid(OWNER_1));
    assert_eq!(rows[1].get_str("label").unwrap(), "second");
}

#[tokio::test]
async fn promoted_array_filters_through_parent_and_relations() {
    let ds = datasource();
    let stores = ds.collection("owner_stores").unwrap();

    let rows = stores.list(&by("parent:name", "Ada"), &Projection::new(["label"])).await.unwrap();
    assert_eq!(rows.len(), 2);

    let rows = stores
        .list(&by("storeId__manyToOne:name", "B"), &Projection::new(["label", "parent:name"]))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_str("label").unwrap(), "second");
    assert_eq!(rows[0].get_document("parent").unwrap().get_str("name").unwrap(), "Ada");
}

#[tokio::test]
async fn virtual_create_pushes_into_parent() {
    let ds = datasource();
    let stores = ds.collection("owner_stores").unwrap();
    let created = stores
        .create(vec![doc! { "parentId": OWNER_2, "label": "new", "storeId": oid(STORE_A) }])
        .await
        .unwrap();
    assert_eq!(created[0].get_str("_id").unwrap(), format!("{OWNER_2}.stores.0"));

    let raw = ds.store().documents("owner");
    let bob = raw.iter().find(|d| d.get_object_id("_id").ok() == Some(oid(OWNER_2))).unwrap();
    let pushed = bob.get_array("stores").unwrap();
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0].as_document().unwrap().get_str("label").unwrap(), "new");

    let rows = stores.list(&by("parentId", OWNER_2), &Projection::new(["_id", "label"])).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_str("_id").unwrap(), format!("{OWNER_2}.stores.0"));
}

#[tokio::test]
async fn virtual_create_requires_parent() {
    let ds = datasource();
    let stores = ds.collection("owner_stores").unwrap();
    let err = stores.create(vec![doc! { "label": "orphan" }]).await.unwrap_err();
    assert!(matches!(err, DsError::InvalidRecord(_)));
}

#[tokio::test]
async fn virtual_create_refuses_numeric_parents() {
    let store = seeded_store().with_collection("owner", vec![doc! { "_id": 7, "name": "Num", "stores": [] }]);
    let ds = Datasource::new(&models(), &DatasourceOptions::default(), store).unwrap();
    let stores = ds.collection("owner_stores").unwrap();
    let err = stores.create(vec![doc! { "parentId": 7, "label": "x" }]).await.unwrap_err();
    assert!(matches!(err, DsError::InvalidId(_)));

    let raw = ds.store().documents("owner");
    let num = raw.iter().find(|d| d.get_i32("_id").ok() == Some(7)).unwrap();
    assert!(num.get_array("stores").unwrap().is_empty());
}

#[tokio::test]
async fn virtual_update_patches_the_element() {
    let ds = datasource();
    let stores = ds.collection("owner_stores").unwrap();
    let id = format!("{OWNER_1}.stores.1");
    let n = stores.update(&by("_id", id.as_str()), &doc! { "label": "renamed" }).await.unwrap();
    assert_eq!(n, 1);

    let raw = ds.store().documents("owner");
    let ada = raw.iter().find(|d| d.get_object_id("_id").ok() == Some(oid(OWNER_1))).unwrap();
    let elements = ada.get_array("stores").unwrap();
    assert_eq!(elements[1].as_document().unwrap().get_str("label").unwrap(), "renamed");
    assert_eq!(elements[0].as_document().unwrap().get_str("label").unwrap(), "first");
}

#[tokio::test]
async fn read_only_columns_reject_updates() {
    let ds = datasource();
    let stores = ds.collection("owner_stores").unwrap();
    let err = stores.update(&PaginatedFilter::default(), &doc! { "parentId": OWNER_2 }).await.unwrap_err();
    assert!(matches!(err, DsError::InvalidRecord(_)));
}

#[tokio::test]
async fn virtual_delete_removes_and_compacts() {
    let ds = datasource();
    let stores = ds.collection("owner_stores").unwrap();
    let id = format!("{OWNER_1}.stores.0");
    assert_eq!(stores.delete(&by("_id", id.as_str())).await.unwrap(), 1);

    let rows = stores.list(&PaginatedFilter::default(), &Projection::new(["_id", "label"])).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_str("label").unwrap(), "second");
    assert_eq!(rows[0].get_str("_id").unwrap(), format!("{OWNER_1}.stores.0"));
}

#[tokio::test]
async fn physical_writes_round_trip_flattened_columns() {
    let ds = datasource();
    let stores = ds.collection("store").unwrap();
    let created = stores.create(vec![doc! { "name": "C", "address@@@city": "Paris" }]).await.unwrap();
    assert!(matches!(created[0].get("_id"), Some(Bson::ObjectId(_))));

    let raw = ds.store().documents("store");
    let c = raw.iter().find(|d| d.get_str("name").ok() == Some("C")).unwrap();
    assert_eq!(c.get_document("address").unwrap().get_str("city").unwrap(), "Paris");

    assert_eq!(stores.update(&by("name", "C"), &doc! { "address@@@city": "Lille" }).await.unwrap(), 1);
    let rows = stores.list(&by("name", "C"), &Projection::new(["address@@@city"])).await.unwrap();
    assert_eq!(rows[0].get_str("address@@@city").unwrap(), "Lille");

    assert_eq!(stores.delete(&by("name", "C")).await.unwrap(), 1);
    assert!(stores.list(&by("name", "C"), &Projection::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_columns_are_rejected_on_create() {
    let ds = datasource();
    let stores = ds.collection("store").unwrap();
    let err = stores.create(vec![doc! { "nickname": "C" }]).await.unwrap_err();
    assert!(matches!(err, DsError::NoSuchField(_)));
}

#[tokio::test]
async fn one_to_one_promotion_nulls_missing_objects() {
    let options = DatasourceOptions::default().manual("owner", &["engine.identification.manufacturer"], &["engine"]);
    let store = seeded_store().with_collection("owner", vec![doc! { "_id": "no-engine", "name": "Eve" }]);
    let ds = Datasource::new(&models(), &options, store).unwrap();

    let owners = ds.collection("owner").unwrap();
    let filter = PaginatedFilter::default().sorted(vec![SortClause::asc("name")]);
    let rows = owners.list(&filter, &Projection::new(["name", "engine:horsePower"])).await.unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].get_document("engine").unwrap().get_i32("horsePower").unwrap(), 90);
    assert_eq!(rows[2].get_str("name").unwrap(), "Eve");
    assert_eq!(rows[2].get("engine"), Some(&Bson::Null));

    let engines = ds.collection("owner_engine").unwrap();
    let rows = engines.list(&PaginatedFilter::default(), &Projection::default()).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get_str("_id").unwrap(), format!("{OWNER_1}.engine"));
    assert_eq!(rows[0].get_str("identification@@@manufacturer").unwrap(), "Renault");
}

#[tokio::test]
async fn one_to_many_cannot_be_joined() {
    let ds = datasource();
    let stores = ds.collection("store").unwrap();
    let err = stores
        .list(&PaginatedFilter::default(), &Projection::new(["owner_storeId__oneToMany:name"]))
        .await
        .unwrap_err();
    assert!(matches!(err, DsError::UnsupportedRelation { .. }));
}

fn engines_without_eve() -> Datasource<MemoryStore> {
    let options = DatasourceOptions::default().manual("owner", &["engine.identification.manufacturer"], &["engine"]);
    let store = seeded_store().with_collection("owner", vec![doc! { "_id": "no-engine", "name": "Eve" }]);
    Datasource::new(&models(), &options, store).unwrap()
}

#[tokio::test]
async fn missing_objects_are_not_aggregated() {
    let ds = engines_without_eve();
    let engines = ds.collection("owner_engine").unwrap();

    let rows = engines.aggregate(None, &Aggregation::new(AggregateOperation::Count, None), None).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].value, Bson::Int32(2));

    let by_power = Aggregation::new(AggregateOperation::Count, None).group_by("horsePower", None);
    let rows = engines.aggregate(None, &by_power, None).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.group["horsePower"] != Bson::Null));
}

#[tokio::test]
async fn missing_objects_do_not_take_page_slots() {
    let ds = engines_without_eve();
    let engines = ds.collection("owner_engine").unwrap();
    let filter = PaginatedFilter::default().sorted(vec![SortClause::asc("horsePower")]).paged(Page::new(0, 1));
    let rows = engines.list(&filter, &Projection::new(["horsePower"])).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_i32("horsePower").unwrap(), 90);

    let filter = PaginatedFilter::default().sorted(vec![SortClause::asc("horsePower")]).paged(Page::new(1, 5));
    let rows = engines.list(&filter, &Projection::new(["horsePower"])).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_i32("horsePower").unwrap(), 150);
}

#[tokio::test]
async fn numeric_aggregates_over_a_field() {
    let ds = datasource();
    let owners = ds.collection("owner").unwrap();
    let mut values = Vec::new();
    for operation in [AggregateOperation::Sum, AggregateOperation::Avg, AggregateOperation::Min, AggregateOperation::Max] {
        let rows = owners.aggregate(None, &Aggregation::new(operation, Some("age")), None).await.unwrap();
        assert_eq!(rows.len(), 1);
        values.push(rows[0].value.clone());
    }
    assert_eq!(values, vec![Bson::Int32(88), Bson::Double(44.0), Bson::Int32(36), Bson::Int32(52)]);
}

#[tokio::test]
async fn count_over_a_field_skips_nulls() {
    let store = seeded_store().with_collection("owner", vec![doc! { "_id": "ageless", "name": "Cid", "age": Bson::Null }]);
    let ds = Datasource::new(&models(), &DatasourceOptions::default(), store).unwrap();
    let owners = ds.collection("owner").unwrap();

    let all = owners.aggregate(None, &Aggregation::new(AggregateOperation::Count, None), None).await.unwrap();
    assert_eq!(all[0].value, Bson::Int32(3));
    let aged = owners.aggregate(None, &Aggregation::new(AggregateOperation::Count, Some("age")), None).await.unwrap();
    assert_eq!(aged[0].value, Bson::Int32(2));
}

#[tokio::test]
async fn compound_groups_with_a_cap() {
    let ds = datasource();
    let owners = ds.collection("owner").unwrap();
    let aggregation = Aggregation::new(AggregateOperation::Sum, Some("age"))
        .group_by("name", None)
        .group_by("storeId__manyToOne:name", None);
    let rows = owners.aggregate(None, &aggregation, Some(1)).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].value, Bson::Int32(52));
    assert_eq!(rows[0].group["name"], Bson::String("Bob".into()));
    assert_eq!(rows[0].group["storeId__manyToOne:name"], Bson::String("B".into()));

    let rows = owners.aggregate(None, &aggregation, None).await.unwrap();
    assert_eq!(rows.len(), 2);
}

fn date(s: &str) -> bson::DateTime {
    bson::DateTime::from_millis(chrono::DateTime::parse_from_rfc3339(s).unwrap().timestamp_millis())
}

async fn buckets(orders: &Collection<'_, MemoryStore>, operation: DateOperation) -> Vec<(String, Bson)> {
    let aggregation = Aggregation::new(AggregateOperation::Sum, Some("total")).group_by("createdAt", Some(operation));
    orders
        .aggregate(None, &aggregation, None)
        .await
        .unwrap()
        .into_iter()
        .map(|r| (r.group["createdAt"].as_str().unwrap().to_string(), r.value))
        .collect()
}

#[tokio::test]
async fn date_groups_truncate_to_the_bucket() {
    let order = NativeModel::new(
        "order",
        NativeSchema::new()
            .field("total", NativeField::new(NativeType::Number))
            .field("createdAt", NativeField::new(NativeType::Date)),
    );
    let store = MemoryStore::new().with_collection(
        "order",
        vec![
            doc! { "_id": 1, "total": 10, "createdAt": date("2023-11-16T09:30:00Z") },
            doc! { "_id": 2, "total": 5, "createdAt": date("2023-11-17T18:00:00Z") },
            doc! { "_id": 3, "total": 7, "createdAt": date("2024-02-29T12:00:00Z") },
        ],
    );
    let ds = Datasource::new(&[order], &DatasourceOptions::default(), store).unwrap();
    let orders = ds.collection("order").unwrap();

    assert_eq!(
        buckets(&orders, DateOperation::Year).await,
        vec![("2023-01-01".into(), Bson::Int32(15)), ("2024-01-01".into(), Bson::Int32(7))]
    );
    assert_eq!(
        buckets(&orders, DateOperation::Month).await,
        vec![("2023-11-01".into(), Bson::Int32(15)), ("2024-02-01".into(), Bson::Int32(7))]
    );
    assert_eq!(
        buckets(&orders, DateOperation::Week).await,
        vec![("2023-11-13".into(), Bson::Int32(15)), ("2024-02-26".into(), Bson::Int32(7))]
    );
    assert_eq!(
        buckets(&orders, DateOperation::Day).await,
        vec![
            ("2023-11-16".into(), Bson::Int32(10)),
            ("2023-11-17".into(), Bson::Int32(5)),
            ("2024-02-29".into(), Bson::Int32(7)),
        ]
    );
}
