mod common;

use bson::{Bson, doc};
use common::{STORE_A, oid, seeded_store};
use nexusrel::store::{MemoryStore, NativeStore};
use nexusrel::DsError;

#[tokio::test]
async fn insert_assigns_ids_and_versions() {
    let store = MemoryStore::new();
    let ids = store.insert_many("pet", vec![doc! { "name": "Rex" }, doc! { "_id": 7, "name": "Tom" }]).await.unwrap();
    assert!(matches!(ids[0], Bson::ObjectId(_)));
    assert_eq!(ids[1], Bson::Int32(7));
    let docs = store.documents("pet");
    assert!(docs.iter().all(|d| d.get_i32("__v").ok() == Some(0)));
}

#[tokio::test]
async fn duplicate_ids_are_rejected() {
    let store = MemoryStore::new();
    store.insert_many("pet", vec![doc! { "_id": 1 }]).await.unwrap();
    let err = store.insert_many("pet", vec![doc! { "_id": 1_i64 }]).await.unwrap_err();
    assert!(matches!(err, DsError::Store(_)));
}

#[tokio::test]
async fn update_reports_matched_and_modified() {
    let store = seeded_store();
    let report = store
        .update_many("store", doc! { "name": { "$in": ["A", "B"] } }, doc! { "$set": { "name": "A" } })
        .await
        .unwrap();
    assert_eq!(report.matched, 2);
    assert_eq!(report.modified, 1);
}

#[tokio::test]
async fn delete_reports_removed_documents() {
    let store = seeded_store();
    let report = store.delete_many("store", doc! { "_id": oid(STORE_A) }).await.unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(store.documents("store").len(), 1);
    let none = store.delete_many("garage", doc! {}).await.unwrap();
    assert_eq!(none.deleted, 0);
}

#[tokio::test]
async fn lookup_joins_foreign_documents() {
    let store = seeded_store();
    let rows = store
        .aggregate(
            "owner",
            vec![
                doc! { "$lookup": {
                    "from": "store",
                    "localField": "storeId",
                    "foreignField": "_id",
                    "as": "shop",
                    "pipeline": [ { "$project": { "__v": 0 } } ],
                } },
                doc! { "$unwind": { "path": "$shop", "preserveNullAndEmptyArrays": true } },
                doc! { "$sort": { "shop.name": -1 } },
                doc! { "$project": { "_id": 0, "name": 1, "shop.name": 1 } },
            ],
        )
        .await
        .unwrap();
    assert_eq!(
        rows,
        vec![
            doc! { "name": "Bob", "shop": { "name": "B" } },
            doc! { "name": "Ada", "shop": { "name": "A" } },
        ]
    );
}

#[tokio::test]
async fn unwind_carries_indexes() {
    let store = seeded_store();
    let rows = store
        .aggregate(
            "owner",
            vec![
                doc! { "$unwind": { "path": "$stores", "includeArrayIndex": "__index__" } },
                doc! { "$project": { "_id": 0, "label": "$stores.label", "i": "$__index__" } },
            ],
        )
        .await
        .unwrap();
    assert_eq!(
        rows,
        vec![
            doc! { "label": "first", "i": 0_i64 },
            doc! { "label": "second", "i": 1_i64 },
        ]
    );
}

#[tokio::test]
async fn unsupported_stages_fail() {
    let store = seeded_store();
    let err = store.aggregate("owner", vec![doc! { "$facet": {} }]).await.unwrap_err();
    assert!(matches!(err, DsError::Store(_)));
}

#[tokio::test]
async fn writes_emit_bench_lines() {
    let store = seeded_store();
    let _sink = nexusrel::utils::devlog::enable_thread_sink();
    store.delete_many("store", doc! { "name": "A" }).await.unwrap();
    let lines = nexusrel::utils::devlog::drain();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains(r#""op":"delete_many""#) && lines[0].contains(r#""deleted":1"#));
}
