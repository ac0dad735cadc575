// Shared fixture: stores, owners with nested engines and embedded store lists, and a
// link table between the two.
#![allow(dead_code)]

use bson::oid::ObjectId;
use bson::{Document, doc};
use nexusrel::schema::{NativeField, NativeModel, NativeSchema, NativeType};
use nexusrel::store::MemoryStore;

pub const STORE_A: &str = "65a1b2c3d4e5f60718293a01";
pub const STORE_B: &str = "65a1b2c3d4e5f60718293a02";
pub const OWNER_1: &str = "65a1b2c3d4e5f60718293b01";
pub const OWNER_2: &str = "65a1b2c3d4e5f60718293b02";

pub fn oid(hex: &str) -> ObjectId {
    ObjectId::parse_str(hex).unwrap()
}

pub fn models() -> Vec<NativeModel> {
    let store = NativeModel::new(
        "store",
        NativeSchema::new()
            .field("name", NativeField::new(NativeType::String).required())
            .field("address.city", NativeField::new(NativeType::String)),
    );
    let owner = NativeModel::new(
        "owner",
        NativeSchema::new()
            .field("name", NativeField::new(NativeType::String))
            .field("age", NativeField::new(NativeType::Number))
            .field("storeId", NativeField::reference("store"))
            .field("engine.horsePower", NativeField::new(NativeType::Number))
            .field("engine.identification.manufacturer", NativeField::new(NativeType::String))
            .field("tags", NativeField::new(NativeType::String).array())
            .embedded_array(
                "stores",
                NativeSchema::new()
                    .field("label", NativeField::new(NativeType::String))
                    .field("storeId", NativeField::reference("store")),
            ),
    );
    let owner_store = NativeModel::new(
        "ownerStore",
        NativeSchema::new()
            .field("ownerId", NativeField::reference("owner"))
            .field("storeId", NativeField::reference("store")),
    );
    vec![store, owner, owner_store]
}

pub fn stores() -> Vec<Document> {
    vec![
        doc! { "_id": oid(STORE_A), "name": "A", "address": { "city": "Lyon" }, "__v": 0 },
        doc! { "_id": oid(STORE_B), "name": "B", "address": { "city": "Nantes" }, "__v": 0 },
    ]
}

pub fn owners() -> Vec<Document> {
    vec![
        doc! {
            "_id": oid(OWNER_1),
            "name": "Ada",
            "age": 36,
            "storeId": oid(STORE_A),
            "engine": { "horsePower": 90, "identification": { "manufacturer": "Renault" } },
            "tags": ["vintage", "blue"],
            "stores": [
                { "label": "first", "storeId": oid(STORE_A) },
                { "label": "second", "storeId": oid(STORE_B) },
            ],
            "__v": 0,
        },
        doc! {
            "_id": oid(OWNER_2),
            "name": "Bob",
            "age": 52,
            "storeId": oid(STORE_B),
            "engine": { "horsePower": 150, "identification": { "manufacturer": "Peugeot" } },
            "tags": [],
            "stores": [],
            "__v": 0,
        },
    ]
}

pub fn links() -> Vec<Document> {
    vec![
        doc! { "_id": ObjectId::new(), "ownerId": oid(OWNER_1), "storeId": oid(STORE_A), "__v": 0 },
        doc! { "_id": ObjectId::new(), "ownerId": oid(OWNER_2), "storeId": oid(STORE_B), "__v": 0 },
    ]
}

pub fn seeded_store() -> MemoryStore {
    MemoryStore::new()
        .with_collection("store", stores())
        .with_collection("owner", owners())
        .with_collection("ownerStore", links())
}
