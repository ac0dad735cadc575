mod common;

use common::models;
use nexusrel::schema::{
    CONTENT_FIELD, ID_FIELD, NativeField, NativeModel, NativeSchema, NativeType, PARENT_FIELD, PARENT_ID_FIELD,
    SchemaNode, SchemaRegistry, StackEntry,
};
use nexusrel::DsError;

fn registry() -> SchemaRegistry {
    SchemaRegistry::new(&models())
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

#[test]
fn roots_always_carry_an_id() {
    let reg = registry();
    let store = reg.model("store").unwrap();
    assert!(store.node().get(ID_FIELD).is_some_and(SchemaNode::is_leaf));
    assert!(store.node().get("address.city").is_some());
}

#[test]
fn reserved_paths_are_skipped() {
    let model = NativeModel::new(
        "thing",
        NativeSchema::new()
            .field("name", NativeField::new(NativeType::String))
            .field("__v", NativeField::new(NativeType::Number))
            .embedded("meta", NativeSchema::new().field("_id", NativeField::new(NativeType::ObjectId))),
    );
    let reg = SchemaRegistry::new(&[model]);
    let thing = reg.model("thing").unwrap();
    assert!(thing.node().get("__v").is_none());
    assert!(thing.node().get("meta._id").is_none());
}

#[test]
fn unknown_models_are_reported() {
    assert!(matches!(registry().model("nope"), Err(DsError::UnknownModel(n)) if n == "nope"));
}

#[test]
fn sub_schema_follows_references() {
    let reg = registry();
    let owner = reg.model("owner").unwrap();
    let city = owner.get_sub_schema(Some("storeId.address.city"), false).unwrap();
    assert_eq!(city.leaf().unwrap().native_type, NativeType::String);
    assert!(matches!(owner.get_sub_schema(Some("storeId.missing"), false), Err(DsError::NoSuchField(_))));
}

#[test]
fn sub_schema_with_parent_link_boxes_leaves() {
    let reg = registry();
    let owner = reg.model("owner").unwrap();
    let tags = owner.get_sub_schema(Some("tags"), true).unwrap();
    assert!(tags.is_array());
    let fields = tags.fields().unwrap();
    assert_eq!(
        fields.keys().map(String::as_str).collect::<Vec<_>>(),
        vec![ID_FIELD, CONTENT_FIELD, PARENT_FIELD, PARENT_ID_FIELD]
    );
    assert_eq!(fields[PARENT_ID_FIELD].as_leaf(PARENT_ID_FIELD).unwrap().native_type, NativeType::ObjectId);
    assert!(fields[PARENT_FIELD].get("name").is_some());
}

#[test]
fn empty_stack_is_an_error() {
    let reg = registry();
    assert!(matches!(reg.model("owner").unwrap().apply_stack(&[]), Err(DsError::EmptyStack)));
}

#[test]
fn identity_stack_flattens_in_place() {
    let reg = registry();
    let owner = reg.model("owner").unwrap();
    let stack = vec![StackEntry::identity(strings(&["engine.identification"]), strings(&["stores"]))];
    let exposed = owner.apply_stack(&stack).unwrap();
    let fields = exposed.fields().unwrap();
    assert!(fields.contains_key("engine@@@identification"));
    assert!(!fields.contains_key("stores"));
    // the rest of the branch stays nested
    assert!(exposed.node().get("engine.horsePower").is_some());
    assert!(exposed.node().get("engine.identification").is_none());
}

#[test]
fn nested_stack_exposes_parent_chain() {
    let reg = registry();
    let owner = reg.model("owner").unwrap();
    let stack = vec![
        StackEntry::identity(strings(&["engine.identification.manufacturer"]), strings(&["stores"])),
        StackEntry { prefix: Some("stores".into()), as_fields: Vec::new(), as_models: Vec::new() },
    ];
    let exposed = owner.apply_stack(&stack).unwrap();
    let fields = exposed.fields().unwrap();
    assert!(fields.contains_key("label"));
    assert!(fields.contains_key(PARENT_ID_FIELD));
    let parent = &fields[PARENT_FIELD];
    assert!(parent.get("engine@@@identification@@@manufacturer").is_some());
    assert!(parent.get("stores").is_none());
}

#[test]
fn flattening_an_unknown_path_fails() {
    let reg = registry();
    let owner = reg.model("owner").unwrap();
    let stack = vec![StackEntry::identity(strings(&["engine.turbo"]), Vec::new())];
    assert!(matches!(owner.apply_stack(&stack), Err(DsError::InvalidFlattenPath { path, .. }) if path == "engine.turbo"));
}

#[test]
fn list_paths_sorts_parents_first() {
    let reg = registry();
    let owner = reg.model("owner").unwrap();
    let branches = owner.list_paths_matching(|_, node| !node.is_leaf());
    assert_eq!(branches, strings(&["engine", "engine.identification", "stores"]));
}

#[test]
fn path_accessors_and_leaf_checks() {
    let reg = registry();
    let owner = reg.model("owner").unwrap();
    assert!(owner.is_array_at("stores"));
    assert!(owner.is_array_at("tags") && owner.is_leaf_at("tags"));
    assert!(!owner.is_leaf_at("engine"));
    assert!(!owner.is_array_at("garage"));
    assert!(matches!(owner.native_type(), Err(DsError::NotALeaf(n)) if n == "owner"));
    let age = owner.get_sub_schema(Some("age"), false).unwrap();
    assert_eq!(age.native_type().unwrap(), NativeType::Number);
}
