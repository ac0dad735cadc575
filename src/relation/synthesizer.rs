//! First phase of the graph build: one [`CollectionDef`] per physical model and per
//! promoted path, carrying only the relations declared on itself.

use crate::errors::DsError;
use crate::relation::types::{Boundary, CollectionDef, CollectionSchema, ColumnSchema, Relation};
use crate::schema::{ID_FIELD, ModelSchema, PARENT_FIELD, PARENT_ID_FIELD, SchemaRegistry};
use crate::utils::paths::{PHYSICAL_SEP, strip_prefix};
use crate::virtualization::FlattenOptions;
use std::collections::BTreeMap;

pub const MANY_TO_ONE_SUFFIX: &str = "__manyToOne";
pub const ONE_TO_MANY_SUFFIX: &str = "__oneToMany";
pub const MANY_TO_MANY_SUFFIX: &str = "__manyToMany";

/// Collects every collection of every model.
///
/// # Errors
/// Fails when a stack cannot be applied or two collections end up with the same name.
pub fn collect(
    registry: &SchemaRegistry,
    plans: &BTreeMap<String, FlattenOptions>,
) -> Result<Vec<CollectionDef>, DsError> {
    let empty = FlattenOptions::default();
    let mut defs: Vec<CollectionDef> = Vec::new();
    for model in registry.names() {
        let schema = registry.model(model)?;
        let plan = plans.get(model).unwrap_or(&empty);
        // Promoted path -> collection name, for owner lookups of deeper promotions.
        let mut names: BTreeMap<&str, String> = BTreeMap::new();

        push_unique(&mut defs, define(&schema, model.to_string(), None, None, plan)?)?;
        for path in &plan.as_models {
            let owner = plan.as_models.iter().rev().find(|a| strip_prefix(path, a).is_some());
            let (owner_name, relative) = match owner {
                Some(a) => (
                    names.get(a.as_str()).cloned().unwrap_or_else(|| model.to_string()),
                    strip_prefix(path, a).unwrap_or(path),
                ),
                None => (model.to_string(), path.as_str()),
            };
            let name = format!("{owner_name}_{}", relative.replace(PHYSICAL_SEP, "_"));
            names.insert(path.as_str(), name.clone());
            push_unique(&mut defs, define(&schema, name, Some(path), Some(&owner_name), plan)?)?;
        }
    }
    Ok(defs)
}

fn push_unique(defs: &mut Vec<CollectionDef>, def: CollectionDef) -> Result<(), DsError> {
    if defs.iter().any(|d| d.name == def.name) {
        return Err(DsError::DuplicateCollection(def.name));
    }
    defs.push(def);
    Ok(())
}

fn define(
    schema: &ModelSchema<'_>,
    name: String,
    prefix: Option<&str>,
    owner: Option<&str>,
    plan: &FlattenOptions,
) -> Result<CollectionDef, DsError> {
    let stack = plan.stack_for(prefix);
    let exposed = schema.apply_stack(&stack)?;
    let mut boundaries = Vec::with_capacity(stack.len().saturating_sub(1));
    let mut previous: Option<&str> = None;
    for path in stack.iter().filter_map(|e| e.prefix.as_deref()) {
        let raw = schema.node().get(path).ok_or_else(|| DsError::NoSuchField(path.to_string()))?;
        boundaries.push(Boundary {
            path: path.to_string(),
            relative: previous.and_then(|p| strip_prefix(path, p)).unwrap_or(path).to_string(),
            is_array: raw.is_array(),
            is_leaf: raw.is_leaf(),
        });
        previous = Some(path);
    }
    let (is_array, is_leaf) = boundaries.last().map_or((false, false), |b| (b.is_array, b.is_leaf));

    let mut columns = BTreeMap::new();
    let mut relations = BTreeMap::new();
    for (field, child) in exposed.fields().into_iter().flatten() {
        if prefix.is_some() && field == PARENT_FIELD {
            continue;
        }
        let mut column = ColumnSchema::from_node(child);
        if field == ID_FIELD {
            column.is_primary_key = true;
        }
        if prefix.is_some() && (field == ID_FIELD || field == PARENT_ID_FIELD) {
            column.is_read_only = true;
        }
        if let (Some(target), false) = (&column.reference_to, child.is_array()) {
            relations.insert(
                format!("{field}{MANY_TO_ONE_SUFFIX}"),
                Relation::ManyToOne {
                    foreign_collection: target.clone(),
                    foreign_key: field.clone(),
                    foreign_key_target: ID_FIELD.to_string(),
                },
            );
        }
        columns.insert(field.clone(), column);
    }
    if let Some(owner) = owner {
        relations.insert(
            PARENT_FIELD.to_string(),
            Relation::ManyToOne {
                foreign_collection: owner.to_string(),
                foreign_key: PARENT_ID_FIELD.to_string(),
                foreign_key_target: ID_FIELD.to_string(),
            },
        );
    }

    Ok(CollectionDef {
        name,
        model: schema.model_name().to_string(),
        prefix: prefix.map(str::to_string),
        stack,
        boundaries,
        node: exposed.node().clone(),
        is_array,
        is_leaf,
        schema: CollectionSchema { columns, relations },
    })
}

/// True for a record shape made only of a primary key and two foreign keys.
#[must_use]
pub fn join_keys(def: &CollectionDef) -> Option<[(&str, &str); 2]> {
    let keys: Vec<&String> = def.schema.columns.keys().filter(|c| *c != ID_FIELD).collect();
    let [a, b] = keys.as_slice() else { return None };
    let target = |fk: &str| {
        def.schema.relations.values().find_map(|r| match r {
            Relation::ManyToOne { foreign_collection, foreign_key, .. } if foreign_key == fk => {
                Some(foreign_collection.as_str())
            }
            _ => None,
        })
    };
    Some([(a.as_str(), target(a)?), (b.as_str(), target(b)?)])
}
