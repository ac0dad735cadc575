//! Second phase of the graph build: the relation closure over collected collections.

use crate::config::DatasourceOptions;
use crate::errors::DsError;
use crate::relation::synthesizer::{self, MANY_TO_MANY_SUFFIX, ONE_TO_MANY_SUFFIX, join_keys};
use crate::relation::types::{CollectionDef, Relation};
use crate::schema::{ID_FIELD, NativeModel, PARENT_FIELD, PARENT_ID_FIELD, SchemaRegistry};
use crate::utils::paths::{flatten_name, split_relation_path, strip_prefix};
use crate::virtualization;
use std::collections::BTreeMap;

/// Every collection with its closed set of relations. Built once, never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationGraph {
    collections: BTreeMap<String, CollectionDef>,
}

/// One relation crossed while resolving a `relation:column` path.
#[derive(Debug, Clone, Copy)]
pub struct Hop<'g> {
    pub name: &'g str,
    pub relation: &'g Relation,
    pub source: &'g CollectionDef,
    pub target: &'g CollectionDef,
}

/// A request path resolved against the graph.
#[derive(Debug, Clone)]
pub struct ResolvedField<'g> {
    pub hops: Vec<Hop<'g>>,
    /// Collection owning the final column.
    pub collection: &'g CollectionDef,
    pub column: &'g str,
}

impl ResolvedField<'_> {
    /// Relation names crossed, joined with `:`.
    #[must_use]
    pub fn joint(&self) -> Option<String> {
        if self.hops.is_empty() {
            return None;
        }
        Some(self.hops.iter().map(|h| h.name).collect::<Vec<_>>().join(":"))
    }
}

impl RelationGraph {
    /// Plans, collects and closes the graph of a set of models.
    ///
    /// # Errors
    /// Fails on the first invalid setting, bad reference or name collision.
    pub fn from_models(models: &[NativeModel], options: &DatasourceOptions) -> Result<Self, DsError> {
        let registry = SchemaRegistry::new(models);
        let plans = virtualization::plan_all(&registry, options)?;
        Self::build(synthesizer::collect(&registry, &plans)?)
    }

    /// Computes inverses and many-to-many relations into a fresh graph.
    ///
    /// # Errors
    /// Fails when a relation targets an unknown collection or a name collides.
    pub fn build(defs: Vec<CollectionDef>) -> Result<Self, DsError> {
        let mut collections = BTreeMap::new();
        for def in defs {
            if let Some(dup) = def.schema.relations.keys().find(|r| def.schema.columns.contains_key(*r)) {
                return Err(DsError::DuplicateField { collection: def.name.clone(), field: dup.clone() });
            }
            if let Some(prev) = collections.insert(def.name.clone(), def) {
                return Err(DsError::DuplicateCollection(prev.name));
            }
        }

        let mut inverses: Vec<(String, String, Relation)> = Vec::new();
        for def in collections.values() {
            for (name, relation) in &def.schema.relations {
                let Relation::ManyToOne { foreign_collection, foreign_key, .. } = relation else {
                    continue;
                };
                let foreign = collections.get(foreign_collection).ok_or_else(|| {
                    DsError::InvalidRelationTarget {
                        collection: def.name.clone(),
                        field: foreign_key.clone(),
                        target: foreign_collection.clone(),
                    }
                })?;
                inverses.push(inverse_of(def, name, foreign_key, foreign));
            }
            if let Some([(a_fk, a_target), (b_fk, b_target)]) = join_keys(def) {
                inverses.push(many_to_many(def, (a_fk, a_target), (b_fk, b_target)));
                inverses.push(many_to_many(def, (b_fk, b_target), (a_fk, a_target)));
            }
        }

        for (target, name, relation) in inverses {
            let schema = &mut collections
                .get_mut(&target)
                .ok_or_else(|| DsError::NoSuchCollection(target.clone()))?
                .schema;
            match schema.relations.get(&name) {
                Some(existing) if *existing == relation => {}
                Some(_) => return Err(DsError::DuplicateField { collection: target, field: name }),
                None if schema.columns.contains_key(&name) => {
                    return Err(DsError::DuplicateField { collection: target, field: name });
                }
                None => {
                    schema.relations.insert(name, relation);
                }
            }
        }

        let graph = Self { collections };
        log::info!(
            "relation graph: {} collections ({} virtual), {} relations",
            graph.collections.len(),
            graph.collections.values().filter(|c| c.is_virtual()).count(),
            graph.collections.values().map(|c| c.schema.relations.len()).sum::<usize>()
        );
        Ok(graph)
    }

    /// # Errors
    /// Returns `NoSuchCollection` for an unknown name.
    pub fn collection(&self, name: &str) -> Result<&CollectionDef, DsError> {
        self.collections.get(name).ok_or_else(|| DsError::NoSuchCollection(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CollectionDef> {
        self.collections.values()
    }

    /// Resolves `rel:rel:column` from `collection`.
    ///
    /// # Errors
    /// Fails when a hop is not a relation or the column does not exist.
    pub fn resolve<'g>(&'g self, collection: &'g CollectionDef, field: &'g str) -> Result<ResolvedField<'g>, DsError> {
        let (path, column) = split_relation_path(field);
        let mut current = collection;
        let mut hops = Vec::with_capacity(path.len());
        for name in path {
            let relation = current.relation(name).ok_or_else(|| DsError::NoSuchField(field.to_string()))?;
            let target = self.collection(relation.foreign_collection())?;
            hops.push(Hop { name, relation, source: current, target });
            current = target;
        }
        if current.column(column).is_none() {
            return Err(DsError::NoSuchField(field.to_string()));
        }
        Ok(ResolvedField { hops, collection: current, column })
    }
}

fn inverse_of(
    def: &CollectionDef,
    name: &str,
    foreign_key: &str,
    foreign: &CollectionDef,
) -> (String, String, Relation) {
    if name == PARENT_FIELD
        && let Some(prefix) = def.prefix.as_deref()
    {
        let relative = foreign.prefix.as_deref().and_then(|p| strip_prefix(prefix, p)).unwrap_or(prefix);
        let (foreign_collection, origin_key, origin_key_target) =
            (def.name.clone(), PARENT_ID_FIELD.to_string(), ID_FIELD.to_string());
        let relation = if def.is_array {
            Relation::OneToMany { foreign_collection, origin_key, origin_key_target }
        } else {
            Relation::OneToOne { foreign_collection, origin_key, origin_key_target }
        };
        return (foreign.name.clone(), flatten_name(relative), relation);
    }
    (
        foreign.name.clone(),
        format!("{}_{foreign_key}{ONE_TO_MANY_SUFFIX}", def.name),
        Relation::OneToMany {
            foreign_collection: def.name.clone(),
            origin_key: foreign_key.to_string(),
            origin_key_target: ID_FIELD.to_string(),
        },
    )
}

fn many_to_many(
    through: &CollectionDef,
    (origin_key, origin): (&str, &str),
    (foreign_key, foreign): (&str, &str),
) -> (String, String, Relation) {
    (
        origin.to_string(),
        format!("{}_{foreign_key}{MANY_TO_MANY_SUFFIX}", through.name),
        Relation::ManyToMany {
            through_collection: through.name.clone(),
            foreign_collection: foreign.to_string(),
            foreign_key: foreign_key.to_string(),
            foreign_key_target: ID_FIELD.to_string(),
            origin_key: origin_key.to_string(),
            origin_key_target: ID_FIELD.to_string(),
        },
    )
}
