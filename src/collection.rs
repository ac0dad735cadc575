//! Collection-level verbs over the native store.
//!
//! Reads compile to a pipeline and run through [`NativeStore::aggregate`]. Writes on a
//! physical collection go straight to the store; writes on a virtual collection reverse the
//! composite ids of the targeted records and patch the owning physical documents. Virtual
//! writes issue several store calls with no transaction around them.

use crate::composite_id::{self, CompositeId};
use crate::errors::DsError;
use crate::pipeline::{PipelineCompiler, to_documents};
use crate::pipeline::group::group_key;
use crate::query::{AggregateResult, Aggregation, ConditionTree, PaginatedFilter, Projection};
use crate::relation::{Boundary, CollectionDef, CollectionSchema, RelationGraph};
use crate::schema::{CONTENT_FIELD, ID_FIELD, PARENT_FIELD, PARENT_ID_FIELD};
use crate::shaper::RecordShaper;
use crate::store::NativeStore;
use crate::utils::docpath::{get_path, set_path};
use crate::utils::paths::physical_name;
use bson::oid::ObjectId;
use bson::{Bson, Document, doc};
use std::collections::BTreeMap;

/// Handle on one collection of a datasource.
#[derive(Debug)]
pub struct Collection<'d, S> {
    graph: &'d RelationGraph,
    def: &'d CollectionDef,
    store: &'d S,
}

impl<'d, S: NativeStore> Collection<'d, S> {
    pub(crate) const fn new(graph: &'d RelationGraph, def: &'d CollectionDef, store: &'d S) -> Self {
        Self { graph, def, store }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.def.name
    }

    #[must_use]
    pub const fn schema(&self) -> &'d CollectionSchema {
        &self.def.schema
    }

    #[must_use]
    pub const fn definition(&self) -> &'d CollectionDef {
        self.def
    }

    #[must_use]
    pub const fn compiler(&self) -> PipelineCompiler<'d> {
        PipelineCompiler::from_parts(self.graph, self.def)
    }

    /// Records matching `filter`, keyed by logical names. An empty projection returns every
    /// column.
    ///
    /// # Errors
    /// Compilation and store errors.
    pub async fn list(&self, filter: &PaginatedFilter, projection: &Projection) -> Result<Vec<Document>, DsError> {
        let stages = self.compiler().list(filter, projection)?;
        let raw = self.store.aggregate(&self.def.model, to_documents(&stages)).await?;
        RecordShaper::new(self.graph, self.def).shape(raw, projection)
    }

    /// Aggregated values, grouped by the logical names of the group fields.
    ///
    /// # Errors
    /// Compilation and store errors.
    pub async fn aggregate(
        &self,
        filter: Option<&ConditionTree>,
        aggregation: &Aggregation,
        limit: Option<u64>,
    ) -> Result<Vec<AggregateResult>, DsError> {
        let stages = self.compiler().aggregate(filter, aggregation, limit)?;
        let rows = self.store.aggregate(&self.def.model, to_documents(&stages)).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let value = row.get("value").cloned().unwrap_or(Bson::Null);
                let keys = row.get_document("group").ok();
                let group = aggregation
                    .groups
                    .iter()
                    .enumerate()
                    .map(|(i, g)| {
                        let v = keys.and_then(|k| k.get(group_key(i))).cloned().unwrap_or(Bson::Null);
                        (g.field.clone(), v)
                    })
                    .collect::<BTreeMap<_, _>>();
                AggregateResult { value, group }
            })
            .collect())
    }

    /// Creates records and returns them with their ids.
    ///
    /// Records of a virtual collection need a `parentId`; they are pushed into (array) or set
    /// on (object) the parent's physical document.
    ///
    /// # Errors
    /// Unknown fields, a missing or unknown parent, store errors.
    pub async fn create(&self, records: Vec<Document>) -> Result<Vec<Document>, DsError> {
        let Some(boundary) = self.def.boundaries.last() else {
            let physical = records.iter().map(|r| self.to_physical(r)).collect::<Result<Vec<_>, _>>()?;
            let ids = self.store.insert_many(&self.def.model, physical).await?;
            log::debug!("created {} record(s) in '{}'", ids.len(), self.def.name);
            return Ok(records
                .into_iter()
                .zip(ids)
                .map(|(mut r, id)| {
                    r.insert(ID_FIELD, id);
                    r
                })
                .collect());
        };

        let mut created = Vec::with_capacity(records.len());
        for mut record in records {
            let parent = record
                .get(PARENT_ID_FIELD)
                .ok_or_else(|| DsError::InvalidRecord(format!("'{PARENT_ID_FIELD}' is required in '{}'", self.def.name)))?;
            let (root_id, container) = self.container_of(parent, boundary)?;
            composite_id::root_text(&root_id)?;
            let value = self.virtual_value(&record)?;
            let path = if boundary.is_array {
                let size = self.array_len(&root_id, &container).await?;
                self.patch(&root_id, operation("$push", &container, value)).await?;
                format!("{container}.{size}")
            } else {
                self.patch(&root_id, operation("$set", &container, value)).await?;
                container
            };
            record.insert(ID_FIELD, composite_id::build(&root_id, &path)?);
            created.push(record);
        }
        log::debug!("created {} virtual record(s) in '{}'", created.len(), self.def.name);
        Ok(created)
    }

    /// Sets the fields of `patch` on every record matching `filter`. Returns how many records
    /// were targeted.
    ///
    /// # Errors
    /// Read-only or unknown fields, store errors.
    pub async fn update(&self, filter: &PaginatedFilter, patch: &Document) -> Result<u64, DsError> {
        for key in patch.keys() {
            if key == ID_FIELD || self.def.column(key).is_some_and(|c| c.is_read_only) {
                return Err(DsError::InvalidRecord(format!("'{key}' is read-only in '{}'", self.def.name)));
            }
        }
        let ids = self.ids(filter).await?;
        if ids.is_empty() {
            return Ok(0);
        }
        if !self.def.is_virtual() {
            let mut set = Document::new();
            for (key, value) in patch {
                if self.def.relation(key).is_none() {
                    set.insert(self.column_path(key)?, value.clone());
                }
            }
            let report = self
                .store
                .update_many(&self.def.model, doc! { "_id": { "$in": ids } }, doc! { "$set": set })
                .await?;
            return Ok(report.matched);
        }

        let targets = self.split_ids(&ids)?;
        for target in &targets {
            let mut set = Document::new();
            for (key, value) in patch {
                let path = if self.def.is_leaf && key == CONTENT_FIELD {
                    target.path.clone()
                } else {
                    self.column_path(key).map(|p| format!("{}.{p}", target.path))?
                };
                set.insert(path, value.clone());
            }
            self.patch(&target.root_id, doc! { "$set": set }).await?;
        }
        Ok(u64::try_from(targets.len()).unwrap_or(u64::MAX))
    }

    /// Deletes every record matching `filter`. Returns how many records were targeted.
    ///
    /// Array elements are unset then pulled, so the indexes in other composite ids of the
    /// same array shift.
    ///
    /// # Errors
    /// Store errors.
    pub async fn delete(&self, filter: &PaginatedFilter) -> Result<u64, DsError> {
        let ids = self.ids(filter).await?;
        if ids.is_empty() {
            return Ok(0);
        }
        let Some(boundary) = self.def.boundaries.last() else {
            let report = self.store.delete_many(&self.def.model, doc! { "_id": { "$in": ids } }).await?;
            return Ok(report.deleted);
        };

        let targets = self.split_ids(&ids)?;
        let mut by_root: Vec<(Bson, Vec<&CompositeId>)> = Vec::new();
        for target in &targets {
            match by_root.iter_mut().find(|(root, _)| *root == target.root_id) {
                Some((_, group)) => group.push(target),
                None => by_root.push((target.root_id.clone(), vec![target])),
            }
        }
        for (root_id, group) in by_root {
            let mut unset = Document::new();
            for target in &group {
                unset.insert(target.path.clone(), "");
            }
            self.patch(&root_id, doc! { "$unset": unset }).await?;
            if boundary.is_array {
                let mut pull = Document::new();
                for container in group.iter().filter_map(|t| t.container_path()) {
                    pull.insert(container, Bson::Null);
                }
                self.patch(&root_id, doc! { "$pull": pull }).await?;
            }
        }
        log::debug!("deleted {} virtual record(s) from '{}'", targets.len(), self.def.name);
        Ok(u64::try_from(targets.len()).unwrap_or(u64::MAX))
    }

    async fn ids(&self, filter: &PaginatedFilter) -> Result<Vec<Bson>, DsError> {
        let rows = self.list(filter, &Projection::new([ID_FIELD])).await?;
        Ok(rows.into_iter().filter_map(|mut r| r.remove(ID_FIELD)).filter(|id| !matches!(id, Bson::Null)).collect())
    }

    fn split_ids(&self, ids: &[Bson]) -> Result<Vec<CompositeId>, DsError> {
        ids.iter()
            .map(|id| match id {
                Bson::String(s) => composite_id::split(s),
                other => Err(DsError::InvalidId(format!("{other} in '{}'", self.def.name))),
            })
            .collect()
    }

    async fn patch(&self, root_id: &Bson, update: Document) -> Result<(), DsError> {
        let report = self.store.update_many(&self.def.model, doc! { "_id": root_id.clone() }, update).await?;
        if report.matched == 0 {
            return Err(DsError::InvalidRecord(format!("no '{}' record with id {root_id}", self.def.model)));
        }
        Ok(())
    }

    async fn array_len(&self, root_id: &Bson, container: &str) -> Result<usize, DsError> {
        let found = self
            .store
            .aggregate(&self.def.model, vec![doc! { "$match": { "_id": root_id.clone() } }, doc! { "$limit": 1 }])
            .await?;
        let root = found
            .first()
            .ok_or_else(|| DsError::InvalidRecord(format!("no '{}' record with id {root_id}", self.def.model)))?;
        Ok(match get_path(root, container) {
            Some(Bson::Array(items)) => items.len(),
            _ => 0,
        })
    }

    /// Root id and physical container path of a new record, from its parent id.
    fn container_of(&self, parent: &Bson, boundary: &Boundary) -> Result<(Bson, String), DsError> {
        let nested = self.def.boundaries.len() > 1;
        match parent {
            Bson::String(s) if nested => {
                let parent = composite_id::split(s)?;
                Ok((parent.root_id, format!("{}.{}", parent.path, boundary.relative)))
            }
            _ if nested => Err(DsError::InvalidId(format!("expected a composite parent id, got {parent}"))),
            Bson::String(s) => Ok((
                ObjectId::parse_str(s).map_or_else(|_| parent.clone(), Bson::ObjectId),
                boundary.relative.clone(),
            )),
            other => Ok((other.clone(), boundary.relative.clone())),
        }
    }

    /// Physical value stored for a virtual record.
    fn virtual_value(&self, record: &Document) -> Result<Bson, DsError> {
        if self.def.is_leaf {
            return Ok(record.get(CONTENT_FIELD).cloned().unwrap_or(Bson::Null));
        }
        let mut body = record.clone();
        for key in [ID_FIELD, PARENT_ID_FIELD, PARENT_FIELD] {
            body.remove(key);
        }
        Ok(Bson::Document(self.to_physical(&body)?))
    }

    /// Logical record to its physical shape. Relation keys are ignored.
    fn to_physical(&self, record: &Document) -> Result<Document, DsError> {
        let mut out = Document::new();
        for (key, value) in record {
            if self.def.relation(key).is_some() {
                continue;
            }
            set_path(&mut out, &self.column_path(key)?, value.clone());
        }
        Ok(out)
    }

    fn column_path(&self, column: &str) -> Result<String, DsError> {
        if self.def.column(column).is_none() {
            return Err(DsError::NoSuchField(format!("{}.{column}", self.def.name)));
        }
        Ok(physical_name(column))
    }
}

/// `{op: {path: value}}`
fn operation(op: &str, path: &str, value: Bson) -> Document {
    let mut fields = Document::new();
    fields.insert(path, value);
    let mut update = Document::new();
    update.insert(op, fields);
    update
}
