use crate::errors::DsError;
use crate::logger::PIPELINE_TARGET;
use crate::pipeline::filter::{Coercions, coercion_fields, lower, plan_coercions};
use crate::pipeline::group;
use crate::pipeline::joints::{discover, joins};
use crate::pipeline::projection::{project, sort};
use crate::pipeline::reparent::reparent;
use crate::pipeline::stage::{PipelineStage, add_fields, to_documents};
use crate::query::{Aggregation, ConditionTree, PaginatedFilter, Projection};
use crate::relation::{CollectionDef, RelationGraph, ResolvedField};

/// Lowers requests against one collection of the graph into native pipelines.
///
/// Stages come out in a fixed order: reparenting, joins, string coercions, match, sort,
/// skip/limit, then the terminal projection (or grouping).
#[derive(Debug, Clone, Copy)]
pub struct PipelineCompiler<'g> {
    graph: &'g RelationGraph,
    collection: &'g CollectionDef,
}

impl<'g> PipelineCompiler<'g> {
    /// # Errors
    /// Returns `NoSuchCollection` for an unknown collection.
    pub fn new(graph: &'g RelationGraph, collection: &str) -> Result<Self, DsError> {
        Ok(Self { graph, collection: graph.collection(collection)? })
    }

    #[must_use]
    pub const fn from_parts(graph: &'g RelationGraph, collection: &'g CollectionDef) -> Self {
        Self { graph, collection }
    }

    #[must_use]
    pub const fn collection(&self) -> &'g CollectionDef {
        self.collection
    }

    fn resolve_all<'a>(&self, fields: impl IntoIterator<Item = &'a str>) -> Result<Vec<ResolvedField<'a>>, DsError>
    where
        'g: 'a,
    {
        fields.into_iter().map(|f| self.graph.resolve(self.collection, f)).collect()
    }

    /// Pipeline of a `list` request.
    ///
    /// # Errors
    /// Fails on unknown fields, unsupported operators and relations that cannot be joined.
    pub fn list(&self, filter: &PaginatedFilter, projection: &Projection) -> Result<Vec<PipelineStage>, DsError> {
        let tree = filter.condition_tree.as_ref();
        let (mut stages, coercions) =
            self.prelude(tree, filter.sort.iter().map(|s| s.field.as_str()), projection)?;

        if let Some(stage) = sort(self.graph, self.collection, &filter.sort)? {
            stages.push(stage);
        }
        if let Some(page) = filter.page {
            if let Some(skip) = page.skip.filter(|n| *n > 0) {
                stages.push(PipelineStage::Skip(skip));
            }
            if let Some(limit) = page.limit {
                stages.push(PipelineStage::Limit(limit));
            }
        }
        stages.push(project(self.graph, self.collection, projection, &coercions)?);
        self.trace("list", &stages);
        Ok(stages)
    }

    /// Pipeline of an `aggregate` request; rows come out as `{value, group}`.
    ///
    /// # Errors
    /// Fails on unknown fields, unsupported operators and relations that cannot be joined.
    pub fn aggregate(
        &self,
        tree: Option<&ConditionTree>,
        aggregation: &Aggregation,
        limit: Option<u64>,
    ) -> Result<Vec<PipelineStage>, DsError> {
        let (mut stages, _) = self.prelude(tree, std::iter::empty(), &aggregation.projection())?;
        stages.extend(group::aggregate(self.graph, self.collection, aggregation, limit)?);
        self.trace("aggregate", &stages);
        Ok(stages)
    }

    /// Reparenting, joins, coercions and match, shared by both request kinds. The planned
    /// coercions are returned alongside the stages.
    fn prelude<'a>(
        &self,
        tree: Option<&'a ConditionTree>,
        sort_fields: impl Iterator<Item = &'a str>,
        projection: &'a Projection,
    ) -> Result<(Vec<PipelineStage>, Coercions), DsError>
    where
        'g: 'a,
    {
        let mut stages = reparent(self.collection);

        let tree_fields = tree.map(ConditionTree::fields).unwrap_or_default();
        let resolved = self.resolve_all(tree_fields.into_iter().chain(sort_fields).chain(projection.iter()))?;
        let joints = discover(&resolved);
        let coercions = plan_coercions(self.graph, self.collection, tree)?;

        stages.extend(joins(self.graph, self.collection, &joints)?);
        stages.extend(add_fields(coercion_fields(&coercions)));
        if let Some(tree) = tree {
            let predicate = lower(self.graph, self.collection, tree, &coercions)?;
            if !predicate.is_empty() {
                stages.push(PipelineStage::Match(predicate));
            }
        }
        Ok((stages, coercions))
    }

    fn trace(&self, kind: &str, stages: &[PipelineStage]) {
        let names: Vec<&str> = stages.iter().map(PipelineStage::operator).collect();
        crate::dev6!(
            "{{\"pipeline\":\"{}\",\"collection\":\"{}\",\"stages\":{}}}",
            kind,
            self.collection.name,
            names.len()
        );
        if log::log_enabled!(target: PIPELINE_TARGET, log::Level::Debug) {
            let docs = to_documents(stages);
            log::debug!(
                target: PIPELINE_TARGET,
                "{} {kind} [{}]: {}",
                self.collection.name,
                names.join(", "),
                serde_json::to_string(&docs).unwrap_or_default()
            );
        }
    }
}
