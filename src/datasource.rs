use crate::collection::Collection;
use crate::config::DatasourceOptions;
use crate::errors::DsError;
use crate::relation::RelationGraph;
use crate::schema::NativeModel;
use crate::store::NativeStore;
use std::sync::Arc;

/// Relational view over a document store.
///
/// The relation graph is built once, at construction, and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct Datasource<S> {
    graph: Arc<RelationGraph>,
    store: Arc<S>,
}

impl<S: NativeStore> Datasource<S> {
    /// Plans virtual collections, synthesizes relations and closes the graph.
    ///
    /// # Errors
    /// Any configuration error aborts construction: unknown models in the options, invalid
    /// flatten paths, name collisions and relations to unknown collections.
    pub fn new(models: &[NativeModel], options: &DatasourceOptions, store: S) -> Result<Self, DsError> {
        let graph = RelationGraph::from_models(models, options)?;
        log::info!(
            "datasource ready: {} model(s), {} collection(s), flatten mode {:?}",
            models.len(),
            graph.names().count(),
            options.flatten_mode
        );
        Ok(Self { graph: Arc::new(graph), store: Arc::new(store) })
    }

    #[must_use]
    pub fn graph(&self) -> &RelationGraph {
        &self.graph
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Names of every physical and virtual collection.
    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.graph.names()
    }

    /// # Errors
    /// Returns `NoSuchCollection` for an unknown name.
    pub fn collection(&self, name: &str) -> Result<Collection<'_, S>, DsError> {
        Ok(Collection::new(&self.graph, self.graph.collection(name)?, &self.store))
    }
}
