use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{DocumentStore, VectorIndexDefinition, VectorSearchRequest};
use crate::config::validate_ann_params;
use crate::document::{Document, DocumentFilter, DocumentId};
use crate::error::{WitnessError, WitnessResult};
use crate::hnsw::HnswGraph;

/// How a `MemoryDocumentStore` is opened.
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// JSON snapshot loaded on open and written on save/close. `None` keeps
    /// the store purely in memory.
    pub snapshot_path: Option<PathBuf>,
    pub indexes: Vec<VectorIndexDefinition>,
}

/// Per-collection counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    pub documents: usize,
    pub embedded: usize,
    pub indexed: usize,
}

#[derive(Debug)]
struct VectorIndex {
    definition: VectorIndexDefinition,
    graph: HnswGraph,
    // internal node id -> document id
    node_docs: Vec<DocumentId>,
    doc_nodes: HashMap<DocumentId, usize>,
}

impl VectorIndex {
    fn new(definition: VectorIndexDefinition) -> WitnessResult<Self> {
        definition.validate()?;
        let graph = HnswGraph::new(definition.dimensions, definition.metric, definition.ann)?;
        Ok(VectorIndex { definition, graph, node_docs: Vec::new(), doc_nodes: HashMap::new() })
    }

    // Documents whose vector does not fit the index are stored but left unindexed.
    fn accepts(&self, document: &Document) -> bool {
        match &document.embedding {
            Some(stored) if self.definition.model.as_ref().is_some_and(|m| *m != stored.model) => {
                warn!(
                    index = %self.definition.name,
                    document_id = %document.id,
                    model = %stored.model,
                    "Embedding comes from another model; document left out of the index"
                );
                false
            }
            Some(stored) if stored.vector.dimensions() == self.definition.dimensions => true,
            Some(stored) => {
                warn!(
                    index = %self.definition.name,
                    document_id = %document.id,
                    expected = self.definition.dimensions,
                    actual = stored.vector.dimensions(),
                    "Embedding dimension does not match vector index; document left out of the index"
                );
                false
            }
            None => false,
        }
    }

    fn add(&mut self, document: &Document) -> WitnessResult<()> {
        if !self.accepts(document) {
            return Ok(());
        }
        if let Some(stored) = &document.embedding {
            let node = self.graph.insert(stored.vector.clone())?;
            debug_assert_eq!(node, self.node_docs.len());
            self.node_docs.push(document.id.clone());
            self.doc_nodes.insert(document.id.clone(), node);
        }
        Ok(())
    }

    fn remove(&mut self, id: &str) {
        if let Some(node) = self.doc_nodes.remove(id) {
            self.graph.mark_deleted(node);
        }
    }

    fn needs_rebuild(&self) -> bool {
        let tombstones = self.graph.tombstones();
        tombstones >= REBUILD_MIN_TOMBSTONES && tombstones > self.graph.len()
    }
}

// Tombstones tolerated before an index is rebuilt from its live documents.
const REBUILD_MIN_TOMBSTONES: usize = 64;

#[derive(Debug, Default)]
struct Collection {
    // Insertion-ordered slots; deleted documents leave a hole.
    slots: Vec<Option<Document>>,
    positions: HashMap<DocumentId, usize>,
    index: Option<VectorIndex>,
}

impl Collection {
    fn documents(&self) -> impl Iterator<Item = &Document> {
        self.slots.iter().flatten()
    }

    fn stats(&self) -> CollectionStats {
        CollectionStats {
            documents: self.positions.len(),
            embedded: self.documents().filter(|d| d.has_embedding()).count(),
            indexed: self.index.as_ref().map_or(0, |i| i.graph.len()),
        }
    }

    /// Rebuilds the index once tombstones outnumber live nodes.
    fn compact_index(&mut self) -> WitnessResult<()> {
        let Some(definition) = self
            .index
            .as_ref()
            .filter(|i| i.needs_rebuild())
            .map(|i| i.definition.clone())
        else {
            return Ok(());
        };
        let dropped = self.index.as_ref().map_or(0, |i| i.graph.tombstones());
        let mut rebuilt = VectorIndex::new(definition)?;
        for document in self.documents() {
            rebuilt.add(document)?;
        }
        debug!(index = %rebuilt.definition.name, live = rebuilt.graph.len(), dropped, "Rebuilt vector index");
        self.index = Some(rebuilt);
        Ok(())
    }
}

#[derive(Debug)]
struct StoreInner {
    open: bool,
    collections: HashMap<String, Collection>,
}

#[derive(Serialize, Deserialize, Default)]
struct Snapshot {
    collections: BTreeMap<String, Vec<Document>>,
}

impl Snapshot {
    fn capture(inner: &StoreInner) -> Self {
        Snapshot {
            collections: inner
                .collections
                .iter()
                .map(|(name, c)| (name.clone(), c.documents().cloned().collect()))
                .collect(),
        }
    }

    // Temp file, then rename.
    fn write_to(&self, path: &Path) -> WitnessResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| WitnessError::IoError { path: parent.to_path_buf(), source: e })?;
        }
        let temp_path = path.with_extension("tmp");
        let file = File::create(&temp_path).map_err(|e| WitnessError::IoError { path: temp_path.clone(), source: e })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush().map_err(|e| WitnessError::IoError { path: temp_path.clone(), source: e })?;
        fs::rename(&temp_path, path).map_err(|e| WitnessError::IoError { path: temp_path.clone(), source: e })?;
        debug!(path = ?path, "Store snapshot written");
        Ok(())
    }
}

/// In-process document store with a native HNSW vector index per declared
/// collection.
///
/// A single lock guards all collections; an insert stores the document and
/// its index node together, so no reader sees one without the other.
#[derive(Debug)]
pub struct MemoryDocumentStore {
    inner: RwLock<StoreInner>,
    // Serializes snapshot writers so an older capture never lands last.
    persist: Mutex<()>,
    options: StoreOptions,
}

impl MemoryDocumentStore {
    /// A purely in-memory store with the given indexes.
    pub fn new(indexes: Vec<VectorIndexDefinition>) -> WitnessResult<Self> {
        Self::open(StoreOptions { snapshot_path: None, indexes })
    }

    /// Opens the store, loading the snapshot if one exists and rebuilding
    /// every declared index from the stored vectors.
    pub fn open(options: StoreOptions) -> WitnessResult<Self> {
        let mut collections: HashMap<String, Collection> = HashMap::new();
        for definition in &options.indexes {
            let collection = collections.entry(definition.collection.clone()).or_default();
            if collection.index.is_some() {
                return Err(WitnessError::Configuration(format!(
                    "Collection '{}' declares more than one vector index",
                    definition.collection
                )));
            }
            collection.index = Some(VectorIndex::new(definition.clone())?);
        }

        let store = MemoryDocumentStore {
            inner: RwLock::new(StoreInner { open: true, collections }),
            persist: Mutex::new(()),
            options,
        };

        if let Some(path) = store.options.snapshot_path.clone() {
            if path.exists() {
                store.load_snapshot(&path)?;
            } else {
                info!(path = ?path, "No store snapshot found, starting empty");
            }
        }
        Ok(store)
    }

    fn load_snapshot(&self, path: &Path) -> WitnessResult<()> {
        let file = File::open(path).map_err(|e| WitnessError::IoError { path: path.to_path_buf(), source: e })?;
        let snapshot: Snapshot = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| WitnessError::Serialization(format!("Failed to read store snapshot {:?}: {}", path, e)))?;

        let mut inner = self.inner.write();
        let mut total = 0usize;
        for (name, documents) in snapshot.collections {
            let collection = inner.collections.entry(name).or_default();
            for document in documents {
                insert_into(collection, document)?;
                total += 1;
            }
        }
        info!(path = ?path, documents = total, "Loaded store snapshot");
        Ok(())
    }

    /// Writes the snapshot atomically (temp file, then rename). No-op for
    /// in-memory stores.
    pub fn save(&self) -> WitnessResult<()> {
        let Some(path) = self.options.snapshot_path.as_deref() else {
            return Ok(());
        };
        let _persist = self.persist.lock();
        let snapshot = Snapshot::capture(&*self.read_open()?);
        snapshot.write_to(path)
    }

    /// Refuses every further operation with `StoreUnavailable`, then writes
    /// the snapshot captured under the same write guard, so every
    /// acknowledged write is in it. Closing twice is a no-op.
    pub fn close(&self) -> WitnessResult<()> {
        let _persist = self.persist.lock();
        let snapshot = {
            let mut inner = self.inner.write();
            if !inner.open {
                debug!("Document store already closed");
                return Ok(());
            }
            inner.open = false;
            Snapshot::capture(&inner)
        };
        info!("Document store closed");
        match self.options.snapshot_path.as_deref() {
            Some(path) => snapshot.write_to(path),
            None => Ok(()),
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.read().open
    }

    /// The index declared on `collection`, if any.
    pub fn index_definition(&self, collection: &str) -> Option<VectorIndexDefinition> {
        self.options.indexes.iter().find(|d| d.collection == collection).cloned()
    }

    pub fn stats(&self) -> WitnessResult<BTreeMap<String, CollectionStats>> {
        let inner = self.read_open()?;
        Ok(inner.collections.iter().map(|(name, c)| (name.clone(), c.stats())).collect())
    }

    fn read_open(&self) -> WitnessResult<parking_lot::RwLockReadGuard<'_, StoreInner>> {
        let inner = self.inner.read();
        if !inner.open {
            return Err(WitnessError::StoreUnavailable("store is closed".to_string()));
        }
        Ok(inner)
    }

    fn write_open(&self) -> WitnessResult<RwLockWriteGuard<'_, StoreInner>> {
        let inner = self.inner.write();
        if !inner.open {
            return Err(WitnessError::StoreUnavailable("store is closed".to_string()));
        }
        Ok(inner)
    }
}

fn insert_into(collection: &mut Collection, mut document: Document) -> WitnessResult<DocumentId> {
    if document.id.is_empty() {
        document.id = Uuid::new_v4().to_string();
    }
    if collection.positions.contains_key(&document.id) {
        return Err(WitnessError::AlreadyExists(document.id));
    }
    if let Some(index) = collection.index.as_mut() {
        index.add(&document)?;
    }
    let id = document.id.clone();
    collection.positions.insert(id.clone(), collection.slots.len());
    collection.slots.push(Some(document));
    Ok(id)
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert_one(&self, collection: &str, document: Document) -> WitnessResult<DocumentId> {
        let mut inner = self.write_open()?;
        let target = inner.collections.entry(collection.to_string()).or_default();
        let id = insert_into(target, document)?;
        debug!(collection, document_id = %id, "Inserted document");
        Ok(id)
    }

    async fn find_all(&self, collection: &str, filter: DocumentFilter) -> WitnessResult<Vec<Document>> {
        let inner = self.read_open()?;
        Ok(inner
            .collections
            .get(collection)
            .map(|c| c.documents().filter(|d| filter.matches(d)).cloned().collect())
            .unwrap_or_default())
    }

    async fn get(&self, collection: &str, id: &str) -> WitnessResult<Option<Document>> {
        let inner = self.read_open()?;
        Ok(inner.collections.get(collection).and_then(|c| {
            c.positions.get(id).and_then(|&pos| c.slots[pos].clone())
        }))
    }

    async fn replace_one(&self, collection: &str, mut document: Document) -> WitnessResult<()> {
        let mut inner = self.write_open()?;
        let target = inner
            .collections
            .get_mut(collection)
            .ok_or_else(|| WitnessError::NotFound(document.id.clone()))?;
        let pos = *target
            .positions
            .get(&document.id)
            .ok_or_else(|| WitnessError::NotFound(document.id.clone()))?;

        if let Some(previous) = target.slots[pos].as_ref() {
            document.created_at = previous.created_at;
        }
        if let Some(index) = target.index.as_mut() {
            index.remove(&document.id);
            index.add(&document)?;
        }
        document.updated_at = Utc::now();
        debug!(collection, document_id = %document.id, "Replaced document");
        target.slots[pos] = Some(document);
        target.compact_index()
    }

    async fn delete_one(&self, collection: &str, id: &str) -> WitnessResult<bool> {
        let mut inner = self.write_open()?;
        let Some(target) = inner.collections.get_mut(collection) else {
            return Ok(false);
        };
        let Some(pos) = target.positions.remove(id) else {
            return Ok(false);
        };
        target.slots[pos] = None;
        if let Some(index) = target.index.as_mut() {
            index.remove(id);
        }
        target.compact_index()?;
        debug!(collection, document_id = %id, "Deleted document");
        Ok(true)
    }

    async fn collections(&self) -> WitnessResult<Vec<String>> {
        let inner = self.read_open()?;
        let mut names: Vec<String> = inner.collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn supports_vector_search(&self) -> bool {
        true
    }

    async fn vector_search(&self, collection: &str, request: VectorSearchRequest) -> WitnessResult<Vec<Document>> {
        validate_ann_params(request.num_results, request.num_candidates)?;
        let inner = self.read_open()?;
        let Some(target) = inner.collections.get(collection) else {
            return Ok(Vec::new());
        };
        let index = target
            .index
            .as_ref()
            .filter(|i| i.definition.name == request.index_name)
            .ok_or_else(|| WitnessError::IndexNotFound(format!("{}.{}", collection, request.index_name)))?;

        let definition = &index.definition;
        if request.path != definition.path {
            return Err(WitnessError::InvalidArgument(format!(
                "Index '{}' covers path '{}', not '{}'",
                definition.name, definition.path, request.path
            )));
        }
        if request.metric != definition.metric {
            return Err(WitnessError::InvalidArgument(format!(
                "Index '{}' uses {:?}, query asked for {:?}",
                definition.name, definition.metric, request.metric
            )));
        }
        if request.num_dimensions != definition.dimensions {
            return Err(WitnessError::DimensionMismatch {
                expected: definition.dimensions,
                actual: request.num_dimensions,
            });
        }
        if request.query_vector.dimensions() != request.num_dimensions {
            return Err(WitnessError::DimensionMismatch {
                expected: request.num_dimensions,
                actual: request.query_vector.dimensions(),
            });
        }

        let hits = index.graph.search(&request.query_vector, request.num_results, request.num_candidates)?;
        let documents = hits
            .into_iter()
            .filter_map(|(node, _)| {
                let id = index.node_docs.get(node)?;
                let pos = *target.positions.get(id)?;
                target.slots[pos].clone()
            })
            .collect::<Vec<_>>();
        debug!(collection, index = %definition.name, hits = documents.len(), "Vector search completed");
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnnConfig;
    use crate::distance::DistanceMetric;
    use crate::vector::{Embedding, ModelTag, StoredEmbedding};
    use serde_json::{json, Map, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    fn index_def() -> VectorIndexDefinition {
        VectorIndexDefinition {
            ann: AnnConfig { seed: Some(3), ..AnnConfig::new(4, 16) },
            ..VectorIndexDefinition::new("reports", "culpritIndex", "culprit_embedding", 2)
        }
    }

    fn doc(text: &str, vector: Option<Vec<f32>>) -> Document {
        let mut fields = Map::new();
        fields.insert("culprit".into(), Value::String(text.to_string()));
        let embedding = vector.map(|v| StoredEmbedding {
            model: ModelTag::new("test-model", v.len()),
            vector: Embedding::from(v),
        });
        Document::new(fields, embedding)
    }

    #[tokio::test]
    async fn test_insert_find_all_in_order() {
        let store = MemoryDocumentStore::new(vec![index_def()]).unwrap();
        let a = store.insert_one("reports", doc("a", Some(vec![0.0, 0.0]))).await.unwrap();
        let b = store.insert_one("reports", doc("b", None)).await.unwrap();
        let c = store.insert_one("reports", doc("c", Some(vec![1.0, 1.0]))).await.unwrap();

        let all: Vec<_> = store.find_all("reports", DocumentFilter::All).await.unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(all, vec![a.clone(), b, c.clone()]);

        let embedded: Vec<_> = store
            .find_all("reports", DocumentFilter::HasEmbedding)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(embedded, vec![a, c]);

        assert!(store.find_all("missing", DocumentFilter::All).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let store = MemoryDocumentStore::new(Vec::new()).unwrap();
        let mut first = doc("a", None);
        first.id = "fixed".into();
        store.insert_one("c", first.clone()).await.unwrap();
        assert!(matches!(store.insert_one("c", first).await, Err(WitnessError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_vector_search_returns_nearest() {
        let store = MemoryDocumentStore::new(vec![index_def()]).unwrap();
        store.insert_one("reports", doc("far", Some(vec![10.0, 10.0]))).await.unwrap();
        let near = store.insert_one("reports", doc("near", Some(vec![1.0, 1.0]))).await.unwrap();
        store.insert_one("reports", doc("mid", Some(vec![3.0, 3.0]))).await.unwrap();

        let request = VectorSearchRequest::new(&index_def(), Embedding::from(vec![0.9, 0.9]));
        let hits = store.vector_search("reports", request).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, near);

        let request = VectorSearchRequest::new(&index_def(), Embedding::from(vec![0.9, 0.9])).with_limits(3, 10);
        let texts: Vec<_> = store
            .vector_search("reports", request)
            .await
            .unwrap()
            .iter()
            .map(|d| d.text_field("culprit").unwrap().to_string())
            .collect();
        assert_eq!(texts, vec!["near", "mid", "far"]);
    }

    #[tokio::test]
    async fn test_vector_search_validates_request() {
        let store = MemoryDocumentStore::new(vec![index_def()]).unwrap();
        store.insert_one("reports", doc("a", Some(vec![1.0, 1.0]))).await.unwrap();

        let mut wrong_dims = VectorSearchRequest::new(&index_def(), Embedding::from(vec![1.0, 1.0]));
        wrong_dims.num_dimensions = 768;
        assert!(matches!(
            store.vector_search("reports", wrong_dims).await,
            Err(WitnessError::DimensionMismatch { expected: 2, actual: 768 })
        ));

        let short_query = VectorSearchRequest::new(&index_def(), Embedding::from(vec![1.0]));
        assert!(matches!(
            store.vector_search("reports", short_query).await,
            Err(WitnessError::DimensionMismatch { expected: 2, actual: 1 })
        ));

        let mut wrong_index = VectorSearchRequest::new(&index_def(), Embedding::from(vec![1.0, 1.0]));
        wrong_index.index_name = "other".into();
        assert!(matches!(store.vector_search("reports", wrong_index).await, Err(WitnessError::IndexNotFound(_))));

        let mut cosine = VectorSearchRequest::new(&index_def(), Embedding::from(vec![1.0, 1.0]));
        cosine.metric = DistanceMetric::Cosine;
        assert!(matches!(store.vector_search("reports", cosine).await, Err(WitnessError::InvalidArgument(_))));

        let zero = VectorSearchRequest::new(&index_def(), Embedding::from(vec![1.0, 1.0])).with_limits(0, 10);
        assert!(matches!(store.vector_search("reports", zero).await, Err(WitnessError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_replace_and_delete_update_index() {
        let store = MemoryDocumentStore::new(vec![index_def()]).unwrap();
        let id = store.insert_one("reports", doc("old", Some(vec![0.0, 0.0]))).await.unwrap();
        let other = store.insert_one("reports", doc("other", Some(vec![5.0, 5.0]))).await.unwrap();
        let created_at = store.get("reports", &id).await.unwrap().unwrap().created_at;

        let mut updated = doc("new", Some(vec![6.0, 6.0]));
        updated.id = id.clone();
        store.replace_one("reports", updated).await.unwrap();

        let stored = store.get("reports", &id).await.unwrap().unwrap();
        assert_eq!(stored.text_field("culprit"), Some("new"));
        assert_eq!(stored.created_at, created_at);
        assert_eq!(store.stats().unwrap()["reports"].indexed, 2);

        let request = VectorSearchRequest::new(&index_def(), Embedding::from(vec![0.0, 0.0])).with_limits(2, 10);
        let order: Vec<_> = store.vector_search("reports", request).await.unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(order, vec![other.clone(), id.clone()]);

        assert!(store.delete_one("reports", &other).await.unwrap());
        assert!(!store.delete_one("reports", &other).await.unwrap());
        assert!(store.get("reports", &other).await.unwrap().is_none());
        let stats = store.stats().unwrap();
        let reports = &stats["reports"];
        assert_eq!((reports.documents, reports.embedded, reports.indexed), (1, 1, 1));

        let mut ghost = doc("ghost", None);
        ghost.id = "nope".into();
        assert!(matches!(store.replace_one("reports", ghost).await, Err(WitnessError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_mismatched_dimension_is_stored_but_not_indexed() {
        let store = MemoryDocumentStore::new(vec![index_def()]).unwrap();
        store.insert_one("reports", doc("3d", Some(vec![1.0, 2.0, 3.0]))).await.unwrap();
        let stats = store.stats().unwrap();
        let reports = &stats["reports"];
        assert_eq!((reports.documents, reports.embedded, reports.indexed), (1, 1, 0));
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_rebuilds_index() {
        let dir = tempdir().unwrap();
        let options = StoreOptions {
            snapshot_path: Some(dir.path().join("store.json")),
            indexes: vec![index_def()],
        };

        let near_id = {
            let store = MemoryDocumentStore::open(options.clone()).unwrap();
            store.insert_one("reports", doc("far", Some(vec![9.0, 9.0]))).await.unwrap();
            let near = store.insert_one("reports", doc("near", Some(vec![1.0, 1.0]))).await.unwrap();
            store.insert_one("uploads", doc("file", None)).await.unwrap();
            store.close().unwrap();
            near
        };

        let store = MemoryDocumentStore::open(options).unwrap();
        assert_eq!(store.collections().await.unwrap(), vec!["reports".to_string(), "uploads".to_string()]);
        let reports = store.find_all("reports", DocumentFilter::All).await.unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].text_field("culprit"), Some("far"));

        let request = VectorSearchRequest::new(&index_def(), Embedding::from(vec![1.0, 1.0]));
        let hits = store.vector_search("reports", request).await.unwrap();
        assert_eq!(hits[0].id, near_id);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_fails_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{ not json").unwrap();
        let result = MemoryDocumentStore::open(StoreOptions { snapshot_path: Some(path), indexes: vec![] });
        assert!(matches!(result, Err(WitnessError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_closed_store_is_unavailable() {
        let store = MemoryDocumentStore::new(vec![index_def()]).unwrap();
        store.close().unwrap();
        assert!(!store.is_open());
        assert!(matches!(store.insert_one("reports", doc("a", None)).await, Err(WitnessError::StoreUnavailable(_))));
        assert!(matches!(
            store.find_all("reports", DocumentFilter::All).await,
            Err(WitnessError::StoreUnavailable(_))
        ));
        let request = VectorSearchRequest::new(&index_def(), Embedding::from(vec![1.0, 1.0]));
        assert!(matches!(store.vector_search("reports", request).await, Err(WitnessError::StoreUnavailable(_))));
    }

    #[test]
    fn test_duplicate_index_declaration_rejected() {
        let result = MemoryDocumentStore::new(vec![index_def(), index_def()]);
        assert!(matches!(result, Err(WitnessError::Configuration(_))));
    }

    #[test]
    fn test_snapshot_document_shape() {
        let d = doc("x", Some(vec![0.5, 0.25]));
        let value = serde_json::to_value(&d).unwrap();
        assert_eq!(value["embedding"]["vector"], json!([0.5, 0.25]));
        assert_eq!(value["embedding"]["model"]["model"], "test-model");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_close_keeps_every_acknowledged_insert() {
        let dir = tempdir().unwrap();
        let options = StoreOptions {
            snapshot_path: Some(dir.path().join("store.json")),
            indexes: vec![index_def()],
        };
        let store = Arc::new(MemoryDocumentStore::open(options.clone()).unwrap());

        let writer = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let mut acknowledged = Vec::new();
                for i in 0u32.. {
                    let report = doc(&format!("report {}", i), Some(vec![i as f32, 0.0]));
                    match store.insert_one("reports", report).await {
                        Ok(id) => acknowledged.push(id),
                        Err(WitnessError::StoreUnavailable(_)) => break,
                        Err(e) => panic!("unexpected insert error: {}", e),
                    }
                    tokio::task::yield_now().await;
                }
                acknowledged
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.close().unwrap();
        store.close().unwrap();
        let acknowledged = writer.await.unwrap();
        assert!(!acknowledged.is_empty());

        let reopened = MemoryDocumentStore::open(options).unwrap();
        for id in &acknowledged {
            assert!(reopened.get("reports", id).await.unwrap().is_some(), "insert {} missing after close", id);
        }
        assert_eq!(reopened.stats().unwrap()["reports"].documents, acknowledged.len());
    }

    #[tokio::test]
    async fn test_replacements_compact_the_index() {
        let store = MemoryDocumentStore::new(vec![index_def()]).unwrap();
        let still = store.insert_one("reports", doc("still", Some(vec![5.0, 5.0]))).await.unwrap();
        let moving = store.insert_one("reports", doc("moving", Some(vec![0.0, 0.0]))).await.unwrap();

        for step in 0..500 {
            let mut replacement = doc("moving", Some(vec![step as f32 * 0.01, 0.0]));
            replacement.id = moving.clone();
            store.replace_one("reports", replacement).await.unwrap();
        }
        {
            let inner = store.inner.read();
            let graph = &inner.collections["reports"].index.as_ref().unwrap().graph;
            assert_eq!(graph.len(), 2);
            assert!(graph.tombstones() < REBUILD_MIN_TOMBSTONES);
        }

        let request = VectorSearchRequest::new(&index_def(), Embedding::from(vec![5.0, 5.0])).with_limits(2, 10);
        let hits = store.vector_search("reports", request).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, still);
        assert_eq!(hits[1].id, moving);
    }

    #[tokio::test]
    async fn test_deletes_compact_the_index() {
        let store = MemoryDocumentStore::new(vec![index_def()]).unwrap();
        let mut ids = Vec::new();
        for i in 0..100 {
            ids.push(store.insert_one("reports", doc("r", Some(vec![i as f32, 0.0]))).await.unwrap());
        }
        for id in &ids[..90] {
            assert!(store.delete_one("reports", id).await.unwrap());
        }
        let inner = store.inner.read();
        let graph = &inner.collections["reports"].index.as_ref().unwrap().graph;
        assert_eq!(graph.len(), 10);
        assert!(graph.tombstones() < REBUILD_MIN_TOMBSTONES);
    }

    #[tokio::test]
    async fn test_foreign_model_vectors_left_out_of_index() {
        let definition = index_def().with_model(ModelTag::new("test-model", 2));
        let store = MemoryDocumentStore::new(vec![definition.clone()]).unwrap();

        let mut retired = doc("retired", Some(vec![1.0, 1.0]));
        if let Some(stored) = retired.embedding.as_mut() {
            stored.model = ModelTag::new("retired-model", 2);
        }
        store.insert_one("reports", retired).await.unwrap();
        let current = store.insert_one("reports", doc("current", Some(vec![3.0, 3.0]))).await.unwrap();

        let stats = store.stats().unwrap();
        let reports = &stats["reports"];
        assert_eq!((reports.documents, reports.embedded, reports.indexed), (2, 2, 1));

        let request = VectorSearchRequest::new(&definition, Embedding::from(vec![1.0, 1.0])).with_limits(1, 10);
        let hits = store.vector_search("reports", request).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, current);

        let wrong_width = index_def().with_model(ModelTag::new("test-model", 3));
        assert!(matches!(MemoryDocumentStore::new(vec![wrong_width]), Err(WitnessError::Configuration(_))));
    }
}
