//! Store lifecycle: open from the snapshot at start-up, save and close on shutdown.

use std::fs;
use std::sync::Arc;
use tracing::{error, info};
use witness_core::{Embedder, MemoryDocumentStore, StoreOptions, WitnessError, WitnessResult};

use crate::config::ServerConfig;
use crate::state::{reports_index, AppState};

/// Opens the store under `config.data_path` and builds the shared state.
/// A corrupt snapshot or an invalid index declaration is fatal.
pub fn load_on_startup(config: ServerConfig, embedder: Arc<dyn Embedder>) -> WitnessResult<AppState> {
    fs::create_dir_all(&config.data_path)
        .map_err(|e| WitnessError::IoError { path: config.data_path.clone(), source: e })?;

    let options = StoreOptions {
        snapshot_path: Some(config.snapshot_path()),
        indexes: vec![reports_index(&config)],
    };
    let store = Arc::new(MemoryDocumentStore::open(options)?);
    for (collection, stats) in store.stats()? {
        info!(
            collection = %collection,
            documents = stats.documents,
            embedded = stats.embedded,
            indexed = stats.indexed,
            "Collection loaded"
        );
    }
    AppState::with_store(config, embedder, store)
}

/// Writes the final snapshot and closes the store. Later requests get
/// `StoreUnavailable`.
pub fn save_on_shutdown(state: &AppState) {
    info!(path = ?state.config.snapshot_path(), "Saving document store before shutdown...");
    match state.store.close() {
        Ok(()) => info!("Document store saved. Shutting down."),
        Err(e) => error!(error = %e, "Failed to save document store on shutdown"),
    }
}
