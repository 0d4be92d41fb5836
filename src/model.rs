//! Trained models behind the statistical selector functions.
//!
//! The selector language does not know how a k-means or naive-Bayes model
//! works. It only needs to find a model by name and hand it a feature
//! vector, so models are opaque [`Model`] objects served by a
//! [`ModelStore`].
//!
//! Functions get their store through a [`ModelStoreRef`]. Pass an explicit
//! store where you can. [`ModelStoreRef::Current`] reads the process-wide
//! store on every call, which exists so tests can swap it:
//!
//! ```
//! use std::sync::Arc;
//! use selector_lang::model::{InMemoryModelStore, set_model_store};
//!
//! let previous = set_model_store(Arc::new(InMemoryModelStore::default()));
//! // ... compile and evaluate selectors ...
//! set_model_store(previous);
//! ```

use std::{
    collections::HashMap,
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model '{0}' does not exist")]
    NotFound(String),

    #[error("I/O error while loading model: {0}")]
    Io(#[from] io::Error),

    #[error("Model '{model}' is malformed: {reason}")]
    Format { model: String, reason: String },

    #[error("Model computation failed: {0}")]
    Compute(String),
}

/// Which quantity a model function asks for, e.g. `applypca[2]` is
/// `{ family: "pca", name: "applypca", index: Some(2) }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelOperation {
    pub family: String,
    pub name: String,
    pub index: Option<i64>,
}

impl fmt::Display for ModelOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.family, self.name)?;
        if let Some(index) = self.index {
            write!(f, "[{}]", index)?;
        }
        Ok(())
    }
}

/// A trained model. Missing features arrive as `NaN`.
pub trait Model: Send + Sync {
    fn apply(&self, operation: &ModelOperation, instance: &[f64]) -> Result<f64, ModelError>;
}

pub trait ModelStore: Send + Sync {
    fn model_exists(&self, name: &str) -> bool;

    fn load_model(&self, name: &str) -> Result<Arc<dyn Model>, ModelError>;
}

/// Models registered directly by the embedding application.
#[derive(Default)]
pub struct InMemoryModelStore {
    models: RwLock<HashMap<String, Arc<dyn Model>>>,
}

impl InMemoryModelStore {
    pub fn insert(&self, name: impl Into<String>, model: Arc<dyn Model>) {
        self.models.write().insert(name.into(), model);
    }

    pub fn remove(&self, name: &str) -> Option<Arc<dyn Model>> {
        self.models.write().remove(name)
    }
}

impl ModelStore for InMemoryModelStore {
    fn model_exists(&self, name: &str) -> bool {
        self.models.read().contains_key(name)
    }

    fn load_model(&self, name: &str) -> Result<Arc<dyn Model>, ModelError> {
        self.models
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ModelError::NotFound(name.to_string()))
    }
}

/// Turns the bytes of a stored model into a [`Model`].
pub type ModelDecoder = Arc<dyn Fn(&str, &[u8]) -> Result<Arc<dyn Model>, ModelError> + Send + Sync>;

/// Models stored as files in one directory, named by file name.
///
/// Decoded models are cached, so each file is read once per store.
pub struct FileModelStore {
    root: PathBuf,
    decoder: ModelDecoder,
    cache: Mutex<HashMap<String, Arc<dyn Model>>>,
}

impl FileModelStore {
    pub fn new(root: impl Into<PathBuf>, decoder: ModelDecoder) -> Self {
        FileModelStore {
            root: root.into(),
            decoder,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // Names are plain file names; anything that could leave the directory is rejected
    fn path_for(&self, name: &str) -> Option<PathBuf> {
        let plain = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\']);
        plain.then(|| self.root.join(name))
    }
}

impl ModelStore for FileModelStore {
    fn model_exists(&self, name: &str) -> bool {
        self.cache.lock().contains_key(name) || self.path_for(name).is_some_and(|p| p.is_file())
    }

    fn load_model(&self, name: &str) -> Result<Arc<dyn Model>, ModelError> {
        if let Some(model) = self.cache.lock().get(name) {
            return Ok(model.clone());
        }

        let path = self
            .path_for(name)
            .ok_or_else(|| ModelError::NotFound(name.to_string()))?;
        let bytes = fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ModelError::NotFound(name.to_string()),
            _ => ModelError::Io(e),
        })?;
        let model = (self.decoder)(name, &bytes)?;
        debug!(model = name, path = %path.display(), "loaded model");

        Ok(self
            .cache
            .lock()
            .entry(name.to_string())
            .or_insert(model)
            .clone())
    }
}

static CURRENT_STORE: Lazy<RwLock<Arc<dyn ModelStore>>> =
    Lazy::new(|| RwLock::new(Arc::new(InMemoryModelStore::default())));

/// The process-wide model store. Starts out as an empty in-memory store.
pub fn model_store() -> Arc<dyn ModelStore> {
    CURRENT_STORE.read().clone()
}

/// Replaces the process-wide model store and returns the previous one, so
/// callers can restore it when they are done.
pub fn set_model_store(store: Arc<dyn ModelStore>) -> Arc<dyn ModelStore> {
    info!("replacing process-wide model store");
    std::mem::replace(&mut *CURRENT_STORE.write(), store)
}

/// How a function finds its model store.
#[derive(Clone)]
pub enum ModelStoreRef {
    /// Whatever [`model_store`] returns at evaluation time
    Current,
    Explicit(Arc<dyn ModelStore>),
}

impl ModelStoreRef {
    pub fn get(&self) -> Arc<dyn ModelStore> {
        match self {
            ModelStoreRef::Current => model_store(),
            ModelStoreRef::Explicit(store) => store.clone(),
        }
    }
}

impl fmt::Debug for ModelStoreRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelStoreRef::Current => f.write_str("Current"),
            ModelStoreRef::Explicit(_) => f.write_str("Explicit(..)"),
        }
    }
}
