use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{FestError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Collection {
    Programs,
    Assignments,
    Scores,
    Students,
    Teams,
    ProgramCategories,
    MemberCategories,
    Settings,
    Stages,
    Users,
}

impl Collection {
    pub const ALL: [Collection; 10] = [
        Collection::Programs,
        Collection::Assignments,
        Collection::Scores,
        Collection::Students,
        Collection::Teams,
        Collection::ProgramCategories,
        Collection::MemberCategories,
        Collection::Settings,
        Collection::Stages,
        Collection::Users,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Collection::Programs => "programs",
            Collection::Assignments => "assignments",
            Collection::Scores => "scores",
            Collection::Students => "students",
            Collection::Teams => "teams",
            Collection::ProgramCategories => "programCategories",
            Collection::MemberCategories => "memberCategories",
            Collection::Settings => "settings",
            Collection::Stages => "stages",
            Collection::Users => "users",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable copy of a whole collection as delivered to subscribers.
pub type DocumentSnapshot = Arc<Vec<Value>>;

/// Live view of one collection. Dropping it unsubscribes.
pub struct Subscription {
    collection: Collection,
    receiver: Receiver<DocumentSnapshot>,
}

impl Subscription {
    pub fn collection(&self) -> Collection {
        self.collection
    }

    /// Blocks until the next snapshot, `None` once the store is gone.
    pub fn recv(&self) -> Option<DocumentSnapshot> {
        self.receiver.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<DocumentSnapshot> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Drains pending updates and returns only the newest one.
    pub fn latest(&self) -> Option<DocumentSnapshot> {
        let mut newest = None;
        loop {
            match self.receiver.try_recv() {
                Ok(snapshot) => newest = Some(snapshot),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return newest,
            }
        }
    }
}

/// The hosted document database as seen by the core.
pub trait DocumentStore: Send + Sync {
    fn read(&self, collection: Collection) -> Result<Vec<Value>>;

    /// The first snapshot delivered is the current content of the collection.
    fn subscribe(&self, collection: Collection) -> Result<Subscription>;

    /// Creates or replaces the document carrying the same `id`.
    fn upsert(&self, collection: Collection, document: Value) -> Result<()>;

    /// Returns whether a document was removed.
    fn delete(&self, collection: Collection, id: &str) -> Result<bool>;
}

#[derive(Default)]
struct Subscribers {
    senders: Mutex<HashMap<Collection, Vec<Sender<DocumentSnapshot>>>>,
}

impl Subscribers {
    fn add(&self, collection: Collection, current: Vec<Value>) -> Subscription {
        let (tx, rx) = mpsc::channel::<DocumentSnapshot>();
        let _ = tx.send(Arc::new(current));
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(collection)
            .or_default()
            .push(tx);
        debug!("New subscriber on {}", collection);
        Subscription {
            collection,
            receiver: rx,
        }
    }

    fn notify(&self, collection: Collection, documents: Vec<Value>) {
        let snapshot = Arc::new(documents);
        let mut senders = self.senders.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(list) = senders.get_mut(&collection) {
            let before = list.len();
            list.retain(|tx| tx.send(Arc::clone(&snapshot)).is_ok());
            if list.len() != before {
                debug!(
                    "Dropped {} closed subscribers on {}",
                    before - list.len(),
                    collection
                );
            }
        }
    }
}

fn document_id(collection: Collection, document: &Value) -> Result<String> {
    document
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| FestError::store(collection, "document has no string id"))
}

fn upsert_into(documents: &mut Vec<Value>, id: &str, document: Value) {
    match documents
        .iter_mut()
        .find(|existing| existing.get("id").and_then(Value::as_str) == Some(id))
    {
        Some(existing) => *existing = document,
        None => documents.push(document),
    }
}

fn remove_from(documents: &mut Vec<Value>, id: &str) -> bool {
    let before = documents.len();
    documents.retain(|existing| existing.get("id").and_then(Value::as_str) != Some(id));
    documents.len() != before
}

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Collection, Vec<Value>>>,
    subscribers: Subscribers,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(collection: Collection, documents: Vec<Value>) -> Self {
        let store = Self::new();
        store
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(collection, documents);
        store
    }

    pub fn insert_all(&self, collection: Collection, documents: Vec<Value>) {
        let snapshot = {
            let mut collections = self.collections.write().unwrap_or_else(PoisonError::into_inner);
            let entry = collections.entry(collection).or_default();
            entry.extend(documents);
            entry.clone()
        };
        self.subscribers.notify(collection, snapshot);
    }
}

impl DocumentStore for MemoryStore {
    fn read(&self, collection: Collection) -> Result<Vec<Value>> {
        Ok(self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&collection)
            .cloned()
            .unwrap_or_default())
    }

    fn subscribe(&self, collection: Collection) -> Result<Subscription> {
        let current = self.read(collection)?;
        Ok(self.subscribers.add(collection, current))
    }

    fn upsert(&self, collection: Collection, document: Value) -> Result<()> {
        let id = document_id(collection, &document)?;
        let snapshot = {
            let mut collections = self.collections.write().unwrap_or_else(PoisonError::into_inner);
            let entry = collections.entry(collection).or_default();
            upsert_into(entry, &id, document);
            entry.clone()
        };
        self.subscribers.notify(collection, snapshot);
        Ok(())
    }

    fn delete(&self, collection: Collection, id: &str) -> Result<bool> {
        let (removed, snapshot) = {
            let mut collections = self.collections.write().unwrap_or_else(PoisonError::into_inner);
            let entry = collections.entry(collection).or_default();
            let removed = remove_from(entry, id);
            (removed, entry.clone())
        };
        if removed {
            self.subscribers.notify(collection, snapshot);
        }
        Ok(removed)
    }
}

/// One JSON array file per collection, `<root>/<collection>.json`.
pub struct JsonDirStore {
    root: PathBuf,
    write_lock: Mutex<()>,
    subscribers: Subscribers,
}

impl JsonDirStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(FestError::io(
                &root,
                std::io::Error::new(std::io::ErrorKind::NotFound, "data folder does not exist"),
            ));
        }
        info!("Opened JSON document store at {}", root.display());
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
            subscribers: Subscribers::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_path(&self, collection: Collection) -> PathBuf {
        self.root.join(format!("{}.json", collection.name()))
    }

    /// Writes to a sibling temp file first so a failed write leaves the collection untouched.
    fn write_collection(&self, collection: Collection, documents: &[Value]) -> Result<()> {
        let path = self.collection_path(collection);
        let tmp_path = path.with_extension("json.tmp");
        let raw = serde_json::to_string_pretty(documents)?;
        fs::write(&tmp_path, raw).map_err(|err| FestError::io(&tmp_path, err))?;
        fs::rename(&tmp_path, &path).map_err(|err| FestError::io(&path, err))?;
        Ok(())
    }
}

impl DocumentStore for JsonDirStore {
    fn read(&self, collection: Collection) -> Result<Vec<Value>> {
        let path = self.collection_path(collection);
        if !path.exists() {
            debug!("{} missing, treating {} as empty", path.display(), collection);
            return Ok(Vec::new());
        }

        let raw = fs::read_to_string(&path).map_err(|err| FestError::io(&path, err))?;
        serde_json::from_str::<Vec<Value>>(&raw).map_err(|err| {
            FestError::store(
                collection,
                format!("failed to parse {}: {}", path.display(), err),
            )
        })
    }

    fn subscribe(&self, collection: Collection) -> Result<Subscription> {
        let current = self.read(collection)?;
        Ok(self.subscribers.add(collection, current))
    }

    fn upsert(&self, collection: Collection, document: Value) -> Result<()> {
        let id = document_id(collection, &document)?;
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut documents = self.read(collection)?;
        upsert_into(&mut documents, &id, document);
        if let Err(err) = self.write_collection(collection, &documents) {
            warn!("Failed to save {} {}: {}", collection, id, err);
            return Err(err);
        }
        info!("Saved {} {}", collection, id);
        self.subscribers.notify(collection, documents);
        Ok(())
    }

    fn delete(&self, collection: Collection, id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut documents = self.read(collection)?;
        if !remove_from(&mut documents, id) {
            return Ok(false);
        }
        if let Err(err) = self.write_collection(collection, &documents) {
            warn!("Failed to delete {} {}: {}", collection, id, err);
            return Err(err);
        }
        info!("Deleted {} {}", collection, id);
        self.subscribers.notify(collection, documents);
        Ok(true)
    }
}
