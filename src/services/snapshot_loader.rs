use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{FestError, Result};
use crate::models::{self, FestSnapshot};
use crate::services::results::PointsConfig;
use crate::services::store::{Collection, DocumentStore, Subscription};

/// Collections the core computes over. `users` stays with the auth layer.
pub const LOADED_COLLECTIONS: [Collection; 9] = [
    Collection::Programs,
    Collection::Assignments,
    Collection::Scores,
    Collection::Students,
    Collection::Teams,
    Collection::ProgramCategories,
    Collection::MemberCategories,
    Collection::Settings,
    Collection::Stages,
];

const POINTS_SETTINGS_ID: &str = "points";

fn decode_documents<T>(
    collection: Collection,
    documents: &[Value],
    notices: &mut Vec<String>,
) -> Vec<T>
where
    T: DeserializeOwned + models::HasId,
{
    documents
        .iter()
        .filter_map(|document| match serde_json::from_value::<T>(document.clone()) {
            Ok(item) => Some(item),
            Err(err) => {
                let id = document.get("id").and_then(Value::as_str).unwrap_or("<no id>");
                let notice = format!("Skipping {collection} document {id}: {err}");
                warn!("{notice}");
                notices.push(notice);
                None
            }
        })
        .collect()
}

fn decode_points(documents: &[Value], notices: &mut Vec<String>) -> Option<PointsConfig> {
    let document = documents
        .iter()
        .find(|document| document.get("id").and_then(Value::as_str) == Some(POINTS_SETTINGS_ID))?;
    match serde_json::from_value::<PointsConfig>(document.clone()) {
        Ok(points) => Some(points),
        Err(err) => {
            let notice = format!("Ignoring points settings: {err}");
            warn!("{notice}");
            notices.push(notice);
            None
        }
    }
}

/// Replaces one typed collection of the snapshot with freshly decoded documents.
pub fn apply_collection(snapshot: &mut FestSnapshot, collection: Collection, documents: &[Value]) {
    let mut notices = Vec::new();
    match collection {
        Collection::Programs => snapshot.programs = decode_documents(collection, documents, &mut notices),
        Collection::Assignments => {
            snapshot.assignments = decode_documents(collection, documents, &mut notices)
        }
        Collection::Scores => snapshot.scores = decode_documents(collection, documents, &mut notices),
        Collection::Students => {
            snapshot.participants = decode_documents(collection, documents, &mut notices)
        }
        Collection::Teams => snapshot.teams = decode_documents(collection, documents, &mut notices),
        Collection::ProgramCategories => {
            snapshot.program_categories = decode_documents(collection, documents, &mut notices)
        }
        Collection::MemberCategories => {
            snapshot.member_categories = decode_documents(collection, documents, &mut notices)
        }
        Collection::Stages => snapshot.stages = decode_documents(collection, documents, &mut notices),
        Collection::Settings => snapshot.points = decode_points(documents, &mut notices),
        Collection::Users => {}
    }
    snapshot.set_notices(collection, notices);
}

fn record_read_failure(snapshot: &mut FestSnapshot, collection: Collection, err: &FestError) {
    let notice = format!("Could not load {collection}: {err}");
    warn!("{notice}");
    apply_collection(snapshot, collection, &[]);
    snapshot.set_notices(collection, vec![notice]);
}

/// Reads every collection in parallel, then decodes. Failed reads leave that collection empty.
///
/// Builds and blocks on its own tokio runtime, so it must not be called from inside an
/// async context. Async callers should run it through `tokio::task::spawn_blocking`.
pub fn load_snapshot(store: Arc<dyn DocumentStore>) -> Result<FestSnapshot> {
    let worker_threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .clamp(1, 4);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .map_err(|err| FestError::Runtime(format!("failed to initialize load runtime: {err}")))?;

    let reads = runtime.block_on(async move {
        let mut handles = Vec::with_capacity(LOADED_COLLECTIONS.len());
        for collection in LOADED_COLLECTIONS {
            let store_for_task = Arc::clone(&store);
            let handle = tokio::task::spawn_blocking(move || store_for_task.read(collection));
            handles.push((collection, handle));
        }

        let mut reads = Vec::with_capacity(handles.len());
        for (collection, handle) in handles {
            let result = handle.await.unwrap_or_else(|err| {
                Err(FestError::store(collection, format!("read task failed: {err}")))
            });
            reads.push((collection, result));
        }
        reads
    });

    let mut snapshot = FestSnapshot::new();
    for (collection, result) in reads {
        match result {
            Ok(documents) => apply_collection(&mut snapshot, collection, &documents),
            Err(err) => record_read_failure(&mut snapshot, collection, &err),
        }
    }

    info!(
        "Loaded snapshot: {} programs, {} assignments, {} scores, {} students, {} teams, {} notices",
        snapshot.programs.len(),
        snapshot.assignments.len(),
        snapshot.scores.len(),
        snapshot.participants.len(),
        snapshot.teams.len(),
        snapshot.notice_lines().count()
    );
    Ok(snapshot)
}

/// A snapshot kept current by store subscriptions. Dropping it stops listening.
pub struct LiveSnapshot {
    snapshot: FestSnapshot,
    subscriptions: HashMap<Collection, Subscription>,
}

impl LiveSnapshot {
    pub fn open(store: &dyn DocumentStore, collections: &[Collection]) -> Self {
        let mut snapshot = FestSnapshot::new();
        let mut subscriptions = HashMap::new();
        for &collection in collections {
            match store.subscribe(collection) {
                Ok(subscription) => {
                    if let Some(initial) = subscription.latest() {
                        apply_collection(&mut snapshot, collection, &initial);
                    }
                    subscriptions.insert(collection, subscription);
                }
                Err(err) => record_read_failure(&mut snapshot, collection, &err),
            }
        }
        Self {
            snapshot,
            subscriptions,
        }
    }

    /// Applies any pending updates, returns the collections that changed.
    pub fn refresh(&mut self) -> Vec<Collection> {
        let mut changed = Vec::new();
        for (collection, subscription) in &self.subscriptions {
            if let Some(documents) = subscription.latest() {
                apply_collection(&mut self.snapshot, *collection, &documents);
                changed.push(*collection);
            }
        }
        changed
    }

    pub fn snapshot(&self) -> &FestSnapshot {
        &self.snapshot
    }
}
