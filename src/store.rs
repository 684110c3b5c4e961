//! Document store operations for checklist state.
//!
//! This module defines the `RemoteStore` trait the rest of the application
//! talks to, together with `DocumentStore`, a JSON-file-backed implementation
//! with real-time subscriptions. Documents are schemaless field maps grouped
//! into named collections. Subscribers receive a `DocumentChange` on an mpsc
//! channel immediately after subscribing and after every write to the
//! document they watch.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Field map of a single document.
pub type Fields = serde_json::Map<String, Value>;

/// A document together with its id inside the collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    /// String value of a top-level field.
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }
}

/// Handle identifying a live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Snapshot delivered to subscribers. `fields` is `None` when the document
/// does not exist.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChange {
    pub subscription: SubscriptionId,
    pub collection: String,
    pub id: String,
    pub fields: Option<Fields>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No document to update: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Field '{field}' of {collection}/{id} is not an array")]
    NotAnArray { collection: String, id: String, field: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store data is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Document CRUD plus real-time subscription.
pub trait RemoteStore {
    /// Every document of a collection, in id order.
    fn get_all(&self, collection: &str) -> Result<Vec<Document>, StoreError>;

    fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Watch one document. The current snapshot is delivered right away.
    fn subscribe(
        &mut self,
        collection: &str,
        id: &str,
        sink: Sender<DocumentChange>,
    ) -> Result<SubscriptionId, StoreError>;

    fn unsubscribe(&mut self, subscription: SubscriptionId);

    /// Overwrite the given top-level fields of an existing document.
    fn update(&mut self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError>;

    /// Append `value` to an array field unless an equal element is present.
    fn append_to_array_field(
        &mut self,
        collection: &str,
        id: &str,
        field: &str,
        value: Value,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Collections {
    #[serde(default)]
    collections: BTreeMap<String, BTreeMap<String, Fields>>,
}

#[derive(Debug)]
struct Subscriber {
    id: SubscriptionId,
    collection: String,
    doc_id: String,
    sink: Sender<DocumentChange>,
}

/// JSON-file-backed document store.
#[derive(Debug, Default)]
pub struct DocumentStore {
    data: Collections,
    path: Option<PathBuf>,
    subscribers: Vec<Subscriber>,
    next_subscription: u64,
}

impl DocumentStore {
    /// A store that lives only in memory.
    pub fn in_memory() -> Self {
        DocumentStore::default()
    }

    /// Load the store from a JSON file, starting empty if the file doesn't exist.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let data = if path.exists() {
            let mut buf = String::new();
            File::open(path)?.read_to_string(&mut buf)?;
            serde_json::from_str(&buf)?
        } else {
            Collections::default()
        };
        Ok(DocumentStore { data, path: Some(path.to_path_buf()), ..DocumentStore::default() })
    }

    /// Save `data` to the backing file using atomic write (temp file + rename).
    fn save(&self, data: &Collections) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let tmp = path.with_extension("json.tmp");
        let mut f = File::create(&tmp)?;
        let data = serde_json::to_string_pretty(data)?;
        f.write_all(data.as_bytes())?;
        f.flush()?;
        fs::rename(tmp, path)?;
        Ok(())
    }

    /// Replace the live state with `data` once it is on disk, then notify the
    /// document's subscribers. A failed save leaves the live state untouched.
    fn commit(&mut self, data: Collections, collection: &str, id: &str) -> Result<(), StoreError> {
        self.save(&data)?;
        self.data = data;
        self.notify(collection, id);
        Ok(())
    }

    fn document(&self, collection: &str, id: &str) -> Option<&Fields> {
        self.data.collections.get(collection).and_then(|c| c.get(id))
    }

    /// Push the current snapshot of a document to its subscribers, dropping
    /// subscribers whose receiving end has gone away.
    fn notify(&mut self, collection: &str, id: &str) {
        let fields = self.document(collection, id).cloned();
        self.subscribers.retain(|s| {
            if s.collection != collection || s.doc_id != id {
                return true;
            }
            let change = DocumentChange {
                subscription: s.id,
                collection: collection.to_string(),
                id: id.to_string(),
                fields: fields.clone(),
            };
            s.sink.send(change).is_ok()
        });
    }

    /// Merge top-level fields into a document, creating it when absent.
    pub fn merge_document(
        &mut self,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> Result<(), StoreError> {
        let mut data = self.data.clone();
        data.collections
            .entry(collection.to_string())
            .or_default()
            .entry(id.to_string())
            .or_default()
            .extend(fields);
        self.commit(data, collection, id)
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl RemoteStore for DocumentStore {
    fn get_all(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        Ok(self
            .data
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document { id: id.clone(), fields: fields.clone() })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self
            .document(collection, id)
            .map(|fields| Document { id: id.to_string(), fields: fields.clone() }))
    }

    fn subscribe(
        &mut self,
        collection: &str,
        id: &str,
        sink: Sender<DocumentChange>,
    ) -> Result<SubscriptionId, StoreError> {
        self.next_subscription += 1;
        let subscription = SubscriptionId(self.next_subscription);
        let initial = DocumentChange {
            subscription,
            collection: collection.to_string(),
            id: id.to_string(),
            fields: self.document(collection, id).cloned(),
        };
        if sink.send(initial).is_err() {
            warn!(collection, id, "subscriber went away before the first snapshot");
        }
        self.subscribers.push(Subscriber {
            id: subscription,
            collection: collection.to_string(),
            doc_id: id.to_string(),
            sink,
        });
        debug!(collection, id, ?subscription, "subscribed");
        Ok(subscription)
    }

    fn unsubscribe(&mut self, subscription: SubscriptionId) {
        self.subscribers.retain(|s| s.id != subscription);
    }

    fn update(&mut self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        let mut data = self.data.clone();
        existing_mut(&mut data, collection, id)?.extend(fields);
        self.commit(data, collection, id)
    }

    fn append_to_array_field(
        &mut self,
        collection: &str,
        id: &str,
        field: &str,
        value: Value,
    ) -> Result<(), StoreError> {
        let mut data = self.data.clone();
        let doc = existing_mut(&mut data, collection, id)?;
        let entry = doc.entry(field.to_string()).or_insert_with(|| Value::Array(Vec::new()));
        let Value::Array(items) = entry else {
            return Err(StoreError::NotAnArray {
                collection: collection.to_string(),
                id: id.to_string(),
                field: field.to_string(),
            });
        };
        if !items.contains(&value) {
            items.push(value);
        }
        self.commit(data, collection, id)
    }
}

fn existing_mut<'a>(
    data: &'a mut Collections,
    collection: &str,
    id: &str,
) -> Result<&'a mut Fields, StoreError> {
    data.collections
        .get_mut(collection)
        .and_then(|c| c.get_mut(id))
        .ok_or_else(|| StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        })
}

/// Build a field map from a JSON object literal. Non-objects yield an empty map.
pub fn fields_from(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}
