//! In-process backend for tests and throwaway runs

use super::{
    created_at_from_key, generate_key, BlobStore, ObjectPage, StoredObject, UploadsPath,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;

struct Entry {
    object: StoredObject,
    data: Vec<u8>,
}

/// Keeps objects in a map; nothing survives a restart
pub struct MemoryStore {
    layout: UploadsPath,
    entries: Mutex<BTreeMap<String, Entry>>,
    page_size: usize,
}

impl MemoryStore {
    pub fn new(public_base_url: &str) -> Self {
        Self {
            layout: UploadsPath::new(public_base_url),
            entries: Mutex::new(BTreeMap::new()),
            page_size: 100,
        }
    }

    /// Limit listing pages to `page_size` objects
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Seed an object with an explicit creation time
    pub fn insert(
        &self,
        filename: &str,
        data: Vec<u8>,
        content_type: &str,
        created_at: DateTime<Utc>,
    ) -> StoredObject {
        let key = format!(
            "{}-{}",
            created_at.timestamp_millis(),
            generate_key(filename)
                .split_once('-')
                .map(|(_, rest)| rest.to_string())
                .unwrap_or_default()
        );
        let object = StoredObject {
            url: self.layout.url_for(&key),
            key: key.clone(),
            content_type: content_type.to_string(),
            size: data.len() as u64,
            created_at,
        };
        self.entries.lock().insert(
            key,
            Entry {
                object: object.clone(),
                data,
            },
        );
        object
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn key_for(&self, url: &str) -> Result<String> {
        self.layout.key_for(url).ok_or_else(|| Error::NotFound {
            what: url.to_string(),
        })
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn put(
        &self,
        filename: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject> {
        let key = generate_key(filename);
        let object = StoredObject {
            url: self.layout.url_for(&key),
            created_at: created_at_from_key(&key).unwrap_or_else(Utc::now),
            key: key.clone(),
            content_type: content_type.to_string(),
            size: data.len() as u64,
        };
        self.entries.lock().insert(
            key,
            Entry {
                object: object.clone(),
                data,
            },
        );
        Ok(object)
    }

    fn owns(&self, url: &str) -> bool {
        self.layout.key_for(url).is_some()
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        let key = self.key_for(url)?;
        self.entries
            .lock()
            .get(&key)
            .map(|e| e.data.clone())
            .ok_or(Error::NotFound { what: key })
    }

    async fn delete(&self, url: &str) -> Result<()> {
        let key = self.key_for(url)?;
        match self.entries.lock().remove(&key) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound { what: key }),
        }
    }

    async fn list(&self, cursor: Option<&str>) -> Result<ObjectPage> {
        let entries = self.entries.lock();
        let mut iter: Box<dyn Iterator<Item = (&String, &Entry)> + '_> = match cursor {
            Some(after) => Box::new(
                entries
                    .range::<str, _>((
                        std::ops::Bound::Excluded(after),
                        std::ops::Bound::Unbounded,
                    )),
            ),
            None => Box::new(entries.iter()),
        };

        let objects: Vec<StoredObject> = iter
            .by_ref()
            .take(self.page_size)
            .map(|(_, e)| e.object.clone())
            .collect();
        let has_more = iter.next().is_some();
        let cursor = if has_more {
            objects.last().map(|o| o.key.clone())
        } else {
            None
        };

        Ok(ObjectPage { objects, cursor })
    }
}
