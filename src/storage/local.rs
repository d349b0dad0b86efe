//! Filesystem backend used in development

use super::{
    content_type_for, created_at_from_key, generate_key, BlobStore, ObjectPage, StoredObject,
    UploadsPath,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Stores objects as files in one directory, served under `/uploads`
pub struct LocalStore {
    root: PathBuf,
    layout: UploadsPath,
}

impl LocalStore {
    /// Create the store, creating `root` if needed
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            layout: UploadsPath::new(public_base_url),
        })
    }

    fn path_for_url(&self, url: &str) -> Result<(String, PathBuf)> {
        let key = self.layout.key_for(url).ok_or_else(|| Error::NotFound {
            what: url.to_string(),
        })?;
        let path = self.root.join(&key);
        Ok((key, path))
    }
}

#[async_trait]
impl BlobStore for LocalStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn put(
        &self,
        filename: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject> {
        let key = generate_key(filename);
        let path = self.root.join(&key);
        let size = data.len() as u64;

        tokio::fs::write(&path, data).await.map_err(|e| Error::Storage {
            reason: format!("write {}: {}", path.display(), e),
        })?;

        tracing::debug!(key = %key, size, "stored object on local disk");

        Ok(StoredObject {
            url: self.layout.url_for(&key),
            created_at: created_at_from_key(&key).unwrap_or_else(Utc::now),
            key,
            content_type: content_type.to_string(),
            size,
        })
    }

    fn owns(&self, url: &str) -> bool {
        self.layout.key_for(url).is_some()
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        let (key, path) = self.path_for_url(url)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound { what: key }),
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn delete(&self, url: &str) -> Result<()> {
        let (key, path) = self.path_for_url(url)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound { what: key }),
            Err(e) => Err(Error::Storage {
                reason: format!("delete {}: {}", key, e),
            }),
        }
    }

    async fn list(&self, _cursor: Option<&str>) -> Result<ObjectPage> {
        let mut objects = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            let key = entry.file_name().to_string_lossy().into_owned();
            if key.starts_with('.') {
                continue;
            }

            let created_at = created_at_from_key(&key)
                .or_else(|| metadata.modified().ok().map(DateTime::<Utc>::from))
                .unwrap_or_else(Utc::now);
            let extension = Path::new(&key)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default();

            objects.push(StoredObject {
                url: self.layout.url_for(&key),
                content_type: content_type_for(extension).to_string(),
                size: metadata.len(),
                created_at,
                key,
            });
        }

        objects.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(ObjectPage {
            objects,
            cursor: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "http://localhost:3001";

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path(), BASE).unwrap();

        let obj = store
            .put("hello.txt", b"hello".to_vec(), "text/plain")
            .await
            .unwrap();
        assert!(obj.url.starts_with("http://localhost:3001/uploads/"));
        assert!(obj.key.ends_with("-hello.txt"));
        assert_eq!(obj.size, 5);
        assert!(store.owns(&obj.url));

        let data = store.get(&obj.url).await.unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn test_delete_then_get_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path(), BASE).unwrap();
        let obj = store.put("a.bin", vec![1, 2, 3], "application/octet-stream").await.unwrap();

        store.delete(&obj.url).await.unwrap();
        assert!(matches!(store.get(&obj.url).await, Err(Error::NotFound { .. })));
        assert!(matches!(store.delete(&obj.url).await, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_traversal_url_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().join("uploads"), BASE).unwrap();
        std::fs::write(dir.path().join("secret.txt"), b"top secret").unwrap();

        let url = format!("{}/uploads/../secret.txt", BASE);
        assert!(!store.owns(&url));
        assert!(matches!(store.get(&url).await, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_list_reads_timestamp_from_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path(), BASE).unwrap();
        std::fs::write(dir.path().join("1000-abcdef12-old.pdf"), b"%PDF").unwrap();
        store.put("new.png", vec![0u8; 4], "image/png").await.unwrap();

        let page = store.list(None).await.unwrap();
        assert_eq!(page.objects.len(), 2);
        assert!(page.cursor.is_none());

        let old = &page.objects[0];
        assert_eq!(old.key, "1000-abcdef12-old.pdf");
        assert_eq!(old.created_at.timestamp_millis(), 1000);
        assert_eq!(old.content_type, "application/pdf");
    }
}
