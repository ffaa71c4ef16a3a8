use super::{BlobError, BlobObject, BlobPutRequest, BlobStore, LOCAL_BLOB_ROUTE, object_key, public_url, validate_key};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};
use url::Url;

/// Local filesystem blob store. Objects are served by this service at `/blobs/{key}`.
pub struct LocalBlobStore {
    base_path: PathBuf,
    public_base_url: Url,
}

impl LocalBlobStore {
    pub fn new(base_path: PathBuf, public_base_url: Url) -> Self {
        Self {
            base_path,
            public_base_url,
        }
    }

    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    #[instrument(skip(self, request), fields(name = %request.name, size = request.content.len()), err)]
    async fn put(&self, request: BlobPutRequest) -> Result<BlobObject, BlobError> {
        let key = object_key(&request.name);
        let full_path = self.base_path.join(&key);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&full_path).await?;
        file.write_all(&request.content).await?;
        file.sync_all().await?;

        let url = public_url(&self.public_base_url, &[LOCAL_BLOB_ROUTE.trim_start_matches('/')], &key)?;
        debug!(%key, "Stored blob on local disk");
        Ok(BlobObject { key, url })
    }

    #[instrument(skip(self), err)]
    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        validate_key(key)?;
        let full_path = self.base_path.join(key);

        match fs::remove_file(&full_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        // Drop the per-object directory once it is empty
        if let Some(parent) = full_path.parent()
            && parent != self.base_path
        {
            let _ = fs::remove_dir(parent).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> LocalBlobStore {
        LocalBlobStore::new(dir.path().to_path_buf(), Url::parse("http://localhost:3001").unwrap())
    }

    fn request(name: &str, content: &'static [u8]) -> BlobPutRequest {
        BlobPutRequest {
            name: name.to_string(),
            content: Bytes::from_static(content),
            content_type: "text/plain".to_string(),
        }
    }

    #[tokio::test]
    async fn test_put_writes_file_and_returns_url() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let object = store.put(request("notes.txt", b"hello")).await.unwrap();

        assert!(object.key.ends_with("/notes.txt"));
        assert_eq!(object.url, format!("http://localhost:3001/blobs/{}", object.key));
        let content = tokio::fs::read(dir.path().join(&object.key)).await.unwrap();
        assert_eq!(content, b"hello");
    }

    #[tokio::test]
    async fn test_same_name_twice_gives_two_objects() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let first = store.put(request("dup.txt", b"one")).await.unwrap();
        let second = store.put(request("dup.txt", b"two")).await.unwrap();

        assert_ne!(first.key, second.key);
        assert_eq!(tokio::fs::read(dir.path().join(&first.key)).await.unwrap(), b"one");
        assert_eq!(tokio::fs::read(dir.path().join(&second.key)).await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let object = store.put(request("gone.txt", b"bye")).await.unwrap();
        store.delete(&object.key).await.unwrap();
        assert!(!dir.path().join(&object.key).exists());

        store.delete(&object.key).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let result = store.delete("../outside.txt").await;
        assert!(matches!(result, Err(BlobError::InvalidKey(_))));
    }
}
