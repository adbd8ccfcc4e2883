use futures::io::{AsyncReadExt, AsyncWriteExt};
use mongodb::gridfs::GridFsBucket;
use mongodb::Database;

use crate::error::{PersistError, Result};

/// GridFS-backed blob store for generated images, namespaced per thread.
#[derive(Clone)]
pub struct ImageStore {
    bucket: GridFsBucket,
}

impl ImageStore {
    pub fn new(db: &Database) -> Self {
        Self {
            bucket: db.gridfs_bucket(None),
        }
    }

    fn blob_name(thread_id: &str, filename: &str) -> String {
        format!("{}/{}", thread_id, filename)
    }

    pub async fn upload(&self, thread_id: &str, filename: &str, bytes: &[u8]) -> Result<()> {
        let mut stream = self
            .bucket
            .open_upload_stream(Self::blob_name(thread_id, filename))
            .await?;

        stream
            .write_all(bytes)
            .await
            .map_err(|e| PersistError::Storage(format!("image upload failed: {e}")))?;
        stream
            .close()
            .await
            .map_err(|e| PersistError::Storage(format!("image upload failed: {e}")))?;

        Ok(())
    }

    /// App-relative retrieval URL served by the API's image route.
    pub fn url_for(&self, thread_id: &str, filename: &str) -> String {
        format!("/threads/{}/images/{}", thread_id, filename)
    }

    pub async fn download(&self, thread_id: &str, filename: &str) -> Result<Vec<u8>> {
        let mut stream = self
            .bucket
            .open_download_stream_by_name(Self::blob_name(thread_id, filename))
            .await?;

        let mut bytes = Vec::new();
        stream
            .read_to_end(&mut bytes)
            .await
            .map_err(|e| PersistError::Storage(format!("image download failed: {e}")))?;

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_names_are_namespaced_by_thread() {
        assert_eq!(
            ImageStore::blob_name("thread-1", "img.png"),
            "thread-1/img.png"
        );
    }
}
