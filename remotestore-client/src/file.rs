use std::sync::Arc;

use bytes::Bytes;
use remotestore_types::{ByteRange, Metadata, Options};
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;
use url::Url;

use crate::stream::PayloadStream;
use crate::{Blob, Body, Client, FormData};

/// A handle to a single object in a remote store.
///
/// Handles are created with [`Client::file`] and do not access the store until an operation is
/// called. The first successful [`stat`](Self::stat) is cached for the lifetime of the handle and
/// is never refreshed, even if the object changes remotely. Create a new handle to observe changes.
///
/// Cloning a handle is cheap, and clones share the cached metadata.
#[derive(Debug, Clone)]
pub struct File {
    client: Client,
    path: String,
    options: Options,
    metadata: Arc<OnceCell<Metadata>>,
}

impl File {
    pub(crate) fn new(client: Client, path: String, options: Options) -> Self {
        Self {
            client,
            path,
            options,
            metadata: Arc::default(),
        }
    }

    /// The path of the object, relative to the collection.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The options every operation on this handle starts from.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Returns the cached metadata, if [`stat`](Self::stat) has already succeeded.
    pub fn cached_metadata(&self) -> Option<&Metadata> {
        self.metadata.get()
    }

    /// Looks up the metadata of the object, or returns the cached metadata.
    pub async fn stat(&self) -> crate::Result<&Metadata> {
        self.metadata
            .get_or_try_init(|| self.client.backend().stat(&self.path, &self.options))
            .await
    }

    /// Returns `true` if the object exists.
    ///
    /// Any failure to look up the object counts as not existing.
    pub async fn exists(&self) -> bool {
        crate::client::exists(self.stat().await.cloned())
    }

    /// Returns the size of the object in bytes.
    pub async fn size(&self) -> crate::Result<u64> {
        Ok(self.stat().await?.size)
    }

    /// Opens a streamed read of the object's content.
    ///
    /// Every call issues a new request. Reads are restricted to the handle's byte range, if any.
    pub async fn reader(&self) -> crate::Result<Body> {
        if let Some(range) = self.options.range
            && range.is_empty()
        {
            return Ok(Body::empty(self.options.content_type.clone()));
        }

        let backend = self.client.backend();
        let resolved = if backend.reads_by_id() {
            Some(self.stat().await?)
        } else {
            self.metadata.get()
        };

        backend.read(&self.path, resolved, &self.options).await
    }

    /// Returns the content as a stream of chunks.
    pub async fn stream(&self) -> crate::Result<PayloadStream> {
        Ok(self.reader().await?.into_stream())
    }

    /// Reads the content as UTF-8 text.
    pub async fn text(&self) -> crate::Result<String> {
        self.reader().await?.text().await
    }

    /// Reads the content and deserializes it from JSON.
    pub async fn json<T: DeserializeOwned>(&self) -> crate::Result<T> {
        self.reader().await?.json().await
    }

    /// Reads the content into memory.
    pub async fn bytes(&self) -> crate::Result<Bytes> {
        self.reader().await?.bytes().await
    }

    /// Reads the content into memory together with its content type.
    pub async fn blob(&self) -> crate::Result<Blob> {
        self.reader().await?.blob().await
    }

    /// Reads the content as form data.
    pub async fn form_data(&self) -> crate::Result<FormData> {
        self.reader().await?.form_data().await
    }

    /// Reads the content into an owned buffer.
    pub async fn buffer(&self) -> crate::Result<Vec<u8>> {
        self.reader().await?.buffer().await
    }

    /// Creates a public download link for the object.
    pub async fn presign(&self, options: &Options) -> crate::Result<Url> {
        let options = self.options.merge(options);
        self.client.backend().presign(&self.path, &options).await
    }

    /// Stores `data` as the object's content and returns the number of bytes written.
    ///
    /// The cached metadata of this handle is not updated.
    pub async fn write(&self, data: impl Into<Bytes>, options: &Options) -> crate::Result<u64> {
        let options = self.options.merge(options);
        self.client
            .backend()
            .write(&self.path, data.into(), &options)
            .await
    }

    /// Returns a handle that reads the bytes from `start` up to, but excluding, `end`.
    ///
    /// Offsets are relative to this handle's range, so slicing a slice narrows it further. The new
    /// handle starts out with the metadata cached by this one.
    pub fn slice(&self, start: u64, end: Option<u64>, content_type: Option<&str>) -> File {
        let range = match self.options.range {
            Some(parent) => parent.slice(start, end),
            None => ByteRange::new(start, end),
        };
        let mut options = self.options.clone().with_range(range);
        if let Some(content_type) = content_type {
            options = options.with_content_type(content_type);
        }

        File {
            client: self.client.clone(),
            path: self.path.clone(),
            options,
            metadata: Arc::new(OnceCell::new_with(self.metadata.get().cloned())),
        }
    }

    /// Deletes the object.
    pub async fn delete(&self) -> crate::Result<()> {
        self.client
            .backend()
            .delete(&self.path, self.metadata.get(), &self.options)
            .await
    }

    /// Deletes the object. Alias of [`delete`](Self::delete).
    pub async fn unlink(&self) -> crate::Result<()> {
        self.delete().await
    }
}
