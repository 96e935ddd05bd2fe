use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use remotestore_types::{Metadata, Options, StorageConfig};
use url::Url;

use crate::File;
use crate::backend::{Alfresco, BoxedBackend, Gitlab};

const USER_AGENT: &str = concat!("remotestore-client/", env!("CARGO_PKG_VERSION"));

/// Builder to create a [`Client`].
#[must_use]
#[derive(Debug)]
pub struct ClientBuilder {
    config: StorageConfig,
    defaults: Options,
    reqwest_builder: reqwest::ClientBuilder,
}

impl ClientBuilder {
    /// Creates a new [`ClientBuilder`] for the remote store described by `config`.
    pub fn new(config: StorageConfig) -> Self {
        // No timeouts by default: reads of large documents may stream for a long time.
        let reqwest_builder = reqwest::Client::builder().user_agent(USER_AGENT);

        Self {
            config,
            defaults: Options::default(),
            reqwest_builder,
        }
    }

    /// Sets both the connect and the read timeout for the [`reqwest::Client`].
    /// For more fine-grained configuration, use [`Self::configure_reqwest`].
    pub fn timeout(self, timeout: Duration) -> Self {
        Self {
            reqwest_builder: self
                .reqwest_builder
                .connect_timeout(timeout)
                .read_timeout(timeout),
            ..self
        }
    }

    /// Sets options that apply to every operation of the client.
    ///
    /// Options passed to individual operations or file handles take precedence.
    pub fn default_options(self, defaults: Options) -> Self {
        Self { defaults, ..self }
    }

    /// Calls the closure with the underlying [`reqwest::ClientBuilder`].
    pub fn configure_reqwest<F>(self, closure: F) -> Self
    where
        F: FnOnce(reqwest::ClientBuilder) -> reqwest::ClientBuilder,
    {
        Self {
            reqwest_builder: closure(self.reqwest_builder),
            ..self
        }
    }

    /// Returns a [`Client`] that uses this [`ClientBuilder`] configuration.
    ///
    /// # Errors
    ///
    /// This method fails if the [`reqwest::Client`] fails to build. Refer to
    /// [`reqwest::ClientBuilder::build`] for more information on when this can happen.
    pub fn build(self) -> crate::Result<Client> {
        let reqwest = self.reqwest_builder.build()?;
        tracing::debug!(
            backend = self.config.name(),
            endpoint = %self.config.endpoint(),
            "Creating remote store client"
        );

        let backend: BoxedBackend = match self.config {
            StorageConfig::Alfresco(config) => Box::new(Alfresco::new(reqwest, config)),
            StorageConfig::Gitlab(config) => Box::new(Gitlab::new(reqwest, config)),
        };

        Ok(Client {
            inner: Arc::new(ClientInner {
                backend,
                defaults: self.defaults,
            }),
        })
    }
}

#[derive(Debug)]
struct ClientInner {
    backend: BoxedBackend,
    defaults: Options,
}

/// A client for one remote store.
///
/// The client presents Alfresco and GitLab through the same object-storage operations. It is cheap
/// to clone: clones and all [`File`] handles created from it share the same connection pool and,
/// for Alfresco, the same authentication ticket.
#[derive(Debug, Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Convenience function to create a [`ClientBuilder`].
    pub fn builder(config: StorageConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// Creates a client with the default configuration.
    pub fn new(config: StorageConfig) -> crate::Result<Self> {
        ClientBuilder::new(config).build()
    }

    /// The name of the backend this client talks to.
    pub fn backend_name(&self) -> &'static str {
        self.inner.backend.name()
    }

    fn options(&self, options: &Options) -> Options {
        self.inner.defaults.merge(options)
    }

    pub(crate) fn backend(&self) -> &BoxedBackend {
        &self.inner.backend
    }

    /// Returns a handle to the object at `path`.
    ///
    /// This does not access the remote store. The handle keeps a snapshot of the client's default
    /// options merged with `options`.
    pub fn file(&self, path: impl Into<String>, options: &Options) -> File {
        File::new(self.clone(), path.into(), self.options(options))
    }

    /// Looks up the metadata of the object at `path`.
    pub async fn stat(&self, path: &str, options: &Options) -> crate::Result<Metadata> {
        self.backend().stat(path, &self.options(options)).await
    }

    /// Returns `true` if an object exists at `path`.
    ///
    /// Any failure to look up the object, including network errors, counts as not existing.
    pub async fn exists(&self, path: &str, options: &Options) -> bool {
        exists(self.stat(path, options).await)
    }

    /// Returns the size of the object at `path` in bytes.
    pub async fn size(&self, path: &str, options: &Options) -> crate::Result<u64> {
        Ok(self.stat(path, options).await?.size)
    }

    /// Creates a public download link for the object at `path`.
    pub async fn presign(&self, path: &str, options: &Options) -> crate::Result<Url> {
        self.backend().presign(path, &self.options(options)).await
    }

    /// Stores `data` at `path` and returns the number of bytes written.
    pub async fn write(
        &self,
        path: &str,
        data: impl Into<Bytes>,
        options: &Options,
    ) -> crate::Result<u64> {
        self.backend()
            .write(path, data.into(), &self.options(options))
            .await
    }

    /// Deletes the object at `path`.
    pub async fn delete(&self, path: &str, options: &Options) -> crate::Result<()> {
        self.backend()
            .delete(path, None, &self.options(options))
            .await
    }
}

/// Applies the existence policy to the outcome of a stat.
pub(crate) fn exists(stat: crate::Result<Metadata>) -> bool {
    match stat {
        Ok(metadata) => metadata.is_object(),
        Err(error) => {
            tracing::debug!(%error, "Treating failed lookup as missing object");
            false
        }
    }
}
