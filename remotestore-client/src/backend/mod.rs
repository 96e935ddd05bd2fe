//! Storage backends and the interface they implement.

use std::fmt::Debug;

use bytes::Bytes;
use remotestore_types::{Metadata, Options};
use url::Url;

use crate::Body;

mod alfresco;
mod gitlab;

pub use alfresco::Alfresco;
pub use gitlab::Gitlab;

/// A type-erased [`Backend`] instance.
pub type BoxedBackend = Box<dyn Backend>;

/// The object-storage capabilities every remote store has to provide.
///
/// Paths are always relative to the configured collection. Operations that need the backend-native
/// identifier of an object accept already `resolved` metadata; backends look it up themselves when
/// it is missing.
#[async_trait::async_trait]
pub trait Backend: Debug + Send + Sync + 'static {
    /// The backend name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Returns `true` if content reads address objects by identifier rather than by path.
    ///
    /// File handles resolve and cache their metadata before reading from such backends.
    fn reads_by_id(&self) -> bool {
        false
    }

    /// Looks up the metadata of the object at `path`.
    async fn stat(&self, path: &str, options: &Options) -> crate::Result<Metadata>;

    /// Opens a streamed read of the object's content.
    async fn read(
        &self,
        path: &str,
        resolved: Option<&Metadata>,
        options: &Options,
    ) -> crate::Result<Body>;

    /// Stores `payload` at `path`, returning the number of bytes written.
    async fn write(&self, path: &str, payload: Bytes, options: &Options) -> crate::Result<u64>;

    /// Deletes the object at `path`.
    async fn delete(
        &self,
        path: &str,
        resolved: Option<&Metadata>,
        options: &Options,
    ) -> crate::Result<()>;

    /// Creates a public download link for the object at `path`.
    async fn presign(&self, path: &str, options: &Options) -> crate::Result<Url>;
}

/// Appends `segments` to the path of `base`, percent-encoding each segment.
///
/// Segments may not contain separators of their own: a `/` within a segment is encoded as `%2F`.
pub(crate) fn api_url<'a, I>(base: &Url, segments: I) -> crate::Result<Url>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| crate::Error::InvalidUrl {
            message: format!("cannot use `{base}` as base URL"),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
