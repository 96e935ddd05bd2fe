//! Normalized object metadata.

use std::collections::BTreeMap;

use serde::Serialize;

/// Metadata of a remote object, normalized across backends.
///
/// Backends translate their native metadata responses into this shape. Fields that a backend
/// reports but that have no normalized counterpart end up in [`extra`](Self::extra).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    /// The backend-native identifier of the object.
    ///
    /// This is the node id on Alfresco and the blob id on GitLab.
    pub id: String,

    /// The backend-native object type, such as `cm:content` or `blob`.
    pub kind: String,

    /// Size of the object's content in bytes.
    pub size: u64,

    /// Last modification timestamp as reported by the backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,

    /// MIME type of the content, if the backend reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Additional backend-specific fields.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl Metadata {
    /// Returns `true` if this metadata describes an existing object.
    ///
    /// An object exists if the backend reported a non-empty type for it.
    pub fn is_object(&self) -> bool {
        !self.kind.is_empty()
    }
}
