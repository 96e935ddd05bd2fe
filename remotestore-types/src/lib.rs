//! Shared types for remotestore.
//!
//! This crate contains the connection configuration of every supported backend, the per-call
//! [`Options`](options::Options) that can override it, and the normalized object
//! [`Metadata`](metadata::Metadata) that all backends translate their native responses into.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod config;
pub mod metadata;
pub mod options;
pub mod path;

pub use config::{AlfrescoConfig, ConfigSecret, GitlabConfig, StorageConfig};
pub use metadata::Metadata;
pub use options::{ByteRange, Options};
