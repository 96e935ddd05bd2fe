//! # Remotestore Client
//!
//! The client presents remote document stores through a small object-storage interface. It
//! supports [Alfresco] content repositories and [GitLab] repositories: paths are resolved against a
//! configured collection, metadata is normalized, and content is streamed in the format the caller
//! asks for.
//!
//! [Alfresco]: https://www.alfresco.com/
//! [GitLab]: https://gitlab.com/
//!
//! ## Usage
//!
//! ```no_run
//! use std::collections::HashMap;
//!
//! use remotestore_client::{Client, GitlabConfig, Options, StorageConfig};
//!
//! #[tokio::main]
//! # async fn main() -> remotestore_client::Result<()> {
//!     let config = StorageConfig::Gitlab(GitlabConfig {
//!         endpoint: "https://gitlab.example.com".parse().unwrap(),
//!         access_key_id: String::new(),
//!         secret_access_key: remotestore_client::secret("glpat-..."),
//!         bucket: "group/repo".into(),
//!         project_id: "42".into(),
//!         branch: "main".into(),
//!     });
//!     let client = Client::new(config)?;
//!
//!     client.write("reports/123.json", r#"{"a":1}"#, &Options::new()).await?;
//!
//!     let file = client.file("reports/123.json", &Options::new());
//!     let report: HashMap<String, u32> = file.json().await?;
//!     println!("{report:?}, {} bytes", file.size().await?);
//! # Ok(())
//! # }
//! ```
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod backend;
mod body;
mod client;
mod error;
mod file;
mod stream;

pub use remotestore_types::config::secret;
pub use remotestore_types::{
    AlfrescoConfig, ByteRange, GitlabConfig, Metadata, Options, StorageConfig,
};

pub use body::*;
pub use client::{Client, ClientBuilder};
pub use error::*;
pub use file::*;
pub use stream::PayloadStream;
