//! Test utilities for remotestore and its clients.
//!
//! This crate provides in-process fakes of the remote stores the client talks to, so that
//! integration tests can run without network access. See the modules for all available utilities.

pub mod alfresco;
pub mod gitlab;
pub mod server;
pub mod tracing;
