//! Command line access to remote stores.
//!
//! This builds on top of [`remotestore_client`] and exposes its operations as subcommands, with
//! configuration loaded from a YAML file and the environment.

pub mod cli;
pub mod commands;
pub mod config;
pub mod observability;
