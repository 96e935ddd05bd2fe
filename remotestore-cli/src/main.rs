//! The `remotestore` command line tool.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

use std::process::ExitCode;

use anyhow::Result;

fn main() -> Result<ExitCode> {
    remotestore_cli::cli::execute()
}
