//! Implementation of the store commands.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use futures_util::TryStreamExt;
use remotestore_client::{ByteRange, Client, Options};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// A command that operates on a remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Prints the metadata of an object as JSON.
    Stat { path: String },
    /// Prints whether an object exists, failing if it does not.
    Exists { path: String },
    /// Prints the size of an object.
    Size { path: String },
    /// Prints a public download link.
    Presign {
        path: String,
        inline: bool,
        expires: Option<Duration>,
    },
    /// Writes the content of an object.
    Cat {
        path: String,
        range: Option<ByteRange>,
    },
    /// Uploads a local file, or stdin for `-`.
    Put {
        path: String,
        source: PathBuf,
        content_type: Option<String>,
        message: Option<String>,
    },
    /// Deletes an object.
    Rm {
        path: String,
        message: Option<String>,
    },
    /// Prints the version.
    Version,
}

/// Runs `command` against `client`, writing results to `out`.
///
/// Returns `false` if the command completed but reports a negative outcome, such as a missing
/// object for [`Command::Exists`].
pub async fn run<W>(client: &Client, command: Command, out: &mut W) -> Result<bool>
where
    W: AsyncWrite + Unpin,
{
    tracing::debug!(backend = client.backend_name(), ?command, "Running command");

    match command {
        Command::Stat { path } => {
            let file = client.file(path, &Options::new());
            let metadata = file.stat().await?;
            let mut json = serde_json::to_vec_pretty(metadata)?;
            json.push(b'\n');
            out.write_all(&json).await?;
        }
        Command::Exists { path } => {
            let exists = client.exists(&path, &Options::new()).await;
            let answer = if exists { "true\n" } else { "false\n" };
            out.write_all(answer.as_bytes()).await?;
            out.flush().await?;
            return Ok(exists);
        }
        Command::Size { path } => {
            let size = client.size(&path, &Options::new()).await?;
            out.write_all(format!("{size}\n").as_bytes()).await?;
        }
        Command::Presign {
            path,
            inline,
            expires,
        } => {
            let mut options = Options::new().with_inline(inline);
            options.expires_in = expires;
            let url = client.presign(&path, &options).await?;
            out.write_all(format!("{url}\n").as_bytes()).await?;
        }
        Command::Cat { path, range } => {
            let file = client.file(path, &Options::new());
            let file = match range {
                Some(ByteRange { start, end }) => file.slice(start, end, None),
                None => file,
            };

            let mut stream = file.stream().await?;
            while let Some(chunk) = stream.try_next().await? {
                out.write_all(&chunk).await?;
            }
        }
        Command::Put {
            path,
            source,
            content_type,
            message,
        } => {
            let payload = read_source(&source).await?;
            let mut options = Options::new();
            options.content_type = content_type;
            options.commit_message = message;

            let written = client.write(&path, payload, &options).await?;
            tracing::info!(%path, written, "Uploaded object");
            out.write_all(format!("{written}\n").as_bytes()).await?;
        }
        Command::Rm { path, message } => {
            let mut options = Options::new();
            options.commit_message = message;
            client.delete(&path, &options).await?;
            tracing::info!(%path, "Deleted object");
        }
        Command::Version => {
            out.write_all(concat!(env!("CARGO_PKG_VERSION"), "\n").as_bytes())
                .await?;
        }
    }

    out.flush().await?;
    Ok(true)
}

async fn read_source(source: &Path) -> Result<Bytes> {
    if source.as_os_str() == "-" {
        let mut buffer = Vec::new();
        tokio::io::stdin().read_to_end(&mut buffer).await?;
        return Ok(buffer.into());
    }

    Ok(tokio::fs::read(source).await?.into())
}
