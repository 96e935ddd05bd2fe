use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use argh::FromArgs;
use remotestore_client::{ByteRange, Client};

use crate::commands::{self, Command};
use crate::config::Config;
use crate::observability;

/// Inspect and modify objects in an Alfresco or GitLab remote store.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    #[argh(subcommand)]
    pub command: Subcommand,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Subcommand {
    Stat(StatCommand),
    Exists(ExistsCommand),
    Size(SizeCommand),
    Presign(PresignCommand),
    Cat(CatCommand),
    Put(PutCommand),
    Rm(RmCommand),
    Version(VersionCommand),
}

/// print the metadata of an object as JSON
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "stat")]
struct StatCommand {
    /// object path, relative to the configured bucket
    #[argh(positional)]
    path: String,
}

/// check whether an object exists
///
/// Exits with status 1 if the object does not exist.
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "exists")]
struct ExistsCommand {
    /// object path, relative to the configured bucket
    #[argh(positional)]
    path: String,
}

/// print the size of an object in bytes
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "size")]
struct SizeCommand {
    /// object path, relative to the configured bucket
    #[argh(positional)]
    path: String,
}

/// print a public download link for an object
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "presign")]
struct PresignCommand {
    /// object path, relative to the configured bucket
    #[argh(positional)]
    path: String,

    /// display the content in the browser instead of downloading it
    #[argh(switch)]
    inline: bool,

    /// lifetime of the link, for example `1h` or `7days` (Alfresco only)
    #[argh(option, from_str_fn(parse_duration))]
    expires: Option<Duration>,
}

/// write the content of an object to stdout
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "cat")]
struct CatCommand {
    /// object path, relative to the configured bucket
    #[argh(positional)]
    path: String,

    /// byte range to read, as `start-end` (end exclusive) or `start-`
    #[argh(option, from_str_fn(parse_range))]
    range: Option<ByteRange>,
}

/// upload a local file as an object
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "put")]
struct PutCommand {
    /// object path, relative to the configured bucket
    #[argh(positional)]
    path: String,

    /// local file to upload, or `-` for stdin
    #[argh(positional)]
    source: PathBuf,

    /// content type of the uploaded object
    #[argh(option)]
    content_type: Option<String>,

    /// commit message (GitLab only)
    #[argh(option, short = 'm')]
    message: Option<String>,
}

/// delete an object
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "rm")]
struct RmCommand {
    /// object path, relative to the configured bucket
    #[argh(positional)]
    path: String,

    /// commit message (GitLab only)
    #[argh(option, short = 'm')]
    message: Option<String>,
}

/// print the remotestore version
#[derive(Default, Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCommand {}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}

fn parse_range(value: &str) -> Result<ByteRange, String> {
    let invalid = || format!("invalid range {value:?}, expected `start-end` or `start-`");

    let (start, end) = value.split_once('-').ok_or_else(invalid)?;
    let start = start.trim().parse().map_err(|_| invalid())?;
    let end = match end.trim() {
        "" => None,
        end => Some(end.parse().map_err(|_| invalid())?),
    };

    Ok(ByteRange::new(start, end))
}

impl From<Subcommand> for Command {
    fn from(subcommand: Subcommand) -> Self {
        match subcommand {
            Subcommand::Stat(StatCommand { path }) => Command::Stat { path },
            Subcommand::Exists(ExistsCommand { path }) => Command::Exists { path },
            Subcommand::Size(SizeCommand { path }) => Command::Size { path },
            Subcommand::Presign(PresignCommand {
                path,
                inline,
                expires,
            }) => Command::Presign {
                path,
                inline,
                expires,
            },
            Subcommand::Cat(CatCommand { path, range }) => Command::Cat { path, range },
            Subcommand::Put(PutCommand {
                path,
                source,
                content_type,
                message,
            }) => Command::Put {
                path,
                source,
                content_type,
                message,
            },
            Subcommand::Rm(RmCommand { path, message }) => Command::Rm { path, message },
            Subcommand::Version(VersionCommand {}) => Command::Version,
        }
    }
}

/// Bootstrap the runtime and execute the CLI command.
pub fn execute() -> Result<ExitCode> {
    let args: Args = argh::from_env();

    // Special switch to just print the version and exit.
    if let Subcommand::Version(_) = args.command {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(ExitCode::SUCCESS);
    }

    let config = Config::load(args.config.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("main-rt")
        .enable_all()
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(&config.logging);
    tracing::debug!(?config);

    let storage = config
        .storage
        .context("no storage configured, set `storage` in the config file or REMOTESTORE__STORAGE__*")?;
    let mut builder = Client::builder(storage);
    if let Some(secs) = config.timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    let client = builder.build()?;

    let command = Command::from(args.command);
    let success = runtime.block_on(async move {
        let mut stdout = tokio::io::stdout();
        commands::run(&client, command, &mut stdout).await
    })?;

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
