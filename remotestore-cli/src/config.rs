//! Configuration for the remotestore command line tool.
//!
//! Configuration can be loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Environment variables (prefixed with `REMOTESTORE__`)
//! 2. YAML configuration file (specified via `-c` or `--config` flag)
//! 3. Defaults
//!
//! See [`Config`] for a description of all configuration fields and their defaults.
//!
//! # Environment Variables
//!
//! Environment variables use `REMOTESTORE__` as a prefix and double underscores (`__`) to denote
//! nested configuration structures. For example:
//!
//! - `REMOTESTORE__STORAGE__TYPE=gitlab` selects the GitLab backend
//! - `REMOTESTORE__STORAGE__ENDPOINT=https://gitlab.example.com` sets its URL
//! - `REMOTESTORE__LOGGING__LEVEL=debug` raises the log verbosity
//!
//! # YAML Configuration File
//!
//! The above configuration in YAML format would look like this:
//!
//! ```yaml
//! storage:
//!   type: gitlab
//!   endpoint: https://gitlab.example.com
//!   secret_access_key: glpat-xxxxxxxx
//!   bucket: group/repository
//!   project_id: 42
//!
//! logging:
//!   level: debug
//! ```

use std::fmt;
use std::path::Path;

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Yaml};
use remotestore_client::StorageConfig;
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "REMOTESTORE__";

/// Log output format.
///
/// Controls how log messages are formatted. The format can be explicitly specified or
/// auto-detected based on whether output is to a TTY.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    ///
    /// ```text
    ///  INFO remotestore_client: Created remote store client backend="gitlab"
    /// ```
    Pretty,

    /// Simplified plain text output.
    ///
    /// ```text
    /// 2024-12-04T12:10:32Z  INFO remotestore_client: Created remote store client backend="gitlab"
    /// ```
    Simplified,

    /// Dump out JSON lines.
    ///
    /// ```text
    /// {"timestamp":"2024-12-04T12:11:08.729716Z","level":"INFO","message":"Created remote store client","backend":"gitlab","target":"remotestore_client"}
    /// ```
    Json,
}

/// The logging format parse error.
#[derive(Clone, Debug)]
pub struct FormatParseError(String);

impl fmt::Display for FormatParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"error parsing "{}" as format: expected one of "auto", "pretty", "simplified", "json""#,
            self.0
        )
    }
}

impl std::str::FromStr for LogFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let result = match s {
            "" => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("auto") => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            s if s.eq_ignore_ascii_case("simplified") => LogFormat::Simplified,
            s if s.eq_ignore_ascii_case("json") => LogFormat::Json,
            s => return Err(FormatParseError(s.into())),
        };

        Ok(result)
    }
}

impl std::error::Error for FormatParseError {}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration.
///
/// Controls the verbosity and format of log output. Logs are always written to stderr, so they
/// never mix with command output.
#[derive(Debug, Deserialize, Serialize)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// Valid levels in increasing severity: TRACE, DEBUG, INFO, WARN, ERROR, OFF. The `RUST_LOG`
    /// environment variable provides more granular control per module if needed.
    ///
    /// # Default
    ///
    /// `WARN`
    ///
    /// # Environment Variable
    ///
    /// `REMOTESTORE__LOGGING__LEVEL`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format.
    ///
    /// See [`LogFormat`] for available options and examples.
    ///
    /// # Default
    ///
    /// `Auto` (pretty for TTY, simplified otherwise)
    ///
    /// # Environment Variable
    ///
    /// `REMOTESTORE__LOGGING__FORMAT`
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::WARN,
            format: LogFormat::Auto,
        }
    }
}

/// Main configuration struct for the remotestore command line tool.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// The remote store to operate on.
    ///
    /// See [`StorageConfig`] for the fields of each backend. Commands that access the store fail
    /// if this is not configured.
    ///
    /// # Environment Variables
    ///
    /// - `REMOTESTORE__STORAGE__TYPE=alfresco`
    /// - `REMOTESTORE__STORAGE__ENDPOINT=https://alfresco.example.com/alfresco/api/-default-/public/alfresco/versions/1`
    /// - `REMOTESTORE__STORAGE__ACCESS_KEY_ID=admin`
    /// - `REMOTESTORE__STORAGE__SECRET_ACCESS_KEY=...`
    /// - `REMOTESTORE__STORAGE__BUCKET=Sites/docs`
    pub storage: Option<StorageConfig>,

    /// Timeout in seconds for connecting and for each read from the network.
    ///
    /// # Default
    ///
    /// `None` (no timeout)
    ///
    /// # Environment Variable
    ///
    /// `REMOTESTORE__TIMEOUT_SECS`
    pub timeout_secs: Option<u64>,

    /// Logging configuration.
    pub logging: Logging,
}

impl Config {
    /// Loads configuration from the provided arguments.
    ///
    /// Configuration is merged in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. YAML configuration file (if provided in `args`)
    /// 3. Environment variables (prefixed with `REMOTESTORE__`)
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The YAML configuration file cannot be read or parsed
    /// - Environment variables contain invalid values
    /// - Required fields are missing or invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }
}
