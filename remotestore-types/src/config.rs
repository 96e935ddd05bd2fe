//! Connection configuration for the supported backends.
//!
//! A [`StorageConfig`] selects one backend and carries everything needed to talk to it. The
//! configuration is immutable once a client has been created from it; per-file and per-call
//! adjustments are expressed through [`Options`](crate::Options) instead.
//!
//! In YAML, the backend is selected with the `type` field:
//!
//! ```yaml
//! storage:
//!   type: gitlab
//!   endpoint: https://gitlab.example.com
//!   secret_access_key: glpat-xxxxxxxx
//!   bucket: group/repository
//!   project_id: "42"
//!   branch: main
//! ```

use std::fmt;

use secrecy::{CloneableSecret, ExposeSecret, SecretBox, SerializableSecret, zeroize::Zeroize};
use serde::{Deserialize, Serialize};
use url::Url;

/// The branch used by the GitLab backend when none is configured.
pub const DEFAULT_BRANCH: &str = "main";

/// Newtype around `String` that protects against accidental logging of credentials.
///
/// Use with [`secrecy::SecretBox`].
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigSecret(#[serde(deserialize_with = "lenient_string")] String);

impl ConfigSecret {
    /// Returns the secret as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for ConfigSecret {
    fn from(str: &str) -> Self {
        ConfigSecret(str.to_string())
    }
}

impl std::ops::Deref for ConfigSecret {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for ConfigSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "[redacted]")
    }
}

impl CloneableSecret for ConfigSecret {}
impl SerializableSecret for ConfigSecret {}
impl Zeroize for ConfigSecret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// A secret credential as stored in configuration.
pub type Secret = SecretBox<ConfigSecret>;

/// Creates a [`Secret`] from a plain string.
pub fn secret(value: &str) -> Secret {
    SecretBox::new(Box::new(ConfigSecret::from(value)))
}

/// Backend selection and connection settings.
///
/// The `type` field in YAML or `__TYPE` in environment variables determines which variant is used.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// An Alfresco content repository (type `"alfresco"`).
    Alfresco(AlfrescoConfig),
    /// A GitLab repository (type `"gitlab"`).
    Gitlab(GitlabConfig),
}

impl StorageConfig {
    /// The backend name, used for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            StorageConfig::Alfresco(_) => "alfresco",
            StorageConfig::Gitlab(_) => "gitlab",
        }
    }

    /// The base URL of the backend service.
    pub fn endpoint(&self) -> &Url {
        match self {
            StorageConfig::Alfresco(config) => &config.endpoint,
            StorageConfig::Gitlab(config) => &config.endpoint,
        }
    }

    /// The target collection.
    pub fn bucket(&self) -> &str {
        match self {
            StorageConfig::Alfresco(config) => &config.bucket,
            StorageConfig::Gitlab(config) => &config.bucket,
        }
    }
}

/// Connection settings for an Alfresco content repository.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AlfrescoConfig {
    /// Base URL of the versioned public API.
    ///
    /// Node and shared-link requests are issued relative to this URL, for example
    /// `https://alfresco.example.com/alfresco/api/-default-/public/alfresco/versions/1`.
    pub endpoint: Url,

    /// Base URL of the authentication API.
    ///
    /// Ticket requests go to `{auth_endpoint}/authentication/versions/1/tickets`. Defaults to
    /// [`endpoint`](Self::endpoint).
    #[serde(default)]
    pub auth_endpoint: Option<Url>,

    /// The user name exchanged for a ticket.
    #[serde(deserialize_with = "lenient_string")]
    pub access_key_id: String,

    /// The password exchanged for a ticket.
    pub secret_access_key: Secret,

    /// Folder below the user's home (`-my-`) that all paths are relative to.
    pub bucket: String,
}

impl AlfrescoConfig {
    /// Returns the base URL for authentication requests.
    pub fn auth_endpoint(&self) -> &Url {
        self.auth_endpoint.as_ref().unwrap_or(&self.endpoint)
    }

    /// Returns the password in plain text.
    pub fn password(&self) -> &str {
        self.secret_access_key.expose_secret().as_str()
    }
}

/// Connection settings for a GitLab repository.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GitlabConfig {
    /// Base URL of the GitLab instance, for example `https://gitlab.com`.
    pub endpoint: Url,

    /// The account name. GitLab authenticates with the token alone, so this is informational.
    #[serde(default, deserialize_with = "lenient_string")]
    pub access_key_id: String,

    /// A personal, project, or group access token sent as `PRIVATE-TOKEN`.
    pub secret_access_key: Secret,

    /// The namespaced repository path (`group/repository`), used for raw download links.
    pub bucket: String,

    /// The numeric project id or the namespaced path used by the API.
    #[serde(deserialize_with = "lenient_string")]
    pub project_id: String,

    /// The ref to read from and commit to.
    #[serde(default = "default_branch", deserialize_with = "lenient_string")]
    pub branch: String,
}

impl GitlabConfig {
    /// Returns the access token in plain text.
    pub fn token(&self) -> &str {
        self.secret_access_key.expose_secret().as_str()
    }
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_owned()
}

/// Deserializes a string, accepting integers as well.
///
/// Environment variables and unquoted YAML scalars like `42` arrive as numbers.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient {
        String(String),
        Unsigned(u64),
        Signed(i64),
    }

    Ok(match Lenient::deserialize(deserializer)? {
        Lenient::String(value) => value,
        Lenient::Unsigned(value) => value.to_string(),
        Lenient::Signed(value) => value.to_string(),
    })
}
