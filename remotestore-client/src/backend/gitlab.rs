use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use data_encoding::BASE64;
use remotestore_types::{GitlabConfig, Metadata, Options, path};
use reqwest::header::{HeaderMap, LAST_MODIFIED, RANGE};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::backend::{Backend, api_url};
use crate::{Body, Error};

/// Header carrying the access token.
const PRIVATE_TOKEN: &str = "private-token";

/// Prefix of the response headers that describe a repository file.
const HEADER_PREFIX: &str = "x-gitlab-";

/// Commit message used for writes and deletes unless overridden.
const DEFAULT_COMMIT_MESSAGE: &str = "Update file via remotestore";

/// The object type reported for repository files.
const BLOB_KIND: &str = "blob";

/// Content type that is never displayed inline.
const OCTET_STREAM: &str = "application/octet-stream";

/// A [GitLab] repository, accessed through the repository files API.
///
/// Objects are files on the configured branch. Every write and delete creates a commit.
///
/// [GitLab]: https://docs.gitlab.com/ee/api/repository_files.html
pub struct Gitlab {
    client: reqwest::Client,
    config: GitlabConfig,
}

impl Gitlab {
    /// Creates a new GitLab backend that sends requests through `client`.
    pub fn new(client: reqwest::Client, config: GitlabConfig) -> Self {
        Self { client, config }
    }

    fn branch<'a>(&'a self, options: &'a Options) -> &'a str {
        options.branch.as_deref().unwrap_or(&self.config.branch)
    }

    fn commit_message<'a>(&self, options: &'a Options) -> &'a str {
        options
            .commit_message
            .as_deref()
            .unwrap_or(DEFAULT_COMMIT_MESSAGE)
    }

    /// Returns the API URL of the file at `path`, optionally with a sub-resource appended.
    fn file_url(&self, path: &str, resource: Option<&str>) -> crate::Result<Url> {
        let path = file_path(path)?;
        let segments = [
            "api",
            "v4",
            "projects",
            self.config.project_id.as_str(),
            "repository",
            "files",
            path.as_str(),
        ];
        api_url(&self.config.endpoint, segments.into_iter().chain(resource))
    }

    fn request(
        &self,
        method: reqwest::Method,
        url: Url,
        options: &Options,
    ) -> RequestBuilder {
        self.client
            .request(method, url)
            .query(&[("ref", self.branch(options))])
            .header(PRIVATE_TOKEN, self.config.token())
    }
}

impl fmt::Debug for Gitlab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gitlab")
            .field("endpoint", &self.config.endpoint.as_str())
            .field("project_id", &self.config.project_id)
            .field("branch", &self.config.branch)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Backend for Gitlab {
    fn name(&self) -> &'static str {
        "gitlab"
    }

    #[tracing::instrument(level = "trace", fields(?path), skip_all)]
    async fn stat(&self, path: &str, options: &Options) -> crate::Result<Metadata> {
        tracing::debug!("Reading file headers");

        let url = self.file_url(path, None)?;
        let response = self
            .request(reqwest::Method::HEAD, url, options)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, path).await);
        }

        metadata_from_headers(response.headers())
    }

    #[tracing::instrument(level = "trace", fields(?path), skip_all)]
    async fn read(
        &self,
        path: &str,
        _resolved: Option<&Metadata>,
        options: &Options,
    ) -> crate::Result<Body> {
        tracing::debug!("Reading raw file");

        let url = self.file_url(path, Some("raw"))?;
        let mut request = self.request(reqwest::Method::GET, url, options);
        let range = options.range.as_ref().and_then(|range| range.to_header());
        if let Some(ref range) = range {
            request = request.header(RANGE, range);
        }

        let response = request.send().await?;
        if range.is_some() && response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
            return Ok(Body::empty(options.content_type.clone()));
        }
        if !response.status().is_success() {
            return Err(error_from_response(response, path).await);
        }

        Ok(Body::from_response(response, options.content_type.clone()))
    }

    #[tracing::instrument(level = "trace", fields(?path), skip_all)]
    async fn write(&self, path: &str, payload: Bytes, options: &Options) -> crate::Result<u64> {
        tracing::debug!("Committing file");

        let length = payload.len() as u64;
        let form = Form::new()
            .text("commit_message", self.commit_message(options).to_owned())
            .text("branch", self.branch(options).to_owned());

        // Text is committed as is, anything else has to travel base64-encoded.
        let form = if std::str::from_utf8(&payload).is_ok() {
            form.part("content", Part::stream_with_length(payload, length))
        } else {
            form.text("content", BASE64.encode(&payload))
                .text("encoding", "base64")
        };

        let url = self.file_url(path, None)?;
        let response = self
            .client
            .post(url)
            .header(PRIVATE_TOKEN, self.config.token())
            .multipart(form)
            .send()
            .await?;

        if response.status() != StatusCode::CREATED {
            return Err(error_from_response(response, path).await);
        }

        Ok(length)
    }

    #[tracing::instrument(level = "trace", fields(?path), skip_all)]
    async fn delete(
        &self,
        path: &str,
        _resolved: Option<&Metadata>,
        options: &Options,
    ) -> crate::Result<()> {
        tracing::debug!("Deleting file");

        let url = self.file_url(path, None)?;
        let response = self
            .client
            .delete(url)
            .query(&[
                ("branch", self.branch(options)),
                ("commit_message", self.commit_message(options)),
            ])
            .header(PRIVATE_TOKEN, self.config.token())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, path).await);
        }

        Ok(())
    }

    async fn presign(&self, path: &str, options: &Options) -> crate::Result<Url> {
        let path = file_path(path)?;
        let bucket = path::normalize(options.bucket.as_deref().unwrap_or(&self.config.bucket));
        let branch = self.branch(options);

        let segments = bucket
            .split('/')
            .filter(|segment| !segment.is_empty())
            .chain(["-", "raw"])
            .chain(branch.split('/'))
            .chain(path.split('/'));
        let mut url = api_url(&self.config.endpoint, segments)?;

        let forced_download = options.content_type.as_deref() == Some(OCTET_STREAM);
        let inline = options.inline.unwrap_or(true) && !forced_download;
        url.query_pairs_mut()
            .append_pair("inline", if inline { "true" } else { "false" });

        Ok(url)
    }
}

/// Normalizes `path` into a repository file path.
fn file_path(path: &str) -> crate::Result<String> {
    let normalized = path::normalize(path);
    if normalized.is_empty() {
        return Err(Error::InvalidPath {
            path: path.to_owned(),
        });
    }
    Ok(normalized)
}

/// Builds metadata from the `x-gitlab-*` headers of a file response.
fn metadata_from_headers(headers: &HeaderMap) -> crate::Result<Metadata> {
    let mut extra = BTreeMap::new();
    for (name, value) in headers {
        if let Some(field) = name.as_str().strip_prefix(HEADER_PREFIX)
            && let Ok(value) = value.to_str()
        {
            extra.insert(field.to_owned(), value.to_owned());
        }
    }

    let size = extra.remove("size").ok_or(Error::MissingHeader {
        header: "x-gitlab-size",
    })?;
    let size = size.trim().parse().map_err(|_| Error::InvalidHeader {
        header: "x-gitlab-size",
    })?;
    let id = extra.remove("blob-id").ok_or(Error::MissingHeader {
        header: "x-gitlab-blob-id",
    })?;

    let last_modified = headers
        .get(LAST_MODIFIED)
        .and_then(|value| value.to_str().ok())
        .map(String::from);

    Ok(Metadata {
        id,
        kind: BLOB_KIND.to_owned(),
        size,
        last_modified,
        content_type: None,
        extra,
    })
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: Option<serde_json::Value>,
    error: Option<String>,
}

async fn error_from_response(response: Response, path: &str) -> Error {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Error::NotFound {
            path: path::normalize(path),
        };
    }

    let body = match response.bytes().await {
        Ok(body) => body,
        Err(error) => return error.into(),
    };

    let message = match serde_json::from_slice::<ErrorResponse>(&body) {
        Ok(ErrorResponse {
            message: Some(serde_json::Value::String(message)),
            ..
        }) => message,
        Ok(ErrorResponse {
            message: Some(message),
            ..
        }) => message.to_string(),
        Ok(ErrorResponse {
            error: Some(error), ..
        }) => error,
        _ if body.is_empty() => status.canonical_reason().unwrap_or_default().to_owned(),
        _ => String::from_utf8_lossy(&body).into_owned(),
    };

    Error::Backend {
        backend: "gitlab",
        status,
        message,
    }
}
