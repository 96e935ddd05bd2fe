use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use data_encoding::BASE64;
use remotestore_types::{AlfrescoConfig, Metadata, Options, path};
use reqwest::header::{AUTHORIZATION, RANGE};
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use url::Url;

use crate::backend::{Backend, api_url};
use crate::{Body, Error};

/// Node type of plain documents.
const CONTENT_NODE_TYPE: &str = "cm:content";

/// Alias of the current user's home folder.
const MY_NODE: &str = "-my-";

/// Cached authentication ticket.
///
/// The backend, and with it this cache, is shared by the client and every file handle created from
/// it. The ticket is requested by the first operation that needs it; concurrent first operations
/// wait for that single request instead of authenticating on their own. Tickets never expire from
/// the cache.
#[derive(Default)]
struct TicketCache(OnceCell<String>);

impl fmt::Debug for TicketCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TicketCache")
            .field("cached", &self.0.initialized())
            .finish()
    }
}

/// An [Alfresco] content repository.
///
/// Objects are documents below the configured folder in the authenticated user's home. Requests
/// authenticate with a ticket obtained from the user name and password.
///
/// [Alfresco]: https://docs.alfresco.com/content-services/latest/develop/rest-api-guide/
pub struct Alfresco {
    client: reqwest::Client,
    config: AlfrescoConfig,
    ticket: TicketCache,
}

impl Alfresco {
    /// Creates a new Alfresco backend that sends requests through `client`.
    pub fn new(client: reqwest::Client, config: AlfrescoConfig) -> Self {
        Self {
            client,
            config,
            ticket: TicketCache::default(),
        }
    }

    /// Returns the path of `path` relative to the user's home folder.
    fn relative_path(&self, path: &str, options: &Options) -> String {
        let bucket = options.bucket.as_deref().unwrap_or(&self.config.bucket);
        path::join(bucket, path)
    }

    fn url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> crate::Result<Url> {
        api_url(&self.config.endpoint, segments)
    }

    async fn request_ticket(&self) -> crate::Result<String> {
        tracing::trace!(user = %self.config.access_key_id, "Requesting ticket");

        let url = api_url(
            self.config.auth_endpoint(),
            ["authentication", "versions", "1", "tickets"],
        )?;
        let request = TicketRequest {
            user_id: &self.config.access_key_id,
            password: self.config.password(),
        };

        let response = self.client.post(url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(ApiError::from_response(response).await?.into_error(""));
        }

        let ticket: Entry<Ticket> = response.json().await?;
        Ok(BASE64.encode(ticket.entry.id.as_bytes()))
    }

    /// Returns the `Authorization` header value, requesting a ticket on first use.
    async fn authorization(&self) -> crate::Result<String> {
        let ticket = self
            .ticket
            .0
            .get_or_try_init(|| self.request_ticket())
            .await?;
        Ok(format!("Basic {ticket}"))
    }

    async fn node_id(
        &self,
        path: &str,
        resolved: Option<&Metadata>,
        options: &Options,
    ) -> crate::Result<String> {
        match resolved {
            Some(metadata) => Ok(metadata.id.clone()),
            None => Ok(self.stat(path, options).await?.id),
        }
    }
}

impl fmt::Debug for Alfresco {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Alfresco")
            .field("endpoint", &self.config.endpoint.as_str())
            .field("bucket", &self.config.bucket)
            .field("ticket", &self.ticket)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Backend for Alfresco {
    fn name(&self) -> &'static str {
        "alfresco"
    }

    fn reads_by_id(&self) -> bool {
        true
    }

    #[tracing::instrument(level = "trace", fields(?path), skip_all)]
    async fn stat(&self, path: &str, options: &Options) -> crate::Result<Metadata> {
        let relative_path = self.relative_path(path, options);
        tracing::debug!(%relative_path, "Looking up node");

        let response = self
            .client
            .get(self.url(["nodes", MY_NODE])?)
            .query(&[("relativePath", relative_path.as_str())])
            .header(AUTHORIZATION, self.authorization().await?)
            .send()
            .await?;

        if !response.status().is_success() {
            let error = ApiError::from_response(response).await?;
            return Err(error.into_error(&relative_path));
        }

        let node: Entry<Node> = response.json().await?;
        Ok(node.entry.into_metadata())
    }

    #[tracing::instrument(level = "trace", fields(?path), skip_all)]
    async fn read(
        &self,
        path: &str,
        resolved: Option<&Metadata>,
        options: &Options,
    ) -> crate::Result<Body> {
        let node_id = self.node_id(path, resolved, options).await?;
        tracing::debug!(%node_id, "Reading node content");

        let mut request = self
            .client
            .get(self.url(["nodes", node_id.as_str(), "content"])?)
            .header(AUTHORIZATION, self.authorization().await?);
        let range = options.range.as_ref().and_then(|range| range.to_header());
        if let Some(ref range) = range {
            request = request.header(RANGE, range);
        }

        let response = request.send().await?;
        // A range starting at or past the end selects no bytes.
        if range.is_some() && response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
            return Ok(Body::empty(options.content_type.clone()));
        }
        if !response.status().is_success() {
            let error = ApiError::from_response(response).await?;
            return Err(error.into_error(&self.relative_path(path, options)));
        }

        Ok(Body::from_response(response, options.content_type.clone()))
    }

    #[tracing::instrument(level = "trace", fields(?path), skip_all)]
    async fn write(&self, path: &str, payload: Bytes, options: &Options) -> crate::Result<u64> {
        if path::normalize(path).is_empty() {
            return Err(Error::InvalidPath {
                path: path.to_owned(),
            });
        }
        let relative_path = self.relative_path(path, options);
        let (parent, name) = path::split(&relative_path);
        tracing::debug!(parent, name, "Creating node");

        let length = payload.len() as u64;
        let mut file = Part::stream_with_length(payload, length).file_name(name.to_owned());
        if let Some(ref content_type) = options.content_type {
            file = file.mime_str(content_type)?;
        }

        let form = Form::new()
            .part("filedata", file)
            .text("nodeType", CONTENT_NODE_TYPE)
            .text("name", name.to_owned())
            .text("relativePath", parent.to_owned());

        let response = self
            .client
            .post(self.url(["nodes", MY_NODE, "children"])?)
            .header(AUTHORIZATION, self.authorization().await?)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let error = ApiError::from_response(response).await?;
            return Err(error.into_error(&relative_path));
        }

        let node: Entry<Node> = response.json().await?;
        Ok(node.entry.into_metadata().size)
    }

    #[tracing::instrument(level = "trace", fields(?path), skip_all)]
    async fn delete(
        &self,
        path: &str,
        resolved: Option<&Metadata>,
        options: &Options,
    ) -> crate::Result<()> {
        let node_id = self.node_id(path, resolved, options).await?;
        tracing::debug!(%node_id, "Deleting node");

        let response = self
            .client
            .delete(self.url(["nodes", node_id.as_str()])?)
            .header(AUTHORIZATION, self.authorization().await?)
            .send()
            .await?;

        if !response.status().is_success() {
            let error = ApiError::from_response(response).await?;
            return Err(error.into_error(&self.relative_path(path, options)));
        }

        Ok(())
    }

    #[tracing::instrument(level = "trace", fields(?path), skip_all)]
    async fn presign(&self, path: &str, options: &Options) -> crate::Result<Url> {
        let metadata = self.stat(path, options).await?;

        let expires_at = options
            .expires_in
            .map(|expires_in| humantime::format_rfc3339_millis(SystemTime::now() + expires_in))
            .map(|timestamp| timestamp.to_string());
        let request = SharedLinkRequest {
            node_id: &metadata.id,
            expires_at,
        };

        let response = self
            .client
            .post(self.url(["shared-links"])?)
            .header(AUTHORIZATION, self.authorization().await?)
            .json(&request)
            .send()
            .await?;

        let link_id = match response.status() {
            status if status.is_success() => response.json::<Entry<SharedLink>>().await?.entry.id,
            StatusCode::CONFLICT => {
                let error = ApiError::from_response(response).await?;
                match error.key.as_deref().and_then(existing_link_id) {
                    Some(link_id) => {
                        tracing::debug!(link_id, "Reusing existing shared link");
                        link_id.to_owned()
                    }
                    None => return Err(error.into_error(&self.relative_path(path, options))),
                }
            }
            _ => {
                let error = ApiError::from_response(response).await?;
                return Err(error.into_error(&self.relative_path(path, options)));
            }
        };

        let attachment = !options.inline.unwrap_or(false);
        let mut url = self.url(["shared-links", link_id.as_str(), "content"])?;
        url.query_pairs_mut()
            .append_pair("attachment", if attachment { "true" } else { "false" })
            .append_pair("v", &cache_buster());
        Ok(url)
    }
}

/// Extracts the id of an existing shared link from the key of a conflict error.
///
/// The id is the last word of the key, optionally wrapped in brackets or quotes.
fn existing_link_id(error_key: &str) -> Option<&str> {
    let word = error_key.split_whitespace().next_back()?;
    let id = word.trim_matches(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    let is_id = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    is_id.then_some(id)
}

fn cache_buster() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default()
        .to_string()
}

#[derive(Debug, Deserialize)]
struct Entry<T> {
    entry: T,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TicketRequest<'a> {
    user_id: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct Ticket {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Node {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    node_type: String,
    modified_at: Option<String>,
    content: Option<NodeContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeContent {
    #[serde(default, alias = "length")]
    size_in_bytes: u64,
    mime_type: Option<String>,
    modified_at: Option<String>,
}

impl Node {
    fn into_metadata(self) -> Metadata {
        let (size, content_type, content_modified_at) = match self.content {
            Some(content) => (content.size_in_bytes, content.mime_type, content.modified_at),
            None => (0, None, None),
        };

        let mut metadata = Metadata {
            id: self.id,
            kind: self.node_type,
            size,
            last_modified: content_modified_at.or(self.modified_at),
            content_type,
            ..Default::default()
        };
        if !self.name.is_empty() {
            metadata.extra.insert("name".to_owned(), self.name);
        }
        metadata
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SharedLinkRequest<'a> {
    node_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SharedLink {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error_key: Option<String>,
    brief_summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

/// An error response of the Alfresco API.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    key: Option<String>,
    summary: String,
}

impl ApiError {
    async fn from_response(response: Response) -> crate::Result<Self> {
        let status = response.status();
        let body = response.bytes().await?;

        let error = match serde_json::from_slice::<ErrorResponse>(&body) {
            Ok(ErrorResponse { error }) => error,
            Err(_) => ErrorBody::default(),
        };

        let summary = match error.brief_summary {
            Some(summary) => summary,
            None if body.is_empty() => status.canonical_reason().unwrap_or_default().to_owned(),
            None => String::from_utf8_lossy(&body).into_owned(),
        };

        Ok(Self {
            status,
            key: error.error_key,
            summary,
        })
    }

    fn into_error(self, path: &str) -> Error {
        if self.status == StatusCode::NOT_FOUND {
            return Error::NotFound {
                path: path.to_owned(),
            };
        }

        Error::Backend {
            backend: "alfresco",
            status: self.status,
            message: self.summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_existing_link_id() {
        assert_eq!(
            existing_link_id("Node is already shared [a1b2-c3_d4]"),
            Some("a1b2-c3_d4")
        );
        assert_eq!(existing_link_id("shared: 'xyz'"), Some("xyz"));
        assert_eq!(
            existing_link_id("framework.exception.ConstraintViolated"),
            None
        );
        assert_eq!(existing_link_id(""), None);
    }

    #[test]
    fn normalizes_node_metadata() {
        let node: Entry<Node> = serde_json::from_str(
            r#"{"entry": {
                "id": "abc-123",
                "name": "123.json",
                "nodeType": "cm:content",
                "modifiedAt": "2024-01-01T00:00:00.000+0000",
                "content": {"mimeType": "application/json", "sizeInBytes": 7}
            }}"#,
        )
        .unwrap();

        let metadata = node.entry.into_metadata();
        assert_eq!(metadata.id, "abc-123");
        assert_eq!(metadata.kind, "cm:content");
        assert_eq!(metadata.size, 7);
        assert_eq!(metadata.content_type.as_deref(), Some("application/json"));
        assert_eq!(
            metadata.last_modified.as_deref(),
            Some("2024-01-01T00:00:00.000+0000")
        );
        assert_eq!(metadata.extra["name"], "123.json");
    }

    #[test]
    fn accepts_content_length_alias() {
        let node: Node = serde_json::from_str(
            r#"{"id": "x", "nodeType": "cm:content", "content": {"length": 12, "modifiedAt": "yesterday"}}"#,
        )
        .unwrap();

        let metadata = node.into_metadata();
        assert_eq!(metadata.size, 12);
        assert_eq!(metadata.last_modified.as_deref(), Some("yesterday"));
    }
}
