//! A fake Alfresco content repository.
//!
//! The fake serves the subset of the public REST API the client uses: ticket authentication, node
//! lookup by relative path, content download, document creation, deletion, and shared links. All
//! state is kept in memory. Authenticated requests must carry `Authorization: Basic` with the
//! base64-encoded ticket.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::{Multipart, Path, Query, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use data_encoding::BASE64;
use remotestore_types::config::secret;
use remotestore_types::{AlfrescoConfig, StorageConfig, path};
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use crate::server::{RequestLog, TestServer, fake_id, ranged};

/// User name accepted by the fake.
pub const USER: &str = "admin";
/// Password accepted by the fake.
pub const PASSWORD: &str = "secret";

const BASE_PATH: &str = "/alfresco/api/-default-/public/alfresco/versions/1";
const AUTH_BASE_PATH: &str = "/alfresco/api/-default-/public";
const MODIFIED_AT: &str = "2024-01-01T00:00:00.000+0000";

#[derive(Clone, Debug)]
struct Document {
    id: String,
    name: String,
    content: Bytes,
    mime_type: String,
}

#[derive(Debug, Default)]
struct Repository {
    /// Documents by their path relative to the user's home.
    documents: BTreeMap<String, Document>,
    /// Shared link ids by node id.
    links: BTreeMap<String, String>,
    /// Requested expiry of each shared link.
    expirations: BTreeMap<String, String>,
    tickets: Vec<String>,
    counter: u64,
}

impl Repository {
    fn by_id(&self, id: &str) -> Option<&Document> {
        self.documents.values().find(|document| document.id == id)
    }

    fn is_folder(&self, relative_path: &str) -> bool {
        relative_path.is_empty()
            || self
                .documents
                .keys()
                .any(|key| key.starts_with(&format!("{relative_path}/")))
    }
}

type SharedRepository = Arc<Mutex<Repository>>;

fn lock(repository: &SharedRepository) -> MutexGuard<'_, Repository> {
    repository
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// An in-process fake Alfresco server.
#[derive(Debug)]
pub struct FakeAlfresco {
    server: TestServer,
    repository: SharedRepository,
    requests: RequestLog,
}

impl FakeAlfresco {
    /// Starts a new, empty repository.
    pub async fn new() -> Self {
        let repository = SharedRepository::default();
        let requests = RequestLog::default();

        let api = Router::new()
            .route("/nodes/-my-", get(lookup_node))
            .route("/nodes/-my-/children", post(create_node))
            .route("/nodes/{id}", axum::routing::delete(delete_node))
            .route("/nodes/{id}/content", get(node_content))
            .route("/shared-links", post(create_shared_link))
            .route("/shared-links/{id}/content", get(shared_link_content));

        let router = Router::new()
            .route(
                &format!("{AUTH_BASE_PATH}/authentication/versions/1/tickets"),
                post(create_ticket),
            )
            .nest(BASE_PATH, api)
            .with_state(repository.clone());

        let server = TestServer::new(requests.layer(router)).await;

        Self {
            server,
            repository,
            requests,
        }
    }

    /// The base URL of the core API.
    pub fn endpoint(&self) -> Url {
        self.server.endpoint(BASE_PATH)
    }

    /// The base URL of the authentication API.
    pub fn auth_endpoint(&self) -> Url {
        self.server.endpoint(AUTH_BASE_PATH)
    }

    /// A client configuration with valid credentials for this server.
    pub fn config(&self, bucket: &str) -> AlfrescoConfig {
        AlfrescoConfig {
            endpoint: self.endpoint(),
            auth_endpoint: Some(self.auth_endpoint()),
            access_key_id: USER.to_owned(),
            secret_access_key: secret(PASSWORD),
            bucket: bucket.to_owned(),
        }
    }

    /// Same as [`config`](Self::config), wrapped for client construction.
    pub fn storage_config(&self, bucket: &str) -> StorageConfig {
        StorageConfig::Alfresco(self.config(bucket))
    }

    /// Stores a document directly, bypassing the API. Returns the node id.
    pub fn insert(&self, relative_path: &str, content: impl Into<Bytes>, mime_type: &str) -> String {
        let relative_path = path::normalize(relative_path);
        let mut repository = lock(&self.repository);
        let id = match repository.documents.get(&relative_path) {
            Some(existing) => existing.id.clone(),
            None => fake_id("node", &mut repository.counter),
        };

        let (_, name) = path::split(&relative_path);
        let document = Document {
            id: id.clone(),
            name: name.to_owned(),
            content: content.into(),
            mime_type: mime_type.to_owned(),
        };
        repository.documents.insert(relative_path, document);
        id
    }

    /// Returns the content of a document, bypassing the API.
    pub fn content(&self, relative_path: &str) -> Option<Bytes> {
        let repository = lock(&self.repository);
        repository
            .documents
            .get(&path::normalize(relative_path))
            .map(|document| document.content.clone())
    }

    /// Returns the id of the shared link of a node, if it has one.
    pub fn shared_link(&self, node_id: &str) -> Option<String> {
        lock(&self.repository).links.get(node_id).cloned()
    }

    /// Returns the expiry requested for a shared link, if any.
    pub fn link_expiration(&self, link_id: &str) -> Option<String> {
        lock(&self.repository).expirations.get(link_id).cloned()
    }

    /// The number of tickets issued so far.
    pub fn tickets_issued(&self) -> usize {
        lock(&self.repository).tickets.len()
    }

    /// All requests received so far.
    pub fn requests(&self) -> &RequestLog {
        &self.requests
    }

    /// Returns a full URL for `path` on this server, for following presigned links.
    pub fn url(&self, path: &str) -> String {
        self.server.url(path)
    }
}

fn error(status: StatusCode, key: &str, summary: &str) -> Response {
    let body = json!({
        "error": {
            "errorKey": key,
            "statusCode": status.as_u16(),
            "briefSummary": summary,
        }
    });
    (status, Json(body)).into_response()
}

fn authorize(repository: &Repository, headers: &HeaderMap) -> Result<(), Response> {
    let authorized = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Basic "))
        .and_then(|encoded| BASE64.decode(encoded.as_bytes()).ok())
        .and_then(|decoded| String::from_utf8(decoded).ok())
        .is_some_and(|ticket| repository.tickets.contains(&ticket));

    if authorized {
        Ok(())
    } else {
        Err(error(
            StatusCode::UNAUTHORIZED,
            "framework.exception.ApiDefault",
            "Authentication failed",
        ))
    }
}

fn node_json(document: &Document) -> Value {
    json!({
        "entry": {
            "id": document.id,
            "name": document.name,
            "nodeType": "cm:content",
            "isFile": true,
            "isFolder": false,
            "modifiedAt": MODIFIED_AT,
            "content": {
                "mimeType": document.mime_type,
                "sizeInBytes": document.content.len(),
            },
        }
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TicketRequest {
    user_id: String,
    password: String,
}

async fn create_ticket(
    State(repository): State<SharedRepository>,
    Json(request): Json<TicketRequest>,
) -> Response {
    if request.user_id != USER || request.password != PASSWORD {
        return error(
            StatusCode::FORBIDDEN,
            "framework.exception.ApiDefault",
            "Login failed",
        );
    }

    let mut repository = lock(&repository);
    let ticket = fake_id("TICKET", &mut repository.counter);
    repository.tickets.push(ticket.clone());

    let body = json!({ "entry": { "id": ticket, "userId": request.user_id } });
    (StatusCode::CREATED, Json(body)).into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupQuery {
    #[serde(default)]
    relative_path: String,
}

async fn lookup_node(
    State(repository): State<SharedRepository>,
    Query(query): Query<LookupQuery>,
    headers: HeaderMap,
) -> Response {
    let repository = lock(&repository);
    if let Err(response) = authorize(&repository, &headers) {
        return response;
    }

    let relative_path = path::normalize(&query.relative_path);
    if let Some(document) = repository.documents.get(&relative_path) {
        return Json(node_json(document)).into_response();
    }

    if repository.is_folder(&relative_path) {
        let (_, name) = path::split(&relative_path);
        let body = json!({
            "entry": {
                "id": format!("folder:{relative_path}"),
                "name": name,
                "nodeType": "cm:folder",
                "isFile": false,
                "isFolder": true,
                "modifiedAt": MODIFIED_AT,
            }
        });
        return Json(body).into_response();
    }

    error(
        StatusCode::NOT_FOUND,
        "framework.exception.EntityNotFound",
        &format!("The entity with relativePath: {relative_path} was not found."),
    )
}

async fn node_content(
    State(repository): State<SharedRepository>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let repository = lock(&repository);
    if let Err(response) = authorize(&repository, &headers) {
        return response;
    }

    match repository.by_id(&id) {
        Some(document) => serve(document, &headers),
        None => error(
            StatusCode::NOT_FOUND,
            "framework.exception.EntityNotFound",
            &format!("The entity with id: {id} was not found"),
        ),
    }
}

fn serve(document: &Document, headers: &HeaderMap) -> Response {
    let (status, body, mut response_headers) = ranged(&document.content, headers);
    if let Ok(value) = document.mime_type.parse() {
        response_headers.insert(CONTENT_TYPE, value);
    }
    (status, response_headers, body).into_response()
}

async fn create_node(
    State(repository): State<SharedRepository>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    if let Err(response) = authorize(&lock(&repository), &headers) {
        return response;
    }

    let mut content = None;
    let mut mime_type = None;
    let mut fields = BTreeMap::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_owned();
        if name == "filedata" {
            mime_type = field.content_type().map(String::from);
            content = field.bytes().await.ok();
        } else if let Ok(text) = field.text().await {
            fields.insert(name, text);
        }
    }

    let Some(content) = content else {
        return error(
            StatusCode::BAD_REQUEST,
            "framework.exception.InvalidArgument",
            "No content found in the request",
        );
    };
    if fields.get("nodeType").map(String::as_str) != Some("cm:content") {
        return error(
            StatusCode::BAD_REQUEST,
            "framework.exception.InvalidArgument",
            "Unsupported node type",
        );
    }

    let name = fields.get("name").cloned().unwrap_or_default();
    let parent = fields.get("relativePath").cloned().unwrap_or_default();
    let relative_path = path::join(&parent, &name);

    let mut repository = lock(&repository);
    if repository.documents.contains_key(&relative_path) {
        return error(
            StatusCode::CONFLICT,
            "Duplicate child name not allowed",
            &format!("Duplicate child name not allowed: {name}"),
        );
    }

    let document = Document {
        id: fake_id("node", &mut repository.counter),
        name,
        content,
        mime_type: mime_type.unwrap_or_else(|| "application/octet-stream".to_owned()),
    };
    let body = node_json(&document);
    repository.documents.insert(relative_path, document);

    (StatusCode::CREATED, Json(body)).into_response()
}

async fn delete_node(
    State(repository): State<SharedRepository>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let mut repository = lock(&repository);
    if let Err(response) = authorize(&repository, &headers) {
        return response;
    }

    let before = repository.documents.len();
    repository.documents.retain(|_, document| document.id != id);
    if repository.documents.len() == before {
        return error(
            StatusCode::NOT_FOUND,
            "framework.exception.EntityNotFound",
            &format!("The entity with id: {id} was not found"),
        );
    }

    repository.links.remove(&id);
    StatusCode::NO_CONTENT.into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SharedLinkRequest {
    node_id: String,
    expires_at: Option<String>,
}

async fn create_shared_link(
    State(repository): State<SharedRepository>,
    headers: HeaderMap,
    Json(request): Json<SharedLinkRequest>,
) -> Response {
    let mut repository = lock(&repository);
    if let Err(response) = authorize(&repository, &headers) {
        return response;
    }

    if repository.by_id(&request.node_id).is_none() {
        return error(
            StatusCode::NOT_FOUND,
            "framework.exception.EntityNotFound",
            &format!("The entity with id: {} was not found", request.node_id),
        );
    }

    if let Some(link_id) = repository.links.get(&request.node_id) {
        return error(
            StatusCode::CONFLICT,
            &format!("Node is already shared [{link_id}]"),
            "The shared link already exists",
        );
    }

    let link_id = fake_id("link", &mut repository.counter);
    repository
        .links
        .insert(request.node_id.clone(), link_id.clone());
    if let Some(expires_at) = request.expires_at {
        repository.expirations.insert(link_id.clone(), expires_at);
    }

    let body = json!({ "entry": { "id": link_id, "nodeId": request.node_id } });
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn shared_link_content(
    State(repository): State<SharedRepository>,
    Path(link_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let repository = lock(&repository);
    let document = repository
        .links
        .iter()
        .find(|(_, id)| **id == link_id)
        .and_then(|(node_id, _)| repository.by_id(node_id));

    match document {
        Some(document) => serve(document, &headers),
        None => error(
            StatusCode::NOT_FOUND,
            "framework.exception.EntityNotFound",
            &format!("The entity with id: {link_id} was not found"),
        ),
    }
}
