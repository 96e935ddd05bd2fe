//! A fake GitLab server.
//!
//! The fake serves the repository files API for a single project, plus the public raw file route
//! that download links point to. Files are kept in memory per branch. API requests must carry the
//! `PRIVATE-TOKEN` header.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::{Multipart, OriginalUri, Path, Query, State};
use axum::http::header::CONTENT_DISPOSITION;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use data_encoding::BASE64;
use percent_encoding::percent_decode_str;
use remotestore_types::config::secret;
use remotestore_types::{GitlabConfig, StorageConfig};
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::server::{RequestLog, TestServer, fake_id, ranged};

/// Token accepted by the fake.
pub const TOKEN: &str = "glpat-test";
/// Project path served by the fake.
pub const PROJECT: &str = "group/repo";
/// Branch that exists initially.
pub const BRANCH: &str = "main";

const FILES_PATH: &str = "/api/v4/projects/{project}/repository/files/{path}";
const RAW_MARKER: &str = "/-/raw/";

#[derive(Clone, Debug)]
struct RepositoryFile {
    blob_id: String,
    commit_id: String,
    content: Bytes,
}

#[derive(Debug, Default)]
struct Project {
    /// Files by branch and path.
    files: BTreeMap<(String, String), RepositoryFile>,
    /// Commit messages, oldest first.
    commits: Vec<String>,
    counter: u64,
}

type SharedProject = Arc<Mutex<Project>>;

fn lock(project: &SharedProject) -> MutexGuard<'_, Project> {
    project.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// An in-process fake GitLab server.
#[derive(Debug)]
pub struct FakeGitlab {
    server: TestServer,
    project: SharedProject,
    requests: RequestLog,
}

impl FakeGitlab {
    /// Starts a new server with an empty project.
    pub async fn new() -> Self {
        let project = SharedProject::default();
        let requests = RequestLog::default();

        let router = Router::new()
            .route(
                FILES_PATH,
                get(get_file).post(create_file).delete(delete_file),
            )
            .route(&format!("{FILES_PATH}/raw"), get(raw_file))
            .fallback(public_raw_file)
            .with_state(project.clone());

        let server = TestServer::new(requests.layer(router)).await;

        Self {
            server,
            project,
            requests,
        }
    }

    /// The GitLab instance URL.
    pub fn endpoint(&self) -> Url {
        self.server.endpoint("/")
    }

    /// A client configuration with a valid token for this server.
    pub fn config(&self) -> GitlabConfig {
        GitlabConfig {
            endpoint: self.endpoint(),
            access_key_id: String::new(),
            secret_access_key: secret(TOKEN),
            bucket: PROJECT.to_owned(),
            project_id: PROJECT.to_owned(),
            branch: BRANCH.to_owned(),
        }
    }

    /// Same as [`config`](Self::config), wrapped for client construction.
    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig::Gitlab(self.config())
    }

    /// Commits a file directly, bypassing the API.
    pub fn insert(&self, branch: &str, path: &str, content: impl Into<Bytes>) {
        let mut project = lock(&self.project);
        let file = new_file(&mut project, content.into());
        project.commits.push(format!("Insert {path}"));
        project
            .files
            .insert((branch.to_owned(), path.to_owned()), file);
    }

    /// Returns the content of a file, bypassing the API.
    pub fn content(&self, branch: &str, path: &str) -> Option<Bytes> {
        lock(&self.project)
            .files
            .get(&(branch.to_owned(), path.to_owned()))
            .map(|file| file.content.clone())
    }

    /// Returns all commit messages, oldest first.
    pub fn commits(&self) -> Vec<String> {
        lock(&self.project).commits.clone()
    }

    /// All requests received so far.
    pub fn requests(&self) -> &RequestLog {
        &self.requests
    }

    /// Returns a full URL for `path` on this server.
    pub fn url(&self, path: &str) -> String {
        self.server.url(path)
    }
}

fn new_file(project: &mut Project, content: Bytes) -> RepositoryFile {
    RepositoryFile {
        blob_id: fake_id("blob", &mut project.counter),
        commit_id: fake_id("commit", &mut project.counter),
        content,
    }
}

fn message(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

fn authorize(headers: &HeaderMap) -> Result<(), Response> {
    match headers.get("private-token") {
        Some(token) if token == TOKEN => Ok(()),
        _ => Err(message(StatusCode::UNAUTHORIZED, "401 Unauthorized")),
    }
}

fn check_project(project: &str) -> Result<(), Response> {
    if project == PROJECT {
        Ok(())
    } else {
        Err(message(StatusCode::NOT_FOUND, "404 Project Not Found"))
    }
}

#[derive(Deserialize)]
struct RefQuery {
    #[serde(rename = "ref")]
    reference: Option<String>,
}

fn file_headers(file: &RepositoryFile, branch: &str, path: &str) -> HeaderMap {
    let (_, file_name) = path.rsplit_once('/').unwrap_or(("", path));
    let fields = [
        ("x-gitlab-blob-id", file.blob_id.clone()),
        ("x-gitlab-commit-id", file.commit_id.clone()),
        ("x-gitlab-last-commit-id", file.commit_id.clone()),
        ("x-gitlab-encoding", "base64".to_owned()),
        ("x-gitlab-file-name", file_name.to_owned()),
        ("x-gitlab-file-path", path.to_owned()),
        ("x-gitlab-ref", branch.to_owned()),
        ("x-gitlab-size", file.content.len().to_string()),
    ];

    let mut headers = HeaderMap::new();
    for (name, value) in fields {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
    headers
}

async fn get_file(
    State(project): State<SharedProject>,
    Path((project_id, path)): Path<(String, String)>,
    Query(query): Query<RefQuery>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = authorize(&headers).and_then(|()| check_project(&project_id)) {
        return response;
    }
    let Some(branch) = query.reference else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "ref is missing" })),
        )
            .into_response();
    };

    let project = lock(&project);
    let Some(file) = project.files.get(&(branch.clone(), path.clone())) else {
        return message(StatusCode::NOT_FOUND, "404 File Not Found");
    };

    let body = json!({
        "file_name": path.rsplit('/').next(),
        "file_path": path,
        "size": file.content.len(),
        "encoding": "base64",
        "content": BASE64.encode(&file.content),
        "ref": branch,
        "blob_id": file.blob_id,
        "commit_id": file.commit_id,
        "last_commit_id": file.commit_id,
    });
    (file_headers(file, &branch, &path), Json(body)).into_response()
}

async fn raw_file(
    State(project): State<SharedProject>,
    Path((project_id, path)): Path<(String, String)>,
    Query(query): Query<RefQuery>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = authorize(&headers).and_then(|()| check_project(&project_id)) {
        return response;
    }

    let branch = query.reference.unwrap_or_else(|| BRANCH.to_owned());
    let project = lock(&project);
    match project.files.get(&(branch.clone(), path.clone())) {
        Some(file) => {
            let (status, body, mut response_headers) = ranged(&file.content, &headers);
            response_headers.extend(file_headers(file, &branch, &path));
            (status, response_headers, body).into_response()
        }
        None => message(StatusCode::NOT_FOUND, "404 File Not Found"),
    }
}

async fn create_file(
    State(project): State<SharedProject>,
    Path((project_id, path)): Path<(String, String)>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    if let Err(response) = authorize(&headers).and_then(|()| check_project(&project_id)) {
        return response;
    }

    let mut fields = BTreeMap::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_owned();
        if let Ok(value) = field.bytes().await {
            fields.insert(name, value);
        }
    }

    let text = |name: &str| {
        fields
            .get(name)
            .map(|value| String::from_utf8_lossy(value).into_owned())
    };
    let (Some(branch), Some(commit_message)) = (text("branch"), text("commit_message")) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "branch, commit_message are missing" })),
        )
            .into_response();
    };
    let Some(content) = fields.get("content").cloned() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "content is missing" })),
        )
            .into_response();
    };

    let content = match text("encoding").as_deref() {
        Some("base64") => match BASE64.decode(&content) {
            Ok(decoded) => Bytes::from(decoded),
            Err(_) => return message(StatusCode::BAD_REQUEST, "Invalid base64 content"),
        },
        _ => content,
    };

    let mut project = lock(&project);
    let key = (branch.clone(), path.clone());
    if project.files.contains_key(&key) {
        return message(
            StatusCode::BAD_REQUEST,
            "A file with this name already exists",
        );
    }

    let file = new_file(&mut project, content);
    project.files.insert(key, file);
    project.commits.push(commit_message);

    let body = json!({ "file_path": path, "branch": branch });
    (StatusCode::CREATED, Json(body)).into_response()
}

#[derive(Deserialize)]
struct DeleteQuery {
    branch: Option<String>,
    commit_message: Option<String>,
}

async fn delete_file(
    State(project): State<SharedProject>,
    Path((project_id, path)): Path<(String, String)>,
    Query(query): Query<DeleteQuery>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = authorize(&headers).and_then(|()| check_project(&project_id)) {
        return response;
    }
    let (Some(branch), Some(commit_message)) = (query.branch, query.commit_message) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "branch, commit_message are missing" })),
        )
            .into_response();
    };

    let mut project = lock(&project);
    if project.files.remove(&(branch, path)).is_none() {
        return message(StatusCode::NOT_FOUND, "404 File Not Found");
    }
    project.commits.push(commit_message);

    StatusCode::NO_CONTENT.into_response()
}

#[derive(Deserialize)]
struct InlineQuery {
    inline: Option<bool>,
}

/// Serves `/{namespace}/-/raw/{branch}/{path}` without authentication.
async fn public_raw_file(
    State(project): State<SharedProject>,
    OriginalUri(uri): OriginalUri,
    Query(query): Query<InlineQuery>,
    headers: HeaderMap,
) -> Response {
    let Some((namespace, rest)) = uri.path().split_once(RAW_MARKER) else {
        return message(StatusCode::NOT_FOUND, "404 Not Found");
    };
    if namespace.trim_start_matches('/') != PROJECT {
        return message(StatusCode::NOT_FOUND, "404 Project Not Found");
    }
    let Some((branch, path)) = rest.split_once('/') else {
        return message(StatusCode::NOT_FOUND, "404 Not Found");
    };
    let Ok(path) = percent_decode_str(path).decode_utf8() else {
        return message(StatusCode::BAD_REQUEST, "400 Bad Request");
    };

    let project = lock(&project);
    let Some(file) = project.files.get(&(branch.to_owned(), path.into_owned())) else {
        return message(StatusCode::NOT_FOUND, "404 File Not Found");
    };

    let (status, body, mut response_headers) = ranged(&file.content, &headers);
    let disposition = if query.inline.unwrap_or(true) {
        "inline"
    } else {
        "attachment"
    };
    if let Ok(value) = HeaderValue::from_str(disposition) {
        response_headers.insert(CONTENT_DISPOSITION, value);
    }
    (status, response_headers, body).into_response()
}
