use remotestore_client::{Client, Error, Options};
use remotestore_test::gitlab::{BRANCH, FakeGitlab, PROJECT};
use serde_json::{Value, json};

async fn setup() -> (FakeGitlab, Client) {
    remotestore_test::tracing::init();
    let server = FakeGitlab::new().await;
    let client = Client::new(server.storage_config()).unwrap();
    (server, client)
}

#[tokio::test]
async fn reads_json_file() {
    let (server, client) = setup().await;
    server.insert(BRANCH, "dir/123.json", r#"{"a":1}"#);

    let file = client.file("dir/123.json", &Options::new());
    let value: Value = file.json().await.unwrap();
    assert_eq!(value, json!({"a": 1}));

    let metadata = file.stat().await.unwrap();
    assert_eq!(metadata.kind, "blob");
    assert_eq!(metadata.size, 7);
    assert!(!metadata.id.is_empty());
    assert_eq!(metadata.extra["file-path"], "dir/123.json");
    assert_eq!(metadata.extra["ref"], BRANCH);
}

#[tokio::test]
async fn exists_agrees_with_stat() {
    let (server, client) = setup().await;
    server.insert(BRANCH, "a.txt", "a");

    assert!(client.exists("a.txt", &Options::new()).await);
    assert!(client.stat("a.txt", &Options::new()).await.is_ok());

    assert!(!client.exists("b.txt", &Options::new()).await);
    let error = client.stat("b.txt", &Options::new()).await.unwrap_err();
    assert!(matches!(error, Error::NotFound { ref path } if path == "b.txt"));
}

#[tokio::test]
async fn size_matches_stat_for_empty_files() {
    let (server, client) = setup().await;
    server.insert(BRANCH, ".gitkeep", "");

    let file = client.file(".gitkeep", &Options::new());
    assert_eq!(file.size().await.unwrap(), 0);
    assert_eq!(file.stat().await.unwrap().size, 0);
    assert!(file.exists().await);
}

#[tokio::test]
async fn cached_stat_is_stable() {
    let (server, client) = setup().await;
    server.insert(BRANCH, "a.txt", "short");

    let file = client.file("a.txt", &Options::new());
    assert_eq!(file.stat().await.unwrap().size, 5);

    server.insert(BRANCH, "a.txt", "much longer now");
    assert_eq!(file.stat().await.unwrap().size, 5);
    assert_eq!(server.requests().count("HEAD", "/repository/files/"), 1);

    let fresh = client.file("a.txt", &Options::new());
    assert_eq!(fresh.stat().await.unwrap().size, 15);
}

#[tokio::test]
async fn write_then_read_back() {
    let (server, client) = setup().await;

    let written = client
        .write("docs/hello.txt", "Hello World!", &Options::new())
        .await
        .unwrap();
    assert_eq!(written, 12);
    assert_eq!(server.content(BRANCH, "docs/hello.txt").unwrap(), "Hello World!");
    assert_eq!(server.commits(), ["Update file via remotestore"]);

    let file = client.file("docs/hello.txt", &Options::new());
    assert!(file.exists().await);
    assert_eq!(file.size().await.unwrap(), 12);
    assert_eq!(file.text().await.unwrap(), "Hello World!");

    // Reads address files by path, so no lookup precedes them.
    let fresh = client.file("docs/hello.txt", &Options::new());
    assert_eq!(fresh.bytes().await.unwrap(), "Hello World!");
    assert_eq!(server.requests().count("HEAD", "/repository/files/"), 1);
}

#[tokio::test]
async fn writes_binary_content() {
    let (server, client) = setup().await;
    let content = vec![0u8, 159, 146, 150, 255];

    let file = client.file("blob.bin", &Options::new());
    let written = file.write(content.clone(), &Options::new()).await.unwrap();
    assert_eq!(written, 5);
    assert_eq!(server.content(BRANCH, "blob.bin").unwrap(), content);

    let fresh = client.file("blob.bin", &Options::new());
    assert_eq!(fresh.buffer().await.unwrap(), content);
}

#[tokio::test]
async fn write_rejects_existing_file() {
    let (server, client) = setup().await;
    server.insert(BRANCH, "a.txt", "a");

    let error = client
        .write("a.txt", "b", &Options::new())
        .await
        .unwrap_err();
    let Error::Backend {
        backend,
        status,
        message,
    } = error
    else {
        panic!("expected backend error, got {error:?}");
    };
    assert_eq!(backend, "gitlab");
    assert_eq!(status.as_u16(), 400);
    assert_eq!(message, "A file with this name already exists");
    assert_eq!(server.content(BRANCH, "a.txt").unwrap(), "a");
}

#[tokio::test]
async fn delete_then_missing() {
    let (server, client) = setup().await;
    server.insert(BRANCH, "dir/a.txt", "a");

    let options = Options::new().with_commit_message("Remove a.txt");
    client.file("dir/a.txt", &options).delete().await.unwrap();

    assert!(server.content(BRANCH, "dir/a.txt").is_none());
    assert_eq!(server.commits().last().map(String::as_str), Some("Remove a.txt"));
    assert!(!client.file("dir/a.txt", &Options::new()).exists().await);
}

#[tokio::test]
async fn delete_missing_file_fails() {
    let (_server, client) = setup().await;

    let error = client.delete("nope.txt", &Options::new()).await.unwrap_err();
    assert!(matches!(error, Error::NotFound { .. }));
}

#[tokio::test]
async fn presign_does_not_access_the_server() {
    let (server, client) = setup().await;
    server.insert(BRANCH, "dir/123.json", r#"{"a":1}"#);

    let url = client.presign("dir/123.json", &Options::new()).await.unwrap();
    assert!(server.requests().is_empty());
    assert_eq!(
        url.as_str(),
        server.url(&format!("{PROJECT}/-/raw/{BRANCH}/dir/123.json?inline=true"))
    );

    let response = reqwest::get(url).await.unwrap();
    assert_eq!(response.headers()["content-disposition"], "inline");
    assert_eq!(response.text().await.unwrap(), r#"{"a":1}"#);
}

#[tokio::test]
async fn presign_downloads_binary_content() {
    let (_server, client) = setup().await;

    let options = Options::new().with_content_type("application/octet-stream");
    let file = client.file("a.bin", &options);
    let url = file.presign(&Options::new().with_inline(true)).await.unwrap();
    assert!(url.as_str().ends_with("/-/raw/main/a.bin?inline=false"));

    let url = client
        .presign("a.pdf", &Options::new().with_inline(false))
        .await
        .unwrap();
    assert_eq!(url.query(), Some("inline=false"));
}

#[tokio::test]
async fn presign_requires_a_path() {
    let (_server, client) = setup().await;

    let error = client.presign("./", &Options::new()).await.unwrap_err();
    assert!(matches!(error, Error::InvalidPath { .. }));
}

#[tokio::test]
async fn branch_override() {
    let (server, client) = setup().await;
    server.insert("dev", "a.txt", "from dev");

    let dev = Options::new().with_branch("dev");
    assert!(!client.exists("a.txt", &Options::new()).await);
    assert_eq!(client.file("a.txt", &dev).text().await.unwrap(), "from dev");

    client.write("b.txt", "new", &dev).await.unwrap();
    assert!(server.content(BRANCH, "b.txt").is_none());
    assert_eq!(server.content("dev", "b.txt").unwrap(), "new");
}

#[tokio::test]
async fn default_options_apply_to_every_call() {
    let server = FakeGitlab::new().await;
    server.insert("dev", "a.txt", "from dev");

    let client = Client::builder(server.storage_config())
        .default_options(Options::new().with_branch("dev"))
        .build()
        .unwrap();

    assert!(client.exists("a.txt", &Options::new()).await);
    assert!(
        !client
            .exists("a.txt", &Options::new().with_branch(BRANCH))
            .await
    );
}

#[tokio::test]
async fn reads_slices() {
    let (server, client) = setup().await;
    server.insert(BRANCH, "hello.txt", "Hello World!");

    let file = client.file("hello.txt", &Options::new());
    assert_eq!(file.slice(0, Some(5), None).text().await.unwrap(), "Hello");
    assert_eq!(file.slice(6, None, None).text().await.unwrap(), "World!");

    let blob = file
        .slice(6, Some(11), Some("text/plain"))
        .blob()
        .await
        .unwrap();
    assert_eq!(blob.content_type(), Some("text/plain"));
    assert_eq!(blob.into_bytes(), "World");

    let middle = file.slice(2, Some(11), None);
    assert_eq!(middle.slice(4, None, None).text().await.unwrap(), "World");
}

#[tokio::test]
async fn slices_past_the_end_are_empty() {
    let (server, client) = setup().await;
    server.insert(BRANCH, "hello.txt", "Hello World!");
    server.insert(BRANCH, ".gitkeep", "");

    let file = client.file("hello.txt", &Options::new());
    assert_eq!(file.slice(20, None, None).text().await.unwrap(), "");

    let empty = client.file(".gitkeep", &Options::new());
    assert_eq!(empty.text().await.unwrap(), "");
    assert_eq!(empty.slice(0, None, None).text().await.unwrap(), "");
}

#[tokio::test]
async fn rejects_bad_token() {
    let server = FakeGitlab::new().await;
    server.insert(BRANCH, "a.txt", "a");

    let mut config = server.config();
    config.secret_access_key = remotestore_client::secret("wrong");
    let client = Client::new(remotestore_client::StorageConfig::Gitlab(config)).unwrap();

    assert!(!client.exists("a.txt", &Options::new()).await);

    let error = client
        .file("a.txt", &Options::new())
        .text()
        .await
        .unwrap_err();
    let Error::Backend {
        status, message, ..
    } = error
    else {
        panic!("expected backend error, got {error:?}");
    };
    assert_eq!(status.as_u16(), 401);
    assert_eq!(message, "401 Unauthorized");
}
