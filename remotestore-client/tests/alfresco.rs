use std::time::Duration;

use futures_util::TryStreamExt;
use remotestore_client::{Client, Error, Options};
use remotestore_test::alfresco::FakeAlfresco;
use serde_json::{Value, json};

const BUCKET: &str = "Sites/docs";

async fn setup() -> (FakeAlfresco, Client) {
    remotestore_test::tracing::init();
    let server = FakeAlfresco::new().await;
    let client = Client::new(server.storage_config(BUCKET)).unwrap();
    (server, client)
}

#[tokio::test]
async fn reads_json_document() {
    let (server, client) = setup().await;
    server.insert("Sites/docs/123.json", r#"{"a":1}"#, "application/json");

    let file = client.file("123.json", &Options::new());
    let value: Value = file.json().await.unwrap();
    assert_eq!(value, json!({"a": 1}));

    let metadata = file.stat().await.unwrap();
    assert_eq!(metadata.kind, "cm:content");
    assert_eq!(metadata.size, 7);
    assert_eq!(metadata.content_type.as_deref(), Some("application/json"));
    assert_eq!(client.size("123.json", &Options::new()).await.unwrap(), 7);
}

#[tokio::test]
async fn exists_agrees_with_stat() {
    let (server, client) = setup().await;
    server.insert("Sites/docs/present.txt", "here", "text/plain");

    assert!(client.exists("present.txt", &Options::new()).await);
    assert!(client.stat("present.txt", &Options::new()).await.is_ok());

    assert!(!client.exists("missing.txt", &Options::new()).await);
    let error = client.stat("missing.txt", &Options::new()).await.unwrap_err();
    assert!(matches!(error, Error::NotFound { ref path } if path == "Sites/docs/missing.txt"));

    let file = client.file("missing.txt", &Options::new());
    assert!(!file.exists().await);
}

#[tokio::test]
async fn folders_exist() {
    let (server, client) = setup().await;
    server.insert("Sites/docs/reports/a.txt", "a", "text/plain");

    let metadata = client.stat("reports", &Options::new()).await.unwrap();
    assert_eq!(metadata.kind, "cm:folder");
    assert!(client.exists("reports", &Options::new()).await);
}

#[tokio::test]
async fn size_matches_stat_for_empty_documents() {
    let (server, client) = setup().await;
    server.insert("Sites/docs/empty.txt", "", "text/plain");

    let file = client.file("empty.txt", &Options::new());
    assert_eq!(file.size().await.unwrap(), 0);
    assert_eq!(file.stat().await.unwrap().size, 0);
    assert!(file.exists().await);
    assert_eq!(file.text().await.unwrap(), "");
}

#[tokio::test]
async fn cached_stat_is_stable() {
    let (server, client) = setup().await;
    server.insert("Sites/docs/a.txt", "short", "text/plain");

    let file = client.file("a.txt", &Options::new());
    assert!(file.cached_metadata().is_none());
    assert_eq!(file.stat().await.unwrap().size, 5);
    assert_eq!(file.cached_metadata().map(|metadata| metadata.size), Some(5));

    server.insert("Sites/docs/a.txt", "much longer now", "text/plain");
    assert_eq!(file.stat().await.unwrap().size, 5);
    assert_eq!(server.requests().count("GET", "/nodes/-my-"), 1);

    let fresh = client.file("a.txt", &Options::new());
    assert_eq!(fresh.stat().await.unwrap().size, 15);
}

#[tokio::test]
async fn write_then_read_back() {
    let (server, client) = setup().await;

    let options = Options::new().with_content_type("text/plain");
    let written = client
        .write("notes/hello.txt", "Hello World!", &options)
        .await
        .unwrap();
    assert_eq!(written, 12);
    assert_eq!(
        server.content("Sites/docs/notes/hello.txt").unwrap(),
        "Hello World!"
    );

    let file = client.file("notes/hello.txt", &Options::new());
    assert!(file.exists().await);
    assert_eq!(file.size().await.unwrap(), 12);
    assert_eq!(file.text().await.unwrap(), "Hello World!");

    let blob = file.blob().await.unwrap();
    assert_eq!(blob.content_type(), Some("text/plain"));
    assert_eq!(blob.size(), 12);
}

#[tokio::test]
async fn write_through_handle() {
    let (server, client) = setup().await;

    let file = client.file("./sub/../data.bin", &Options::new());
    let written = file.write(vec![0u8, 159, 146, 150], &Options::new()).await.unwrap();
    assert_eq!(written, 4);
    assert!(server.content("Sites/docs/data.bin").is_some());

    let fresh = client.file("data.bin", &Options::new());
    assert_eq!(fresh.buffer().await.unwrap(), vec![0u8, 159, 146, 150]);
}

#[tokio::test]
async fn write_conflicts_with_existing_document() {
    let (server, client) = setup().await;
    server.insert("Sites/docs/a.txt", "a", "text/plain");

    let error = client
        .write("a.txt", "b", &Options::new())
        .await
        .unwrap_err();
    let Error::Backend {
        backend, status, ..
    } = error
    else {
        panic!("expected backend error, got {error:?}");
    };
    assert_eq!(backend, "alfresco");
    assert_eq!(status.as_u16(), 409);
}

#[tokio::test]
async fn write_requires_a_name() {
    let (_server, client) = setup().await;

    let error = client.write("/", "x", &Options::new()).await.unwrap_err();
    assert!(matches!(error, Error::InvalidPath { .. }));
}

#[tokio::test]
async fn delete_then_missing() {
    let (server, client) = setup().await;
    server.insert("Sites/docs/a.txt", "a", "text/plain");

    let file = client.file("a.txt", &Options::new());
    assert!(file.exists().await);
    file.delete().await.unwrap();

    // The handle already knew the node id.
    assert_eq!(server.requests().count("GET", "/nodes/-my-"), 1);
    assert_eq!(server.requests().count("DELETE", "/nodes/"), 1);

    assert!(!client.file("a.txt", &Options::new()).exists().await);
    assert!(server.content("Sites/docs/a.txt").is_none());
}

#[tokio::test]
async fn delete_missing_document_fails() {
    let (_server, client) = setup().await;

    let error = client.delete("nope.txt", &Options::new()).await.unwrap_err();
    assert!(matches!(error, Error::NotFound { .. }));
}

#[tokio::test]
async fn presign_creates_and_reuses_shared_link() {
    let (server, client) = setup().await;
    let node_id = server.insert("Sites/docs/report.pdf", "%PDF", "application/pdf");

    let url = client.presign("report.pdf", &Options::new()).await.unwrap();
    assert_eq!(server.requests().count("GET", "/nodes/-my-"), 1);
    assert_eq!(server.requests().count("POST", "/shared-links"), 1);

    let link_id = server.shared_link(&node_id).unwrap();
    assert!(url.path().ends_with(&format!("/shared-links/{link_id}/content")));
    let query: Vec<_> = url.query_pairs().into_owned().collect();
    assert_eq!(query[0], ("attachment".to_owned(), "true".to_owned()));
    assert_eq!(query[1].0, "v");

    let content = reqwest::get(url).await.unwrap().text().await.unwrap();
    assert_eq!(content, "%PDF");

    let inline = Options::new().with_inline(true);
    let again = client.presign("report.pdf", &inline).await.unwrap();
    assert_eq!(server.requests().count("GET", "/nodes/-my-"), 2);
    assert_eq!(server.requests().count("POST", "/shared-links"), 2);
    assert!(again.path().ends_with(&format!("/shared-links/{link_id}/content")));
    assert!(again.query().unwrap().starts_with("attachment=false&v="));
}

#[tokio::test]
async fn presign_requests_expiry() {
    let (server, client) = setup().await;
    let node_id = server.insert("Sites/docs/a.txt", "a", "text/plain");

    let options = Options::new().with_expires_in(Duration::from_secs(3600));
    client
        .file("a.txt", &Options::new())
        .presign(&options)
        .await
        .unwrap();

    let link_id = server.shared_link(&node_id).unwrap();
    let expires_at = server.link_expiration(&link_id).unwrap();
    assert!(expires_at.ends_with('Z'), "{expires_at}");
}

#[tokio::test]
async fn presign_missing_document_fails() {
    let (server, client) = setup().await;

    let result = client.presign("missing.pdf", &Options::new()).await;
    assert!(matches!(result, Err(Error::NotFound { .. })));
    assert_eq!(server.requests().count("POST", "/shared-links"), 0);
}

#[tokio::test]
async fn requests_a_single_ticket() {
    let (server, client) = setup().await;
    server.insert("Sites/docs/a.txt", "a", "text/plain");
    server.insert("Sites/docs/b.txt", "bb", "text/plain");

    let none = Options::new();
    let first = client.file("a.txt", &none);
    let second = client.file("b.txt", &none);
    let (a, b, c) = tokio::join!(first.size(), second.size(), client.exists("c.txt", &none));
    assert_eq!(a.unwrap(), 1);
    assert_eq!(b.unwrap(), 2);
    assert!(!c);

    client.clone().stat("a.txt", &Options::new()).await.unwrap();

    assert_eq!(server.tickets_issued(), 1);
    assert_eq!(server.requests().count("POST", "/tickets"), 1);
}

#[tokio::test]
async fn rejects_bad_credentials() {
    let server = FakeAlfresco::new().await;
    server.insert("Sites/docs/a.txt", "a", "text/plain");

    let mut config = server.config(BUCKET);
    config.secret_access_key = remotestore_client::secret("wrong");
    let client = Client::new(remotestore_client::StorageConfig::Alfresco(config)).unwrap();

    let error = client.stat("a.txt", &Options::new()).await.unwrap_err();
    let Error::Backend {
        status, message, ..
    } = error
    else {
        panic!("expected backend error, got {error:?}");
    };
    assert_eq!(status.as_u16(), 403);
    assert_eq!(message, "Login failed");
    assert!(!client.exists("a.txt", &Options::new()).await);
}

#[tokio::test]
async fn reads_slices() {
    let (server, client) = setup().await;
    server.insert("Sites/docs/hello.txt", "Hello World!", "text/plain");

    let file = client.file("hello.txt", &Options::new());
    assert_eq!(file.size().await.unwrap(), 12);
    assert_eq!(file.slice(0, Some(5), None).text().await.unwrap(), "Hello");

    let tail = file.slice(6, None, Some("text/x-greeting"));
    let blob = tail.blob().await.unwrap();
    assert_eq!(blob.bytes().as_ref(), b"World!");
    assert_eq!(blob.content_type(), Some("text/x-greeting"));

    // Slices start with the metadata the original handle cached.
    assert_eq!(server.requests().count("GET", "/nodes/-my-"), 1);

    let before = server.requests().len();
    assert_eq!(file.slice(3, Some(3), None).bytes().await.unwrap().len(), 0);
    assert_eq!(server.requests().len(), before);
}

#[tokio::test]
async fn slices_past_the_end_are_empty() {
    let (server, client) = setup().await;
    server.insert("Sites/docs/hello.txt", "Hello World!", "text/plain");
    server.insert("Sites/docs/empty.txt", "", "text/plain");

    let file = client.file("hello.txt", &Options::new());
    assert_eq!(file.slice(20, None, None).text().await.unwrap(), "");
    assert_eq!(file.slice(12, Some(20), None).text().await.unwrap(), "");

    let empty = client.file("empty.txt", &Options::new());
    assert_eq!(empty.slice(0, None, None).text().await.unwrap(), "");
}

#[tokio::test]
async fn slices_of_slices_are_relative() {
    let (server, client) = setup().await;
    server.insert("Sites/docs/hello.txt", "Hello World!", "text/plain");

    let tail = client.file("hello.txt", &Options::new()).slice(6, None, None);
    assert_eq!(tail.slice(0, Some(5), None).text().await.unwrap(), "World");
    assert_eq!(tail.slice(2, Some(100), None).text().await.unwrap(), "rld!");
}

#[tokio::test]
async fn streams_content() {
    let (server, client) = setup().await;
    let content = "x".repeat(256 * 1024);
    server.insert("Sites/docs/big.txt", content.clone(), "text/plain");

    let stream = client.file("big.txt", &Options::new()).stream().await.unwrap();
    let chunks: Vec<_> = stream.try_collect().await.unwrap();
    let total: usize = chunks.iter().map(|chunk| chunk.len()).sum();
    assert_eq!(total, content.len());
}

#[tokio::test]
async fn reads_form_data() {
    let (server, client) = setup().await;
    server.insert(
        "Sites/docs/form.txt",
        "title=Quarterly+report&tag=a&tag=b",
        "application/x-www-form-urlencoded",
    );

    let form = client
        .file("form.txt", &Options::new())
        .form_data()
        .await
        .unwrap();
    assert_eq!(
        form.get("title").and_then(|field| field.as_str()),
        Some("Quarterly report")
    );
    assert_eq!(form.get_all("tag").count(), 2);
}

#[tokio::test]
async fn bucket_override() {
    let (server, client) = setup().await;
    server.insert("Shared/a.txt", "shared", "text/plain");

    let options = Options::new().with_bucket("Shared");
    assert_eq!(
        client.file("a.txt", &options).text().await.unwrap(),
        "shared"
    );
    assert!(!client.exists("a.txt", &Options::new()).await);
}
