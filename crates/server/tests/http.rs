use std::fs::File;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use camino::{Utf8Path, Utf8PathBuf};
use keyparty_server::config::{
    InspectFailurePolicy, InspectorConfig, ServerConfig, StorageConfig, DEFAULT_MAX_UPLOAD_BYTES,
};
use keyparty_server::inspector::{parse_fingerprint_output, InspectError, KeyIdentity, KeyInspector};
use keyparty_server::{router, AppState};
use tempfile::TempDir;
use tower::ServiceExt;
use zip::ZipArchive;

const BOUNDARY: &str = "keyparty-test-boundary";

const ALICE: &str =
    "pub/DEADBEEF12345678 2021-01-01 Alice\n      Key fingerprint = AAAA BBBB CCCC DDDD\n";
const BOB: &str =
    "pub/CAFEF00D87654321 2021-01-02 Bob\n      Key fingerprint = 1111 2222 3333 4444\n";

/// Treats the key file's own content as the inspector output.
#[derive(Debug)]
struct EchoInspector;

#[async_trait]
impl KeyInspector for EchoInspector {
    async fn inspect(&self, path: &Utf8Path) -> Result<KeyIdentity, InspectError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| InspectError::Spawn {
                binary: "echo".into(),
                source,
            })?;

        parse_fingerprint_output(&content)
    }
}

struct Harness {
    _dir: TempDir,
    root: Utf8PathBuf,
    app: Router,
}

impl Harness {
    async fn new() -> Self {
        Self::with_policy(InspectFailurePolicy::Abort).await
    }

    async fn with_policy(on_error: InspectFailurePolicy) -> Self {
        let dir = TempDir::new().expect("tempdir should be created");
        let root = Utf8PathBuf::from_path_buf(dir.path().join("uploads"))
            .expect("tempdir path should be UTF-8");

        let mut inspector = InspectorConfig::default();
        inspector.on_error = on_error;

        let config = ServerConfig::new(
            Vec::new(),
            DEFAULT_MAX_UPLOAD_BYTES,
            StorageConfig::new(root.clone()),
            inspector,
        );

        let state = AppState::with_inspector(&config, Arc::new(EchoInspector))
            .await
            .expect("state should be created");

        Self {
            _dir: dir,
            root,
            app: router(Arc::new(state), config.max_upload_bytes),
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.app
            .clone()
            .oneshot(request)
            .await
            .expect("router should not fail")
    }

    async fn get(&self, uri: &str) -> Response {
        self.send(
            Request::get(uri)
                .body(Body::empty())
                .expect("request should build"),
        )
        .await
    }

    async fn upload(&self, uri: &str, parts: &[(&str, &str, &str)]) -> Response {
        self.send(multipart_request(uri, parts)).await
    }

    async fn submit(&self, uri: &str, parts: &[(&str, &str, &str)]) {
        assert_redirects_home(&self.upload(uri, parts).await);
    }

    fn path(&self, relative: &str) -> Utf8PathBuf {
        self.root.join(relative)
    }

    fn archive_entries(&self, archive: &str) -> Vec<String> {
        let path = self.path(archive);
        if !path.exists() {
            return Vec::new();
        }

        let file = File::open(path).expect("archive should open");
        let mut archive = ZipArchive::new(file).expect("archive should parse");

        (0..archive.len())
            .map(|index| {
                archive
                    .by_index(index)
                    .expect("entry should exist")
                    .name()
                    .to_owned()
            })
            .collect()
    }

    fn key_names(&self, folder: &str) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(self.path(folder))
            .expect("folder should exist")
            .map(|entry| {
                entry
                    .expect("entry should be readable")
                    .file_name()
                    .into_string()
                    .expect("name should be UTF-8")
            })
            .collect();
        names.sort();
        names
    }
}

fn multipart_request(uri: &str, parts: &[(&str, &str, &str)]) -> Request<Body> {
    let mut body = String::new();

    for (field, file_name, content) in parts {
        body.push_str("--");
        body.push_str(BOUNDARY);
        body.push_str("\r\nContent-Disposition: form-data; name=\"");
        body.push_str(field);
        body.push_str("\"; filename=\"");
        body.push_str(file_name);
        body.push_str("\"\r\nContent-Type: application/pgp-keys\r\n\r\n");
        body.push_str(content);
        body.push_str("\r\n");
    }
    body.push_str("--");
    body.push_str(BOUNDARY);
    body.push_str("--\r\n");

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("request should build")
}

async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable")
        .to_vec()
}

async fn body_text(response: Response) -> String {
    String::from_utf8(body_bytes(response).await).expect("body should be UTF-8")
}

fn assert_redirects_home(response: &Response) {
    assert!(
        response.status().is_redirection(),
        "expected redirect, got {}",
        response.status()
    );
    assert_eq!(
        response
            .headers()
            .get(header::LOCATION)
            .expect("redirect should carry a location"),
        "/"
    );
}

#[tokio::test]
async fn test_upload_key_stores_and_archives() {
    let harness = Harness::new().await;

    let response = harness
        .upload("/", &[("file", "../Alice Key.asc", ALICE)])
        .await;

    assert_redirects_home(&response);
    assert_eq!(harness.key_names("keys"), vec!["Alice_Key.asc"]);
    assert_eq!(
        std::fs::read_to_string(harness.path("keys/Alice_Key.asc")).expect("key should exist"),
        ALICE
    );
    assert_eq!(
        harness.archive_entries("csc_keys.zip"),
        vec!["keys/Alice_Key.asc"]
    );

    let response = harness.upload("/", &[("file", "bob.asc", BOB)]).await;

    assert_redirects_home(&response);
    assert_eq!(
        harness.archive_entries("csc_keys.zip"),
        vec!["keys/Alice_Key.asc", "keys/bob.asc"]
    );
}

#[tokio::test]
async fn test_upload_disallowed_extension_is_ignored() {
    let harness = Harness::new().await;

    harness.submit("/", &[("file", "alice.asc", ALICE)]).await;
    let before = std::fs::read(harness.path("csc_keys.zip")).expect("archive should exist");

    for file_name in ["notes.txt", "noextension", "alice.ASC", ""] {
        let response = harness.upload("/", &[("file", file_name, BOB)]).await;

        assert_redirects_home(&response);
    }

    assert_eq!(harness.key_names("keys"), vec!["alice.asc"]);
    assert_eq!(
        std::fs::read(harness.path("csc_keys.zip")).expect("archive should exist"),
        before
    );
}

#[tokio::test]
async fn test_upload_same_name_twice_keeps_both_entries() {
    let harness = Harness::new().await;

    harness.submit("/", &[("file", "alice.asc", BOB)]).await;
    harness.submit("/", &[("file", "alice.asc", ALICE)]).await;

    assert_eq!(
        harness.archive_entries("csc_keys.zip"),
        vec!["keys/alice.asc", "keys/alice.asc"]
    );
    assert_eq!(
        std::fs::read_to_string(harness.path("keys/alice.asc")).expect("key should exist"),
        ALICE
    );
}

#[tokio::test]
async fn test_upload_without_file_field_is_rejected() {
    let harness = Harness::new().await;

    let response = harness.upload("/", &[("other", "alice.asc", ALICE)]).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains("`file`"));
    assert!(harness.key_names("keys").is_empty());
    assert!(!harness.path("csc_keys.zip").exists());
}

#[tokio::test]
async fn test_upload_signed_keys_stores_pair() {
    let harness = Harness::new().await;

    let response = harness
        .upload(
            "/signed_keys",
            &[
                ("file", "alice-signed.asc", "signed key"),
                ("signature", "alice-signed.sig.asc", "signature"),
            ],
        )
        .await;

    assert_redirects_home(&response);
    assert_eq!(
        harness.key_names("signed_keys"),
        vec!["alice-signed.asc", "alice-signed.sig.asc"]
    );
    assert_eq!(
        harness.archive_entries("csc_signed_keys.zip"),
        vec!["signed_keys/alice-signed.asc", "signed_keys/alice-signed.sig.asc"]
    );
    assert!(harness.key_names("keys").is_empty());
}

#[tokio::test]
async fn test_upload_signed_keys_with_bad_signature_writes_nothing() {
    let harness = Harness::new().await;

    let response = harness
        .upload(
            "/signed_keys",
            &[
                ("file", "alice-signed.asc", "signed key"),
                ("signature", "alice-signed.sig", "signature"),
            ],
        )
        .await;

    assert_redirects_home(&response);
    assert!(harness.key_names("signed_keys").is_empty());
    assert!(!harness.path("csc_signed_keys.zip").exists());
}

#[tokio::test]
async fn test_upload_signed_keys_without_signature_is_rejected() {
    let harness = Harness::new().await;

    let response = harness
        .upload("/signed_keys", &[("file", "alice-signed.asc", "signed key")])
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(harness.key_names("signed_keys").is_empty());
}

#[tokio::test]
async fn test_get_signed_keys_redirects() {
    let harness = Harness::new().await;

    assert_redirects_home(&harness.get("/signed_keys").await);
}

#[tokio::test]
async fn test_index_without_archives() {
    let harness = Harness::new().await;

    let response = harness.get("/").await;

    assert_eq!(response.status(), StatusCode::OK);

    let page = body_text(response).await;
    assert!(page.contains("<code id=\"archive-sum\"></code>"));
    assert!(page.contains("<code id=\"signed-archive-sum\"></code>"));
    assert!(page.contains("<pre id=\"key-ids\"></pre>"));
}

#[tokio::test]
async fn test_index_lists_keys_and_digest() {
    let harness = Harness::new().await;

    harness.submit("/", &[("file", "bob.asc", BOB)]).await;
    harness.submit("/", &[("file", "alice.asc", ALICE)]).await;
    std::fs::write(harness.path("keys/.gitignore"), "*").expect("marker should be written");

    let response = harness.get("/").await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_text(response).await;

    let alice_row = "<tr><td><a href='/download/alice.asc'>alice.asc</a></td>\
                     <td>DEADBEEF</td><td>AAAA BBBB CCCC DDDD</td></tr>";
    let bob_row = "<tr><td><a href='/download/bob.asc'>bob.asc</a></td>\
                   <td>CAFEF00D</td><td>1111 2222 3333 4444</td></tr>";

    let alice_at = page.find(alice_row).expect("alice should be listed");
    let bob_at = page.find(bob_row).expect("bob should be listed");
    assert!(alice_at < bob_at, "rows should be sorted by file name");
    assert!(!page.contains(".gitignore"));
    assert!(page.contains("gpg --recv-keys DEADBEEF CAFEF00D"));

    let archive_sum = page
        .split("<code id=\"archive-sum\">")
        .nth(1)
        .and_then(|rest| rest.split("</code>").next())
        .expect("archive digest should be rendered");
    assert_eq!(archive_sum.len(), 64);
    assert!(archive_sum.chars().all(|c| c.is_ascii_hexdigit()));
}

#[tokio::test]
async fn test_index_aborts_on_uninspectable_key() {
    let harness = Harness::new().await;

    harness.submit("/", &[("file", "alice.asc", ALICE)]).await;
    harness
        .submit("/", &[("file", "broken.asc", "not a key listing")])
        .await;

    let response = harness.get("/").await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_text(response).await.contains("key inspection failed"));
}

#[tokio::test]
async fn test_index_skips_uninspectable_key() {
    let harness = Harness::with_policy(InspectFailurePolicy::Skip).await;

    harness.submit("/", &[("file", "alice.asc", ALICE)]).await;
    harness
        .submit("/", &[("file", "broken.asc", "not a key listing")])
        .await;

    let response = harness.get("/").await;

    assert_eq!(response.status(), StatusCode::OK);
    let page = body_text(response).await;
    assert!(page.contains("DEADBEEF"));
    assert!(!page.contains("broken.asc"));
}

#[tokio::test]
async fn test_download_key() {
    let harness = Harness::new().await;

    harness.submit("/", &[("file", "alice.asc", ALICE)]).await;

    let response = harness.get("/download/alice.asc").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .expect("download should be an attachment"),
        "attachment; filename=\"alice.asc\""
    );
    assert_eq!(body_text(response).await, ALICE);
}

#[tokio::test]
async fn test_download_key_placed_by_hand() {
    let harness = Harness::new().await;

    std::fs::write(harness.path("keys/My Key.asc"), ALICE).expect("key should be written");

    let page = body_text(harness.get("/").await).await;
    assert!(
        page.contains("<a href='/download/My%20Key.asc'>My Key.asc</a>"),
        "link should be percent-encoded"
    );

    let response = harness.get("/download/My%20Key.asc").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .expect("download should be an attachment"),
        "attachment; filename=\"My Key.asc\""
    );
    assert_eq!(body_text(response).await, ALICE);
}

#[tokio::test]
async fn test_download_missing_key() {
    let harness = Harness::new().await;

    assert_eq!(
        harness.get("/download/nobody.asc").await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_download_cannot_escape_keys_folder() {
    let harness = Harness::new().await;

    harness.submit("/", &[("file", "alice.asc", ALICE)]).await;
    assert!(harness.path("csc_keys.zip").exists());

    for uri in ["/download/..%2Fcsc_keys.zip", "/download/..", "/download/%2E%2E"] {
        let response = harness.get(uri).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
    }
}

#[tokio::test]
async fn test_download_archive_before_any_upload() {
    let harness = Harness::new().await;

    assert_eq!(harness.get("/download").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        harness.get("/download_signed").await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(harness.get("/").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_download_archive_is_stable() {
    let harness = Harness::new().await;

    harness.submit("/", &[("file", "alice.asc", ALICE)]).await;

    let first = harness.get("/download").await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(
        first
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .expect("download should be an attachment"),
        "attachment; filename=\"csc_keys.zip\""
    );
    let first = body_bytes(first).await;
    let second = body_bytes(harness.get("/download").await).await;

    assert_eq!(first, second);
    assert_eq!(
        first,
        std::fs::read(harness.path("csc_keys.zip")).expect("archive should exist")
    );
}

#[tokio::test]
async fn test_download_signed_archive() {
    let harness = Harness::new().await;

    harness
        .submit(
            "/signed_keys",
            &[("file", "a.asc", "key"), ("signature", "a.sig.asc", "sig")],
        )
        .await;

    let response = harness.get("/download_signed").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_bytes(response).await,
        std::fs::read(harness.path("csc_signed_keys.zip")).expect("archive should exist")
    );
}
