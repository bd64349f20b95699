//! Registry backend tests against a mock distribution API.
//!
//! | Repository | Tag | Contents |
//! |------------|-----|----------|
//! | `tuf/metadata` | `current` | `1.root.json`, `timestamp.json`, `1.snapshot.json`, `1.targets.json` |
//! | `tuf/metadata` | `delegated` | `1.delegated.json` |
//! | `tuf/targets` | `file.txt` | `file.txt` |
//! | `tuf/targets` | `subdir` | index → image holding `file.txt` |

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tufmux_fetch::registry::{
    Credential, CredentialChain, CredentialProvider, OCI_IMAGE_INDEX, OCI_IMAGE_MANIFEST,
    TUF_FILENAME_ANNOTATION, TUF_METADATA_MEDIA_TYPE, TUF_TARGET_MEDIA_TYPE,
};
use tufmux_fetch::{FetchConfig, FetchError, Fetcher, RegistryFetcher};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);
const MAX: u64 = 1024 * 1024;

fn digest(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

fn descriptor(name: &str, data: &[u8], media_type: &str) -> Value {
    json!({
        "mediaType": media_type,
        "digest": digest(data),
        "size": data.len(),
        "annotations": { TUF_FILENAME_ANNOTATION: name }
    })
}

fn image(layers: Vec<Value>) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "schemaVersion": 2,
        "mediaType": OCI_IMAGE_MANIFEST,
        "layers": layers
    }))
    .unwrap()
}

fn host(server: &MockServer) -> String {
    server.uri().trim_start_matches("http://").to_string()
}

fn fetcher(server: &MockServer) -> RegistryFetcher {
    fetcher_with(server, CredentialChain::anonymous())
}

fn fetcher_with(server: &MockServer, credentials: CredentialChain) -> RegistryFetcher {
    let host = host(server);
    RegistryFetcher::with_credentials(
        &format!("oci://{host}/tuf/metadata:current"),
        &format!("oci://{host}/tuf/targets"),
        &FetchConfig::default(),
        credentials,
    )
    .unwrap()
}

fn metadata_address(server: &MockServer, file_name: &str) -> String {
    format!("oci://{}/tuf/metadata:current/{file_name}", host(server))
}

fn target_address(server: &MockServer, target: &str) -> String {
    format!("oci://{}/tuf/targets/{target}", host(server))
}

async fn mount_manifest(server: &MockServer, repo: &str, reference: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(format!("/v2/{repo}/manifests/{reference}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

async fn mount_blob(server: &MockServer, repo: &str, data: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!("/v2/{repo}/blobs/{}", digest(data))))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(data.to_vec()))
        .mount(server)
        .await;
}

// ── Metadata repository ──────────────────────────────────────────────

#[tokio::test]
async fn fetch_top_level_metadata_from_current_tag() {
    let server = MockServer::start().await;
    let root = br#"{"signed":{"_type":"root","version":1}}"#;
    let timestamp = br#"{"signed":{"_type":"timestamp","version":7}}"#;

    mount_manifest(
        &server,
        "tuf/metadata",
        "current",
        image(vec![
            descriptor("1.root.json", root, TUF_METADATA_MEDIA_TYPE),
            descriptor("timestamp.json", timestamp, TUF_METADATA_MEDIA_TYPE),
        ]),
    )
    .await;
    mount_blob(&server, "tuf/metadata", root).await;
    mount_blob(&server, "tuf/metadata", timestamp).await;

    let mut fetcher = fetcher(&server);

    let data = fetcher
        .fetch(&metadata_address(&server, "1.root.json"), MAX, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(&data[..], root);

    let data = fetcher
        .fetch(&metadata_address(&server, "timestamp.json"), MAX, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(&data[..], timestamp);
}

#[tokio::test]
async fn fetch_delegated_metadata_from_role_tag() {
    let server = MockServer::start().await;
    let delegated = br#"{"signed":{"_type":"targets","version":1,"targets":{}}}"#;

    mount_manifest(
        &server,
        "tuf/metadata",
        "delegated",
        image(vec![descriptor(
            "1.delegated.json",
            delegated,
            TUF_METADATA_MEDIA_TYPE,
        )]),
    )
    .await;
    mount_blob(&server, "tuf/metadata", delegated).await;

    let mut fetcher = fetcher(&server);
    let data = fetcher
        .fetch(&metadata_address(&server, "1.delegated.json"), MAX, TIMEOUT)
        .await
        .unwrap();

    assert_eq!(&data[..], delegated);
}

#[tokio::test]
async fn missing_metadata_is_not_found() {
    let server = MockServer::start().await;
    let root = br#"{"signed":{"_type":"root","version":1}}"#;

    mount_manifest(
        &server,
        "tuf/metadata",
        "current",
        image(vec![descriptor("1.root.json", root, TUF_METADATA_MEDIA_TYPE)]),
    )
    .await;

    let mut fetcher = fetcher(&server);

    let err = fetcher
        .fetch(&metadata_address(&server, "2.root.json"), MAX, TIMEOUT)
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "{err}");

    // No `unknown` tag is mounted, so the registry answers 404.
    let err = fetcher
        .fetch(&metadata_address(&server, "unknown.json"), MAX, TIMEOUT)
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "{err}");
}

// ── Targets repository ───────────────────────────────────────────────

#[tokio::test]
async fn fetch_flat_target() {
    let server = MockServer::start().await;
    let content = b"hello from a flat target\n";

    mount_manifest(
        &server,
        "tuf/targets",
        "file.txt",
        image(vec![descriptor("file.txt", content, TUF_TARGET_MEDIA_TYPE)]),
    )
    .await;
    mount_blob(&server, "tuf/targets", content).await;

    let mut fetcher = fetcher(&server);
    let data = fetcher
        .fetch(&target_address(&server, "file.txt"), MAX, TIMEOUT)
        .await
        .unwrap();

    assert_eq!(&data[..], content);
}

#[tokio::test]
async fn fetch_subdirectory_target_through_index() {
    let server = MockServer::start().await;
    let content = b"nested target";

    let child = image(vec![descriptor("file.txt", content, TUF_TARGET_MEDIA_TYPE)]);
    let child_digest = digest(&child);
    let index = serde_json::to_vec(&json!({
        "schemaVersion": 2,
        "mediaType": OCI_IMAGE_INDEX,
        "manifests": [{
            "mediaType": OCI_IMAGE_MANIFEST,
            "digest": child_digest,
            "size": child.len(),
            "annotations": { TUF_FILENAME_ANNOTATION: "subdir/file.txt" }
        }]
    }))
    .unwrap();

    mount_manifest(&server, "tuf/targets", "subdir", index).await;
    mount_manifest(&server, "tuf/targets", &child_digest, child).await;
    mount_blob(&server, "tuf/targets", content).await;

    let mut fetcher = fetcher(&server);
    let data = fetcher
        .fetch(&target_address(&server, "subdir/file.txt"), MAX, TIMEOUT)
        .await
        .unwrap();

    assert_eq!(&data[..], content);
}

#[tokio::test]
async fn missing_target_is_not_found() {
    let server = MockServer::start().await;
    let mut fetcher = fetcher(&server);

    let err = fetcher
        .fetch(&target_address(&server, "absent.txt"), MAX, TIMEOUT)
        .await
        .unwrap_err();

    assert!(err.is_not_found(), "{err}");
}

#[tokio::test]
async fn gzip_layer_is_decompressed() {
    let server = MockServer::start().await;
    let content = b"compressed target content";
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content).unwrap();
    let compressed = encoder.finish().unwrap();

    mount_manifest(
        &server,
        "tuf/targets",
        "file.txt",
        image(vec![descriptor(
            "file.txt",
            &compressed,
            "application/vnd.tuf.target+gzip",
        )]),
    )
    .await;
    mount_blob(&server, "tuf/targets", &compressed).await;

    let mut fetcher = fetcher(&server);
    let data = fetcher
        .fetch(&target_address(&server, "file.txt"), MAX, TIMEOUT)
        .await
        .unwrap();

    assert_eq!(&data[..], content);
}

// ── Caching ──────────────────────────────────────────────────────────

#[tokio::test]
async fn repeated_fetch_pulls_manifest_and_layer_once() {
    let server = MockServer::start().await;
    let content = b"cached target";

    Mock::given(method("GET"))
        .and(path("/v2/tuf/targets/manifests/file.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(image(vec![descriptor(
            "file.txt",
            content,
            TUF_TARGET_MEDIA_TYPE,
        )])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/v2/tuf/targets/blobs/{}", digest(content))))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let mut fetcher = fetcher(&server);
    let address = target_address(&server, "file.txt");

    let first = fetcher.fetch(&address, MAX, TIMEOUT).await.unwrap();
    let second = fetcher.fetch(&address, MAX, TIMEOUT).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(fetcher.manifest_cache_stats().hits, 1);
    assert_eq!(fetcher.layer_cache_stats().hits, 1);

    server.verify().await;
}

#[tokio::test]
async fn index_target_is_pulled_once_and_limit_rechecked() {
    let server = MockServer::start().await;
    let content = b"nested target, cached";

    let child = image(vec![descriptor("file.txt", content, TUF_TARGET_MEDIA_TYPE)]);
    let child_digest = digest(&child);
    let index = serde_json::to_vec(&json!({
        "schemaVersion": 2,
        "mediaType": OCI_IMAGE_INDEX,
        "manifests": [{
            "mediaType": OCI_IMAGE_MANIFEST,
            "digest": child_digest,
            "size": child.len(),
            "annotations": { TUF_FILENAME_ANNOTATION: "subdir/file.txt" }
        }]
    }))
    .unwrap();

    Mock::given(method("GET"))
        .and(path("/v2/tuf/targets/manifests/subdir"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(index))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/v2/tuf/targets/manifests/{child_digest}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(child))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/v2/tuf/targets/blobs/{}", digest(content))))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let mut fetcher = fetcher(&server);
    let address = target_address(&server, "subdir/file.txt");

    let first = fetcher.fetch(&address, MAX, TIMEOUT).await.unwrap();
    let second = fetcher.fetch(&address, MAX, TIMEOUT).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(&first[..], content);

    let err = fetcher.fetch(&address, 4, TIMEOUT).await.unwrap_err();
    assert!(matches!(err, FetchError::LengthMismatch { .. }), "{err}");

    assert_eq!(fetcher.manifest_cache_stats().entries, 2);
    assert_eq!(fetcher.layer_cache_stats().entries, 1);

    server.verify().await;
}

#[tokio::test]
async fn cached_layer_is_checked_against_later_limit() {
    let server = MockServer::start().await;
    let content = vec![b'z'; 1000];
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(&content).unwrap();
    let compressed = encoder.finish().unwrap();
    assert!(compressed.len() < 100);

    mount_manifest(
        &server,
        "tuf/targets",
        "file.txt",
        image(vec![descriptor(
            "file.txt",
            &compressed,
            "application/vnd.tuf.target+gzip",
        )]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path(format!("/v2/tuf/targets/blobs/{}", digest(&compressed))))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(compressed.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let mut fetcher = fetcher(&server);
    let address = target_address(&server, "file.txt");

    let data = fetcher.fetch(&address, MAX, TIMEOUT).await.unwrap();
    assert_eq!(data.len(), 1000);

    // The declared (compressed) size fits, the cached content does not.
    let err = fetcher.fetch(&address, 100, TIMEOUT).await.unwrap_err();
    assert!(
        matches!(err, FetchError::LengthMismatch { length: 1000, max_length: 100, .. }),
        "{err}"
    );
    assert_eq!(fetcher.layer_cache_stats().hits, 1);

    server.verify().await;
}

// ── Timeouts ─────────────────────────────────────────────────────────

#[tokio::test]
async fn slow_manifest_is_transport_error() {
    let server = MockServer::start().await;
    let content = b"too late";

    Mock::given(method("GET"))
        .and(path("/v2/tuf/targets/manifests/file.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(image(vec![descriptor(
                    "file.txt",
                    content,
                    TUF_TARGET_MEDIA_TYPE,
                )]))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;
    mount_blob(&server, "tuf/targets", content).await;

    let mut fetcher = fetcher(&server);
    let err = fetcher
        .fetch(
            &target_address(&server, "file.txt"),
            MAX,
            Duration::from_millis(200),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Transport(_)), "{err}");
}

// ── Length limits ────────────────────────────────────────────────────

#[tokio::test]
async fn declared_size_over_limit_is_length_mismatch() {
    let server = MockServer::start().await;
    let content = vec![b'x'; 100];

    mount_manifest(
        &server,
        "tuf/targets",
        "big.bin",
        image(vec![descriptor("big.bin", &content, TUF_TARGET_MEDIA_TYPE)]),
    )
    .await;

    Mock::given(method("GET"))
        .and(path(format!("/v2/tuf/targets/blobs/{}", digest(&content))))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.clone()))
        .expect(0)
        .mount(&server)
        .await;

    let mut fetcher = fetcher(&server);
    let err = fetcher
        .fetch(&target_address(&server, "big.bin"), 10, TIMEOUT)
        .await
        .unwrap_err();

    assert!(
        matches!(err, FetchError::LengthMismatch { length: 100, max_length: 10, .. }),
        "{err}"
    );
}

#[tokio::test]
async fn actual_size_over_limit_is_length_mismatch() {
    let server = MockServer::start().await;
    let content = vec![b'y'; 64];

    // The manifest under-declares the layer size.
    let mut layer = descriptor("liar.bin", &content, TUF_TARGET_MEDIA_TYPE);
    layer["size"] = json!(4);

    mount_manifest(&server, "tuf/targets", "liar.bin", image(vec![layer])).await;
    mount_blob(&server, "tuf/targets", &content).await;

    let mut fetcher = fetcher(&server);
    let err = fetcher
        .fetch(&target_address(&server, "liar.bin"), 16, TIMEOUT)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::LengthMismatch { .. }), "{err}");
}

#[tokio::test]
async fn corrupted_blob_is_transport_error() {
    let server = MockServer::start().await;
    let content = b"expected";

    mount_manifest(
        &server,
        "tuf/targets",
        "file.txt",
        image(vec![descriptor("file.txt", content, TUF_TARGET_MEDIA_TYPE)]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path(format!("/v2/tuf/targets/blobs/{}", digest(content))))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"tampered".to_vec()))
        .mount(&server)
        .await;

    let mut fetcher = fetcher(&server);
    let err = fetcher
        .fetch(&target_address(&server, "file.txt"), MAX, TIMEOUT)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Transport(_)), "{err}");
}

// ── Routing ──────────────────────────────────────────────────────────

#[tokio::test]
async fn address_outside_repositories_is_configuration_error() {
    let server = MockServer::start().await;
    let mut fetcher = fetcher(&server);

    let err = fetcher
        .fetch(
            &format!("oci://{}/tuf/elsewhere/1.root.json", host(&server)),
            MAX,
            TIMEOUT,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Configuration(_)), "{err}");
}

// ── Authentication ───────────────────────────────────────────────────

#[tokio::test]
async fn bearer_challenge_exchanges_token_once() {
    let server = MockServer::start().await;
    let content = b"authorized target";

    Mock::given(method("GET"))
        .and(path("/v2/tuf/targets/manifests/file.txt"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(image(vec![descriptor(
            "file.txt",
            content,
            TUF_TARGET_MEDIA_TYPE,
        )])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/tuf/targets/manifests/file.txt"))
        .respond_with(ResponseTemplate::new(401).insert_header(
            "WWW-Authenticate",
            format!(r#"Bearer realm="{}/token",service="test-registry""#, server.uri()),
        ))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/token"))
        .and(query_param("service", "test-registry"))
        .and(query_param("scope", "repository:tuf/targets:pull"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "test-token" })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/v2/tuf/targets/blobs/{}", digest(content))))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.to_vec()))
        .mount(&server)
        .await;

    let mut fetcher = fetcher(&server);
    let data = fetcher
        .fetch(&target_address(&server, "file.txt"), MAX, TIMEOUT)
        .await
        .unwrap();

    assert_eq!(&data[..], content);
    server.verify().await;
}

struct StaticCredentials;

impl CredentialProvider for StaticCredentials {
    fn name(&self) -> &'static str {
        "static"
    }

    fn resolve(&self, _registry: &str) -> Option<Credential> {
        Some(Credential::Basic {
            username: "alice".to_string(),
            password: "s3cret".to_string(),
        })
    }
}

#[tokio::test]
async fn basic_challenge_uses_resolved_credentials() {
    let server = MockServer::start().await;
    let content = b"basic auth target";
    // base64("alice:s3cret")
    let expected = "Basic YWxpY2U6czNjcmV0";

    Mock::given(method("GET"))
        .and(path("/v2/tuf/targets/manifests/file.txt"))
        .and(header("authorization", expected))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(image(vec![descriptor(
            "file.txt",
            content,
            TUF_TARGET_MEDIA_TYPE,
        )])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/tuf/targets/manifests/file.txt"))
        .respond_with(
            ResponseTemplate::new(401).insert_header("WWW-Authenticate", r#"Basic realm="test""#),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/v2/tuf/targets/blobs/{}", digest(content))))
        .and(header("authorization", expected))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.to_vec()))
        .mount(&server)
        .await;

    let mut fetcher = fetcher_with(
        &server,
        CredentialChain::new(vec![Arc::new(StaticCredentials)]),
    );
    let data = fetcher
        .fetch(&target_address(&server, "file.txt"), MAX, TIMEOUT)
        .await
        .unwrap();

    assert_eq!(&data[..], content);
}

#[tokio::test]
async fn rejected_credentials_are_transport_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/tuf/targets/manifests/file.txt"))
        .respond_with(
            ResponseTemplate::new(401).insert_header("WWW-Authenticate", r#"Basic realm="test""#),
        )
        .mount(&server)
        .await;

    let mut fetcher = fetcher_with(
        &server,
        CredentialChain::new(vec![Arc::new(StaticCredentials)]),
    );
    let err = fetcher
        .fetch(&target_address(&server, "file.txt"), MAX, TIMEOUT)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Transport(_)), "{err}");
}
