use addon_lib::dist::{
    DistError, Downloader, Mirrors, Platform, ResolvedTarget, Runtime, RuntimeCache,
    TargetOptions,
};
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn header_archive(top: &str, files: &[&str]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for file in files {
        let body = format!("// {}\n", file);
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{}/{}", top, file), body.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn modern_node_archive() -> Vec<u8> {
    header_archive(
        "node-v18.16.1",
        &[
            "include/node/node.h",
            "include/node/v8.h",
            "include/node/common.gypi",
            "README.md",
        ],
    )
}

fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

fn target(server: &MockServer, runtime: Runtime, version: &str) -> ResolvedTarget {
    TargetOptions::new(runtime, version, "x64")
        .resolve(&Mirrors::uniform(server.uri()))
        .unwrap()
}

fn cache(root: &Path, platform: Platform) -> RuntimeCache {
    RuntimeCache::new(root, Downloader::new().unwrap()).with_platform(platform)
}

async fn serve(server: &MockServer, route: &str, body: Vec<u8>, times: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .expect(times)
        .mount(server)
        .await;
}

fn dir_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}

/// Records when each request arrived, then answers after `delay`
struct RecordArrival {
    arrivals: Arc<Mutex<Vec<(String, Instant)>>>,
    body: Vec<u8>,
    delay: Duration,
}

impl Respond for RecordArrival {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        self.arrivals
            .lock()
            .unwrap()
            .push((request.url.path().to_string(), Instant::now()));
        ResponseTemplate::new(200)
            .set_body_bytes(self.body.clone())
            .set_delay(self.delay)
    }
}

#[tokio::test]
async fn download_round_trip_needs_no_second_fetch() {
    init_logs();
    let server = MockServer::start().await;
    let archive = modern_node_archive();
    let manifest = format!(
        "{}  node-v18.16.1-headers.tar.gz\nffff  win-x64/node.lib\n",
        sha256_hex(&archive)
    );
    serve(&server, "/v18.16.1/SHASUMS256.txt", manifest.into_bytes(), 1).await;
    serve(&server, "/v18.16.1/node-v18.16.1-headers.tar.gz", archive, 1).await;

    let tmp = tempfile::tempdir().unwrap();
    let store = cache(tmp.path(), Platform::Linux);
    let t = target(&server, Runtime::Node, "18.16.1");
    assert!(!store.is_downloaded(&t));

    assert_ok!(store.ensure_downloaded(&t).await);
    assert!(store.is_downloaded(&t));

    let entry = store.internal_path(&t);
    assert_eq!(entry, tmp.path().join("node-x64").join("v18.16.1"));
    assert!(entry.join("include/node/node.h").is_file());
    assert!(entry.join("include/node/v8.h").is_file());
    assert!(!entry.join("include/node/common.gypi").exists());
    assert!(!entry.join("README.md").exists());

    // Served from disk: the mocks above expect exactly one request each
    assert_ok!(store.ensure_downloaded(&t).await);
}

#[tokio::test]
async fn checksum_mismatch_leaves_nothing_behind() {
    init_logs();
    let server = MockServer::start().await;
    let archive = modern_node_archive();
    serve(
        &server,
        "/v18.16.1/SHASUMS256.txt",
        b"abc123  node-v18.16.1-headers.tar.gz\n".to_vec(),
        1,
    )
    .await;
    serve(&server, "/v18.16.1/node-v18.16.1-headers.tar.gz", archive.clone(), 1).await;

    let tmp = tempfile::tempdir().unwrap();
    let store = cache(tmp.path(), Platform::Linux);
    let t = target(&server, Runtime::Node, "18.16.1");

    let err = assert_err!(store.download(&t).await);
    match err {
        DistError::ChecksumMismatch {
            expected, actual, ..
        } => {
            assert_eq!(expected, "abc123");
            assert_eq!(actual, sha256_hex(&archive));
        }
        other => panic!("unexpected error: {other}"),
    }

    assert!(!store.is_downloaded(&t));
    assert!(!store.internal_path(&t).exists());
    assert!(dir_is_empty(&tmp.path().join("node-x64")));
}

#[tokio::test]
async fn windows_entry_includes_verified_import_library() {
    init_logs();
    let server = MockServer::start().await;
    let archive = modern_node_archive();
    let lib = b"!<arch>\nfake import library".to_vec();
    let manifest = format!(
        "{}  node-v18.16.1-headers.tar.gz\n{}  win-x64/node.lib\n",
        sha256_hex(&archive),
        sha256_hex(&lib)
    );
    serve(&server, "/v18.16.1/SHASUMS256.txt", manifest.into_bytes(), 1).await;
    serve(&server, "/v18.16.1/node-v18.16.1-headers.tar.gz", archive, 1).await;
    serve(&server, "/v18.16.1/win-x64/node.lib", lib.clone(), 1).await;

    let tmp = tempfile::tempdir().unwrap();
    let store = cache(tmp.path(), Platform::Windows);
    let t = target(&server, Runtime::Node, "18.16.1");

    assert_ok!(store.download(&t).await);

    assert!(store.is_downloaded(&t));
    let libs = store.win_lib_paths(&t);
    assert_eq!(libs.len(), 1);
    assert_eq!(std::fs::read(&libs[0]).unwrap(), lib);
}

#[tokio::test]
async fn failed_import_library_fails_whole_download() {
    init_logs();
    let server = MockServer::start().await;
    serve(&server, "/v18.16.1/SHASUMS256.txt", Vec::new(), 1).await;
    serve(
        &server,
        "/v18.16.1/node-v18.16.1-headers.tar.gz",
        modern_node_archive(),
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/v18.16.1/win-x64/node.lib"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let store = cache(tmp.path(), Platform::Windows);
    let t = target(&server, Runtime::Node, "18.16.1");

    let err = assert_err!(store.download(&t).await);
    assert!(err.is_download_error(), "{err}");
    assert!(!store.internal_path(&t).exists());
    assert!(dir_is_empty(&tmp.path().join("node-x64")));
}

#[tokio::test]
async fn tarball_and_libraries_are_requested_concurrently() {
    init_logs();
    let server = MockServer::start().await;
    let arrivals = Arc::new(Mutex::new(Vec::new()));
    let tarball_delay = Duration::from_millis(400);

    serve(&server, "/v18.16.1/SHASUMS256.txt", Vec::new(), 1).await;
    Mock::given(method("GET"))
        .and(path("/v18.16.1/node-v18.16.1-headers.tar.gz"))
        .respond_with(RecordArrival {
            arrivals: arrivals.clone(),
            body: modern_node_archive(),
            delay: tarball_delay,
        })
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v18.16.1/win-x64/node.lib"))
        .respond_with(RecordArrival {
            arrivals: arrivals.clone(),
            body: b"lib".to_vec(),
            delay: Duration::ZERO,
        })
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let store = cache(tmp.path(), Platform::Windows);
    let t = target(&server, Runtime::Node, "18.16.1");
    assert_ok!(store.download(&t).await);

    let arrivals = arrivals.lock().unwrap().clone();
    let at = |suffix: &str| {
        arrivals
            .iter()
            .find(|(p, _)| p.ends_with(suffix))
            .map(|(_, when)| *when)
            .unwrap()
    };
    let tarball = at(".tar.gz");
    let lib = at("node.lib");
    // The library request went out while the tarball response was still pending
    let gap = if lib > tarball {
        lib - tarball
    } else {
        tarball - lib
    };
    assert!(gap < tarball_delay, "requests were serialized: {gap:?}");
}

#[tokio::test]
async fn electron_skips_manifest() {
    init_logs();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v28.1.0/SHASUMS256.txt"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    serve(
        &server,
        "/v28.1.0/node-v28.1.0.tar.gz",
        header_archive("node_headers", &["include/node/node.h"]),
        1,
    )
    .await;

    let tmp = tempfile::tempdir().unwrap();
    let store = cache(tmp.path(), Platform::Linux);
    let t = target(&server, Runtime::Electron, "28.1.0");
    assert!(t.paths.header_only);

    assert_ok!(store.download(&t).await);
    assert!(store.is_downloaded(&t));
}

#[tokio::test]
async fn unlisted_artifact_is_accepted_unverified() {
    init_logs();
    let server = MockServer::start().await;
    serve(
        &server,
        "/v18.16.1/SHASUMS256.txt",
        b"0123  some-other-file.tar.gz\n".to_vec(),
        1,
    )
    .await;
    serve(
        &server,
        "/v18.16.1/node-v18.16.1-headers.tar.gz",
        modern_node_archive(),
        1,
    )
    .await;

    let tmp = tempfile::tempdir().unwrap();
    let store = cache(tmp.path(), Platform::Linux);
    let t = target(&server, Runtime::Node, "18.16.1");

    assert_ok!(store.download(&t).await);
    assert!(store.is_downloaded(&t));
}

#[tokio::test]
async fn incomplete_leftover_is_replaced_on_download() {
    init_logs();
    let server = MockServer::start().await;
    serve(&server, "/v0.12.18/SHASUMS256.txt", Vec::new(), 1).await;
    serve(
        &server,
        "/v0.12.18/node-v0.12.18.tar.gz",
        header_archive(
            "node-v0.12.18",
            &["src/node.h", "deps/v8/include/v8.h", "deps/uv/include/uv.h"],
        ),
        1,
    )
    .await;

    let tmp = tempfile::tempdir().unwrap();
    let store = cache(tmp.path(), Platform::Linux);
    let t = target(&server, Runtime::Node, "0.12.18");
    let entry = store.internal_path(&t);
    std::fs::create_dir_all(entry.join("src")).unwrap();
    std::fs::write(entry.join("src/node.h"), "half").unwrap();
    assert!(!store.is_downloaded(&t));

    assert_ok!(store.ensure_downloaded(&t).await);
    assert!(store.is_downloaded(&t));
    assert!(entry.join("deps/uv/include/uv.h").is_file());
}

fn staging_dirs_in(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(".staging-"))
        .count()
}

#[tokio::test]
async fn runtime_directory_override_keeps_existing_files() {
    init_logs();
    let server = MockServer::start().await;
    serve(&server, "/v18.16.1/SHASUMS256.txt", Vec::new(), 1).await;
    serve(
        &server,
        "/v18.16.1/node-v18.16.1-headers.tar.gz",
        modern_node_archive(),
        1,
    )
    .await;

    let tmp = tempfile::tempdir().unwrap();
    let nodedir = tmp.path().join("node-checkout");
    std::fs::create_dir_all(nodedir.join("src")).unwrap();
    std::fs::write(nodedir.join("src/node.h"), "checkout").unwrap();
    std::fs::write(nodedir.join("MY_PATCHES.txt"), "local work").unwrap();

    let store = cache(&tmp.path().join("cache"), Platform::Linux)
        .with_runtime_directory(Some(nodedir.clone()));
    let t = target(&server, Runtime::Node, "18.16.1");
    assert!(!store.is_downloaded(&t));

    assert_ok!(store.ensure_downloaded(&t).await);

    assert!(store.is_downloaded(&t));
    assert!(nodedir.join("include/node/node.h").is_file());
    assert_eq!(
        std::fs::read_to_string(nodedir.join("MY_PATCHES.txt")).unwrap(),
        "local work"
    );
    assert_eq!(
        std::fs::read_to_string(nodedir.join("src/node.h")).unwrap(),
        "checkout"
    );
    assert_eq!(staging_dirs_in(&nodedir), 0);
}

#[tokio::test]
async fn failed_download_into_runtime_directory_changes_nothing() {
    init_logs();
    let server = MockServer::start().await;
    serve(
        &server,
        "/v18.16.1/SHASUMS256.txt",
        b"abc123  node-v18.16.1-headers.tar.gz\n".to_vec(),
        1,
    )
    .await;
    serve(
        &server,
        "/v18.16.1/node-v18.16.1-headers.tar.gz",
        modern_node_archive(),
        1,
    )
    .await;

    let tmp = tempfile::tempdir().unwrap();
    let nodedir = tmp.path().join("node-checkout");
    std::fs::create_dir_all(&nodedir).unwrap();
    std::fs::write(nodedir.join("MY_PATCHES.txt"), "local work").unwrap();

    let store = cache(&tmp.path().join("cache"), Platform::Linux)
        .with_runtime_directory(Some(nodedir.clone()));
    let t = target(&server, Runtime::Node, "18.16.1");

    let err = assert_err!(store.download(&t).await);
    assert!(matches!(err, DistError::ChecksumMismatch { .. }), "{err}");
    assert!(nodedir.join("MY_PATCHES.txt").is_file());
    assert!(!nodedir.join("include").exists());
    assert_eq!(staging_dirs_in(&nodedir), 0);
}
