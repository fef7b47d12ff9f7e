use super::feed::tests::{EMPTY_FEED, entry_feed};
use super::*;
use crate::config::RetryConfig;
use crate::retry::RecordingSleeper;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn source_tarball() -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, content) in [
        ("main.tex", b"\\documentclass{article}".as_slice()),
        ("fig.eps", b"%!PS".as_slice()),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, content).unwrap();
    }
    let tarball = builder.into_inner().unwrap();

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tarball).unwrap();
    encoder.finish().unwrap()
}

fn test_config(server: &MockServer) -> ArxivConfig {
    ArxivConfig {
        api_url: format!("{}/api/query", server.uri()),
        eprint_url: format!("{}/e-print", server.uri()),
        version_delay_ms: Duration::ZERO,
        retry: RetryConfig {
            max_attempts: Some(3),
            ..RetryConfig::default()
        },
        ..ArxivConfig::default()
    }
}

fn client(server: &MockServer, dir: &TempDir) -> (ArxivClient, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = ArxivClient::new(test_config(server), Storage::new(dir.path()))
        .unwrap()
        .with_sleeper(sleeper.clone());
    (client, sleeper)
}

fn id() -> Identifier {
    "2305.04793".parse().unwrap()
}

async fn mount_feed(server: &MockServer, id_list: &str, body: String) {
    Mock::given(method("GET"))
        .and(path("/api/query"))
        .and(query_param("id_list", id_list))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn fetch_writes_metadata_and_extracts_sources() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let (client, _) = client(&server, &dir);

    mount_feed(&server, "2305.04793", entry_feed("2305.04793v2", "2023-06-01T00:00:00Z")).await;
    mount_feed(&server, "2305.04793v2", entry_feed("2305.04793v2", "2023-06-01T00:00:00Z")).await;

    let tarball = source_tarball();
    Mock::given(method("GET"))
        .and(path("/e-print/2305.04793v1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(tarball.clone()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/e-print/2305.04793v2"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let report = client.fetch(&id()).await.unwrap();

    assert!(report.success);
    assert_eq!(report.size_before, Some(tarball.len() as u64));
    assert_eq!(report.versions_extracted, 1);

    let storage = Storage::new(dir.path());
    let metadata: PaperMetadata =
        serde_json::from_slice(&std::fs::read(storage.metadata_path(&id())).unwrap()).unwrap();
    assert_eq!(metadata.arxiv_id, "2305-04793");
    assert_eq!(metadata.latest_version, 2);
    assert_eq!(metadata.revised_dates, vec![Some("2023-06-01".to_string())]);

    let v1 = storage.version_dir(&id(), 1);
    assert!(v1.join("main.tex").exists());
    assert!(!v1.join("fig.eps").exists());

    // temporary archives are gone
    let leftovers: Vec<_> = std::fs::read_dir(storage.item_dir(&id()))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".download"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn missing_paper_is_not_found_without_downloads() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let (client, _) = client(&server, &dir);

    mount_feed(&server, "2305.04793", EMPTY_FEED.to_string()).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/e-print/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let report = client.fetch(&id()).await.unwrap();

    assert_eq!(report, FetchReport::not_found());
    assert!(!Storage::new(dir.path()).item_dir(&id()).exists());
}

#[tokio::test]
async fn api_not_found_status_is_a_miss_without_retry() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let (client, sleeper) = client(&server, &dir);

    Mock::given(method("GET"))
        .and(path("/api/query"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    assert!(client.fetch_metadata(&id()).await.unwrap().is_none());
    assert!(sleeper.recorded().is_empty());
}

#[tokio::test]
async fn two_consecutive_missing_versions_stop_the_loop() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let (client, _) = client(&server, &dir);

    mount_feed(&server, "2305.04793", entry_feed("2305.04793v5", "2023-06-01T00:00:00Z")).await;
    for v in 2..=5 {
        mount_feed(
            &server,
            &format!("2305.04793v{}", v),
            entry_feed(&format!("2305.04793v{}", v), "2023-06-01T00:00:00Z"),
        )
        .await;
    }
    Mock::given(method("GET"))
        .and(path_regex(r"^/e-print/"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;

    let report = client.fetch(&id()).await.unwrap();

    // metadata was stored, so the fetch counts as a success without sources
    assert!(report.success);
    assert_eq!(report.versions_extracted, 0);
    assert_eq!(report.size_before, Some(0));
}

#[tokio::test]
async fn transient_api_failure_is_retried_with_backoff() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let (client, sleeper) = client(&server, &dir);

    Mock::given(method("GET"))
        .and(path("/api/query"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_feed(&server, "2305.04793", entry_feed("2305.04793v1", "2023-05-08T00:00:00Z")).await;
    Mock::given(method("GET"))
        .and(path("/e-print/2305.04793v1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4".to_vec()))
        .mount(&server)
        .await;

    let report = client.fetch(&id()).await.unwrap();

    assert!(report.success);
    // a PDF-only version still counts as extracted
    assert_eq!(report.versions_extracted, 1);
    assert_eq!(sleeper.recorded()[0], Duration::from_secs(5));
}

#[tokio::test]
async fn unrecognized_archive_does_not_fail_the_fetch() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let (client, _) = client(&server, &dir);

    mount_feed(&server, "2305.04793", entry_feed("2305.04793v1", "2023-05-08T00:00:00Z")).await;
    Mock::given(method("GET"))
        .and(path("/e-print/2305.04793v1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"garbage".to_vec()))
        .mount(&server)
        .await;

    let report = client.fetch(&id()).await.unwrap();

    assert!(report.success);
    assert_eq!(report.versions_extracted, 0);
    let storage = Storage::new(dir.path());
    assert!(!storage.version_dir(&id(), 1).exists());
    assert!(storage.metadata_path(&id()).exists());
}
