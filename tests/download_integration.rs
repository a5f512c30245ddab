//! Download engine scenarios exercised through the public API: atomic
//! publication, collision numbering and failure isolation.

use std::time::Duration;

use comicfetch_core::links::{DownloadLink, OriginKind};
use comicfetch_core::ordered::OrderedMap;
use comicfetch_core::{DownloadEngine, HttpClient, RetryPolicy};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn quick_retries() -> RetryPolicy {
    RetryPolicy::new(
        2,
        Duration::from_millis(5),
        Duration::from_millis(20),
        2.0,
    )
}

fn direct_links(entries: &[(&str, &str)]) -> OrderedMap<DownloadLink> {
    let mut map = OrderedMap::new();
    for (url, title) in entries {
        let link = DownloadLink::new(*url, *title, OriginKind::Direct);
        map.insert(link.map_key(), link);
    }
    map
}

#[tokio::test]
async fn interrupted_stream_leaves_destination_absent() {
    let server = MockServer::start().await;
    let dest = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();

    // The declared body takes longer than the read timeout to arrive, so the
    // stream dies partway through.
    Mock::given(method("GET"))
        .and(path("/half.cbz"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![1u8; 128 * 1024])
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let links = direct_links(&[(&format!("{}/half.cbz", server.uri()), "Half Issue")]);

    let engine = DownloadEngine::new(1, RetryPolicy::with_max_attempts(1))
        .unwrap()
        .with_scratch_dir(scratch.path());
    let client = HttpClient::new_with_timeouts(30, 1);

    let report = engine
        .run_batch(&client, &links, dest.path())
        .await
        .unwrap();

    assert_eq!(report.failed.len(), 1);
    assert!(report.completed.is_empty());
    assert!(
        !dest.path().join("half.cbz").exists(),
        "no partial file may appear at the destination"
    );
    assert!(
        std::fs::read_dir(scratch.path()).unwrap().next().is_none(),
        "the scratch file is removed when its stream fails"
    );
}

#[tokio::test]
async fn stream_failure_does_not_disturb_sibling_tasks() {
    let server = MockServer::start().await;
    let dest = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/stalls.cbz"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0u8; 4096])
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/quick.cbz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"done"))
        .mount(&server)
        .await;

    let links = direct_links(&[
        (&format!("{}/stalls.cbz", server.uri()), "Stalls"),
        (&format!("{}/quick.cbz", server.uri()), "Quick"),
    ]);

    let engine = DownloadEngine::new(2, RetryPolicy::with_max_attempts(1))
        .unwrap()
        .with_scratch_dir(scratch.path());
    let client = HttpClient::new_with_timeouts(30, 1);

    let report = engine
        .run_batch(&client, &links, dest.path())
        .await
        .unwrap();

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.completed.len(), 1);
    assert_eq!(
        std::fs::read(dest.path().join("quick.cbz")).unwrap(),
        b"done"
    );
}

#[tokio::test]
async fn same_filename_from_different_urls_takes_numbered_slots() {
    let server = MockServer::start().await;
    let dest = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/first/issue.cbz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"first"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/second/issue.cbz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"second"))
        .mount(&server)
        .await;

    let links = direct_links(&[
        (&format!("{}/first/issue.cbz", server.uri()), "First"),
        (&format!("{}/second/issue.cbz", server.uri()), "Second"),
    ]);

    // Sequential engine so slot assignment is deterministic.
    let engine = DownloadEngine::new(1, quick_retries())
        .unwrap()
        .with_scratch_dir(scratch.path());

    let report = engine
        .run_batch(&HttpClient::new(), &links, dest.path())
        .await
        .unwrap();

    assert_eq!(report.completed.len(), 2);
    assert_eq!(
        std::fs::read(dest.path().join("issue.cbz")).unwrap(),
        b"first"
    );
    assert_eq!(
        std::fs::read(dest.path().join("issue (0).cbz")).unwrap(),
        b"second"
    );
}

#[tokio::test]
async fn transient_error_recovers_within_retry_budget() {
    let server = MockServer::start().await;
    let dest = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/flaky.cbz"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky.cbz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"eventually"))
        .mount(&server)
        .await;

    let links = direct_links(&[(&format!("{}/flaky.cbz", server.uri()), "Flaky")]);

    let engine = DownloadEngine::new(1, quick_retries())
        .unwrap()
        .with_scratch_dir(scratch.path());

    let report = engine
        .run_batch(&HttpClient::new(), &links, dest.path())
        .await
        .unwrap();

    assert_eq!(report.completed.len(), 1);
    assert_eq!(
        std::fs::read(dest.path().join("flaky.cbz")).unwrap(),
        b"eventually"
    );
    assert!(
        std::fs::read_dir(scratch.path()).unwrap().next().is_none(),
        "failed first attempt must not leave a scratch file behind"
    );
}

#[tokio::test]
async fn permanent_error_is_not_retried() {
    let server = MockServer::start().await;
    let dest = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/gone.cbz"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let links = direct_links(&[(&format!("{}/gone.cbz", server.uri()), "Gone")]);

    let engine = DownloadEngine::new(1, quick_retries())
        .unwrap()
        .with_scratch_dir(scratch.path());

    let report = engine
        .run_batch(&HttpClient::new(), &links, dest.path())
        .await
        .unwrap();

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].attempts, 1);
}
