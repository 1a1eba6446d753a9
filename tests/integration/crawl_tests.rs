//! Integration tests for the mirror
//!
//! These tests use wiremock to create mock HTTP servers and run the full
//! crawl cycle end-to-end into temporary directories.

use std::path::{Path, PathBuf};
use sumi_mirror::config::Config;
use sumi_mirror::crawler::Coordinator;
use sumi_mirror::output::{ErrorKind, FailureTarget};
use sumi_mirror::{run_mirror, AssetStatus, MirrorError, Shutdown};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration with fast retries for the given server
fn create_test_config(server: &MockServer, destination: &Path) -> Config {
    let mut config = Config::for_seed(format!("{}/", server.uri()));
    config.output.destination = Some(destination.to_string_lossy().into_owned());
    config.crawler.workers = 4;
    config.crawler.shutdown_grace_ms = 500;
    config.fetch.timeout_secs = 5;
    config.fetch.base_delay_ms = 10;
    config.fetch.max_delay_ms = 50;
    config.fetch.attempt_budget_ms = 5_000;
    config
}

async fn mount_html(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html"))
        .mount(server)
        .await;
}

async fn mount_never(server: &MockServer, route: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<p>unused</p>", "text/html"))
        .expect(0)
        .mount(server)
        .await;
}

/// Lists every file under `root`, relative to it, sorted
fn list_files(root: &Path) -> Vec<PathBuf> {
    fn walk(root: &Path, dir: &Path, files: &mut Vec<PathBuf>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(root, &path, files);
            } else {
                files.push(path.strip_prefix(root).unwrap().to_path_buf());
            }
        }
    }
    let mut files = Vec::new();
    walk(root, root, &mut files);
    files.sort();
    files
}

fn read(root: &Path, file: &str) -> String {
    std::fs::read_to_string(root.join(file)).unwrap()
}

#[tokio::test]
async fn test_single_page_cap() {
    let server = MockServer::start().await;
    mount_html(
        &server,
        "/",
        r#"<html><body><a href="/about/">About</a><a href="/contact">Contact</a></body></html>"#,
    )
    .await;
    mount_never(&server, "/about/").await;
    mount_never(&server, "/contact").await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server, dir.path());
    config.crawler.max_pages = 1;

    let summary = run_mirror(config, Shutdown::new()).await.unwrap();

    assert_eq!(summary.pages_fetched, 1);
    assert_eq!(list_files(dir.path()), vec![PathBuf::from("index.html")]);
    assert!(!summary.interrupted);
}

#[tokio::test]
async fn test_pretty_and_plain_paths() {
    let server = MockServer::start().await;
    mount_html(
        &server,
        "/",
        r#"<html><body><a href="/about/">About</a> <a href="/contact">Contact</a></body></html>"#,
    )
    .await;
    mount_html(&server, "/about/", r#"<html><body><a href="/">Home</a></body></html>"#).await;
    mount_html(&server, "/contact", r#"<html><body><a href="/about">About</a></body></html>"#).await;

    let dir = TempDir::new().unwrap();
    let summary = run_mirror(create_test_config(&server, dir.path()), Shutdown::new())
        .await
        .unwrap();

    assert_eq!(summary.pages_fetched, 3);
    assert_eq!(
        list_files(dir.path()),
        vec![
            PathBuf::from("about/index.html"),
            PathBuf::from("contact.html"),
            PathBuf::from("index.html"),
        ]
    );

    let index = read(dir.path(), "index.html");
    assert!(index.contains(r#"href="about/index.html""#), "{}", index);
    assert!(index.contains(r#"href="contact.html""#), "{}", index);

    let about = read(dir.path(), "about/index.html");
    assert!(about.contains(r#"href="../index.html""#), "{}", about);

    // `/about` and `/about/` are one page
    let contact = read(dir.path(), "contact.html");
    assert!(contact.contains(r#"href="about/index.html""#), "{}", contact);
}

#[tokio::test]
async fn test_transient_asset_failure_is_retried() {
    let server = MockServer::start().await;
    mount_html(
        &server,
        "/",
        r#"<html><body><img src="/img/logo.png"></body></html>"#,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/img/logo.png"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/img/logo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![137u8, 80, 78, 71], "image/png"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let summary = run_mirror(create_test_config(&server, dir.path()), Shutdown::new())
        .await
        .unwrap();

    assert_eq!(summary.assets.len(), 1);
    let record = &summary.assets[0];
    assert_eq!(record.status, AssetStatus::Success);
    assert_eq!(record.attempts, 3);
    assert_eq!(summary.assets_fetched, 1);
    assert!(summary.failures.is_empty());
    assert_eq!(summary.missing_assets().count(), 0);

    assert_eq!(std::fs::read(dir.path().join("img/logo.png")).unwrap(), vec![137u8, 80, 78, 71]);
    assert!(read(dir.path(), "index.html").contains(r#"src="img/logo.png""#));
}

#[tokio::test]
async fn test_missing_asset_is_reported() {
    let server = MockServer::start().await;
    mount_html(
        &server,
        "/",
        r#"<html><body><img src="/img/missing.png"></body></html>"#,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/img/missing.png"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let summary = run_mirror(create_test_config(&server, dir.path()), Shutdown::new())
        .await
        .unwrap();

    let record = &summary.assets[0];
    assert_eq!(record.status, AssetStatus::Failed);
    assert_eq!(record.attempts, 1);
    assert_eq!(record.local_path, Some(PathBuf::from("img/missing.png")));

    let missing: Vec<_> = summary.missing_assets().collect();
    assert_eq!(missing.len(), 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].target, FailureTarget::Asset);
    assert_eq!(summary.failures[0].kind, ErrorKind::PermanentFetch);

    let index = read(dir.path(), "index.html");
    assert!(index.contains(r#"src="img/missing.png""#), "{}", index);
    assert!(!dir.path().join("img/missing.png").exists());
}

#[tokio::test]
async fn test_rejected_schemes_untouched() {
    let server = MockServer::start().await;
    mount_html(
        &server,
        "/",
        r#"<html><body>
        <a href="mailto:test@example.com">Mail</a>
        <a href="tel:+15550100">Call</a>
        <a href="javascript:void(0)">Nothing</a>
        </body></html>"#,
    )
    .await;

    let dir = TempDir::new().unwrap();
    let summary = run_mirror(create_test_config(&server, dir.path()), Shutdown::new())
        .await
        .unwrap();

    let index = read(dir.path(), "index.html");
    assert!(index.contains(r#"href="mailto:test@example.com""#), "{}", index);
    assert!(index.contains(r#"href="tel:+15550100""#), "{}", index);
    assert!(index.contains(r#"href="javascript:void(0)""#), "{}", index);
    assert_eq!(summary.pages_fetched, 1);
    assert!(summary.assets.is_empty());
    assert!(summary.failures.is_empty());
}

#[tokio::test]
async fn test_breadth_first_order_and_page_cap() {
    let server = MockServer::start().await;
    mount_html(&server, "/", r#"<a href="/a">A</a><a href="/b">B</a>"#).await;
    mount_html(&server, "/a", r#"<a href="/c">C</a><a href="/d">D</a>"#).await;
    mount_html(&server, "/b", r#"<a href="/e">E</a><a href="/">Home</a>"#).await;
    mount_html(&server, "/c", r#"<a href="/a">A</a>"#).await;
    mount_never(&server, "/d").await;
    mount_never(&server, "/e").await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server, dir.path());
    config.crawler.max_pages = 4;

    let summary = run_mirror(config, Shutdown::new()).await.unwrap();

    let visited: Vec<String> = summary
        .pages
        .iter()
        .map(|page| url::Url::parse(&page.url).unwrap().path().to_string())
        .collect();
    assert_eq!(visited, vec!["/", "/a", "/b", "/c"]);
    assert_eq!(summary.pages_fetched, 4);
}

#[tokio::test]
async fn test_shared_asset_fetched_once() {
    let server = MockServer::start().await;
    let page = r#"<html><head><link rel="stylesheet" href="/css/site.css"></head>
        <body><a href="/one">1</a><a href="/two">2</a></body></html>"#;
    mount_html(&server, "/", page).await;
    mount_html(&server, "/one", page).await;
    mount_html(&server, "/two", page).await;
    Mock::given(method("GET"))
        .and(path("/css/site.css"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("body{color:red}", "text/css"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let summary = run_mirror(create_test_config(&server, dir.path()), Shutdown::new())
        .await
        .unwrap();

    assert_eq!(summary.pages_fetched, 3);
    assert_eq!(summary.assets.len(), 1);
    assert_eq!(summary.assets_fetched, 1);
    assert!(read(dir.path(), "one.html").contains(r#"href="css/site.css""#));
}

#[tokio::test]
async fn test_unreachable_seed_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let result = run_mirror(create_test_config(&server, dir.path()), Shutdown::new()).await;

    match result {
        Err(MirrorError::SeedUnreachable(error)) => assert_eq!(error.attempts, 1),
        other => panic!("expected SeedUnreachable, got {:?}", other.map(|s| s.pages_fetched)),
    }
}

#[tokio::test]
async fn test_failed_page_is_recorded() {
    let server = MockServer::start().await;
    mount_html(&server, "/", r#"<a href="/gone">Gone</a><a href="/here">Here</a>"#).await;
    mount_html(&server, "/here", "<p>here</p>").await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let summary = run_mirror(create_test_config(&server, dir.path()), Shutdown::new())
        .await
        .unwrap();

    assert_eq!(summary.pages_fetched, 3);
    assert_eq!(summary.pages_saved(), 2);
    let failures: Vec<_> = summary.failures_for(FailureTarget::Page).collect();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].url.ends_with("/gone"));
    assert_eq!(failures[0].reason, "HTTP 410");
}

#[tokio::test]
async fn test_non_html_page_saved_verbatim() {
    let server = MockServer::start().await;
    mount_html(&server, "/", r#"<a href="/export">Export</a>"#).await;
    Mock::given(method("GET"))
        .and(path("/export"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("a,b\n<a href=\"/x\">", "text/csv"))
        .mount(&server)
        .await;
    mount_never(&server, "/x").await;

    let dir = TempDir::new().unwrap();
    run_mirror(create_test_config(&server, dir.path()), Shutdown::new())
        .await
        .unwrap();

    assert_eq!(read(dir.path(), "export.html"), "a,b\n<a href=\"/x\">");
}

#[tokio::test]
async fn test_interrupted_before_start() {
    let server = MockServer::start().await;
    mount_never(&server, "/").await;

    let dir = TempDir::new().unwrap();
    let shutdown = Shutdown::new();
    shutdown.trigger();

    let coordinator = Coordinator::new(create_test_config(&server, dir.path()), shutdown).unwrap();
    let summary = coordinator.run().await.unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.pages_fetched, 0);
    assert!(summary.pages.is_empty());
}

#[tokio::test]
async fn test_interrupt_during_crawl_returns_partial_summary() {
    let server = MockServer::start().await;
    mount_html(&server, "/", r#"<a href="/slow">Slow</a><a href="/later">Later</a>"#).await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<p>slow</p>", "text/html")
                .set_delay(std::time::Duration::from_millis(300)),
        )
        .mount(&server)
        .await;
    mount_never(&server, "/later").await;

    let dir = TempDir::new().unwrap();
    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(150)).await;
            shutdown.trigger();
        });
    }

    let summary = run_mirror(create_test_config(&server, dir.path()), shutdown)
        .await
        .unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.pages_fetched, 2);
    assert!(dir.path().join("index.html").exists());
}

#[tokio::test]
async fn test_seed_redirected_to_other_origin() {
    let old = MockServer::start().await;
    let new = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("Location", format!("{}/", new.uri()).as_str()),
        )
        .expect(1)
        .mount(&old)
        .await;
    mount_never(&old, "/about").await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<a href="/about">About</a><a href="/">Home</a>"#,
            "text/html",
        ))
        .expect(1)
        .mount(&new)
        .await;
    mount_html(&new, "/about", r#"<p>about</p><a href="/">Home</a>"#).await;

    let dir = TempDir::new().unwrap();
    let summary = run_mirror(create_test_config(&old, dir.path()), Shutdown::new())
        .await
        .unwrap();

    assert_eq!(summary.pages_fetched, 2);
    assert_eq!(summary.failures_for(FailureTarget::Page).count(), 0);
    assert!(read(dir.path(), "index.html").contains(r#"href="about.html""#));
    assert!(read(dir.path(), "about.html").contains("<p>about</p>"));
}

#[tokio::test]
async fn test_latin1_page_keeps_its_charset() {
    let server = MockServer::start().await;
    let body = b"<html><head><meta charset=\"iso-8859-1\"></head><body><p>caf\xE9</p><a href=\"/menu\">Menu</a></body></html>";
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body.to_vec(), "text/html; charset=iso-8859-1"),
        )
        .mount(&server)
        .await;
    mount_html(&server, "/menu", "<p>menu</p>").await;

    let dir = TempDir::new().unwrap();
    run_mirror(create_test_config(&server, dir.path()), Shutdown::new())
        .await
        .unwrap();

    let written = std::fs::read(dir.path().join("index.html")).unwrap();
    assert!(written.windows(4).any(|w| w == b"caf\xE9"));
    assert!(!written.windows(3).any(|w| w == "\u{fffd}".as_bytes()));
    assert!(written.windows(16).any(|w| w == b"href=\"menu.html\""));
}

#[tokio::test]
async fn test_undeclared_charset_written_as_utf8() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            b"<p>na\xEFve</p>".to_vec(),
            "text/html; charset=windows-1252",
        ))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    run_mirror(create_test_config(&server, dir.path()), Shutdown::new())
        .await
        .unwrap();

    let written = std::fs::read(dir.path().join("index.html")).unwrap();
    assert!(written.starts_with(b"\xEF\xBB\xBF"));
    assert!(String::from_utf8(written[3..].to_vec()).unwrap().contains("na\u{ef}ve"));
}
