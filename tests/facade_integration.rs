//! End-to-end tests through the tool facade: configured sources, scrape, then download.

mod support;

use paperfetch_core::{
    DownloadRequest, FetchStatus, PathLayout, PipelineConfig, ScrapeRequest, SourceQuery,
    ToolErrorKind, ToolFacade,
};
use serde_json::json;
use support::socket_guard::start_mock_server_or_skip;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const INDEX_HTML: &str = r#"<div class="container-fluid pl-5 pr-5"><div class="row">
    <div class="col-sm-3">
      <h6 class="border"><strong>Junior Certificate (JC)</strong></h6>
      <a class="dropdown-item" href="jc/science.php">Science</a>
    </div></div></div>"#;

const SUBJECT_HTML: &str = r#"<section id="tab3">
    <a href="/files/JC-Science-2021-P1.pdf">Paper 1</a>
    <a href="/files/JC-Science-2021-P2.pdf">Paper 2</a>
    </section>"#;

fn facade_for(server: &MockServer) -> ToolFacade {
    let raw = format!(
        r#"
max_concurrency = 2

[retry]
max_attempts = 2
base_delay_ms = 10
max_delay_ms = 20
max_jitter_ms = 0

[sources.eceswa]
base_url = "{}"
"#,
        server.uri()
    );
    let config = PipelineConfig::from_toml_str(&raw).unwrap();
    ToolFacade::from_config(&config).unwrap()
}

async fn mock_site(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/index.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string(INDEX_HTML))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jc/science.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SUBJECT_HTML))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/JC-Science-2021-P1.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4 paper one".to_vec()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/JC-Science-2021-P2.pdf"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
}

fn science_query() -> ScrapeRequest {
    ScrapeRequest {
        source_id: "eceswa".to_string(),
        query: SourceQuery {
            grade: Some("JC".to_string()),
            subject: Some("Science".to_string()),
            ..SourceQuery::default()
        },
    }
}

// ==================== Scrape then download ====================

#[tokio::test]
async fn test_scrape_then_download_reports_each_item() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mock_site(&server).await;
    let facade = facade_for(&server);
    let dest = TempDir::new().unwrap();

    let descriptors = facade.scrape(&science_query()).await.unwrap();
    assert_eq!(descriptors.len(), 2);

    let report = facade
        .download(&DownloadRequest {
            descriptors,
            dest_dir: dest.path().join("jc"),
            max_concurrency: None,
            layout: PathLayout::BySession,
        })
        .await
        .unwrap();

    assert_eq!((report.succeeded(), report.failed()), (1, 1));
    let first = &report.outcomes()[0];
    assert_eq!(first.status(), FetchStatus::Success);
    let expected = dest
        .path()
        .join("jc")
        .join("JC")
        .join("Science")
        .join("2021")
        .join("JC-Science-2021-P1.pdf");
    assert_eq!(first.final_path(), Some(expected.as_path()));
    assert_eq!(std::fs::read(&expected).unwrap(), b"%PDF-1.4 paper one");

    let second = &report.outcomes()[1];
    assert_eq!(second.status(), FetchStatus::Failed);
    assert_eq!(second.attempts(), 1, "404 must not be retried");
}

#[tokio::test]
async fn test_call_tool_round_trips_json() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mock_site(&server).await;
    let facade = facade_for(&server);
    let dest = TempDir::new().unwrap();

    let scraped = facade
        .call_tool(
            "scrape_source",
            json!({"sourceId": "eceswa", "query": {"grade": "JC", "subject": "science", "limit": 1}}),
        )
        .await
        .unwrap();
    let descriptors = scraped.as_array().unwrap();
    assert_eq!(descriptors.len(), 2, "limit completes the started year");
    assert_eq!(descriptors[0]["metadata"]["year"], "2021");

    let report = facade
        .call_tool(
            "download_resources",
            json!({
                "descriptors": [descriptors[0].clone()],
                "destDir": dest.path(),
                "maxConcurrency": 1
            }),
        )
        .await
        .unwrap();
    assert_eq!(report["succeeded"], 1);
    assert_eq!(report["outcomes"][0]["status"], "success");
    assert!(dest.path().join("JC-Science-2021-P1.pdf").is_file());
}

// ==================== Errors ====================

#[tokio::test]
async fn test_unknown_source_kind() {
    let config = PipelineConfig::default();
    let facade = ToolFacade::from_config(&config).unwrap();

    let err = facade
        .scrape(&ScrapeRequest {
            source_id: "nowhere".to_string(),
            query: SourceQuery::default(),
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ToolErrorKind::UnknownSource);
    let body = err.to_json();
    assert_eq!(body["error"]["kind"], "unknown_source");
    assert!(body["error"]["message"].as_str().unwrap().contains("papacambridge"));
}

#[tokio::test]
async fn test_source_down_is_source_unavailable() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let facade = facade_for(&server);

    let err = facade.scrape(&science_query()).await.unwrap_err();

    assert_eq!(err.kind(), ToolErrorKind::SourceUnavailable);
}

#[tokio::test]
async fn test_call_tool_rejects_bad_arguments() {
    let facade = ToolFacade::from_config(&PipelineConfig::default()).unwrap();

    let err = facade
        .call_tool("download_resources", json!({"descriptors": []}))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ToolErrorKind::InvalidRequest);

    let err = facade
        .call_tool(
            "download_resources",
            json!({"descriptors": [], "destDir": "/tmp/x", "maxConcurrency": 0}),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ToolErrorKind::InvalidRequest);

    let err = facade.call_tool("format_disk", json!({})).await.unwrap_err();
    assert_eq!(err.kind(), ToolErrorKind::InvalidRequest);
}

#[tokio::test]
async fn test_list_sources_tool() {
    let facade = ToolFacade::from_config(&PipelineConfig::default()).unwrap();
    let sources = facade.call_tool("list_sources", json!({})).await.unwrap();
    let ids: Vec<_> = sources
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap().to_string())
        .collect();
    for id in ["eceswa", "link-list", "papacambridge", "savemyexams"] {
        assert!(ids.iter().any(|known| known == id), "missing {id}: {ids:?}");
    }
}
