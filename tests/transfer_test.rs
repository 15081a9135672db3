mod common;

use clap::Parser;
use globus_cli::transfer::{self, TransferClient, TransferOptions};
use serde_json::json;
use wiremock::{
    matchers::{body_json, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

const SRC: &str = "ddb59aef-6d04-11e5-ba46-22000b92c6ec";
const DST: &str = "ddb59af0-6d04-11e5-ba46-22000b92c6ec";
const TASK_ID: &str = "8d8a5f9e-4a5c-11ee-9c1c-c3a1b2a0c9d4";

#[tokio::test]
async fn endpoint_search_passes_filters() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v0.10/endpoint_search"))
        .and(query_param("filter_fulltext", "tutorial"))
        .and(query_param("filter_scope", "my-endpoints"))
        .and(query_param("limit", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "DATA_TYPE": "endpoint_list",
            "DATA": [{
                "DATA_TYPE": "endpoint",
                "id": SRC,
                "display_name": "Globus Tutorial Collection 1",
                "owner_string": "tutorial@globusid.org",
                "entity_type": "GCSv5_mapped_collection",
            }],
            "has_next_page": false,
            "offset": 0,
            "limit": 10,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let transfer = TransferClient(common::client_at(&server, "/v0.10"));
    let res = transfer
        .endpoint_search("tutorial", Some("my-endpoints"), Some(10), None)
        .await
        .unwrap();

    assert_eq!(res.data.len(), 1);
    assert_eq!(
        res.data[0].display_name.as_deref(),
        Some("Globus Tutorial Collection 1")
    );
}

#[tokio::test]
async fn ls_lists_a_path() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("/v0.10/operation/endpoint/{SRC}/ls")))
        .and(query_param("path", "/~/"))
        .and(query_param("show_hidden", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "DATA": [
                { "name": "docs", "type": "dir", "size": 4096 },
                {
                    "name": "a.txt",
                    "type": "file",
                    "size": 12,
                    "last_modified": "2026-01-01 00:00:00+00:00",
                },
            ],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let transfer = TransferClient(common::client_at(&server, "/v0.10"));
    let res = transfer
        .ls(SRC.parse().unwrap(), Some("/~/"), true)
        .await
        .unwrap();

    assert_eq!(res.data.len(), 2);
    assert_eq!(res.data[0].kind, "dir");
}

#[tokio::test]
async fn submit_fetches_a_submission_id_first() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v0.10/submission_id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "DATA_TYPE": "submission_id",
            "value": "b2e4b2a8-6d12-11ee-9f7e-12fb1b1c4f2b",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let opts = TransferOptions::parse_from([
        "submit",
        "--source-endpoint",
        SRC,
        "--destination-endpoint",
        DST,
        "--item",
        "/a.txt",
        "/b.txt",
    ]);
    let mut expected = opts.document().unwrap();
    expected["submission_id"] = "b2e4b2a8-6d12-11ee-9f7e-12fb1b1c4f2b".into();

    Mock::given(method("POST"))
        .and(path("/v0.10/transfer"))
        .and(body_json(expected))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "DATA_TYPE": "transfer_result",
            "code": "Accepted",
            "message": "The transfer has been accepted and a task has been created and queued for execution",
            "task_id": TASK_ID,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let transfer = TransferClient(common::client_at(&server, "/v0.10"));
    let ack = transfer.submit(opts.document().unwrap()).await.unwrap();

    assert_eq!(ack.code, "Accepted");
    assert_eq!(ack.task_id.map(|id| id.to_string()).as_deref(), Some(TASK_ID));
}

#[tokio::test]
async fn task_list_filters_by_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v0.10/task_list"))
        .and(query_param("filter", "status:ACTIVE,INACTIVE"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "DATA": [{ "task_id": TASK_ID, "status": "ACTIVE", "type": "TRANSFER" }],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let transfer = TransferClient(common::client_at(&server, "/v0.10"));
    let res = transfer
        .task_list(&["ACTIVE".to_owned(), "INACTIVE".to_owned()], None, None)
        .await
        .unwrap();

    assert_eq!(res.data[0].status, "ACTIVE");
    assert!(!res.data[0].is_finished());
}

#[derive(Parser)]
struct Cli {
    #[clap(subcommand)]
    cmd: transfer::Args,
}

async fn wait_for(server: &MockServer, statuses: &[&str]) -> anyhow::Result<()> {
    for status in statuses {
        Mock::given(method("GET"))
            .and(path(format!("/v0.10/task/{TASK_ID}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "task_id": TASK_ID,
                "status": status,
                "type": "TRANSFER",
            })))
            .up_to_n_times(1)
            .expect(1)
            .mount(server)
            .await;
    }

    let (_td, ctx) = common::context();
    let cli = Cli::parse_from([
        "transfer",
        "task",
        "wait",
        TASK_ID,
        "--polling-interval",
        "1",
    ]);
    transfer::run(cli.cmd, common::client_at(server, "/v0.10"), &ctx).await
}

#[tokio::test]
async fn wait_polls_until_success() {
    let server = MockServer::start().await;
    wait_for(&server, &["ACTIVE", "SUCCEEDED"]).await.unwrap();
}

#[tokio::test]
async fn wait_fails_when_the_task_fails() {
    let server = MockServer::start().await;

    let err = wait_for(&server, &["FAILED"]).await.unwrap_err();
    assert_eq!(err.to_string(), format!("task {TASK_ID} failed"));
}
