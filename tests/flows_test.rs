mod common;

use globus_cli::{
    flows::{runs::{ListRuns, RunsClient}, FlowFields, FlowsClient, ListFlows, RunRequest},
    http::{self, ApiError},
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;
use wiremock::{
    matchers::{body_json, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

const FLOW_ID: &str = "9c5b5a0e-2c3e-4d5e-8a57-0a2e6d5f1f70";
const RUN_ID: &str = "f6e0c6d2-50a3-4f0a-bc2c-6f2d3b9a1e44";

fn flow_json() -> serde_json::Value {
    json!({
        "id": FLOW_ID,
        "title": "Move and index",
        "flow_owner": "urn:globus:auth:identity:46bd0f56-e24f-11e5-a510-131bef46955c",
        "keywords": ["demo"],
        "definition": { "StartAt": "Move", "States": {} },
    })
}

fn run_json(status: &str) -> serde_json::Value {
    json!({
        "run_id": RUN_ID,
        "flow_id": FLOW_ID,
        "status": status,
        "label": "nightly",
        "tags": ["a"],
    })
}

#[tokio::test]
async fn list_passes_filters_through() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flows"))
        .and(query_param("filter_role", "flow_owner"))
        .and(query_param("filter_fulltext", "index"))
        .and(header("authorization", common::BEARER))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "flows": [flow_json()],
            "has_next_page": true,
            "marker": "abc",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let flows = FlowsClient(common::client(&server));
    let list = flows
        .list(&ListFlows {
            filter_role: Some("flow_owner".to_owned()),
            filter_fulltext: Some("index".to_owned()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(list.flows.len(), 1);
    assert_eq!(list.flows[0].title, "Move and index");
    assert!(list.flows[0].extra.contains_key("definition"));
    assert!(list.has_next_page);
    assert_eq!(list.marker.as_deref(), Some("abc"));
}

#[tokio::test]
async fn update_only_sends_given_fields() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path(format!("/flows/{FLOW_ID}")))
        .and(body_json(json!({ "title": "Renamed", "keywords": ["x", "y"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(flow_json()))
        .expect(1)
        .mount(&server)
        .await;

    let flows = FlowsClient(common::client(&server));
    flows
        .update(
            FLOW_ID.parse().unwrap(),
            &FlowFields {
                title: Some("Renamed".to_owned()),
                keywords: Some(vec!["x".to_owned(), "y".to_owned()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn run_posts_input_as_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/flows/{FLOW_ID}/run")))
        .and(body_json(json!({
            "body": { "src": "/~/a" },
            "label": "nightly",
            "tags": ["a"],
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(run_json("ACTIVE")))
        .expect(1)
        .mount(&server)
        .await;

    let flows = FlowsClient(common::client(&server));
    let run = flows
        .run(
            FLOW_ID.parse().unwrap(),
            &RunRequest {
                body: json!({ "src": "/~/a" }),
                label: Some("nightly".to_owned()),
                tags: vec!["a".to_owned()],
            },
        )
        .await
        .unwrap();

    assert_eq!(run.run_id, RUN_ID.parse::<Uuid>().unwrap());
    assert!(!run.is_finished());
}

#[tokio::test]
async fn service_errors_are_decoded() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("/flows/{FLOW_ID}")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": "NOT_FOUND", "detail": "No flow with that ID" },
        })))
        .mount(&server)
        .await;

    let flows = FlowsClient(common::client(&server));
    let err = flows.get(FLOW_ID.parse().unwrap()).await.unwrap_err();
    let api = err.downcast_ref::<ApiError>().expect("expected an API error");

    assert_eq!(api.status.as_u16(), 404);
    assert_eq!(api.code, "NOT_FOUND");
    assert_eq!(api.message, "No flow with that ID");
}

#[tokio::test]
async fn runs_list_joins_repeated_filters() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/runs"))
        .and(query_param("filter_status", "ACTIVE,INACTIVE"))
        .and(query_param("filter_flow_id", FLOW_ID))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "runs": [run_json("ACTIVE"), run_json("INACTIVE")],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = common::client(&server);
    let list = RunsClient(&client)
        .list(&ListRuns {
            filter_flow_id: vec![FLOW_ID.parse().unwrap()],
            filter_status: vec!["ACTIVE".to_owned(), "INACTIVE".to_owned()],
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(list.runs.len(), 2);
    assert!(!list.has_next_page);
}

#[tokio::test]
async fn waiting_polls_until_the_run_is_done() {
    let server = MockServer::start().await;
    let run_path = format!("/runs/{RUN_ID}");

    Mock::given(method("GET"))
        .and(path(run_path.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(run_json("ACTIVE")))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(run_path.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(run_json("SUCCEEDED")))
        .expect(1)
        .mount(&server)
        .await;

    let client = common::client(&server);
    let runs = RunsClient(&client);
    let id = RUN_ID.parse().unwrap();

    let run = http::poll_until(
        Duration::from_millis(10),
        || runs.get(id),
        globus_cli::flows::runs::Run::is_finished,
    )
    .await
    .unwrap();

    assert_eq!(run.status, "SUCCEEDED");
}

#[tokio::test]
async fn run_actions_post_without_a_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/runs/{RUN_ID}/cancel")))
        .respond_with(ResponseTemplate::new(200).set_body_json(run_json("ENDED")))
        .expect(1)
        .mount(&server)
        .await;

    let client = common::client(&server);
    let run = RunsClient(&client)
        .action(RUN_ID.parse().unwrap(), "cancel")
        .await
        .unwrap();

    assert!(run.is_finished());
}
