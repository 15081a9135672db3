mod common;

use clap::Parser;
use globus_cli::groups::{self, BatchRequest, GroupsClient, Role};
use serde_json::json;
use wiremock::{
    matchers::{body_json, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

const GROUP_ID: &str = "2c3f1b3a-73e5-11eb-9d8e-0e2a7d9a5b7b";
const IDENTITY_ID: &str = "46bd0f56-e24f-11e5-a510-131bef46955c";

fn group_json() -> serde_json::Value {
    json!({
        "id": GROUP_ID,
        "name": "Research Lab",
        "description": "Everyone in the lab",
        "group_type": "regular",
        "my_memberships": [{
            "identity_id": IDENTITY_ID,
            "username": "jdoe@example.org",
            "role": "admin",
            "status": "active",
        }],
        "memberships": [
            {
                "identity_id": IDENTITY_ID,
                "username": "jdoe@example.org",
                "role": "admin",
                "status": "active",
            },
            {
                "identity_id": "ae341a98-d274-11e5-b888-dbae3a8ba545",
                "username": "asmith@example.org",
                "role": "member",
                "status": "active",
            },
        ],
        "enforce_session": false,
    })
}

#[tokio::test]
async fn show_can_include_memberships() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("/v2/groups/{GROUP_ID}")))
        .and(query_param("include", "memberships"))
        .respond_with(ResponseTemplate::new(200).set_body_json(group_json()))
        .expect(1)
        .mount(&server)
        .await;

    let groups = GroupsClient(common::client_at(&server, "/v2"));
    let group = groups.get(GROUP_ID.parse().unwrap(), true).await.unwrap();

    assert_eq!(group.name, "Research Lab");
    assert_eq!(group.memberships.len(), 2);
    assert_eq!(group.extra["enforce_session"], false);
}

#[tokio::test]
async fn create_omits_missing_fields() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/groups"))
        .and(body_json(json!({ "name": "Research Lab" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(group_json()))
        .expect(1)
        .mount(&server)
        .await;

    let groups = GroupsClient(common::client_at(&server, "/v2"));
    groups.create("Research Lab", None, None).await.unwrap();
}

#[tokio::test]
async fn member_add_sends_a_batch() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/v2/groups/{GROUP_ID}")))
        .and(body_json(json!({
            "add": [{ "identity_id": IDENTITY_ID, "role": "manager" }],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "add": [{
                "identity_id": IDENTITY_ID,
                "role": "manager",
                "status": "active",
            }],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let groups = GroupsClient(common::client_at(&server, "/v2"));
    let added = groups
        .batch(
            GROUP_ID.parse().unwrap(),
            &BatchRequest::add(IDENTITY_ID.parse().unwrap(), Role::Manager),
        )
        .await
        .unwrap()
        .into_result()
        .unwrap();

    assert_eq!(added.len(), 1);
    assert_eq!(added[0].role, "manager");
}

#[tokio::test]
async fn batch_errors_fail_the_command() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/v2/groups/{GROUP_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "remove": [],
            "errors": {
                "remove": [{
                    "code": "MEMBERSHIP_NOT_FOUND",
                    "detail": "Identity is not a member",
                    "identity_id": IDENTITY_ID,
                }],
            },
        })))
        .mount(&server)
        .await;

    let groups = GroupsClient(common::client_at(&server, "/v2"));
    let err = groups
        .batch(
            GROUP_ID.parse().unwrap(),
            &BatchRequest::remove(IDENTITY_ID.parse().unwrap()),
        )
        .await
        .unwrap()
        .into_result()
        .unwrap_err();

    let msg = err.to_string();
    assert!(msg.starts_with("failed to remove"), "{msg}");
    assert!(msg.contains("MEMBERSHIP_NOT_FOUND"), "{msg}");
    assert!(msg.contains("Identity is not a member"), "{msg}");
}

#[derive(Parser)]
struct Cli {
    #[clap(subcommand)]
    cmd: groups::Args,
}

async fn run_group(server: &MockServer, args: &[&str]) -> anyhow::Result<()> {
    let (_td, ctx) = common::context();
    let cli = Cli::parse_from(std::iter::once("group").chain(args.iter().copied()));
    groups::run(cli.cmd, common::client_at(server, "/v2"), &ctx).await
}

#[tokio::test]
async fn update_keeps_fields_that_are_not_given() {
    let server = MockServer::start().await;

    let mut current = group_json();
    current["description"] = json!("keep me");

    Mock::given(method("GET"))
        .and(path(format!("/v2/groups/{GROUP_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(current))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path(format!("/v2/groups/{GROUP_ID}")))
        .and(body_json(json!({ "name": "New", "description": "keep me" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(group_json()))
        .expect(1)
        .mount(&server)
        .await;

    run_group(&server, &["update", GROUP_ID, "--name", "New"])
        .await
        .unwrap();
}

#[tokio::test]
async fn update_needs_a_field() {
    let server = MockServer::start().await;

    let err = run_group(&server, &["update", GROUP_ID]).await.unwrap_err();
    assert!(err.to_string().contains("nothing to update"), "{err:#}");
}
