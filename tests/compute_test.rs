mod common;

use globus_cli::{
    compute::{ComputeClient, Role, Task},
    http, NotSupported,
};
use serde_json::json;
use std::time::Duration;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

const ENDPOINT_ID: &str = "4b116d3c-1703-4f8f-9f6f-39921e5864df";
const TASK_ID: &str = "1c3a6f6c-9bfc-4b8f-8d57-0f6a7a3b2f11";

#[tokio::test]
async fn endpoint_list_filters_by_role() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/endpoints"))
        .and(query_param("role", "any"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "uuid": ENDPOINT_ID, "name": "tutorial", "display_name": "Tutorial Endpoint" },
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let compute = ComputeClient(common::client(&server));
    let endpoints = compute.endpoints(Role::Any).await.unwrap();

    assert_eq!(endpoints.len(), 1);
    assert_eq!(endpoints[0].id.to_string(), ENDPOINT_ID);
}

#[tokio::test]
async fn endpoint_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("/v2/endpoints/{ENDPOINT_ID}/status")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "online",
            "details": { "total_workers": 4 },
        })))
        .expect(1)
        .mount(&server)
        .await;

    let compute = ComputeClient(common::client(&server));
    let status = compute
        .endpoint_status(ENDPOINT_ID.parse().unwrap())
        .await
        .unwrap();

    assert_eq!(status.status, "online");
}

#[tokio::test]
async fn task_wait_stops_at_a_result() {
    let server = MockServer::start().await;
    let task_path = format!("/v2/tasks/{TASK_ID}");

    Mock::given(method("GET"))
        .and(path(task_path.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "task_id": TASK_ID,
            "status": "waiting-for-launch",
            "pending": true,
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(task_path.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "task_id": TASK_ID,
            "pending": false,
            "result": "gANLKi4=",
            "completion_t": "1700000000.5",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let compute = ComputeClient(common::client(&server));
    let id = TASK_ID.parse().unwrap();
    let task = http::poll_until(Duration::from_millis(10), || compute.task(id), Task::is_final)
        .await
        .unwrap();

    assert!(task.result.is_some());
    assert_eq!(task.extra["pending"], false);
}

#[test]
fn unsupported_operations_say_so() {
    let err = NotSupported {
        operation: "compute function run",
        reason: "task arguments must be serialized by the Python SDK",
    };

    assert_eq!(
        err.to_string(),
        "'compute function run' is not yet supported: task arguments must be serialized by the Python SDK"
    );
}
