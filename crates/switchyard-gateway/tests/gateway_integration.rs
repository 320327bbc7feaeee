#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use switchyard_dispatch::Coordinator;
use switchyard_gateway::GatewayServer;
use tokio::net::TcpListener;

/// Helper: build a test server on a random port, returning the address and a
/// handle on the coordinator behind it.
async fn start_test_server() -> (String, Arc<Coordinator>) {
    let coordinator = Arc::new(Coordinator::new());
    let app = GatewayServer::build(coordinator.clone(), true);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Small yield to let the server task start
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    (addr, coordinator)
}

async fn register_agent(
    client: &reqwest::Client,
    addr: &str,
    id: &str,
    capabilities: &[&str],
    capacity: u32,
) {
    let resp = client
        .post(format!("http://{addr}/agents"))
        .json(&serde_json::json!({
            "id": id,
            "capabilities": capabilities,
            "capacity": capacity,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
}

#[tokio::test]
async fn test_health_endpoint() {
    let (addr, _coordinator) = start_test_server().await;
    let resp = reqwest::get(&format!("http://{addr}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "switchyard");
}

#[tokio::test]
async fn test_agent_registration_shows_in_status() {
    let (addr, _coordinator) = start_test_server().await;
    let client = reqwest::Client::new();

    register_agent(&client, &addr, "qa-1", &["qa", "review"], 2).await;

    let resp = reqwest::get(&format!("http://{addr}/status")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let status: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(status["agents"].as_array().unwrap().len(), 1);
    assert_eq!(status["agents"][0]["id"], "qa-1");
    assert_eq!(status["agents"][0]["capacity"], 2);
    assert_eq!(status["agents"][0]["load"], 0);
    assert_eq!(status["agents"][0]["availability"], "available");
    assert_eq!(status["total_agents"], 1);
    assert_eq!(status["active_agents"], 1);
    assert_eq!(status["queue_depth"], 0);
    assert_eq!(status["assignments"]["processing"], 0);
}

#[tokio::test]
async fn test_task_lifecycle_over_http() {
    let (addr, coordinator) = start_test_server().await;
    let client = reqwest::Client::new();

    register_agent(&client, &addr, "builder", &["build"], 1).await;

    // dispatch lands on the only capable agent
    let resp = client
        .post(format!("http://{addr}/tasks"))
        .json(&serde_json::json!({
            "key": "t-1",
            "capability": "build",
            "payload": {"target": "release"},
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let assignment: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(assignment["agent_id"], "builder");
    assert_eq!(assignment["state"], "processing");
    let assignment_id = assignment["id"].as_str().unwrap().to_string();

    // the pool is full now, so the next task queues
    let resp = client
        .post(format!("http://{addr}/tasks"))
        .json(&serde_json::json!({"key": "t-2", "capability": "build"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["queued"], true);
    assert_eq!(body["depth"], 1);

    // resubmitting an active key is a conflict
    let resp = client
        .post(format!("http://{addr}/tasks"))
        .json(&serde_json::json!({"key": "t-1", "capability": "build"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    // completion resolves the assignment and frees the slot
    let resp = client
        .post(format!("http://{addr}/assignments/{assignment_id}/completion"))
        .json(&serde_json::json!({"outcome": "completed"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let resolved: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(resolved["state"], "completed");

    // a conflicting report is refused
    let resp = client
        .post(format!("http://{addr}/assignments/{assignment_id}/completion"))
        .json(&serde_json::json!({"outcome": {"failed": {"reason": "late"}}}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    // the queued task goes out on the next drain
    assert_eq!(coordinator.drain_queue().await, 1);
    let resp = reqwest::get(&format!("http://{addr}/assignments/t-2"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let picked_up: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(picked_up["agent_id"], "builder");
    assert_eq!(picked_up["state"], "processing");
}

#[tokio::test]
async fn test_messaging_endpoints() {
    let (addr, _coordinator) = start_test_server().await;
    let client = reqwest::Client::new();

    register_agent(&client, &addr, "qa-1", &["qa"], 1).await;
    register_agent(&client, &addr, "qa-2", &["qa"], 1).await;

    let resp = client
        .post(format!("http://{addr}/messages/broadcast"))
        .json(&serde_json::json!({
            "from": "ops",
            "role": "qa",
            "payload": {"note": "standup in 5"},
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["recipients"], 2);

    let resp = client
        .post(format!("http://{addr}/messages"))
        .json(&serde_json::json!({
            "from": "ops",
            "to": {"agent": "qa-1"},
            "kind": "escalation",
            "priority": 8,
            "payload": {"incident": "INC-42"},
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["delivered"], 1);

    // qa-1 drains the broadcast copy and the escalation, in arrival order
    let resp = client
        .post(format!("http://{addr}/agents/qa-1/mailbox/drain"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let mail: serde_json::Value = resp.json().await.unwrap();
    let mail = mail.as_array().unwrap();
    assert_eq!(mail.len(), 2);
    assert_eq!(mail[0]["kind"], "status_update");
    assert_eq!(mail[0]["payload"]["note"], "standup in 5");
    assert_eq!(mail[1]["kind"], "escalation");
    assert_eq!(mail[1]["priority"], 8);

    // a second drain comes back empty
    let resp = client
        .post(format!("http://{addr}/agents/qa-1/mailbox/drain"))
        .send()
        .await
        .unwrap();
    let mail: serde_json::Value = resp.json().await.unwrap();
    assert!(mail.as_array().unwrap().is_empty());

    // unknown targets are 404s
    let resp = client
        .post(format!("http://{addr}/messages"))
        .json(&serde_json::json!({
            "from": "ops",
            "to": {"agent": "ghost"},
            "payload": {},
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // a role nobody holds broadcasts to zero recipients
    let resp = client
        .post(format!("http://{addr}/messages/broadcast"))
        .json(&serde_json::json!({"from": "ops", "role": "oncall", "payload": {}}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["recipients"], 0);
}

#[tokio::test]
async fn test_deregistration_endpoint() {
    let (addr, _coordinator) = start_test_server().await;
    let client = reqwest::Client::new();

    register_agent(&client, &addr, "solo", &["qa"], 1).await;
    let resp = client
        .post(format!("http://{addr}/tasks"))
        .json(&serde_json::json!({"key": "t-1", "capability": "qa"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // busy agents refuse a polite removal
    let resp = client
        .delete(format!("http://{addr}/agents/solo"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    let resp = client
        .delete(format!("http://{addr}/agents/solo?force=true"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    // the forced removal failed the in-flight assignment
    let resp = reqwest::get(&format!("http://{addr}/assignments/t-1"))
        .await
        .unwrap();
    let assignment: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(assignment["state"], "failed");
    assert!(assignment["failure_reason"]
        .as_str()
        .unwrap()
        .contains("deregistered"));

    // roster keeps the record but the agent is off rotation, mailbox gone
    let resp = reqwest::get(&format!("http://{addr}/status")).await.unwrap();
    let status: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(status["agents"][0]["availability"], "unavailable");
    assert_eq!(status["agents"][0]["load"], 0);
    assert_eq!(status["total_agents"], 1);
    assert_eq!(status["active_agents"], 0);

    let resp = client
        .post(format!("http://{addr}/agents/solo/mailbox/drain"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .delete(format!("http://{addr}/agents/ghost"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_unknown_assignment_lookups() {
    let (addr, _coordinator) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = reqwest::get(&format!("http://{addr}/assignments/nope"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let random_id = uuid::Uuid::new_v4();
    let resp = client
        .post(format!("http://{addr}/assignments/{random_id}/completion"))
        .json(&serde_json::json!({"outcome": "completed"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
