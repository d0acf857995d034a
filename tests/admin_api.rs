//! Admin API tests over real HTTP.

use std::net::SocketAddr;
use std::time::Duration;

use queue_circuit_breaker::admin::{self, AdminState};
use queue_circuit_breaker::circuit::{CircuitInfo, CircuitState, QueueResponseType};
use queue_circuit_breaker::config::schema::CircuitBreakerConfig;
use queue_circuit_breaker::lifecycle::Shutdown;
use serde_json::Value;

mod common;

use common::{request, Cluster};

async fn start_admin(cluster: &Cluster, api_key: Option<&str>, shutdown: &Shutdown) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = AdminState::new(cluster.instances[0].clone(), "node-0", api_key);
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = admin::serve(listener, state, rx).await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    addr
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

fn open_config() -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        min_queue_sample_count: 1,
        error_threshold_percentage: 50,
        circuit_check_enabled: true,
        ..CircuitBreakerConfig::default()
    }
}

#[tokio::test]
async fn test_status_and_circuit_listing() {
    let cluster = Cluster::new(1, open_config(), &["/orders/.*", "/users/.*"]);
    cluster
        .node(0)
        .update_statistics("orders", &request("/orders/1", "1"), QueueResponseType::Failure)
        .await
        .unwrap();

    let shutdown = Shutdown::new();
    let addr = start_admin(&cluster, None, &shutdown).await;
    let client = client();

    let status: Value = client
        .get(format!("http://{}/admin/status", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["status"], "operational");
    assert_eq!(status["instance"], "node-0");
    assert_eq!(status["circuit_check_enabled"], true);
    assert_eq!(status["mapped_circuits"], 2);

    let circuits: Vec<CircuitInfo> = client
        .get(format!("http://{}/circuits", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(circuits.len(), 1);
    assert_eq!(circuits[0].state, CircuitState::Open);
    assert_eq!(circuits[0].pattern, "/orders/.*");
    assert_eq!(circuits[0].locked_queues, 1);

    let one: CircuitInfo = client
        .get(format!("http://{}/circuits/{}", addr, circuits[0].hash))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(one, circuits[0]);

    let res = client
        .get(format!("http://{}/circuits/does-not-exist", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);

    shutdown.trigger();
}

#[tokio::test]
async fn test_close_and_reopen_by_uri() {
    let cluster = Cluster::new(1, open_config(), &["/orders/.*"]);
    cluster
        .node(0)
        .update_statistics("orders", &request("/orders/1", "1"), QueueResponseType::Failure)
        .await
        .unwrap();

    let shutdown = Shutdown::new();
    let addr = start_admin(&cluster, None, &shutdown).await;
    let client = client();

    let res = client
        .post(format!("http://{}/circuits/close", addr))
        .json(&serde_json::json!({ "uri": "/orders/9" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["action"], "closed");
    assert_eq!(cluster.store.pending_unlock_count(), 1);

    let state = cluster
        .node(0)
        .handle_queued_request("orders", &request("/orders/2", "2"))
        .await
        .unwrap();
    assert_eq!(state, CircuitState::Closed);

    let res = client
        .post(format!("http://{}/circuits/reopen", addr))
        .json(&serde_json::json!({ "uri": "/orders/9" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let res = client
        .post(format!("http://{}/circuits/close-all", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let circuits = cluster.node(0).all_circuits().await.unwrap();
    assert!(circuits.iter().all(|c| c.state == CircuitState::Closed));

    // Unmapped uri.
    let res = client
        .post(format!("http://{}/circuits/close", addr))
        .json(&serde_json::json!({ "uri": "/nothing/here" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "no rule to circuit mapping found for uri /nothing/here");

    shutdown.trigger();
}

#[tokio::test]
async fn test_api_key_is_enforced() {
    let cluster = Cluster::new(1, open_config(), &["/orders/.*"]);
    let shutdown = Shutdown::new();
    let addr = start_admin(&cluster, Some("secret"), &shutdown).await;
    let client = client();

    let res = client
        .get(format!("http://{}/circuits", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    let res = client
        .get(format!("http://{}/circuits", addr))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    let res = client
        .get(format!("http://{}/circuits", addr))
        .bearer_auth("secret")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    shutdown.trigger();
}
