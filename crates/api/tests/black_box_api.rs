//! Black-box tests: real HTTP against a server on an ephemeral port.
//!
//! Projections are updated asynchronously off the event bus, so read-side
//! assertions poll until the expected state appears (bounded wait).

use std::time::Duration;

use serde_json::{Value, json};
use uuid::Uuid;

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    tenant_id: Uuid,
}

impl TestServer {
    async fn spawn() -> Self {
        let app = lotline_api::app::build_app().await;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("server failed");
        });

        Self {
            base_url: format!("http://{addr}"),
            client: reqwest::Client::new(),
            tenant_id: Uuid::now_v7(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .header("X-Tenant-Id", self.tenant_id.to_string())
            .json(&body)
            .send()
            .await
            .expect("request failed")
    }

    async fn post_empty(&self, path: &str) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .header("X-Tenant-Id", self.tenant_id.to_string())
            .send()
            .await
            .expect("request failed")
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .header("X-Tenant-Id", self.tenant_id.to_string())
            .send()
            .await
            .expect("request failed")
    }

    async fn get_as(&self, tenant_id: Uuid, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .header("X-Tenant-Id", tenant_id.to_string())
            .send()
            .await
            .expect("request failed")
    }

    /// Poll a GET endpoint until `predicate` accepts the JSON body.
    async fn wait_for_json<F>(&self, path: &str, predicate: F) -> Value
    where
        F: Fn(&Value) -> bool,
    {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let resp = self.get(path).await;
            if resp.status().is_success() {
                let body: Value = resp.json().await.expect("json body");
                if predicate(&body) {
                    return body;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("timed out waiting for {path}");
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}

async fn receive_lot(server: &TestServer, sku: &str, warehouse: &str, quantity: i64) -> Uuid {
    receive_lot_expiring(server, sku, warehouse, quantity, None).await
}

async fn receive_lot_expiring(
    server: &TestServer,
    sku: &str,
    warehouse: &str,
    quantity: i64,
    expiration: Option<&str>,
) -> Uuid {
    let resp = server
        .post(
            "/lots",
            json!({
                "sku": sku,
                "warehouse": warehouse,
                "quantity": quantity,
                "expiration": expiration,
            }),
        )
        .await;
    assert_eq!(resp.status(), 201, "lot receipt should succeed");
    let body: Value = resp.json().await.expect("json body");
    body["lot_id"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .expect("lot_id in response")
}

fn summary_for<'a>(stock: &'a Value, sku: &str, warehouse: &str) -> Option<&'a Value> {
    stock
        .as_array()?
        .iter()
        .find(|s| s["sku"] == sku && s["warehouse"] == warehouse)
}

#[tokio::test]
async fn health_is_public() {
    let server = TestServer::spawn().await;
    let resp = reqwest::get(server.url("/health")).await.expect("request");
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn domain_routes_require_a_tenant() {
    let server = TestServer::spawn().await;

    let resp = reqwest::get(server.url("/stock")).await.expect("request");
    assert_eq!(resp.status(), 401);

    let resp = server
        .client
        .get(server.url("/stock"))
        .header("X-Tenant-Id", "not-a-uuid")
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn receipt_shows_up_in_the_stock_read_model() {
    let server = TestServer::spawn().await;
    receive_lot(&server, "SKU-1", "WH-A", 50).await;

    let stock = server
        .wait_for_json("/stock", |v| summary_for(v, "SKU-1", "WH-A").is_some())
        .await;

    let summary = summary_for(&stock, "SKU-1", "WH-A").expect("summary");
    assert_eq!(summary["on_hand"], 50);
    assert_eq!(summary["available"], 50);
    assert_eq!(summary["reserved"], 0);
}

#[tokio::test]
async fn allocation_lifecycle_over_http() {
    let server = TestServer::spawn().await;
    receive_lot(&server, "SKU-1", "WH-A", 100).await;
    server
        .wait_for_json("/stock", |v| summary_for(v, "SKU-1", "WH-A").is_some())
        .await;

    let resp = server
        .post(
            "/allocations",
            json!({
                "sku": "SKU-1",
                "warehouse": "WH-A",
                "quantity": 30,
                "order_line_ref": "order-1/line-1",
            }),
        )
        .await;
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.expect("json body");
    let allocation_id = body["allocation_id"].as_str().expect("allocation_id");
    assert_eq!(body["state"], "allocated");
    assert_eq!(body["partial"], false);

    server
        .wait_for_json("/stock", |v| {
            summary_for(v, "SKU-1", "WH-A").is_some_and(|s| s["reserved"] == 30)
        })
        .await;

    // Pick, pack, ship; each transition reports the new state.
    for (step, expected) in [
        ("pick", "picked"),
        ("pack", "packed"),
        ("commit-shipment", "shipped"),
    ] {
        let resp = server
            .post_empty(&format!("/allocations/{allocation_id}/{step}"))
            .await;
        assert_eq!(resp.status(), 200, "step {step} should succeed");
        let body: Value = resp.json().await.expect("json body");
        assert_eq!(body["state"], expected);
    }

    server
        .wait_for_json("/stock", |v| {
            summary_for(v, "SKU-1", "WH-A")
                .is_some_and(|s| s["on_hand"] == 70 && s["reserved"] == 0)
        })
        .await;

    // The shipped allocation is terminal.
    let resp = server.get(&format!("/allocations/{allocation_id}")).await;
    assert_eq!(resp.status(), 200);
    let allocation: Value = resp.json().await.expect("json body");
    assert_eq!(allocation["state"], "shipped");
}

#[tokio::test]
async fn releasing_twice_is_a_no_op() {
    let server = TestServer::spawn().await;
    receive_lot(&server, "SKU-1", "WH-A", 40).await;
    server
        .wait_for_json("/stock", |v| summary_for(v, "SKU-1", "WH-A").is_some())
        .await;

    let resp = server
        .post(
            "/allocations",
            json!({
                "sku": "SKU-1",
                "warehouse": "WH-A",
                "quantity": 15,
                "order_line_ref": "order-9/line-1",
            }),
        )
        .await;
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.expect("json body");
    let allocation_id = body["allocation_id"].as_str().expect("allocation_id");

    for _ in 0..2 {
        let resp = server
            .post_empty(&format!("/allocations/{allocation_id}/release"))
            .await;
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.expect("json body");
        assert_eq!(body["state"], "released");
    }

    server
        .wait_for_json("/stock", |v| {
            summary_for(v, "SKU-1", "WH-A")
                .is_some_and(|s| s["available"] == 40 && s["reserved"] == 0)
        })
        .await;
}

#[tokio::test]
async fn expiring_lots_are_drawn_first() {
    let server = TestServer::spawn().await;
    let late = receive_lot_expiring(&server, "SKU-1", "WH-A", 40, Some("2027-06-01")).await;
    let early = receive_lot_expiring(&server, "SKU-1", "WH-A", 40, Some("2026-11-01")).await;
    server
        .wait_for_json("/stock", |v| {
            summary_for(v, "SKU-1", "WH-A").is_some_and(|s| s["on_hand"] == 80)
        })
        .await;

    let resp = server
        .post(
            "/allocations",
            json!({
                "sku": "SKU-1",
                "warehouse": "WH-A",
                "quantity": 50,
                "order_line_ref": "order-2/line-1",
            }),
        )
        .await;
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.expect("json body");
    let draws = body["draws"].as_array().expect("draws");
    assert_eq!(draws.len(), 2);
    assert_eq!(draws[0]["lot_id"], early.to_string());
    assert_eq!(draws[0]["quantity"], 40);
    assert_eq!(draws[1]["lot_id"], late.to_string());
    assert_eq!(draws[1]["quantity"], 10);
}

#[tokio::test]
async fn lots_listing_follows_the_rotation_policy() {
    let server = TestServer::spawn().await;
    let first = receive_lot_expiring(&server, "SKU-1", "WH-A", 10, Some("2026-03-01")).await;
    let second = receive_lot_expiring(&server, "SKU-1", "WH-A", 10, Some("2026-01-01")).await;
    let third = receive_lot(&server, "SKU-1", "WH-A", 10).await;

    // Served straight from the stream, so no read-model wait is needed.
    let resp = server
        .get("/lots?sku=SKU-1&warehouse=WH-A&policy=fefo")
        .await;
    assert_eq!(resp.status(), 200);
    let lots: Value = resp.json().await.expect("json body");
    let ids: Vec<&str> = lots
        .as_array()
        .expect("array")
        .iter()
        .map(|l| l["id"].as_str().expect("lot id"))
        .collect();
    // Earliest expiration first, undated lot last.
    assert_eq!(
        ids,
        vec![second.to_string(), first.to_string(), third.to_string()]
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
    );

    let resp = server
        .get("/lots?sku=SKU-1&warehouse=WH-A&policy=lifo")
        .await;
    assert_eq!(resp.status(), 200);
    let lots: Value = resp.json().await.expect("json body");
    let newest = lots.as_array().expect("array")[0]["id"]
        .as_str()
        .expect("lot id");
    assert_eq!(newest, third.to_string());
}

#[tokio::test]
async fn over_allocation_is_a_conflict() {
    let server = TestServer::spawn().await;
    receive_lot(&server, "SKU-1", "WH-A", 10).await;
    server
        .wait_for_json("/stock", |v| summary_for(v, "SKU-1", "WH-A").is_some())
        .await;

    let resp = server
        .post(
            "/allocations",
            json!({
                "sku": "SKU-1",
                "warehouse": "WH-A",
                "quantity": 25,
                "order_line_ref": "order-3/line-1",
            }),
        )
        .await;
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.expect("json body");
    assert_eq!(body["error"], "insufficient_stock");
    assert_eq!(body["requested"], 25);
    assert_eq!(body["available"], 10);
}

#[tokio::test]
async fn transfer_moves_stock_between_warehouses() {
    let server = TestServer::spawn().await;
    receive_lot(&server, "SKU-1", "WH-A", 100).await;
    server
        .wait_for_json("/stock", |v| summary_for(v, "SKU-1", "WH-A").is_some())
        .await;

    let resp = server
        .post(
            "/transfers",
            json!({
                "sku": "SKU-1",
                "from_warehouse": "WH-A",
                "to_warehouse": "WH-B",
                "quantity": 40,
            }),
        )
        .await;
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.expect("json body");
    assert_eq!(body["status"], "received");
    let transfer_id = body["transfer_id"].as_str().expect("transfer_id");

    server
        .wait_for_json("/stock", |v| {
            summary_for(v, "SKU-1", "WH-B").is_some_and(|s| s["on_hand"] == 40)
                && summary_for(v, "SKU-1", "WH-A").is_some_and(|s| s["on_hand"] == 60)
        })
        .await;

    server
        .wait_for_json(&format!("/transfers/{transfer_id}"), |v| {
            v["status"] == "received"
        })
        .await;
}

#[tokio::test]
async fn transfer_without_stock_gets_stuck_and_is_resumable() {
    let server = TestServer::spawn().await;
    receive_lot(&server, "SKU-1", "WH-A", 5).await;
    server
        .wait_for_json("/stock", |v| summary_for(v, "SKU-1", "WH-A").is_some())
        .await;

    let resp = server
        .post(
            "/transfers",
            json!({
                "sku": "SKU-1",
                "from_warehouse": "WH-A",
                "to_warehouse": "WH-B",
                "quantity": 50,
            }),
        )
        .await;
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.expect("json body");
    assert_eq!(body["status"], "stuck");
    let transfer_id = body["transfer_id"].as_str().expect("transfer_id");

    server
        .wait_for_json(&format!("/transfers/{transfer_id}"), |v| {
            v["status"] == "stuck"
        })
        .await;

    // Top up the source and resume the stuck transfer.
    receive_lot(&server, "SKU-1", "WH-A", 100).await;
    server
        .wait_for_json("/stock", |v| {
            summary_for(v, "SKU-1", "WH-A").is_some_and(|s| s["on_hand"] == 105)
        })
        .await;

    let resp = server
        .post_empty(&format!("/transfers/{transfer_id}/receive"))
        .await;
    assert_eq!(resp.status(), 204);

    server
        .wait_for_json("/stock", |v| {
            summary_for(v, "SKU-1", "WH-B").is_some_and(|s| s["on_hand"] == 50)
        })
        .await;
}

#[tokio::test]
async fn movements_trace_the_lot_history() {
    let server = TestServer::spawn().await;
    receive_lot(&server, "SKU-1", "WH-A", 30).await;
    server
        .wait_for_json("/stock", |v| summary_for(v, "SKU-1", "WH-A").is_some())
        .await;

    let movements = server
        .wait_for_json("/movements?sku=SKU-1&warehouse=WH-A", |v| {
            v.as_array().is_some_and(|a| !a.is_empty())
        })
        .await;

    let entries = movements.as_array().expect("array");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["kind"], "receipt");
    assert_eq!(entries[0]["on_hand_delta"], 30);
}

#[tokio::test]
async fn reconcile_reports_clean_after_normal_operation() {
    let server = TestServer::spawn().await;
    receive_lot(&server, "SKU-1", "WH-A", 30).await;
    server
        .wait_for_json("/stock", |v| summary_for(v, "SKU-1", "WH-A").is_some())
        .await;

    let resp = server.post("/stock/reconcile", json!({})).await;
    assert_eq!(resp.status(), 200);
    let report: Value = resp.json().await.expect("json body");
    assert_eq!(report["clean"], true);
    assert_eq!(report["positions_checked"], 1);

    // Scoped to a single position.
    let resp = server
        .post(
            "/stock/reconcile",
            json!({ "sku": "SKU-1", "warehouse": "WH-A" }),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let report: Value = resp.json().await.expect("json body");
    assert_eq!(report["clean"], true);
    assert_eq!(report["positions_checked"], 1);
}

#[tokio::test]
async fn advisor_recommends_reordering_low_stock() {
    let server = TestServer::spawn().await;
    receive_lot(&server, "SKU-1", "WH-A", 100).await;
    server
        .wait_for_json("/stock", |v| summary_for(v, "SKU-1", "WH-A").is_some())
        .await;

    let resp = server
        .post(
            "/stock/reorder-policy",
            json!({
                "sku": "SKU-1",
                "warehouse": "WH-A",
                "reorder_point": 500,
                "reorder_quantity": 200,
                "lead_time_days": 7,
                "low_stock_threshold": 150,
            }),
        )
        .await;
    assert_eq!(resp.status(), 204);

    let recommendations = server
        .wait_for_json("/advisor/recommendations", |v| {
            v.as_array().is_some_and(|a| !a.is_empty())
        })
        .await;

    let rec = &recommendations.as_array().expect("array")[0];
    assert_eq!(rec["sku"], "SKU-1");
    assert_eq!(rec["warehouse"], "WH-A");
    assert!(rec["recommended_quantity"].as_i64().expect("quantity") >= 200);
}

#[tokio::test]
async fn tenants_never_see_each_others_stock() {
    let server = TestServer::spawn().await;
    receive_lot(&server, "SKU-1", "WH-A", 50).await;
    server
        .wait_for_json("/stock", |v| summary_for(v, "SKU-1", "WH-A").is_some())
        .await;

    let other_tenant = Uuid::now_v7();
    let resp = server.get_as(other_tenant, "/stock").await;
    assert_eq!(resp.status(), 200);
    let stock: Value = resp.json().await.expect("json body");
    assert_eq!(stock.as_array().expect("array").len(), 0);
}
