//! Black-box tests: real router on an ephemeral port, driven over HTTP.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::json;
use uuid::Uuid;

use vendia_api::app::{build_app, AppServices};
use vendia_billing::{Establishment, TaxAuthority};
use vendia_infra::billing::{InvoiceWorker, MockAuthority};
use vendia_infra::jobs::RetryPolicy;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
    authority: Arc<MockAuthority>,
    worker: Arc<InvoiceWorker>,
}

impl TestServer {
    async fn spawn() -> Self {
        let services = Arc::new(AppServices::in_memory());
        let authority = Arc::new(MockAuthority::new());

        // Same worker as prod, but driven by hand (`drain`) so tests are
        // deterministic instead of waiting on a poll interval.
        let worker = Arc::new(
            InvoiceWorker::new(
                services.store.clone(),
                services.jobs.clone(),
                Arc::clone(&authority) as Arc<dyn TaxAuthority>,
                Establishment {
                    company_name: "Comercial Andina".to_string(),
                    ruc: "1790012345001".to_string(),
                    address: "Av. Amazonas N24-196".to_string(),
                    establishment_code: "001".to_string(),
                    emission_point: "001".to_string(),
                },
            )
            .with_retry(RetryPolicy::new(3, Duration::ZERO, Duration::ZERO)),
        );

        let app = build_app(Arc::clone(&services));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            handle,
            authority,
            worker,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn seed_product(
    client: &reqwest::Client,
    base_url: &str,
    stock: i64,
    unit_price: i64,
    tax_rate_bp: u16,
) -> String {
    let res = client
        .post(format!("{base_url}/products"))
        .json(&json!({
            "stock": stock,
            "unit_price": unit_price,
            "tax_rate_bp": tax_rate_bp,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

fn cart_body(product_id: &str, quantity: i64, unit_price: i64, paid: i64) -> serde_json::Value {
    json!({
        "customer_id": Uuid::now_v7(),
        "user_id": Uuid::now_v7(),
        "items": [{
            "product_id": product_id,
            "quantity": quantity,
            "unit_price": unit_price,
        }],
        "payments": [{ "method": "cash", "amount": paid }],
    })
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(format!("{}/health", srv.base_url)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn sale_commits_and_gets_authorized() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let product_id = seed_product(&client, &srv.base_url, 10, 250, 1500).await;

    // 2 × 250c + 15% tax = 575c
    let res = client
        .post(format!("{}/sales", srv.base_url))
        .json(&cart_body(&product_id, 2, 250, 600))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let sale: serde_json::Value = res.json().await.unwrap();
    assert_eq!(sale["estado_sri"], "PROCESSING");
    assert_eq!(sale["total"], 575);
    assert_eq!(sale["change"], 25);
    let sale_id = sale["id"].as_str().unwrap().to_string();

    // Run the invoice pipeline to completion.
    srv.worker.drain().await;

    let res = client
        .get(format!("{}/sales/{}", srv.base_url, sale_id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let sale: serde_json::Value = res.json().await.unwrap();
    assert_eq!(sale["estado_sri"], "AUTHORIZED");
    assert!(sale["clave_acceso"].is_string());
    assert!(sale["comprobante_id"].is_string());
    assert_eq!(srv.authority.submissions().len(), 1);

    // The commit left exactly one sale entry in the kardex and took the
    // stock down.
    let res = client
        .get(format!(
            "{}/kardex?product_id={}",
            srv.base_url, product_id
        ))
        .send()
        .await
        .unwrap();
    let entries: serde_json::Value = res.json().await.unwrap();
    assert_eq!(entries.as_array().unwrap().len(), 1);
    assert_eq!(entries[0]["movement"], "sale");
    assert_eq!(entries[0]["stock_before"], 10);
    assert_eq!(entries[0]["stock_after"], 8);

    let res = client
        .get(format!("{}/products/{}", srv.base_url, product_id))
        .send()
        .await
        .unwrap();
    let product: serde_json::Value = res.json().await.unwrap();
    assert_eq!(product["stock"], 8);
}

#[tokio::test]
async fn oversell_is_rejected_with_conflict() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let product_id = seed_product(&client, &srv.base_url, 2, 100, 0).await;

    let res = client
        .post(format!("{}/sales", srv.base_url))
        .json(&cart_body(&product_id, 3, 100, 300))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "insufficient_stock");

    // Nothing committed.
    let res = client
        .get(format!("{}/products/{}", srv.base_url, product_id))
        .send()
        .await
        .unwrap();
    let product: serde_json::Value = res.json().await.unwrap();
    assert_eq!(product["stock"], 2);
}

#[tokio::test]
async fn underpayment_is_unprocessable() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let product_id = seed_product(&client, &srv.base_url, 10, 5000, 0).await;

    let res = client
        .post(format!("{}/sales", srv.base_url))
        .json(&cart_body(&product_id, 1, 5000, 4000))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "payment_mismatch");
}

#[tokio::test]
async fn unknown_product_is_a_validation_error() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/sales", srv.base_url))
        .json(&cart_body(&Uuid::now_v7().to_string(), 1, 100, 100))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn manual_movements_flow_through_the_kardex() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let product_id = seed_product(&client, &srv.base_url, 5, 300, 0).await;

    let res = client
        .post(format!("{}/kardex", srv.base_url))
        .json(&json!({
            "product_id": product_id,
            "movement": "purchase",
            "quantity": 10,
            "unit_cost": 200,
            "reason": "weekly restock",
            "actor_id": Uuid::now_v7(),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let entry: serde_json::Value = res.json().await.unwrap();
    assert_eq!(entry["stock_before"], 5);
    assert_eq!(entry["stock_after"], 15);
    let entry_id = entry["id"].as_str().unwrap().to_string();

    let res = client
        .get(format!("{}/kardex/lasted", srv.base_url))
        .send()
        .await
        .unwrap();
    let latest: serde_json::Value = res.json().await.unwrap();
    assert_eq!(latest.as_array().unwrap().len(), 1);
    assert_eq!(latest[0]["id"].as_str().unwrap(), entry_id);

    let res = client
        .get(format!("{}/kardex/{}", srv.base_url, entry_id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Draining stock below zero is refused.
    let res = client
        .post(format!("{}/kardex", srv.base_url))
        .json(&json!({
            "product_id": product_id,
            "movement": "damaged",
            "quantity": 99,
            "unit_cost": 0,
            "reason": "flood",
            "actor_id": Uuid::now_v7(),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn non_electronic_sale_is_terminal_at_creation() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let product_id = seed_product(&client, &srv.base_url, 10, 100, 0).await;

    let mut body = cart_body(&product_id, 1, 100, 100);
    body["electronic"] = json!(false);
    let res = client
        .post(format!("{}/sales", srv.base_url))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let sale: serde_json::Value = res.json().await.unwrap();
    assert_eq!(sale["estado_sri"], "NO_ELECTRONIC");

    srv.worker.drain().await;
    assert!(
        srv.authority.submissions().is_empty(),
        "non-electronic sales never reach the authority"
    );
}

#[tokio::test]
async fn resend_webhook_queues_the_right_job() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let product_id = seed_product(&client, &srv.base_url, 10, 100, 0).await;

    let res = client
        .post(format!("{}/sales", srv.base_url))
        .json(&cart_body(&product_id, 1, 100, 100))
        .send()
        .await
        .unwrap();
    let sale: serde_json::Value = res.json().await.unwrap();
    let sale_id = sale["id"].as_str().unwrap().to_string();

    srv.worker.drain().await;

    let res = client
        .post(format!("{}/billing/resend-webhook", srv.base_url))
        .json(&json!({ "sale_id": sale_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["kind"], "create_comprobante");

    let res = client
        .post(format!("{}/billing/resend-webhook", srv.base_url))
        .json(&json!({ "sale_id": Uuid::now_v7() }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn listing_filters_by_invoice_state() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let product_id = seed_product(&client, &srv.base_url, 10, 100, 0).await;

    let mut paper = cart_body(&product_id, 1, 100, 100);
    paper["electronic"] = json!(false);
    client
        .post(format!("{}/sales", srv.base_url))
        .json(&paper)
        .send()
        .await
        .unwrap();
    client
        .post(format!("{}/sales", srv.base_url))
        .json(&cart_body(&product_id, 1, 100, 100))
        .send()
        .await
        .unwrap();

    let res = client
        .get(format!("{}/sales?estado_sri=PROCESSING", srv.base_url))
        .send()
        .await
        .unwrap();
    let sales: serde_json::Value = res.json().await.unwrap();
    assert_eq!(sales.as_array().unwrap().len(), 1);

    let res = client
        .get(format!("{}/sales?estado_sri=bogus", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
