//! API integration tests
//!
//! These run against a live server with an empty database:
//! `BOOKHIVE_AUTH__BOOTSTRAP_PASSWORD=admin BOOKHIVE_SCHEDULER__ENABLED=false cargo run`
//! then `cargo test -- --ignored`. The scheduler stays off so queued emails are not
//! flushed underneath the queue tests.

use reqwest::Client;
use serde_json::{json, Value};

const BASE_URL: &str = "http://localhost:8080/api/v1";
const ADMIN_PASSWORD: &str = "admin";

/// Helper to get an admin bearer token
async fn get_auth_token(client: &Client) -> String {
    let response = client
        .post(format!("{}/functions/admin-check-password", BASE_URL))
        .json(&json!({ "password": ADMIN_PASSWORD }))
        .send()
        .await
        .expect("Failed to send login request");

    let body: Value = response.json().await.expect("Failed to parse login response");
    body["token"].as_str().expect("No token in response").to_string()
}

/// Create a book (with one copy) and return its id
async fn create_book(client: &Client, token: &str, title: &str) -> String {
    let response = client
        .post(format!("{}/functions/admin-manage-book", BASE_URL))
        .bearer_auth(token)
        .json(&json!({
            "action": "create",
            "bookData": { "title": title, "authors": ["Integration Author"] }
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    body["book"]["id"].as_str().expect("No book id").to_string()
}

/// Submit a borrow request for one unit of `book_id` and return its id
async fn submit_request(client: &Client, book_id: &str, days: i32) -> String {
    let response = client
        .post(format!("{}/borrow-requests", BASE_URL))
        .json(&json!({
            "requester_name": "Ada Reader",
            "email": "ada@example.org",
            "phone": "0123456789",
            "affiliation": "student",
            "requested_items": [{ "book_id": book_id, "quantity": 1 }],
            "desired_duration_days": days,
            "pickup_location": "Main desk"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("Failed to parse response");
    body["id"].as_str().expect("No request id").to_string()
}

async fn process(client: &Client, token: &str, request_id: &str, action: &str) -> reqwest::Response {
    client
        .post(format!("{}/functions/process-borrow-request", BASE_URL))
        .bearer_auth(token)
        .json(&json!({ "requestId": request_id, "action": action }))
        .send()
        .await
        .expect("Failed to send request")
}

async fn manage_loan(client: &Client, token: &str, loan_id: &str, action: &str) -> reqwest::Response {
    client
        .post(format!("{}/functions/admin-manage-loan", BASE_URL))
        .bearer_auth(token)
        .json(&json!({ "loanId": loan_id, "action": action }))
        .send()
        .await
        .expect("Failed to send request")
}

/// Approve a fresh request for a fresh book and return the loan id
async fn issue_loan(client: &Client, token: &str, title: &str) -> String {
    let book_id = create_book(client, token, title).await;
    let request_id = submit_request(client, &book_id, 14).await;
    let body: Value = process(client, token, &request_id, "approved")
        .await
        .json()
        .await
        .expect("Failed to parse response");
    body["fulfillment"][0]["loan_ids"][0]
        .as_str()
        .expect("No loan issued")
        .to_string()
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_login() {
    let client = Client::new();

    let response = client
        .post(format!("{}/functions/admin-check-password", BASE_URL))
        .json(&json!({ "password": ADMIN_PASSWORD }))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["success"], true);
    assert!(body["token"].is_string());
    assert!(body["expires_at"].is_string());
}

#[tokio::test]
#[ignore]
async fn test_login_invalid_password() {
    let client = Client::new();

    let response = client
        .post(format!("{}/functions/admin-check-password", BASE_URL))
        .json(&json!({ "password": "wrong" }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 401);

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["success"], false);
}

#[tokio::test]
#[ignore]
async fn test_unauthorized_access() {
    let client = Client::new();

    let response = client
        .get(format!("{}/loans", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 401);
}

#[tokio::test]
#[ignore]
async fn test_revoked_token_rejected() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let response = client
        .post(format!("{}/admin/logout", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    let response = client
        .get(format!("{}/stats", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 401);
}

#[tokio::test]
#[ignore]
async fn test_list_books() {
    let client = Client::new();

    let response = client
        .get(format!("{}/books", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["items"].is_array());
    assert!(body["total"].is_number());
}

#[tokio::test]
#[ignore]
async fn test_submit_request_validation() {
    let client = Client::new();

    let response = client
        .post(format!("{}/borrow-requests", BASE_URL))
        .json(&json!({
            "requester_name": "A",
            "email": "not-an-email",
            "affiliation": "student",
            "requested_items": [],
            "desired_duration_days": 120,
            "pickup_location": ""
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 400);
}

/// The queued submission notice for `request_id`, if any
async fn submission_notice(client: &Client, token: &str, request_id: &str) -> Option<Value> {
    let body: Value = client
        .get(format!("{}/notifications?status=queued&per_page=200", BASE_URL))
        .bearer_auth(token)
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response");

    body["items"]
        .as_array()
        .expect("No items in response")
        .iter()
        .find(|entry| entry["payload"]["request_id"] == request_id)
        .cloned()
}

#[tokio::test]
#[ignore]
async fn test_submit_queues_confirmation() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let book_id = create_book(&client, &token, "Confirmation Test Book").await;
    let request_id = submit_request(&client, &book_id, 14).await;

    let notice = submission_notice(&client, &token, &request_id)
        .await
        .expect("No confirmation queued");
    assert_eq!(notice["status"], "queued");
    assert_eq!(notice["to_email"], "ada@example.org");
    assert_eq!(notice["subject"], "Borrow Request Submitted - Book Hive Library");
}

#[tokio::test]
#[ignore]
async fn test_send_email_settles_queue_entry_once() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let book_id = create_book(&client, &token, "Queue Settle Book").await;
    let request_id = submit_request(&client, &book_id, 7).await;
    let notice = submission_notice(&client, &token, &request_id)
        .await
        .expect("No confirmation queued");

    let send = || {
        client
            .post(format!("{}/functions/send-email", BASE_URL))
            .bearer_auth(&token)
            .json(&json!({
                "to": notice["to_email"],
                "subject": notice["subject"],
                "html": notice["content"],
                "queueId": notice["id"]
            }))
            .send()
    };

    let response = send().await.expect("Failed to send request");
    assert!(response.status().is_success());

    // Already sent: a second delivery is refused
    let response = send().await.expect("Failed to send request");
    assert_eq!(response.status(), 409);
}

#[tokio::test]
#[ignore]
async fn test_bulk_import_rejects_excessive_copies() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let response = client
        .post(format!("{}/functions/bulk-import-books", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "books": [{ "title": "Too Many Copies", "copies": 4294967295u32 }] }))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["imported"], 0);
    assert_eq!(body["results"][0]["success"], false);
}

#[tokio::test]
#[ignore]
async fn test_approve_allocates_copy() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let book_id = create_book(&client, &token, "Approval Test Book").await;
    let request_id = submit_request(&client, &book_id, 14).await;

    let response = process(&client, &token, &request_id, "approved").await;
    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["success"], true);
    assert_eq!(body["fulfillment"][0]["allocated"], 1);
    assert_eq!(body["fulfillment"][0]["status"], "fulfilled");

    let loan_id = body["fulfillment"][0]["loan_ids"][0].as_str().expect("No loan issued");
    let loan: Value = client
        .get(format!("{}/loans/{}", BASE_URL, loan_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response");
    assert_eq!(loan["status"], "active");
    assert_eq!(loan["loan_duration_days"], 14);

    // Processing twice is a conflict
    let response = process(&client, &token, &request_id, "approved").await;
    assert_eq!(response.status(), 409);
}

#[tokio::test]
#[ignore]
async fn test_approve_without_copies() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let book_id = create_book(&client, &token, "Single Copy Book").await;
    let first = submit_request(&client, &book_id, 7).await;
    let second = submit_request(&client, &book_id, 7).await;

    process(&client, &token, &first, "approved").await;
    let response = process(&client, &token, &second, "approved").await;
    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["fulfillment"][0]["allocated"], 0);
    assert_eq!(body["fulfillment"][0]["status"], "unavailable");
}

#[tokio::test]
#[ignore]
async fn test_reject_request() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let book_id = create_book(&client, &token, "Rejection Test Book").await;
    let request_id = submit_request(&client, &book_id, 14).await;

    let response = process(&client, &token, &request_id, "rejected").await;
    assert!(response.status().is_success());

    let request: Value = client
        .get(format!("{}/borrow-requests/{}", BASE_URL, request_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response");
    assert_eq!(request["status"], "rejected");
    assert!(request["approved_by"].is_null());
}

#[tokio::test]
#[ignore]
async fn test_renew_then_return() {
    let client = Client::new();
    let token = get_auth_token(&client).await;
    let loan_id = issue_loan(&client, &token, "Renewal Test Book").await;

    let response = manage_loan(&client, &token, &loan_id, "renew").await;
    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["loan"]["renewal_count"], 1);

    let response = manage_loan(&client, &token, &loan_id, "return").await;
    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["loan"]["status"], "returned");

    // A returned loan can be neither returned nor renewed again
    let response = manage_loan(&client, &token, &loan_id, "return").await;
    assert_eq!(response.status(), 409);
    let response = manage_loan(&client, &token, &loan_id, "renew").await;
    assert_eq!(response.status(), 409);
}

#[tokio::test]
#[ignore]
async fn test_overdue_check_is_idempotent() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let run = |client: Client, token: String| async move {
        let response = client
            .post(format!("{}/functions/daily-overdue-check", BASE_URL))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to send request");
        assert!(response.status().is_success());
        response.json::<Value>().await.expect("Failed to parse response")
    };

    run(client.clone(), token.clone()).await;
    let second = run(client.clone(), token.clone()).await;

    assert_eq!(second["success"], true);
    assert_eq!(second["processed_count"], 0);
}

#[tokio::test]
#[ignore]
async fn test_delete_book_with_open_loan() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let book_id = create_book(&client, &token, "Delete Guard Book").await;
    let request_id = submit_request(&client, &book_id, 14).await;
    process(&client, &token, &request_id, "approved").await;

    let response = client
        .post(format!("{}/functions/admin-manage-book", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "action": "delete", "bookId": book_id }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 409);
}

#[tokio::test]
#[ignore]
async fn test_bulk_import() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let response = client
        .post(format!("{}/functions/bulk-import-books", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({
            "books": [
                { "title": "Imported One", "authors": ["A. Writer"], "publication_year": "2001" },
                { "title": "Imported Two", "copies": 3 },
                { "title": "" }
            ]
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["total"], 3);
    assert_eq!(body["imported"], 2);
    assert_eq!(body["results"][1]["copies"], 3);
    assert_eq!(body["results"][2]["success"], false);
}
