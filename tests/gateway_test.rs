mod common;

use common::spawn_gateway;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

#[tokio::test]
async fn health_and_metrics_bypass_admission() {
    let gateway = spawn_gateway().await;
    let client = reqwest::Client::new();

    for _ in 0..3 {
        let res = client.get(gateway.url("/health")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
    let body: Value = client
        .get(gateway.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["tracked_identities"], 0);

    // collectors register on first use
    client.get(gateway.url("/nowhere")).send().await.unwrap();
    let metrics = client
        .get(gateway.url("/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("gateway_requests_total"));
}

#[tokio::test]
async fn unknown_route_is_404_and_wrong_method_is_405() {
    let gateway = spawn_gateway().await;
    let client = reqwest::Client::new();

    let res = client.get(gateway.url("/nowhere")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], false);

    let res = client.post(gateway.url("/login")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn login_then_userinfo() {
    let gateway = spawn_gateway().await;
    let client = reqwest::Client::new();

    let res = client
        .get(gateway.url("/login?email=Alice@bank.test&password=correct-horse"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    let token = body["authToken"].as_str().unwrap().to_string();

    // token and credential identities share the account email as key,
    // so wait out the route's 1000ms spacing first
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let res = client
        .get(gateway.url("/userinfo"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let account: Value = res.json().await.unwrap();
    assert_eq!(account["email"], "alice@bank.test");
    assert!(account.get("password").is_none());

    // same account again inside the 1000ms route hint
    let res = client
        .get(gateway.url("/userinfo"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], false);
    assert!(body["endAt"].as_str().is_some());
}

#[tokio::test]
async fn auth_failures_map_to_status_codes() {
    let gateway = spawn_gateway().await;
    let client = reqwest::Client::new();

    let res = client.get(gateway.url("/userinfo")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(gateway.url("/userinfo"))
        .bearer_auth("definitely.not.valid")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let orphan = gateway.tokens.issue("ghost@bank.test").unwrap();
    let res = client
        .get(gateway.url("/userinfo"))
        .bearer_auth(orphan)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client.get(gateway.url("/login?email=alice@bank.test")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .get(gateway.url("/login?email=alice@bank.test&password=wrong"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Invalid credentials");
}

#[tokio::test]
async fn credentials_are_read_from_json_body() {
    let gateway = spawn_gateway().await;
    let client = reqwest::Client::new();

    let res = client
        .get(gateway.url("/login"))
        .json(&serde_json::json!({"email": "alice@bank.test", "password": "correct-horse"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn public_route_keys_on_peer_or_forwarded_address() {
    let gateway = spawn_gateway().await;
    let client = reqwest::Client::new();

    let res = client.get(gateway.url("/whoami")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["identity"], "127.0.0.1");

    // second request well inside the 4000ms address spacing
    let res = client.get(gateway.url("/whoami")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: Value = res.json().await.unwrap();
    assert_eq!(
        body["error"],
        "You have been blocked from accessing the API routes (RATE LIMIT)"
    );

    // a forwarded address is a different caller
    let res = client
        .get(gateway.url("/whoami"))
        .header("x-forwarded-for", "203.0.113.7")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["identity"], "203.0.113.7");
}
