//! End-to-end vote recording tests.

mod common;

use common::{GatewayOptions, TestGateway};
use reqwest::StatusCode;

async fn battle_uuid(gateway: &TestGateway) -> String {
    let response = gateway.generate_battle("upbeat electronic").await;
    assert_eq!(response.status(), StatusCode::OK);
    let battle: serde_json::Value = response.json().await.unwrap();
    battle["uuid"].as_str().unwrap().to_string()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_insufficient_listen_time_is_422() {
    let gateway = TestGateway::spawn(GatewayOptions {
        minimum_listen_time: 10.0,
        ..GatewayOptions::default()
    })
    .await;
    let uuid = battle_uuid(&gateway).await;

    // 3 seconds of PLAY per side against a 10 second minimum.
    let response = gateway
        .record_vote(common::vote_request(&uuid, "A", 3.0))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "insufficient_listen_time");

    // The record was not mutated: a later adequate vote still lands cleanly.
    let response = gateway
        .record_vote(common::vote_request(&uuid, "A", 12.0))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_battle_is_404() {
    let gateway = TestGateway::spawn(GatewayOptions::default()).await;

    let response = gateway
        .record_vote(common::vote_request(
            "00000000-0000-4000-8000-000000000000",
            "A",
            2.0,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "battle_not_found");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_replayed_vote_is_idempotent() {
    let gateway = TestGateway::spawn(GatewayOptions::default()).await;
    let uuid = battle_uuid(&gateway).await;

    let request = common::vote_request(&uuid, "B", 2.0);
    let first = gateway.record_vote(request.clone()).await;
    assert_eq!(first.status(), StatusCode::OK);
    let first: serde_json::Value = first.json().await.unwrap();

    // Same payload again: last-writer-wins with identical input is a no-op.
    let second = gateway.record_vote(request).await;
    assert_eq!(second.status(), StatusCode::OK);
    let second: serde_json::Value = second.json().await.unwrap();

    assert_eq!(first["winner"], second["winner"]);
    assert_eq!(first["a_metadata"], second["a_metadata"]);
    assert_eq!(first["b_metadata"], second["b_metadata"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_conflicting_revote_takes_last_writer() {
    let gateway = TestGateway::spawn(GatewayOptions::default()).await;
    let uuid = battle_uuid(&gateway).await;

    let first = gateway
        .record_vote(common::vote_request(&uuid, "A", 2.0))
        .await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = gateway
        .record_vote(common::vote_request(&uuid, "BOTH_BAD", 2.0))
        .await;
    assert_eq!(second.status(), StatusCode::OK);
    let second: serde_json::Value = second.json().await.unwrap();
    assert!(second["winner"].is_null());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unmatched_play_counts_until_vote_time() {
    let gateway = TestGateway::spawn(GatewayOptions {
        minimum_listen_time: 5.0,
        ..GatewayOptions::default()
    })
    .await;
    let uuid = battle_uuid(&gateway).await;

    // PLAY with no PAUSE: listening runs until preference_time, well past
    // the 5 second minimum.
    let request = serde_json::json!({
        "session": common::session_json(),
        "user": common::user_json(),
        "battle_uuid": uuid,
        "vote": {
            "preference": "A",
            "preference_time": 1700000100.0,
            "a_listen_data": [["PLAY", 1700000050.0]],
            "b_listen_data": [["PLAY", 1700000060.0]],
        },
    });
    let response = gateway.record_vote(request).await;
    assert_eq!(response.status(), StatusCode::OK);
}
