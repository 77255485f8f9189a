//! Integration tests — notification listing, admin broadcast and presence.

mod common;

use axum::http::StatusCode;
use common::TestApp;
use serde_json::json;
use taskline_core::models::auth::Role;

#[tokio::test]
async fn broadcast_requires_admin() {
    let t = TestApp::new();
    let member = t.seed("m@example.com", Role::Member, "password1").await;
    let token = t.access_token(member);

    let (status, body) = t
        .post(
            "/notifications/broadcast",
            Some(&token),
            json!({"title": "Maintenance", "content": "Tonight"}),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
    assert!(t.store.notifications_for(member).await.is_empty());
}

#[tokio::test]
async fn broadcast_stores_for_every_active_principal() {
    let t = TestApp::new();
    let admin = t.seed("admin@example.com", Role::Admin, "password1").await;
    let member = t.seed("m@example.com", Role::Member, "password1").await;
    let inactive = t.seed("gone@example.com", Role::Member, "password1").await;
    t.store.set_active(inactive, false).await;

    let (status, body) = t
        .post(
            "/notifications/broadcast",
            Some(&t.access_token(admin)),
            json!({"title": "Maintenance", "content": "Tonight", "data": {"window": "22:00"}}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stored"], 2);
    assert_eq!(body["pushed"], 0, "nobody is connected");

    let (status, list) = t
        .get("/notifications?unread=true", Some(&t.access_token(member)))
        .await;
    assert_eq!(status, StatusCode::OK);
    let items = list.as_array().expect("array");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["type"], "system");
    assert_eq!(items[0]["title"], "Maintenance");
    assert_eq!(items[0]["data"]["window"], "22:00");
    assert_eq!(items[0]["isRead"], false);
}

#[tokio::test]
async fn broadcast_rejects_empty_title() {
    let t = TestApp::new();
    let admin = t.seed("admin@example.com", Role::Admin, "password1").await;
    let (status, _) = t
        .post(
            "/notifications/broadcast",
            Some(&t.access_token(admin)),
            json!({"title": "  ", "content": "x"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reading_another_principals_notifications_requires_admin() {
    let t = TestApp::new();
    let admin = t.seed("admin@example.com", Role::Admin, "password1").await;
    let a = t.seed("a@example.com", Role::Member, "password1").await;
    let b = t.seed("b@example.com", Role::Member, "password1").await;

    let (status, _) = t
        .get(
            &format!("/notifications?principalId={b}"),
            Some(&t.access_token(a)),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, list) = t
        .get(
            &format!("/notifications?principalId={b}"),
            Some(&t.access_token(admin)),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn notification_limit_is_validated() {
    let t = TestApp::new();
    let a = t.seed("a@example.com", Role::Member, "password1").await;
    let (status, _) = t
        .get("/notifications?limit=0", Some(&t.access_token(a)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn notifications_require_auth() {
    let t = TestApp::new();
    let (status, body) = t.get("/notifications", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthenticated");
}

#[tokio::test]
async fn presence_reports_offline_and_unknown() {
    let t = TestApp::new();
    let a = t.seed("a@example.com", Role::Member, "password1").await;
    let b = t.seed("b@example.com", Role::Member, "password1").await;
    let token = t.access_token(a);

    let (status, body) = t.get(&format!("/presence/{b}"), Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["principalId"], b);
    assert_eq!(body["online"], false);
    assert_eq!(body["connections"], 0);

    let (status, body) = t.get("/presence/9999", Some(&token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}
