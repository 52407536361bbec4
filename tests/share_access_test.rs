mod common;

use axum::http::{StatusCode, header};
use chrono::{Duration, Utc};
use common::{TestApp, get_request};
use content_hub::entities::{files, prelude::*, shares};
use futures::future::join_all;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::json;

async fn share_row(app: &TestApp, token: &str) -> shares::Model {
    Shares::find()
        .filter(shares::Column::Token.eq(token))
        .one(&app.db)
        .await
        .unwrap()
        .unwrap()
}

async fn file_row(app: &TestApp, id: &str) -> files::Model {
    Files::find_by_id(id).one(&app.db).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_public_share_serves_anonymous_visitors() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (_, owner) = app.user_with_token(&admin, "owner").await;
    let file_id = app.upload(&owner, "notes.txt", "hello share").await;
    let token = app
        .share(&owner, &file_id, json!({ "require_login": false }))
        .await;

    let (status, meta) = app
        .json("GET", &format!("/api/shares/{token}"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(meta["filename"], "notes.txt");
    assert_eq!(meta["owner"], "owner");
    assert_eq!(meta["requires_login"], false);
    assert_eq!(meta["stream_path"], format!("/api/shares/{token}/stream"));
    assert!(meta["remaining_views"].is_null());

    let response = app
        .send(get_request(&format!("/api/shares/{token}/stream"), None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("inline; filename=\"notes.txt\""));
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");

    let (status, bytes) = app
        .get_raw(&format!("/api/shares/{token}/download"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"hello share");

    assert_eq!(share_row(&app, &token).await.view_count, 2);
}

#[tokio::test]
async fn test_share_defaults_to_login_required() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (_, owner) = app.user_with_token(&admin, "owner").await;
    let (_, viewer) = app.user_with_token(&admin, "viewer").await;
    let file_id = app.upload(&owner, "a.txt", "abc").await;

    // No body at all
    let req = axum::http::Request::builder()
        .method("POST")
        .uri(format!("/api/files/{file_id}/share"))
        .header("Authorization", format!("Bearer {owner}"))
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.send(req).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["requires_login"], true);
    assert!(body["allow_username"].is_null());
    let token = body["share_token"].as_str().unwrap().to_string();
    assert_eq!(body["preview_path"], format!("/preview/{token}"));

    let expires_at = share_row(&app, &token).await.expires_at.unwrap();
    let expected = Utc::now() + Duration::days(7);
    assert!((expires_at - expected).num_seconds().abs() < 60);

    let (status, _) = app
        .json("GET", &format!("/api/shares/{token}"), None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .get_raw(&format!("/api/shares/{token}/stream"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(share_row(&app, &token).await.view_count, 0);

    let (status, bytes) = app
        .get_raw(&format!("/api/shares/{token}/stream"), Some(&viewer))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"abc");
}

#[tokio::test]
async fn test_allowed_user_forces_login_and_restricts_viewer() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (_, bob) = app.user_with_token(&admin, "bob").await;
    let (_, alice) = app.user_with_token(&admin, "alice").await;
    let file_id = app.upload(&admin, "secret.txt", "for bob").await;

    let (status, body) = app
        .json(
            "POST",
            &format!("/api/files/{file_id}/share"),
            Some(&admin),
            Some(json!({ "require_login": false, "allow_username": "  bob " })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["requires_login"], true);
    assert_eq!(body["allow_username"], "bob");
    let token = body["share_token"].as_str().unwrap().to_string();
    assert!(share_row(&app, &token).await.require_login);

    let uri = format!("/api/shares/{token}/stream");
    assert_eq!(app.get_raw(&uri, None).await.0, StatusCode::UNAUTHORIZED);
    assert_eq!(app.get_raw(&uri, Some(&alice)).await.0, StatusCode::FORBIDDEN);
    assert_eq!(app.get_raw(&uri, Some(&admin)).await.0, StatusCode::FORBIDDEN);
    assert_eq!(app.get_raw(&uri, Some(&bob)).await.0, StatusCode::OK);

    let (status, meta) = app
        .json("GET", &format!("/api/shares/{token}"), Some(&bob), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(meta["allow_username"], "bob");
}

#[tokio::test]
async fn test_receiver_restriction_rules() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (_, owner) = app.user_with_token(&admin, "owner").await;
    app.create_user(&admin, "bob", "user").await;
    let file_id = app.upload(&owner, "a.txt", "abc").await;

    let uri = format!("/api/files/{file_id}/share");
    let (status, _) = app
        .json("POST", &uri, Some(&owner), Some(json!({ "allow_username": "bob" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .json("POST", &uri, Some(&admin), Some(json!({ "allow_username": "ghost" })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Blank names mean no restriction
    let (status, body) = app
        .json("POST", &uri, Some(&owner), Some(json!({ "allow_username": "   " })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["allow_username"].is_null());
}

#[tokio::test]
async fn test_share_creation_validation() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (_, owner) = app.user_with_token(&admin, "owner").await;
    let (_, other) = app.user_with_token(&admin, "other").await;
    let file_id = app.upload(&owner, "a.txt", "abc").await;
    let uri = format!("/api/files/{file_id}/share");

    for bad in [
        json!({ "max_views": 0 }),
        json!({ "max_views": 1001 }),
        json!({ "expires_in_days": 2 }),
        json!({ "expires_in_days": 0 }),
    ] {
        let (status, body) = app.json("POST", &uri, Some(&owner), Some(bad.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{bad} -> {body}");
    }

    let (status, body) = app
        .json(
            "POST",
            &uri,
            Some(&owner),
            Some(json!({ "max_views": 1000, "expires_in_days": 30 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["max_views"], 1000);

    let (status, _) = app
        .json("POST", &uri, Some(&other), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Admins may share any file
    let (status, _) = app
        .json("POST", &uri, Some(&admin), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .json("POST", "/api/files/nope/share", Some(&owner), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metadata_never_consumes_views() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let file_id = app.upload(&admin, "once.txt", "one shot").await;
    let token = app
        .share(
            &admin,
            &file_id,
            json!({ "require_login": false, "max_views": 1 }),
        )
        .await;
    let meta_uri = format!("/api/shares/{token}");

    for _ in 0..3 {
        let (status, meta) = app.json("GET", &meta_uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(meta["remaining_views"], 1);
    }
    assert_eq!(share_row(&app, &token).await.view_count, 0);

    let (status, bytes) = app
        .get_raw(&format!("/api/shares/{token}/stream"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"one shot");

    let (status, _) = app.json("GET", &meta_uri, None, None).await;
    assert_eq!(status, StatusCode::GONE);
    let (status, _) = app
        .get_raw(&format!("/api/shares/{token}/download"), None)
        .await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(share_row(&app, &token).await.view_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_fetches_never_exceed_quota() {
    const MAX_VIEWS: usize = 5;
    const EXTRA: usize = 7;

    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let file_id = app.upload(&admin, "hot.txt", "popular").await;
    let token = app
        .share(
            &admin,
            &file_id,
            json!({ "require_login": false, "max_views": MAX_VIEWS }),
        )
        .await;

    let uri = format!("/api/shares/{token}/stream");
    let responses = join_all(
        (0..MAX_VIEWS + EXTRA).map(|_| app.send(get_request(&uri, None))),
    )
    .await;

    let ok = responses
        .iter()
        .filter(|r| r.status() == StatusCode::OK)
        .count();
    let gone = responses
        .iter()
        .filter(|r| r.status() == StatusCode::GONE)
        .count();
    assert_eq!(ok, MAX_VIEWS);
    assert_eq!(gone, EXTRA);
    assert_eq!(share_row(&app, &token).await.view_count, MAX_VIEWS as i32);
}

#[tokio::test]
async fn test_missing_blob_is_not_found_but_view_is_spent() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let file_id = app.upload(&admin, "gone.txt", "soon missing").await;
    let token = app
        .share(
            &admin,
            &file_id,
            json!({ "require_login": false, "max_views": 3 }),
        )
        .await;

    let storage_key = file_row(&app, &file_id).await.storage_key;
    app.storage.delete_file(&storage_key).await.unwrap();

    let (status, body) = app
        .json("GET", &format!("/api/shares/{token}/stream"), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("shared file"));
    assert_eq!(share_row(&app, &token).await.view_count, 1);
}

#[tokio::test]
async fn test_soft_deleted_file_makes_share_not_found() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (_, owner) = app.user_with_token(&admin, "owner").await;
    let file_id = app.upload(&owner, "temp.txt", "bye").await;
    let token = app
        .share(&owner, &file_id, json!({ "require_login": false }))
        .await;

    let (status, body) = app
        .json("DELETE", &format!("/api/files/{file_id}"), Some(&owner), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "soft_deleted");

    let (status, _) = app
        .json("GET", &format!("/api/shares/{token}"), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app
        .get_raw(&format!("/api/shares/{token}/stream"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(share_row(&app, &token).await.view_count, 0);
}

#[tokio::test]
async fn test_expired_share_is_gone() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let file_id = app.upload(&admin, "old.txt", "old").await;
    let token = app
        .share(
            &admin,
            &file_id,
            json!({ "require_login": false, "expires_in_days": 1 }),
        )
        .await;

    let mut active: shares::ActiveModel = share_row(&app, &token).await.into();
    active.expires_at = Set(Some(Utc::now() - Duration::minutes(5)));
    active.update(&app.db).await.unwrap();

    let (status, _) = app
        .json("GET", &format!("/api/shares/{token}"), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::GONE);
    let (status, _) = app
        .get_raw(&format!("/api/shares/{token}/stream"), Some(&admin))
        .await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(share_row(&app, &token).await.view_count, 0);
}

#[tokio::test]
async fn test_invalid_bearer_is_rejected_even_on_public_share() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let file_id = app.upload(&admin, "pub.txt", "public").await;
    let token = app
        .share(&admin, &file_id, json!({ "require_login": false }))
        .await;

    let (status, _) = app
        .get_raw(&format!("/api/shares/{token}/stream"), Some("not-a-jwt"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(share_row(&app, &token).await.view_count, 0);

    let (status, _) = app.json("GET", "/api/shares/unknown-token", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_share_is_not_found_before_credentials_are_checked() {
    let app = TestApp::new().await;

    let (status, _) = app
        .json("GET", "/api/shares/unknown-token", Some("not-a-jwt"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    for route in ["stream", "download"] {
        let (status, _) = app
            .get_raw(&format!("/api/shares/unknown-token/{route}"), Some("not-a-jwt"))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
