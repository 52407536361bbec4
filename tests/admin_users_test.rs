mod common;

use axum::http::StatusCode;
use common::{ADMIN_PASS, ADMIN_USER, TestApp};
use content_hub::api::error::AppError;
use content_hub::entities::{prelude::*, users};
use content_hub::models::Role;
use content_hub::services::user_service::UserService;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::json;

async fn admin_count(app: &TestApp) -> u64 {
    Users::find()
        .filter(users::Column::Role.eq("admin"))
        .count(&app.db)
        .await
        .unwrap()
}

async fn seeded_admin_id(app: &TestApp) -> String {
    Users::find()
        .filter(users::Column::Username.eq(ADMIN_USER))
        .one(&app.db)
        .await
        .unwrap()
        .unwrap()
        .id
}

#[tokio::test]
async fn test_login() {
    let app = TestApp::new().await;

    let (status, body) = app
        .json(
            "POST",
            "/api/login",
            None,
            Some(json!({ "username": ADMIN_USER, "password": ADMIN_PASS })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].as_str().is_some());
    assert_eq!(body["user"]["role"], "admin");
    assert!(body["user"].get("password_hash").is_none());

    let (status, _) = app
        .json(
            "POST",
            "/api/login",
            None,
            Some(json!({ "username": ADMIN_USER, "password": "nope" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .json(
            "POST",
            "/api/login",
            None,
            Some(json!({ "username": "ghost", "password": "nope" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_and_list_users() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;

    let (status, body) = app
        .json(
            "POST",
            "/api/admin/users",
            Some(&admin),
            Some(json!({ "username": "carol", "password": "pw" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "user");

    let (status, _) = app
        .json(
            "POST",
            "/api/admin/users",
            Some(&admin),
            Some(json!({ "username": "carol", "password": "pw" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    for bad in [
        json!({ "username": "", "password": "pw" }),
        json!({ "username": "x".repeat(65), "password": "pw" }),
        json!({ "username": "dave", "password": "" }),
        json!({ "username": "dave", "password": "pw", "role": "root" }),
    ] {
        let (status, _) = app
            .json("POST", "/api/admin/users", Some(&admin), Some(bad))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    let (status, list) = app.json("GET", "/api/admin/users", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"carol") && names.contains(&ADMIN_USER));
    assert!(!list.to_string().contains("password"));
}

#[tokio::test]
async fn test_admin_routes_reject_plain_users() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (_, user) = app.user_with_token(&admin, "plain").await;

    let (status, _) = app.json("GET", "/api/admin/users", Some(&user), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.json("GET", "/api/admin/users", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sole_admin_cannot_be_demoted() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let admin_id = seeded_admin_id(&app).await;

    let (status, _) = app
        .json(
            "PATCH",
            &format!("/api/admin/users/{admin_id}/role"),
            Some(&admin),
            Some(json!({ "role": "user" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(admin_count(&app).await, 1);
}

#[tokio::test]
async fn test_sole_admin_cannot_be_deleted() {
    let app = TestApp::new().await;
    let admin_id = seeded_admin_id(&app).await;

    let result =
        UserService::delete_user(&app.db, app.storage.as_ref(), "someone-else", &admin_id).await;
    assert!(matches!(result, Err(AppError::InvalidState(_))));
    assert_eq!(admin_count(&app).await, 1);
}

#[tokio::test]
async fn test_self_delete_is_rejected() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let admin_id = seeded_admin_id(&app).await;
    app.create_user(&admin, "backup", "admin").await;

    let (status, _) = app
        .json("DELETE", &format!("/api/admin/users/{admin_id}"), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(admin_count(&app).await, 2);
}

#[tokio::test]
async fn test_demotion_with_a_second_admin() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let admin_id = seeded_admin_id(&app).await;
    let backup_id = app.create_user(&admin, "backup", "admin").await;

    let (status, body) = app
        .json(
            "PATCH",
            &format!("/api/admin/users/{backup_id}/role"),
            Some(&admin),
            Some(json!({ "role": "user" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "user");

    let (status, _) = app
        .json(
            "PATCH",
            &format!("/api/admin/users/{admin_id}/role"),
            Some(&admin),
            Some(json!({ "role": "user" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .json(
            "PATCH",
            &format!("/api/admin/users/{backup_id}/role"),
            Some(&admin),
            Some(json!({ "role": "ADMIN" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "admin");

    let (status, _) = app
        .json(
            "PATCH",
            "/api/admin/users/missing/role",
            Some(&admin),
            Some(json!({ "role": "user" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_demotions_keep_one_admin() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let first = seeded_admin_id(&app).await;
    let second = app.create_user(&admin, "backup", "admin").await;

    let (a, b) = tokio::join!(
        UserService::set_role(&app.db, &first, Role::User),
        UserService::set_role(&app.db, &second, Role::User),
    );

    let failures = [&a, &b]
        .iter()
        .filter(|r| matches!(r, Err(AppError::InvalidState(_))))
        .count();
    assert_eq!(failures, 1);
    assert!(a.is_ok() || b.is_ok());
    assert_eq!(admin_count(&app).await, 1);
}

#[tokio::test]
async fn test_demoted_admin_loses_admin_routes() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let backup_id = app.create_user(&admin, "backup", "admin").await;
    let backup = app.login("backup", "password123").await;

    let (status, _) = app.json("GET", "/api/admin/users", Some(&backup), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .json(
            "PATCH",
            &format!("/api/admin/users/{backup_id}/role"),
            Some(&admin),
            Some(json!({ "role": "user" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.json("GET", "/api/admin/users", Some(&backup), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_reset_password() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let user_id = app.create_user(&admin, "forgetful", "user").await;

    let (status, body) = app
        .json(
            "POST",
            &format!("/api/admin/users/{user_id}/reset-password"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let generated = body["password"].as_str().unwrap().to_string();
    assert_eq!(generated.len(), 12);
    app.login("forgetful", &generated).await;

    let (status, _) = app
        .json(
            "POST",
            "/api/login",
            None,
            Some(json!({ "username": "forgetful", "password": "password123" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .json(
            "POST",
            &format!("/api/admin/users/{user_id}/reset-password"),
            Some(&admin),
            Some(json!({ "password": "chosen-one" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["password"], "chosen-one");
    app.login("forgetful", "chosen-one").await;

    let (status, _) = app
        .json(
            "POST",
            "/api/admin/users/missing/reset-password",
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_reset_password_keeps_surrounding_whitespace() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let user_id = app.create_user(&admin, "spacey", "user").await;

    let (status, body) = app
        .json(
            "POST",
            &format!("/api/admin/users/{user_id}/reset-password"),
            Some(&admin),
            Some(json!({ "password": "  pad me  " })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["password"], "  pad me  ");
    app.login("spacey", "  pad me  ").await;

    let (status, _) = app
        .json(
            "POST",
            "/api/login",
            None,
            Some(json!({ "username": "spacey", "password": "pad me" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_deleted_user_token_stops_working() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (user_id, token) = app.user_with_token(&admin, "leaver").await;
    let file_id = app.upload(&token, "mine.txt", "bye").await;
    let storage_key = Files::find_by_id(file_id.as_str())
        .one(&app.db)
        .await
        .unwrap()
        .unwrap()
        .storage_key;

    let (status, _) = app
        .json("DELETE", &format!("/api/admin/users/{user_id}"), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.json("GET", "/api/files", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(!app.storage.file_exists(&storage_key).await.unwrap());

    let (status, _) = app
        .json("DELETE", &format!("/api/admin/users/{user_id}"), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
