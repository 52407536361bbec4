#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
    response::Response,
};
use content_hub::config::AppConfig;
use content_hub::infrastructure::database;
use content_hub::services::storage::{LocalStorageService, StorageService};
use content_hub::{AppState, create_app};
use http_body_util::BodyExt;
use sea_orm::DatabaseConnection;
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

pub const ADMIN_USER: &str = "admin";
pub const ADMIN_PASS: &str = "admin123";
pub const BOUNDARY: &str = "---------------------------content-hub-boundary";

pub struct TestApp {
    pub app: Router,
    pub db: DatabaseConnection,
    pub storage: Arc<dyn StorageService>,
    pub upload_dir: std::path::PathBuf,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("content_hub=debug")
            .with_test_writer()
            .try_init();

        let dir = TempDir::new().unwrap();
        let upload_dir = dir.path().join("uploads");

        let config = AppConfig {
            database_url: format!("sqlite://{}/hub.db?mode=rwc", dir.path().display()),
            jwt_secret: "test-secret".to_string(),
            upload_dir: upload_dir.display().to_string(),
            admin_user: ADMIN_USER.to_string(),
            admin_pass: ADMIN_PASS.to_string(),
            ..AppConfig::development()
        };

        let db = database::setup_database(&config).await.unwrap();
        std::fs::create_dir_all(&upload_dir).unwrap();
        let storage: Arc<dyn StorageService> = Arc::new(LocalStorageService::new(&upload_dir));

        let app = create_app(AppState {
            db: db.clone(),
            storage: storage.clone(),
            config,
        });

        Self {
            app,
            db,
            storage,
            upload_dir,
            _dir: dir,
        }
    }

    pub async fn send(&self, req: Request<Body>) -> Response {
        self.app.clone().oneshot(req).await.unwrap()
    }

    /// JSON request; returns the status and the parsed body (Null when empty).
    pub async fn json(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.send(req).await;
        let status = response.status();
        (status, body_json(response).await)
    }

    pub async fn login(&self, username: &str, password: &str) -> String {
        let (status, body) = self
            .json(
                "POST",
                "/api/login",
                None,
                Some(json!({ "username": username, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["token"].as_str().unwrap().to_string()
    }

    pub async fn admin_token(&self) -> String {
        self.login(ADMIN_USER, ADMIN_PASS).await
    }

    /// Creates a user and returns its id.
    pub async fn create_user(&self, admin_token: &str, username: &str, role: &str) -> String {
        let (status, body) = self
            .json(
                "POST",
                "/api/admin/users",
                Some(admin_token),
                Some(json!({ "username": username, "password": "password123", "role": role })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "create user failed: {body}");
        body["id"].as_str().unwrap().to_string()
    }

    /// Creates a user and logs in as them.
    pub async fn user_with_token(&self, admin_token: &str, username: &str) -> (String, String) {
        let id = self.create_user(admin_token, username, "user").await;
        let token = self.login(username, "password123").await;
        (id, token)
    }

    pub fn multipart_request(
        uri: &str,
        auth: (&str, &str),
        parts: &[(&str, Option<(&str, &str)>, &str)],
    ) -> Request<Body> {
        let mut body = String::new();
        for (name, file, content) in parts {
            body.push_str(&format!("--{BOUNDARY}\r\n"));
            match file {
                Some((filename, content_type)) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
                )),
            }
            body.push_str(content);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(auth.0, auth.1)
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    /// Uploads a file part and returns the new file id.
    pub async fn upload(&self, token: &str, filename: &str, content: &str) -> String {
        let bearer = format!("Bearer {token}");
        let req = Self::multipart_request(
            "/api/files",
            ("Authorization", &bearer),
            &[("file", Some((filename, "text/plain")), content)],
        );
        let response = self.send(req).await;
        let status = response.status();
        let body = body_json(response).await;
        assert_eq!(status, StatusCode::OK, "upload failed: {body}");
        body["id"].as_str().unwrap().to_string()
    }

    /// Creates a share and returns its token.
    pub async fn share(&self, token: &str, file_id: &str, options: Value) -> String {
        let (status, body) = self
            .json(
                "POST",
                &format!("/api/files/{file_id}/share"),
                Some(token),
                Some(options),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "share failed: {body}");
        body["share_token"].as_str().unwrap().to_string()
    }

    /// GET without JSON parsing; returns status and raw bytes.
    pub async fn get_raw(&self, uri: &str, token: Option<&str>) -> (StatusCode, Vec<u8>) {
        let response = self.send(get_request(uri, token)).await;
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }
}

pub fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    }
}
