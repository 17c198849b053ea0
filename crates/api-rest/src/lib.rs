//! # API REST
//!
//! REST API for Casebook.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns: API-key and principal headers, JSON bodies, CORS, mapping
//!   core errors onto status codes
//!
//! All domain rules live in `casebook-core`; handlers only translate.

#![warn(rust_2018_idioms)]

pub mod auth;
pub mod dto;
pub mod error;
mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use casebook_core::Casebook;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use error::{ApiError, ApiResult};

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub casebook: Arc<Casebook>,
    /// Shared secret expected in `x-api-key`.
    pub api_key: Arc<str>,
}

impl AppState {
    pub fn new(casebook: Arc<Casebook>, api_key: impl Into<Arc<str>>) -> Self {
        Self {
            casebook,
            api_key: api_key.into(),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::create_case,
        handlers::list_cases,
        handlers::get_case,
        handlers::update_case,
        handlers::delete_case,
        handlers::transition_case,
        handlers::regenerate_report,
        handlers::list_documents,
        handlers::get_document,
        handlers::download_document,
        handlers::evaluate_access,
        handlers::list_notifications,
        handlers::mark_notification_read,
    ),
    components(schemas(
        dto::HealthRes,
        dto::ErrorRes,
        dto::ReportRes,
        dto::CaseRes,
        dto::ListCasesRes,
        dto::CreateCaseReq,
        dto::UpdateCaseReq,
        dto::TransitionReq,
        dto::TransitionRes,
        dto::DocumentVersionRes,
        dto::DocumentRes,
        dto::ListDocumentsRes,
        dto::EvaluateAccessReq,
        dto::AccessDecisionRes,
        dto::NotificationRes,
        dto::ListNotificationsRes,
    ))
)]
pub struct ApiDoc;

/// Builds the application router, Swagger UI included.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/cases",
            get(handlers::list_cases).post(handlers::create_case),
        )
        .route(
            "/cases/:id",
            get(handlers::get_case)
                .put(handlers::update_case)
                .delete(handlers::delete_case),
        )
        .route("/cases/:id/transitions", post(handlers::transition_case))
        .route("/cases/:id/report", post(handlers::regenerate_report))
        .route("/documents", get(handlers::list_documents))
        .route("/documents/:id", get(handlers::get_document))
        .route("/documents/:id/content", get(handlers::download_document))
        .route("/access/evaluate", post(handlers::evaluate_access))
        .route("/notifications", get(handlers::list_notifications))
        .route(
            "/notifications/:id/read",
            post(handlers::mark_notification_read),
        )
        .merge(
            SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{API_KEY_HEADER, PRINCIPAL_HEADER};
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use casebook_core::models::NewPrincipal;
    use casebook_core::CoreConfig;
    use casebook_policy::Role;
    use casebook_uuid::RecordId;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    const KEY: &str = "test-key";

    struct Harness {
        _temp: TempDir,
        app: Router,
        casebook: Arc<Casebook>,
    }

    impl Harness {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let config = Arc::new(
                CoreConfig::new(temp.path().join("data"), "http://localhost:3000".into(), None)
                    .unwrap(),
            );
            let casebook = Arc::new(Casebook::open(config).unwrap());
            let app = router(AppState::new(casebook.clone(), KEY));
            Self {
                _temp: temp,
                app,
                casebook,
            }
        }

        fn principal(&self, name: &str, role: Role) -> RecordId {
            self.casebook
                .principals
                .register(NewPrincipal {
                    name: name.into(),
                    email: format!("{}@example.org", name.to_lowercase()),
                    role,
                    department: Some("Cardiology".into()),
                    email_notifications: false,
                })
                .unwrap()
                .id
        }

        async fn call(
            &self,
            method: Method,
            uri: &str,
            caller: Option<RecordId>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut req = Request::builder()
                .method(method)
                .uri(uri)
                .header(API_KEY_HEADER, KEY)
                .header("content-type", "application/json");
            if let Some(id) = caller {
                req = req.header(PRINCIPAL_HEADER, id.to_string());
            }
            let body = body.map_or_else(Body::empty, |b| Body::from(b.to_string()));

            let res = self
                .app
                .clone()
                .oneshot(req.body(body).unwrap())
                .await
                .unwrap();
            let status = res.status();
            let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }
    }

    #[tokio::test]
    async fn health_needs_no_credentials() {
        let h = Harness::new();
        let res = h
            .app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_principal_header_is_unauthorised() {
        let h = Harness::new();
        let (status, body) = h.call(Method::GET, "/cases", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].as_str().unwrap().contains("x-principal-id"));
    }

    #[tokio::test]
    async fn case_lifecycle_over_http() {
        let h = Harness::new();
        let student = h.principal("Sam", Role::Student);
        let manager = h.principal("Morgan", Role::Manager);

        let (status, created) = h
            .call(
                Method::POST,
                "/cases",
                Some(student),
                Some(json!({"title": "Chest pain"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], "draft");
        let id = created["id"].as_str().unwrap().to_owned();

        let (status, _) = h
            .call(
                Method::POST,
                &format!("/cases/{id}/transitions"),
                Some(manager),
                Some(json!({"trigger": "start_review"})),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, submitted) = h
            .call(
                Method::POST,
                &format!("/cases/{id}/transitions"),
                Some(student),
                Some(json!({"trigger": "submit"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(submitted["case"]["status"], "submitted");
        assert_eq!(submitted["notifications"].as_array().unwrap().len(), 1);

        let (status, listed) = h
            .call(Method::GET, "/notifications?unread_only=true", Some(manager), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed["notifications"][0]["kind"], "case_submitted");
    }

    #[tokio::test]
    async fn unknown_trigger_is_a_bad_request() {
        let h = Harness::new();
        let student = h.principal("Sam", Role::Student);
        let (_, created) = h
            .call(
                Method::POST,
                "/cases",
                Some(student),
                Some(json!({"title": "Syncope"})),
            )
            .await;
        let id = created["id"].as_str().unwrap();

        let (status, _) = h
            .call(
                Method::POST,
                &format!("/cases/{id}/transitions"),
                Some(student),
                Some(json!({"trigger": "teleport"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn staff_cannot_create_cases() {
        let h = Harness::new();
        let staff = h.principal("Riley", Role::Staff);
        let (status, _) = h
            .call(
                Method::POST,
                "/cases",
                Some(staff),
                Some(json!({"title": "Fever"})),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
