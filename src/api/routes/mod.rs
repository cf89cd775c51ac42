pub mod crews;
pub mod guardrails;
pub mod health;
pub mod knowledge;
pub mod tools;

use axum::http::{header, HeaderName, Method};
use axum::{middleware, routing::get, routing::post, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::middleware::{api_key_auth, request_logger};
use crate::api::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let cors = build_cors(&state.config.config.cors.allowed_origins);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .nest("/api/v1", api_v1_routes(state.clone()))
        .layer(middleware::from_fn(request_logger))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn build_cors(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-api-key"),
        ]);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        cors.allow_origin(origins)
    }
}

fn api_v1_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/knowledge/query", post(knowledge::query))
        .route("/knowledge/documents", post(knowledge::add_documents))
        .route("/knowledge/refresh", post(knowledge::refresh))
        .route("/knowledge/stats", get(knowledge::stats))
        .route("/tools", get(tools::list_tools))
        .route("/tools/{name}", post(tools::run_tool))
        .route("/guardrails/validate", post(guardrails::validate))
        .route("/crews", get(crews::list_crews))
        .route("/crews/{crew}/runs", post(crews::run_crew))
        .route("/crews/jobs/{job_id}", get(crews::get_job_status))
        .route_layer(middleware::from_fn_with_state(state, api_key_auth))
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::api::middleware::auth::API_KEY_HEADER;
    use crate::api::queue::create_pool;
    use crate::application::KnowledgeBase;
    use crate::domain::ports::LlmService;
    use crate::domain::DomainError;
    use crate::infrastructure::{
        AppConfig, CrewCatalog, FileDocumentLoader, FileReadTool, FileWriteTool, HashingEmbedding,
        InternalDocRagTool, LocalVectorStore, ToolRegistry,
    };

    struct CannedLlm;

    #[async_trait]
    impl LlmService for CannedLlm {
        async fn complete(&self, _prompt: &str) -> Result<String, DomainError> {
            Ok("Twenty days of annual leave.".to_string())
        }

        async fn complete_with_system(&self, _system: &str, _prompt: &str) -> Result<String, DomainError> {
            Ok("Twenty days of annual leave.".to_string())
        }
    }

    fn app(root: &Path, api_keys: &[&str]) -> Router {
        let mut config = AppConfig::default();
        config.config.rag.documents_dir = root.join("docs");
        config.config.rag.persist_dir = root.join("store");
        config.config.rag.chunk_size = 64;
        config.config.rag.chunk_overlap = 8;
        config.config.auth.api_keys = api_keys.iter().map(|k| k.to_string()).collect();

        let knowledge_base = Arc::new(
            KnowledgeBase::new(
                config.config.rag.settings(),
                Arc::new(FileDocumentLoader::new()),
                Arc::new(HashingEmbedding::new(128)),
                Arc::new(LocalVectorStore::new(root.join("store"))),
                Arc::new(CannedLlm),
            )
            .unwrap(),
        );
        let tools = ToolRegistry::new()
            .with(InternalDocRagTool::new(knowledge_base.clone()))
            .unwrap()
            .with(FileReadTool::new(root.join("workspace")))
            .unwrap()
            .with(FileWriteTool::new(root.join("workspace")))
            .unwrap();
        let crews = CrewCatalog::load_dir(Path::new("config/crews"), &tools.names()).unwrap();

        // The pool connects lazily; nothing here talks to Redis.
        let pool = create_pool("redis://127.0.0.1:1").unwrap();
        let state = AppState::new(
            pool,
            Arc::new(config),
            knowledge_base,
            Arc::new(tools),
            Arc::new(crews),
        );
        create_router(state)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_is_open() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path(), &["secret"])
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_api_key_required_when_configured() {
        let dir = tempfile::tempdir().unwrap();

        let missing = app(dir.path(), &["secret"])
            .oneshot(Request::get("/api/v1/crews").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let wrong = app(dir.path(), &["secret"])
            .oneshot(
                Request::get("/api/v1/crews")
                    .header(API_KEY_HEADER, "guess")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

        let ok = app(dir.path(), &["secret"])
            .oneshot(
                Request::get("/api/v1/crews")
                    .header(API_KEY_HEADER, "secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_lists_crews_with_required_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path(), &[])
            .oneshot(Request::get("/api/v1/crews").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let crews = body_json(response).await;
        let hr = crews
            .as_array()
            .unwrap()
            .iter()
            .find(|c| c["name"] == "hr")
            .unwrap();
        assert_eq!(hr["inputs"], json!(["question"]));
    }

    #[tokio::test]
    async fn test_run_unknown_crew_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path(), &[])
            .oneshot(post_json("/api/v1/crews/legal/runs", json!({ "inputs": {} })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_run_with_missing_inputs_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path(), &[])
            .oneshot(post_json("/api/v1/crews/hr/runs", json!({ "inputs": {} })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_guardrail_validation() {
        let dir = tempfile::tempdir().unwrap();

        let failing = app(dir.path(), &[])
            .oneshot(post_json(
                "/api/v1/guardrails/validate",
                json!({
                    "text": "too short",
                    "guardrails": [{ "kind": "word_count", "min": 5, "max": 10 }]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(failing.status(), StatusCode::OK);
        let body = body_json(failing).await;
        assert_eq!(body["passed"], false);
        assert_eq!(body["checked"], json!(["word_count"]));

        let passing = app(dir.path(), &[])
            .oneshot(post_json(
                "/api/v1/guardrails/validate",
                json!({ "text": "{\"ok\": true}", "guardrails": [{ "kind": "json_format" }] }),
            ))
            .await
            .unwrap();
        assert_eq!(body_json(passing).await["passed"], true);

        let impossible = app(dir.path(), &[])
            .oneshot(post_json(
                "/api/v1/guardrails/validate",
                json!({ "text": "x", "guardrails": [{ "kind": "word_count", "min": 10, "max": 5 }] }),
            ))
            .await
            .unwrap();
        assert_eq!(impossible.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path(), &[])
            .oneshot(post_json("/api/v1/tools/web_search", json!({ "request": "rust" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_query_answers_with_sources() {
        let dir = tempfile::tempdir().unwrap();
        let router = app(dir.path(), &[]);
        std::fs::write(
            dir.path().join("docs").join("leave.md"),
            "Employees receive twenty days of annual leave each year.",
        )
        .unwrap();

        let response = router
            .clone()
            .oneshot(post_json("/api/v1/knowledge/query", json!({ "query": "annual leave" })))
            .await
            .unwrap();
        let answer = body_json(response).await["answer"].as_str().unwrap().to_string();
        assert!(answer.starts_with("Answer: Twenty days of annual leave.\n\n"));
        assert!(answer.contains("1. leave.md (relevance: "));

        let stats = router
            .oneshot(Request::get("/api/v1/knowledge/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let stats = body_json(stats).await;
        assert_eq!(stats["initialized"], true);
        assert_eq!(stats["documents"], 1);
    }

    #[tokio::test]
    async fn test_documents_outside_documents_dir_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let router = app(dir.path(), &[]);
        let secret = dir.path().join("secrets.txt");
        std::fs::write(&secret, "The database password is hunter2.").unwrap();

        for path in [json!(secret), json!("../secrets.txt")] {
            let response = router
                .clone()
                .oneshot(post_json("/api/v1/knowledge/documents", json!({ "paths": [path] })))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
        }

        let stats = router
            .oneshot(Request::get("/api/v1/knowledge/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(stats).await["documents"], 0);
    }

    #[tokio::test]
    async fn test_documents_inside_documents_dir_are_added() {
        let dir = tempfile::tempdir().unwrap();
        let router = app(dir.path(), &[]);
        std::fs::write(dir.path().join("docs").join("travel.md"), "Book travel through the portal.").unwrap();

        let response = router
            .oneshot(post_json("/api/v1/knowledge/documents", json!({ "paths": ["travel.md"] })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await["status"],
            "Successfully added 1 documents to the index"
        );
    }

    #[tokio::test]
    async fn test_blank_query_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path(), &[])
            .oneshot(post_json("/api/v1/knowledge/query", json!({ "query": "  " })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
