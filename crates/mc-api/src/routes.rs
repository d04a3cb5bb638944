//! Route table.

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/ops", get(handlers::list_ops))
        .route("/api/v1/ops/:name", post(handlers::invoke_op))
        .route(
            "/api/v1/entities/:entity_type",
            put(handlers::upsert_entity)
                .get(handlers::get_entity)
                .delete(handlers::delete_entity),
        )
        .route(
            "/api/v1/entities/:entity_type/aspects/:aspect",
            post(handlers::upsert_aspect)
                .get(handlers::get_aspect)
                .delete(handlers::delete_aspect),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use mc_core::config::AppConfig;
    use mc_graph::{MemoryGraph, SessionPool};
    use mc_registry::Registry;
    use mc_services::OperationCatalog;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;

    const REGISTRY: &str = r#"
entities:
  Dataset:
    identifying_params: [platform, name, env]
    urn_template: "urn:li:dataset:(urn:li:dataPlatform:{platform},{name},{env})"
    aspects:
      datasetProperties: versioned
aspects:
  datasetProperties:
    type: versioned
    properties: [description]
    required: [description]
"#;

    fn app() -> Router {
        let registry = Arc::new(Registry::from_yaml_str(REGISTRY).unwrap());
        let config = AppConfig::default();
        let store = Arc::new(MemoryGraph::new());
        let pool = Arc::new(SessionPool::new(store, &config.graph));
        let catalog = Arc::new(OperationCatalog::synthesize(registry, pool, &config));
        router(AppState::new(catalog))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_list_ops_exposes_table() {
        let response = app()
            .oneshot(Request::builder().uri("/api/v1/ops").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let names: Vec<&str> =
            body.as_array().unwrap().iter().map(|op| op["name"].as_str().unwrap()).collect();
        assert!(names.contains(&"upsert_Dataset"));
        assert!(names.contains(&"get_datasetProperties_aspect"));
    }

    #[tokio::test]
    async fn test_upsert_and_get_roundtrip() {
        let app = app();
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/ops/upsert_Dataset",
                json!({"params": {"platform": "mysql", "name": "db.t", "env": "PROD"}}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["result"], "write");
        let urn = body["urn"].as_str().unwrap().to_string();
        assert!(body["created_entity"].as_bool().unwrap());

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/entities/Dataset/aspects/datasetProperties",
                json!({"urn": urn, "payload": {"description": "x"}}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["version"], 1);

        let uri = format!(
            "/api/v1/entities/Dataset/aspects/datasetProperties?urn={}",
            urlencode(&urn)
        );
        let response = app
            .oneshot(Request::builder().uri(&uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["payload"]["description"], "x");
        assert_eq!(body["latest"], true);
    }

    #[tokio::test]
    async fn test_validation_error_is_422_with_kind() {
        let response = app()
            .oneshot(json_request(
                "POST",
                "/api/v1/ops/upsert_datasetProperties_aspect",
                json!({
                    "params": {"platform": "mysql", "name": "db.t", "env": "PROD"},
                    "payload": {"other": 1}
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["kind"], "validation_error");
        assert!(body["correlation_id"].is_string());
        assert_eq!(body["transient"], false);
    }

    #[tokio::test]
    async fn test_unknown_op_is_422() {
        let response = app()
            .oneshot(json_request("POST", "/api/v1/ops/upsert_Nothing", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_get_missing_entity_is_404() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/entities/Dataset?urn=urn%3Ali%3Adataset%3Amissing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["kind"], "not_found");
    }

    fn urlencode(value: &str) -> String {
        let mut out = String::new();
        for byte in value.bytes() {
            match byte {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                    out.push(byte as char)
                }
                other => out.push_str(&format!("%{other:02X}")),
            }
        }
        out
    }
}
