use actix_web::{get, post, web, HttpResponse};
use serde_json::Value;
use std::sync::Arc;
use tracing::error;

use crate::error::ApiError;
use crate::state::AppState;
use crate::types::AskResponse;

/// Answer a chat query over HTTP
#[post("/api/askQHSEExpert")]
pub async fn ask_qhse_expert(
    body: web::Json<Value>,
    state: web::Data<Arc<AppState>>,
) -> Result<HttpResponse, ApiError> {
    let Some(query) = body.get("query").and_then(Value::as_str) else {
        return Err(ApiError::bad_request("Query must be a string"));
    };

    let answer = state.engine.answer(query).await.map_err(|e| {
        error!("Error processing query: {}", e);
        ApiError::internal("Failed to process query")
    })?;

    Ok(HttpResponse::Ok().json(AskResponse {
        response: answer.text,
    }))
}

#[get("/api/askQHSEExpert")]
pub async fn ask_qhse_expert_get() -> HttpResponse {
    HttpResponse::MethodNotAllowed()
        .content_type("text/plain; charset=utf-8")
        .body("GET method not allowed. Use POST method instead.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json_config;
    use crate::routes::configure;
    use crate::state::tests::test_state;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::json;

    #[actix_web::test]
    async fn test_ask_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(test_state(dir.path()).await);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .app_data(json_config())
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/askQHSEExpert")
            .set_json(json!({"query": "What is QHSE?"}))
            .to_request();
        let body: AskResponse = test::call_and_read_body_json(&app, req).await;
        assert!(body.response.starts_with("QHSE stands for"));

        let req = test::TestRequest::post()
            .uri("/api/askQHSEExpert")
            .set_json(json!({"query": "asdkjasbd"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_ask_rejects_non_string_query() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(test_state(dir.path()).await);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .app_data(json_config())
                .configure(configure),
        )
        .await;

        for payload in [json!({"query": 5}), json!({}), json!({"query": null})] {
            let req = test::TestRequest::post()
                .uri("/api/askQHSEExpert")
                .set_json(payload)
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["error"], "Query must be a string");
        }

        let req = test::TestRequest::post()
            .uri("/api/askQHSEExpert")
            .insert_header(("content-type", "application/json"))
            .set_payload("{not json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_get_not_allowed() {
        let app = test::init_service(App::new().configure(configure)).await;
        let req = test::TestRequest::get().uri("/api/askQHSEExpert").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);

        let body = test::read_body(resp).await;
        assert_eq!(body, "GET method not allowed. Use POST method instead.");
    }
}
