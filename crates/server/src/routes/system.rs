use actix_web::{get, web, HttpRequest, HttpResponse};
use std::sync::Arc;

use crate::state::AppState;
use crate::types::HealthResponse;
use crate::websocket;

/// Plain status text, or the chat WebSocket when the client asks to upgrade
#[get("/")]
pub async fn index(
    req: HttpRequest,
    body: web::Payload,
    state: web::Data<Arc<AppState>>,
) -> actix_web::Result<HttpResponse> {
    if !websocket::is_upgrade_request(&req) {
        return Ok(HttpResponse::Ok()
            .content_type("text/plain; charset=utf-8")
            .body("QHSE Expert API is running"));
    }

    let (response, session, stream) = actix_ws::handle(&req, body)?;
    actix_web::rt::spawn(websocket::run_session(
        state.get_ref().clone(),
        session,
        stream,
    ));
    Ok(response)
}

/// Service health
#[get("/health")]
pub async fn health(state: web::Data<Arc<AppState>>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        responses: state.engine.responses().len(),
        corpus_size: state.engine.corpus().len(),
        embedding_model: state.engine.embedder_name().to_string(),
        classifier_loaded: state.classifier().await.is_some(),
        feature_vocabulary_version: state.feature_vocabulary.version,
        pending_feedback: state.feedback.len().await,
    })
}
