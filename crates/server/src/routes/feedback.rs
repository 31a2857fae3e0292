use actix_web::{get, post, web, HttpResponse};
use std::sync::Arc;

use crate::error::ApiError;
use crate::state::AppState;
use crate::types::{FeedbackApplyResponse, FeedbackListResponse};

/// Feedback collected from chat sessions and not yet applied
#[get("/api/feedback")]
pub async fn list_feedback(state: web::Data<Arc<AppState>>) -> HttpResponse {
    let records = state.feedback.pending().await;
    HttpResponse::Ok().json(FeedbackListResponse {
        pending: records.len(),
        records,
    })
}

/// Drain pending feedback into the feedback log
#[post("/api/feedback/apply")]
pub async fn apply_feedback(state: web::Data<Arc<AppState>>) -> Result<HttpResponse, ApiError> {
    let applied = state.feedback.apply().await?;
    Ok(HttpResponse::Ok().json(FeedbackApplyResponse { applied }))
}
