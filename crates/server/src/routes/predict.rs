use actix_multipart::Multipart;
use actix_web::{post, web, HttpResponse};
use qhse_analytics::{predict_observations, read_observations, SpreadsheetFormat};
use qhse_common::QhseError;
use std::sync::Arc;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;
use crate::upload::MultipartForm;

/// Classify every row of an uploaded observation sheet
#[post("/api/predict")]
pub async fn predict(
    payload: Multipart,
    state: web::Data<Arc<AppState>>,
) -> Result<HttpResponse, ApiError> {
    let mut form = MultipartForm::read(payload, state.config.max_upload_bytes).await?;
    let file = form.require("file")?;
    let filename = file.filename.unwrap_or_default();
    let format = SpreadsheetFormat::from_filename(&filename)?;

    let classifier = state
        .classifier()
        .await
        .ok_or_else(|| QhseError::model_not_loaded("Upload or train a model first"))?;

    info!("Predicting observations from {}", filename);
    let rows = read_observations(&file.data, format)?;
    let report = predict_observations(classifier.as_ref(), &state.feature_vocabulary, &rows)?;

    Ok(HttpResponse::Ok().json(report))
}
