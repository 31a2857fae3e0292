use actix_multipart::Multipart;
use actix_web::{post, web, HttpResponse};
use qhse_analytics::{
    build_training_set, check_model_compatibility, read_observations, SpreadsheetFormat,
};
use qhse_common::QhseError;
use qhse_model::{DenseNetwork, ModelTopology, TrainingOptions};
use std::sync::Arc;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;
use crate::types::{SaveModelResponse, TrainResponse};
use crate::upload::MultipartForm;

const MAX_EPOCHS: usize = 1000;

/// Store a classifier trained elsewhere
///
/// Expects a `model` part with the topology JSON and a `weights` part with
/// the little-endian `f32` weight blob.
#[post("/save-model")]
pub async fn save_model(
    payload: Multipart,
    state: web::Data<Arc<AppState>>,
) -> Result<HttpResponse, ApiError> {
    let mut form = MultipartForm::read(payload, state.config.max_upload_bytes).await?;
    let model = form.require("model")?;
    let weights = form.require("weights")?;

    let topology: ModelTopology = serde_json::from_slice(&model.data)
        .map_err(|e| ApiError::bad_request(format!("Invalid model topology: {}", e)))?;
    check_model_compatibility(&topology, &state.feature_vocabulary)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let network = DenseNetwork::from_parts(topology, &weights.data)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let input_dim = network.topology().input_dim;
    let parameters = network
        .topology()
        .parameter_count()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    state
        .install_classifier(network)
        .await
        .map_err(|e| match e {
            QhseError::Classifier(_) => ApiError::bad_request(e.to_string()),
            other => other.into(),
        })?;

    info!("Model uploaded: {} inputs, {} parameters", input_dim, parameters);
    Ok(HttpResponse::Ok().json(SaveModelResponse {
        message: "Model saved successfully".to_string(),
        input_dim,
        parameters,
    }))
}

/// Train a fresh classifier from a labelled observation sheet
#[post("/train-and-save-model")]
pub async fn train_and_save_model(
    payload: Multipart,
    state: web::Data<Arc<AppState>>,
) -> Result<HttpResponse, ApiError> {
    let mut form = MultipartForm::read(payload, state.config.max_upload_bytes).await?;
    let epochs = match form.get("epochs").and_then(|part| part.text()) {
        None | Some("") => state.config.training_epochs,
        Some(raw) => match raw.parse::<usize>() {
            Ok(epochs) if (1..=MAX_EPOCHS).contains(&epochs) => epochs,
            _ => {
                return Err(ApiError::bad_request(format!(
                    "Epochs must be an integer between 1 and {}",
                    MAX_EPOCHS
                )))
            }
        },
    };
    let file = form.require("file")?;
    let format = SpreadsheetFormat::from_filename(file.filename.as_deref().unwrap_or_default())?;

    let rows = read_observations(&file.data, format)?;
    let training_set = build_training_set(&state.feature_vocabulary, &rows)?;
    let topology = ModelTopology::observation_classifier(
        state.feature_vocabulary.feature_width(),
        state.feature_vocabulary.version,
    );
    let options = TrainingOptions {
        epochs,
        ..TrainingOptions::default()
    };

    info!("Training classifier on {} rows for {} epochs", training_set.len(), epochs);
    let (network, report) = web::block(move || {
        let mut network = DenseNetwork::new_random(topology, options.seed)?;
        let report = network.train(&training_set.features, &training_set.labels, &options)?;
        Ok::<_, QhseError>((network, report))
    })
    .await
    .map_err(|e| ApiError::internal(format!("Training task failed: {}", e)))??;

    state.install_classifier(network).await?;

    Ok(HttpResponse::Ok().json(TrainResponse {
        message: "Model trained and saved successfully".to_string(),
        samples: report.samples,
        epochs: report.epochs,
        loss: report.final_loss(),
        accuracy: report.final_accuracy(),
        loss_history: report.loss,
        accuracy_history: report.accuracy,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::configure;
    use crate::routes::test_support::multipart_request;
    use crate::state::tests::test_state;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::Value;

    const LABELLED: &[u8] = b"Date,Location,Safety Observation / Condition / Activity,Category,Unsafe Act / Unsafe Condition
2024-03-05,Site,Worker without helmet,PPE,Unsafe Act
2024-03-06,Yard,Oil spill near tank,GENERAL,Unsafe Condition
2024-03-07,Workshop,Running with tools,GENERAL,Unsafe Act
2024-03-08,Office,Frayed extension lead,ELECTRICAL,Unsafe Condition
";

    #[actix_web::test]
    async fn test_train_and_save_model() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(test_state(dir.path()).await);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(configure),
        )
        .await;

        let req = multipart_request(
            "/train-and-save-model",
            &[("file", Some("labelled.csv"), LABELLED), ("epochs", None, &b"3"[..])],
        )
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["samples"], 4);
        assert_eq!(body["epochs"], 3);
        assert_eq!(body["loss_history"].as_array().unwrap().len(), 3);

        assert!(state.classifier().await.is_some());
        assert!(state.config.model_topology_path().exists());
        assert!(state.config.model_weights_path().exists());
    }

    #[actix_web::test]
    async fn test_train_rejects_bad_epochs() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(test_state(dir.path()).await);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure),
        )
        .await;

        let req = multipart_request(
            "/train-and-save-model",
            &[("file", Some("labelled.csv"), LABELLED), ("epochs", None, &b"many"[..])],
        )
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_save_model_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(test_state(dir.path()).await);
        let vocab = &state.feature_vocabulary;
        let topology = ModelTopology::observation_classifier(vocab.feature_width(), vocab.version);
        let network = DenseNetwork::new_random(topology.clone(), 11).unwrap();
        let topology_json = serde_json::to_vec(&topology).unwrap();
        let weights = network.to_weight_bytes();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(configure),
        )
        .await;

        let req = multipart_request(
            "/save-model",
            &[
                ("model", Some("model.json"), &topology_json[..]),
                ("weights", Some("weights.bin"), &weights[..]),
            ],
        )
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(state.classifier().await.is_some());

        // Truncated weights are rejected and leave the installed model alone
        let req = multipart_request(
            "/save-model",
            &[
                ("model", Some("model.json"), &topology_json[..]),
                ("weights", Some("weights.bin"), &weights[..16]),
            ],
        )
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_save_model_rejects_oversized_topology() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(test_state(dir.path()).await);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(configure),
        )
        .await;

        let topology = br#"{"format":"qhse-dense","format_version":1,"input_dim":4611686018427387904,"layers":[{"units":1,"activation":"sigmoid"}]}"#;
        let req = multipart_request(
            "/save-model",
            &[
                ("model", Some("model.json"), &topology[..]),
                ("weights", Some("weights.bin"), &[0u8; 4][..]),
            ],
        )
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(state.classifier().await.is_none());
    }

    #[actix_web::test]
    async fn test_save_model_wrong_width() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(test_state(dir.path()).await);
        let topology = ModelTopology::observation_classifier(8, state.feature_vocabulary.version);
        let network = DenseNetwork::new_random(topology.clone(), 1).unwrap();
        let topology_json = serde_json::to_vec(&topology).unwrap();
        let weights = network.to_weight_bytes();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(configure),
        )
        .await;

        let req = multipart_request(
            "/save-model",
            &[
                ("model", None, &topology_json[..]),
                ("weights", None, &weights[..]),
            ],
        )
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(state.classifier().await.is_none());
    }
}
