//! QHSE Expert HTTP/WebSocket server
//!
//! Actix-web REST API for the chatbot and the observation classifier, plus
//! the chat WebSocket on the root path

pub mod chat;
pub mod error;
pub mod feedback;
pub mod routes;
pub mod state;
pub mod types;
pub mod upload;
pub mod websocket;

use actix_cors::Cors;
use actix_files::Files;
use actix_web::{web, App, HttpServer};
use qhse_common::{AppConfig, Result};
use std::sync::Arc;
use tracing::info;
use tracing_actix_web::TracingLogger;

pub use error::ApiError;
pub use state::{build_embedder, build_engine, load_or_build_vocabulary, AppState};

/// JSON extractor settings; malformed bodies become `400 {"error": ...}`
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| ApiError::bad_request(err.to_string()).into())
}

/// Initialize state and serve until shutdown
pub async fn start_server(config: AppConfig) -> Result<()> {
    let bind_address = config.server_bind_address();
    let state = Arc::new(AppState::initialize(config).await?);

    let static_dir = state.config.static_dir.clone().filter(|dir| dir.is_dir());
    if let Some(dir) = &static_dir {
        info!("Serving static frontend from {} at /ui", dir.display());
    }

    let data = web::Data::new(state);
    info!("Starting QHSE Expert server on http://{}", bind_address);

    HttpServer::new(move || {
        let mut app = App::new()
            .wrap(Cors::permissive())
            .wrap(TracingLogger::default())
            .app_data(data.clone())
            .app_data(json_config())
            .configure(routes::configure);

        if let Some(dir) = &static_dir {
            app = app.service(Files::new("/ui", dir).index_file("index.html"));
        }
        app
    })
    .bind(&bind_address)?
    .run()
    .await?;

    info!("Server stopped");
    Ok(())
}
