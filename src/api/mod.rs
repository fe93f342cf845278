// REST API module for the admissions workflow engine
// Exposes workflow lookups, status queries and transitions over HTTP

pub mod handlers;
pub mod types;


use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::engine::WorkflowEngine;
use handlers::{
    check_automatic, create_application, execute_transition, get_active_workflow, get_evaluation,
    get_requirements, get_status, get_transitions, health_check, not_found, submit_application,
    ApiState,
};

/// API server configuration
#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub port: u16,
    pub host: String,
    pub cors_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 4000,
            host: "0.0.0.0".to_string(),
            cors_enabled: true,
        }
    }
}

/// Build the router over a shared engine
pub fn router(engine: Arc<WorkflowEngine>) -> Router {
    Router::new()
        // Workflow configuration
        .route("/api/workflows/:application_type", get(get_active_workflow))
        // Applications
        .route("/api/applications", post(create_application))
        .route(
            "/api/applications/:id/status",
            get(get_status).post(execute_transition),
        )
        .route("/api/applications/:id/transitions", get(get_transitions))
        .route("/api/applications/:id/evaluation", get(get_evaluation))
        .route("/api/applications/:id/requirements", get(get_requirements))
        .route("/api/applications/:id/automatic", post(check_automatic))
        .route("/api/applications/:id/submit", post(submit_application))
        // Health check
        .route("/health", get(health_check))
        // Fallback for unknown routes
        .fallback(not_found)
        .with_state(ApiState::new(engine))
}

/// HTTP server wrapping the engine
pub struct ApiServer {
    config: ApiConfig,
    engine: Arc<WorkflowEngine>,
}

impl ApiServer {
    pub fn new(config: ApiConfig, engine: Arc<WorkflowEngine>) -> Self {
        Self { config, engine }
    }

    /// Create the Axum router with all routes and optional CORS
    pub fn create_router(&self) -> Router {
        let api_router = router(self.engine.clone());

        if self.config.cors_enabled {
            api_router.layer(CorsLayer::permissive())
        } else {
            api_router
        }
    }

    /// Run the server until it fails
    pub async fn run(self) -> anyhow::Result<()> {
        let app = self.create_router();
        let addr = format!("{}:{}", self.config.host, self.config.port);

        info!("🎓 Admissions workflow API starting");
        info!("📡 Server address: http://{}", addr);
        info!("🔗 API endpoints:");
        info!("   GET  http://{}/api/workflows/:application_type", addr);
        info!("   POST http://{}/api/applications", addr);
        info!("   GET  http://{}/api/applications/:id/status", addr);
        info!("   POST http://{}/api/applications/:id/status", addr);
        info!("   GET  http://{}/api/applications/:id/transitions", addr);
        info!("   POST http://{}/api/applications/:id/automatic", addr);
        info!("   POST http://{}/api/applications/:id/submit", addr);
        info!("   GET  http://{}/health", addr);
        info!("📋 CORS enabled: {}", self.config.cors_enabled);

        axum::Server::bind(&addr.parse()?)
            .serve(app.into_make_service())
            .await?;

        Ok(())
    }
}
