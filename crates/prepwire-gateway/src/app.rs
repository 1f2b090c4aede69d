use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use prepwire_core::config::{PrepwireConfig, EMBED_DIM};
use prepwire_engine::InterviewEngine;
use prepwire_llm::LlmClient;
use prepwire_rag::{Embedder, Indexer, Retriever};
use prepwire_store::Store;

use crate::http;

/// Central shared state — passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub engine: InterviewEngine,
}

impl AppState {
    pub fn new(config: PrepwireConfig) -> anyhow::Result<Self> {
        let store = Arc::new(Store::open(&config.database.path)?);
        let llm = Arc::new(LlmClient::from_config(&config.llm));
        let embedder = Arc::new(Embedder::new(&config.embeddings, EMBED_DIM));
        let retriever = Arc::new(Retriever::new(
            Arc::clone(&store),
            Arc::clone(&embedder),
            config.rag.clone(),
        ));
        let indexer = Arc::new(Indexer::new(
            Arc::clone(&store),
            embedder,
            config.rag.example_quality_floor,
        ));
        let engine = InterviewEngine::new(store, llm, retriever, indexer, config);
        Ok(Self { engine })
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(http::status::health))
        .route("/ai/status", get(http::status::ai_status))
        .route(
            "/sessions",
            post(http::sessions::create).get(http::sessions::list),
        )
        .route("/sessions/{id}", delete(http::sessions::remove))
        .route("/sessions/{id}/start", post(http::sessions::start))
        .route(
            "/sessions/{id}/messages",
            post(http::sessions::send_message).get(http::sessions::list_messages),
        )
        .route("/sessions/{id}/finalize", post(http::sessions::finalize))
        .route("/sessions/{id}/feedback", post(http::sessions::feedback))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
