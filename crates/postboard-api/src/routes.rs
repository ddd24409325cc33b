use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;
use crate::{index, message_tags, messages, tags};

/// Every API route. Middleware (CORS, tracing) is layered on by the binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index::home))
        .route(
            "/messages",
            get(messages::get_messages)
                .post(messages::add_message)
                .put(messages::update_message),
        )
        .route("/tags", get(tags::get_tags).post(tags::add_tags))
        .route("/message_tags", post(message_tags::add_message_tags))
        .with_state(state)
}
