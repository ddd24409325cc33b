pub mod assets;
pub mod error;
pub mod extract;
pub mod index;
pub mod message_tags;
pub mod messages;
pub mod routes;
pub mod state;
pub mod tags;
pub mod transcribe;

pub use routes::router;
pub use state::{AppState, AppStateInner};

use tracing::error;

use crate::error::ApiError;

/// Runs blocking database work off the async runtime.
pub(crate) async fn run_blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::internal("Internal server error", e)
    })?
}

/// Integer ids from a split query value. Anything unparsable is dropped, so
/// `?id=abc` filters down to nothing.
pub(crate) fn parse_ids(raw: &[String]) -> Vec<i64> {
    raw.iter().filter_map(|s| s.parse().ok()).collect()
}
