use tracing::{debug, warn};

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report whether the storage backend is installed and answering.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let store = match state.require_store().await {
        Ok(store) => store,
        Err(_) => {
            debug!("health check while degraded");
            return HealthResponse::degraded("no healthy storage backend");
        }
    };

    match store.health_check().await {
        Ok(()) => HealthResponse::ok(),
        Err(err) => {
            warn!(error = %err, "storage health check failed");
            HealthResponse::degraded("storage health check failed")
        }
    }
}
