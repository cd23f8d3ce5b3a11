use std::convert::Infallible;

use axum::{
    Router,
    extract::State,
    middleware,
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;

use crate::{
    routes::admin::require_admin_token,
    services::sse_service::{self, StreamKind},
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sse/public",
    tag = "sse",
    responses((status = 200, description = "Public SSE stream", content_type = "text/event-stream", body = String))
)]
/// Stream randomizer lifecycle events to Mini App clients.
pub async fn public_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (receiver, handshake) = sse_service::subscribe(&state, StreamKind::Public);
    info!("New public SSE connection");
    sse_service::to_sse_stream(receiver, handshake, StreamKind::Public)
}

#[utoipa::path(
    get,
    path = "/sse/admin",
    tag = "sse",
    params(("X-Admin-Token" = String, Header, description = "Static admin token")),
    responses((status = 200, description = "Admin SSE stream", content_type = "text/event-stream", body = String))
)]
/// Stream admin-only events (participants joining, preview changes).
pub async fn admin_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (receiver, handshake) = sse_service::subscribe(&state, StreamKind::Admin);
    info!("New admin SSE connection");
    sse_service::to_sse_stream(receiver, handshake, StreamKind::Admin)
}

/// Configure the SSE endpoints; the admin stream requires the admin token.
pub fn router(state: SharedState) -> Router<SharedState> {
    let admin = Router::<SharedState>::new()
        .route("/sse/admin", get(admin_stream))
        .route_layer(middleware::from_fn_with_state(state, require_admin_token));

    Router::<SharedState>::new()
        .route("/sse/public", get(public_stream))
        .merge(admin)
}
