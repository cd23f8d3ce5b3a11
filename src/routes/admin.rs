use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::randomizer::{
        CreateRandomizerRequest, DistributionResponse, EditAssignmentRequest, ParticipantDto,
        PreviewResponse, PublishResponse, RandomizerSummary,
    },
    error::AppError,
    services::admin_service,
    state::{SharedState, randomizer::UserId},
};

const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Admin-only endpoints driving the randomizer lifecycle.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route(
            "/admin/randomizers",
            get(list_randomizers).post(create_randomizer),
        )
        .route("/admin/randomizers/{id}", get(get_randomizer))
        .route("/admin/randomizers/{id}/close", post(close_randomizer))
        .route("/admin/randomizers/{id}/reopen", post(reopen_randomizer))
        .route(
            "/admin/randomizers/{id}/participants",
            get(list_participants),
        )
        .route(
            "/admin/randomizers/{id}/preview",
            get(get_preview).post(generate_preview),
        )
        .route(
            "/admin/randomizers/{id}/preview/{user_id}",
            put(edit_assignment),
        )
        .route("/admin/randomizers/{id}/publish", post(publish))
        .route("/admin/randomizers/{id}/distribution", get(get_distribution))
        .route_layer(middleware::from_fn_with_state(state, require_admin_token))
}

/// List every randomizer, oldest first.
#[utoipa::path(
    get,
    path = "/admin/randomizers",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Static admin token")),
    responses((status = 200, description = "Randomizers", body = [RandomizerSummary]))
)]
pub async fn list_randomizers(
    State(state): State<SharedState>,
) -> Result<Json<Vec<RandomizerSummary>>, AppError> {
    Ok(Json(admin_service::list_randomizers(&state).await?))
}

/// Create an open randomizer.
#[utoipa::path(
    post,
    path = "/admin/randomizers",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Static admin token")),
    request_body = CreateRandomizerRequest,
    responses(
        (status = 201, description = "Randomizer created", body = RandomizerSummary),
        (status = 400, description = "Invalid payload")
    )
)]
pub async fn create_randomizer(
    State(state): State<SharedState>,
    Json(payload): Json<CreateRandomizerRequest>,
) -> Result<(StatusCode, Json<RandomizerSummary>), AppError> {
    payload.validate()?;
    let summary = admin_service::create_randomizer(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

#[utoipa::path(
    get,
    path = "/admin/randomizers/{id}",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Static admin token"),
    ("id" = Uuid, Path, description = "Randomizer identifier")),
    responses(
        (status = 200, description = "Randomizer", body = RandomizerSummary),
        (status = 404, description = "Unknown randomizer")
    )
)]
pub async fn get_randomizer(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RandomizerSummary>, AppError> {
    Ok(Json(admin_service::get_randomizer(&state, id).await?))
}

/// Stop accepting participants.
#[utoipa::path(
    post,
    path = "/admin/randomizers/{id}/close",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Static admin token"),
    ("id" = Uuid, Path, description = "Randomizer identifier")),
    responses(
        (status = 200, description = "Randomizer closed", body = RandomizerSummary),
        (status = 409, description = "Randomizer is not open")
    )
)]
pub async fn close_randomizer(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RandomizerSummary>, AppError> {
    Ok(Json(admin_service::close_randomizer(&state, id).await?))
}

/// Accept participants again.
#[utoipa::path(
    post,
    path = "/admin/randomizers/{id}/reopen",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Static admin token"),
    ("id" = Uuid, Path, description = "Randomizer identifier")),
    responses(
        (status = 200, description = "Randomizer reopened", body = RandomizerSummary),
        (status = 409, description = "Randomizer is not closed")
    )
)]
pub async fn reopen_randomizer(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RandomizerSummary>, AppError> {
    Ok(Json(admin_service::reopen_randomizer(&state, id).await?))
}

#[utoipa::path(
    get,
    path = "/admin/randomizers/{id}/participants",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Static admin token"),
    ("id" = Uuid, Path, description = "Randomizer identifier")),
    responses((status = 200, description = "Participants in opt-in order", body = [ParticipantDto]))
)]
pub async fn list_participants(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ParticipantDto>>, AppError> {
    Ok(Json(admin_service::list_participants(&state, id).await?))
}

/// Compute a new preview, replacing the previous one.
#[utoipa::path(
    post,
    path = "/admin/randomizers/{id}/preview",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Static admin token"),
    ("id" = Uuid, Path, description = "Randomizer identifier")),
    responses(
        (status = 200, description = "Preview generated", body = PreviewResponse),
        (status = 400, description = "Configuration cannot seat every participant"),
        (status = 409, description = "Randomizer is not open")
    )
)]
pub async fn generate_preview(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PreviewResponse>, AppError> {
    Ok(Json(admin_service::generate_preview(&state, id).await?))
}

#[utoipa::path(
    get,
    path = "/admin/randomizers/{id}/preview",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Static admin token"),
    ("id" = Uuid, Path, description = "Randomizer identifier")),
    responses(
        (status = 200, description = "Current preview", body = PreviewResponse),
        (status = 404, description = "No preview yet")
    )
)]
pub async fn get_preview(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PreviewResponse>, AppError> {
    Ok(Json(admin_service::get_preview(&state, id).await?))
}

/// Move one participant to another bucket.
#[utoipa::path(
    put,
    path = "/admin/randomizers/{id}/preview/{user_id}",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Static admin token"),
    ("id" = Uuid, Path, description = "Randomizer identifier"),
    ("user_id" = i64, Path, description = "Telegram user identifier")),
    request_body = EditAssignmentRequest,
    responses(
        (status = 200, description = "Preview updated", body = PreviewResponse),
        (status = 400, description = "Bucket out of range or of the wrong kind"),
        (status = 404, description = "No preview or no row for this user"),
        (status = 409, description = "Randomizer is not open")
    )
)]
pub async fn edit_assignment(
    State(state): State<SharedState>,
    Path((id, user_id)): Path<(Uuid, UserId)>,
    Json(payload): Json<EditAssignmentRequest>,
) -> Result<Json<PreviewResponse>, AppError> {
    Ok(Json(
        admin_service::edit_assignment(&state, id, user_id, payload.bucket).await?,
    ))
}

/// Publish the preview and notify participants.
#[utoipa::path(
    post,
    path = "/admin/randomizers/{id}/publish",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Static admin token"),
    ("id" = Uuid, Path, description = "Randomizer identifier")),
    responses(
        (status = 200, description = "Distribution published", body = PublishResponse),
        (status = 404, description = "Unknown randomizer or no preview"),
        (status = 409, description = "Randomizer is not open")
    )
)]
pub async fn publish(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PublishResponse>, AppError> {
    Ok(Json(admin_service::publish(&state, id).await?))
}

#[utoipa::path(
    get,
    path = "/admin/randomizers/{id}/distribution",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Static admin token"),
    ("id" = Uuid, Path, description = "Randomizer identifier")),
    responses(
        (status = 200, description = "Published distribution", body = DistributionResponse),
        (status = 404, description = "Not published yet")
    )
)]
pub async fn get_distribution(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DistributionResponse>, AppError> {
    Ok(Json(admin_service::get_distribution(&state, id).await?))
}

pub(crate) async fn require_admin_token(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let provided = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .ok_or_else(|| {
            AppError::Unauthorized("missing admin token header `X-Admin-Token`".into())
        })?;

    match state.admin_token() {
        Some(token) if token == provided => Ok(next.run(req).await),
        Some(_) => Err(AppError::Unauthorized("invalid admin token".into())),
        None => Err(AppError::Unauthorized("admin access is not configured".into())),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::{Method, header};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        config::AppConfig, dao::randomizer_store::memory::MemoryRandomizerStore,
        services::notifier::LogDispatcher, state::AppState,
    };

    async fn app(admin_token: Option<&str>) -> Router {
        let state = AppState::new(
            AppConfig::default(),
            Arc::new(LogDispatcher),
            admin_token.map(str::to_owned),
        );
        state
            .set_store(Arc::new(MemoryRandomizerStore::new()))
            .await;
        router(state.clone()).with_state(state)
    }

    fn create_request(token: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/admin/randomizers")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header("X-Admin-Token", token);
        }
        builder.body(Body::from(body.to_owned())).unwrap()
    }

    const TABLES_BODY: &str =
        r#"{"title":"Dinner","config":{"mode":"tables","tables_count":2,"participants_per_table":3}}"#;

    #[tokio::test]
    async fn rejects_missing_or_wrong_token() {
        let app = app(Some("secret")).await;

        let missing = app
            .clone()
            .oneshot(create_request(None, TABLES_BODY))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let wrong = app
            .oneshot(create_request(Some("nope"), TABLES_BODY))
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_routes_are_locked_without_configured_token() {
        let app = app(None).await;
        let response = app
            .oneshot(create_request(Some("anything"), TABLES_BODY))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn creates_randomizer_with_valid_token() {
        let app = app(Some("secret")).await;
        let response = app
            .oneshot(create_request(Some("secret"), TABLES_BODY))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn invalid_config_is_a_bad_request() {
        let app = app(Some("secret")).await;
        let body =
            r#"{"title":"Draw","config":{"mode":"simple","number_min":9,"number_max":1}}"#;
        let response = app
            .oneshot(create_request(Some("secret"), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn publish_of_unknown_randomizer_is_not_found() {
        let app = app(Some("secret")).await;
        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("/admin/randomizers/{}/publish", Uuid::new_v4()))
            .header("X-Admin-Token", "secret")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
