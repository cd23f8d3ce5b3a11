use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::randomizer::{MyResultResponse, ParticipationResponse, PublicRandomizerView},
    error::AppError,
    services::participant_service,
    state::{SharedState, randomizer::UserId},
};

/// Header carrying the Telegram user id, set by the upstream `initData` verifier.
const TELEGRAM_USER_HEADER: &str = "x-telegram-user-id";

/// Mini App endpoints acting on behalf of the calling Telegram user.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/randomizers/{id}", get(get_randomizer))
        .route("/randomizers/{id}/participate", post(participate))
        .route("/randomizers/{id}/me", get(my_result))
}

fn telegram_user_id(headers: &HeaderMap) -> Result<UserId, AppError> {
    let raw = headers
        .get(TELEGRAM_USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            AppError::Unauthorized("missing user header `X-Telegram-User-Id`".into())
        })?;

    match raw.trim().parse::<UserId>() {
        Ok(user_id) if user_id > 0 => Ok(user_id),
        _ => Err(AppError::Unauthorized(format!(
            "invalid Telegram user id `{raw}`"
        ))),
    }
}

#[utoipa::path(
    get,
    path = "/randomizers/{id}",
    tag = "participant",
    params(("X-Telegram-User-Id" = i64, Header, description = "Verified Telegram user id"),
    ("id" = Uuid, Path, description = "Randomizer identifier")),
    responses(
        (status = 200, description = "Randomizer as seen by the caller", body = PublicRandomizerView),
        (status = 404, description = "Unknown randomizer")
    )
)]
/// Return the randomizer with the caller's participation and result.
pub async fn get_randomizer(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<PublicRandomizerView>, AppError> {
    let user_id = telegram_user_id(&headers)?;
    Ok(Json(
        participant_service::public_view(&state, id, user_id).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/randomizers/{id}/participate",
    tag = "participant",
    params(("X-Telegram-User-Id" = i64, Header, description = "Verified Telegram user id"),
    ("id" = Uuid, Path, description = "Randomizer identifier")),
    responses(
        (status = 201, description = "Participation recorded", body = ParticipationResponse),
        (status = 404, description = "Unknown randomizer"),
        (status = 409, description = "Already participating or randomizer not open")
    )
)]
/// Opt the caller in.
pub async fn participate(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<ParticipationResponse>), AppError> {
    let user_id = telegram_user_id(&headers)?;
    let response = participant_service::participate(&state, id, user_id).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    get,
    path = "/randomizers/{id}/me",
    tag = "participant",
    params(("X-Telegram-User-Id" = i64, Header, description = "Verified Telegram user id"),
    ("id" = Uuid, Path, description = "Randomizer identifier")),
    responses(
        (status = 200, description = "Caller's published bucket", body = MyResultResponse),
        (status = 404, description = "Not published or caller not assigned")
    )
)]
/// Return the caller's bucket once the distribution is published.
pub async fn my_result(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<MyResultResponse>, AppError> {
    let user_id = telegram_user_id(&headers)?;
    Ok(Json(participant_service::my_result(&state, id, user_id).await?))
}
