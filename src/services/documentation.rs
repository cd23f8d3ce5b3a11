use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the cohort randomizer backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::public_stream,
        crate::routes::sse::admin_stream,
        crate::routes::admin::list_randomizers,
        crate::routes::admin::create_randomizer,
        crate::routes::admin::get_randomizer,
        crate::routes::admin::close_randomizer,
        crate::routes::admin::reopen_randomizer,
        crate::routes::admin::list_participants,
        crate::routes::admin::generate_preview,
        crate::routes::admin::get_preview,
        crate::routes::admin::edit_assignment,
        crate::routes::admin::publish,
        crate::routes::admin::get_distribution,
        crate::routes::public::get_randomizer,
        crate::routes::public::participate,
        crate::routes::public::my_result,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::randomizer::CreateRandomizerRequest,
            crate::dto::randomizer::EditAssignmentRequest,
            crate::dto::randomizer::RandomizerSummary,
            crate::dto::randomizer::BucketOccupancy,
            crate::dto::randomizer::PreviewResponse,
            crate::dto::randomizer::DistributionResponse,
            crate::dto::randomizer::PublishResponse,
            crate::dto::randomizer::ParticipantDto,
            crate::dto::randomizer::ParticipationResponse,
            crate::dto::randomizer::MyResultResponse,
            crate::dto::randomizer::PublicRandomizerView,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::RandomizerStatusEvent,
            crate::dto::sse::ParticipantJoinedEvent,
            crate::dto::sse::PreviewUpdatedEvent,
            crate::dto::sse::DistributionPublishedEvent,
            crate::state::randomizer::RandomizerConfig,
            crate::state::randomizer::RandomizerStatus,
            crate::state::randomizer::Bucket,
            crate::state::randomizer::Assignment,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "admin", description = "Randomizer administration"),
        (name = "participant", description = "Mini App participation endpoints"),
    )
)]
pub struct ApiDoc;
