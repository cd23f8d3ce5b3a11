/// Admin operations: lifecycle, preview, edits and publication.
pub mod admin_service;
/// Randomizer distribution engine.
pub mod distribution;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Participant notification delivery.
pub mod notifier;
/// Mini App participation operations.
pub mod participant_service;
/// Notification and reward fan-out after a publication.
pub mod publication;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
