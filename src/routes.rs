use crate::{
    api::{attendance, geofence, tasks},
    auth::middleware::auth_middleware,
    config::Config,
    error::WorkflowError,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;
use tracing::warn;

// Helper to build a per-scope limiter
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = if requests_per_min == 0 {
        warn!("RATE_PROTECTED_PER_MIN is 0, falling back to 1 request per minute");
        1
    } else {
        requests_per_min
    };
    let per_ms = (60_000 / requests_per_min as u64).max(1);

    // keyed on the peer IP; both values are non-zero so finish() yields Some
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min)
        .finish()
        .unwrap_or_default();
    Governor::new(&cfg)
}

fn extractor_error(err: impl std::fmt::Display) -> actix_web::Error {
    WorkflowError::Validation(err.to_string()).into()
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // malformed bodies, queries and paths answer with the failure envelope
    cfg.app_data(web::JsonConfig::default().error_handler(|e, _| extractor_error(e)))
        .app_data(web::QueryConfig::default().error_handler(|e, _| extractor_error(e)))
        .app_data(web::PathConfig::default().error_handler(|e, _| extractor_error(e)));

    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(
                web::scope("/attendance")
                    .service(web::resource("/clock-in").route(web::post().to(attendance::clock_in)))
                    .service(
                        web::resource("/clock-out").route(web::post().to(attendance::clock_out)),
                    )
                    .service(
                        web::resource("/lunch-start")
                            .route(web::post().to(attendance::lunch_start)),
                    )
                    .service(
                        web::resource("/lunch-end").route(web::post().to(attendance::lunch_end)),
                    )
                    .service(
                        web::resource("/overtime-start")
                            .route(web::post().to(attendance::overtime_start)),
                    )
                    .service(web::resource("/status").route(web::get().to(attendance::status)))
                    .service(web::resource("/today").route(web::get().to(attendance::today)))
                    .service(web::resource("/history").route(web::get().to(attendance::history)))
                    // /attendance/{id}/override
                    .service(
                        web::resource("/{id}/override")
                            .route(web::post().to(attendance::override_entry)),
                    ),
            )
            .service(
                web::scope("/worker")
                    // registered before /tasks/{id}
                    .service(web::resource("/tasks/today").route(web::get().to(tasks::tasks_today)))
                    .service(web::resource("/tasks/{id}").route(web::get().to(tasks::task_details)))
                    .service(
                        web::resource("/tasks/{id}/start").route(web::post().to(tasks::start_task)),
                    )
                    .service(
                        web::resource("/tasks/{id}/progress")
                            .route(web::post().to(tasks::update_progress))
                            .route(web::get().to(tasks::progress_history)),
                    )
                    .service(
                        web::resource("/tasks/{id}/complete")
                            .route(web::post().to(tasks::complete_task)),
                    )
                    .service(web::resource("/task/issue").route(web::post().to(tasks::report_issue)))
                    .service(
                        web::resource("/geofence/validate")
                            .route(web::post().to(geofence::validate_geofence)),
                    ),
            ),
    );
}

// API REQUEST
//  └─ Authorization: Bearer access_token (refresh tokens are rejected)
