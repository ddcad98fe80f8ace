use crate::api::response;
use crate::auth::auth::AuthUser;
use crate::error::WorkflowError;
use crate::service::tasks::{GeofenceOutcome, GeofenceRequest, TaskService};
use actix_web::{HttpResponse, web};

/// Checks a position against a project geofence without changing any state.
/// Without `projectId` the project of today's active assignment is used.
#[utoipa::path(
    post,
    path = "/api/worker/geofence/validate",
    request_body = GeofenceRequest,
    responses(
        (status = 200, description = "Geofence decision", body = GeofenceOutcome),
        (status = 400, description = "Invalid coordinates"),
        (status = 404, description = "Project not found or no active assignment")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Geofence"
)]
pub async fn validate_geofence(
    auth: AuthUser,
    service: web::Data<TaskService>,
    body: web::Json<GeofenceRequest>,
) -> Result<HttpResponse, WorkflowError> {
    let outcome = service.validate_geofence(auth.employee_id, &body).await?;
    let message = if outcome.is_valid {
        "Location is within the project geofence"
    } else {
        "Location is outside the project geofence"
    };
    Ok(response::ok(message, outcome))
}

#[cfg(test)]
mod geofence_api_tests {
    use crate::api::testing::*;
    use crate::model::role::Role;
    use crate::service::testing::*;
    use actix_web::{http::StatusCode, test};
    use serde_json::{Value, json};

    #[actix_web::test]
    async fn far_point_is_reported_outside() {
        let h = Harness::new().await;
        let app = test::init_service(app(&h)).await;
        let far = north_of_site(500.0);

        let req = post("/api/worker/geofence/validate", Role::Worker, WORKER)
            .set_json(json!({
                "latitude": far.latitude,
                "longitude": far.longitude,
                "projectId": PROJECT
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["insideGeofence"], false);
        assert_eq!(body["data"]["canStartTasks"], false);
        assert_eq!(body["data"]["distance"], 500.0);
    }

    #[actix_web::test]
    async fn out_of_range_latitude_is_rejected() {
        let h = Harness::new().await;
        let app = test::init_service(app(&h)).await;

        let req = post("/api/worker/geofence/validate", Role::Worker, WORKER)
            .set_json(json!({ "latitude": 123.0, "longitude": 90.0, "projectId": PROJECT }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
