use crate::auth::jwt::verify_access_token;
use crate::config::Config;
use crate::error::WorkflowError;
use crate::model::role::Role;
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, web::Data};
use futures::future::{Ready, ready};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,

    /// Present only if this user is linked to an employee record
    pub employee_id: Option<u64>,
}

fn unauthorized(message: &str) -> WorkflowError {
    WorkflowError::Unauthorized(message.to_string())
}

impl FromRequest for AuthUser {
    type Error = WorkflowError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // set by auth_middleware on protected scopes
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return ready(Ok(user.clone()));
        }

        let token = match req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
        {
            Some(t) => t,
            None => return ready(Err(unauthorized("Missing token"))),
        };

        let config = match req.app_data::<Data<Config>>() {
            Some(c) => c,
            None => {
                tracing::error!("Config missing from app data");
                return ready(Err(unauthorized("Authentication unavailable")));
            }
        };

        let claims = match verify_access_token(token, &config.jwt_secret) {
            Ok(c) => c,
            Err(_) => return ready(Err(unauthorized("Invalid token"))),
        };

        let role = match Role::from_id(claims.role) {
            Some(r) => r,
            None => return ready(Err(unauthorized("Invalid role"))),
        };

        ready(Ok(AuthUser {
            user_id: claims.user_id,
            username: claims.sub,
            role,
            employee_id: claims.employee_id,
        }))
    }
}

impl AuthUser {
    pub fn require_supervisor(&self) -> Result<(), WorkflowError> {
        if self.is_supervisor() {
            Ok(())
        } else {
            Err(WorkflowError::Forbidden(
                "Supervisor or admin role required".to_string(),
            ))
        }
    }

    pub fn is_supervisor(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Supervisor)
    }
}
