use crate::models::{Claims, TokenType};
use jsonwebtoken::{DecodingKey, Validation, decode};

/// Decodes and validates a bearer token. Only access tokens are accepted on
/// API routes.
pub fn verify_access_token(token: &str, secret: &str) -> Result<Claims, String> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| e.to_string())?;

    if claims.token_type != TokenType::Access {
        return Err("Refresh tokens cannot be used for API calls".to_string());
    }
    Ok(claims)
}

#[cfg(test)]
pub mod issue {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use uuid::Uuid;

    pub const SECRET: &str = "test-secret";

    pub fn token(role: u8, employee_id: Option<u64>, token_type: TokenType, ttl: i64) -> String {
        let claims = Claims {
            user_id: employee_id.unwrap_or(0) + 1000,
            sub: format!("user{}", employee_id.unwrap_or(0)),
            role,
            exp: (chrono::Utc::now().timestamp() + ttl) as usize,
            jti: Uuid::new_v4().to_string(),
            token_type,
            employee_id,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .expect("encode test token")
    }

    pub fn access(role: u8, employee_id: u64) -> String {
        token(role, Some(employee_id), TokenType::Access, 900)
    }
}
