use crate::models::Role;
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// Bearer tokens stay valid for three days.
pub const TOKEN_TTL_HOURS: i64 = 72;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // user_id
    pub role: Role,
    pub iat: usize,
    pub exp: usize,
    pub jti: String,
}

pub fn create_jwt(user_id: &str, role: Role, secret: &str) -> Result<String> {
    let now = Utc::now();
    let expiration = now
        .checked_add_signed(Duration::hours(TOKEN_TTL_HOURS))
        .context("token expiry overflow")?
        .timestamp();

    let claims = Claims {
        sub: user_id.to_owned(),
        role,
        iat: now.timestamp() as usize,
        exp: expiration as usize,
        jti: uuid::Uuid::new_v4().to_string(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?;

    Ok(token)
}

pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}
