//! Access rules for public share links.
//!
//! The decision depends only on the share row, the clock and the caller.
//! It runs before any view is consumed.

use crate::api::error::AppError;
use crate::entities::shares;
use crate::models::Identity;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    Expired,
    Exhausted,
    LoginRequired,
    RestrictedToUser,
    WrongUser,
}

impl Denial {
    pub fn message(&self) -> &'static str {
        match self {
            Denial::Expired => "share has expired",
            Denial::Exhausted => "share view limit reached",
            Denial::LoginRequired => "this share requires login",
            Denial::RestrictedToUser => "this share is restricted to a specific user",
            Denial::WrongUser => "you are not allowed to view this share",
        }
    }
}

impl From<Denial> for AppError {
    fn from(denial: Denial) -> Self {
        let message = denial.message().to_string();
        match denial {
            Denial::Expired | Denial::Exhausted => AppError::Gone(message),
            Denial::LoginRequired | Denial::RestrictedToUser => AppError::Unauthorized(message),
            Denial::WrongUser => AppError::Forbidden(message),
        }
    }
}

/// Checks run in a fixed order: expiry, quota, login, allowed user.
pub fn evaluate(
    share: &shares::Model,
    now: DateTime<Utc>,
    identity: Option<&Identity>,
) -> Result<(), Denial> {
    if share.is_expired(now) {
        return Err(Denial::Expired);
    }
    if share.is_exhausted() {
        return Err(Denial::Exhausted);
    }
    if share.require_login && identity.is_none() {
        return Err(Denial::LoginRequired);
    }
    if let Some(allowed) = &share.allowed_user_id {
        match identity {
            None => return Err(Denial::RestrictedToUser),
            Some(who) if &who.user_id != allowed => return Err(Denial::WrongUser),
            Some(_) => {}
        }
    }
    Ok(())
}
