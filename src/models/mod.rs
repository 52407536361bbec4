//! Domain value types shared by services, handlers and middleware.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// User role. Stored as its lowercase string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    pub fn is_admin(&self) -> bool {
        *self == Role::Admin
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

/// Lifecycle of an uploaded file.
///
/// `Purged` is never persisted: a hard delete removes the row and the blob,
/// and the value only reports that outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Active,
    SoftDeleted,
    Purged,
}

impl FileState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileState::Active => "active",
            FileState::SoftDeleted => "soft_deleted",
            FileState::Purged => "purged",
        }
    }
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FileState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(FileState::Active),
            "soft_deleted" => Ok(FileState::SoftDeleted),
            "purged" => Ok(FileState::Purged),
            _ => Err(format!("unknown file state: {s}")),
        }
    }
}

/// Capability an API key may be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiScope {
    FilesUpload,
}

impl ApiScope {
    pub const WILDCARD: &'static str = "*";

    pub fn as_str(&self) -> &'static str {
        match self {
            ApiScope::FilesUpload => "files:upload",
        }
    }

    /// Scope names accepted when creating a key, wildcard included.
    pub fn is_grantable(name: &str) -> bool {
        let name = name.trim();
        name == Self::WILDCARD || name.parse::<ApiScope>().is_ok()
    }
}

impl fmt::Display for ApiScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ApiScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "files:upload" => Ok(ApiScope::FilesUpload),
            _ => Err(format!("unsupported scope: {s}")),
        }
    }
}

/// Resolved caller, regardless of which credential produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}
