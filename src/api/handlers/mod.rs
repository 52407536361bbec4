pub mod admin_users;
pub mod api_keys;
pub mod auth;
pub mod files;
pub mod health;
pub mod shares;
