pub mod auth;
pub mod hash;
pub mod http;
pub mod password;
