pub mod api_key_service;
pub mod auth_gate;
pub mod file_service;
pub mod share_policy;
pub mod share_service;
pub mod storage;
pub mod user_service;
pub mod worker;
