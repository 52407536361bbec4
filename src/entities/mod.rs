pub mod prelude;

pub mod api_keys;
pub mod files;
pub mod shares;
pub mod users;
