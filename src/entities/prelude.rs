pub use super::api_keys::Entity as ApiKeys;
pub use super::files::Entity as Files;
pub use super::shares::Entity as Shares;
pub use super::users::Entity as Users;
