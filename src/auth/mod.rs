mod claims;
pub mod services;

pub use services::AuthUser;
