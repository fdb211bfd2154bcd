pub mod auth;
pub mod mailer;

pub use auth::{create_token, generate_token, hash_password, verify_password, verify_token};
