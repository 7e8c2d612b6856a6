//! # HTTP Security
//!
//! Checks inbound channel requests against the security definition attached
//! to their URL. Rejections carry a 403 status and a client message that does
//! not reveal which credential was wrong; the precise cause goes to the log.

pub mod error;
pub mod handler;

pub use error::AuthError;
pub use handler::{
    hash_password, RequestMetadata, SecurityDefinition, SecurityHandler, TechAccount, UrlSecurity,
    PASSWORD_HEADER, USER_HEADER,
};
