pub mod auth;
pub mod batch;
pub mod client;
pub mod credential;
pub mod error;

#[cfg(test)]
mod testing;

pub use auth::{AuthSettings, TokenManager};
pub use client::DriveClient;
pub use credential::{Credential, CredentialStore, OAuthClient};
pub use error::{AuthError, BatchError, PartError};
