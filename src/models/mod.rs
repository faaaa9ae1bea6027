//! # Data Models
//!
//! SeaORM entities and the response bodies shared by several handlers.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod connection;
pub mod user;

pub use connection::Entity as Connection;
pub use user::Entity as User;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "rolodink-api".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
