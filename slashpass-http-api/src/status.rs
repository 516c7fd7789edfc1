use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::api::ApiError;

#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema, PartialEq)]
pub struct HealthStatus {
    pub status: ServiceStatus,
    pub msg: Option<String>,
}

impl From<ApiError> for HealthStatus {
    fn from(error: ApiError) -> Self {
        HealthStatus {
            status: ServiceStatus::Error,
            msg: Some(error.to_string()),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema, PartialEq)]
pub enum ServiceStatus {
    Running,
    #[default]
    Unknown,
    Error,
}

/// Usage counters over the storage bucket.
#[derive(Deserialize, Serialize, Clone, Copy, Default, Debug, JsonSchema, PartialEq, Eq)]
pub struct Stats {
    pub total_secrets: usize,
    pub total_channels: usize,
}

/// Everything the insertion page needs to encrypt and submit a secret in the browser.
#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema, PartialEq, Eq)]
pub struct InsertionTarget {
    /// Full storage path, `<channel>/<app>`.
    pub path: String,
    /// Path with the channel stripped, as shown to the user.
    pub secret: String,
    /// Chat frontend to return to.
    pub home: String,
    pub public_key: String,
}
