//! Health DTOs

use serde::{Deserialize, Serialize};

/// Reachability of one backing store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    pub fn up() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    pub fn down(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}

/// Body of `GET /health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub metadata_store: ComponentHealth,
    pub artifact_store: ComponentHealth,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.metadata_store.ok && self.artifact_store.ok
    }
}
