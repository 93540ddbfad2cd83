use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the backend receives for one transfer attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferRequest {
    pub id: Uuid,
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub attempt: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferReceipt {
    /// Backend-assigned reference to the stored artifact.
    pub location: String,
}
