//! Usage records written by the gateway reporting flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who reported a usage event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageReporter {
    Gateway,
    Manual,
    Simulator,
}

/// One metered transfer against an access code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageLog {
    pub id: Uuid,
    pub provider_id: String,
    pub consumer_id: Option<String>,
    pub code: String,
    pub bytes: u64,
    pub reported_by: UsageReporter,
    pub created_at: DateTime<Utc>,
}

impl UsageLog {
    pub fn new(
        provider_id: String,
        consumer_id: Option<String>,
        code: String,
        bytes: u64,
        reported_by: UsageReporter,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider_id,
            consumer_id,
            code,
            bytes,
            reported_by,
            created_at: Utc::now(),
        }
    }
}
