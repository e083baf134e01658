// Canonical pick records for a draft session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::PickPayload;

/// A committed draft pick.
///
/// Pick numbers are dense and strictly increasing across the session, and a
/// driver appears in at most one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickRecord {
    /// 1-indexed round this pick belongs to.
    pub round: u32,
    /// 1-indexed sequential number across the whole session.
    pub pick_number: u32,
    pub team_id: String,
    pub driver_id: String,
    /// True when the pick was made by the timeout policy rather than a user.
    pub is_auto_pick: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&PickPayload> for PickRecord {
    fn from(payload: &PickPayload) -> Self {
        PickRecord {
            round: payload.round,
            pick_number: payload.pick_number,
            team_id: payload.team_id.clone(),
            driver_id: payload.driver_id.clone(),
            is_auto_pick: payload.is_auto_pick,
            created_at: payload.created_at,
        }
    }
}

impl From<&PickRecord> for PickPayload {
    fn from(record: &PickRecord) -> Self {
        PickPayload {
            round: record.round,
            pick_number: record.pick_number,
            team_id: record.team_id.clone(),
            driver_id: record.driver_id.clone(),
            is_auto_pick: record.is_auto_pick,
            created_at: record.created_at,
            driver_name: None,
        }
    }
}
