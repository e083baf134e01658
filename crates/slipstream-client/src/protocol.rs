// Wire types exchanged with the backend of record.
//
// REST responses, pick submission outcomes, and the frames delivered over the
// realtime notification channel. Domain types live next to their logic
// (draft::pick, notify); these payloads are the serde boundary and convert
// into them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::draft::constraints::{Price, RuleViolation};
use crate::notify::NotificationKind;

// ---------------------------------------------------------------------------
// Draft payloads
// ---------------------------------------------------------------------------

/// Turn state as reported by the draft state query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnStatePayload {
    pub current_round: u32,
    pub current_position: u32,
    pub total_picks_made: u32,
    pub is_complete: bool,
    /// The team on the clock. Absent before the draft starts and after it
    /// completes.
    #[serde(default)]
    pub current_team_id: Option<String>,
    #[serde(default)]
    pub timer_deadline: Option<DateTime<Utc>>,
}

/// A single pick in the session history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickPayload {
    pub round: u32,
    pub pick_number: u32,
    pub team_id: String,
    pub driver_id: String,
    pub is_auto_pick: bool,
    pub created_at: DateTime<Utc>,
    /// Display name, when the backend includes one.
    #[serde(default)]
    pub driver_name: Option<String>,
}

/// Full draft snapshot: turn state plus the pick history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftSnapshotPayload {
    pub turn: TurnStatePayload,
    pub picks: Vec<PickPayload>,
}

/// A driver in the race pool, annotated for pricing and auto-pick ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverPayload {
    pub driver_id: String,
    pub name: String,
    /// The real-world team this driver races for.
    pub constructor_id: String,
    /// Price in tenths of a currency unit.
    pub price: Price,
    /// Season average points, in tenths.
    pub avg_points_tenths: u32,
}

/// Outcome of a pick submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PickOutcomePayload {
    /// The pick was committed; the returned snapshot is authoritative.
    Accepted { snapshot: DraftSnapshotPayload },
    /// The submitting team is not on the clock.
    NotYourTurn { current_team_id: String },
    /// The draft already completed; no further picks are accepted.
    DraftComplete,
    /// The pick violated one or more roster rules.
    Rejected { violations: Vec<RuleViolation> },
}

// ---------------------------------------------------------------------------
// Notification payloads
// ---------------------------------------------------------------------------

/// A notification as delivered by the backend, either from the REST listing
/// or pushed over the realtime channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub action_url: Option<String>,
    #[serde(default)]
    pub action_label: Option<String>,
    #[serde(default)]
    pub league_id: Option<String>,
    #[serde(default)]
    pub race_id: Option<String>,
}

/// A frame received on the realtime channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ChannelFrame {
    /// A freshly created notification.
    Notification(NotificationPayload),
    /// Server keepalive; carries nothing.
    Heartbeat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_state_uses_camel_case_keys() {
        let json = r#"{
            "currentRound": 2,
            "currentPosition": 3,
            "totalPicksMade": 6,
            "isComplete": false,
            "currentTeamId": "team_c",
            "timerDeadline": "2026-03-01T14:00:00Z"
        }"#;
        let payload: TurnStatePayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.current_round, 2);
        assert_eq!(payload.current_position, 3);
        assert_eq!(payload.current_team_id.as_deref(), Some("team_c"));
        assert!(payload.timer_deadline.is_some());
    }

    #[test]
    fn turn_state_optional_fields_default() {
        let json = r#"{
            "currentRound": 1,
            "currentPosition": 1,
            "totalPicksMade": 0,
            "isComplete": false
        }"#;
        let payload: TurnStatePayload = serde_json::from_str(json).unwrap();
        assert!(payload.current_team_id.is_none());
        assert!(payload.timer_deadline.is_none());
    }

    #[test]
    fn pick_outcome_rejected_round_trips() {
        let outcome = PickOutcomePayload::Rejected {
            violations: vec![RuleViolation::DriverUnavailable {
                driver_id: "ver".into(),
            }],
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains(r#""status":"rejected""#));
        assert!(json.contains("driver-unavailable"));
        let back: PickOutcomePayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, outcome);
    }

    #[test]
    fn pick_outcome_not_your_turn_field_casing() {
        let json = r#"{"status":"notYourTurn","currentTeamId":"team_b"}"#;
        let outcome: PickOutcomePayload = serde_json::from_str(json).unwrap();
        assert_eq!(
            outcome,
            PickOutcomePayload::NotYourTurn {
                current_team_id: "team_b".into()
            }
        );
    }

    #[test]
    fn channel_frame_notification_parses() {
        let json = r#"{
            "type": "notification",
            "payload": {
                "id": "n1",
                "kind": "your_turn",
                "title": "You're on the clock",
                "message": "Make your pick",
                "timestamp": "2026-03-01T14:00:00Z"
            }
        }"#;
        let frame: ChannelFrame = serde_json::from_str(json).unwrap();
        match frame {
            ChannelFrame::Notification(n) => {
                assert_eq!(n.id, "n1");
                assert_eq!(n.kind, NotificationKind::YourTurn);
                assert!(!n.read);
            }
            other => panic!("expected notification frame, got {other:?}"),
        }
    }

    #[test]
    fn channel_frame_heartbeat_parses() {
        let frame: ChannelFrame = serde_json::from_str(r#"{"type":"heartbeat"}"#).unwrap();
        assert_eq!(frame, ChannelFrame::Heartbeat);
    }
}
