// Notification model and per-kind display treatment.

pub mod channel;
pub mod store;
pub mod toast;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::NotificationPayload;

/// Notification category: generic severities plus domain subtypes.
///
/// Behavior and appearance per kind come from [`NotificationKind::traits`],
/// one lookup table instead of branching scattered across view code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
    PickMade,
    YourTurn,
    DraftComplete,
    RaceResult,
}

/// Display treatment for one notification kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindTraits {
    pub icon: &'static str,
    pub color: &'static str,
    pub default_action: Option<&'static str>,
}

impl NotificationKind {
    pub fn traits(self) -> KindTraits {
        match self {
            NotificationKind::Info => KindTraits {
                icon: "info",
                color: "blue",
                default_action: None,
            },
            NotificationKind::Success => KindTraits {
                icon: "check",
                color: "green",
                default_action: None,
            },
            NotificationKind::Warning => KindTraits {
                icon: "alert",
                color: "amber",
                default_action: None,
            },
            NotificationKind::Error => KindTraits {
                icon: "cross",
                color: "red",
                default_action: None,
            },
            NotificationKind::PickMade => KindTraits {
                icon: "helmet",
                color: "blue",
                default_action: Some("View draft"),
            },
            NotificationKind::YourTurn => KindTraits {
                icon: "flag",
                color: "green",
                default_action: Some("Make your pick"),
            },
            NotificationKind::DraftComplete => KindTraits {
                icon: "chequered",
                color: "purple",
                default_action: Some("View results"),
            },
            NotificationKind::RaceResult => KindTraits {
                icon: "trophy",
                color: "gold",
                default_action: Some("View standings"),
            },
        }
    }
}

/// A notification held by the client.
///
/// Created server-side; mutated locally only through read/unread and deletion
/// actions that are mirrored back (see store::NotificationService).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
    pub action_url: Option<String>,
    pub action_label: Option<String>,
    pub league_id: Option<String>,
    pub race_id: Option<String>,
}

impl From<NotificationPayload> for Notification {
    fn from(payload: NotificationPayload) -> Self {
        Notification {
            id: payload.id,
            kind: payload.kind,
            title: payload.title,
            message: payload.message,
            timestamp: payload.timestamp,
            read: payload.read,
            action_url: payload.action_url,
            action_label: payload.action_label,
            league_id: payload.league_id,
            race_id: payload.race_id,
        }
    }
}
