//! Fleet data model
//!
//! Live activities are only ever seen as a read-only snapshot fetched from the
//! master once per invocation. Activities are never tracked on their own; they
//! are derived from the live activities that implement them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Runtime state reported by a controller for a live activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LiveActivityState {
    /// Deployed and ready to start.
    Ready,
    /// Started but not activated.
    Running,
    /// Started and activated.
    Active,
    /// Deployment in progress.
    Deploying,
    /// The last startup attempt failed.
    StartupFailure,
    /// The last activation attempt failed.
    ActivateFailure,
    /// Not present on its controller.
    DoesntExist,
    /// Anything the controller reports that we do not recognise.
    #[default]
    #[serde(other)]
    Unknown,
}

impl LiveActivityState {
    /// Whether the state belongs to the running family (running or active).
    pub fn is_running(self) -> bool {
        matches!(self, LiveActivityState::Running | LiveActivityState::Active)
    }
}

impl fmt::Display for LiveActivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LiveActivityState::Ready => "READY",
            LiveActivityState::Running => "RUNNING",
            LiveActivityState::Active => "ACTIVE",
            LiveActivityState::Deploying => "DEPLOYING",
            LiveActivityState::StartupFailure => "STARTUP_FAILURE",
            LiveActivityState::ActivateFailure => "ACTIVATE_FAILURE",
            LiveActivityState::DoesntExist => "DOESNT_EXIST",
            LiveActivityState::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

/// A deployed instance of an activity on a controller, as reported by the master.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveActivity {
    /// Master-assigned opaque identifier.
    pub id: String,
    /// Stable UUID.
    pub uuid: Uuid,
    /// Display name.
    pub name: String,
    /// Identifying name of the implemented activity.
    pub activity_name: String,
    /// Version of the implemented activity.
    #[serde(default)]
    pub activity_version: Option<String>,
    /// Controller hosting the instance.
    pub controller: String,
    /// Last runtime state reported.
    #[serde(default)]
    pub runtime_state: LiveActivityState,
    /// Whether the deployed activity is older than the master's copy.
    #[serde(default)]
    pub out_of_date: bool,
}

impl LiveActivity {
    /// Whether a user reference (id, UUID, or name) names this live activity.
    pub fn matches_reference(&self, reference: &str) -> bool {
        if self.id == reference || self.name == reference {
            return true;
        }
        Uuid::parse_str(reference)
            .map(|uuid| uuid == self.uuid)
            .unwrap_or(false)
    }
}

/// A project folder found by discovery.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProjectFolder {
    /// Folder containing the project descriptor.
    pub path: PathBuf,
    /// Identifying name of the activity the project builds.
    pub activity_name: String,
    /// Version declared by the descriptor, if any.
    pub version: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_live_activity() {
        let uuid = Uuid::new_v4();
        let value = json!({
            "id": "12",
            "uuid": uuid.to_string(),
            "name": "lobby-display",
            "activityName": "com.example.display",
            "activityVersion": "1.0.0",
            "controller": "c1",
            "runtimeState": "ACTIVE",
        });

        let live: LiveActivity = serde_json::from_value(value).unwrap();
        assert_eq!(live.uuid, uuid);
        assert_eq!(live.runtime_state, LiveActivityState::Active);
        assert!(!live.out_of_date);
    }

    #[test]
    fn test_unrecognised_state_is_unknown() {
        let state: LiveActivityState = serde_json::from_value(json!("CRASHED_HARD")).unwrap();
        assert_eq!(state, LiveActivityState::Unknown);
        assert!(!state.is_running());
    }

    #[test]
    fn test_missing_state_defaults_to_unknown() {
        let value = json!({
            "id": "3",
            "uuid": Uuid::new_v4().to_string(),
            "name": "wall",
            "activityName": "com.example.wall",
            "controller": "c1",
        });

        let live: LiveActivity = serde_json::from_value(value).unwrap();
        assert_eq!(live.runtime_state, LiveActivityState::Unknown);
        assert_eq!(LiveActivityState::default(), LiveActivityState::Unknown);
    }

    #[test]
    fn test_matches_reference_by_id_name_and_uuid() {
        let uuid = Uuid::new_v4();
        let live = LiveActivity {
            id: "7".into(),
            uuid,
            name: "kiosk".into(),
            activity_name: "com.example.kiosk".into(),
            activity_version: None,
            controller: "c2".into(),
            runtime_state: LiveActivityState::Ready,
            out_of_date: false,
        };

        assert!(live.matches_reference("7"));
        assert!(live.matches_reference("kiosk"));
        assert!(live.matches_reference(&uuid.to_string()));
        assert!(!live.matches_reference("8"));
        assert!(!live.matches_reference(&Uuid::new_v4().to_string()));
    }
}
