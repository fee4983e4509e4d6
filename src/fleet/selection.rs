//! Selection resolver
//!
//! Computes, once per invocation, which live activities (and therefore which
//! activities) the requested commands act on. Inputs are the user's explicit
//! references, the `--all` switch, the discovered project folders, and the
//! fleet snapshot fetched from the master.
//!
//! Rules:
//!   * every live activity matching any explicit reference is selected
//!   * `--all` selects the whole snapshot
//!   * with no explicit live-activity or activity reference and no `--all`,
//!     live activities implementing a discovered project's activity are selected
//!   * selected activities are always derived from the selected live activities
//!   * commands that instantiate an activity target the explicit activity
//!     references, which need no live activity in the fleet
//!
//! References that match nothing are dropped here; validation reports them.

use super::model::{LiveActivity, ProjectFolder};
use std::collections::{BTreeMap, BTreeSet};

/// What the user asked to select.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionRequest {
    /// Live-activity references (id, UUID, or name).
    pub live_activities: Vec<String>,
    /// Activity identifying names.
    pub activities: Vec<String>,
    /// Restricts activity references to this version.
    pub version: Option<String>,
    /// Group names.
    pub groups: Vec<String>,
    /// Controller names.
    pub controllers: Vec<String>,
    /// Select the entire fleet.
    pub all: bool,
}

impl SelectionRequest {
    /// Whether any explicit live-activity or activity reference was given.
    pub fn has_explicit_references(&self) -> bool {
        !self.live_activities.is_empty() || !self.activities.is_empty()
    }

    fn activity_matches(&self, reference: &str, live: &LiveActivity) -> bool {
        live.activity_name == reference
            && self
                .version
                .as_deref()
                .is_none_or(|version| live.activity_version.as_deref() == Some(version))
    }
}

/// The resolved working set. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    live_activities: Vec<LiveActivity>,
    activities: BTreeSet<String>,
    requested_activities: BTreeSet<String>,
    known_activities: BTreeMap<String, BTreeSet<String>>,
    groups: Vec<String>,
    controllers: Vec<String>,
    unmatched_live_activities: Vec<String>,
    unmatched_activities: Vec<String>,
}

impl Selection {
    /// Resolve a request against a fleet snapshot and discovered projects.
    pub fn resolve(
        request: &SelectionRequest,
        snapshot: &[LiveActivity],
        folders: &[ProjectFolder],
    ) -> Self {
        let mut known_activities: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for live in snapshot {
            known_activities
                .entry(live.activity_name.clone())
                .or_default()
                .insert(live.id.clone());
        }

        let infer_from_folders = !request.all && !request.has_explicit_references();
        let folder_activities: BTreeSet<&str> = if infer_from_folders {
            folders.iter().map(|f| f.activity_name.as_str()).collect()
        } else {
            BTreeSet::new()
        };

        let live_activities: Vec<LiveActivity> = snapshot
            .iter()
            .filter(|live| {
                request.all
                    || request
                        .live_activities
                        .iter()
                        .any(|reference| live.matches_reference(reference))
                    || request
                        .activities
                        .iter()
                        .any(|reference| request.activity_matches(reference, live))
                    || folder_activities.contains(live.activity_name.as_str())
            })
            .cloned()
            .collect();

        let activities = live_activities
            .iter()
            .map(|live| live.activity_name.clone())
            .collect();

        let unmatched_live_activities = request
            .live_activities
            .iter()
            .filter(|reference| !snapshot.iter().any(|live| live.matches_reference(reference)))
            .cloned()
            .collect();
        let unmatched_activities = request
            .activities
            .iter()
            .filter(|reference| {
                !snapshot
                    .iter()
                    .any(|live| request.activity_matches(reference, live))
            })
            .cloned()
            .collect();

        Selection {
            live_activities,
            activities,
            requested_activities: request.activities.iter().cloned().collect(),
            known_activities,
            groups: dedup(&request.groups),
            controllers: dedup(&request.controllers),
            unmatched_live_activities,
            unmatched_activities,
        }
    }

    /// Selected live activities, in snapshot order.
    pub fn live_activities(&self) -> &[LiveActivity] {
        &self.live_activities
    }

    /// Ids of the selected live activities.
    pub fn live_activity_ids(&self) -> Vec<String> {
        self.live_activities.iter().map(|l| l.id.clone()).collect()
    }

    /// Activities implemented by the selected live activities.
    pub fn activities(&self) -> &BTreeSet<String> {
        &self.activities
    }

    /// Activities a new live activity may be created from: the explicit
    /// activity references when any were given, otherwise the derived set.
    pub fn target_activities(&self) -> &BTreeSet<String> {
        if self.requested_activities.is_empty() {
            &self.activities
        } else {
            &self.requested_activities
        }
    }

    /// Every activity in the snapshot, mapped to the ids implementing it.
    pub fn known_activities(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.known_activities
    }

    /// Distinct group names requested.
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// Distinct controller names requested.
    pub fn controllers(&self) -> &[String] {
        &self.controllers
    }

    /// Live-activity references that matched nothing in the snapshot.
    pub fn unmatched_live_activities(&self) -> &[String] {
        &self.unmatched_live_activities
    }

    /// Activity references that matched nothing in the snapshot.
    pub fn unmatched_activities(&self) -> &[String] {
        &self.unmatched_activities
    }
}

fn dedup(values: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    values
        .iter()
        .filter(|value| seen.insert(value.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::model::LiveActivityState;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn live(id: &str, name: &str, activity: &str) -> LiveActivity {
        LiveActivity {
            id: id.into(),
            uuid: Uuid::new_v4(),
            name: name.into(),
            activity_name: activity.into(),
            activity_version: Some("1.0.0".into()),
            controller: "c1".into(),
            runtime_state: LiveActivityState::Ready,
            out_of_date: false,
        }
    }

    fn folder(activity: &str) -> ProjectFolder {
        ProjectFolder {
            path: PathBuf::from(format!("/src/{activity}")),
            activity_name: activity.into(),
            version: None,
        }
    }

    fn fleet() -> Vec<LiveActivity> {
        vec![
            live("1", "lobby-a", "display"),
            live("2", "lobby-b", "display"),
            live("3", "kiosk", "kiosk"),
        ]
    }

    #[test]
    fn test_known_activities_map() {
        let selection = Selection::resolve(&SelectionRequest::default(), &fleet(), &[]);
        let display = &selection.known_activities()["display"];
        assert_eq!(display.len(), 2);
        assert!(display.contains("1") && display.contains("2"));
        assert!(selection.live_activities().is_empty());
    }

    #[test]
    fn test_folder_inference_without_references() {
        let selection =
            Selection::resolve(&SelectionRequest::default(), &fleet(), &[folder("kiosk")]);
        assert_eq!(selection.live_activity_ids(), vec!["3".to_string()]);
        assert!(selection.activities().contains("kiosk"));
    }

    #[test]
    fn test_explicit_reference_suppresses_inference() {
        let request = SelectionRequest {
            live_activities: vec!["lobby-a".into()],
            ..Default::default()
        };
        let selection = Selection::resolve(&request, &fleet(), &[folder("kiosk")]);
        assert_eq!(selection.live_activity_ids(), vec!["1".to_string()]);
        assert_eq!(
            selection.activities().iter().collect::<Vec<_>>(),
            vec!["display"]
        );
    }

    #[test]
    fn test_activity_reference_selects_implementers() {
        let request = SelectionRequest {
            activities: vec!["display".into()],
            ..Default::default()
        };
        let selection = Selection::resolve(&request, &fleet(), &[]);
        assert_eq!(selection.live_activity_ids(), vec!["1", "2"]);
    }

    #[test]
    fn test_version_restricts_activity_reference() {
        let mut snapshot = fleet();
        snapshot[1].activity_version = Some("2.0.0".into());
        let request = SelectionRequest {
            activities: vec!["display".into()],
            version: Some("2.0.0".into()),
            ..Default::default()
        };
        let selection = Selection::resolve(&request, &snapshot, &[]);
        assert_eq!(selection.live_activity_ids(), vec!["2"]);
    }

    #[test]
    fn test_all_selects_everything() {
        let request = SelectionRequest {
            all: true,
            live_activities: vec!["missing".into()],
            ..Default::default()
        };
        let selection = Selection::resolve(&request, &fleet(), &[folder("kiosk")]);
        assert_eq!(selection.live_activities().len(), 3);
        assert_eq!(selection.activities().len(), 2);
    }

    #[test]
    fn test_unmatched_references_are_dropped_and_recorded() {
        let request = SelectionRequest {
            live_activities: vec!["kiosk".into(), "ghost".into()],
            activities: vec!["nothing".into()],
            ..Default::default()
        };
        let selection = Selection::resolve(&request, &fleet(), &[]);
        assert_eq!(selection.live_activity_ids(), vec!["3"]);
        assert_eq!(selection.unmatched_live_activities(), ["ghost".to_string()]);
        assert_eq!(selection.unmatched_activities(), ["nothing".to_string()]);
    }

    #[test]
    fn test_groups_and_controllers_are_deduplicated() {
        let request = SelectionRequest {
            groups: vec!["g".into(), "g".into()],
            controllers: vec!["c1".into(), "c2".into(), "c1".into()],
            ..Default::default()
        };
        let selection = Selection::resolve(&request, &[], &[]);
        assert_eq!(selection.groups(), ["g".to_string()]);
        assert_eq!(selection.controllers(), ["c1".to_string(), "c2".to_string()]);
    }

    #[test]
    fn test_target_activities_prefer_explicit_references() {
        let request = SelectionRequest {
            activities: vec!["fresh".into()],
            ..Default::default()
        };
        let selection = Selection::resolve(&request, &fleet(), &[]);
        assert!(selection.activities().is_empty());
        assert_eq!(
            selection.target_activities().iter().collect::<Vec<_>>(),
            vec!["fresh"]
        );

        let request = SelectionRequest {
            live_activities: vec!["kiosk".into()],
            ..Default::default()
        };
        let selection = Selection::resolve(&request, &fleet(), &[]);
        assert_eq!(selection.target_activities(), selection.activities());
    }
}
