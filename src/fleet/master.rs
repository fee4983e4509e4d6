//! Typed client for the master's operations.
//!
//! Thin wrappers over [`Channel`]: each method builds the request payload,
//! issues it, and checks the reply. Replies carry
//! `{"status": "success" | "failure", "data": ..., "message": ...}`.

use super::channel::Channel;
use super::error::{FleetError, Result};
use super::model::LiveActivity;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// List every live activity known to the master.
pub const LIST_LIVE_ACTIVITIES: &str = "liveactivity.list";
/// Create a live activity.
pub const CREATE_LIVE_ACTIVITY: &str = "liveactivity.create";
/// Delete a live activity.
pub const DELETE_LIVE_ACTIVITY: &str = "liveactivity.delete";
/// Shut a live activity down.
pub const SHUTDOWN_LIVE_ACTIVITY: &str = "liveactivity.shutdown";
/// Deploy the current activity build to a live activity.
pub const DEPLOY_LIVE_ACTIVITY: &str = "liveactivity.deploy";
/// Replace a live activity's configuration.
pub const CONFIGURE_LIVE_ACTIVITY: &str = "liveactivity.configure";
/// Activate a live activity.
pub const ACTIVATE_LIVE_ACTIVITY: &str = "liveactivity.activate";
/// Add live activities to a group.
pub const GROUP_ADD: &str = "group.add";
/// Remove live activities from a group.
pub const GROUP_REMOVE: &str = "group.remove";
/// Create a group.
pub const GROUP_CREATE: &str = "group.create";
/// Delete a group.
pub const GROUP_DELETE: &str = "group.delete";
/// Ask every controller to report status.
pub const STATUS_ALL: &str = "space.status";
/// Register a built activity artifact with the master.
pub const UPLOAD_ACTIVITY: &str = "activity.upload";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ReplyStatus {
    Success,
    Failure,
}

#[derive(Debug, Deserialize)]
struct Reply {
    status: ReplyStatus,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    message: Option<String>,
}

/// Request to create a new live activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    /// Name for the new live activity.
    pub name: String,
    /// Identifying name of the activity to instantiate.
    pub activity: String,
    /// Activity version, when pinned.
    pub version: Option<String>,
    /// Controller to host the instance.
    pub controller: String,
}

/// Artifact registration sent by the upload command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest<'a> {
    /// Activity identifying name.
    pub activity: &'a str,
    /// Activity version, when known.
    pub version: Option<&'a str>,
    /// Artifact location on disk.
    pub artifact: &'a Path,
    /// Artifact size in bytes.
    pub size: u64,
    /// Hex BLAKE3 digest of the artifact.
    pub digest: String,
}

/// Typed access to the master over an open [`Channel`].
pub struct MasterClient {
    channel: Channel,
}

impl MasterClient {
    /// Wrap an open channel.
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }

    /// Fetch the full live-activity snapshot.
    pub fn list_live_activities(&self) -> Result<Vec<LiveActivity>> {
        let data = self.call(LIST_LIVE_ACTIVITIES, json!({}))?;
        serde_json::from_value(data).map_err(|err| {
            FleetError::MalformedResponse(format!("{LIST_LIVE_ACTIVITIES}: {err}"))
        })
    }

    /// Create a live activity, returning the record the master created.
    pub fn create_live_activity(&self, request: &CreateRequest) -> Result<Option<LiveActivity>> {
        let mut params = json!({
            "name": request.name,
            "activityName": request.activity,
            "controller": request.controller,
        });
        if let Some(version) = &request.version {
            params["activityVersion"] = Value::String(version.clone());
        }
        let data = self.call(CREATE_LIVE_ACTIVITY, params)?;
        if data.is_null() {
            return Ok(None);
        }
        serde_json::from_value(data)
            .map(Some)
            .map_err(|err| FleetError::MalformedResponse(format!("{CREATE_LIVE_ACTIVITY}: {err}")))
    }

    /// Delete a live activity.
    pub fn delete_live_activity(&self, id: &str) -> Result<()> {
        self.call(DELETE_LIVE_ACTIVITY, json!({ "id": id })).map(drop)
    }

    /// Shut a live activity down.
    pub fn shutdown_live_activity(&self, id: &str) -> Result<()> {
        self.call(SHUTDOWN_LIVE_ACTIVITY, json!({ "id": id })).map(drop)
    }

    /// Deploy a live activity.
    pub fn deploy_live_activity(&self, id: &str) -> Result<()> {
        self.call(DEPLOY_LIVE_ACTIVITY, json!({ "id": id })).map(drop)
    }

    /// Replace a live activity's configuration.
    pub fn configure_live_activity(
        &self,
        id: &str,
        settings: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.call(CONFIGURE_LIVE_ACTIVITY, json!({ "id": id, "config": settings }))
            .map(drop)
    }

    /// Activate a live activity.
    pub fn activate_live_activity(&self, id: &str) -> Result<()> {
        self.call(ACTIVATE_LIVE_ACTIVITY, json!({ "id": id })).map(drop)
    }

    /// Add live activities to a group.
    pub fn group_add(&self, group: &str, ids: &[String]) -> Result<()> {
        self.call(GROUP_ADD, json!({ "group": group, "liveActivityIds": ids }))
            .map(drop)
    }

    /// Remove live activities from a group.
    pub fn group_remove(&self, group: &str, ids: &[String]) -> Result<()> {
        self.call(GROUP_REMOVE, json!({ "group": group, "liveActivityIds": ids }))
            .map(drop)
    }

    /// Create a group holding the given live activities.
    pub fn group_create(&self, group: &str, ids: &[String]) -> Result<()> {
        self.call(GROUP_CREATE, json!({ "group": group, "liveActivityIds": ids }))
            .map(drop)
    }

    /// Delete a group.
    pub fn group_delete(&self, group: &str) -> Result<()> {
        self.call(GROUP_DELETE, json!({ "group": group })).map(drop)
    }

    /// Ask every controller to report status. No response is expected;
    /// updated states show up in later listings.
    pub fn status_all(&self) -> Result<()> {
        self.channel.send(STATUS_ALL, json!({}), false)?;
        Ok(())
    }

    /// Register a built artifact with the master.
    pub fn upload_activity(&self, request: &UploadRequest<'_>) -> Result<()> {
        let params = json!({
            "identifyingName": request.activity,
            "version": request.version,
            "artifact": request.artifact.display().to_string(),
            "size": request.size,
            "digest": request.digest,
        });
        self.call(UPLOAD_ACTIVITY, params).map(drop)
    }

    /// Close the connection.
    pub fn close(&self) {
        self.channel.close();
    }

    fn call(&self, operation: &str, params: Value) -> Result<Value> {
        let request_id = self.channel.send(operation, params, true)?;
        let result =
            self.channel
                .wait_for_response(&request_id)
                .ok_or_else(|| FleetError::ConnectionLost {
                    request: operation.to_string(),
                })?;

        let reply: Reply = serde_json::from_value(result)
            .map_err(|err| FleetError::MalformedResponse(format!("{operation}: {err}")))?;
        debug!(operation, request_id = %request_id, status = ?reply.status, "received reply");

        match reply.status {
            ReplyStatus::Success => Ok(reply.data),
            ReplyStatus::Failure => Err(FleetError::Master {
                operation: operation.to_string(),
                message: reply
                    .message
                    .unwrap_or_else(|| "unknown master error".to_string()),
            }),
        }
    }
}
