//! Command model
//!
//! One [`Command`] per operation kind, each carrying its own parameters. A
//! [`CommandSet`] holds at most one command per kind; requesting a kind again
//! replaces the earlier one. Execution order is fixed by [`CommandKind::ORDER`]
//! and never depends on the order in which commands were requested.

use super::FleetConfig;
use super::error::{FleetError, Result};
use super::master::{CreateRequest, MasterClient, UploadRequest};
use super::model::{LiveActivity, LiveActivityState, ProjectFolder};
use super::selection::{Selection, SelectionRequest};
use super::settings::{SettingsSource, parse_settings};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command as Process;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// Operation kinds, declared in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommandKind {
    /// Build discovered projects.
    Build,
    /// Record the fleet's runtime states before a reactivate.
    CaptureFleetState,
    /// Shut live activities down.
    Shutdown,
    /// Delete live activities.
    DeleteLiveActivity,
    /// Delete activities (cascades through shutdown and delete-live-activity).
    DeleteActivity,
    /// Upload built artifacts.
    Upload,
    /// Create a live activity.
    Create,
    /// Redeploy out-of-date live activities.
    Upgrade,
    /// Deploy live activities.
    Deploy,
    /// Configure live activities.
    Configure,
    /// Remove live activities from a group.
    GroupRemove,
    /// Delete a group.
    GroupDelete,
    /// Create a group.
    GroupCreate,
    /// Add live activities to a group.
    GroupAdd,
    /// Activate live activities.
    Activate,
    /// Print the selection.
    List,
}

impl CommandKind {
    /// Global ordering table, earliest first.
    pub const ORDER: [CommandKind; 16] = [
        CommandKind::Build,
        CommandKind::CaptureFleetState,
        CommandKind::Shutdown,
        CommandKind::DeleteLiveActivity,
        CommandKind::DeleteActivity,
        CommandKind::Upload,
        CommandKind::Create,
        CommandKind::Upgrade,
        CommandKind::Deploy,
        CommandKind::Configure,
        CommandKind::GroupRemove,
        CommandKind::GroupDelete,
        CommandKind::GroupCreate,
        CommandKind::GroupAdd,
        CommandKind::Activate,
        CommandKind::List,
    ];

    /// Flag-style name.
    pub fn name(self) -> &'static str {
        match self {
            CommandKind::Build => "build",
            CommandKind::CaptureFleetState => "capture-fleet-state",
            CommandKind::Shutdown => "shutdown",
            CommandKind::DeleteLiveActivity => "delete-live-activity",
            CommandKind::DeleteActivity => "delete-activity",
            CommandKind::Upload => "upload",
            CommandKind::Create => "create",
            CommandKind::Upgrade => "upgrade",
            CommandKind::Deploy => "deploy",
            CommandKind::Configure => "configure",
            CommandKind::GroupRemove => "group-remove",
            CommandKind::GroupDelete => "group-delete",
            CommandKind::GroupCreate => "group-create",
            CommandKind::GroupAdd => "group-add",
            CommandKind::Activate => "activate",
            CommandKind::List => "list",
        }
    }

    /// Prerequisites this kind places on the invocation.
    pub fn requirements(self) -> Requirements {
        let fleet = Requirements {
            fleet: true,
            ..Requirements::NONE
        };
        let live = Requirements {
            live_activities: true,
            ..fleet
        };
        match self {
            CommandKind::Build => Requirements {
                files: true,
                ..Requirements::NONE
            },
            CommandKind::CaptureFleetState | CommandKind::List => fleet,
            CommandKind::Shutdown
            | CommandKind::DeleteLiveActivity
            | CommandKind::Upgrade
            | CommandKind::Deploy
            | CommandKind::Configure
            | CommandKind::Activate => live,
            CommandKind::DeleteActivity => Requirements {
                activities: true,
                ..fleet
            },
            CommandKind::Upload => Requirements {
                files: true,
                ..fleet
            },
            CommandKind::Create => Requirements {
                exactly_one_activity: true,
                exactly_one_controller: true,
                ..fleet
            },
            CommandKind::GroupRemove | CommandKind::GroupCreate | CommandKind::GroupAdd => {
                Requirements {
                    exactly_one_group: true,
                    ..live
                }
            }
            CommandKind::GroupDelete => Requirements {
                exactly_one_group: true,
                ..fleet
            },
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Prerequisite predicates declared by a command kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Requirements {
    /// Needs a connection to the master.
    pub fleet: bool,
    /// Needs at least one discovered project folder.
    pub files: bool,
    /// Needs exactly one selected activity.
    pub exactly_one_activity: bool,
    /// Needs at least one selected activity.
    pub activities: bool,
    /// Needs at least one selected live activity.
    pub live_activities: bool,
    /// Needs exactly one group.
    pub exactly_one_group: bool,
    /// Needs exactly one controller.
    pub exactly_one_controller: bool,
}

impl Requirements {
    const NONE: Requirements = Requirements {
        fleet: false,
        files: false,
        exactly_one_activity: false,
        activities: false,
        live_activities: false,
        exactly_one_group: false,
        exactly_one_controller: false,
    };
}

/// What a user can ask for on the command line. `Reactivate` is not a kind of
/// its own: it expands into shutdown, state capture, and activate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// `--build`
    Build,
    /// `--shutdown`
    Shutdown,
    /// `--delete-live-activity`
    DeleteLiveActivity,
    /// `--delete-activity`
    DeleteActivity,
    /// `--upload`
    Upload,
    /// `--create NAME`
    Create(String),
    /// `--upgrade`
    Upgrade,
    /// `--deploy`
    Deploy,
    /// `--config FILE`
    Configure(SettingsSource),
    /// `--group-remove`
    GroupRemove,
    /// `--group-delete`
    GroupDelete,
    /// `--group-create`
    GroupCreate,
    /// `--group-add`
    GroupAdd,
    /// `--activate`
    Activate,
    /// `--reactivate`
    Reactivate,
    /// `--list`
    List,
}

/// A unit of work with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the build program over every project folder.
    Build {
        /// Program invoked with the folder as its only argument.
        program: String,
    },
    /// Record runtime states so a later activate can restore them.
    CaptureFleetState {
        /// Pause between the status probe and the re-listing.
        settle_delay: Duration,
    },
    /// Shut down selected live activities.
    Shutdown,
    /// Delete selected live activities.
    DeleteLiveActivity,
    /// Delete the selected activities.
    DeleteActivity,
    /// Upload built artifacts for each project folder.
    Upload {
        /// Version override for artifact lookup.
        version: Option<String>,
    },
    /// Create a live activity.
    Create {
        /// Name of the new live activity.
        name: String,
        /// Activity version to pin, if requested.
        version: Option<String>,
    },
    /// Redeploy selected live activities reported out of date.
    Upgrade,
    /// Deploy selected live activities.
    Deploy,
    /// Push configuration to selected live activities.
    Configure {
        /// Where the configuration text is read from.
        source: SettingsSource,
        /// Parsed settings, filled in by `prep`.
        settings: BTreeMap<String, String>,
    },
    /// Remove selected live activities from the group.
    GroupRemove,
    /// Delete the group.
    GroupDelete,
    /// Create the group from the selected live activities.
    GroupCreate,
    /// Add selected live activities to the group.
    GroupAdd,
    /// Activate selected live activities.
    Activate,
    /// Print the selection.
    List,
}

impl Command {
    /// Kind of this command.
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Build { .. } => CommandKind::Build,
            Command::CaptureFleetState { .. } => CommandKind::CaptureFleetState,
            Command::Shutdown => CommandKind::Shutdown,
            Command::DeleteLiveActivity => CommandKind::DeleteLiveActivity,
            Command::DeleteActivity => CommandKind::DeleteActivity,
            Command::Upload { .. } => CommandKind::Upload,
            Command::Create { .. } => CommandKind::Create,
            Command::Upgrade => CommandKind::Upgrade,
            Command::Deploy => CommandKind::Deploy,
            Command::Configure { .. } => CommandKind::Configure,
            Command::GroupRemove => CommandKind::GroupRemove,
            Command::GroupDelete => CommandKind::GroupDelete,
            Command::GroupCreate => CommandKind::GroupCreate,
            Command::GroupAdd => CommandKind::GroupAdd,
            Command::Activate => CommandKind::Activate,
            Command::List => CommandKind::List,
        }
    }

    fn implicit(kind: CommandKind) -> Command {
        match kind {
            CommandKind::Build => Command::Build {
                program: String::new(),
            },
            CommandKind::CaptureFleetState => Command::CaptureFleetState {
                settle_delay: Duration::ZERO,
            },
            CommandKind::Shutdown => Command::Shutdown,
            CommandKind::DeleteLiveActivity => Command::DeleteLiveActivity,
            CommandKind::DeleteActivity => Command::DeleteActivity,
            CommandKind::Upload => Command::Upload { version: None },
            CommandKind::Create => Command::Create {
                name: String::new(),
                version: None,
            },
            CommandKind::Upgrade => Command::Upgrade,
            CommandKind::Deploy => Command::Deploy,
            CommandKind::Configure => Command::Configure {
                source: SettingsSource::Stdin,
                settings: BTreeMap::new(),
            },
            CommandKind::GroupRemove => Command::GroupRemove,
            CommandKind::GroupDelete => Command::GroupDelete,
            CommandKind::GroupCreate => Command::GroupCreate,
            CommandKind::GroupAdd => Command::GroupAdd,
            CommandKind::Activate => Command::Activate,
            CommandKind::List => Command::List,
        }
    }

    /// Bind run-wide configuration to the command.
    pub fn attach(&mut self, config: &FleetConfig, request: &SelectionRequest) {
        match self {
            Command::Build { program } => *program = config.build_program.clone(),
            Command::CaptureFleetState { settle_delay } => *settle_delay = config.settle_delay(),
            Command::Upload { version } | Command::Create { version, .. } => {
                *version = request.version.clone()
            }
            _ => {}
        }
    }

    /// Local preparation before anything executes.
    pub fn prep(&mut self) -> Result<()> {
        if let Command::Configure { source, settings } = self {
            *settings = parse_settings(&source.read_to_string()?)?;
        }
        Ok(())
    }

    /// Issue this command's work.
    pub fn execute(&self, ctx: &mut ExecContext<'_>) -> Result<()> {
        let kind = self.kind();
        info!(command = %kind, "executing");
        match self {
            Command::Build { program } => {
                for folder in ctx.folders {
                    run_build(program, &folder.path)?;
                }
            }
            Command::CaptureFleetState { settle_delay } => {
                let master = ctx.master(kind)?;
                master.status_all()?;
                thread::sleep(*settle_delay);
                let snapshot = master.list_live_activities()?;
                let captured = CapturedFleetState {
                    captured_at: Utc::now(),
                    states: snapshot
                        .into_iter()
                        .map(|live| (live.id, live.runtime_state))
                        .collect(),
                };
                info!(
                    live_activities = captured.states.len(),
                    running = captured.states.values().filter(|s| s.is_running()).count(),
                    captured_at = %captured.captured_at,
                    "captured fleet state"
                );
                ctx.captured = Some(captured);
            }
            Command::Shutdown => {
                let master = ctx.master(kind)?;
                for live in ctx.selection.live_activities() {
                    master.shutdown_live_activity(&live.id)?;
                }
            }
            Command::DeleteLiveActivity => {
                let master = ctx.master(kind)?;
                for live in ctx.selection.live_activities() {
                    master.delete_live_activity(&live.id)?;
                }
            }
            Command::DeleteActivity => {
                // Only the cascade runs; the master offers no definition removal.
                for activity in ctx.selection.activities() {
                    warn!(activity = %activity, "activity definition left on master");
                }
            }
            Command::Upload { version } => {
                let master = ctx.master(kind)?;
                for folder in ctx.folders {
                    let version = version.as_deref().or(folder.version.as_deref());
                    let artifact = find_artifact(folder, version)?;
                    let bytes = fs::read(&artifact)?;
                    master.upload_activity(&UploadRequest {
                        activity: &folder.activity_name,
                        version,
                        artifact: &artifact,
                        size: bytes.len() as u64,
                        digest: blake3::hash(&bytes).to_hex().to_string(),
                    })?;
                }
            }
            Command::Create { name, version } => {
                let master = ctx.master(kind)?;
                let (Some(activity), Some(controller)) = (
                    ctx.selection.target_activities().iter().next(),
                    ctx.selection.controllers().first(),
                ) else {
                    return Err(FleetError::Validation {
                        command: kind,
                        message: "no activity or controller to create on".into(),
                    });
                };
                let created = master.create_live_activity(&CreateRequest {
                    name: name.clone(),
                    activity: activity.clone(),
                    version: version.clone(),
                    controller: controller.clone(),
                })?;
                if let Some(created) = created {
                    info!(id = %created.id, uuid = %created.uuid, "created live activity");
                }
            }
            Command::Upgrade => {
                let master = ctx.master(kind)?;
                for live in ctx.selection.live_activities() {
                    if live.out_of_date {
                        master.deploy_live_activity(&live.id)?;
                    }
                }
            }
            Command::Deploy => {
                let master = ctx.master(kind)?;
                for live in ctx.selection.live_activities() {
                    master.deploy_live_activity(&live.id)?;
                }
            }
            Command::Configure { settings, .. } => {
                let master = ctx.master(kind)?;
                for live in ctx.selection.live_activities() {
                    master.configure_live_activity(&live.id, settings)?;
                }
            }
            Command::GroupRemove => {
                let master = ctx.master(kind)?;
                master.group_remove(ctx.group(kind)?, &ctx.selection.live_activity_ids())?;
            }
            Command::GroupDelete => {
                let master = ctx.master(kind)?;
                master.group_delete(ctx.group(kind)?)?;
            }
            Command::GroupCreate => {
                let master = ctx.master(kind)?;
                master.group_create(ctx.group(kind)?, &ctx.selection.live_activity_ids())?;
            }
            Command::GroupAdd => {
                let master = ctx.master(kind)?;
                master.group_add(ctx.group(kind)?, &ctx.selection.live_activity_ids())?;
            }
            Command::Activate => {
                let master = ctx.master(kind)?;
                for live in ctx.selection.live_activities() {
                    if let Some(captured) = &ctx.captured {
                        if !captured.was_running(&live.id) {
                            continue;
                        }
                    }
                    master.activate_live_activity(&live.id)?;
                }
            }
            Command::List => {
                let listed = if ctx.selection.live_activities().is_empty() {
                    ctx.snapshot
                } else {
                    ctx.selection.live_activities()
                };
                for live in listed {
                    println!(
                        "{}\t{}\t{}\t{}\t{}\t{}",
                        live.name,
                        live.uuid,
                        live.activity_name,
                        live.activity_version.as_deref().unwrap_or("-"),
                        live.controller,
                        live.runtime_state
                    );
                }
            }
        }
        Ok(())
    }
}

/// Runtime states recorded before a reactivate shut anything down.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFleetState {
    /// When the states were read.
    pub captured_at: DateTime<Utc>,
    /// Live activity id to runtime state.
    pub states: HashMap<String, LiveActivityState>,
}

impl CapturedFleetState {
    /// Whether the live activity was in the running family when captured.
    pub fn was_running(&self, id: &str) -> bool {
        self.states.get(id).is_some_and(|state| state.is_running())
    }
}

/// Everything a command's execute phase can see.
pub struct ExecContext<'a> {
    /// Connection to the master, when any command needed one.
    pub master: Option<&'a MasterClient>,
    /// The resolved selection.
    pub selection: &'a Selection,
    /// The full fleet snapshot.
    pub snapshot: &'a [LiveActivity],
    /// Discovered project folders.
    pub folders: &'a [ProjectFolder],
    /// States captured for reactivate.
    pub captured: Option<CapturedFleetState>,
}

impl<'a> ExecContext<'a> {
    fn master(&self, kind: CommandKind) -> Result<&'a MasterClient> {
        self.master.ok_or(FleetError::NotConnected(kind))
    }

    fn group(&self, kind: CommandKind) -> Result<&'a str> {
        self.selection
            .groups()
            .first()
            .map(String::as_str)
            .ok_or_else(|| FleetError::Validation {
                command: kind,
                message: "no group given".into(),
            })
    }
}

/// At most one command per kind, iterated in table order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandSet {
    commands: BTreeMap<CommandKind, Command>,
}

impl CommandSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request an operation, inserting whatever it implies.
    pub fn request(&mut self, operation: Operation) {
        match operation {
            Operation::Build => self.insert(Command::implicit(CommandKind::Build)),
            Operation::Shutdown => self.insert(Command::Shutdown),
            Operation::DeleteLiveActivity => self.insert(Command::DeleteLiveActivity),
            Operation::DeleteActivity => {
                self.insert(Command::DeleteActivity);
                self.imply(CommandKind::Shutdown);
                self.imply(CommandKind::DeleteLiveActivity);
            }
            Operation::Upload => self.insert(Command::implicit(CommandKind::Upload)),
            Operation::Create(name) => self.insert(Command::Create {
                name,
                version: None,
            }),
            Operation::Upgrade => self.insert(Command::Upgrade),
            Operation::Deploy => {
                self.insert(Command::Deploy);
                self.imply(CommandKind::Shutdown);
            }
            Operation::Configure(source) => self.insert(Command::Configure {
                source,
                settings: BTreeMap::new(),
            }),
            Operation::GroupRemove => self.insert(Command::GroupRemove),
            Operation::GroupDelete => self.insert(Command::GroupDelete),
            Operation::GroupCreate => self.insert(Command::GroupCreate),
            Operation::GroupAdd => self.insert(Command::GroupAdd),
            Operation::Activate => self.insert(Command::Activate),
            Operation::Reactivate => {
                self.imply(CommandKind::Shutdown);
                self.imply(CommandKind::CaptureFleetState);
                self.imply(CommandKind::Activate);
            }
            Operation::List => self.insert(Command::List),
        }
    }

    /// Store a command, replacing any earlier one of the same kind.
    pub fn insert(&mut self, command: Command) {
        self.commands.insert(command.kind(), command);
    }

    fn imply(&mut self, kind: CommandKind) {
        self.commands
            .entry(kind)
            .or_insert_with(|| Command::implicit(kind));
    }

    /// Whether nothing was requested.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Look up the command of a kind.
    pub fn get(&self, kind: CommandKind) -> Option<&Command> {
        self.commands.get(&kind)
    }

    /// Whether any command needs the master.
    pub fn needs_fleet(&self) -> bool {
        self.commands.keys().any(|kind| kind.requirements().fleet)
    }

    /// Kinds present, in execution order.
    pub fn execution_order(&self) -> Vec<CommandKind> {
        CommandKind::ORDER
            .into_iter()
            .filter(|kind| self.commands.contains_key(kind))
            .collect()
    }

    /// Commands in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        CommandKind::ORDER
            .into_iter()
            .filter_map(move |kind| self.commands.get(&kind))
    }

    /// Mutable commands in execution order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Command> {
        self.commands.values_mut()
    }
}

/// Check one command's prerequisites. The first unmet one is returned.
pub fn validate(
    kind: CommandKind,
    selection: &Selection,
    folders: &[ProjectFolder],
) -> Result<()> {
    let fail = |message: String| -> Result<()> {
        Err(FleetError::Validation {
            command: kind,
            message,
        })
    };
    let req = kind.requirements();

    if req.files && folders.is_empty() {
        return fail("no project folders found in the search paths".into());
    }

    let needs_activities = req.activities || req.exactly_one_activity;
    if (req.live_activities || needs_activities)
        && !selection.unmatched_live_activities().is_empty()
    {
        return fail(format!(
            "unknown live activities: {}",
            selection.unmatched_live_activities().join(", ")
        ));
    }
    // Instantiating an activity needs no existing live activity of it.
    if (req.live_activities || req.activities) && !selection.unmatched_activities().is_empty() {
        return fail(format!(
            "no live activities implement: {}",
            selection.unmatched_activities().join(", ")
        ));
    }

    if req.exactly_one_activity && selection.target_activities().len() != 1 {
        return fail(format!(
            "requires exactly one activity, {} selected",
            selection.target_activities().len()
        ));
    }
    if req.activities && selection.activities().is_empty() {
        return fail("requires at least one activity".into());
    }
    if req.live_activities && selection.live_activities().is_empty() {
        return fail("requires at least one live activity".into());
    }
    if req.exactly_one_group && selection.groups().len() != 1 {
        return fail(format!(
            "requires exactly one group, {} given",
            selection.groups().len()
        ));
    }
    if req.exactly_one_controller && selection.controllers().len() != 1 {
        return fail(format!(
            "requires exactly one controller, {} given",
            selection.controllers().len()
        ));
    }
    Ok(())
}

fn run_build(program: &str, folder: &Path) -> Result<()> {
    info!(program, folder = %folder.display(), "building");
    let status = Process::new(program)
        .arg(folder)
        .status()
        .map_err(|err| FleetError::Build {
            folder: folder.to_path_buf(),
            detail: format!("could not run {program}: {err}"),
        })?;
    if !status.success() {
        return Err(FleetError::Build {
            folder: folder.to_path_buf(),
            detail: format!("{program} exited with {status}"),
        });
    }
    Ok(())
}

/// Locate `build/<name>-<version>.zip`, or the first `build/<name>-*.zip`
/// when the version is unknown.
pub fn find_artifact(folder: &ProjectFolder, version: Option<&str>) -> Result<PathBuf> {
    let build_dir = folder.path.join("build");
    let missing = || FleetError::MissingArtifact {
        activity: folder.activity_name.clone(),
        folder: folder.path.clone(),
    };

    if let Some(version) = version {
        let exact = build_dir.join(format!("{}-{}.zip", folder.activity_name, version));
        return if exact.is_file() { Ok(exact) } else { Err(missing()) };
    }

    if !build_dir.is_dir() {
        return Err(missing());
    }
    let prefix = format!("{}-", folder.activity_name);
    let mut candidates: Vec<PathBuf> = fs::read_dir(&build_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension().is_some_and(|ext| ext == "zip")
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(&prefix))
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next().ok_or_else(missing)
}
