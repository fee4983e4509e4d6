//! fleetctl CLI - issue operations against live activities through the master
//!
//! Selection flags pick the targets, command flags pick the work, and any
//! trailing arguments are searched for project folders.

use clap::{CommandFactory, Parser};
use fleetctl::fleet::command::{CommandSet, Operation};
use fleetctl::fleet::selection::SelectionRequest;
use fleetctl::fleet::settings::SettingsSource;
use fleetctl::fleet::{FleetConfig, FleetError, Runner};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "fleetctl")]
#[command(about = "Orchestrate activities across a controller fleet", long_about = None)]
#[command(disable_version_flag = true, args_override_self = true)]
struct Cli {
    /// Master host
    #[arg(long)]
    host: Option<String>,

    /// Master port
    #[arg(long)]
    port: Option<u16>,

    /// JSON settings file
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Live activity by id, UUID, or name (repeatable)
    #[arg(long = "live-activity", value_name = "REF")]
    live_activities: Vec<String>,

    /// Activity by identifying name (repeatable)
    #[arg(long = "activity", value_name = "NAME")]
    activities: Vec<String>,

    /// Activity version
    #[arg(long)]
    version: Option<String>,

    /// Group by name (repeatable)
    #[arg(long = "group", value_name = "NAME")]
    groups: Vec<String>,

    /// Controller by name (repeatable)
    #[arg(long = "controller", value_name = "NAME")]
    controllers: Vec<String>,

    /// Select every live activity
    #[arg(long)]
    all: bool,

    /// Build discovered projects
    #[arg(long)]
    build: bool,

    /// Shut selected live activities down
    #[arg(long)]
    shutdown: bool,

    /// Delete selected live activities
    #[arg(long)]
    delete_live_activity: bool,

    /// Delete selected activities and their live activities
    #[arg(long)]
    delete_activity: bool,

    /// Upload built artifacts
    #[arg(long)]
    upload: bool,

    /// Create a live activity with this name
    #[arg(long, value_name = "NAME")]
    create: Option<String>,

    /// Redeploy out-of-date live activities
    #[arg(long)]
    upgrade: bool,

    /// Deploy selected live activities
    #[arg(long)]
    deploy: bool,

    /// Configure selected live activities from FILE (- for stdin)
    #[arg(long, value_name = "FILE")]
    config: Option<String>,

    /// Remove selected live activities from the group
    #[arg(long)]
    group_remove: bool,

    /// Delete the group
    #[arg(long)]
    group_delete: bool,

    /// Create the group from selected live activities
    #[arg(long)]
    group_create: bool,

    /// Add selected live activities to the group
    #[arg(long)]
    group_add: bool,

    /// Activate selected live activities
    #[arg(long)]
    activate: bool,

    /// Restart live activities, reactivating those that were running
    #[arg(long)]
    reactivate: bool,

    /// List selected live activities
    #[arg(long)]
    list: bool,

    /// Paths searched for project folders
    paths: Vec<PathBuf>,
}

impl Cli {
    fn commands(&self) -> CommandSet {
        let mut commands = CommandSet::new();
        let switches = [
            (self.build, Operation::Build),
            (self.shutdown, Operation::Shutdown),
            (self.delete_live_activity, Operation::DeleteLiveActivity),
            (self.delete_activity, Operation::DeleteActivity),
            (self.upload, Operation::Upload),
            (self.upgrade, Operation::Upgrade),
            (self.deploy, Operation::Deploy),
            (self.group_remove, Operation::GroupRemove),
            (self.group_delete, Operation::GroupDelete),
            (self.group_create, Operation::GroupCreate),
            (self.group_add, Operation::GroupAdd),
            (self.activate, Operation::Activate),
            (self.reactivate, Operation::Reactivate),
            (self.list, Operation::List),
        ];
        for (requested, operation) in switches {
            if requested {
                commands.request(operation);
            }
        }
        if let Some(name) = &self.create {
            commands.request(Operation::Create(name.clone()));
        }
        if let Some(source) = &self.config {
            commands.request(Operation::Configure(SettingsSource::from_arg(source)));
        }
        commands
    }

    fn selection(&self) -> SelectionRequest {
        SelectionRequest {
            live_activities: self.live_activities.clone(),
            activities: self.activities.clone(),
            version: self.version.clone(),
            groups: self.groups.clone(),
            controllers: self.controllers.clone(),
            all: self.all,
        }
    }

    fn fleet_config(&self) -> anyhow::Result<FleetConfig> {
        let mut config = match &self.settings {
            Some(path) => FleetConfig::load(path)?,
            None => FleetConfig::default(),
        };
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        Ok(config)
    }
}

fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Usage errors share exit code 1 with every other failure.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if err.use_stderr() => {
            let _ = err.print();
            return ExitCode::FAILURE;
        }
        Err(err) => err.exit(),
    };
    tracing::debug!(version = fleetctl::VERSION, "fleetctl starting");

    let config = match cli.fleet_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    let runner = Runner::new(config, cli.selection(), cli.commands(), cli.paths.clone());
    match runner.run() {
        Ok(report) => {
            tracing::info!(commands = report.executed.len(), "done");
            ExitCode::SUCCESS
        }
        Err(FleetError::NoCommands) => {
            let _ = Cli::command().print_help();
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
