//! Orchestrator
//!
//! Drives one invocation through its phases, strictly in sequence:
//!   1. discover project folders in the search paths
//!   2. connect and fetch the fleet snapshot, if any command needs the master
//!   3. resolve the selection (exactly once)
//!   4. validate every command in table order, attaching configuration
//!   5. prep every command
//!   6. execute every command in table order
//!   7. close the connection
//!
//! The first error ends the run.

use super::FleetConfig;
use super::channel::Channel;
use super::command::{CommandKind, CommandSet, ExecContext, validate};
use super::discovery::discover;
use super::error::{FleetError, Result};
use super::master::MasterClient;
use super::model::{LiveActivity, ProjectFolder};
use super::selection::{Selection, SelectionRequest};
use std::path::PathBuf;
use tracing::{debug, info};

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Project folders found by discovery.
    pub folders: Vec<ProjectFolder>,
    /// The resolved selection.
    pub selection: Selection,
    /// Command kinds executed, in order.
    pub executed: Vec<CommandKind>,
}

/// One invocation of the orchestrator.
pub struct Runner {
    config: FleetConfig,
    request: SelectionRequest,
    commands: CommandSet,
    search_paths: Vec<PathBuf>,
}

impl Runner {
    /// Prepare a run.
    pub fn new(
        config: FleetConfig,
        request: SelectionRequest,
        commands: CommandSet,
        search_paths: Vec<PathBuf>,
    ) -> Self {
        Self {
            config,
            request,
            commands,
            search_paths,
        }
    }

    /// Run every phase.
    pub fn run(mut self) -> Result<RunReport> {
        if self.commands.is_empty() {
            return Err(FleetError::NoCommands);
        }

        let folders = discover(&self.search_paths)?;
        info!(count = folders.len(), "project folders");
        for folder in &folders {
            debug!(folder = %folder.path.display(), activity = %folder.activity_name, "project");
        }

        let master = if self.commands.needs_fleet() {
            let addr = self.config.master_addr();
            info!(addr = %addr, "connecting to master");
            let channel = Channel::connect(&addr, self.config.response_timeout())?;
            Some(MasterClient::new(channel))
        } else {
            None
        };

        let result = self.run_connected(master.as_ref(), folders);
        if let Some(master) = &master {
            master.close();
        }
        result
    }

    fn run_connected(
        &mut self,
        master: Option<&MasterClient>,
        folders: Vec<ProjectFolder>,
    ) -> Result<RunReport> {
        let snapshot: Vec<LiveActivity> = match master {
            Some(master) => master.list_live_activities()?,
            None => Vec::new(),
        };
        info!(live_activities = snapshot.len(), "fleet snapshot");

        let selection = Selection::resolve(&self.request, &snapshot, &folders);
        info!(
            live_activities = selection.live_activities().len(),
            activities = selection.activities().len(),
            known_activities = selection.known_activities().len(),
            "selection resolved"
        );

        let order = self.commands.execution_order();
        for kind in &order {
            validate(*kind, &selection, &folders)?;
        }
        for command in self.commands.iter_mut() {
            command.attach(&self.config, &self.request);
        }
        for command in self.commands.iter_mut() {
            command.prep()?;
        }

        let mut ctx = ExecContext {
            master,
            selection: &selection,
            snapshot: &snapshot,
            folders: &folders,
            captured: None,
        };
        for command in self.commands.iter() {
            command.execute(&mut ctx)?;
        }

        Ok(RunReport {
            folders,
            selection,
            executed: order,
        })
    }
}
