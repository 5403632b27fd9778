//! Headless runner - one-shot device commands with JSON output
//!
//! Each command builds an [`Engine`] from the project's settings, dispatches
//! its actions and streams every state update to stdout while it waits.

use std::path::Path;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use rexec_app::config::{self, Settings};
use rexec_app::{
    Action, ActionOutcome, Compiler, ConnectOutcome, Engine, RunOutcome, SourceTextCompiler,
    StateUpdate,
};
use rexec_core::prelude::*;
use rexec_core::{Device, WorkspaceLocation};
use rexec_device::{DeviceDirectory, HttpDeviceDirectory, TransportFactory, WsTransportFactory};

use super::HeadlessEvent;

/// Parameters of `rexec run`
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub device_id: i64,
    /// Falls back to `session.default_workspace`
    pub workspace: Option<WorkspaceLocation>,
    pub program: String,
    /// How long to wait for the device to finish after sending
    pub wait: Duration,
}

/// What `execute_program` observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub connect: ConnectOutcome,
    pub run: Option<RunOutcome>,
    /// Device reported the program finished within the wait window
    pub finished: bool,
}

/// `rexec devices`
pub async fn run_devices(project_path: &Path) -> Result<()> {
    let settings = config::load_settings(project_path);
    let mut engine = http_engine(&settings)?;
    let devices = list_devices(&mut engine).await?;
    info!("Listed {} device(s)", devices.len());
    Ok(())
}

/// `rexec run`
pub async fn run_program(project_path: &Path, request: RunRequest) -> Result<()> {
    let settings = config::load_settings(project_path);
    let workspace = request
        .workspace
        .unwrap_or(settings.session.default_workspace);
    let mut engine = http_engine(&settings)?;

    let report = execute_program(
        &mut engine,
        request.device_id,
        workspace,
        request.program,
        request.wait,
    )
    .await?;
    info!("Run finished: {:?}", report);

    report_result(&report, request.device_id, request.wait)
}

/// Map a report to the command's result; anything short of a program the
/// device ran to completion is an error.
fn report_result(report: &RunReport, device_id: i64, wait: Duration) -> Result<()> {
    match &report.connect {
        ConnectOutcome::Connected => {}
        ConnectOutcome::Failed { error } => return Err(Error::transport(error.clone())),
        ConnectOutcome::NoEndpoint => {
            return Err(Error::directory(format!(
                "no endpoint available for device {device_id}"
            )))
        }
        ConnectOutcome::Superseded => {
            return Err(Error::transport("connect attempt superseded"))
        }
    }

    match &report.run {
        Some(RunOutcome::Sent { .. }) if report.finished => Ok(()),
        Some(RunOutcome::Sent { .. }) => Err(Error::transport(format!(
            "device did not finish within {} ms",
            wait.as_millis()
        ))),
        Some(RunOutcome::CompileFailed { errors }) => Err(Error::compile(
            errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        )),
        Some(RunOutcome::NotConnected) => {
            Err(Error::transport("session was not connected when running"))
        }
        Some(RunOutcome::TransportClosed) => {
            Err(Error::transport("transport closed before the program was sent"))
        }
        None => Err(Error::transport("program was not run")),
    }
}

fn http_engine(
    settings: &Settings,
) -> Result<Engine<HttpDeviceDirectory, WsTransportFactory, SourceTextCompiler>> {
    let directory = HttpDeviceDirectory::new(settings.directory.url()?.as_str())?;
    Ok(Engine::new(
        directory,
        WsTransportFactory::new(),
        SourceTextCompiler::new(),
        settings,
    ))
}

/// Fetch the device list, emitting it as events
pub async fn list_devices<D, F, C>(engine: &mut Engine<D, F, C>) -> Result<Vec<Device>>
where
    D: DeviceDirectory + Sync + 'static,
    F: TransportFactory + 'static,
    C: Compiler + 'static,
{
    match await_action(engine, Action::FetchDevices, |_| {}).await? {
        ActionOutcome::FetchDevices { devices } => Ok(devices),
        other => Err(unexpected(other)),
    }
}

/// Connect to `device_id`, run `program`, wait for the device to finish,
/// then disconnect.
pub async fn execute_program<D, F, C>(
    engine: &mut Engine<D, F, C>,
    device_id: i64,
    workspace: WorkspaceLocation,
    program: String,
    wait: Duration,
) -> Result<RunReport>
where
    D: DeviceDirectory + Sync + 'static,
    F: TransportFactory + 'static,
    C: Compiler + 'static,
{
    let devices = list_devices(engine).await?;
    let device = devices
        .into_iter()
        .find(|d| d.id == device_id)
        .ok_or_else(|| Error::device_not_found(device_id.to_string()))?;

    let connect = match await_action(engine, Action::Connect { device, workspace }, |_| {}).await? {
        ActionOutcome::Connect { result } => result,
        other => return Err(unexpected(other)),
    };
    if connect != ConnectOutcome::Connected {
        warn!("Not running program: {:?}", connect);
        return Ok(RunReport {
            connect,
            run: None,
            finished: false,
        });
    }

    // The device may start and finish before the run action returns.
    let mut completion = Completion::new(workspace);
    let run = match await_action(engine, Action::Run { workspace, program }, |u| {
        completion.observe(u)
    })
    .await?
    {
        ActionOutcome::Run { result } => result,
        other => return Err(unexpected(other)),
    };

    let finished = match run {
        RunOutcome::Sent { .. } => wait_for_completion(engine, &mut completion, wait).await,
        _ => false,
    };

    await_action(engine, Action::Disconnect, |_| {}).await?;

    Ok(RunReport {
        connect,
        run: Some(run),
        finished,
    })
}

/// Tracks the device's running flag for one workspace
#[derive(Debug, Clone, Copy)]
struct Completion {
    workspace: WorkspaceLocation,
    started: bool,
    finished: bool,
}

impl Completion {
    fn new(workspace: WorkspaceLocation) -> Self {
        Self {
            workspace,
            started: false,
            finished: false,
        }
    }

    fn observe(&mut self, update: &StateUpdate) {
        if let StateUpdate::WorkspaceRunning { workspace, running } = update {
            if *workspace == self.workspace {
                if *running {
                    self.started = true;
                } else if self.started {
                    self.finished = true;
                }
            }
        }
    }
}

/// Dispatch `action`, streaming updates until it returns.
async fn await_action<D, F, C>(
    engine: &mut Engine<D, F, C>,
    action: Action,
    mut on_update: impl FnMut(&StateUpdate),
) -> Result<ActionOutcome>
where
    D: DeviceDirectory + Sync + 'static,
    F: TransportFactory + 'static,
    C: Compiler + 'static,
{
    let mut handle: JoinHandle<Result<ActionOutcome>> = engine.dispatch(action);

    let joined = loop {
        tokio::select! {
            joined = &mut handle => break joined,
            Some(update) = engine.next_update() => {
                HeadlessEvent::from_update(&update).emit();
                on_update(&update);
            }
        }
    };

    // Updates published right before the action returned
    while let Some(update) = engine.try_next_update() {
        HeadlessEvent::from_update(&update).emit();
        on_update(&update);
    }

    let outcome = match joined {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            HeadlessEvent::error(e.to_string(), e.is_fatal()).emit();
            return Err(e);
        }
        Err(e) => {
            let message = format!("action task failed: {e}");
            HeadlessEvent::error(message.clone(), true).emit();
            return Err(Error::channel_send(message));
        }
    };

    HeadlessEvent::outcome(outcome.clone()).emit();
    Ok(outcome)
}

/// Stream updates until the device reports `running: false` after having
/// started, or `wait` elapses.
async fn wait_for_completion<D, F, C>(
    engine: &mut Engine<D, F, C>,
    completion: &mut Completion,
    wait: Duration,
) -> bool
where
    D: DeviceDirectory + Sync + 'static,
    F: TransportFactory + 'static,
    C: Compiler + 'static,
{
    let deadline = tokio::time::sleep(wait);
    tokio::pin!(deadline);

    while !completion.finished {
        tokio::select! {
            _ = &mut deadline => {
                warn!("Device did not finish within {} ms", wait.as_millis());
                return false;
            }
            update = engine.next_update() => {
                let Some(update) = update else {
                    return false;
                };
                HeadlessEvent::from_update(&update).emit();
                completion.observe(&update);
            }
        }
    }
    true
}

fn unexpected(outcome: ActionOutcome) -> Error {
    Error::protocol(format!("unexpected action outcome: {outcome:?}"))
}
