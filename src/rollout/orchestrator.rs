//! Rollout orchestrator - drives every device through connect, install and disconnect

use crate::config::{InterruptPolicy, RolloutSettings};
use crate::report::Reporter;
use crate::transport::{ConnectResult, DeviceTransport, DisconnectResult, InstallResult};
use fleet_shared::{
    now, Completion, Device, DeviceStage, DeviceStateMachine, OutcomeStatus, RolloutResult,
    StageEvent, TransitionResult, TransportError, UpdateOutcome,
};
use futures::{stream, FutureExt, StreamExt};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How one device's processing ended
#[derive(Debug)]
enum DeviceRun {
    /// Processed to a terminal outcome
    Finished(UpdateOutcome),
    /// Cancelled while in progress; carries the aborted outcome if recorded
    Interrupted(Option<UpdateOutcome>),
    /// Cancelled before it was started
    NotStarted,
}

/// Where the stage sequence stopped
enum Flow {
    Completed,
    Interrupted,
}

/// Mutable bookkeeping for one device
struct DeviceProgress {
    fsm: DeviceStateMachine,
    message: Option<String>,
    install_attempted: bool,
    disconnect_attempted: bool,
}

impl DeviceProgress {
    fn new() -> Self {
        Self {
            fsm: DeviceStateMachine::new(),
            message: None,
            install_attempted: false,
            disconnect_attempted: false,
        }
    }
}

/// Runs one rollout pass over a device snapshot
pub struct Orchestrator {
    settings: RolloutSettings,
    transport: Arc<dyn DeviceTransport>,
    reporter: Arc<dyn Reporter>,
}

impl Orchestrator {
    /// Create a new orchestrator
    pub fn new(
        settings: RolloutSettings,
        transport: Arc<dyn DeviceTransport>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            settings,
            transport,
            reporter,
        }
    }

    /// Update every device, in order, until done or cancelled
    pub async fn run(&self, devices: Vec<Device>, cancel: &CancellationToken) -> RolloutResult {
        let started_at = now();
        let fetched = devices.len();

        info!(
            "Rolling out {} to {} device(s) via {} (concurrency {})",
            self.settings.package_path.display(),
            fetched,
            self.transport.name(),
            self.settings.max_concurrency
        );

        let (outcomes, interrupted) = if self.settings.max_concurrency <= 1 {
            self.run_sequential(&devices, cancel).await
        } else {
            self.run_bounded(&devices, cancel).await
        };

        let result = RolloutResult {
            outcomes,
            fetched,
            completion: if interrupted {
                Completion::UserInterrupted
            } else {
                Completion::NormalCompletion
            },
            started_at,
            finished_at: now(),
        };

        info!(
            "Rollout finished: {} succeeded, {} failed, {} of {} attempted{}",
            result.succeeded(),
            result.failed(),
            result.attempted(),
            result.total(),
            if interrupted { " (interrupted)" } else { "" }
        );

        self.reporter.on_rollout_complete(&result);
        result
    }

    /// One device at a time, paced between devices
    async fn run_sequential(
        &self,
        devices: &[Device],
        cancel: &CancellationToken,
    ) -> (Vec<UpdateOutcome>, bool) {
        let total = devices.len();
        let mut outcomes = Vec::with_capacity(total);

        for (index, device) in devices.iter().enumerate() {
            if index > 0 && self.pace(cancel).await {
                return (outcomes, true);
            }

            match self.process_device(device, index + 1, total, cancel).await {
                DeviceRun::Finished(outcome) => outcomes.push(outcome),
                DeviceRun::Interrupted(aborted) => {
                    outcomes.extend(aborted);
                    return (outcomes, true);
                }
                DeviceRun::NotStarted => return (outcomes, true),
            }
        }

        (outcomes, false)
    }

    /// Up to `max_concurrency` devices at once, results kept in fetch order
    async fn run_bounded(
        &self,
        devices: &[Device],
        cancel: &CancellationToken,
    ) -> (Vec<UpdateOutcome>, bool) {
        let total = devices.len();
        let last_start: Mutex<Option<Instant>> = Mutex::new(None);
        let last_start = &last_start;

        let runs: Vec<DeviceRun> = stream::iter(devices.iter().enumerate())
            .map(|(index, device)| async move {
                if self.stagger(last_start, cancel).await {
                    return DeviceRun::NotStarted;
                }
                self.process_device(device, index + 1, total, cancel).await
            })
            .buffered(self.settings.max_concurrency)
            .collect()
            .await;

        let mut outcomes = Vec::with_capacity(total);
        let mut interrupted = cancel.is_cancelled();
        for run in runs {
            match run {
                DeviceRun::Finished(outcome) => outcomes.push(outcome),
                DeviceRun::Interrupted(aborted) => {
                    outcomes.extend(aborted);
                    interrupted = true;
                }
                DeviceRun::NotStarted => interrupted = true,
            }
        }

        (outcomes, interrupted)
    }

    /// Sleep the pacing delay. Returns true if cancelled meanwhile.
    async fn pace(&self, cancel: &CancellationToken) -> bool {
        let delay = self.settings.pacing_delay();
        if delay.is_zero() {
            return cancel.is_cancelled();
        }
        debug!("Pacing {}s before next device", delay.as_secs());
        tokio::select! {
            biased;
            _ = cancel.cancelled() => true,
            _ = sleep(delay) => false,
        }
    }

    /// Keep device starts at least one pacing delay apart. Returns true if cancelled.
    async fn stagger(
        &self,
        last_start: &Mutex<Option<Instant>>,
        cancel: &CancellationToken,
    ) -> bool {
        let mut last = last_start.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.settings.pacing_delay();
            let cancelled = tokio::select! {
                biased;
                _ = cancel.cancelled() => true,
                _ = sleep_until(ready_at) => false,
            };
            if cancelled {
                return true;
            }
        }
        if cancel.is_cancelled() {
            return true;
        }
        *last = Some(Instant::now());
        false
    }

    /// Process one device; nothing escapes this boundary
    async fn process_device(
        &self,
        device: &Device,
        position: usize,
        total: usize,
        cancel: &CancellationToken,
    ) -> DeviceRun {
        if cancel.is_cancelled() {
            return DeviceRun::NotStarted;
        }

        let started_at = now();
        self.reporter.on_device_start(device, position, total);
        info!("Updating {} ({}) at {}", device.name, device.id, device.address);

        let mut progress = DeviceProgress::new();
        let attempt = AssertUnwindSafe(self.drive(device, &mut progress, cancel))
            .catch_unwind()
            .await;

        let flow = match attempt {
            Ok(Ok(flow)) => flow,
            Ok(Err(fault)) => {
                error!("Environment fault while updating {}: {}", device.name, fault);
                self.fail_on_fault(device, &mut progress, fault.to_string())
                    .await;
                Flow::Completed
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!("Internal fault while updating {}: {}", device.name, reason);
                self.fail_on_fault(device, &mut progress, format!("internal error: {}", reason))
                    .await;
                Flow::Completed
            }
        };

        match flow {
            Flow::Completed => {
                let status = progress.fsm.fault_status();
                let outcome = self.outcome(device, &progress, status, started_at);
                self.reporter.on_device_complete(&outcome);
                DeviceRun::Finished(outcome)
            }
            Flow::Interrupted => {
                warn!(
                    "Interrupted while updating {} at stage {}",
                    device.name,
                    progress.fsm.stage()
                );
                if progress.fsm.has_connected() && !progress.disconnect_attempted {
                    self.release(device, &mut progress).await;
                }
                match self.settings.interrupt_policy {
                    InterruptPolicy::Omit => DeviceRun::Interrupted(None),
                    InterruptPolicy::RecordAborted => {
                        progress.message = Some("interrupted by user".into());
                        let outcome =
                            self.outcome(device, &progress, OutcomeStatus::Aborted, started_at);
                        self.reporter.on_device_complete(&outcome);
                        DeviceRun::Interrupted(Some(outcome))
                    }
                }
            }
        }
    }

    /// The stage sequence for one device
    async fn drive(
        &self,
        device: &Device,
        progress: &mut DeviceProgress,
        cancel: &CancellationToken,
    ) -> Result<Flow, TransportError> {
        let address = &device.address;

        self.advance(device, progress, StageEvent::ConnectStarted);
        let connect = match guarded(cancel, self.transport.connect(address)).await {
            Some(result) => result?,
            None => return Ok(Flow::Interrupted),
        };
        match connect {
            ConnectResult::Connected => {
                self.advance(device, progress, StageEvent::ConnectSucceeded)
            }
            ConnectResult::ConnectFailed { reason } => {
                warn!("Connect to {} failed: {}", address, reason);
                progress.message = Some(reason);
                self.advance(device, progress, StageEvent::ConnectFailed);
                return Ok(Flow::Completed);
            }
        }

        if cancel.is_cancelled() {
            return Ok(Flow::Interrupted);
        }

        self.advance(device, progress, StageEvent::InstallStarted);
        progress.install_attempted = true;
        let install = match guarded(
            cancel,
            self.transport.install(address, &self.settings.package_path),
        )
        .await
        {
            Some(result) => result?,
            None => return Ok(Flow::Interrupted),
        };
        match install {
            InstallResult::Installed => {
                self.advance(device, progress, StageEvent::InstallSucceeded)
            }
            InstallResult::InstallFailed { reason } => {
                warn!("Install on {} failed: {}", address, reason);
                progress.message = Some(reason);
                self.advance(device, progress, StageEvent::InstallFailed);
            }
        }

        self.disconnect(device, progress).await;
        Ok(Flow::Completed)
    }

    /// Record an unclassified fault and still close an open session
    async fn fail_on_fault(&self, device: &Device, progress: &mut DeviceProgress, reason: String) {
        progress.message = Some(reason);
        match progress.fsm.stage() {
            DeviceStage::Connecting => self.advance(device, progress, StageEvent::ConnectFailed),
            DeviceStage::Installing => self.advance(device, progress, StageEvent::InstallFailed),
            _ => {}
        }

        if !progress.fsm.has_connected() || progress.disconnect_attempted {
            return;
        }
        match progress.fsm.stage() {
            DeviceStage::Installed | DeviceStage::InstallFailed => {
                self.disconnect(device, progress).await
            }
            _ => self.release(device, progress).await,
        }
    }

    /// Disconnect stage; its result never changes the outcome
    async fn disconnect(&self, device: &Device, progress: &mut DeviceProgress) {
        self.advance(device, progress, StageEvent::DisconnectStarted);
        self.release(device, progress).await;
        self.advance(device, progress, StageEvent::DisconnectFinished);
    }

    /// Best-effort session close, failures are only logged
    async fn release(&self, device: &Device, progress: &mut DeviceProgress) {
        progress.disconnect_attempted = true;
        match AssertUnwindSafe(self.transport.disconnect(&device.address))
            .catch_unwind()
            .await
        {
            Ok(Ok(DisconnectResult::Disconnected)) => debug!("Disconnected {}", device.address),
            Ok(Ok(DisconnectResult::DisconnectFailed { reason })) => {
                warn!("Disconnect from {} failed: {}", device.address, reason)
            }
            Ok(Err(e)) => warn!("Disconnect from {} failed: {}", device.address, e),
            Err(panic) => warn!(
                "Disconnect from {} panicked: {}",
                device.address,
                panic_message(panic.as_ref())
            ),
        }
    }

    fn advance(&self, device: &Device, progress: &mut DeviceProgress, event: StageEvent) {
        let from = progress.fsm.stage();
        match progress.fsm.process_event(event) {
            TransitionResult::Success(to) => {
                debug!("{}: {} -> {}", device.name, from, to);
                self.reporter.on_stage_transition(device, from, to);
            }
            TransitionResult::Invalid { from, event } => {
                warn!("{}: ignoring {:?} in stage {}", device.name, event, from);
            }
        }
    }

    fn outcome(
        &self,
        device: &Device,
        progress: &DeviceProgress,
        status: OutcomeStatus,
        started_at: chrono::DateTime<chrono::Utc>,
    ) -> UpdateOutcome {
        UpdateOutcome {
            device: device.clone(),
            status,
            message: progress.message.clone(),
            started_at,
            finished_at: now(),
            install_attempted: progress.install_attempted,
            disconnect_attempted: progress.disconnect_attempted,
        }
    }
}

/// Race a transport operation against cancellation
async fn guarded<F: Future>(cancel: &CancellationToken, operation: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = operation => Some(output),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".into()
    }
}
