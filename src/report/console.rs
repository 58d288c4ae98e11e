//! Console reporter for interactive rollouts

use super::Reporter;
use chrono::{DateTime, Local, Utc};
use fleet_shared::{Device, DeviceStage, OutcomeStatus, RolloutResult, UpdateOutcome};

const RULE_WIDTH: usize = 60;

/// Prints progress and the final summary to stdout
#[derive(Debug, Clone)]
pub struct ConsoleReporter {
    /// Bridge port, quoted in the connect failure hint
    port: u16,
}

impl ConsoleReporter {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    /// Opening banner, printed once before the fleet is fetched
    pub fn banner(&self, started_at: DateTime<Utc>) {
        print_lines(&banner_lines(started_at));
    }
}

impl Reporter for ConsoleReporter {
    fn on_fleet_fetched(&self, devices: &[Device]) {
        print_lines(&fleet_lines(devices));
    }

    fn on_declined(&self) {
        println!("Aborted by user, no device was touched");
    }

    fn on_device_start(&self, device: &Device, position: usize, total: usize) {
        print_lines(&device_header(device, position, total));
    }

    fn on_stage_transition(&self, device: &Device, _from: DeviceStage, to: DeviceStage) {
        if let Some(line) = stage_line(device, to) {
            println!("{}", line);
        }
    }

    fn on_device_complete(&self, outcome: &UpdateOutcome) {
        print_lines(&outcome_lines(outcome, self.port));
    }

    fn on_rollout_complete(&self, result: &RolloutResult) {
        print_lines(&summary_lines(result));
    }
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}

fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn banner_lines(started_at: DateTime<Utc>) -> Vec<String> {
    vec![
        rule(),
        "Fleet package rollout via network ADB".into(),
        rule(),
        format!("Started at: {}", local_time(started_at)),
        String::new(),
    ]
}

fn fleet_lines(devices: &[Device]) -> Vec<String> {
    if devices.is_empty() {
        return vec!["No eligible devices found (0 online with a known address)".into()];
    }

    let mut lines = vec![
        format!("Found {} online device(s)", devices.len()),
        String::new(),
        "Devices to update:".into(),
    ];
    for device in devices {
        lines.push(format!(
            "  - {} ({}) - v{}",
            device.name,
            device.address.host,
            device.version_label()
        ));
    }
    lines.push(String::new());
    lines
}

fn device_header(device: &Device, position: usize, total: usize) -> Vec<String> {
    vec![
        String::new(),
        rule(),
        format!("[{}/{}] Device: {} (ID: {})", position, total, device.name, device.id),
        format!("   Address: {}", device.address),
        format!("   Current version: {}", device.version_label()),
        rule(),
    ]
}

fn stage_line(device: &Device, stage: DeviceStage) -> Option<String> {
    match stage {
        DeviceStage::Connecting => Some(format!("Connecting to {}...", device.address)),
        DeviceStage::Connected => Some("Connected".into()),
        DeviceStage::Installing => Some("Installing package...".into()),
        DeviceStage::Installed => {
            Some("Package installed, app will restart automatically".into())
        }
        DeviceStage::Disconnecting => Some("Disconnecting...".into()),
        DeviceStage::Pending
        | DeviceStage::ConnectFailed
        | DeviceStage::InstallFailed
        | DeviceStage::Done => None,
    }
}

fn outcome_lines(outcome: &UpdateOutcome, port: u16) -> Vec<String> {
    if outcome.is_success() {
        return vec![format!("[ok] {} updated", outcome.device.name)];
    }

    let mut lines = vec![format!("[failed] {}: {}", outcome.device.name, outcome.status)];
    if let Some(message) = &outcome.message {
        lines.extend(message.lines().map(|l| format!("   {}", l)));
    }
    if outcome.status == OutcomeStatus::ConnectFailed {
        lines.push("   Make sure ADB over network is enabled on the device".into());
        lines.push(format!("   Run once via USB: adb tcpip {}", port));
    }
    lines
}

fn summary_lines(result: &RolloutResult) -> Vec<String> {
    let mut lines = vec![String::new()];
    if result.was_interrupted() {
        lines.push("Interrupted by user, remaining devices were not attempted".into());
        lines.push(String::new());
    }
    lines.extend([
        rule(),
        "Update Summary".into(),
        rule(),
        format!("Success:   {}", result.succeeded()),
        format!("Failed:    {}", result.failed()),
        format!("Attempted: {}", result.attempted()),
        format!("Total:     {}", result.total()),
        format!("Started at:   {}", local_time(result.started_at)),
        format!("Completed at: {}", local_time(result.finished_at)),
        rule(),
    ]);
    lines
}
