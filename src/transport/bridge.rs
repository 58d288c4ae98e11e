//! Device bridge transport (network ADB)

use crate::config::TransportConfig;
use crate::transport::classifier::{Classification, MarkerClassifier, Operation, OutcomeClassifier};
use crate::transport::runner::ProcessRunner;
use crate::transport::traits::{
    CommandRunner, ConnectResult, DeviceTransport, DisconnectResult, InstallResult,
};
use async_trait::async_trait;
use fleet_shared::{DeviceAddress, TransportError};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Drives the bridge executable for connect, install and disconnect
pub struct BridgeTransport<R, C> {
    runner: R,
    classifier: C,
    program: String,
    connect_timeout: Duration,
    install_timeout: Duration,
    disconnect_timeout: Duration,
}

impl BridgeTransport<ProcessRunner, MarkerClassifier> {
    /// Bridge backed by real child processes and marker classification
    pub fn from_config(config: &TransportConfig) -> Self {
        Self::new(ProcessRunner::new(), MarkerClassifier::from_config(config), config)
    }
}

impl<R, C> BridgeTransport<R, C>
where
    R: CommandRunner,
    C: OutcomeClassifier,
{
    pub fn new(runner: R, classifier: C, config: &TransportConfig) -> Self {
        Self {
            runner,
            classifier,
            program: config.program.clone(),
            connect_timeout: config.connect_timeout(),
            install_timeout: config.install_timeout(),
            disconnect_timeout: config.disconnect_timeout(),
        }
    }

    /// Arguments for an operation against `address`
    fn command_args(
        operation: Operation,
        address: &DeviceAddress,
        package: Option<&Path>,
    ) -> Vec<String> {
        let addr = address.to_string();
        match operation {
            Operation::Connect => vec!["connect".into(), addr],
            Operation::Install => {
                let mut args = vec![
                    "-s".into(),
                    addr,
                    "install".into(),
                    "-r".into(),
                    "-t".into(),
                ];
                if let Some(package) = package {
                    args.push(package.display().to_string());
                }
                args
            }
            Operation::Disconnect => vec!["disconnect".into(), addr],
        }
    }

    async fn execute(
        &self,
        operation: Operation,
        address: &DeviceAddress,
        package: Option<&Path>,
        timeout: Duration,
    ) -> Result<Classification, TransportError> {
        let args = Self::command_args(operation, address, package);
        let output = self.runner.run(&self.program, &args, timeout).await?;
        let verdict = self.classifier.classify(operation, &output);
        debug!("{} {} -> {:?}", operation, address, verdict);
        Ok(verdict)
    }
}

#[async_trait]
impl<R, C> DeviceTransport for BridgeTransport<R, C>
where
    R: CommandRunner,
    C: OutcomeClassifier,
{
    async fn connect(&self, address: &DeviceAddress) -> Result<ConnectResult, TransportError> {
        let verdict = self
            .execute(Operation::Connect, address, None, self.connect_timeout)
            .await?;
        Ok(match verdict {
            Classification::Success => ConnectResult::Connected,
            Classification::Failure { reason } => ConnectResult::ConnectFailed { reason },
        })
    }

    async fn install(
        &self,
        address: &DeviceAddress,
        package: &Path,
    ) -> Result<InstallResult, TransportError> {
        let verdict = self
            .execute(Operation::Install, address, Some(package), self.install_timeout)
            .await?;
        Ok(match verdict {
            Classification::Success => InstallResult::Installed,
            Classification::Failure { reason } => InstallResult::InstallFailed { reason },
        })
    }

    async fn disconnect(
        &self,
        address: &DeviceAddress,
    ) -> Result<DisconnectResult, TransportError> {
        let verdict = self
            .execute(Operation::Disconnect, address, None, self.disconnect_timeout)
            .await?;
        Ok(match verdict {
            Classification::Success => DisconnectResult::Disconnected,
            Classification::Failure { reason } => DisconnectResult::DisconnectFailed { reason },
        })
    }

    fn name(&self) -> &'static str {
        "adb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::runner::CommandOutput;
    use crate::transport::testing::{Scripted, ScriptedRunner};
    use std::path::PathBuf;

    fn addr() -> DeviceAddress {
        DeviceAddress::new("10.0.0.8", 5555)
    }

    fn bridge(runner: ScriptedRunner) -> BridgeTransport<ScriptedRunner, MarkerClassifier> {
        BridgeTransport::new(runner, MarkerClassifier::default(), &TransportConfig::default())
    }

    #[tokio::test]
    async fn test_command_lines_and_timeouts() {
        let runner = ScriptedRunner::new();
        let transport = bridge(runner.clone());
        let package = PathBuf::from("backend/apk/app-debug.apk");

        transport.connect(&addr()).await.unwrap();
        transport.install(&addr(), &package).await.unwrap();
        transport.disconnect(&addr()).await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].program, "adb");
        assert_eq!(calls[0].args, vec!["connect", "10.0.0.8:5555"]);
        assert_eq!(calls[0].timeout, Duration::from_secs(10));
        assert_eq!(
            calls[1].args,
            vec!["-s", "10.0.0.8:5555", "install", "-r", "-t", "backend/apk/app-debug.apk"]
        );
        assert_eq!(calls[1].timeout, Duration::from_secs(120));
        assert_eq!(calls[2].args, vec!["disconnect", "10.0.0.8:5555"]);
        assert_eq!(calls[2].timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_zero_exit_without_marker_is_connect_failure() {
        let runner = ScriptedRunner::new();
        runner.script(
            Operation::Connect,
            "10.0.0.8:5555",
            Scripted::Output(CommandOutput::exited(0, "", "")),
        );
        let transport = bridge(runner);

        let result = transport.connect(&addr()).await.unwrap();
        assert!(matches!(result, ConnectResult::ConnectFailed { .. }));
    }

    #[tokio::test]
    async fn test_install_timeout_is_install_failure() {
        let runner = ScriptedRunner::new();
        runner.script(Operation::Install, "10.0.0.8:5555", Scripted::TimedOut);
        let transport = bridge(runner);

        let result = transport
            .install(&addr(), Path::new("app.apk"))
            .await
            .unwrap();
        match result {
            InstallResult::InstallFailed { reason } => assert!(reason.contains("timed out")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_environment_fault_propagates() {
        let runner = ScriptedRunner::new();
        runner.script(
            Operation::Connect,
            "10.0.0.8:5555",
            Scripted::Fault("executable not found".into()),
        );
        let transport = bridge(runner);

        let err = transport.connect(&addr()).await.unwrap_err();
        assert!(matches!(err, TransportError::Environment { .. }));
    }

    #[tokio::test]
    async fn test_disconnect_failure_is_a_value() {
        let runner = ScriptedRunner::new();
        runner.script(
            Operation::Disconnect,
            "10.0.0.8:5555",
            Scripted::Output(CommandOutput::exited(1, "", "error: no such device")),
        );
        let transport = bridge(runner);

        let result = transport.disconnect(&addr()).await.unwrap();
        assert_eq!(
            result,
            DisconnectResult::DisconnectFailed {
                reason: "error: no such device".into()
            }
        );
    }
}
