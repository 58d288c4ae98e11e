//! Scripted command runner for exercising the bridge without a device

use crate::transport::classifier::Operation;
use crate::transport::runner::CommandOutput;
use crate::transport::traits::CommandRunner;
use async_trait::async_trait;
use fleet_shared::TransportError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Canned behavior for one (operation, address) pair
#[derive(Debug, Clone)]
pub enum Scripted {
    Output(CommandOutput),
    TimedOut,
    Fault(String),
    Panic(String),
    /// Healthy response after a delay
    Delayed(Duration),
    /// Never completes
    Hang,
}

/// One recorded invocation
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub operation: Operation,
    pub address: String,
}

#[derive(Default)]
struct Inner {
    scripts: HashMap<(Operation, String), Scripted>,
    cancel_on: HashMap<(Operation, String), CancellationToken>,
    calls: Vec<RecordedCall>,
}

/// Runner answering from a script; unscripted calls succeed like a healthy device
#[derive(Clone, Default)]
pub struct ScriptedRunner {
    inner: Arc<Mutex<Inner>>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, operation: Operation, address: &str, behavior: Scripted) {
        self.inner
            .lock()
            .unwrap()
            .scripts
            .insert((operation, address.to_string()), behavior);
    }

    /// Cancel `token` as soon as this call is issued
    pub fn cancel_on(&self, operation: Operation, address: &str, token: CancellationToken) {
        self.inner
            .lock()
            .unwrap()
            .cancel_on
            .insert((operation, address.to_string()), token);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Most commands ever running at the same time
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Addresses an operation was issued against, in call order
    pub fn addresses_for(&self, operation: Operation) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.operation == operation)
            .map(|c| c.address)
            .collect()
    }

    fn parse(args: &[String]) -> (Operation, String) {
        let address = args.get(1).cloned().unwrap_or_default();
        let operation = match args.first().map(String::as_str) {
            Some("connect") => Operation::Connect,
            Some("disconnect") => Operation::Disconnect,
            _ => Operation::Install,
        };
        (operation, address)
    }

    fn healthy(operation: Operation, address: &str) -> CommandOutput {
        match operation {
            Operation::Connect => {
                CommandOutput::exited(0, format!("connected to {}\n", address), "")
            }
            Operation::Install => {
                CommandOutput::exited(0, "Performing Streamed Install\nSuccess\n", "")
            }
            Operation::Disconnect => {
                CommandOutput::exited(0, format!("disconnected {}\n", address), "")
            }
        }
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, TransportError> {
        let (operation, address) = Self::parse(args);
        let key = (operation, address.clone());

        let (behavior, cancel) = {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(RecordedCall {
                program: program.to_string(),
                args: args.to_vec(),
                timeout,
                operation,
                address: address.clone(),
            });
            (
                inner.scripts.get(&key).cloned(),
                inner.cancel_on.get(&key).cloned(),
            )
        };

        if let Some(token) = cancel {
            token.cancel();
        }

        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        let _guard = ActiveGuard(self.active.clone());

        match behavior {
            None => Ok(Self::healthy(operation, &address)),
            Some(Scripted::Output(output)) => Ok(output),
            Some(Scripted::TimedOut) => Ok(CommandOutput::timed_out(timeout)),
            Some(Scripted::Fault(reason)) => Err(TransportError::environment(program, reason)),
            Some(Scripted::Panic(message)) => panic!("{}", message),
            Some(Scripted::Delayed(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(Self::healthy(operation, &address))
            }
            Some(Scripted::Hang) => {
                futures::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

/// Decrements the running count when a call ends or is dropped
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
