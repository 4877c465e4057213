//! Scripted fakes for the transport seams, used by pool and executor tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{CoreError, Result};

use super::host::HostSpec;
use super::transport::{CommandOutput, Connector, Transport};

/// One scripted reaction to an `exec` call
pub(crate) enum ScriptedExec {
    /// Complete immediately with this output
    Output(CommandOutput),
    /// Fail with this error
    Fail(CoreError),
    /// Take this long; if it exceeds the caller's deadline the exec times out
    Hang(Duration, CommandOutput),
}

pub(crate) fn exit_with(code: u32) -> CommandOutput {
    CommandOutput {
        stdout: String::new(),
        stderr: if code == 0 {
            String::new()
        } else {
            format!("exit {}", code)
        },
        exit_code: Some(code),
    }
}

#[derive(Default)]
struct Shared {
    connects: AtomicUsize,
    probes: AtomicUsize,
    closed: AtomicUsize,
    execs: AtomicUsize,
    probe_ok: AtomicBool,
    connect_errors: Mutex<VecDeque<CoreError>>,
    script: Mutex<VecDeque<ScriptedExec>>,
    commands: Mutex<Vec<String>>,
}

/// Connector handing out scripted transports; all transports share one
/// exec script and one set of counters.
pub(crate) struct FakeConnector {
    shared: Arc<Shared>,
}

impl FakeConnector {
    /// A connector whose transports connect, probe, and exec successfully
    pub(crate) fn healthy() -> Arc<Self> {
        let shared = Shared {
            probe_ok: AtomicBool::new(true),
            ..Default::default()
        };
        Arc::new(Self {
            shared: Arc::new(shared),
        })
    }

    pub(crate) fn push_connect_error(&self, err: CoreError) {
        self.shared
            .connect_errors
            .lock()
            .unwrap()
            .push_back(err);
    }

    pub(crate) fn push_exec(&self, outcome: ScriptedExec) {
        self.shared.script.lock().unwrap().push_back(outcome);
    }

    pub(crate) fn set_probe_ok(&self, ok: bool) {
        self.shared.probe_ok.store(ok, Ordering::SeqCst);
    }

    pub(crate) fn connects(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn probes(&self) -> usize {
        self.shared.probes.load(Ordering::SeqCst)
    }

    pub(crate) fn closed(&self) -> usize {
        self.shared.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn execs(&self) -> usize {
        self.shared.execs.load(Ordering::SeqCst)
    }

    /// Commands the transports were asked to run, in order
    pub(crate) fn commands(&self) -> Vec<String> {
        self.shared.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _host: &HostSpec) -> Result<Box<dyn Transport>> {
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.shared.connect_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(Box::new(FakeTransport {
            shared: self.shared.clone(),
        }))
    }
}

struct FakeTransport {
    shared: Arc<Shared>,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn exec(&mut self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        self.shared.execs.fetch_add(1, Ordering::SeqCst);
        self.shared
            .commands
            .lock()
            .unwrap()
            .push(command.to_string());

        let scripted = self.shared.script.lock().unwrap().pop_front();
        match scripted {
            None => Ok(exit_with(0)),
            Some(ScriptedExec::Output(output)) => Ok(output),
            Some(ScriptedExec::Fail(err)) => Err(err),
            Some(ScriptedExec::Hang(duration, output)) => {
                if duration > timeout {
                    tokio::time::sleep(timeout).await;
                    Err(CoreError::Timeout(timeout.as_millis() as u64))
                } else {
                    tokio::time::sleep(duration).await;
                    Ok(output)
                }
            }
        }
    }

    async fn probe(&mut self) -> bool {
        self.shared.probes.fetch_add(1, Ordering::SeqCst);
        self.shared.probe_ok.load(Ordering::SeqCst)
    }

    async fn close(&mut self) {
        self.shared.closed.fetch_add(1, Ordering::SeqCst);
    }
}
