//! Operator gate and a log-only presenter.
//!
//! [`IpcContinueGate`] plays the role of a "next" button: it listens on a local socket (a
//! filesystem path on Unix, a named pipe elsewhere) and releases the sequencer when an operator
//! tool connects and sends `next`.

use std::io::{BufRead, BufReader, Write};

use async_trait::async_trait;
use interprocess::local_socket::{LocalSocketListener, LocalSocketStream};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::collaborators::{Presenter, TrajectoryHandle};
use crate::config::SequencerConfig;
use crate::error::PresenterError;

const RELEASE_WORDS: [&str; 2] = ["next", "continue"];

pub struct IpcContinueGate {
    name: String,
    // Taken out while a blocking accept is in flight.
    listener: Mutex<Option<LocalSocketListener>>,
}

impl std::fmt::Debug for IpcContinueGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcContinueGate")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Drop for IpcContinueGate {
    fn drop(&mut self) {
        // Close the listener before unlinking its path.
        let _ = self.listener.get_mut().take();

        #[cfg(unix)]
        {
            let _ = std::fs::remove_file(&self.name);
        }
    }
}

impl IpcContinueGate {
    /// Binds the gate's local socket, replacing a stale socket file left by an earlier run.
    pub fn bind(name: impl Into<String>) -> Result<Self, PresenterError> {
        let name = name.into();

        #[cfg(unix)]
        {
            let _ = std::fs::remove_file(&name);
        }

        let listener = LocalSocketListener::bind(name.as_str())?;
        info!(ipc_name = %name, "continue gate listening");
        Ok(Self {
            name,
            listener: Mutex::new(Some(listener)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Suspends until a client sends a release word. Other lines are answered with `ignored`.
    pub async fn wait(&self) -> Result<(), PresenterError> {
        let mut slot = self.listener.lock().await;
        let listener = slot
            .take()
            .ok_or_else(|| PresenterError::Other("continue gate listener missing".to_string()))?;

        let (listener, result) = tokio::task::spawn_blocking(move || {
            let result = accept_release(&listener);
            (listener, result)
        })
        .await
        .map_err(|e| PresenterError::Other(format!("continue gate task failed: {e}")))?;

        *slot = Some(listener);
        result
    }
}

/// Accepts connections until one sends a release word.
///
/// Only a failing `accept` ends the wait; a client that disconnects or errors mid-exchange is
/// dropped and the gate keeps listening.
fn accept_release(listener: &LocalSocketListener) -> Result<(), PresenterError> {
    loop {
        let mut conn = listener.accept()?;
        match serve_connection(&mut conn) {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(err) => warn!(error = %err, "continue gate client dropped; still waiting"),
        }
    }
}

/// Reads one line and answers it. Returns whether the line released the gate.
fn serve_connection(conn: &mut LocalSocketStream) -> std::io::Result<bool> {
    let mut line = String::new();
    if BufReader::new(&mut *conn).read_line(&mut line)? == 0 {
        debug!("continue gate client closed without sending a line");
        return Ok(false);
    }

    let word = line.trim().to_ascii_lowercase();
    if RELEASE_WORDS.contains(&word.as_str()) {
        // The operator asked to continue; a failed ack does not undo that.
        if let Err(err) = conn.write_all(b"ok\n") {
            debug!(error = %err, "could not acknowledge continue");
        }
        return Ok(true);
    }
    debug!(received = %word, "ignoring continue gate message");
    conn.write_all(b"ignored\n")?;
    Ok(false)
}

/// Presenter that reports through `tracing` and optionally gates on an [`IpcContinueGate`].
#[derive(Debug, Default)]
pub struct LoggingPresenter {
    gate: Option<IpcContinueGate>,
}

impl LoggingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gate(gate: IpcContinueGate) -> Self {
        Self { gate: Some(gate) }
    }

    /// Binds a gate at the configured IPC name when per-step gating is on.
    pub fn from_config(config: &SequencerConfig) -> Result<Self, PresenterError> {
        if config.gate_each_step {
            Ok(Self::with_gate(IpcContinueGate::bind(
                config.continue_ipc_name.clone(),
            )?))
        } else {
            Ok(Self::new())
        }
    }
}

#[async_trait]
impl Presenter for LoggingPresenter {
    async fn show_trajectory(&self, trajectory: &TrajectoryHandle) -> Result<(), PresenterError> {
        info!(trajectory_id = trajectory.id(), "planned trajectory ready");
        Ok(())
    }

    async fn clear(&self) -> Result<(), PresenterError> {
        debug!("clearing visualization");
        Ok(())
    }

    async fn wait_for_continue(&self, prompt: &str) -> Result<(), PresenterError> {
        match &self.gate {
            Some(gate) => {
                info!(ipc_name = gate.name(), "{prompt}");
                gate.wait().await
            }
            None => {
                info!("{prompt} (no gate configured, continuing)");
                Ok(())
            }
        }
    }

    async fn flush(&self) -> Result<(), PresenterError> {
        Ok(())
    }
}
