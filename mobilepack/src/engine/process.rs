//! Engine process lifecycle.
//!
//! The engine leaks memory across batches, so the dispatcher restarts it
//! after every job. The spawned child's handle is kept here; a restart
//! kills that handle directly instead of pattern-matching the process
//! table, with a by-name scan as the fallback for an engine this worker
//! did not spawn (first run after deploy, or an operator-started engine).

use super::{EngineApi, EngineClient, EngineError};
use crate::config::EngineSettings;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Grace period between kill and respawn.
const RESTART_GRACE: Duration = Duration::from_secs(2);

/// How long a freshly-spawned engine gets to answer its health probe.
const READY_TIMEOUT: Duration = Duration::from_secs(60);

/// Interval between readiness probes after a spawn.
const READY_POLL: Duration = Duration::from_secs(1);

/// Owns the engine subprocess.
///
/// A per-worker singleton: restarts must never interleave with a running
/// job, which the dispatcher guarantees by only restarting between jobs.
pub struct EngineProcess {
    settings: EngineSettings,
    client: EngineClient,
    child: Mutex<Option<Child>>,
}

impl EngineProcess {
    /// Create the lifecycle manager; does not spawn anything yet.
    pub fn new(settings: EngineSettings, client: EngineClient) -> Self {
        Self {
            settings,
            client,
            child: Mutex::new(None),
        }
    }

    /// Kill the current engine, wait out the grace period, respawn it and
    /// block until it answers health probes.
    pub async fn restart(&self) -> Result<(), EngineError> {
        self.stop_current().await;
        tokio::time::sleep(RESTART_GRACE).await;
        self.spawn().await?;
        self.await_ready().await
    }

    /// Kill the engine we spawned, or fall back to a by-name kill for an
    /// externally-started one.
    async fn stop_current(&self) {
        let mut guard = self.child.lock().await;
        match guard.take() {
            Some(mut child) => {
                if let Err(error) = child.start_kill() {
                    warn!(error = %error, "failed to signal engine child");
                }
                let _ = child.wait().await;
                info!("engine child stopped");
            }
            None => kill_by_name(&self.settings.process_name),
        }
    }

    async fn spawn(&self) -> Result<(), EngineError> {
        let child = Command::new(&self.settings.binary)
            .arg("--headless")
            .arg("--asset-server")
            .arg("--asset-server-port")
            .arg(self.settings.port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        info!(
            binary = %self.settings.binary.display(),
            port = self.settings.port,
            pid = child.id(),
            "spawned engine"
        );
        *self.child.lock().await = Some(child);
        Ok(())
    }

    async fn await_ready(&self) -> Result<(), EngineError> {
        let deadline = Instant::now() + READY_TIMEOUT;
        loop {
            if self.client.is_ready().await {
                info!("engine ready");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(EngineError::NotReady {
                    message: format!("no healthy response within {READY_TIMEOUT:?}"),
                });
            }
            tokio::time::sleep(READY_POLL).await;
        }
    }
}

/// Kill any process whose command name matches, by scanning /proc.
///
/// Unix only; elsewhere the fallback logs and gives up, leaving the old
/// engine to be replaced by the spawn that follows.
#[cfg(target_os = "linux")]
fn kill_by_name(name: &str) {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return;
    };

    for entry in entries.flatten() {
        let Some(pid) = entry
            .file_name()
            .to_str()
            .and_then(|s| s.parse::<i32>().ok())
        else {
            continue;
        };

        let comm_path = entry.path().join("comm");
        let Ok(comm) = std::fs::read_to_string(&comm_path) else {
            continue;
        };

        if comm.trim() == name {
            info!(pid, name, "killing engine by name");
            unsafe {
                libc::kill(pid, libc::SIGKILL);
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn kill_by_name(name: &str) {
    warn!(name, "no engine child handle and no by-name kill on this platform");
}
