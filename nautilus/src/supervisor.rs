//! The single active job slot and the state shared across requests.
//!
//! One [`Supervisor`] lives for the life of the server. It owns the slot, the
//! one-use token and the prompt bridge, each behind its own short-lived lock.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::payload_path::validate_payload_path;
use crate::core::response::validate_response;
use crate::core::types::{JobState, RespondStatus, StopStatus};
use crate::error::{PathRejection, RequestError};
use crate::io::bridge::PromptBridge;
use crate::io::config::NautilusConfig;
use crate::io::job::{JobHandle, JobSpec, Termination, spawn_job};
use crate::io::token::TokenStore;

/// Snapshot of the slot for the `status` action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStatus {
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

pub struct Supervisor {
    config: NautilusConfig,
    active: Mutex<Option<JobHandle>>,
    tokens: TokenStore,
    bridge: Arc<PromptBridge>,
}

impl Supervisor {
    pub fn new(config: NautilusConfig) -> Self {
        let bridge = Arc::new(PromptBridge::new(config.prompt_poll_interval()));
        Self {
            config,
            active: Mutex::new(None),
            tokens: TokenStore::new(),
            bridge,
        }
    }

    pub fn config(&self) -> &NautilusConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn bridge(&self) -> &PromptBridge {
        &self.bridge
    }

    /// Check `path` against the payload allow-list and make sure it exists.
    pub fn validate_path(&self, path: &Path) -> Result<(), PathRejection> {
        validate_payload_path(path, &self.config.payload_root, &self.config.entry_name)?;
        if !path.is_file() {
            return Err(PathRejection::Missing);
        }
        Ok(())
    }

    /// Start `path` as the active job, killing whatever ran before.
    ///
    /// Returns once the process is spawned; use the handle to follow it.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn start(&self, path: impl AsRef<Path>) -> Result<JobHandle, RequestError> {
        let path = path.as_ref();
        self.validate_path(path)?;

        let mut slot = self.active.lock();
        if let Some(previous) = slot.as_ref() {
            info!(pid = previous.pid(), "superseding active job");
            // A job that cannot be killed keeps the slot.
            self.terminate(previous)?;
            *slot = None;
        }

        let session = self.bridge.reset();
        let spec = JobSpec {
            payload: path.to_path_buf(),
            shell: self.config.shell.clone(),
            log_path: self.config.output_log_path(),
            prompt_timeout: self.config.prompt_timeout(),
        };
        let job = spawn_job(&spec, self.bridge.clone(), session)?;
        *slot = Some(job.clone());
        Ok(job)
    }

    /// Kill the active job, if any. Idempotent.
    ///
    /// Fails only if the job could not be signalled; it then stays in the slot.
    #[instrument(skip_all)]
    pub fn stop(&self) -> Result<StopStatus, RequestError> {
        let mut slot = self.active.lock();
        let Some(job) = slot.clone() else {
            return Ok(StopStatus::NotRunning);
        };
        if job.is_finished() {
            *slot = None;
            return Ok(StopStatus::NotRunning);
        }
        let status = stop_reply(self.terminate(&job))?;
        *slot = None;
        Ok(status)
    }

    /// Hand an answer to the live job's outstanding (or next) prompt.
    ///
    /// Unsafe answers are rejected first. With no live job the answer is
    /// dropped and `NotRunning` returned.
    pub fn respond(&self, raw: &str) -> Result<RespondStatus, RequestError> {
        validate_response(raw)?;
        // Held across `deliver` so a concurrent start cannot reset in between.
        let slot = self.active.lock();
        if !slot.as_ref().is_some_and(|job| !job.is_finished()) {
            debug!("response with no live job, dropping it");
            return Ok(RespondStatus::NotRunning);
        }
        self.bridge.deliver(raw)?;
        Ok(RespondStatus::Ok)
    }

    /// The job in the slot, including one that has already exited.
    pub fn active(&self) -> Option<JobHandle> {
        self.active.lock().clone()
    }

    pub fn status(&self) -> JobStatus {
        match self.active.lock().as_ref() {
            Some(job) => JobStatus {
                state: job.state(),
                path: Some(job.path().display().to_string()),
                exit_code: job.exit_code(),
            },
            None => JobStatus {
                state: JobState::Idle,
                path: None,
                exit_code: None,
            },
        }
    }

    /// Kill `job` and abandon any prompt it was waiting on.
    fn terminate(&self, job: &JobHandle) -> anyhow::Result<Termination> {
        let outcome = job.terminate(self.config.stop_grace()).inspect_err(|e| {
            warn!(pid = job.pid(), err = %format!("{e:#}"), "failed to terminate job");
        })?;
        self.bridge.reset();
        Ok(outcome)
    }
}

/// Map a termination attempt onto the `stop` reply. A failed signal is never
/// reported as stopped.
fn stop_reply(attempt: anyhow::Result<Termination>) -> Result<StopStatus, RequestError> {
    match attempt? {
        Termination::Signalled => Ok(StopStatus::Stopped),
        Termination::AlreadyExited => Ok(StopStatus::NotRunning),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::PayloadTree;

    #[test]
    fn start_rejects_paths_before_spawning() {
        let tree = PayloadTree::new().expect("tree");
        let supervisor = Supervisor::new(tree.config());

        let outside = Supervisor::new(tree.config()).start("/tmp/payload.sh");
        assert!(matches!(
            outside,
            Err(RequestError::PathRejected(PathRejection::OutsideRoot))
        ));

        let missing = tree.root().join("ghost").join("payload.sh");
        let err = supervisor.start(&missing).expect_err("missing");
        assert!(matches!(
            err,
            RequestError::PathRejected(PathRejection::Missing)
        ));
        assert!(supervisor.active().is_none());
    }

    #[test]
    fn stop_without_job_is_not_running() {
        let tree = PayloadTree::new().expect("tree");
        let supervisor = Supervisor::new(tree.config());
        assert_eq!(supervisor.stop().expect("stop"), StopStatus::NotRunning);
        assert_eq!(supervisor.stop().expect("stop"), StopStatus::NotRunning);
        assert_eq!(supervisor.status().state, JobState::Idle);
    }

    #[test]
    fn respond_rejects_unsafe_answers() {
        let tree = PayloadTree::new().expect("tree");
        let supervisor = Supervisor::new(tree.config());
        let err = supervisor.respond("$(reboot)").expect_err("unsafe");
        assert_eq!(err.category(), "validation_rejected");
    }

    #[test]
    fn respond_without_live_job_is_not_running() {
        let tree = PayloadTree::new().expect("tree");
        let supervisor = Supervisor::new(tree.config());
        assert_eq!(
            supervisor.respond("10.0.0.1").expect("safe answer"),
            RespondStatus::NotRunning
        );
    }

    #[test]
    fn failed_kill_is_not_reported_as_stopped() {
        let attempt = Err(anyhow::anyhow!("killpg 4242: EPERM"));
        let err = stop_reply(attempt).expect_err("kill failed");
        assert_eq!(err.category(), "internal");
        assert_eq!(
            stop_reply(Ok(Termination::Signalled)).expect("signalled"),
            StopStatus::Stopped
        );
        assert_eq!(
            stop_reply(Ok(Termination::AlreadyExited)).expect("exited"),
            StopStatus::NotRunning
        );
    }
}
