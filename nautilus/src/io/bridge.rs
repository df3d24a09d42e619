//! Blocking hand-off between a job waiting on a prompt and the client that answers it.
//!
//! The job side calls [`PromptBridge::wait_for_response`] and is suspended until
//! a value lands in the single-slot mailbox, the wait times out, or the job's
//! session is torn down. The client side calls [`PromptBridge::deliver`] from a
//! separate, later request.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info};

use crate::core::prompt::PendingPrompt;
use crate::core::response::validate_response;
use crate::error::ResponseRejection;

/// How a blocked prompt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptOutcome {
    Answered(String),
    /// Nobody answered in time; carries the prompt's default.
    TimedOut(String),
    /// The job was stopped or superseded while waiting.
    Abandoned,
}

impl PromptOutcome {
    /// The line to hand back to the job, if any.
    pub fn into_answer(self) -> Option<String> {
        match self {
            PromptOutcome::Answered(value) | PromptOutcome::TimedOut(value) => Some(value),
            PromptOutcome::Abandoned => None,
        }
    }
}

#[derive(Debug, Default)]
struct BridgeState {
    /// Bumped on every reset; waits from an older session give up.
    session: u64,
    pending: Option<PendingPrompt>,
    mailbox: Option<String>,
}

#[derive(Debug)]
pub struct PromptBridge {
    state: Mutex<BridgeState>,
    changed: Condvar,
    poll_interval: Duration,
}

impl PromptBridge {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            state: Mutex::new(BridgeState::default()),
            changed: Condvar::new(),
            poll_interval,
        }
    }

    /// Start a new session: abandon any wait in progress and clear both slots.
    ///
    /// Returns the session id a new job must pass to `wait_for_response`.
    pub fn reset(&self) -> u64 {
        let mut state = self.state.lock();
        Self::advance(&mut state);
        let session = state.session;
        drop(state);
        self.changed.notify_all();
        session
    }

    /// Close `session` once its job has exited. No-op if a newer session began.
    pub fn end_session(&self, session: u64) {
        let mut state = self.state.lock();
        if state.session != session {
            return;
        }
        Self::advance(&mut state);
        drop(state);
        self.changed.notify_all();
    }

    fn advance(state: &mut BridgeState) {
        state.session += 1;
        if let Some(prompt) = state.pending.take() {
            info!(kind = prompt.kind.as_str(), "abandoning outstanding prompt");
        }
        if state.mailbox.take().is_some() {
            debug!("dropping unclaimed response");
        }
    }

    /// Block until an answer arrives, `timeout` elapses, or `session` is reset.
    ///
    /// The mailbox is re-checked at least every `poll_interval` and whenever
    /// `deliver` or `reset` signals a change.
    pub fn wait_for_response(
        &self,
        session: u64,
        prompt: &PendingPrompt,
        timeout: Duration,
    ) -> PromptOutcome {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        if state.session != session {
            return PromptOutcome::Abandoned;
        }
        state.pending = Some(prompt.clone());
        debug!(
            kind = prompt.kind.as_str(),
            timeout_secs = timeout.as_secs(),
            "waiting for response"
        );

        loop {
            if state.session != session {
                return PromptOutcome::Abandoned;
            }
            if let Some(value) = state.mailbox.take() {
                state.pending = None;
                debug!("prompt answered");
                return PromptOutcome::Answered(value);
            }
            let now = Instant::now();
            if now >= deadline {
                state.pending = None;
                info!(kind = prompt.kind.as_str(), "prompt timed out, using default");
                return PromptOutcome::TimedOut(prompt.default.clone());
            }
            let wait = self.poll_interval.min(deadline - now);
            self.changed.wait_for(&mut state, wait);
        }
    }

    /// Validate `raw` and put it in the mailbox.
    ///
    /// On rejection the mailbox is left untouched. A value delivered while no
    /// prompt is outstanding is held for the next prompt.
    pub fn deliver(&self, raw: &str) -> Result<(), ResponseRejection> {
        validate_response(raw)?;
        let mut state = self.state.lock();
        if state.pending.is_none() {
            debug!("response delivered with no prompt outstanding; holding it");
        }
        state.mailbox = Some(raw.to_string());
        drop(state);
        self.changed.notify_all();
        Ok(())
    }

    /// The prompt a job is currently blocked on.
    pub fn pending(&self) -> Option<PendingPrompt> {
        self.state.lock().pending.clone()
    }
}
