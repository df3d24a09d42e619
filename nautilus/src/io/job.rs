//! The wrapped job process.
//!
//! A job is `<shell> -c <wrapper> nautilus <payload>` in its own process group.
//! The wrapper merges the payload's stdout and stderr into one pipe, which a
//! capture thread drains into the [`OutputLog`] without ever blocking on a
//! viewer. Prompt markers are queued to a separate answer thread, which waits
//! on the [`PromptBridge`] and writes each answer to the job's stdin, so the
//! job is answered even with no viewer attached.

use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::output::LineClass;
use crate::core::prompt::PendingPrompt;
use crate::core::types::JobState;
use crate::io::bridge::{PromptBridge, PromptOutcome};
use crate::io::output_log::OutputLog;

const WRAPPER: &str = include_str!("wrapper.sh");

/// Extra time the shell-side `read -t` waits beyond the bridge timeout, so the
/// supervisor's answer (or default) always arrives first.
const SHELL_TIMEOUT_SLACK_SECS: u64 = 10;

/// How often the capture thread checks whether the job has been reaped after
/// its output pipe closed.
const REAP_POLL: Duration = Duration::from_millis(20);

/// Everything needed to launch one job.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub payload: PathBuf,
    pub shell: PathBuf,
    pub log_path: PathBuf,
    pub prompt_timeout: Duration,
}

/// How a termination request played out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Signalled,
    /// The process group was already gone; nothing to do.
    AlreadyExited,
}

#[derive(Debug)]
struct JobInner {
    path: PathBuf,
    pid: u32,
    child: Mutex<Child>,
    stdin: Mutex<Option<ChildStdin>>,
    log: OutputLog,
    state: Mutex<JobState>,
    exit_code: Mutex<Option<i32>>,
    stop_requested: AtomicBool,
    /// Set once every output line has been appended and the process reaped.
    finished: AtomicBool,
}

/// Shared control reference to a spawned job. Cheap to clone.
#[derive(Debug, Clone)]
pub struct JobHandle {
    inner: Arc<JobInner>,
}

impl JobHandle {
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn pid(&self) -> u32 {
        self.inner.pid
    }

    pub fn log(&self) -> &OutputLog {
        &self.inner.log
    }

    pub fn state(&self) -> JobState {
        *self.inner.state.lock()
    }

    pub fn exit_code(&self) -> Option<i32> {
        *self.inner.exit_code.lock()
    }

    /// True while the job's process has not exited.
    pub fn is_alive(&self) -> bool {
        matches!(self.inner.child.lock().try_wait(), Ok(None))
    }

    /// True once all output has been captured and the final state recorded.
    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::Acquire)
    }

    /// Kill the job's whole process group and wait up to `grace` for it to be reaped.
    ///
    /// A job that has already exited is not an error.
    #[instrument(skip_all, fields(pid = self.inner.pid))]
    pub fn terminate(&self, grace: Duration) -> Result<Termination> {
        let mut child = self.inner.child.lock();
        let leader_exited = matches!(child.try_wait(), Ok(Some(_)));
        if !leader_exited {
            self.inner.stop_requested.store(true, Ordering::Release);
        }

        // Signal the group even when the shell is gone: background children
        // may still hold the output pipe open.
        let pgid = Pid::from_raw(self.inner.pid as i32);
        match killpg(pgid, Signal::SIGKILL) {
            Ok(()) => {}
            Err(Errno::ESRCH) => {
                debug!("job process group already gone");
                return Ok(Termination::AlreadyExited);
            }
            Err(e) => return Err(e).context("signal job process group"),
        }
        if leader_exited {
            debug!("job already exited, killed leftover group members");
            return Ok(Termination::AlreadyExited);
        }

        match child.wait_timeout(grace).context("wait for killed job")? {
            Some(status) => debug!(status = ?status, "killed job reaped"),
            None => warn!(
                grace_ms = grace.as_millis() as u64,
                "killed job not reaped within grace period"
            ),
        }
        info!("job terminated");
        Ok(Termination::Signalled)
    }

    fn set_state(&self, state: JobState) {
        *self.inner.state.lock() = state;
    }

    /// Move to `to` only if currently `from`; a final state is never overwritten.
    fn transition(&self, from: JobState, to: JobState) {
        let mut state = self.inner.state.lock();
        if *state == from {
            *state = to;
        }
    }

    fn answer_prompt(&self, answer: &str) {
        let mut stdin = self.inner.stdin.lock();
        let Some(stdin) = stdin.as_mut() else {
            return;
        };
        let result = stdin
            .write_all(answer.as_bytes())
            .and_then(|()| stdin.write_all(b"\n"))
            .and_then(|()| stdin.flush());
        if let Err(e) = result {
            debug!(err = %e, "job stopped reading answers");
        }
    }
}

/// Launch `spec.payload` inside the wrapper and start capturing its output.
///
/// Returns as soon as the process is spawned. `session` is the bridge session
/// this job's prompts belong to.
#[instrument(skip_all, fields(payload = %spec.payload.display(), session = session))]
pub fn spawn_job(spec: &JobSpec, bridge: Arc<PromptBridge>, session: u64) -> Result<JobHandle> {
    let log = OutputLog::create(&spec.log_path)?;

    let mut cmd = Command::new(&spec.shell);
    cmd.arg("-c")
        .arg(WRAPPER)
        .arg("nautilus")
        .arg(&spec.payload)
        .env(
            "NAUTILUS_PROMPT_TIMEOUT",
            (spec.prompt_timeout.as_secs() + SHELL_TIMEOUT_SLACK_SECS).to_string(),
        )
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0);

    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, shell = %spec.shell.display(), "failed to spawn job");
            return Err(e).with_context(|| format!("spawn {}", spec.shell.display()));
        }
    };

    let stdin = child.stdin.take();
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let pid = child.id();
    let handle = JobHandle {
        inner: Arc::new(JobInner {
            path: spec.payload.clone(),
            pid,
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            log,
            state: Mutex::new(JobState::Running),
            exit_code: Mutex::new(None),
            stop_requested: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        }),
    };

    // The wrapper redirects its own stderr into stdout first thing; this only
    // sees what the shell prints before that (e.g. a missing interpreter).
    let stderr_handle = {
        let job = handle.clone();
        thread::Builder::new()
            .name(format!("job-stderr-{pid}"))
            .spawn(move || capture_lines(&job, stderr, None))
            .context("spawn stderr capture thread")?
    };

    let (prompt_tx, prompt_rx) = mpsc::channel();
    let answerer = Answerer {
        job: handle.clone(),
        bridge: bridge.clone(),
        session,
        prompt_timeout: spec.prompt_timeout,
    };
    thread::Builder::new()
        .name(format!("job-answer-{pid}"))
        .spawn(move || answerer.run(prompt_rx))
        .context("spawn answer thread")?;

    let capture = Capture {
        job: handle.clone(),
        bridge,
        session,
    };
    thread::Builder::new()
        .name(format!("job-capture-{pid}"))
        .spawn(move || capture.run(stdout, prompt_tx, stderr_handle))
        .context("spawn capture thread")?;

    info!(pid, "job started");
    Ok(handle)
}

/// Answers the job's prompts in the order they were printed.
///
/// Runs on its own thread so output capture never waits on a viewer.
struct Answerer {
    job: JobHandle,
    bridge: Arc<PromptBridge>,
    session: u64,
    prompt_timeout: Duration,
}

impl Answerer {
    fn run(self, prompts: Receiver<PendingPrompt>) {
        for prompt in prompts {
            self.answer(&prompt);
        }
    }

    fn answer(&self, prompt: &PendingPrompt) {
        self.job.transition(JobState::Running, JobState::AwaitingInput);
        let outcome = self
            .bridge
            .wait_for_response(self.session, prompt, self.prompt_timeout);
        if outcome == PromptOutcome::Abandoned {
            return;
        }
        if let Some(answer) = outcome.into_answer() {
            self.job.answer_prompt(&answer);
        }
        self.job.transition(JobState::AwaitingInput, JobState::Running);
    }
}

/// Drains the job's output until every writer has closed the pipe.
struct Capture {
    job: JobHandle,
    bridge: Arc<PromptBridge>,
    session: u64,
}

impl Capture {
    fn run(
        self,
        stdout: impl Read,
        prompts: Sender<PendingPrompt>,
        stderr_handle: thread::JoinHandle<()>,
    ) {
        capture_lines(&self.job, stdout, Some(&prompts));
        drop(prompts);
        if stderr_handle.join().is_err() {
            warn!("stderr capture thread panicked");
        }
        self.finish();
    }

    /// Reap the process and record how it ended.
    fn finish(&self) {
        let status = loop {
            match self.job.inner.child.lock().try_wait() {
                Ok(Some(status)) => break Some(status),
                Ok(None) => {}
                Err(e) => {
                    warn!(err = %e, "failed to reap job");
                    break None;
                }
            }
            thread::sleep(REAP_POLL);
        };

        let code = status.and_then(|s| s.code());
        let stopped = self.job.inner.stop_requested.load(Ordering::Acquire);
        let state = if stopped {
            JobState::Stopped
        } else if code == Some(0) {
            JobState::Finished
        } else {
            JobState::Failed
        };

        // Nobody is left to read an answer.
        self.bridge.end_session(self.session);
        *self.job.inner.exit_code.lock() = code;
        self.job.set_state(state);
        self.job.inner.stdin.lock().take();
        self.job.inner.finished.store(true, Ordering::Release);
        info!(pid = self.job.pid(), exit_code = ?code, state = ?state, "job exited");
    }
}

/// Append each line of `reader` to the job's log until EOF, queueing prompts.
fn capture_lines(job: &JobHandle, reader: impl Read, prompts: Option<&Sender<PendingPrompt>>) {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(err = %e, "failed to read job output");
                break;
            }
        }
        let text = String::from_utf8_lossy(&line);
        let class = job.log().append(text.trim_end_matches(['\n', '\r']));
        if let (LineClass::Prompt(prompt), Some(prompts)) = (class, prompts)
            && prompts.send(prompt).is_err()
        {
            debug!("answer thread gone, prompt not queued");
        }
    }
}
