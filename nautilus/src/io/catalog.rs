//! The payload catalog: a JSON document produced by an external builder.

use std::fs;
use std::io::Read;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;

use anyhow::{Context, Result, bail};
use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use serde_json::Value;
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

use crate::io::config::CatalogConfig;

/// Read the cached catalog.
///
/// Returns `None` when the cache is absent or not (yet) valid JSON; the builder
/// may be rewriting it.
pub fn load_catalog(path: &Path) -> Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read catalog {}", path.display()))?;
    match serde_json::from_str(&contents) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!(path = %path.display(), err = %e, "catalog cache is not valid json");
            Ok(None)
        }
    }
}

/// Run the catalog builder and wait for it to finish.
///
/// The builder gets its own process group. Whatever is left of that group is
/// killed once the builder exits or times out, so a straggler holding stderr
/// open cannot stall the refresh.
pub fn refresh_catalog(cfg: &CatalogConfig) -> Result<()> {
    let (program, args) = cfg
        .builder_command
        .split_first()
        .context("catalog.builder_command is empty")?;

    info!(program = %program, "refreshing catalog");
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .process_group(0)
        .spawn()
        .with_context(|| format!("spawn catalog builder {program}"))?;
    let pid = child.id();

    let limit = cfg.output_limit_bytes;
    let stderr = child.stderr.take().context("catalog builder stderr missing")?;
    let tail = thread::spawn(move || read_tail(stderr, limit));

    let waited = child.wait_timeout(cfg.timeout());
    kill_group(pid);
    let status = match waited {
        Ok(Some(status)) => status,
        Ok(None) => {
            let _ = child.wait();
            let _ = tail.join();
            bail!(
                "catalog builder timed out after {}s",
                cfg.timeout().as_secs()
            );
        }
        Err(e) => {
            let _ = child.wait();
            return Err(e).context("wait for catalog builder");
        }
    };
    let tail = tail.join().unwrap_or_default();

    if !status.success() {
        bail!(
            "catalog builder exited with {:?}: {}",
            status.code(),
            tail.trim_end()
        );
    }
    Ok(())
}

/// SIGKILL the builder's process group. Gone already is fine.
fn kill_group(pid: u32) {
    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(pid, err = %e, "failed to kill catalog builder group"),
    }
}

/// Read `reader` to the end, keeping only the last `limit` bytes.
fn read_tail(mut reader: impl Read, limit: usize) -> String {
    let mut tail: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                tail.extend_from_slice(&chunk[..n]);
                if tail.len() > limit {
                    tail.drain(..tail.len() - limit);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => {
                debug!(err = %e, "catalog builder stderr read failed");
                break;
            }
        }
    }
    String::from_utf8_lossy(&tail).into_owned()
}
