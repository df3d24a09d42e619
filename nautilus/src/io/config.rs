//! Supervisor configuration (`config.toml`).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Supervisor configuration (TOML).
///
/// Edited by hand on the host. Missing fields default to the stock layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NautilusConfig {
    /// Directory every runnable payload must live under.
    pub payload_root: PathBuf,

    /// File name of a payload's entry script.
    pub entry_name: String,

    /// Shell used to run the job wrapper.
    pub shell: PathBuf,

    /// Host-local scratch directory for `output.log`.
    pub state_dir: PathBuf,

    pub relay: RelayConfig,
    pub prompt: PromptConfig,
    pub stop: StopConfig,
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RelayConfig {
    /// How often the relay checks the output log for new lines.
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PromptConfig {
    /// How long a job waits for an answer before taking the default.
    pub timeout_secs: u64,
    /// How often a waiting job re-checks the mailbox.
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StopConfig {
    /// How long to wait for a killed job to be reaped.
    pub grace_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CatalogConfig {
    /// JSON document written by the catalog builder and served by `list`.
    pub cache_path: PathBuf,
    /// Command run by `refresh` (e.g. `["/usr/bin/nautilus-catalog"]`).
    pub builder_command: Vec<String>,
    pub timeout_secs: u64,
    /// Keep at most this many trailing bytes of builder stderr for errors.
    pub output_limit_bytes: usize,
}

impl Default for NautilusConfig {
    fn default() -> Self {
        Self {
            payload_root: PathBuf::from("/root/payloads/user"),
            entry_name: "payload.sh".to_string(),
            shell: PathBuf::from("/bin/bash"),
            state_dir: PathBuf::from("/tmp/nautilus"),
            relay: RelayConfig::default(),
            prompt: PromptConfig::default(),
            stop: StopConfig::default(),
            catalog: CatalogConfig::default(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 150,
            poll_interval_ms: 500,
        }
    }
}

impl Default for StopConfig {
    fn default() -> Self {
        Self { grace_ms: 2_000 }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            cache_path: PathBuf::from("/tmp/nautilus/catalog.json"),
            builder_command: vec!["/usr/bin/nautilus-catalog".to_string()],
            timeout_secs: 60,
            output_limit_bytes: 100_000,
        }
    }
}

impl NautilusConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.payload_root.is_absolute() {
            return Err(anyhow!("payload_root must be an absolute path"));
        }
        if self.entry_name.trim().is_empty() || self.entry_name.contains('/') {
            return Err(anyhow!("entry_name must be a bare file name"));
        }
        if self.shell.as_os_str().is_empty() {
            return Err(anyhow!("shell must be set"));
        }
        if self.relay.poll_interval_ms == 0 {
            return Err(anyhow!("relay.poll_interval_ms must be > 0"));
        }
        if self.prompt.timeout_secs == 0 {
            return Err(anyhow!("prompt.timeout_secs must be > 0"));
        }
        if self.prompt.poll_interval_ms == 0 {
            return Err(anyhow!("prompt.poll_interval_ms must be > 0"));
        }
        if self.catalog.timeout_secs == 0 {
            return Err(anyhow!("catalog.timeout_secs must be > 0"));
        }
        if self.catalog.output_limit_bytes == 0 {
            return Err(anyhow!("catalog.output_limit_bytes must be > 0"));
        }
        if self.catalog.builder_command.is_empty()
            || self.catalog.builder_command[0].trim().is_empty()
        {
            return Err(anyhow!("catalog.builder_command must be a non-empty array"));
        }
        Ok(())
    }

    /// Where the active job's output is tee'd.
    pub fn output_log_path(&self) -> PathBuf {
        self.state_dir.join("output.log")
    }

    pub fn relay_poll_interval(&self) -> Duration {
        Duration::from_millis(self.relay.poll_interval_ms)
    }

    pub fn prompt_timeout(&self) -> Duration {
        Duration::from_secs(self.prompt.timeout_secs)
    }

    pub fn prompt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.prompt.poll_interval_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop.grace_ms)
    }
}

impl CatalogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `NautilusConfig::default()`.
pub fn load_config(path: &Path) -> Result<NautilusConfig> {
    if !path.exists() {
        let cfg = NautilusConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: NautilusConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &NautilusConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, NautilusConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let mut cfg = NautilusConfig::default();
        cfg.prompt.timeout_secs = 30;
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "entry_name = \"run.sh\"\n[relay]\npoll_interval_ms = 50\n")
            .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.entry_name, "run.sh");
        assert_eq!(cfg.relay_poll_interval(), Duration::from_millis(50));
        assert_eq!(cfg.prompt_timeout(), Duration::from_secs(150));
    }

    #[test]
    fn rejects_relative_payload_root() {
        let cfg = NautilusConfig {
            payload_root: PathBuf::from("payloads"),
            ..NautilusConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
