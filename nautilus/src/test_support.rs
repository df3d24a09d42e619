//! Test-only helpers for building payload trees and fast configs.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;

use crate::io::config::{CatalogConfig, NautilusConfig, PromptConfig, RelayConfig, StopConfig};

/// A temporary payload root plus a state directory.
pub struct PayloadTree {
    temp: TempDir,
    root: PathBuf,
}

impl PayloadTree {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create temp dir")?;
        let root = temp.path().join("payloads");
        fs::create_dir_all(&root).context("create payload root")?;
        Ok(Self { temp, root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_dir(&self) -> PathBuf {
        self.temp.path().join("state")
    }

    /// Write `<root>/<name>/payload.sh` and return its path.
    pub fn write_payload(&self, name: &str, body: &str) -> Result<PathBuf> {
        let dir = self.root.join(name);
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        let path = dir.join("payload.sh");
        fs::write(&path, body).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    /// Config rooted in this tree with short poll intervals.
    pub fn config(&self) -> NautilusConfig {
        NautilusConfig {
            payload_root: self.root.clone(),
            state_dir: self.state_dir(),
            relay: RelayConfig {
                poll_interval_ms: 20,
            },
            prompt: PromptConfig {
                timeout_secs: 30,
                poll_interval_ms: 20,
            },
            stop: StopConfig { grace_ms: 2_000 },
            catalog: CatalogConfig {
                cache_path: self.state_dir().join("catalog.json"),
                ..CatalogConfig::default()
            },
            ..NautilusConfig::default()
        }
    }
}
