//! Host-side CLI for the job supervisor.
//!
//! Writes the default config, checks payload paths, and runs a payload in the
//! foreground with prompts answered from the terminal.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use nautilus::core::types::{JobState, RespondStatus};
use nautilus::error::RequestError;
use nautilus::exit_codes;
use nautilus::io::config::{NautilusConfig, load_config, write_config};
use nautilus::relay::{OutputRelay, RelayEvent};
use nautilus::supervisor::Supervisor;
use tracing::debug;

const DEFAULT_CONFIG: &str = "/etc/nautilus/config.toml";

#[derive(Parser)]
#[command(
    name = "nautilus",
    version,
    about = "Run one payload at a time and answer its prompts"
)]
struct Cli {
    /// Config file (defaults apply if it does not exist).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default config file if missing.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Check a payload path against the allow-list.
    CheckPath { path: PathBuf },
    /// Run a payload in the foreground, printing events as JSON lines.
    ///
    /// Prompt answers are read from stdin, one per line.
    Run { path: PathBuf },
}

fn main() {
    nautilus::logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::CheckPath { path } => cmd_check_path(&cli.config, &path),
        Command::Run { path } => cmd_run(&cli.config, &path),
    }
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<RequestError>() {
        Some(RequestError::Internal(_)) | None => exit_codes::INVALID,
        Some(_) => exit_codes::REJECTED,
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if !force && config_path.exists() {
        println!("{} already exists", config_path.display());
        return Ok(exit_codes::OK);
    }
    write_config(config_path, &NautilusConfig::default())?;
    println!("wrote {}", config_path.display());
    Ok(exit_codes::OK)
}

fn cmd_check_path(config_path: &Path, path: &Path) -> Result<i32> {
    let config = load_config(config_path)?;
    let supervisor = Supervisor::new(config);
    supervisor
        .validate_path(path)
        .map_err(RequestError::from)
        .with_context(|| format!("check {}", path.display()))?;
    println!("ok");
    Ok(exit_codes::OK)
}

fn cmd_run(config_path: &Path, path: &Path) -> Result<i32> {
    let config = load_config(config_path)?;
    let poll_interval = config.relay_poll_interval();
    let supervisor = Arc::new(Supervisor::new(config));
    let job = supervisor.start(path)?;

    spawn_answer_reader(supervisor.clone());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("build runtime")?;
    let final_state = runtime.block_on(async {
        let mut events = Box::pin(OutputRelay::new(job, poll_interval).into_stream());
        let mut final_state = JobState::Failed;
        while let Some(event) = events.next().await {
            match serde_json::to_string(&EventLine::from(&event)) {
                Ok(line) => println!("{line}"),
                Err(e) => debug!(err = %e, "failed to encode event"),
            }
            if let RelayEvent::Done { state, .. } = event {
                final_state = state;
            }
        }
        final_state
    });

    Ok(match final_state {
        JobState::Finished => exit_codes::OK,
        _ => exit_codes::JOB_FAILED,
    })
}

/// Feed stdin lines to the prompt bridge until EOF.
fn spawn_answer_reader(supervisor: Arc<Supervisor>) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            match supervisor.respond(line.trim_end()) {
                Ok(RespondStatus::Ok) => {}
                Ok(RespondStatus::NotRunning) => break,
                Err(e) => eprintln!("answer rejected: {e}"),
            }
        }
    });
}

#[derive(serde::Serialize)]
struct EventLine {
    event: &'static str,
    payload: serde_json::Value,
}

impl From<&RelayEvent> for EventLine {
    fn from(event: &RelayEvent) -> Self {
        let payload = event
            .payload_json()
            .ok()
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or(serde_json::Value::Null);
        Self {
            event: event.name(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["nautilus", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG));
    }

    #[test]
    fn parse_run_with_config() {
        let cli = Cli::parse_from([
            "nautilus",
            "run",
            "/root/payloads/user/demo/payload.sh",
            "--config",
            "/tmp/n.toml",
        ]);
        assert!(matches!(
            cli.command,
            Command::Run { ref path } if path.ends_with("demo/payload.sh")
        ));
        assert_eq!(cli.config, PathBuf::from("/tmp/n.toml"));
    }

    #[test]
    fn rejections_map_to_rejected_exit_code() {
        let err = anyhow::Error::new(RequestError::from(
            nautilus::error::PathRejection::Traversal,
        ));
        assert_eq!(exit_code_for(&err), exit_codes::REJECTED);
        assert_eq!(exit_code_for(&anyhow::anyhow!("boom")), exit_codes::INVALID);
    }
}
