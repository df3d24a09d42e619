//! Shared request and job types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Actions accepted by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List,
    Token,
    Run,
    Stop,
    Respond,
    Refresh,
    Status,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::List => "list",
            Action::Token => "token",
            Action::Run => "run",
            Action::Stop => "stop",
            Action::Respond => "respond",
            Action::Refresh => "refresh",
            Action::Status => "status",
        }
    }

    /// The catalog query is the only action exempt from origin checks.
    pub fn skips_origin_check(&self) -> bool {
        matches!(self, Action::List)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown action `{0}`")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "list" => Ok(Action::List),
            "token" => Ok(Action::Token),
            "run" => Ok(Action::Run),
            "stop" => Ok(Action::Stop),
            "respond" => Ok(Action::Respond),
            "refresh" => Ok(Action::Refresh),
            "status" => Ok(Action::Status),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

/// Lifecycle of the job in the supervisor's slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Running,
    AwaitingInput,
    Finished,
    Stopped,
    Failed,
}

/// Result of a `stop` request. Neither case is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopStatus {
    Stopped,
    NotRunning,
}

/// Result of an accepted `respond` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RespondStatus {
    /// Handed to the live job's current or next prompt.
    Ok,
    /// No live job to answer; the response was dropped.
    NotRunning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_parse_from_wire_names() {
        for action in [
            Action::List,
            Action::Token,
            Action::Run,
            Action::Stop,
            Action::Respond,
            Action::Refresh,
            Action::Status,
        ] {
            assert_eq!(action.as_str().parse::<Action>(), Ok(action));
        }
        assert_eq!(
            "shutdown".parse::<Action>(),
            Err(UnknownAction("shutdown".to_string()))
        );
    }

    #[test]
    fn only_list_skips_origin_check() {
        assert!(Action::List.skips_origin_check());
        assert!(!Action::Run.skips_origin_check());
        assert!(!Action::Status.skips_origin_check());
    }

    #[test]
    fn job_state_serializes_snake_case() {
        let json = serde_json::to_string(&JobState::AwaitingInput).expect("serialize");
        assert_eq!(json, "\"awaiting_input\"");
    }

    #[test]
    fn unknown_action_message_names_the_action() {
        let err = "reboot".parse::<Action>().expect_err("unknown");
        assert_eq!(err.to_string(), "unknown action `reboot`");
    }

    #[test]
    fn respond_status_serializes_snake_case() {
        let json = serde_json::to_string(&RespondStatus::NotRunning).expect("serialize");
        assert_eq!(json, "\"not_running\"");
    }
}
