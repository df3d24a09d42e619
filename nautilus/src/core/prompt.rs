//! Prompt markers a job writes when it wants an answer.
//!
//! Wire format: `[PROMPT:<kind>[:<default>]] <message>`.

use std::fmt;

use serde::{Deserialize, Serialize};

const MARKER_PREFIX: &str = "[PROMPT:";

/// Closed set of question kinds a job can ask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptKind {
    Alert,
    Error,
    Confirm,
    Text,
    Number,
    Ip,
    Mac,
}

impl PromptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptKind::Alert => "alert",
            PromptKind::Error => "error",
            PromptKind::Confirm => "confirm",
            PromptKind::Text => "text",
            PromptKind::Number => "number",
            PromptKind::Ip => "ip",
            PromptKind::Mac => "mac",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "alert" => Some(PromptKind::Alert),
            "error" => Some(PromptKind::Error),
            "confirm" => Some(PromptKind::Confirm),
            "text" => Some(PromptKind::Text),
            "number" => Some(PromptKind::Number),
            "ip" => Some(PromptKind::Ip),
            "mac" => Some(PromptKind::Mac),
            _ => None,
        }
    }
}

/// The question a job is blocked on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPrompt {
    pub kind: PromptKind,
    pub message: String,
    /// Returned to the job when nobody answers in time. Empty when unset.
    pub default: String,
}

impl PendingPrompt {
    pub fn new(kind: PromptKind, message: impl Into<String>, default: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            default: default.into(),
        }
    }
}

/// Renders the marker line, i.e. the inverse of [`parse_prompt_marker`].
impl fmt::Display for PendingPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.default.is_empty() {
            write!(f, "{}{}] {}", MARKER_PREFIX, self.kind.as_str(), self.message)
        } else {
            write!(
                f,
                "{}{}:{}] {}",
                MARKER_PREFIX,
                self.kind.as_str(),
                self.default,
                self.message
            )
        }
    }
}

/// Parse a prompt marker line. Lines with an unknown kind are not prompts.
///
/// The default runs up to the first `]`, so it may contain `:` (IP and MAC
/// defaults do).
pub fn parse_prompt_marker(line: &str) -> Option<PendingPrompt> {
    let rest = line.strip_prefix(MARKER_PREFIX)?;
    let (header, message) = rest.split_once(']')?;
    let (kind, default) = header.split_once(':').unwrap_or((header, ""));
    let kind = PromptKind::parse(kind)?;
    let message = message.strip_prefix(' ').unwrap_or(message);
    Some(PendingPrompt::new(kind, message, default))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_marker_with_default() {
        let prompt = parse_prompt_marker("[PROMPT:confirm:0] Proceed?").expect("prompt");
        assert_eq!(prompt, PendingPrompt::new(PromptKind::Confirm, "Proceed?", "0"));
    }

    #[test]
    fn parses_marker_without_default() {
        let prompt = parse_prompt_marker("[PROMPT:text] Network name").expect("prompt");
        assert_eq!(prompt.kind, PromptKind::Text);
        assert_eq!(prompt.message, "Network name");
        assert_eq!(prompt.default, "");
    }

    #[test]
    fn default_may_contain_colons() {
        let prompt =
            parse_prompt_marker("[PROMPT:mac:de:ad:be:ef:00:01] Target MAC").expect("prompt");
        assert_eq!(prompt.kind, PromptKind::Mac);
        assert_eq!(prompt.default, "de:ad:be:ef:00:01");
        assert_eq!(prompt.message, "Target MAC");
    }

    #[test]
    fn ignores_non_markers() {
        assert_eq!(parse_prompt_marker("plain output"), None);
        assert_eq!(parse_prompt_marker("[red] not a prompt"), None);
        assert_eq!(parse_prompt_marker("[PROMPT:launch] unknown kind"), None);
        assert_eq!(parse_prompt_marker("[PROMPT:confirm missing bracket"), None);
        assert_eq!(parse_prompt_marker(" [PROMPT:confirm] leading space"), None);
    }

    #[test]
    fn display_renders_the_wire_format() {
        let prompt = PendingPrompt::new(PromptKind::Ip, "Gateway", "192.168.1.1");
        let line = prompt.to_string();
        assert_eq!(line, "[PROMPT:ip:192.168.1.1] Gateway");
        assert_eq!(parse_prompt_marker(&line), Some(prompt));

        let alert = PendingPrompt::new(PromptKind::Alert, "Done scanning", "");
        assert_eq!(alert.to_string(), "[PROMPT:alert] Done scanning");
    }
}
