//! Classification of job output lines.

use serde::{Deserialize, Serialize};

use crate::core::prompt::{PendingPrompt, parse_prompt_marker};

/// Palette a job may tag a line with, as `[<color>] text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Green,
    Yellow,
    Blue,
    Cyan,
    Magenta,
}

impl Color {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "red" => Some(Color::Red),
            "green" => Some(Color::Green),
            "yellow" => Some(Color::Yellow),
            "blue" => Some(Color::Blue),
            "cyan" => Some(Color::Cyan),
            "magenta" => Some(Color::Magenta),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineClass {
    Plain,
    Colored(Color),
    Prompt(PendingPrompt),
}

/// One line of job output. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRecord {
    /// Position in the job's output, starting at 0.
    pub seq: u64,
    pub raw: String,
    pub class: LineClass,
}

impl OutputRecord {
    pub fn new(seq: u64, raw: String) -> Self {
        let class = classify_line(&raw);
        Self { seq, raw, class }
    }

    /// Text shown to the viewer: the raw line minus any color tag.
    pub fn text(&self) -> &str {
        match &self.class {
            LineClass::Colored(_) => {
                split_color_tag(&self.raw).map_or(self.raw.as_str(), |(_, text)| text)
            }
            _ => &self.raw,
        }
    }
}

/// Prompt markers win over color tags; anything else is plain.
pub fn classify_line(raw: &str) -> LineClass {
    if let Some(prompt) = parse_prompt_marker(raw) {
        return LineClass::Prompt(prompt);
    }
    match split_color_tag(raw) {
        Some((color, _)) => LineClass::Colored(color),
        None => LineClass::Plain,
    }
}

fn split_color_tag(raw: &str) -> Option<(Color, &str)> {
    let rest = raw.strip_prefix('[')?;
    let (tag, text) = rest.split_once(']')?;
    let color = Color::parse(tag)?;
    Some((color, text.strip_prefix(' ').unwrap_or(text)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::prompt::PromptKind;

    #[test]
    fn plain_lines_pass_through() {
        let record = OutputRecord::new(0, "scanning 11 channels".to_string());
        assert_eq!(record.class, LineClass::Plain);
        assert_eq!(record.text(), "scanning 11 channels");
    }

    #[test]
    fn color_tag_is_stripped_from_text() {
        let record = OutputRecord::new(3, "[green] handshake captured".to_string());
        assert_eq!(record.class, LineClass::Colored(Color::Green));
        assert_eq!(record.text(), "handshake captured");
    }

    #[test]
    fn unknown_tags_are_plain() {
        let record = OutputRecord::new(0, "[orange] nope".to_string());
        assert_eq!(record.class, LineClass::Plain);
        assert_eq!(record.text(), "[orange] nope");
    }

    #[test]
    fn prompt_markers_are_typed() {
        let record = OutputRecord::new(1, "[PROMPT:number:5] Retries".to_string());
        assert_eq!(
            record.class,
            LineClass::Prompt(PendingPrompt::new(PromptKind::Number, "Retries", "5"))
        );
    }

    #[test]
    fn quotes_and_backslashes_are_kept_raw() {
        let record = OutputRecord::new(0, r#"[red] path "C:\tmp""#.to_string());
        assert_eq!(record.text(), r#"path "C:\tmp""#);
    }
}
