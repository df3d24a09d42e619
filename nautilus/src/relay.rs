//! Output relay: turns a job's growing output log into an ordered event stream.
//!
//! The relay polls `output.log` on a fixed interval and reads everything past
//! its byte offset in bounded batches, so a slow viewer never holds the whole
//! output in memory. It ends with a single `done` event once the job
//! has exited and nothing is left unread.

use std::time::Duration;

use futures::stream::Stream;
use serde::Serialize;
use tracing::{debug, warn};

use crate::core::output::{Color, LineClass, OutputRecord};
use crate::core::prompt::PendingPrompt;
use crate::core::types::JobState;
use crate::io::job::JobHandle;

/// One event delivered to a viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    Data {
        text: String,
        color: Option<Color>,
    },
    Prompt(PendingPrompt),
    Done {
        state: JobState,
        exit_code: Option<i32>,
    },
}

#[derive(Serialize)]
struct DataPayload<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<Color>,
}

#[derive(Serialize)]
struct DonePayload {
    state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    exit_code: Option<i32>,
}

impl RelayEvent {
    /// Event name on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            RelayEvent::Data { .. } => "data",
            RelayEvent::Prompt(_) => "prompt",
            RelayEvent::Done { .. } => "done",
        }
    }

    /// JSON body of the event. Quotes and backslashes in job text are escaped here.
    pub fn payload_json(&self) -> serde_json::Result<String> {
        match self {
            RelayEvent::Data { text, color } => serde_json::to_string(&DataPayload {
                text,
                color: *color,
            }),
            RelayEvent::Prompt(prompt) => serde_json::to_string(prompt),
            RelayEvent::Done { state, exit_code } => serde_json::to_string(&DonePayload {
                state: *state,
                exit_code: *exit_code,
            }),
        }
    }
}

impl From<&OutputRecord> for RelayEvent {
    fn from(record: &OutputRecord) -> Self {
        match &record.class {
            LineClass::Prompt(prompt) => RelayEvent::Prompt(prompt.clone()),
            LineClass::Colored(color) => RelayEvent::Data {
                text: record.text().to_string(),
                color: Some(*color),
            },
            LineClass::Plain => RelayEvent::Data {
                text: record.text().to_string(),
                color: None,
            },
        }
    }
}

/// Follows one job from the start of its output.
pub struct OutputRelay {
    job: JobHandle,
    poll_interval: Duration,
}

impl OutputRelay {
    pub fn new(job: JobHandle, poll_interval: Duration) -> Self {
        Self { job, poll_interval }
    }

    /// Stream every record in order, then a terminal `Done`.
    ///
    /// Dropping the stream only stops the viewer; the job keeps running.
    pub fn into_stream(self) -> impl Stream<Item = RelayEvent> {
        let OutputRelay { job, poll_interval } = self;
        async_stream::stream! {
            let mut offset = 0u64;
            let mut seq = 0u64;
            loop {
                // Sample before reading: once finished, every line is already in the log.
                let finished = job.is_finished();
                let batch = match job.log().read_from(offset, seq) {
                    Ok(batch) => batch,
                    Err(e) => {
                        let err = format!("{e:#}");
                        warn!(pid = job.pid(), %err, "failed to read job output");
                        break;
                    }
                };
                for record in &batch.records {
                    yield RelayEvent::from(record);
                }
                seq += batch.records.len() as u64;
                offset = batch.next_offset;

                if batch.records.is_empty() {
                    if finished {
                        break;
                    }
                    tokio::time::sleep(poll_interval).await;
                }
            }
            debug!(pid = job.pid(), records = seq, "relay drained job output");
            yield RelayEvent::Done {
                state: job.state(),
                exit_code: job.exit_code(),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::prompt::PromptKind;

    #[test]
    fn records_map_to_events() {
        let plain = OutputRecord::new(0, "hello".to_string());
        assert_eq!(
            RelayEvent::from(&plain),
            RelayEvent::Data {
                text: "hello".to_string(),
                color: None
            }
        );

        let prompt = OutputRecord::new(1, "[PROMPT:confirm:0] Proceed?".to_string());
        assert_eq!(
            RelayEvent::from(&prompt),
            RelayEvent::Prompt(PendingPrompt::new(PromptKind::Confirm, "Proceed?", "0"))
        );
    }

    #[test]
    fn data_payload_escapes_and_omits_missing_color() {
        let event = RelayEvent::Data {
            text: r#"say "hi" \o/"#.to_string(),
            color: None,
        };
        assert_eq!(
            event.payload_json().expect("json"),
            r#"{"text":"say \"hi\" \\o/"}"#
        );

        let event = RelayEvent::Data {
            text: "ok".to_string(),
            color: Some(Color::Yellow),
        };
        assert_eq!(
            event.payload_json().expect("json"),
            r#"{"text":"ok","color":"yellow"}"#
        );
    }

    #[test]
    fn prompt_and_done_payloads() {
        let prompt = RelayEvent::Prompt(PendingPrompt::new(PromptKind::Ip, "Gateway", ""));
        assert_eq!(prompt.name(), "prompt");
        assert_eq!(
            prompt.payload_json().expect("json"),
            r#"{"kind":"ip","message":"Gateway","default":""}"#
        );

        let done = RelayEvent::Done {
            state: JobState::Failed,
            exit_code: Some(2),
        };
        assert_eq!(done.name(), "done");
        assert_eq!(
            done.payload_json().expect("json"),
            r#"{"state":"failed","exit_code":2}"#
        );
    }
}
