//! Server-Sent Events stream for a running job.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use nautilus::io::job::JobHandle;
use nautilus::relay::{OutputRelay, RelayEvent};
use tracing::warn;

/// Encode one relay event as a named SSE event with a JSON body.
fn to_event(event: &RelayEvent) -> Option<Event> {
    match event.payload_json() {
        Ok(json) => Some(Event::default().event(event.name()).data(json)),
        Err(e) => {
            warn!(event = event.name(), err = %e, "failed to encode relay event");
            None
        }
    }
}

/// Follow `job` from its first line until it exits.
pub fn job_events(
    job: JobHandle,
    poll_interval: Duration,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = OutputRelay::new(job, poll_interval)
        .into_stream()
        .filter_map(|event| async move { to_event(&event).map(Ok) });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
