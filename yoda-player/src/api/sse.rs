//! Server-Sent Events (SSE) broadcaster
//!
//! Streams session transitions to connected clients until shutdown.

use crate::api::AppContext;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};
use yoda_common::YodaEvent;

/// GET /events - SSE event stream
pub async fn event_stream(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!(
        "New SSE client connected ({} subscribers)",
        ctx.events.subscriber_count() + 1
    );

    let stream = BroadcastStream::new(ctx.events.subscribe())
        .take_until(ctx.shutdown.clone().cancelled_owned())
        .filter_map(|result| async move {
            match result {
                Ok(event) => to_sse_event(&event),
                Err(e) => {
                    // Lagged: the client missed events but the stream continues
                    warn!("SSE stream error: {:?}", e);
                    None
                }
            }
        });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_sse_event(event: &YodaEvent) -> Option<Result<Event, Infallible>> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Ok(Event::default().event(event.event_type()).data(json))),
        Err(e) => {
            warn!("Failed to serialize event: {}", e);
            None
        }
    }
}
