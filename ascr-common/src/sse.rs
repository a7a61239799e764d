//! Server-Sent Events (SSE) utilities
//!
//! Turns an [`EventBus`] subscription into an SSE response for live task
//! progress. Subscribers only receive events published after they connect;
//! the task tracker remains the durable source of truth.

use crate::events::{AscrEvent, EventBus};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Stream of bus events, optionally restricted to one task
///
/// Ends when the bus is dropped. Lagged receivers skip the dropped events and
/// keep going.
pub fn event_stream(
    event_bus: &EventBus,
    task_filter: Option<String>,
) -> impl Stream<Item = AscrEvent> {
    let mut rx = event_bus.subscribe();

    async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if task_filter.as_deref().map_or(true, |id| id == event.task_id()) {
                        yield event;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("SSE: subscriber lagged, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => {
                    debug!("SSE: event bus closed");
                    break;
                }
            }
        }
    }
}

/// Create an SSE response carrying task events
///
/// # Example
/// ```rust,ignore
/// pub async fn task_events(
///     State(state): State<AppState>,
/// ) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
///     ascr_common::sse::create_event_sse_stream(&state.event_bus, None)
/// }
/// ```
pub fn create_event_sse_stream(
    event_bus: &EventBus,
    task_filter: Option<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to task events");

    let events = event_stream(event_bus, task_filter);
    let stream = async_stream::stream! {
        yield Ok(Event::default().event("ConnectionStatus").data("connected"));

        futures::pin_mut!(events);
        while let Some(event) = futures::StreamExt::next(&mut events).await {
            let sse = Event::default().event(event.event_type());
            match sse.json_data(&event) {
                Ok(sse) => yield Ok(sse),
                Err(e) => warn!("SSE: failed to encode {}: {}", event.event_type(), e),
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
