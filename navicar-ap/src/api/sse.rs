//! Server-Sent Events (SSE) broadcaster
//!
//! One stream per client carrying two kinds of events:
//! - `PlaybackState`: the engine snapshot, sent on connect and on every
//!   change (intermediate values may be skipped, the latest never is)
//! - discrete `PlayerEvent`s from the event bus, named by their type

use crate::api::server::AppContext;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream, StreamExt};
use navicar_common::events::{PlaybackSnapshot, PlayerEvent};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tracing::{debug, warn};

/// SSE event name of playback snapshots
pub const SNAPSHOT_EVENT: &str = "PlaybackState";

/// GET /events - SSE event stream
pub async fn event_stream(State(ctx): State<AppContext>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("New SSE client connected");

    let snapshots = WatchStream::new(ctx.playback.subscribe()).filter_map(|snapshot| async move {
        snapshot_event(&snapshot).map(Ok)
    });

    let events = BroadcastStream::new(ctx.events.subscribe()).filter_map(|result| async move {
        match result {
            Ok(event) => bus_event(&event).map(Ok),
            Err(e) => {
                // Lagged: the client missed events but the stream continues
                warn!("SSE stream error: {:?}", e);
                None
            }
        }
    });

    Sse::new(stream::select(snapshots, events)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn snapshot_event(snapshot: &PlaybackSnapshot) -> Option<Event> {
    match Event::default().event(SNAPSHOT_EVENT).json_data(snapshot) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("Failed to serialize snapshot: {}", e);
            None
        }
    }
}

fn bus_event(event: &PlayerEvent) -> Option<Event> {
    match Event::default().event(event.event_type()).json_data(event) {
        Ok(sse) => {
            debug!("Broadcasting SSE event: {}", event.event_type());
            Some(sse)
        }
        Err(e) => {
            warn!("Failed to serialize event: {}", e);
            None
        }
    }
}
