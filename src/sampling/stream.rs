use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::handlers::AppError;
use crate::refcount::Attachment;
use crate::service::Snapshot;
use crate::AppState;

// ─── GET /api/traffic ────────────────────────────────────────────
/// Returns a single JSON snapshot — useful for curl / debugging.

pub async fn get_traffic(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Snapshot>, AppError> {
    let snapshot = state.sampler.snapshot().await?;
    Ok(Json(Snapshot::clone(&snapshot)))
}

// ─── GET /api/traffic/stream ─────────────────────────────────────
/// Server-Sent Events endpoint.
/// Forwards every snapshot the sampling service broadcasts. The connection
/// counts as an attached consumer for as long as it stays open.

pub async fn traffic_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let consumer = StreamConsumer {
        id: Uuid::new_v4(),
        _attachment: state.subscribers.attach(),
    };
    info!(consumer = %consumer.id, "stream consumer attached");

    // Subscribe first so the requested snapshot is the first event.
    let rx = state.sampler.subscribe();
    if let Err(e) = state.sampler.request_snapshot().await {
        warn!(consumer = %consumer.id, error = %e, "initial snapshot unavailable");
    }

    // `consumer` moves into the closure, so it detaches when the client goes away.
    let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
        Ok(snapshot) => match serde_json::to_string(&*snapshot) {
            Ok(json) => Some(Ok(Event::default().event("snapshot").data(json))),
            Err(e) => {
                warn!(consumer = %consumer.id(), error = %e, "dropping unserializable snapshot");
                None
            }
        },
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            warn!(consumer = %consumer.id(), skipped, "stream consumer lagging");
            None
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Keeps the consumer attached until the SSE stream is dropped.
struct StreamConsumer {
    id: Uuid,
    _attachment: Attachment,
}

impl StreamConsumer {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for StreamConsumer {
    fn drop(&mut self) {
        info!(consumer = %self.id, "stream consumer detached");
    }
}
