//! Lifecycle events as Server-Sent Events.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use forum_extensions::{LifecycleEvent, LifecycleEventKind};
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

use crate::state::AppState;

fn event_name(event: &LifecycleEvent) -> &'static str {
    match event.kind {
        LifecycleEventKind::Installed => "installed",
        LifecycleEventKind::Uninstalled => "uninstalled",
        LifecycleEventKind::Enabled => "enabled",
        LifecycleEventKind::Disabled => "disabled",
        LifecycleEventKind::Activated => "activated",
    }
}

/// GET /extension/events
///
/// Lagged subscribers silently skip what they missed; clients resync by
/// listing `GET /extension`.
pub async fn stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.lifecycle.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| {
        result.ok().map(|event| {
            let data = serde_json::to_string(&event).unwrap_or_default();
            Ok::<_, Infallible>(Event::default().event(event_name(&event)).data(data))
        })
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
