//! Server-sent change feed

use std::convert::Infallible;

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use serde::Deserialize;
use tokio_stream::{
    wrappers::{errors::BroadcastStreamRecvError, BroadcastStream},
    Stream, StreamExt,
};
use utoipa::IntoParams;

use crate::{
    error::{AppError, AppResult},
    services::changes::{parse_kinds, ChangeEvent},
};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EventsQuery {
    /// Comma-separated entity kinds (books, copies, borrow_requests, loans); all when omitted
    pub entities: Option<String>,
}

/// Subscribe to committed changes
#[utoipa::path(
    get,
    path = "/events",
    tag = "events",
    params(EventsQuery),
    responses(
        (status = 200, description = "Stream of change events", content_type = "text/event-stream", body = ChangeEvent),
        (status = 400, description = "Unknown entity kind")
    )
)]
pub async fn stream_events(
    State(state): State<crate::AppState>,
    Query(query): Query<EventsQuery>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let kinds = parse_kinds(query.entities.as_deref()).map_err(AppError::BadRequest)?;

    let stream = BroadcastStream::new(state.services.changes.subscribe()).filter_map(move |message| {
        match message {
            Ok(change) if kinds.contains(&change.entity) => Event::default()
                .event(change.entity.as_str())
                .json_data(&change)
                .ok()
                .map(Ok),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Change feed subscriber lagged, events dropped");
                None
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
