//! `StreamEvent` channel to an SSE response.

use std::convert::Infallible;

use axum::{
    http::{HeaderName, HeaderValue},
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::{Stream, StreamExt, stream};
use rag_pipeline::StreamEvent;
use tokio::sync::mpsc;
use tracing::warn;

/// One `data:` frame per event, `{"event": ..., "data": {...}}`.
pub fn to_sse_event(ev: &StreamEvent) -> Event {
    Event::default().json_data(ev).unwrap_or_else(|e| {
        warn!(error = %e, "failed to encode stream event");
        Event::default().data(r#"{"event":"error","data":{"message":"encoding failure"}}"#)
    })
}

/// Leading ping comment, then every event until the pipeline closes the channel.
///
/// Dropping the returned stream drops the receiver, which the pipeline
/// observes as a consumer disconnect.
pub fn event_stream(
    rx: mpsc::Receiver<StreamEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    let ping = stream::once(async { Ok(Event::default().comment("ping")) });
    let events = stream::unfold(rx, |mut rx| async move {
        let ev = rx.recv().await?;
        Some((Ok(to_sse_event(&ev)), rx))
    });
    ping.chain(events)
}

pub fn sse_response(rx: mpsc::Receiver<StreamEvent>) -> impl IntoResponse {
    (
        [(
            HeaderName::from_static("x-accel-buffering"),
            HeaderValue::from_static("no"),
        )],
        Sse::new(event_stream(rx)).keep_alive(KeepAlive::default()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stream_ends_when_channel_closes() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(StreamEvent::Chunk {
            content: "IK".into(),
        })
        .await
        .expect("send");
        drop(tx);
        let items: Vec<_> = event_stream(rx).collect().await;
        assert_eq!(items.len(), 2);
    }
}
