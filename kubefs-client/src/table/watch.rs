use std::future::Future;

use futures::{stream, Stream, StreamExt};
use k8s_openapi::serde_json::{self, Value};
use kube::api::DynamicObject;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{is_table, row_from_object, rows_from_table, RawWatchEvent, Table, WatchStatus};
use crate::error::Result;
use crate::row::Row;

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Added,
    Modified,
    Deleted,
    Bookmark,
    Error,
}

/// A watch event narrowed to a single row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowEvent {
    Added(Row),
    Modified(Row),
    Deleted(Row),
    Bookmark(Value),
    Error(WatchStatus),
}

impl RowEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            RowEvent::Added(_) => EventType::Added,
            RowEvent::Modified(_) => EventType::Modified,
            RowEvent::Deleted(_) => EventType::Deleted,
            RowEvent::Bookmark(_) => EventType::Bookmark,
            RowEvent::Error(_) => EventType::Error,
        }
    }

    pub fn row(&self) -> Option<&Row> {
        match self {
            RowEvent::Added(r) | RowEvent::Modified(r) | RowEvent::Deleted(r) => Some(r),
            _ => None,
        }
    }
}

/// Splits one watch line into row events.
///
/// A table payload with N rows becomes N events of the same type, in row
/// order. A plain object becomes one event. Anything undecodable becomes a
/// single error event so the stream keeps going.
pub fn demux_line(kind: &str, line: &str) -> Vec<RowEvent> {
    let raw: RawWatchEvent = match serde_json::from_str(line) {
        Ok(raw) => raw,
        Err(e) => return vec![decode_error(format!("watch event: {e}"))],
    };

    let wrap: fn(Row) -> RowEvent = match raw.type_.as_str() {
        "ADDED" => RowEvent::Added,
        "MODIFIED" => RowEvent::Modified,
        "DELETED" => RowEvent::Deleted,
        "BOOKMARK" => return vec![RowEvent::Bookmark(raw.object)],
        "ERROR" => {
            let mut status: WatchStatus = serde_json::from_value(raw.object.clone())
                .unwrap_or_else(|e| WatchStatus::decode_failure(format!("error status: {e}")));
            status.raw = raw.object;
            return vec![RowEvent::Error(status)];
        }
        other => return vec![decode_error(format!("unknown watch event type {other}"))],
    };

    match rows_of(kind, raw.object) {
        Ok(rows) => rows.into_iter().map(wrap).collect(),
        Err(e) => vec![decode_error(e.to_string())],
    }
}

fn rows_of(kind: &str, object: Value) -> Result<Vec<Row>> {
    if is_table(&object) {
        let table: Table = serde_json::from_value(object)?;
        return Ok(rows_from_table(kind, table)?.rows);
    }
    let obj: DynamicObject = serde_json::from_value(object)?;
    Ok(vec![row_from_object(kind, obj)])
}

fn decode_error(message: String) -> RowEvent {
    tracing::warn!(%message, "undecodable watch event");
    RowEvent::Error(WatchStatus::decode_failure(message))
}

/// Row events for a stream of watch lines, preserving line and row order.
pub fn demux_lines<S>(kind: String, lines: S) -> impl Stream<Item = RowEvent>
where
    S: Stream<Item = std::io::Result<String>>,
{
    lines.flat_map(move |line| {
        let events = match line {
            Ok(line) if line.trim().is_empty() => Vec::new(),
            Ok(line) => demux_line(&kind, &line),
            Err(e) => vec![RowEvent::Error(WatchStatus::transport_failure(e.to_string()))],
        };
        stream::iter(events)
    })
}

/// Producer side of a [`RowWatch`].
pub struct RowSink {
    tx: mpsc::Sender<RowEvent>,
    cancel: CancellationToken,
    kind: String,
}

impl RowSink {
    /// False once the watch was stopped or the consumer went away.
    pub async fn emit(&self, event: RowEvent) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.tx.send(event) => sent.is_ok(),
        }
    }

    /// Demultiplexes `lines` into the watch until it ends or the watch stops.
    /// A transport error is reported once and ends the stream.
    pub async fn forward<S>(&self, lines: S)
    where
        S: Stream<Item = std::io::Result<String>>,
    {
        futures::pin_mut!(lines);
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                next = lines.next() => next,
            };

            let events = match next {
                Some(Ok(line)) if line.trim().is_empty() => continue,
                Some(Ok(line)) => demux_line(&self.kind, &line),
                Some(Err(e)) => {
                    tracing::warn!(kind = %self.kind, error = %e, "watch stream failed");
                    self.emit(RowEvent::Error(WatchStatus::transport_failure(e.to_string())))
                        .await;
                    return;
                }
                None => return,
            };

            for event in events {
                if !self.emit(event).await {
                    return;
                }
            }
        }
    }
}

/// A running watch. Events are buffered; `stop` (or dropping the watch)
/// releases the underlying stream.
pub struct RowWatch {
    rx: mpsc::Receiver<RowEvent>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RowWatch {
    pub fn start<F, Fut>(kind: impl Into<String>, producer: F) -> Self
    where
        F: FnOnce(RowSink) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();
        let sink = RowSink {
            tx,
            cancel: cancel.clone(),
            kind: kind.into(),
        };

        let fut = producer(sink);
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = fut => {}
            }
        });

        Self {
            rx,
            cancel,
            task: Some(task),
        }
    }

    pub fn from_lines<S>(kind: impl Into<String>, lines: S) -> Self
    where
        S: Stream<Item = std::io::Result<String>> + Send + 'static,
    {
        Self::start(kind, move |sink| async move { sink.forward(lines).await })
    }

    /// Next event, or `None` once the watch has ended or was stopped.
    pub async fn next(&mut self) -> Option<RowEvent> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.rx.recv().await
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Idempotent. Events still buffered are discarded.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }
}

impl Drop for RowWatch {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn table_event(kind: &str, names: &[&str]) -> String {
        let rows: Vec<Value> = names
            .iter()
            .map(|n| {
                json!({
                    "cells": [n, "Running"],
                    "object": {"metadata": {"name": n, "namespace": "prod"}}
                })
            })
            .collect();
        json!({
            "type": kind,
            "object": {
                "kind": "Table",
                "apiVersion": "meta.k8s.io/v1",
                "columnDefinitions": [
                    {"name": "Name", "type": "string", "priority": 0},
                    {"name": "Status", "type": "string", "priority": 0}
                ],
                "rows": rows
            }
        })
        .to_string()
    }

    fn names(events: &[RowEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| e.row().and_then(|r| r.meta.name.clone()))
            .collect()
    }

    #[test]
    fn test_table_event_fans_out_in_order() {
        let events = demux_line("Pod", &table_event("MODIFIED", &["a", "b", "c"]));
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.event_type() == EventType::Modified));
        assert_eq!(names(&events), vec!["a", "b", "c"]);
        assert!(events.iter().all(|e| e.row().unwrap().cells.len() == 2));
    }

    #[test]
    fn test_plain_object_is_one_row() {
        let line = json!({
            "type": "DELETED",
            "object": {"apiVersion": "v1", "kind": "Pod", "metadata": {"name": "web-0", "namespace": "prod"}}
        })
        .to_string();
        let events = demux_line("Pod", &line);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), EventType::Deleted);
        assert_eq!(events[0].row().unwrap().id(&[]), "prod/web-0");
    }

    #[test]
    fn test_error_and_bookmark_pass_through() {
        let error = json!({
            "type": "ERROR",
            "object": {"kind": "Status", "status": "Failure", "message": "too old resource version", "reason": "Expired", "code": 410}
        })
        .to_string();
        match demux_line("Pod", &error).as_slice() {
            [RowEvent::Error(status)] => {
                assert_eq!(status.code, 410);
                assert_eq!(status.reason, "Expired");
                assert_eq!(status.raw["kind"], "Status");
            }
            other => panic!("unexpected events: {other:?}"),
        }

        let bookmark = json!({
            "type": "BOOKMARK",
            "object": {"kind": "Pod", "metadata": {"resourceVersion": "12"}}
        })
        .to_string();
        let events = demux_line("Pod", &bookmark);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), EventType::Bookmark);
    }

    #[test]
    fn test_error_keeps_server_details() {
        let object = json!({
            "kind": "Status",
            "apiVersion": "v1",
            "status": "Failure",
            "message": "pods is forbidden",
            "reason": "Forbidden",
            "code": 403,
            "details": {"kind": "pods", "causes": [{"reason": "FieldValueInvalid", "field": "spec"}]}
        });
        let line = json!({"type": "ERROR", "object": object.clone()}).to_string();
        match demux_line("Pod", &line).as_slice() {
            [RowEvent::Error(status)] => {
                assert_eq!(status.code, 403);
                assert_eq!(status.raw, object);
                assert_eq!(status.raw["details"]["causes"][0]["field"], "spec");
            }
            other => panic!("unexpected events: {other:?}"),
        }

        let undecodable = json!({"type": "ERROR", "object": {"code": "not a number"}}).to_string();
        match demux_line("Pod", &undecodable).as_slice() {
            [RowEvent::Error(status)] => {
                assert_eq!(status.reason, "DecodeError");
                assert_eq!(status.raw["code"], "not a number");
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn test_garbage_becomes_error_event() {
        let events = demux_line("Pod", "{not json");
        match events.as_slice() {
            [RowEvent::Error(status)] => assert_eq!(status.reason, "DecodeError"),
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stream_keeps_line_order() {
        let lines = stream::iter(vec![
            Ok(table_event("ADDED", &["a", "b"])),
            Ok(String::new()),
            Ok("garbage".to_string()),
            Ok(table_event("DELETED", &["c"])),
        ]);
        let events: Vec<RowEvent> = demux_lines("Pod".into(), lines).collect().await;
        let types: Vec<EventType> = events.iter().map(RowEvent::event_type).collect();
        assert_eq!(
            types,
            vec![
                EventType::Added,
                EventType::Added,
                EventType::Error,
                EventType::Deleted
            ]
        );
        assert_eq!(names(&events), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_watch_ends_with_upstream() {
        let lines = stream::iter(vec![Ok(table_event("ADDED", &["a", "b"]))]);
        let mut watch = RowWatch::from_lines("Pod", lines);

        let mut seen = Vec::new();
        while let Some(event) = watch.next().await {
            seen.push(event);
        }
        assert_eq!(names(&seen), vec!["a", "b"]);
    }

    struct Released(Arc<AtomicBool>);

    impl Drop for Released {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_stop_releases_stream_and_is_idempotent() {
        let released = Arc::new(AtomicBool::new(false));
        let guard = Released(released.clone());
        let lines = stream::once(async { Ok(table_event("ADDED", &["a"])) })
            .chain(stream::pending::<std::io::Result<String>>())
            .map(move |line| {
                let _keep = &guard;
                line
            });

        let mut watch = RowWatch::from_lines("Pod", lines);
        assert_eq!(watch.next().await.map(|e| e.event_type()), Some(EventType::Added));

        watch.stop();
        watch.stop();
        assert!(watch.is_stopped());
        assert!(watch.next().await.is_none());

        tokio::time::timeout(Duration::from_secs(1), async {
            while !released.load(Ordering::SeqCst) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("stream released");
    }

    #[tokio::test]
    async fn test_stop_discards_buffered_rows() {
        let lines = stream::once(async { Ok(table_event("ADDED", &["a", "b", "c"])) })
            .chain(stream::pending::<std::io::Result<String>>());
        let mut watch = RowWatch::from_lines("Pod", lines);
        let first = watch.next().await.unwrap();
        assert_eq!(names(&[first]), vec!["a"]);
        // the rest of the table is already buffered
        tokio::time::sleep(Duration::from_millis(20)).await;

        watch.stop();
        assert!(watch.next().await.is_none());
    }
}
