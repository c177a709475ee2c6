// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! The upstream driver (C5): drives a [`rtdb_stream::Stream`] from an
//! external event source, maintaining a private accumulator, a keep-alive
//! timer, and an unbounded exponential-backoff reconnect loop.
//!
//! Callers reach this through [`WatchFirebaseExt::watch_firebase`], which
//! attaches the driver as a tracked background task and returns the stream
//! for chaining.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use rtdb_config::StreamConfig;
use rtdb_error::{ErrorCode, RtdbError};
use rtdb_retry::retry_notify;
use rtdb_stream::Stream;

/// The six event kinds a real-time database subscription may yield.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamEventKind {
    /// A value was written at a path, replacing whatever was there.
    Put,
    /// A shallow merge was applied at a path.
    Patch,
    /// A liveness heartbeat with no document change.
    KeepAlive,
    /// The server cancelled the subscription (e.g. a rules change).
    Cancel,
    /// The subscription's transport closed.
    Closed,
    /// The credentials backing the subscription were revoked mid-stream.
    AuthRevoked,
}

/// One event yielded by an [`UpstreamSource`] subscription.
#[derive(Debug, Clone)]
pub struct UpstreamEvent {
    /// The kind of event this is.
    pub kind: UpstreamEventKind,
    /// For [`UpstreamEventKind::Put`]/[`UpstreamEventKind::Patch`], the
    /// compact JSON bytes of `{"path": <string>, "data": <json>}`. `None`
    /// for every other kind.
    pub payload: Option<Vec<u8>>,
}

impl UpstreamEvent {
    /// Construct a `Put`/`Patch` event from an already-serialised payload.
    #[must_use]
    pub fn with_payload(kind: UpstreamEventKind, payload: Vec<u8>) -> Self {
        Self { kind, payload: Some(payload) }
    }

    /// Construct an event that carries no payload (`KeepAlive`, `Cancel`,
    /// `Closed`, `AuthRevoked`).
    #[must_use]
    pub fn without_payload(kind: UpstreamEventKind) -> Self {
        Self { kind, payload: None }
    }
}

/// An external collaborator the upstream driver subscribes to.
///
/// Each call to [`UpstreamSource::watch`] opens one cancellable subscription;
/// the driver calls it again, from scratch, on every reconnect the backoff
/// controller schedules.
#[async_trait::async_trait]
pub trait UpstreamSource: Send + Sync {
    /// Open a subscription and return the channel its events arrive on. The
    /// channel closing (`recv` returning `None`) is treated the same as a
    /// `Closed` event.
    async fn watch(&self) -> Result<mpsc::Receiver<UpstreamEvent>, RtdbError>;
}

/// Extension trait attaching the upstream driver to a stream.
pub trait WatchFirebaseExt {
    /// Attach `source` as this stream's driver and return the stream for
    /// chaining. Mutually exclusive with `watch_file` (`rtdb-filewatch`) —
    /// attaching both drives the document from two uncoordinated sources.
    #[must_use]
    fn watch_firebase<S>(self, source: S) -> Self
    where
        S: UpstreamSource + 'static;
}

impl WatchFirebaseExt for Stream {
    fn watch_firebase<S>(self, source: S) -> Self
    where
        S: UpstreamSource + 'static,
    {
        let source = Arc::new(source);
        let driven = self.clone();
        self.spawn_tracked(async move { run(driven, source).await });
        self
    }
}

async fn run(stream: Stream, source: Arc<dyn UpstreamSource>) {
    let config = stream.config().clone();
    let accumulator = Arc::new(Mutex::new(Value::Null));
    let notify_stream = stream.clone();

    let notify = move |err: &RtdbError, delay: Duration| {
        tracing::warn!(code = %err.code(), delay_ms = delay.as_millis() as u64, "upstream reconnect scheduled");
        notify_stream.report_error(RtdbError::new(err.code(), err.to_string()));
    };

    let operation = || {
        let stream = stream.clone();
        let source = source.clone();
        let accumulator = accumulator.clone();
        let config = config.clone();
        async move {
            let shutdown = stream.shutdown_token();
            let task = tokio::spawn(async move {
                iteration(&stream, source.as_ref(), &accumulator, &config, &shutdown).await
            });
            match task.await {
                Ok(result) => result,
                Err(join_err) => Err(RtdbError::with_source(
                    ErrorCode::Internal,
                    "upstream iteration panicked",
                    join_err,
                )),
            }
        }
    };

    retry_notify(config.backoff.clone(), operation, notify).await;
}

/// Run a single subscription lifetime: open it, dispatch events until a
/// terminal condition, and report which one. `Ok(())` means shutdown was
/// observed (stop retrying); `Err` means a recoverable failure (retry).
async fn iteration(
    stream: &Stream,
    source: &dyn UpstreamSource,
    accumulator: &Mutex<Value>,
    config: &StreamConfig,
    shutdown: &CancellationToken,
) -> Result<(), RtdbError> {
    let mut events = source
        .watch()
        .await
        .map_err(|err| RtdbError::new(err.code(), format!("failed to watch: {err}")))?;

    let keep_alive = tokio::time::sleep(config.keep_alive_timeout);
    tokio::pin!(keep_alive);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => return Ok(()),
            () = &mut keep_alive => {
                return Err(RtdbError::new(
                    ErrorCode::KeepAliveLapsed,
                    "no event, including a keep-alive, arrived within the keep-alive window",
                ));
            }
            event = events.recv() => {
                let Some(event) = event else {
                    return Err(RtdbError::new(ErrorCode::UpstreamEnded, "streaming ended"));
                };
                // Any event at all — not only a dedicated keep-alive — resets
                // the timer, mirroring the reference implementation's note
                // that keep-alives don't arrive while other values do.
                keep_alive.as_mut().reset(tokio::time::Instant::now() + config.keep_alive_timeout);

                match event.kind {
                    UpstreamEventKind::Cancel => {
                        return Err(RtdbError::new(ErrorCode::UpstreamCancelled, "streaming cancelled"));
                    }
                    UpstreamEventKind::Closed => {
                        return Err(RtdbError::new(ErrorCode::UpstreamClosed, "streaming closed"));
                    }
                    UpstreamEventKind::AuthRevoked => {
                        return Err(RtdbError::new(ErrorCode::UpstreamAuthRevoked, "streaming auth revoked"));
                    }
                    UpstreamEventKind::KeepAlive => {}
                    UpstreamEventKind::Put | UpstreamEventKind::Patch => {
                        apply_event(stream, accumulator, event.kind, event.payload.as_deref()).await;
                    }
                }
            }
        }
    }
}

async fn apply_event(
    stream: &Stream,
    accumulator: &Mutex<Value>,
    kind: UpstreamEventKind,
    payload: Option<&[u8]>,
) {
    let Some(payload) = payload else {
        stream.report_error(RtdbError::new(
            ErrorCode::MalformedPayload,
            "put/patch event carried no payload",
        ));
        return;
    };

    let envelope: Value = match serde_json::from_slice(payload) {
        Ok(value) => value,
        Err(err) => {
            stream.report_error(RtdbError::with_source(
                ErrorCode::MalformedPayload,
                "failed to parse event data",
                err,
            ));
            return;
        }
    };

    let Some(path) = envelope.get("path").and_then(Value::as_str) else {
        stream.report_error(RtdbError::new(
            ErrorCode::MissingPath,
            "failed to parse event path",
        ));
        return;
    };
    let data = envelope.get("data").cloned().unwrap_or(Value::Null);

    let mut guard = accumulator.lock().await;
    let current = std::mem::take(&mut *guard);
    *guard = match kind {
        UpstreamEventKind::Put => rtdb_json::put(current, path, data),
        UpstreamEventKind::Patch => rtdb_json::patch(current, path, data),
        _ => unreachable!("apply_event only called for Put/Patch"),
    };

    match serde_json::to_vec(&*guard) {
        Ok(bytes) => stream.push(bytes),
        Err(err) => stream.report_error(RtdbError::with_source(
            ErrorCode::Internal,
            "failed to marshal accumulator",
            err,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::sync::mpsc;

    struct ScriptedSource {
        batches: StdMutex<Vec<Vec<UpstreamEvent>>>,
        opens: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(batches: Vec<Vec<UpstreamEvent>>) -> Self {
            Self {
                batches: StdMutex::new(batches),
                opens: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl UpstreamSource for ScriptedSource {
        async fn watch(&self) -> Result<mpsc::Receiver<UpstreamEvent>, RtdbError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let batch = {
                let mut batches = self.batches.lock().unwrap();
                if batches.is_empty() {
                    Vec::new()
                } else {
                    batches.remove(0)
                }
            };
            let (tx, rx) = mpsc::channel(8);
            tokio::spawn(async move {
                for event in batch {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            });
            Ok(rx)
        }
    }

    fn put_event(path: &str, data: Value) -> UpstreamEvent {
        let payload = serde_json::to_vec(&json!({"path": path, "data": data})).unwrap();
        UpstreamEvent::with_payload(UpstreamEventKind::Put, payload)
    }

    #[tokio::test]
    async fn applies_put_events_through_to_the_stream() {
        let stream = Stream::new(|_err| {});
        let (cb, calls) = crate::support::recording_callback();
        let _handle = stream.select(["users"]).listen(cb);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let source = ScriptedSource::new(vec![vec![put_event("/users/a", json!(1))]]);
        let driven = stream.clone().watch_firebase(source);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(calls.lock().unwrap().iter().any(|(path, _, curr)| {
            path == &vec!["users".to_string()] && curr.as_deref() == Some(&b"{\"a\":1}"[..])
        }));

        driven.shutdown().await;
    }

    #[tokio::test]
    async fn malformed_payload_is_reported_not_fatal() {
        let reported = Arc::new(StdMutex::new(Vec::new()));
        let recorded = reported.clone();
        let stream = Stream::new(move |err: &RtdbError| recorded.lock().unwrap().push(err.code()));

        let bad = UpstreamEvent::with_payload(UpstreamEventKind::Put, b"not json".to_vec());
        let good = put_event("/a", json!("b"));
        let source = ScriptedSource::new(vec![vec![bad, good]]);
        let driven = stream.watch_firebase(source);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(reported.lock().unwrap().contains(&ErrorCode::MalformedPayload));
        driven.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_during_subscription_stops_the_driver_without_retry() {
        let stream = Stream::new(|_err| {});
        let source = ScriptedSource::new(vec![]);
        let driven = stream.watch_firebase(source);
        tokio::time::sleep(Duration::from_millis(10)).await;
        driven.shutdown().await;
        assert!(driven.is_stopped());
    }
}

#[cfg(test)]
mod support {
    pub(crate) fn recording_callback() -> (
        rtdb_listener::Callback,
        std::sync::Arc<std::sync::Mutex<Vec<(Vec<String>, Option<Vec<u8>>, Option<Vec<u8>>)>>>,
    ) {
        let calls = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorded = calls.clone();
        let cb: rtdb_listener::Callback = Box::new(move |path, prev, curr| {
            recorded.lock().unwrap().push((path.to_vec(), prev, curr));
        });
        (cb, calls)
    }
}
