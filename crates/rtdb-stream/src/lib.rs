// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! The stream core (C4) and listener registry (C3).
//!
//! A [`Stream`] owns the single evolving document and the set of registered
//! [`rtdb_listener::Listener`]s. Mutations arrive as compact JSON bytes
//! through the coalescing [`Stream::push`] ingress; a single dispatch task
//! applies each one and runs the two-phase removal/change pass described in
//! `rtdb-listener`. Drivers (`rtdb-upstream`, `rtdb-filewatch`) are external
//! to this crate — they only need [`Stream::push`], [`Stream::shutdown_token`],
//! [`Stream::spawn_tracked`] and [`Stream::report_error`].

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use rtdb_config::StreamConfig;
pub use rtdb_listener::Callback;
use rtdb_listener::Listener;
use rtdb_error::{ErrorCode, RtdbError};
use rtdb_pattern::{subtree, Pattern};

struct StoredListener {
    id: u64,
    listener: Listener,
}

struct DispatchState {
    value: Value,
    listeners: Vec<StoredListener>,
}

struct StreamInner {
    state: Mutex<DispatchState>,
    ingress: Mutex<Option<Vec<u8>>>,
    ingress_notify: Notify,
    shutdown: CancellationToken,
    stopped: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    next_listener_id: AtomicU64,
    error_handler: Arc<dyn Fn(&RtdbError) + Send + Sync>,
    config: StreamConfig,
}

/// A streaming JSON document.
///
/// Cloning a [`Stream`] is cheap (an `Arc` clone); every clone shares the
/// same document, listener set, and ingress. A stream is usable the moment
/// it is constructed — no driver is required to `push` or `listen` against
/// it, though in practice one of `rtdb-upstream`'s or `rtdb-filewatch`'s
/// drivers supplies the document.
#[derive(Clone)]
pub struct Stream {
    inner: Arc<StreamInner>,
}

/// Handle to a registered listener.
///
/// Dropping this handle does **not** unregister the listener — call
/// [`ListenerHandle::shutdown`] to do that and receive the one synthetic
/// removal dispatch the reference contract promises.
pub struct ListenerHandle {
    stream: Stream,
    id: u64,
}

/// A `(stream, path-prefix)` pair. A pure value — deriving a cursor with
/// [`Stream::select`] or [`Cursor::select`] registers nothing.
#[derive(Clone)]
pub struct Cursor {
    stream: Stream,
    path: Vec<String>,
}

impl Stream {
    /// Construct a new, empty stream with default [`StreamConfig`].
    #[must_use]
    pub fn new(error_handler: impl Fn(&RtdbError) + Send + Sync + 'static) -> Self {
        Self::with_config(StreamConfig::default(), error_handler)
    }

    /// Construct a new stream with explicit configuration.
    #[must_use]
    pub fn with_config(
        config: StreamConfig,
        error_handler: impl Fn(&RtdbError) + Send + Sync + 'static,
    ) -> Self {
        let inner = Arc::new(StreamInner {
            state: Mutex::new(DispatchState {
                value: Value::Null,
                listeners: Vec::new(),
            }),
            ingress: Mutex::new(None),
            ingress_notify: Notify::new(),
            shutdown: CancellationToken::new(),
            stopped: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(0),
            error_handler: Arc::new(error_handler),
            config,
        });
        let stream = Stream { inner };
        let dispatch_loop = stream.clone();
        let handle = tokio::spawn(async move { dispatch_loop.run_dispatch_loop().await });
        stream.inner.tasks.lock().expect("task registry poisoned").push(handle);
        stream
    }

    /// The configuration this stream was built with.
    #[must_use]
    pub fn config(&self) -> &StreamConfig {
        &self.inner.config
    }

    /// The cancellation token drivers select against to detect shutdown.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// `true` once [`Stream::shutdown`] has run.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Spawn `future` as a task [`Stream::shutdown`] waits for before
    /// returning. Intended for drivers (one long-lived task each) and
    /// error-publishing tasks, mirroring the reference implementation's
    /// `Async`/`wg.Add(1)` pattern.
    pub fn spawn_tracked<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.inner.tasks.lock().expect("task registry poisoned").push(handle);
    }

    /// Report an error through the stream's error handler on its own tracked
    /// task, so a slow or panicking handler never stalls the caller
    /// (mirrors the reference implementation's `pubError`).
    pub fn report_error(&self, error: RtdbError) {
        let handler = self.inner.error_handler.clone();
        self.spawn_tracked(async move {
            handler(&error);
        });
    }

    /// Push a new document snapshot (compact JSON bytes) into the
    /// coalescing ingress. If a document is already pending, it is
    /// overwritten — only the most recently pushed document is ever
    /// dispatched. A no-op once the stream is stopped.
    pub fn push(&self, document: Vec<u8>) {
        if self.is_stopped() {
            return;
        }
        *self.inner.ingress.lock().expect("ingress lock poisoned") = Some(document);
        self.inner.ingress_notify.notify_one();
    }

    async fn run_dispatch_loop(self) {
        loop {
            let pending = self.inner.ingress.lock().expect("ingress lock poisoned").take();
            if let Some(bytes) = pending {
                self.process_single(bytes);
                continue;
            }
            tokio::select! {
                _ = self.inner.shutdown.cancelled() => return,
                _ = self.inner.ingress_notify.notified() => {}
            }
        }
    }

    fn process_single(&self, bytes: Vec<u8>) {
        let document: Value = match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(err) => {
                self.report_error(RtdbError::with_source(
                    ErrorCode::MalformedPayload,
                    "pushed document was not valid JSON",
                    err,
                ));
                return;
            }
        };

        let mut state = self.inner.state.lock().expect("dispatch state poisoned");
        state.value = document.clone();
        tracing::debug!(
            bytes = bytes.len(),
            listeners = state.listeners.len(),
            "dispatching document"
        );

        for stored in state.listeners.iter().rev() {
            stored.listener.process_remove(&document);
        }
        for stored in state.listeners.iter_mut() {
            stored.listener.process_change(&document);
        }
    }

    /// Register a new listener against `pattern`. Its `last_seen` starts as
    /// the empty object, so it is scheduled for an immediate refresh
    /// dispatch that catches it up with the current document. A no-op
    /// (returns a handle that removes nothing) once the stream is stopped.
    pub fn listen<I, S>(&self, pattern: I, callback: Callback) -> ListenerHandle
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let pattern = Pattern::new(pattern);
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst);
        if !self.is_stopped() {
            let mut state = self.inner.state.lock().expect("dispatch state poisoned");
            state.listeners.push(StoredListener {
                id,
                listener: Listener::new(pattern, callback),
            });
        }
        self.refresh();
        ListenerHandle {
            stream: self.clone(),
            id,
        }
    }

    /// Re-push the current document so every listener re-evaluates against
    /// it — used to catch up a freshly registered listener.
    fn refresh(&self) {
        let bytes = {
            let state = self.inner.state.lock().expect("dispatch state poisoned");
            serde_json::to_vec(&state.value).unwrap_or_default()
        };
        self.push(bytes);
    }

    fn remove_listener(&self, id: u64) {
        let removed = {
            let mut state = self.inner.state.lock().expect("dispatch state poisoned");
            state
                .listeners
                .iter()
                .position(|l| l.id == id)
                .map(|idx| state.listeners.remove(idx))
        };
        if let Some(stored) = removed {
            stored.listener.synthetic_removal();
        }
    }

    /// Obtain a cursor rooted at `path`.
    #[must_use]
    pub fn select<I, S>(&self, path: I) -> Cursor
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Cursor {
            stream: self.clone(),
            path: path.into_iter().map(|s| s.as_ref().to_owned()).collect(),
        }
    }

    /// Idempotently terminate the stream: signals shutdown to every driver,
    /// removes every listener (delivering one synthetic removal dispatch
    /// each, computed directly from the listener's own `last_seen` per
    /// REDESIGN FLAG R3), and waits for every tracked task to finish.
    pub async fn shutdown(&self) {
        if self
            .inner
            .stopped
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        self.inner.shutdown.cancel();
        self.inner.ingress_notify.notify_waiters();

        let removed = {
            let mut state = self.inner.state.lock().expect("dispatch state poisoned");
            let mut removed = Vec::with_capacity(state.listeners.len());
            while let Some(stored) = state.listeners.pop() {
                removed.push(stored.listener);
            }
            removed
        };
        for listener in &removed {
            listener.synthetic_removal();
        }

        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = self.inner.tasks.lock().expect("task registry poisoned");
            std::mem::take(&mut *tasks)
        };
        for handle in handles {
            let _ = handle.await;
        }
    }
}

impl ListenerHandle {
    /// Remove this listener from the stream, delivering one synthetic
    /// removal dispatch for every path it last observed. A no-op if the
    /// stream (or this listener) was already shut down.
    pub fn shutdown(self) {
        self.stream.remove_listener(self.id);
    }
}

impl Cursor {
    /// Extend this cursor's path with additional segments.
    #[must_use]
    pub fn select<I, S>(&self, more: I) -> Cursor
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut path = self.path.clone();
        path.extend(more.into_iter().map(|s| s.as_ref().to_owned()));
        Cursor {
            stream: self.stream.clone(),
            path,
        }
    }

    /// Register a listener whose pattern is this cursor's path.
    pub fn listen(&self, callback: Callback) -> ListenerHandle {
        self.stream.listen(self.path.clone(), callback)
    }

    /// Snapshot the subtree at this cursor's path as compact JSON bytes, or
    /// `None` if nothing exists there.
    #[must_use]
    pub fn value(&self) -> Option<Vec<u8>> {
        let state = self.stream.inner.state.lock().expect("dispatch state poisoned");
        subtree(&state.value, &self.path).map(|v| serde_json::to_vec(v).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    type Call = (Vec<String>, Option<Vec<u8>>, Option<Vec<u8>>);

    fn recording_callback() -> (Callback, Arc<StdMutex<Vec<Call>>>) {
        let calls = Arc::new(StdMutex::new(Vec::new()));
        let recorded = calls.clone();
        let cb: Callback = Box::new(move |path, prev, curr| {
            recorded.lock().unwrap().push((path.to_vec(), prev, curr));
        });
        (cb, calls)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn listener_lifecycle_end_to_end() {
        let stream = Stream::new(|_err| {});
        let (cb, calls) = recording_callback();
        let _handle = stream.listen(["users", "*"], cb);
        settle().await;
        calls.lock().unwrap().clear();

        stream.push(serde_json::to_vec(&json!({"users": {"a": 1}})).unwrap());
        settle().await;
        {
            let c = calls.lock().unwrap();
            assert_eq!(c.len(), 1);
            assert_eq!(c[0].0, vec!["users".to_string(), "a".to_string()]);
            assert_eq!(c[0].2, Some(b"1".to_vec()));
        }

        calls.lock().unwrap().clear();
        stream.push(serde_json::to_vec(&json!({"users": {"a": 1, "b": 2}})).unwrap());
        settle().await;
        {
            let c = calls.lock().unwrap();
            assert_eq!(c.len(), 1);
            assert_eq!(c[0].0, vec!["users".to_string(), "b".to_string()]);
        }

        calls.lock().unwrap().clear();
        stream.shutdown().await;
        {
            let c = calls.lock().unwrap();
            assert_eq!(c.len(), 1);
            assert_eq!(c[0].2, None);
        }
    }

    #[tokio::test]
    async fn coalescing_push_keeps_only_latest() {
        let stream = Stream::new(|_err| {});
        let (cb, calls) = recording_callback();
        let _handle = stream.listen(["*"], cb);
        settle().await;
        calls.lock().unwrap().clear();

        stream.push(serde_json::to_vec(&json!({"a": 1})).unwrap());
        stream.push(serde_json::to_vec(&json!({"b": 2})).unwrap());
        settle().await;

        let c = calls.lock().unwrap();
        assert!(c.iter().any(|(path, _, curr)| path == &vec!["b".to_string()]
            && curr == &Some(b"2".to_vec())));
        assert!(!c.iter().any(|(path, _, _)| path == &vec!["a".to_string()]));
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let stream = Stream::new(|_err| {});
        stream.shutdown().await;
        stream.shutdown().await;
        assert!(stream.is_stopped());
    }

    #[tokio::test]
    async fn push_after_shutdown_is_noop() {
        let stream = Stream::new(|_err| {});
        stream.shutdown().await;
        stream.push(serde_json::to_vec(&json!({"a": 1})).unwrap());
        settle().await;
    }

    #[tokio::test]
    async fn cursor_value_snapshots_subtree() {
        let stream = Stream::new(|_err| {});
        stream.push(serde_json::to_vec(&json!({"foo": {"bar": "buz"}})).unwrap());
        settle().await;
        let cursor = stream.select(["foo"]).select(["bar"]);
        assert_eq!(cursor.value(), Some(b"\"buz\"".to_vec()));
        assert_eq!(stream.select(["missing"]).value(), None);
    }

    #[tokio::test]
    async fn two_listeners_fire_in_registration_order() {
        let stream = Stream::new(|_err| {});
        let order = Arc::new(StdMutex::new(Vec::new()));
        let o1 = order.clone();
        let _h1 = stream.listen(["a"], Box::new(move |_, _, _| o1.lock().unwrap().push(1)));
        let o2 = order.clone();
        let _h2 = stream.listen(["a"], Box::new(move |_, _, _| o2.lock().unwrap().push(2)));
        settle().await;
        order.lock().unwrap().clear();

        stream.push(serde_json::to_vec(&json!({"a": "x"})).unwrap());
        settle().await;

        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }
}
