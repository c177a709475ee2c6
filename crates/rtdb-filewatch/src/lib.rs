// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! The file driver (C6): seeds a stream from a JSON file on disk, then
//! watches that file and republishes it on every change.
//!
//! Unlike the upstream driver (`rtdb-upstream`), a read or watch failure is
//! fatal to this driver's own task — it is reported through the stream's
//! error handler and the task exits, but the process is never torn down on
//! the library's behalf (see [`WatchFileExt::watch_file`]).

use std::path::{Path, PathBuf};

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use rtdb_error::{ErrorCode, RtdbError};
use rtdb_stream::Stream;

/// Extension trait attaching the file driver to a stream.
pub trait WatchFileExt {
    /// Seed the stream from `path` and attach a watcher that republishes it
    /// on every change. Returns the stream for chaining. Mutually exclusive
    /// with `watch_firebase` (`rtdb-upstream`).
    #[must_use]
    fn watch_file<P: AsRef<Path>>(self, path: P) -> Self;
}

impl WatchFileExt for Stream {
    fn watch_file<P: AsRef<Path>>(self, path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let driven = self.clone();
        self.spawn_tracked(async move { run(driven, path).await });
        self
    }
}

async fn run(stream: Stream, path: PathBuf) {
    tracing::debug!(path = %path.display(), "seeding stream from file");
    if !publish(&stream, &path).await {
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<notify::Result<notify::Event>>();
    let mut watcher = match RecommendedWatcher::new(
        move |res| {
            let _ = tx.send(res);
        },
        notify::Config::default(),
    ) {
        Ok(watcher) => watcher,
        Err(err) => {
            stream.report_error(RtdbError::with_source(
                ErrorCode::WatchFailed,
                "failed to start file watcher",
                err,
            ));
            return;
        }
    };

    if let Err(err) = watcher.watch(&path, RecursiveMode::NonRecursive) {
        stream.report_error(RtdbError::with_source(
            ErrorCode::WatchFailed,
            "failed to watch file path",
            err,
        ));
        return;
    }

    let shutdown = stream.shutdown_token();
    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                drop(watcher);
                return;
            }
            event = rx.recv() => {
                match event {
                    Some(Ok(event)) if is_relevant(&event) => {
                        tracing::debug!(path = %path.display(), kind = ?event.kind, "file changed, republishing");
                        if !publish(&stream, &path).await {
                            return;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        stream.report_error(RtdbError::with_source(
                            ErrorCode::WatchFailed,
                            "file watcher reported an error",
                            err,
                        ));
                        return;
                    }
                    None => {
                        stream.report_error(RtdbError::new(
                            ErrorCode::WatchFailed,
                            "file watcher event channel closed unexpectedly",
                        ));
                        return;
                    }
                }
            }
        }
    }
}

fn is_relevant(event: &notify::Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Read, compact, and push `path`'s contents. Returns `false` (and has
/// already reported the error) if the read or parse failed.
async fn publish(stream: &Stream, path: &Path) -> bool {
    let contents = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) => {
            stream.report_error(RtdbError::with_source(
                ErrorCode::FileReadFailed,
                format!("failed to read {}", path.display()),
                err,
            ));
            return false;
        }
    };

    let value: serde_json::Value = match serde_json::from_slice(&contents) {
        Ok(value) => value,
        Err(err) => {
            stream.report_error(RtdbError::with_source(
                ErrorCode::MalformedPayload,
                format!("{} did not contain valid JSON", path.display()),
                err,
            ));
            return false;
        }
    };

    match serde_json::to_vec(&value) {
        Ok(bytes) => {
            stream.push(bytes);
            true
        }
        Err(err) => {
            stream.report_error(RtdbError::with_source(
                ErrorCode::Internal,
                "failed to compact file contents",
                err,
            ));
            false
        }
    }
}
