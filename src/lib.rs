// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! A streaming change-propagation engine for a realtime hierarchical JSON
//! database, plus the service-account auth glue that authenticates its
//! upstream connection.
//!
//! This crate is a thin facade over the workspace's component crates; it
//! exists so a caller can depend on one crate and reach the whole external
//! surface:
//!
//! ```no_run
//! use rtdb_sync::{Stream, WatchFileExt};
//!
//! # async fn run() {
//! let stream = Stream::new(|err| eprintln!("stream error: {err}"))
//!     .watch_file("/tmp/document.json");
//!
//! let _handle = stream.select(["users"]).listen(Box::new(|path, prev, curr| {
//!     println!("{path:?}: {prev:?} -> {curr:?}");
//! }));
//!
//! stream.shutdown().await;
//! # }
//! ```
//!
//! Attach a live database instead of a file with
//! [`rtdb_upstream::WatchFirebaseExt::watch_firebase`] (re-exported here as
//! [`WatchFirebaseExt`]), feeding it any type implementing
//! [`rtdb_upstream::UpstreamSource`].

pub use rtdb_config::{BackoffConfig, StreamConfig, StreamConfigBuilder};
pub use rtdb_error::{ErrorCategory, ErrorCode, RtdbError};
pub use rtdb_json::{patch, put};
pub use rtdb_listener::Callback;
pub use rtdb_pattern::{matches, Pattern, Segment};
pub use rtdb_stream::{Cursor, ListenerHandle, Stream};

pub use rtdb_auth::{
    custom_token_from_service_account, id_token_from_custom_token, BearerToken, ServiceAccount,
};
pub use rtdb_filewatch::WatchFileExt;
pub use rtdb_upstream::{UpstreamEvent, UpstreamEventKind, UpstreamSource, WatchFirebaseExt};
