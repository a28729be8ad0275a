// SPDX-License-Identifier: GPL-3.0-only

//! Process-wide stream handles
//!
//! External readers address an image stream by an integer handle instead of
//! holding the session. Entries hold the channel weakly, so a handle that
//! outlives its session resolves to [`SessionError::StreamNotFound`].

use super::SessionId;
use crate::errors::{SessionError, SessionResult};
use crate::pipelines::stream::{FrameNotifier, StreamExportChannel, StreamReader};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::debug;

struct Entry {
    session: SessionId,
    channel: Weak<StreamExportChannel>,
}

static STREAMS: Lazy<Mutex<HashMap<i64, Entry>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Handles start at 1; 0 is never issued
static NEXT_HANDLE: AtomicI64 = AtomicI64::new(1);

fn streams() -> MutexGuard<'static, HashMap<i64, Entry>> {
    STREAMS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Issue a handle for `channel`
pub fn register(channel: &Arc<StreamExportChannel>) -> i64 {
    let handle = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
    let session = channel.session_id();
    streams().insert(
        handle,
        Entry {
            session,
            channel: Arc::downgrade(channel),
        },
    );
    debug!(handle, %session, "Stream handle registered");
    handle
}

/// Remove `handle` if it belongs to `session`
pub fn unregister(session: SessionId, handle: i64) -> SessionResult<()> {
    let mut streams = streams();
    match streams.get(&handle) {
        Some(entry) if entry.session == session => {
            streams.remove(&handle);
            debug!(handle, %session, "Stream handle released");
            Ok(())
        }
        _ => Err(SessionError::StreamNotFound(handle)),
    }
}

/// Remove every handle of `session`; returns how many were removed
pub fn release_session(session: SessionId) -> usize {
    let mut streams = streams();
    let before = streams.len();
    streams.retain(|_, entry| entry.session != session);
    before - streams.len()
}

/// Resolve a handle to its live channel
pub fn lookup(handle: i64) -> SessionResult<Arc<StreamExportChannel>> {
    streams()
        .get(&handle)
        .and_then(|entry| entry.channel.upgrade())
        .ok_or(SessionError::StreamNotFound(handle))
}

/// Reader for the stream behind `handle`
pub fn open_reader(handle: i64) -> SessionResult<StreamReader> {
    lookup(handle).map(StreamReader::new)
}

/// Switch the stream to callback notification
pub fn register_callback(handle: i64, callback: FrameNotifier) -> SessionResult<()> {
    lookup(handle)?.register_callback(callback);
    Ok(())
}

/// Switch the stream back to the push fallback
pub fn unregister_callback(handle: i64) -> SessionResult<()> {
    lookup(handle)?.unregister_callback();
    Ok(())
}
