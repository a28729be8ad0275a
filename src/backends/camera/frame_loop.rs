// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle management for producer loops
//!
//! The capture session runs its device reads on a dedicated thread. This
//! controller owns that thread: it starts it, signals it to stop, and joins
//! it. A loop body must return within a bounded time (device reads use a
//! poll timeout) so that a stop request is always observed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Action returned by the loop body to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Continue running the loop
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// Controller for a loop running in a separate, named thread
pub struct CaptureLoopController {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl CaptureLoopController {
    /// Start a loop in a new thread
    ///
    /// `loop_fn` is called repeatedly until it returns [`LoopAction::Stop`]
    /// or a stop is requested.
    pub fn start<F>(name: &str, mut loop_fn: F) -> std::io::Result<Self>
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        Self::start_with_init(name, |_| Ok::<_, String>(()), move |_| loop_fn())
    }

    /// Start a loop whose state is built on the loop thread
    ///
    /// `init_fn` runs once on the new thread. If it fails the thread exits
    /// without running `loop_fn`; reporting the failure is up to `init_fn`.
    /// The stop signal is handed to `init_fn` so long initializations can
    /// bail out early.
    pub fn start_with_init<S, E, I, F>(name: &str, init_fn: I, mut loop_fn: F) -> std::io::Result<Self>
    where
        S: Send + 'static,
        E: std::fmt::Display,
        I: FnOnce(&AtomicBool) -> Result<S, E> + Send + 'static,
        F: FnMut(&mut S) -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();

        info!(name = %name, "Starting loop thread");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut state = match init_fn(&stop_signal_clone) {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(name = %name_clone, error = %e, "Loop initialization failed");
                        return;
                    }
                };

                loop {
                    if stop_signal_clone.load(Ordering::Acquire) {
                        debug!(name = %name_clone, "Stop signal received");
                        break;
                    }
                    if loop_fn(&mut state) == LoopAction::Stop {
                        debug!(name = %name_clone, "Loop requested stop");
                        break;
                    }
                }

                // state (and any device handle inside it) is dropped here,
                // on the loop thread, before join() returns
                drop(state);
                info!(name = %name_clone, "Loop thread exiting");
            })?;

        Ok(Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        })
    }

    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Clone of the stop signal for checks inside long operations
    pub fn stop_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_signal)
    }

    /// Signal the loop to stop (non-blocking)
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting loop stop");
        self.stop_signal.store(true, Ordering::Release);
    }

    /// Stop the loop and wait for the thread to finish
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the thread to finish without sending the stop signal
    ///
    /// Called from the loop thread itself, the handle is detached instead:
    /// the thread exits on its own once the current iteration returns.
    pub fn join(&mut self) {
        let Some(handle) = self.thread_handle.take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            debug!(name = %self.name, "Join requested from loop thread, detaching");
            return;
        }
        debug!(name = %self.name, "Waiting for loop thread to finish");
        if let Err(e) = handle.join() {
            warn!(name = %self.name, "Loop thread panicked: {:?}", e);
        }
    }
}

impl Drop for CaptureLoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "CaptureLoopController dropped, stopping loop");
            self.stop();
        }
    }
}
