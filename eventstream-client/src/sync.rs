//! One-shot signals and the single-assignment error cell.

use std::sync::OnceLock;

use tokio::sync::watch;

use crate::error::StreamError;

/// A signal that fires at most once and can be awaited any number of times.
#[derive(Debug)]
pub(crate) struct Signal {
    tx: watch::Sender<bool>,
}

impl Signal {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Fire the signal. Returns `true` only for the call that fired it.
    pub(crate) fn fire(&self) -> bool {
        self.tx.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        })
    }

    pub(crate) fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the signal has fired.
    pub(crate) async fn fired(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

/// Holds the first terminal error of a stream half.
#[derive(Debug)]
pub(crate) struct OnceErr {
    err: OnceLock<StreamError>,
    set: Signal,
}

impl OnceErr {
    pub(crate) fn new() -> Self {
        Self {
            err: OnceLock::new(),
            set: Signal::new(),
        }
    }

    /// Record `err` unless an error was already recorded.
    pub(crate) fn set(&self, err: StreamError) -> bool {
        let first = self.err.set(err).is_ok();
        if first {
            self.set.fire();
        }
        first
    }

    pub(crate) fn get(&self) -> Option<StreamError> {
        self.err.get().cloned()
    }

    pub(crate) fn result(&self) -> Result<(), StreamError> {
        match self.get() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub(crate) async fn wait(&self) {
        self.set.fired().await
    }
}

/// Lifecycle state shared between a stream half and its background task.
#[derive(Debug)]
pub(crate) struct StreamState {
    /// Fired when closing begins.
    pub(crate) done: Signal,
    /// Fired when the background task has released the connection.
    pub(crate) finished: Signal,
    pub(crate) err: OnceErr,
}

impl StreamState {
    pub(crate) fn new() -> Self {
        Self {
            done: Signal::new(),
            finished: Signal::new(),
            err: OnceErr::new(),
        }
    }
}
