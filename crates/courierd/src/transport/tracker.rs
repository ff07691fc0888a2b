//! Bookkeeping for open connections so shutdown can drain them.

use std::collections::HashMap;
use std::io;
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use super::TRANSPORT_TARGET;

/// Result of waiting for connections to finish.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DrainOutcome {
    /// Connections accepted over the tracker's lifetime.
    pub(crate) served: usize,
    /// Connections still open when the wait gave up.
    pub(crate) abandoned: usize,
}

#[derive(Debug, Default)]
struct TrackerState {
    next_id: u64,
    served: usize,
    open: HashMap<u64, UnixStream>,
}

#[derive(Debug, Default)]
struct TrackerInner {
    state: Mutex<TrackerState>,
    drained: Condvar,
}

impl TrackerInner {
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared registry of live connection streams.
#[derive(Debug, Default, Clone)]
pub(crate) struct ConnectionTracker {
    inner: Arc<TrackerInner>,
}

impl ConnectionTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records `stream` as open until the returned guard drops.
    pub(crate) fn register(&self, stream: &UnixStream) -> io::Result<ConnectionGuard> {
        let handle = stream.try_clone()?;
        let mut state = self.inner.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.served += 1;
        state.open.insert(id, handle);
        Ok(ConnectionGuard {
            id,
            inner: Arc::clone(&self.inner),
        })
    }

    /// Number of connections currently open.
    #[cfg(test)]
    pub(crate) fn open(&self) -> usize {
        self.inner.lock().open.len()
    }

    /// Shuts down the read half of every open connection.
    ///
    /// Each connection finishes the envelope it is processing, writes the
    /// outcome and then observes end of stream.
    pub(crate) fn close_reads(&self) {
        let state = self.inner.lock();
        for stream in state.open.values() {
            if let Err(error) = stream.shutdown(Shutdown::Read)
                && error.kind() != io::ErrorKind::NotConnected
            {
                debug!(
                    target: TRANSPORT_TARGET,
                    error = %error,
                    "failed to shut down connection read half"
                );
            }
        }
    }

    /// Blocks until every connection has closed or `timeout` elapses.
    pub(crate) fn wait_drained(&self, timeout: Duration) -> DrainOutcome {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.lock();
        while !state.open.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            state = match self.inner.drained.wait_timeout(state, remaining) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        DrainOutcome {
            served: state.served,
            abandoned: state.open.len(),
        }
    }
}

/// Unregisters a connection when dropped.
#[derive(Debug)]
pub(crate) struct ConnectionGuard {
    id: u64,
    inner: Arc<TrackerInner>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let mut state = self.inner.lock();
        state.open.remove(&self.id);
        if state.open.is_empty() {
            self.inner.drained.notify_all();
        }
    }
}
