//! Registry of in-flight build cancellation tokens.
//!
//! Every build task registers its token here before it is spawned. On
//! shutdown the signal coordinator drains the registry once and cancels every
//! token. Entries are never removed individually: cancelling a token whose
//! build already finished is a no-op, and the registry lives exactly as long
//! as the process.

use std::sync::Mutex;

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Thread-safe, append-only list of cancellation tokens.
#[derive(Debug, Default)]
pub struct CancelRegistry {
    tokens: Mutex<Vec<CancellationToken>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a token. Holds the lock only for the push.
    pub fn append(&self, token: CancellationToken) {
        self.lock().push(token);
    }

    /// Returns the tokens registered so far, in registration order.
    ///
    /// The iterator walks a snapshot, so appends racing with the iteration
    /// are not observed and never block on it.
    pub fn iter(&self) -> impl Iterator<Item = CancellationToken> + use<> {
        self.lock().clone().into_iter()
    }

    /// Number of registered tokens.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Cancels every registered token and returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let mut count = 0;
        for token in self.iter() {
            debug!("Cancelling running command");
            token.cancel();
            count += 1;
        }
        count
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<CancellationToken>> {
        // A panic while holding the lock cannot leave a Vec push half-done.
        self.tokens
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
