use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;

/// A FIFO-fair exclusive lock over the object model, scoped to connection
/// ids rather than to an in-process task so a disconnect can force-release
/// a hold it doesn't own a guard for anymore.
pub struct ModelLock {
    state: Mutex<LockState>,
}

struct LockState {
    holder: Option<u32>,
    waiters: VecDeque<(u32, oneshot::Sender<()>)>,
}

/// An owning guard whose destruction releases the lock (or, for a holder
/// that vanished via disconnect, is bypassed entirely by
/// [`ModelLock::force_release`]).
pub struct LockGuard<'a> {
    lock: &'a ModelLock,
    connection_id: u32,
    released: bool,
}

impl ModelLock {
    pub fn new() -> Self {
        Self { state: Mutex::new(LockState { holder: None, waiters: VecDeque::new() }) }
    }

    /// Acquire the lock for `connection_id`, waiting at most `timeout` and
    /// giving up early if `cancellation` fires. Returns `Err(AlreadyHeld)`
    /// synchronously, without queuing, if this connection already holds it.
    pub async fn acquire(
        &self,
        connection_id: u32,
        timeout: Duration,
        cancellation: &CancellationToken,
    ) -> Result<LockGuard<'_>, AcquireError> {
        let rx = {
            let mut state = self.state.lock().await;
            if state.holder == Some(connection_id) {
                return Err(AcquireError::AlreadyHeld);
            }
            if state.holder.is_none() && state.waiters.is_empty() {
                state.holder = Some(connection_id);
                None
            } else {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back((connection_id, tx));
                Some(rx)
            }
        };

        if let Some(rx) = rx {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => {
                    self.abandon_wait(connection_id).await;
                    return Err(AcquireError::Cancelled);
                }
                result = tokio::time::timeout(timeout, rx) => {
                    match result {
                        // Granted by whoever releases ahead of us; a closed
                        // sender here would mean the lock manager itself was
                        // torn down.
                        Ok(_) => {}
                        Err(_elapsed) => {
                            self.abandon_wait(connection_id).await;
                            return Err(AcquireError::Cancelled);
                        }
                    }
                }
            }
        }

        Ok(LockGuard { lock: self, connection_id, released: false })
    }

    /// Remove `connection_id` from the waiter queue after it gave up. If the
    /// grant race already handed the lock to it before cancellation was
    /// observed, release it immediately instead of leaving it dangling.
    async fn abandon_wait(&self, connection_id: u32) {
        let mut state = self.state.lock().await;
        state.waiters.retain(|(id, _)| *id != connection_id);
        if state.holder == Some(connection_id) {
            state.holder = None;
            self.grant_next(&mut state);
        }
    }

    async fn release(&self, connection_id: u32) {
        let mut state = self.state.lock().await;
        if state.holder != Some(connection_id) {
            return;
        }
        state.holder = None;
        self.grant_next(&mut state);
    }

    /// Force-release whatever hold `connection_id` has, called on
    /// disconnect regardless of whether a live [`LockGuard`] still exists
    /// for it. Also drops any still-queued wait for that connection.
    pub async fn force_release(&self, connection_id: u32) {
        let mut state = self.state.lock().await;
        state.waiters.retain(|(id, _)| *id != connection_id);
        if state.holder == Some(connection_id) {
            state.holder = None;
            self.grant_next(&mut state);
        }
    }

    fn grant_next(&self, state: &mut LockState) {
        while let Some((next_id, tx)) = state.waiters.pop_front() {
            if tx.send(()).is_ok() {
                state.holder = Some(next_id);
                return;
            }
            // Waiter's connection already gave up (e.g. cancelled); try
            // the next one in FIFO order instead of leaving the lock idle.
        }
    }

    pub async fn holder(&self) -> Option<u32> {
        self.state.lock().await.holder
    }
}

impl Default for ModelLock {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AcquireError {
    #[error("object-model lock already held by this connection")]
    AlreadyHeld,
    #[error("object-model lock wait was cancelled or timed out")]
    Cancelled,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let lock = self.lock;
        let connection_id = self.connection_id;
        tokio::spawn(async move {
            lock.release(connection_id).await;
        });
    }
}

impl LockGuard<'_> {
    /// Release explicitly (the `UnlockObjectModel` command path), rather
    /// than waiting for the guard to drop.
    pub async fn release_now(mut self) {
        self.lock.release(self.connection_id).await;
        self.released = true;
    }
}
