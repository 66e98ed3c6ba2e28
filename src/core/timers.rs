//! Cancellable scheduled tasks for the editing session.
//!
//! Each armed timer is a Tokio task that sleeps and then reports a
//! [`TimerFired`] on the session's channel. Timers are keyed: arming a key
//! that is already armed cancels the earlier task, and every arming carries a
//! sequence number so a report that raced with a cancel is recognized as
//! stale by [`TimerSet::fired`]. All timers hang off one scope token and die
//! with it.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::submission::SubmissionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    Debounce,
    Fallback(SubmissionId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub key: TimerKey,
    seq: u64,
}

pub struct TimerSet {
    tx: mpsc::UnboundedSender<TimerFired>,
    scope: CancellationToken,
    armed: HashMap<TimerKey, (u64, CancellationToken)>,
    next_seq: u64,
}

impl TimerSet {
    pub fn new(scope: CancellationToken) -> (Self, mpsc::UnboundedReceiver<TimerFired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                scope,
                armed: HashMap::new(),
                next_seq: 0,
            },
            rx,
        )
    }

    /// Arm `key` to fire after `after`, replacing any pending timer with the same key.
    pub fn arm(&mut self, key: TimerKey, after: Duration) {
        self.cancel(key);
        if self.scope.is_cancelled() {
            return;
        }

        self.next_seq += 1;
        let fired = TimerFired {
            key,
            seq: self.next_seq,
        };
        let token = self.scope.child_token();
        self.armed.insert(key, (fired.seq, token.clone()));

        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(after) => {
                    if !token.is_cancelled() {
                        let _ = tx.send(fired);
                    }
                }
            }
        });
    }

    pub fn cancel(&mut self, key: TimerKey) -> bool {
        match self.armed.remove(&key) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, (_, token)) in self.armed.drain() {
            token.cancel();
        }
    }

    /// Consume a report from the channel. Returns `false` for reports of
    /// timers that were cancelled or re-armed after they went off.
    pub fn fired(&mut self, fired: TimerFired) -> bool {
        match self.armed.get(&fired.key) {
            Some((seq, _)) if *seq == fired.seq => {
                self.armed.remove(&fired.key);
                true
            }
            _ => {
                debug!(key = ?fired.key, "dropping stale timer report");
                false
            }
        }
    }

    pub fn is_armed(&self, key: TimerKey) -> bool {
        self.armed.contains_key(&key)
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
