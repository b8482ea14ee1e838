//! Request/Response Correlator
//!
//! One-shot wait for the next message of a type. The subscription callback and the
//! waiter share a [`Settlement`]; whichever side moves it out of `Pending` first
//! wins, the other becomes a no-op.

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::{Error, Result, TimeoutReport};
use crate::link::Link;
use crate::stream::{RecognizedMessage, SubscriptionId};

/// Deadline used when `now + timeout` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                           Settlement
// —————————————————————————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SettleState {
    Pending   = 0,
    Resolved  = 1,
    Cancelled = 2,
}

#[derive(Debug)]
pub struct Settlement(AtomicU8);

impl Settlement {
    pub fn new() -> Self {
        Self(AtomicU8::new(SettleState::Pending as u8))
    }

    /// `true` only for the transition out of `Pending`.
    pub fn resolve(&self) -> bool {
        self.transition(SettleState::Resolved)
    }

    pub fn cancel(&self) -> bool {
        self.transition(SettleState::Cancelled)
    }

    fn transition(&self, to: SettleState) -> bool {
        self.0
            .compare_exchange(SettleState::Pending as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn state(&self) -> SettleState {
        match self.0.load(Ordering::Acquire) {
            0 => SettleState::Pending,
            1 => SettleState::Resolved,
            _ => SettleState::Cancelled,
        }
    }
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                         Pending Message
// —————————————————————————————————————————————————————————————————————————————————————————————————

/// Registered wait. The subscription and the deadline both start at creation, so
/// bytes ingested before the first poll are not missed and time spent before the
/// first poll counts against the timeout.
///
/// Dropping it before it settles removes the subscription.
pub struct PendingMessage {
    link:         Link,
    id:           SubscriptionId,
    message_type: String,
    timeout:      Duration,
    deadline:     Instant,
    settlement:   Arc<Settlement>,
    rx:           oneshot::Receiver<RecognizedMessage>,
}

impl PendingMessage {
    pub(crate) fn register(link: &Link, message_type: &str, timeout: Duration) -> Self {
        let deadline = Instant::now()
            .checked_add(timeout)
            .unwrap_or_else(|| Instant::now() + FAR_FUTURE);
        let (tx, rx) = oneshot::channel();
        let settlement = Arc::new(Settlement::new());

        let state = settlement.clone();
        let mut tx = Some(tx);
        let id = link.subscribe_once(message_type, move |msg| {
            if state.resolve() {
                if let Some(tx) = tx.take() {
                    let _ = tx.send(msg.clone());
                }
            }
        });

        Self {
            link: link.clone(),
            id,
            message_type: message_type.to_string(),
            timeout,
            deadline,
            settlement,
            rx,
        }
    }

    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn state(&self) -> SettleState {
        self.settlement.state()
    }

    pub async fn wait(mut self) -> Result<RecognizedMessage> {
        match tokio::time::timeout_at(self.deadline, &mut self.rx).await {
            Ok(Ok(msg)) => Ok(msg),
            Ok(Err(_)) => Err(Error::Cancelled(self.message_type.clone())),
            Err(_) => {
                if self.settlement.cancel() {
                    self.link.unsubscribe(self.id);
                    let report = self.report();
                    self.link.diagnostics().await_timed_out(&report);
                    return Err(Error::Timeout(Box::new(report)));
                }
                // Delivered between the deadline and the cancel attempt
                self.rx.try_recv().map_err(|_| Error::Cancelled(self.message_type.clone()))
            }
        }
    }

    fn report(&self) -> TimeoutReport {
        let (buffer, history) = self.link.snapshot();
        TimeoutReport {
            message_type: self.message_type.clone(),
            timeout_ms: self.timeout.as_millis(),
            buffer,
            history,
        }
    }
}

impl IntoFuture for PendingMessage {
    type Output = Result<RecognizedMessage>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

impl Drop for PendingMessage {
    fn drop(&mut self) {
        if self.settlement.cancel() {
            self.link.unsubscribe(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settlement_transitions_once() {
        let s = Settlement::new();
        assert_eq!(s.state(), SettleState::Pending);
        assert!(s.resolve());
        assert!(!s.cancel());
        assert!(!s.resolve());
        assert_eq!(s.state(), SettleState::Resolved);

        let s = Settlement::new();
        assert!(s.cancel());
        assert!(!s.resolve());
        assert_eq!(s.state(), SettleState::Cancelled);
    }
}
