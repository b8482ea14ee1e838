//! Diagnostics sink
//!
//! Passed explicitly to the stream at construction. Every hook has a default
//! that emits a `tracing` event, so an integrator only overrides what it needs.

use tracing::{debug, info, warn};

use crate::ascii::HexBytes;
use crate::error::{Error, TimeoutReport};
use crate::stream::RecognizedMessage;

pub trait Diagnostics: Send + Sync {
    /// A byte discarded while looking for the start of a message.
    fn byte_dropped(&self, byte: u8) {
        warn!("Ignored {}", HexBytes(&[byte]));
    }

    fn message_recognized(&self, message: &RecognizedMessage) {
        debug!(
            message_type = %message.message_type,
            bytes = %HexBytes(&message.bytes),
            "New message"
        );
    }

    /// A definition that could not be evaluated against the buffer. It is skipped
    /// for this byte and the remaining candidates are still tried.
    fn recognition_failed(&self, error: &Error) {
        warn!("{error}");
    }

    fn buffer_trimmed(&self, removed: usize, remaining: usize) {
        debug!(removed, remaining, "Removed from buffer");
    }

    fn await_timed_out(&self, report: &TimeoutReport) {
        info!("{report}");
    }
}

/// Default sink, everything goes to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {}
