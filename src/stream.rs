//! Stream Buffer & Dispatcher
//!
//! Accumulates raw bytes, runs recognition after every byte, and fans recognized
//! messages out to subscriptions. Single owner: callers that share it across
//! threads go through [`crate::link::Link`].

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::catalog::Catalog;
use crate::config::LinkConfig;
use crate::diagnostics::{Diagnostics, TracingDiagnostics};
use crate::error::HistoryEntry;
use crate::matcher::{self, MatchedMessage, Recognition};
use crate::message::Fields;

/// Resync predicate: does the remaining input start a message?
pub type StartFn = Box<dyn Fn(&[u8]) -> bool + Send>;

pub type Callback = Box<dyn FnMut(&RecognizedMessage) + Send>;

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                              Types
// —————————————————————————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizedMessage {
    pub message_type: String,
    pub bytes:        Vec<u8>,
    pub values:       Fields,
    pub received_at:  DateTime<Utc>,
}

impl RecognizedMessage {
    fn stamp(matched: MatchedMessage) -> Self {
        Self {
            message_type: matched.message_type,
            bytes:        matched.bytes,
            values:       matched.values,
            received_at:  Utc::now(),
        }
    }

    pub fn value(&self, fragment: &str) -> Option<&[u8]> {
        self.values.get(fragment).map(Vec::as_slice)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Type(String),
    All,
}

impl Filter {
    pub fn of(message_type: impl Into<String>) -> Self {
        Filter::Type(message_type.into())
    }

    fn accepts(&self, message_type: &str) -> bool {
        match self {
            Filter::Type(t) => t == message_type,
            Filter::All => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id:       SubscriptionId,
    filter:   Filter,
    once:     bool,
    callback: Callback,
}

/// How much to drop from the front of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trim {
    Bytes(usize),
    All,
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                          Message Stream
// —————————————————————————————————————————————————————————————————————————————————————————————————

pub struct MessageStream {
    catalog:          Arc<Catalog>,
    config:           LinkConfig,
    is_message_start: StartFn,
    diagnostics:      Arc<dyn Diagnostics>,

    buffer:        Vec<u8>,
    history:       VecDeque<RecognizedMessage>,
    subscriptions: Vec<Subscription>,
    next_id:       u64,
    reading:       bool,
}

impl MessageStream {
    /// Accepts any byte as a message start and logs through `tracing`.
    pub fn new(catalog: impl Into<Arc<Catalog>>, config: LinkConfig) -> Self {
        Self {
            catalog: catalog.into(),
            config,
            is_message_start: Box::new(|_| true),
            diagnostics: Arc::new(TracingDiagnostics),
            buffer: Vec::new(),
            history: VecDeque::with_capacity(config.history_capacity),
            subscriptions: Vec::new(),
            next_id: 0,
            reading: false,
        }
    }

    pub fn with_start_predicate<F>(mut self, is_message_start: F) -> Self
    where
        F: Fn(&[u8]) -> bool + Send + 'static,
    {
        self.is_message_start = Box::new(is_message_start);
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    // ———————————————————————————————————————————— Ingest —————————————————————————————————————————

    /// Feeds a chunk of raw bytes. Returns how many messages were recognized.
    ///
    /// While not synchronized, bytes are dropped until `is_message_start` accepts
    /// the remaining input. With `resync_between_messages`, a message that leaves
    /// the buffer empty puts the stream back in that state.
    ///
    /// An invalid definition is reported through [`Diagnostics::recognition_failed`]
    /// and skipped; the whole chunk is always consumed.
    pub fn ingest(&mut self, chunk: &[u8]) -> usize {
        let mut recognized = 0;

        for (i, &byte) in chunk.iter().enumerate() {
            if !self.reading {
                if !(self.is_message_start)(&chunk[i..]) {
                    self.diagnostics.byte_dropped(byte);
                    continue;
                }
                self.reading = true;
            }

            self.buffer.push(byte);

            let diagnostics = &self.diagnostics;
            let recognition = matcher::recognize_skipping(&self.catalog, &self.buffer, |e| {
                diagnostics.recognition_failed(&e);
            });

            if let Recognition::Matched(matched) = recognition {
                self.remove_from_buffer(Trim::Bytes(matched.bytes.len()));

                let message = RecognizedMessage::stamp(matched);
                self.diagnostics.message_recognized(&message);
                self.push_history(&message);
                self.dispatch(&message);
                recognized += 1;

                if self.config.resync_between_messages && self.buffer.is_empty() {
                    self.reading = false;
                }
            }
        }

        recognized
    }

    fn push_history(&mut self, message: &RecognizedMessage) {
        if self.config.history_capacity == 0 {
            return;
        }
        while self.history.len() >= self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(message.clone());
    }

    /// Registration order. `once` entries are dropped in the same pass.
    fn dispatch(&mut self, message: &RecognizedMessage) {
        self.subscriptions.retain_mut(|sub| {
            if !sub.filter.accepts(&message.message_type) {
                return true;
            }
            (sub.callback)(message);
            !sub.once
        });
    }

    // ——————————————————————————————————————————— Buffer ——————————————————————————————————————————

    pub fn remove_from_buffer(&mut self, trim: Trim) {
        let n = match trim {
            Trim::Bytes(n) => n.min(self.buffer.len()),
            Trim::All => self.buffer.len(),
        };
        self.buffer.drain(..n);
        self.diagnostics.buffer_trimmed(n, self.buffer.len());
    }

    /// Next chunk goes through resynchronization again.
    pub fn reset_sync(&mut self) {
        self.reading = false;
    }

    pub fn is_reading(&self) -> bool {
        self.reading
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Oldest first.
    pub fn history(&self) -> &VecDeque<RecognizedMessage> {
        &self.history
    }

    pub fn history_entries(&self) -> Vec<HistoryEntry> {
        self.history
            .iter()
            .map(|m| HistoryEntry {
                message_type: m.message_type.clone(),
                bytes:        m.bytes.clone(),
            })
            .collect()
    }

    // ———————————————————————————————————————— Subscriptions ——————————————————————————————————————

    pub fn subscribe<F>(&mut self, filter: Filter, once: bool, callback: F) -> SubscriptionId
    where
        F: FnMut(&RecognizedMessage) + Send + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscriptions.push(Subscription {
            id,
            filter,
            once,
            callback: Box::new(callback),
        });
        id
    }

    /// `false` if the subscription was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    pub fn clear_subscriptions(&mut self) {
        self.subscriptions.clear();
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    // ——————————————————————————————————————————— Access ——————————————————————————————————————————

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn diagnostics(&self) -> &Arc<dyn Diagnostics> {
        &self.diagnostics
    }
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                              Tests
// —————————————————————————————————————————————————————————————————————————————————————————————————
