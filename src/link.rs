//! Link handle
//!
//! Cheap to clone, shares one [`MessageStream`] between the transport reader that
//! calls [`Link::ingest`] and the tasks awaiting responses.
//!
//! Subscriber callbacks run inline while the stream is locked, they must not call
//! back into the same `Link`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::ascii::HexBytes;
use crate::catalog::Catalog;
use crate::config::LinkConfig;
use crate::correlator::PendingMessage;
use crate::diagnostics::Diagnostics;
use crate::error::{HistoryEntry, Result};
use crate::message::Fields;
use crate::stream::{Filter, MessageStream, RecognizedMessage, SubscriptionId, Trim};

#[derive(Clone)]
pub struct Link {
    stream:          Arc<Mutex<MessageStream>>,
    catalog:         Arc<Catalog>,
    default_timeout: Duration,
}

impl Link {
    /// Link with the default resync predicate and diagnostics.
    pub fn new(catalog: Catalog, config: LinkConfig) -> Self {
        Self::from_stream(MessageStream::new(catalog, config))
    }

    pub fn from_stream(stream: MessageStream) -> Self {
        Self {
            catalog:         stream.catalog().clone(),
            default_timeout: stream.config().default_timeout,
            stream:          Arc::new(Mutex::new(stream)),
        }
    }

    fn stream(&self) -> MutexGuard<'_, MessageStream> {
        self.stream.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ——————————————————————————————————————————— Input ———————————————————————————————————————————

    /// See [`MessageStream::ingest`]. Concurrent callers are serialized.
    pub fn ingest(&self, chunk: &[u8]) -> usize {
        self.stream().ingest(chunk)
    }

    pub fn remove_from_buffer(&self, trim: Trim) {
        self.stream().remove_from_buffer(trim);
    }

    pub fn reset_sync(&self) {
        self.stream().reset_sync();
    }

    // ——————————————————————————————————————————— Output ——————————————————————————————————————————

    pub fn generate(&self, name: &str, fields: &Fields) -> Result<Vec<u8>> {
        self.catalog.generate(name, fields)
    }

    /// Generates `name` and writes it, returning once the writer is flushed.
    pub async fn send_message<W>(&self, writer: &mut W, name: &str, fields: &Fields) -> Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let bytes = self.generate(name, fields)?;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        debug!(message_type = name, bytes = %HexBytes(&bytes), "Sent");
        Ok(())
    }

    // ——————————————————————————————————————— Subscriptions ———————————————————————————————————————

    pub fn subscribe<F>(&self, filter: Filter, once: bool, callback: F) -> SubscriptionId
    where
        F: FnMut(&RecognizedMessage) + Send + 'static,
    {
        self.stream().subscribe(filter, once, callback)
    }

    pub(crate) fn subscribe_once<F>(&self, message_type: &str, callback: F) -> SubscriptionId
    where
        F: FnMut(&RecognizedMessage) + Send + 'static,
    {
        self.subscribe(Filter::of(message_type), true, callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.stream().unsubscribe(id)
    }

    /// Pending waits settle with `Error::Cancelled`.
    pub fn clear_subscriptions(&self) {
        self.stream().clear_subscriptions();
    }

    pub fn subscription_count(&self) -> usize {
        self.stream().subscription_count()
    }

    /// Registers a one-shot wait for the next `message_type`, bounded by `timeout`
    /// or the configured default. Fails right away for a type not in the catalog.
    ///
    /// ```rust,ignore
    /// let reply = link.await_message("ack", None)?;
    /// port.write_all(&link.generate("ping", &Fields::new())?).await?;
    /// let ack = reply.await?;
    /// ```
    pub fn await_message(&self, message_type: &str, timeout: Option<Duration>) -> Result<PendingMessage> {
        self.catalog.message(message_type)?;
        let timeout = timeout.unwrap_or(self.default_timeout);
        Ok(PendingMessage::register(self, message_type, timeout))
    }

    // ——————————————————————————————————————————— Access ——————————————————————————————————————————

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn diagnostics(&self) -> Arc<dyn Diagnostics> {
        self.stream().diagnostics().clone()
    }

    pub fn buffer(&self) -> Vec<u8> {
        self.stream().buffer().to_vec()
    }

    pub fn buffer_len(&self) -> usize {
        self.stream().buffer().len()
    }

    /// Oldest first.
    pub fn history(&self) -> Vec<RecognizedMessage> {
        self.stream().history().iter().cloned().collect()
    }

    pub fn is_reading(&self) -> bool {
        self.stream().is_reading()
    }

    /// Buffer and history taken under one lock.
    pub fn snapshot(&self) -> (Vec<u8>, Vec<HistoryEntry>) {
        let stream = self.stream();
        (stream.buffer().to_vec(), stream.history_entries())
    }
}
