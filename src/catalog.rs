//! Message Catalog

use std::collections::HashSet;

use crate::error::{DefinitionError, Error, Result};
use crate::matcher::{self, Recognition};
use crate::message::{Fields, MessageDef};

/// Ordered set of message definitions. Order is match priority.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    messages: Vec<MessageDef>,
}

impl Catalog {
    pub fn new(messages: impl IntoIterator<Item = MessageDef>) -> Result<Self> {
        let messages: Vec<MessageDef> = messages.into_iter().collect();

        let mut seen = HashSet::new();
        for msg in &messages {
            if !seen.insert(msg.name()) {
                return Err(Error::invalid(
                    msg.name(),
                    DefinitionError::DuplicateMessage(msg.name().to_string()),
                ));
            }
        }

        Ok(Self { messages })
    }

    pub fn message(&self, name: &str) -> Result<&MessageDef> {
        self.messages
            .iter()
            .find(|m| m.name() == name)
            .ok_or_else(|| Error::UnknownMessage(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.messages.iter().any(|m| m.name() == name)
    }

    pub fn messages(&self) -> &[MessageDef] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// See [`matcher::recognize`].
    pub fn recognize(&self, buffer: &[u8]) -> Result<Recognition> {
        matcher::recognize(self, buffer)
    }

    /// Outgoing bytes for `name`, see [`MessageDef::generate_bytes`].
    pub fn generate(&self, name: &str, fields: &Fields) -> Result<Vec<u8>> {
        self.message(name)?.generate_bytes(fields)
    }
}
