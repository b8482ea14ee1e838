//! Message definitions
//!
//! A message is an ordered list of named fragments. Each fragment carries a
//! pattern used for recognition and an optional default used for generation.
//!
//! ```text
//! [marker: AA 55][type: 04][length: ??][data: f(precedent)][crlf: * 0D 0A]
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::ascii::HexBytes;
use crate::error::{DefinitionError, Error, Result};

/// Field values keyed by fragment name.
pub type Fields = HashMap<String, Vec<u8>>;

/// Computes the expected tokens of a fragment from the bytes matched before it.
pub type PatternFn = Arc<dyn Fn(&[u8]) -> Vec<Token> + Send + Sync>;

/// Computes a default value from the bytes generated before it.
pub type DefaultFn = Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>;

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                            Patterns
// —————————————————————————————————————————————————————————————————————————————————————————————————

/// A single resolved pattern position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Byte(u8),
    /// Matches exactly one byte of any value.
    Any,
}

impl From<u8> for Token {
    fn from(b: u8) -> Self {
        Token::Byte(b)
    }
}

#[derive(Clone)]
pub enum Pattern {
    /// Fixed length run of bytes and wildcards.
    Literal(Vec<Token>),
    /// Resolved lazily from the bytes matched so far. The output is always concrete.
    Dynamic(PatternFn),
    /// Variable length run, terminated by the first byte equal to whatever follows it.
    Scan,
}

impl Pattern {
    /// Lower bound on the bytes this pattern consumes.
    pub fn min_len(&self) -> usize {
        match self {
            Pattern::Literal(tokens) => tokens.len(),
            Pattern::Dynamic(_) | Pattern::Scan => 0,
        }
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Literal(tokens) => f.debug_tuple("Literal").field(tokens).finish(),
            Pattern::Dynamic(_) => f.write_str("Dynamic(..)"),
            Pattern::Scan => f.write_str("Scan"),
        }
    }
}

/// One element of the flattened pattern of a message.
#[derive(Clone, Copy)]
pub enum Element<'a> {
    Token(Token),
    Dynamic(&'a PatternFn),
    Scan,
}

impl fmt::Debug for Element<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Token(t) => write!(f, "{t:?}"),
            Element::Dynamic(_) => f.write_str("Dynamic"),
            Element::Scan => f.write_str("Scan"),
        }
    }
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                            Fragment
// —————————————————————————————————————————————————————————————————————————————————————————————————

#[derive(Clone)]
pub enum FieldDefault {
    Bytes(Vec<u8>),
    Computed(DefaultFn),
}

impl fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDefault::Bytes(b) => write!(f, "Bytes({})", HexBytes(b)),
            FieldDefault::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Fragment {
    name:        String,
    description: Option<String>,
    pattern:     Pattern,
    default:     Option<FieldDefault>,
}

impl Fragment {
    pub fn new(name: impl Into<String>, pattern: Pattern) -> Self {
        Self {
            name: name.into(),
            description: None,
            pattern,
            default: None,
        }
    }

    /// Literal bytes that also serve as their own default.
    pub fn fixed(name: impl Into<String>, bytes: &[u8]) -> Self {
        let tokens = bytes.iter().copied().map(Token::Byte).collect();
        Self::new(name, Pattern::Literal(tokens)).with_default(bytes)
    }

    pub fn literal(name: impl Into<String>, tokens: impl IntoIterator<Item = Token>) -> Self {
        Self::new(name, Pattern::Literal(tokens.into_iter().collect()))
    }

    /// `len` bytes of any value.
    pub fn wildcard(name: impl Into<String>, len: usize) -> Self {
        Self::new(name, Pattern::Literal(vec![Token::Any; len]))
    }

    pub fn dynamic<F>(name: impl Into<String>, generator: F) -> Self
    where
        F: Fn(&[u8]) -> Vec<Token> + Send + Sync + 'static,
    {
        Self::new(name, Pattern::Dynamic(Arc::new(generator)))
    }

    pub fn scan(name: impl Into<String>) -> Self {
        Self::new(name, Pattern::Scan)
    }

    pub fn with_default(mut self, bytes: &[u8]) -> Self {
        self.default = Some(FieldDefault::Bytes(bytes.to_vec()));
        self
    }

    pub fn with_default_fn<F>(mut self, generator: F) -> Self
    where
        F: Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
    {
        self.default = Some(FieldDefault::Computed(Arc::new(generator)));
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn default(&self) -> Option<&FieldDefault> {
        self.default.as_ref()
    }
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                       Message Definition
// —————————————————————————————————————————————————————————————————————————————————————————————————

/// Immutable, validated message shape.
#[derive(Debug, Clone)]
pub struct MessageDef {
    name:      String,
    fragments: Vec<Fragment>,
    /// (scan fragment, terminator fragment)
    scan:      Option<(usize, usize)>,
    min_len:   usize,
}

impl MessageDef {
    /// Validates the shape:
    /// - fragment names are unique,
    /// - at most one scan field,
    /// - the scan field is followed by a concrete byte or a dynamic fragment.
    pub fn new(name: impl Into<String>, fragments: Vec<Fragment>) -> Result<Self> {
        let name = name.into();

        if fragments.is_empty() {
            return Err(Error::invalid(&name, DefinitionError::EmptyMessage));
        }

        let mut seen = HashSet::new();
        for fragment in &fragments {
            if !seen.insert(fragment.name.as_str()) {
                return Err(Error::invalid(
                    &name,
                    DefinitionError::DuplicateFragment(fragment.name.clone()),
                ));
            }
        }

        let mut scans = fragments
            .iter()
            .enumerate()
            .filter(|(_, f)| matches!(f.pattern, Pattern::Scan))
            .map(|(i, _)| i);

        let scan = match (scans.next(), scans.next()) {
            (None, _) => None,
            (Some(_), Some(_)) => return Err(Error::invalid(&name, DefinitionError::MultipleScans)),
            (Some(index), None) => {
                let terminator = Self::find_terminator(&name, &fragments, index)?;
                Some((index, terminator))
            }
        };

        let min_len = fragments.iter().map(|f| f.pattern.min_len()).sum();

        Ok(Self {
            name,
            fragments,
            scan,
            min_len,
        })
    }

    /// First non-empty fragment after the scan field.
    fn find_terminator(name: &str, fragments: &[Fragment], scan: usize) -> Result<usize> {
        for (index, fragment) in fragments.iter().enumerate().skip(scan + 1) {
            match &fragment.pattern {
                Pattern::Literal(tokens) if tokens.is_empty() => continue,
                Pattern::Literal(tokens) => {
                    return match tokens[0] {
                        Token::Byte(_) => Ok(index),
                        Token::Any => Err(Error::invalid(name, DefinitionError::WildcardTerminator)),
                    };
                }
                Pattern::Dynamic(_) => return Ok(index),
                Pattern::Scan => return Err(Error::invalid(name, DefinitionError::MultipleScans)),
            }
        }
        Err(Error::invalid(name, DefinitionError::ScanNotTerminated))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn fragment(&self, name: &str) -> Option<&Fragment> {
        self.fragments.iter().find(|f| f.name == name)
    }

    /// Index of the scan fragment and of the fragment that terminates it.
    pub fn scan(&self) -> Option<(usize, usize)> {
        self.scan
    }

    /// Bytes needed before a match can even be attempted.
    pub fn min_len(&self) -> usize {
        self.min_len
    }

    /// Concatenation of all fragment patterns, generators left unresolved.
    pub fn pattern(&self) -> Vec<Element<'_>> {
        let mut elements = Vec::new();
        for fragment in &self.fragments {
            match &fragment.pattern {
                Pattern::Literal(tokens) => elements.extend(tokens.iter().copied().map(Element::Token)),
                Pattern::Dynamic(generator) => elements.push(Element::Dynamic(generator)),
                Pattern::Scan => elements.push(Element::Scan),
            }
        }
        elements
    }

    // ——————————————————————————————————————— Generation ——————————————————————————————————————————

    /// Builds the outgoing bytes: override, then default, then computed default.
    /// Overrides are not checked against the declared pattern.
    pub fn generate_bytes(&self, fields: &Fields) -> Result<Vec<u8>> {
        let mut packet = Vec::with_capacity(self.min_len);

        for fragment in &self.fragments {
            if let Some(value) = fields.get(&fragment.name) {
                packet.extend_from_slice(value);
                continue;
            }

            match &fragment.default {
                Some(FieldDefault::Bytes(bytes)) => packet.extend_from_slice(bytes),
                Some(FieldDefault::Computed(generator)) => {
                    let bytes = generator(&packet);
                    packet.extend_from_slice(&bytes);
                }
                None => {
                    return Err(Error::MissingParameter {
                        message:  self.name.clone(),
                        fragment: fragment.name.clone(),
                    });
                }
            }
        }

        Ok(packet)
    }
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                              Tests
// —————————————————————————————————————————————————————————————————————————————————————————————————

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(result: Result<MessageDef>) -> DefinitionError {
        match result {
            Err(Error::InvalidDefinition { reason, .. }) => reason,
            other => panic!("expected InvalidDefinition, got {other:?}"),
        }
    }

    #[test]
    fn scan_last_is_rejected() {
        let def = MessageDef::new("m", vec![Fragment::fixed("start", &[0x7E]), Fragment::scan("body")]);
        assert_eq!(reason(def), DefinitionError::ScanNotTerminated);
    }

    #[test]
    fn scan_followed_only_by_empty_fragment_is_rejected() {
        let def = MessageDef::new(
            "m",
            vec![Fragment::scan("body"), Fragment::literal("nothing", [])],
        );
        assert_eq!(reason(def), DefinitionError::ScanNotTerminated);
    }

    #[test]
    fn two_scans_are_rejected() {
        let def = MessageDef::new(
            "m",
            vec![
                Fragment::scan("a"),
                Fragment::fixed("sep", &[0x2C]),
                Fragment::scan("b"),
                Fragment::fixed("end", &[0x0D]),
            ],
        );
        assert_eq!(reason(def), DefinitionError::MultipleScans);
    }

    #[test]
    fn wildcard_terminator_is_rejected() {
        let def = MessageDef::new("m", vec![Fragment::scan("body"), Fragment::wildcard("crc", 1)]);
        assert_eq!(reason(def), DefinitionError::WildcardTerminator);
    }

    #[test]
    fn duplicate_fragment_is_rejected() {
        let def = MessageDef::new("m", vec![Fragment::fixed("a", &[1]), Fragment::fixed("a", &[2])]);
        assert_eq!(reason(def), DefinitionError::DuplicateFragment("a".into()));
    }

    #[test]
    fn empty_message_is_rejected() {
        assert_eq!(reason(MessageDef::new("m", vec![])), DefinitionError::EmptyMessage);
    }

    #[test]
    fn scan_terminated_by_dynamic_is_accepted() {
        let def = MessageDef::new(
            "m",
            vec![
                Fragment::fixed("start", &[0x02]),
                Fragment::scan("body"),
                Fragment::dynamic("end", |_| vec![Token::Byte(0x03)]),
            ],
        )
        .unwrap();
        assert_eq!(def.scan(), Some((1, 2)));
        assert_eq!(def.min_len(), 1);
    }

    #[test]
    fn flattened_pattern() {
        let def = MessageDef::new(
            "m",
            vec![
                Fragment::fixed("start", &[0x7E, 0x01]),
                Fragment::wildcard("any", 1),
                Fragment::scan("body"),
                Fragment::fixed("end", &[0x0D]),
            ],
        )
        .unwrap();
        let rendered = format!("{:?}", def.pattern());
        assert_eq!(rendered, "[Byte(126), Byte(1), Any, Scan, Byte(13)]");
    }

    #[test]
    fn generate_uses_overrides_then_defaults() {
        let def = MessageDef::new(
            "m",
            vec![
                Fragment::fixed("start", &[0xAA]),
                Fragment::wildcard("payload", 2),
                Fragment::wildcard("sum", 1)
                    .with_default_fn(|precedent| vec![precedent.iter().fold(0u8, |a, b| a.wrapping_add(*b))]),
            ],
        )
        .unwrap();

        let fields = Fields::from([("payload".to_string(), vec![0x01, 0x02])]);
        assert_eq!(def.generate_bytes(&fields).unwrap(), vec![0xAA, 0x01, 0x02, 0xAD]);
    }

    #[test]
    fn generate_missing_parameter() {
        let def = MessageDef::new("m", vec![Fragment::fixed("start", &[0xAA]), Fragment::wildcard("payload", 2)])
            .unwrap();

        match def.generate_bytes(&Fields::new()) {
            Err(Error::MissingParameter { message, fragment }) => {
                assert_eq!(message, "m");
                assert_eq!(fragment, "payload");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
