//! Recognition Engine
//!
//! Tries every definition of a catalog, in order, against the front of a byte
//! buffer. Designed to run after every appended byte: dynamic and scan fragments
//! can only be resolved once the bytes before them exist, so a candidate that runs
//! out of data is simply "not yet" and the next candidate is tried.
//!
//! The pattern is expanded fragment by fragment with a cursor into the buffer.
//! Each fragment ends up with a resolved length that is used to split the matched
//! bytes back into named values.

use crate::catalog::Catalog;
use crate::error::{DefinitionError, Error, Result};
use crate::message::{Fields, MessageDef, Pattern, Token};

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                             Results
// —————————————————————————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recognition {
    Matched(MatchedMessage),
    /// No candidate matched, more bytes may change that.
    NotYet,
}

/// A complete message found at the front of the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedMessage {
    pub message_type: String,
    pub bytes:        Vec<u8>,
    pub values:       Fields,
}

/// Outcome of one candidate against the buffer.
#[derive(Debug, PartialEq, Eq)]
enum Attempt {
    /// Resolved length of every fragment.
    Matched(Vec<usize>),
    Mismatch,
    Incomplete,
}

enum Step {
    Ok(usize),
    Mismatch,
    Incomplete,
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                           Recognition
// —————————————————————————————————————————————————————————————————————————————————————————————————

/// First definition of `catalog` that fully matches the front of `buffer`.
/// Stops at the first definition that turns out to be invalid.
pub fn recognize(catalog: &Catalog, buffer: &[u8]) -> Result<Recognition> {
    for def in catalog.messages() {
        if let Some(matched) = try_definition(def, buffer)? {
            return Ok(Recognition::Matched(matched));
        }
    }

    Ok(Recognition::NotYet)
}

/// Same as [`recognize`], but an invalid definition is handed to `on_error` and
/// counts as a mismatch, so the candidates after it are still tried.
pub fn recognize_skipping<F>(catalog: &Catalog, buffer: &[u8], mut on_error: F) -> Recognition
where
    F: FnMut(Error),
{
    for def in catalog.messages() {
        match try_definition(def, buffer) {
            Ok(Some(matched)) => return Recognition::Matched(matched),
            Ok(None) => {}
            Err(e) => on_error(e),
        }
    }

    Recognition::NotYet
}

fn try_definition(def: &MessageDef, buffer: &[u8]) -> Result<Option<MatchedMessage>> {
    if def.min_len() > buffer.len() {
        return Ok(None);
    }

    match attempt(def, buffer)? {
        Attempt::Matched(lengths) => Ok(Some(extract(def, buffer, &lengths))),
        Attempt::Mismatch | Attempt::Incomplete => Ok(None),
    }
}

fn attempt(def: &MessageDef, buffer: &[u8]) -> Result<Attempt> {
    let mut cursor = 0;
    let mut lengths = Vec::with_capacity(def.fragments().len());

    for fragment in def.fragments() {
        let start = cursor;

        let step = match fragment.pattern() {
            Pattern::Literal(tokens) => compare(tokens, buffer, cursor),
            Pattern::Dynamic(generator) => {
                let tokens = generator(&buffer[..cursor]);
                compare(&tokens, buffer, cursor)
            }
            Pattern::Scan => scan(def, buffer, cursor)?,
        };

        match step {
            Step::Ok(len) => cursor += len,
            Step::Mismatch => return Ok(Attempt::Mismatch),
            Step::Incomplete => return Ok(Attempt::Incomplete),
        }

        lengths.push(cursor - start);
    }

    Ok(Attempt::Matched(lengths))
}

/// Resolved tokens against the buffer from `at`.
fn compare(tokens: &[Token], buffer: &[u8], at: usize) -> Step {
    for (offset, token) in tokens.iter().enumerate() {
        let Some(&byte) = buffer.get(at + offset) else {
            return Step::Incomplete;
        };
        if let Token::Byte(expected) = token {
            if *expected != byte {
                return Step::Mismatch;
            }
        }
    }
    Step::Ok(tokens.len())
}

/// Consumes bytes until the first one equal to the terminator, which is not consumed.
/// Needs one byte of lookahead to decide, so a scan never ends at the buffer end.
fn scan(def: &MessageDef, buffer: &[u8], from: usize) -> Result<Step> {
    let mut cursor = from;
    loop {
        let Some(&byte) = buffer.get(cursor) else {
            return Ok(Step::Incomplete);
        };
        if byte == terminator(def, buffer, cursor)? {
            return Ok(Step::Ok(cursor - from));
        }
        cursor += 1;
    }
}

/// The byte expected right after the scan field if it were to end before `at`.
fn terminator(def: &MessageDef, buffer: &[u8], at: usize) -> Result<u8> {
    let invalid = |reason| Err(Error::invalid(def.name(), reason));

    let Some((_, index)) = def.scan() else {
        return invalid(DefinitionError::ScanNotTerminated);
    };

    let first = match def.fragments()[index].pattern() {
        Pattern::Literal(tokens) => tokens.first().copied(),
        Pattern::Dynamic(generator) => generator(&buffer[..at]).first().copied(),
        Pattern::Scan => return invalid(DefinitionError::MultipleScans),
    };

    match first {
        Some(Token::Byte(b)) => Ok(b),
        Some(Token::Any) => invalid(DefinitionError::WildcardTerminator),
        None => invalid(DefinitionError::ScanNotTerminated),
    }
}

fn extract(def: &MessageDef, buffer: &[u8], lengths: &[usize]) -> MatchedMessage {
    let total: usize = lengths.iter().sum();
    let bytes = buffer[..total].to_vec();

    let mut values = Fields::with_capacity(lengths.len());
    let mut index = 0;
    for (fragment, len) in def.fragments().iter().zip(lengths) {
        values.insert(fragment.name().to_string(), bytes[index..index + len].to_vec());
        index += len;
    }

    MatchedMessage {
        message_type: def.name().to_string(),
        bytes,
        values,
    }
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                              Tests
// —————————————————————————————————————————————————————————————————————————————————————————————————

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Fragment;

    fn framed() -> MessageDef {
        MessageDef::new(
            "framed",
            vec![Fragment::fixed("start", &[0x7E]), Fragment::scan("body"), Fragment::fixed("end", &[0x0D])],
        )
        .unwrap()
    }

    /// `[len][payload: len bytes][check: echo of len]`
    fn length_prefixed() -> MessageDef {
        MessageDef::new(
            "sized",
            vec![
                Fragment::fixed("header", &[0xAA]),
                Fragment::wildcard("len", 1),
                Fragment::dynamic("payload", |p| vec![Token::Any; p[1] as usize]),
                Fragment::dynamic("echo", |p| vec![Token::Byte(p[1])]),
            ],
        )
        .unwrap()
    }

    fn matched(catalog: &Catalog, bytes: &[u8]) -> MatchedMessage {
        match recognize(catalog, bytes).unwrap() {
            Recognition::Matched(m) => m,
            Recognition::NotYet => panic!("no match for {bytes:x?}"),
        }
    }

    #[test]
    fn scan_consumes_until_terminator() {
        let catalog = Catalog::new([framed()]).unwrap();
        let m = matched(&catalog, &[0x7E, 0x01, 0x02, 0x0D]);
        assert_eq!(m.message_type, "framed");
        assert_eq!(m.bytes, vec![0x7E, 0x01, 0x02, 0x0D]);
        assert_eq!(m.values["body"], vec![0x01, 0x02]);
        assert_eq!(m.values["end"], vec![0x0D]);
    }

    #[test]
    fn scan_may_be_empty() {
        let catalog = Catalog::new([framed()]).unwrap();
        let m = matched(&catalog, &[0x7E, 0x0D]);
        assert_eq!(m.values["body"], Vec::<u8>::new());
        assert_eq!(m.bytes, vec![0x7E, 0x0D]);
    }

    #[test]
    fn scan_without_terminator_is_not_yet() {
        let catalog = Catalog::new([framed()]).unwrap();
        let bytes: Vec<u8> = std::iter::once(0x7E).chain(0x10..0xFF).collect();
        assert_eq!(recognize(&catalog, &bytes).unwrap(), Recognition::NotYet);
    }

    #[test]
    fn match_only_consumes_message_prefix() {
        let catalog = Catalog::new([framed()]).unwrap();
        let m = matched(&catalog, &[0x7E, 0x05, 0x0D, 0x7E, 0x06]);
        assert_eq!(m.bytes, vec![0x7E, 0x05, 0x0D]);
    }

    #[test]
    fn dynamic_fragments_resolve_from_precedent() {
        let catalog = Catalog::new([length_prefixed()]).unwrap();
        let m = matched(&catalog, &[0xAA, 0x03, 0x10, 0x11, 0x12, 0x03]);
        assert_eq!(m.values["len"], vec![0x03]);
        assert_eq!(m.values["payload"], vec![0x10, 0x11, 0x12]);
        assert_eq!(m.values["echo"], vec![0x03]);

        // Wrong echo
        assert_eq!(
            recognize(&catalog, &[0xAA, 0x01, 0x10, 0x02]).unwrap(),
            Recognition::NotYet
        );
    }

    #[test]
    fn every_strict_prefix_is_not_yet() {
        let catalog = Catalog::new([length_prefixed(), framed()]).unwrap();
        let message = [0xAA, 0x02, 0x7E, 0x0D, 0x02];
        for end in 0..message.len() {
            assert_eq!(recognize(&catalog, &message[..end]).unwrap(), Recognition::NotYet, "prefix {end}");
        }
        assert_eq!(matched(&catalog, &message).message_type, "sized");
    }

    #[test]
    fn catalog_order_is_priority() {
        let generic = MessageDef::new("generic", vec![Fragment::fixed("h", &[0x01]), Fragment::wildcard("v", 1)]).unwrap();
        let specific = MessageDef::new("specific", vec![Fragment::fixed("h", &[0x01, 0x02])]).unwrap();

        let catalog = Catalog::new([generic.clone(), specific.clone()]).unwrap();
        assert_eq!(matched(&catalog, &[0x01, 0x02]).message_type, "generic");

        let catalog = Catalog::new([specific, generic]).unwrap();
        assert_eq!(matched(&catalog, &[0x01, 0x02]).message_type, "specific");
    }

    #[test]
    fn incomplete_candidate_falls_through_to_next() {
        let long = MessageDef::new("long", vec![Fragment::fixed("h", &[0x01]), Fragment::wildcard("v", 4)]).unwrap();
        let short = MessageDef::new("short", vec![Fragment::fixed("h", &[0x01]), Fragment::wildcard("v", 1)]).unwrap();
        let catalog = Catalog::new([long, short]).unwrap();
        assert_eq!(matched(&catalog, &[0x01, 0x09]).message_type, "short");
    }

    #[test]
    fn dynamic_terminator_is_resolved_per_position() {
        // Body runs until the byte equal to the first byte of the message.
        let def = MessageDef::new(
            "echo_end",
            vec![
                Fragment::wildcard("tag", 1),
                Fragment::scan("body"),
                Fragment::dynamic("end", |p| vec![Token::Byte(p[0])]),
            ],
        )
        .unwrap();
        let catalog = Catalog::new([def]).unwrap();
        let m = matched(&catalog, &[0x42, 0x01, 0x02, 0x42]);
        assert_eq!(m.values["body"], vec![0x01, 0x02]);
        assert_eq!(m.values["end"], vec![0x42]);
    }

    #[test]
    fn wildcard_from_dynamic_terminator_is_invalid() {
        let def = MessageDef::new(
            "bad",
            vec![Fragment::scan("body"), Fragment::dynamic("end", |_| vec![Token::Any])],
        )
        .unwrap();
        let catalog = Catalog::new([def]).unwrap();
        assert!(matches!(
            recognize(&catalog, &[0x01]),
            Err(Error::InvalidDefinition {
                reason: DefinitionError::WildcardTerminator,
                ..
            })
        ));
    }

    #[test]
    fn skipping_reports_invalid_definition_and_tries_the_rest() {
        let bad = MessageDef::new(
            "bad",
            vec![Fragment::scan("body"), Fragment::dynamic("end", |_| vec![Token::Any])],
        )
        .unwrap();
        let ack = MessageDef::new("ack", vec![Fragment::fixed("ack", &[0x06])]).unwrap();
        let catalog = Catalog::new([bad, ack]).unwrap();

        let mut errors = Vec::new();
        match recognize_skipping(&catalog, &[0x06], |e| errors.push(e)) {
            Recognition::Matched(m) => assert_eq!(m.message_type, "ack"),
            Recognition::NotYet => panic!("ack not recognized"),
        }
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], Error::InvalidDefinition { message, .. } if message == "bad"));

        // The strict variant gives up on the first invalid definition
        assert!(recognize(&catalog, &[0x06]).is_err());
    }
}
