//! MXS Protocol (MiXed Stream Protocol) as a message catalog
//!
//! Structured packets inside a mixed ASCII/binary stream, as commonly found on
//! serial/USB links where debug output and data coexist. No CRC performed.
//!
//! ```text
//! [MARKER:2][TYPE:1][LENGTH 0:1]
//! [MARKER:2][TYPE:1][LENGTH N:1][DATA:N]
//! ```

use crate::catalog::Catalog;
use crate::config::LinkConfig;
use crate::error::Result;
use crate::message::{Fields, Fragment, MessageDef, Token};

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                           MXS Protocol
// —————————————————————————————————————————————————————————————————————————————————————————————————

pub const MARKER: &[u8] = &[0xAA, 0x55];

pub const MARKER_LEN: usize = MARKER.len();
pub const TYPE_LEN: usize = 1;
pub const SIZE_LEN: usize = 1;

pub const SIZE_POS: usize = MARKER_LEN + TYPE_LEN;
pub const MAX_DATA_LEN: usize = (1usize << (SIZE_LEN * 8)) - 1;
pub const MIN_PACKET_SIZE: usize = MARKER_LEN + TYPE_LEN + SIZE_LEN;
pub const MAX_PACKET_SIZE: usize = MARKER_LEN + TYPE_LEN + SIZE_LEN + MAX_DATA_LEN;

/// Protocol Packet Types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MxsPacketType {
    Start     = 1,
    End       = 2,
    Heartbeat = 3,
    Data      = 4,
    Error     = 5,
}

impl MxsPacketType {
    pub const ALL: [Self; 5] = [Self::Start, Self::End, Self::Heartbeat, Self::Data, Self::Error];

    /// Catalog name
    pub fn name(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
            Self::Heartbeat => "heartbeat",
            Self::Data => "data",
            Self::Error => "error",
        }
    }

    /// Only `Data` and `Error` carry a payload
    pub fn has_payload(self) -> bool {
        matches!(self, Self::Data | Self::Error)
    }
}

impl TryFrom<u8> for MxsPacketType {
    type Error = ();

    fn try_from(value: u8) -> core::result::Result<Self, <MxsPacketType as TryFrom<u8>>::Error> {
        Self::ALL.into_iter().find(|t| *t as u8 == value).ok_or(())
    }
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                             Catalog
// —————————————————————————————————————————————————————————————————————————————————————————————————

pub fn catalog() -> Result<Catalog> {
    let messages = MxsPacketType::ALL
        .into_iter()
        .map(definition)
        .collect::<Result<Vec<_>>>()?;
    Catalog::new(messages)
}

fn definition(packet_type: MxsPacketType) -> Result<MessageDef> {
    let mut fragments = vec![
        Fragment::fixed("marker", MARKER),
        Fragment::fixed("type", &[packet_type as u8]),
    ];

    if packet_type.has_payload() {
        fragments.push(Fragment::wildcard("length", SIZE_LEN).with_description("payload length"));
        fragments.push(Fragment::dynamic("payload", |precedent| {
            vec![Token::Any; precedent[SIZE_POS] as usize]
        }));
    }
    else {
        fragments.push(Fragment::fixed("length", &[0]));
    }

    MessageDef::new(packet_type.name(), fragments)
}

/// Resync predicate: input starts with the marker, or with the part of it received so far.
pub fn is_message_start(remaining: &[u8]) -> bool {
    let n = remaining.len().min(MARKER_LEN);
    remaining[..n] == MARKER[..n]
}

/// Text may sit between packets, so every packet is followed by a new search
/// for the marker.
pub fn config() -> LinkConfig {
    LinkConfig::default().with_resync_between_messages(true)
}

/// Override fields for a payload packet, `None` if the payload does not fit. The
/// length byte has no default since defaults only see the bytes before them.
pub fn payload_fields(payload: &[u8]) -> Option<Fields> {
    let len = u8::try_from(payload.len()).ok()?;
    Some(Fields::from([
        ("length".to_string(), vec![len]),
        ("payload".to_string(), payload.to_vec()),
    ]))
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                              Data
// —————————————————————————————————————————————————————————————————————————————————————————————————

/// Sample carried by `Data` packets: three little endian i16.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Sample(pub i16, pub i16, pub i16);

#[derive(Debug, PartialEq, Eq)]
pub struct SampleError;

impl TryFrom<&[u8]> for Sample {
    type Error = SampleError;

    fn try_from(buf: &[u8]) -> core::result::Result<Self, Self::Error> {
        if buf.len() != size_of::<Self>() {
            return Err(SampleError);
        }

        let field = |i: usize| -> core::result::Result<i16, SampleError> {
            Ok(i16::from_le_bytes(buf[i..i + 2].try_into().map_err(|_| SampleError)?))
        };

        Ok(Self(field(0)?, field(2)?, field(4)?))
    }
}

impl Sample {
    pub fn to_bytes(self) -> Vec<u8> {
        [self.0, self.1, self.2].iter().flat_map(|v| v.to_le_bytes()).collect()
    }
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                              Tests
// —————————————————————————————————————————————————————————————————————————————————————————————————

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::error::Error;
    use crate::matcher::Recognition;
    use crate::stream::MessageStream;
    use std::sync::{Arc, Mutex};

    #[test]
    fn packet_type_from_byte() {
        assert_eq!(MxsPacketType::try_from(4), Ok(MxsPacketType::Data));
        assert_eq!(MxsPacketType::try_from(0), Err(()));
        assert_eq!(MxsPacketType::try_from(6), Err(()));
    }

    #[test]
    fn start_predicate() {
        assert!(is_message_start(&[0xAA]));
        assert!(is_message_start(&[0xAA, 0x55, 0x01]));
        assert!(!is_message_start(&[0xAA, 0x00]));
        assert!(!is_message_start(b"hello"));
    }

    #[test]
    fn generate_matches_encoder_layout() {
        let catalog = catalog().unwrap();

        let heartbeat = catalog.generate("heartbeat", &Fields::new()).unwrap();
        assert_eq!(heartbeat, vec![0xAA, 0x55, 0x03, 0x00]);
        assert_eq!(heartbeat.len(), MIN_PACKET_SIZE);

        let sample = Sample(1, -2, 300);
        let fields = payload_fields(&sample.to_bytes()).unwrap();
        let data = catalog.generate("data", &fields).unwrap();
        assert_eq!(&data[..4], &[0xAA, 0x55, 0x04, 0x06]);
        assert_eq!(Sample::try_from(&data[4..]), Ok(sample));

        let length = catalog.message("data").unwrap().fragment("length").unwrap();
        assert_eq!(length.description(), Some("payload length"));
        assert!(catalog.message("end").unwrap().fragment("payload").is_none());
    }

    #[test]
    fn data_packet_is_recognized() {
        let catalog = catalog().unwrap();
        let fields = payload_fields(&[9, 8, 7]).unwrap();
        let bytes = catalog.generate("error", &fields).unwrap();

        match catalog.recognize(&bytes).unwrap() {
            Recognition::Matched(m) => {
                assert_eq!(m.message_type, "error");
                assert_eq!(m.values["payload"], vec![9, 8, 7]);
                assert_eq!(m.values["length"], vec![3]);
            }
            Recognition::NotYet => panic!("not recognized"),
        }

        // Payload not complete yet
        assert_eq!(catalog.recognize(&bytes[..5]).unwrap(), Recognition::NotYet);
    }

    #[test]
    fn length_comes_from_payload_fields() {
        let catalog = catalog().unwrap();
        let payload_only = Fields::from([("payload".to_string(), vec![1, 2, 3])]);
        assert!(matches!(
            catalog.generate("data", &payload_only),
            Err(Error::MissingParameter { ref fragment, .. }) if fragment == "length"
        ));

        let bytes = catalog.generate("data", &payload_fields(&[1, 2, 3]).unwrap()).unwrap();
        assert_eq!(bytes, vec![0xAA, 0x55, 0x04, 0x03, 1, 2, 3]);
    }

    #[derive(Default)]
    struct Text(Mutex<Vec<u8>>);

    impl Diagnostics for Text {
        fn byte_dropped(&self, byte: u8) {
            self.0.lock().unwrap().push(byte);
        }
    }

    #[test]
    fn text_between_packets_is_dropped() {
        let text = Arc::new(Text::default());
        let mut stream = MessageStream::new(catalog().unwrap(), config())
            .with_start_predicate(is_message_start)
            .with_diagnostics(text.clone());

        let heartbeat = [0xAA, 0x55, 0x03, 0x00];
        let mut input = b"boot\n".to_vec();
        input.extend(heartbeat);
        input.extend(b"log line\n");
        input.extend(heartbeat);

        assert_eq!(stream.ingest(&input), 2);
        assert!(stream.buffer().is_empty());
        assert_eq!(*text.0.lock().unwrap(), b"boot\nlog line\n".to_vec());

        // Marker split across chunks
        assert_eq!(stream.ingest(&[b'x', 0xAA]), 0);
        assert_eq!(stream.ingest(&[0x55, 0x01, 0x00]), 1);
        assert_eq!(stream.history().back().unwrap().message_type, "start");
    }

    #[test]
    fn oversized_payload_is_refused() {
        assert!(payload_fields(&[0; MAX_DATA_LEN + 1]).is_none());
        assert!(payload_fields(&[0; MAX_DATA_LEN]).is_some());
    }

    #[test]
    fn sample_size_is_checked() {
        assert_eq!(Sample::try_from(&[0u8; 5][..]), Err(SampleError));
    }
}
