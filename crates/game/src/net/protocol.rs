use thiserror::Error;

pub const MAX_PACKET_SIZE: usize = 1200;
pub const PROTOCOL_VERSION: u8 = 1;
pub const PROTOCOL_MAGIC: [u8; 2] = [0xA3, 0x5F];
pub const DEFAULT_PORT: u16 = 27015;
pub const DEFAULT_TICK_RATE: u32 = 60;

/// Encoded header length: magic, version, direction, message type,
/// sequence, tick, payload size, original size.
pub const HEADER_SIZE: usize = 15;
pub const CRC_SIZE: usize = 4;

const COMPRESSED_BIT: u8 = 0x80;
const VERSION_MASK: u8 = 0x7F;
const SEQUENCE_WRAP_THRESHOLD: u16 = u16::MAX / 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("buffer too short: needed {needed} bytes, had {available}")]
    Truncated { needed: usize, available: usize },
    #[error("bad protocol magic")]
    BadMagic,
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),
    #[error("unknown packet direction {0:#04x}")]
    UnknownDirection(u8),
    #[error("unknown message type {0:#04x}")]
    UnknownMessageType(u8),
    #[error("declared payload of {declared} bytes does not match frame of {actual} bytes")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("crc mismatch: transmitted {transmitted:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { transmitted: u32, computed: u32 },
    #[error("payload of {0} bytes does not fit a frame")]
    PayloadTooLarge(usize),
    #[error("expected {expected:?}, got {actual:?}")]
    UnexpectedMessage {
        expected: MessageType,
        actual: MessageType,
    },
    #[error("{0:?} packet travelling in the wrong direction")]
    WrongDirection(MessageType),
    #[error("malformed {0:?} payload")]
    MalformedPayload(MessageType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketDirection {
    ClientToServer = 0x01,
    ServerToClient = 0x02,
}

impl TryFrom<u8> for PacketDirection {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::ClientToServer),
            0x02 => Ok(Self::ServerToClient),
            other => Err(CodecError::UnknownDirection(other)),
        }
    }
}

macro_rules! message_types {
    ($($name:ident = $value:expr),+ $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum MessageType {
            $($name = $value),+
        }

        impl TryFrom<u8> for MessageType {
            type Error = CodecError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok(Self::$name),)+
                    other => Err(CodecError::UnknownMessageType(other)),
                }
            }
        }
    };
}

message_types! {
    Invalid = 0x00,
    ClientHello = 0x01,
    ClientJoinRequest = 0x02,
    ClientReady = 0x03,
    ClientPing = 0x04,
    Input = 0x05,
    ClientAcknowledge = 0x06,
    ClientDisconnect = 0x07,
    ServerHello = 0x10,
    ServerJoinAccept = 0x11,
    ServerJoinDeny = 0x12,
    ServerPong = 0x13,
    Snapshot = 0x14,
    GameStart = 0x15,
    GameEnd = 0x16,
    ServerKick = 0x17,
    ServerDisconnect = 0x1A,
    PlayerDisconnected = 0x1C,
    EntitySpawn = 0x1D,
    EntityDestroyed = 0x1E,
    LobbyListRooms = 0x40,
    LobbyRoomList = 0x41,
    LobbyCreateRoom = 0x42,
    LobbyRoomCreated = 0x43,
    LobbyJoinRoom = 0x44,
    LobbyJoinSuccess = 0x45,
    LobbyJoinFailed = 0x46,
    LobbyPasswordRequired = 0x47,
    LobbyPasswordIncorrect = 0x48,
    LobbyLeaveRoom = 0x49,
    StateChecksum = 0x60,
    RollbackRequest = 0x61,
    DesyncDetected = 0x62,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub version: u8,
    pub compressed: bool,
    pub direction: PacketDirection,
    pub message_type: MessageType,
    pub sequence: u16,
    pub tick: u32,
    pub payload_size: u16,
    pub original_size: u16,
}

impl PacketHeader {
    pub fn new(direction: PacketDirection, message_type: MessageType) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            compressed: false,
            direction,
            message_type,
            sequence: 0,
            tick: 0,
            payload_size: 0,
            original_size: 0,
        }
    }

    pub fn with_sequence(mut self, sequence: u16) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_tick(mut self, tick: u32) -> Self {
        self.tick = tick;
        self
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0] = PROTOCOL_MAGIC[0];
        out[1] = PROTOCOL_MAGIC[1];
        out[2] = (self.version & VERSION_MASK) | if self.compressed { COMPRESSED_BIT } else { 0 };
        out[3] = self.direction as u8;
        out[4] = self.message_type as u8;
        out[5..7].copy_from_slice(&self.sequence.to_be_bytes());
        out[7..11].copy_from_slice(&self.tick.to_be_bytes());
        out[11..13].copy_from_slice(&self.payload_size.to_be_bytes());
        out[13..15].copy_from_slice(&self.original_size.to_be_bytes());
        out
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        Self::try_decode(data).ok()
    }

    pub fn try_decode(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < HEADER_SIZE {
            return Err(CodecError::Truncated {
                needed: HEADER_SIZE,
                available: data.len(),
            });
        }
        if data[..2] != PROTOCOL_MAGIC {
            return Err(CodecError::BadMagic);
        }
        let version = data[2] & VERSION_MASK;
        if version != PROTOCOL_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }

        Ok(Self {
            version,
            compressed: data[2] & COMPRESSED_BIT != 0,
            direction: PacketDirection::try_from(data[3])?,
            message_type: MessageType::try_from(data[4])?,
            sequence: u16::from_be_bytes([data[5], data[6]]),
            tick: u32::from_be_bytes([data[7], data[8], data[9], data[10]]),
            payload_size: u16::from_be_bytes([data[11], data[12]]),
            original_size: u16::from_be_bytes([data[13], data[14]]),
        })
    }
}

/// IEEE 802.3 CRC-32 as carried in every frame trailer.
#[inline]
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

#[inline]
pub fn sequence_greater_than(s1: u16, s2: u16) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

/// Recovers the full 32-bit sequence a truncated wire sequence refers to,
/// picking the candidate closest to `reference`.
pub fn widen_sequence(reference: u32, wire: u16) -> u32 {
    let base = reference & !0xFFFF;
    let candidate = base | wire as u32;
    let reference_low = reference as u16;

    if sequence_greater_than(wire, reference_low) {
        if wire < reference_low {
            candidate.wrapping_add(0x1_0000)
        } else {
            candidate
        }
    } else if wire > reference_low && base >= 0x1_0000 {
        candidate - 0x1_0000
    } else {
        candidate
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub header: PacketHeader,
    pub payload: &'a [u8],
}

/// Frames `payload` behind `header`, filling in the size fields and the CRC trailer.
pub fn encode_frame(header: &PacketHeader, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    let payload_size =
        u16::try_from(payload.len()).map_err(|_| CodecError::PayloadTooLarge(payload.len()))?;

    let mut header = *header;
    header.payload_size = payload_size;
    if !header.compressed {
        header.original_size = payload_size;
    }

    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(payload);
    let crc = crc32(&out);
    out.extend_from_slice(&crc.to_be_bytes());
    Ok(out)
}

pub fn decode_frame(data: &[u8]) -> Option<Frame<'_>> {
    match try_decode_frame(data) {
        Ok(frame) => Some(frame),
        Err(e) => {
            log::debug!("dropping datagram: {}", e);
            None
        }
    }
}

pub fn try_decode_frame(data: &[u8]) -> Result<Frame<'_>, CodecError> {
    let header = PacketHeader::try_decode(data)?;
    let payload_len = header.payload_size as usize;
    let expected = HEADER_SIZE + payload_len + CRC_SIZE;
    if data.len() != expected {
        return Err(CodecError::LengthMismatch {
            declared: expected,
            actual: data.len(),
        });
    }

    let crc_offset = HEADER_SIZE + payload_len;
    let transmitted = u32::from_be_bytes([
        data[crc_offset],
        data[crc_offset + 1],
        data[crc_offset + 2],
        data[crc_offset + 3],
    ]);
    let computed = crc32(&data[..crc_offset]);
    if transmitted != computed {
        return Err(CodecError::ChecksumMismatch {
            transmitted,
            computed,
        });
    }

    Ok(Frame {
        header,
        payload: &data[HEADER_SIZE..crc_offset],
    })
}

#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_bool(&mut self, value: bool) {
        self.buf.push(value as u8);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Floats travel as the big-endian bit pattern of their f32 value.
    pub fn put_f32(&mut self, value: f32) {
        self.put_u32(value.to_bits());
    }

    /// Writes a u16 length prefix followed by the bytes. Input longer than
    /// `u16::MAX` is truncated.
    pub fn put_prefixed(&mut self, bytes: &[u8]) {
        let len = bytes.len().min(u16::MAX as usize);
        self.put_u16(len as u16);
        self.buf.extend_from_slice(&bytes[..len]);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let bytes = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        self.take(N)?.try_into().ok()
    }

    pub fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    pub fn bool(&mut self) -> Option<bool> {
        self.u8().map(|b| b != 0)
    }

    pub fn u16(&mut self) -> Option<u16> {
        self.take_array().map(u16::from_be_bytes)
    }

    pub fn i16(&mut self) -> Option<i16> {
        self.take_array().map(i16::from_be_bytes)
    }

    pub fn u32(&mut self) -> Option<u32> {
        self.take_array().map(u32::from_be_bytes)
    }

    pub fn i32(&mut self) -> Option<i32> {
        self.take_array().map(i32::from_be_bytes)
    }

    pub fn f32(&mut self) -> Option<f32> {
        self.u32().map(f32::from_bits)
    }

    pub fn prefixed(&mut self) -> Option<&'a [u8]> {
        let len = self.u16()? as usize;
        self.take(len)
    }

    pub fn prefixed_string(&mut self) -> Option<String> {
        self.prefixed()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}

/// A typed payload carried in a standard header + CRC frame.
pub trait Message: Sized {
    const MESSAGE_TYPE: MessageType;
    const DIRECTION: PacketDirection;

    fn write_payload(&self, writer: &mut ByteWriter);

    fn read_payload(reader: &mut ByteReader<'_>) -> Option<Self>;

    fn encode(&self, sequence: u16, tick: u32) -> Result<Vec<u8>, CodecError> {
        let header = PacketHeader::new(Self::DIRECTION, Self::MESSAGE_TYPE)
            .with_sequence(sequence)
            .with_tick(tick);
        let mut writer = ByteWriter::new();
        self.write_payload(&mut writer);
        encode_frame(&header, writer.as_slice())
    }

    fn decode(data: &[u8]) -> Option<(PacketHeader, Self)> {
        let frame = decode_frame(data)?;
        Self::from_frame(&frame)
    }

    fn from_frame(frame: &Frame<'_>) -> Option<(PacketHeader, Self)> {
        if frame.header.message_type != Self::MESSAGE_TYPE
            || frame.header.direction != Self::DIRECTION
        {
            return None;
        }
        let mut reader = ByteReader::new(frame.payload);
        let message = Self::read_payload(&mut reader)?;
        if !reader.is_empty() {
            return None;
        }
        Some((frame.header, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> PacketHeader {
        PacketHeader::new(PacketDirection::ServerToClient, MessageType::Snapshot)
            .with_sequence(0xBEEF)
            .with_tick(0x0102_0304)
    }

    #[test]
    fn test_crc32_reference_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(&[]), 0);
    }

    #[test]
    fn test_header_layout_is_big_endian() {
        let mut header = sample_header();
        header.payload_size = 0x0A0B;
        header.original_size = 0x0C0D;
        let bytes = header.encode();

        assert_eq!(&bytes[..2], &PROTOCOL_MAGIC);
        assert_eq!(bytes[2], PROTOCOL_VERSION);
        assert_eq!(bytes[3], 0x02);
        assert_eq!(bytes[4], 0x14);
        assert_eq!(&bytes[5..7], &[0xBE, 0xEF]);
        assert_eq!(&bytes[7..11], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[11..13], &[0x0A, 0x0B]);
        assert_eq!(&bytes[13..15], &[0x0C, 0x0D]);
        assert_eq!(PacketHeader::decode(&bytes), Some(header));
    }

    #[test]
    fn test_compressed_flag_shares_version_byte() {
        let mut header = sample_header();
        header.compressed = true;
        let bytes = header.encode();
        assert_eq!(bytes[2], PROTOCOL_VERSION | 0x80);
        assert!(PacketHeader::decode(&bytes).unwrap().compressed);
    }

    #[test]
    fn test_header_rejects_bad_input() {
        let bytes = sample_header().encode();
        assert!(PacketHeader::decode(&bytes[..HEADER_SIZE - 1]).is_none());

        let mut bad_magic = bytes;
        bad_magic[0] ^= 0xFF;
        assert_eq!(
            PacketHeader::try_decode(&bad_magic),
            Err(CodecError::BadMagic)
        );

        let mut bad_version = bytes;
        bad_version[2] = 7;
        assert_eq!(
            PacketHeader::try_decode(&bad_version),
            Err(CodecError::UnsupportedVersion(7))
        );

        let mut bad_type = bytes;
        bad_type[4] = 0xEE;
        assert_eq!(
            PacketHeader::try_decode(&bad_type),
            Err(CodecError::UnknownMessageType(0xEE))
        );
    }

    #[test]
    fn test_frame_roundtrip_and_corruption() {
        let payload = [1u8, 2, 3, 4, 5, 6, 7];
        let bytes = encode_frame(&sample_header(), &payload).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + payload.len() + CRC_SIZE);

        let frame = decode_frame(&bytes).unwrap();
        assert_eq!(frame.payload, &payload);
        assert_eq!(frame.header.payload_size, payload.len() as u16);
        assert_eq!(frame.header.original_size, payload.len() as u16);

        for i in 0..bytes.len() {
            let mut corrupted = bytes.clone();
            corrupted[i] ^= 0x01;
            assert!(
                decode_frame(&corrupted).is_none(),
                "byte {} flip accepted",
                i
            );
        }
    }

    #[test]
    fn test_frame_length_must_match_declared_payload() {
        let bytes = encode_frame(&sample_header(), &[9u8; 4]).unwrap();

        let mut longer = bytes.clone();
        longer.push(0);
        assert!(matches!(
            try_decode_frame(&longer),
            Err(CodecError::LengthMismatch { .. })
        ));
        assert!(try_decode_frame(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_reader_underflow_returns_none() {
        let mut writer = ByteWriter::new();
        writer.put_u16(3);
        writer.put_u8(b'a');
        let mut reader = ByteReader::new(writer.as_slice());
        assert!(reader.prefixed().is_none());

        let mut reader = ByteReader::new(&[0x00]);
        assert!(reader.u32().is_none());
    }

    #[test]
    fn test_writer_reader_primitives() {
        let mut writer = ByteWriter::new();
        writer.put_i16(-2);
        writer.put_i32(-70_000);
        writer.put_f32(-1.5);
        writer.put_prefixed(b"room");

        let mut reader = ByteReader::new(writer.as_slice());
        assert_eq!(reader.i16(), Some(-2));
        assert_eq!(reader.i32(), Some(-70_000));
        assert_eq!(reader.f32(), Some(-1.5));
        assert_eq!(reader.prefixed_string().as_deref(), Some("room"));
        assert!(reader.is_empty());
    }

    #[test]
    fn test_sequence_comparison() {
        assert!(sequence_greater_than(2, 1));
        assert!(!sequence_greater_than(1, 2));
        assert!(sequence_greater_than(0, u16::MAX));
        assert!(!sequence_greater_than(u16::MAX, 0));
    }

    #[test]
    fn test_widen_sequence() {
        assert_eq!(widen_sequence(10, 7), 7);
        assert_eq!(widen_sequence(0x1_0005, 0x0003), 0x1_0003);
        assert_eq!(widen_sequence(0x1_0002, 0xFFFE), 0xFFFE);
        assert_eq!(widen_sequence(0xFFFE, 0x0001), 0x1_0001);
    }
}
