use bitflags::bitflags;
use glam::Vec2;

use super::protocol::{
    ByteReader, ByteWriter, CRC_SIZE, HEADER_SIZE, MessageType, PacketDirection, PacketHeader,
    crc32, decode_frame,
};

bitflags! {
    /// Held buttons for one input sample.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InputFlags: u16 {
        const MOVE_UP = 1 << 0;
        const MOVE_DOWN = 1 << 1;
        const MOVE_LEFT = 1 << 2;
        const MOVE_RIGHT = 1 << 3;
        const FIRE = 1 << 4;
        const CHARGE_1 = 1 << 5;
        const CHARGE_2 = 1 << 6;
        const CHARGE_3 = 1 << 7;
        const CHARGE_4 = 1 << 8;
        const CHARGE_5 = 1 << 9;
    }
}

impl InputFlags {
    pub const MOVEMENT: Self = Self::MOVE_UP
        .union(Self::MOVE_DOWN)
        .union(Self::MOVE_LEFT)
        .union(Self::MOVE_RIGHT);

    pub const CHARGE: Self = Self::CHARGE_1
        .union(Self::CHARGE_2)
        .union(Self::CHARGE_3)
        .union(Self::CHARGE_4)
        .union(Self::CHARGE_5);

    /// Unit movement direction in screen space (y grows downward), or zero
    /// when no direction is held or opposing keys cancel out.
    pub fn direction(self) -> Vec2 {
        let mut dir = Vec2::ZERO;
        if self.contains(Self::MOVE_UP) {
            dir.y -= 1.0;
        }
        if self.contains(Self::MOVE_DOWN) {
            dir.y += 1.0;
        }
        if self.contains(Self::MOVE_LEFT) {
            dir.x -= 1.0;
        }
        if self.contains(Self::MOVE_RIGHT) {
            dir.x += 1.0;
        }
        dir.normalize_or_zero()
    }

    /// Highest charge level held, 1 through 5.
    pub fn charge_level(self) -> Option<u8> {
        let charge = (self & Self::CHARGE).bits() >> 5;
        if charge == 0 {
            None
        } else {
            Some((u16::BITS - charge.leading_zeros()) as u8)
        }
    }
}

/// One client input sample on the wire: a fixed 37-byte frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputPacket {
    pub header: PacketHeader,
    pub player_id: u32,
    pub flags: InputFlags,
    pub x: f32,
    pub y: f32,
    pub angle: f32,
}

const _: () = assert!(InputPacket::SIZE == 37);

impl InputPacket {
    pub const PAYLOAD_SIZE: usize = 18;
    pub const SIZE: usize = HEADER_SIZE + Self::PAYLOAD_SIZE + CRC_SIZE;
    const CRC_OFFSET: usize = HEADER_SIZE + Self::PAYLOAD_SIZE;

    pub fn new(player_id: u32, sequence: u16, flags: InputFlags) -> Self {
        Self {
            header: Self::normalized_header(
                PacketHeader::new(PacketDirection::ClientToServer, MessageType::Input)
                    .with_sequence(sequence),
            ),
            player_id,
            flags,
            x: 0.0,
            y: 0.0,
            angle: 0.0,
        }
    }

    pub fn with_position(mut self, position: Vec2) -> Self {
        self.x = position.x;
        self.y = position.y;
        self
    }

    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    fn normalized_header(mut header: PacketHeader) -> PacketHeader {
        header.direction = PacketDirection::ClientToServer;
        header.message_type = MessageType::Input;
        header.compressed = false;
        header.payload_size = Self::PAYLOAD_SIZE as u16;
        header.original_size = Self::PAYLOAD_SIZE as u16;
        header
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let header = Self::normalized_header(self.header);

        let mut payload = ByteWriter::with_capacity(Self::PAYLOAD_SIZE);
        payload.put_u32(self.player_id);
        payload.put_u16(self.flags.bits());
        payload.put_f32(self.x);
        payload.put_f32(self.y);
        payload.put_f32(self.angle);

        let mut out = [0u8; Self::SIZE];
        out[..HEADER_SIZE].copy_from_slice(&header.encode());
        out[HEADER_SIZE..Self::CRC_OFFSET].copy_from_slice(payload.as_slice());
        let crc = crc32(&out[..Self::CRC_OFFSET]);
        out[Self::CRC_OFFSET..].copy_from_slice(&crc.to_be_bytes());
        out
    }

    /// Rejects anything that is not exactly one valid, finite input frame.
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() != Self::SIZE {
            return None;
        }
        let frame = decode_frame(data)?;
        let header = frame.header;
        if header.message_type != MessageType::Input
            || header.direction != PacketDirection::ClientToServer
            || header.payload_size as usize != Self::PAYLOAD_SIZE
        {
            return None;
        }

        let mut reader = ByteReader::new(frame.payload);
        let player_id = reader.u32()?;
        let flags = InputFlags::from_bits_retain(reader.u16()?);
        let x = reader.f32()?;
        let y = reader.f32()?;
        let angle = reader.f32()?;
        if !(x.is_finite() && y.is_finite() && angle.is_finite()) {
            return None;
        }

        Some(Self {
            header,
            player_id,
            flags,
            x,
            y,
            angle,
        })
    }
}
