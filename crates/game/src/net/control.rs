use super::protocol::{ByteReader, ByteWriter, Message, MessageType, PacketDirection};

/// Server-computed digests of its state at `tick`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChecksumPacket {
    pub tick: u32,
    pub checksum: u32,
    pub critical_checksum: u32,
    pub entity_count: u16,
}

impl Message for StateChecksumPacket {
    const MESSAGE_TYPE: MessageType = MessageType::StateChecksum;
    const DIRECTION: PacketDirection = PacketDirection::ServerToClient;

    fn write_payload(&self, writer: &mut ByteWriter) {
        writer.put_u32(self.tick);
        writer.put_u32(self.checksum);
        writer.put_u32(self.critical_checksum);
        writer.put_u16(self.entity_count);
    }

    fn read_payload(reader: &mut ByteReader<'_>) -> Option<Self> {
        Some(Self {
            tick: reader.u32()?,
            checksum: reader.u32()?,
            critical_checksum: reader.u32()?,
            entity_count: reader.u16()?,
        })
    }
}

/// Asks a client to rewind to `target_tick`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollbackRequestPacket {
    pub target_tick: u32,
    pub current_tick: u32,
}

impl Message for RollbackRequestPacket {
    const MESSAGE_TYPE: MessageType = MessageType::RollbackRequest;
    const DIRECTION: PacketDirection = PacketDirection::ServerToClient;

    fn write_payload(&self, writer: &mut ByteWriter) {
        writer.put_u32(self.target_tick);
        writer.put_u32(self.current_tick);
    }

    fn read_payload(reader: &mut ByteReader<'_>) -> Option<Self> {
        let target_tick = reader.u32()?;
        let current_tick = reader.u32()?;
        if target_tick > current_tick {
            return None;
        }
        Some(Self {
            target_tick,
            current_tick,
        })
    }
}

/// A client reporting that its digest for `tick` disagrees with the server's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesyncDetectedPacket {
    pub tick: u32,
    pub expected: u32,
    pub actual: u32,
}

impl Message for DesyncDetectedPacket {
    const MESSAGE_TYPE: MessageType = MessageType::DesyncDetected;
    const DIRECTION: PacketDirection = PacketDirection::ClientToServer;

    fn write_payload(&self, writer: &mut ByteWriter) {
        writer.put_u32(self.tick);
        writer.put_u32(self.expected);
        writer.put_u32(self.actual);
    }

    fn read_payload(reader: &mut ByteReader<'_>) -> Option<Self> {
        Some(Self {
            tick: reader.u32()?,
            expected: reader.u32()?,
            actual: reader.u32()?,
        })
    }
}

/// Round-trip probe. The reply echoes the header sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ping;

impl Message for Ping {
    const MESSAGE_TYPE: MessageType = MessageType::ClientPing;
    const DIRECTION: PacketDirection = PacketDirection::ClientToServer;

    fn write_payload(&self, _writer: &mut ByteWriter) {}

    fn read_payload(_reader: &mut ByteReader<'_>) -> Option<Self> {
        Some(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pong;

impl Message for Pong {
    const MESSAGE_TYPE: MessageType = MessageType::ServerPong;
    const DIRECTION: PacketDirection = PacketDirection::ServerToClient;

    fn write_payload(&self, _writer: &mut ByteWriter) {}

    fn read_payload(_reader: &mut ByteReader<'_>) -> Option<Self> {
        Some(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_packet() {
        let packet = StateChecksumPacket {
            tick: 1200,
            checksum: 0xDEAD_BEEF,
            critical_checksum: 0x0BAD_F00D,
            entity_count: 4,
        };
        let (header, decoded) =
            StateChecksumPacket::decode(&packet.encode(1, 1200).unwrap()).unwrap();
        assert_eq!(header.tick, 1200);
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_rollback_request_rejects_future_target() {
        let ok = RollbackRequestPacket {
            target_tick: 10,
            current_tick: 15,
        };
        assert!(RollbackRequestPacket::decode(&ok.encode(0, 15).unwrap()).is_some());

        let bad = RollbackRequestPacket {
            target_tick: 20,
            current_tick: 15,
        };
        assert!(RollbackRequestPacket::decode(&bad.encode(0, 15).unwrap()).is_none());
    }

    #[test]
    fn test_desync_direction() {
        let packet = DesyncDetectedPacket {
            tick: 5,
            expected: 1,
            actual: 2,
        };
        let bytes = packet.encode(0, 5).unwrap();
        let (header, decoded) = DesyncDetectedPacket::decode(&bytes).unwrap();
        assert_eq!(header.direction, PacketDirection::ClientToServer);
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_pong_echoes_sequence() {
        let (ping_header, _) = Ping::decode(&Ping.encode(41, 0).unwrap()).unwrap();
        let reply = Pong.encode(ping_header.sequence, 0).unwrap();
        let (pong_header, _) = Pong::decode(&reply).unwrap();
        assert_eq!(pong_header.sequence, 41);
        assert!(Ping::decode(&reply).is_none());
    }
}
