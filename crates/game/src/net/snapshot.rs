use glam::Vec2;

use super::protocol::{ByteReader, ByteWriter, Message, MessageType, PacketDirection};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapshotEntity {
    pub id: u32,
    pub position: Vec2,
    pub health: i16,
}

impl SnapshotEntity {
    pub const WIRE_SIZE: usize = 14;
}

/// Authoritative world state addressed to one client. `player_entity` names
/// the entity that client controls and `last_input_sequence` the newest of
/// its inputs the server has applied.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SnapshotPacket {
    pub player_entity: u32,
    pub last_input_sequence: u16,
    pub entities: Vec<SnapshotEntity>,
}

impl SnapshotPacket {
    pub fn entity(&self, id: u32) -> Option<&SnapshotEntity> {
        self.entities.iter().find(|e| e.id == id)
    }
}

impl Message for SnapshotPacket {
    const MESSAGE_TYPE: MessageType = MessageType::Snapshot;
    const DIRECTION: PacketDirection = PacketDirection::ServerToClient;

    fn write_payload(&self, writer: &mut ByteWriter) {
        let count = self.entities.len().min(u16::MAX as usize);
        writer.put_u32(self.player_entity);
        writer.put_u16(self.last_input_sequence);
        writer.put_u16(count as u16);
        for entity in &self.entities[..count] {
            writer.put_u32(entity.id);
            writer.put_f32(entity.position.x);
            writer.put_f32(entity.position.y);
            writer.put_i16(entity.health);
        }
    }

    fn read_payload(reader: &mut ByteReader<'_>) -> Option<Self> {
        let player_entity = reader.u32()?;
        let last_input_sequence = reader.u16()?;
        let count = reader.u16()? as usize;
        if reader.remaining() != count * SnapshotEntity::WIRE_SIZE {
            return None;
        }

        let mut entities = Vec::with_capacity(count);
        for _ in 0..count {
            let id = reader.u32()?;
            let position = Vec2::new(reader.f32()?, reader.f32()?);
            let health = reader.i16()?;
            if !position.is_finite() {
                return None;
            }
            entities.push(SnapshotEntity {
                id,
                position,
                health,
            });
        }

        Some(Self {
            player_entity,
            last_input_sequence,
            entities,
        })
    }
}
