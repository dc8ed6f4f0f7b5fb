use serde::{Deserialize, Serialize};

use super::protocol::{ByteReader, ByteWriter, Message, MessageType, PacketDirection};

pub type RoomId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RoomType {
    Casual = 0,
    Ranked = 1,
}

impl RoomType {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Casual),
            1 => Some(Self::Ranked),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RoomState {
    Waiting = 0,
    Countdown = 1,
    InGame = 2,
    Finished = 3,
}

impl RoomState {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Waiting),
            1 => Some(Self::Countdown),
            2 => Some(Self::InGame),
            3 => Some(Self::Finished),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RoomVisibility {
    Public = 0,
    Unlisted = 1,
}

impl RoomVisibility {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Public),
            1 => Some(Self::Unlisted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub room_type: RoomType,
    pub player_count: u16,
    pub max_players: u16,
    pub port: u16,
    pub state: RoomState,
    pub owner_id: u32,
    pub password_protected: bool,
    pub visibility: RoomVisibility,
    pub countdown: u8,
    pub name: String,
    pub invite_code: String,
}

impl RoomInfo {
    pub fn is_full(&self) -> bool {
        self.player_count >= self.max_players
    }

    fn write(&self, writer: &mut ByteWriter) {
        writer.put_u32(self.room_id);
        writer.put_u8(self.room_type as u8);
        writer.put_u16(self.player_count);
        writer.put_u16(self.max_players);
        writer.put_u16(self.port);
        writer.put_u8(self.state as u8);
        writer.put_u32(self.owner_id);
        writer.put_bool(self.password_protected);
        writer.put_u8(self.visibility as u8);
        writer.put_u8(self.countdown);
        writer.put_prefixed(self.name.as_bytes());
        writer.put_prefixed(self.invite_code.as_bytes());
    }

    fn read(reader: &mut ByteReader<'_>) -> Option<Self> {
        Some(Self {
            room_id: reader.u32()?,
            room_type: RoomType::from_u8(reader.u8()?)?,
            player_count: reader.u16()?,
            max_players: reader.u16()?,
            port: reader.u16()?,
            state: RoomState::from_u8(reader.u8()?)?,
            owner_id: reader.u32()?,
            password_protected: reader.bool()?,
            visibility: RoomVisibility::from_u8(reader.u8()?)?,
            countdown: reader.u8()?,
            name: reader.prefixed_string()?,
            invite_code: reader.prefixed_string()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListRooms;

impl Message for ListRooms {
    const MESSAGE_TYPE: MessageType = MessageType::LobbyListRooms;
    const DIRECTION: PacketDirection = PacketDirection::ClientToServer;

    fn write_payload(&self, _writer: &mut ByteWriter) {}

    fn read_payload(_reader: &mut ByteReader<'_>) -> Option<Self> {
        Some(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoomList {
    pub rooms: Vec<RoomInfo>,
}

impl Message for RoomList {
    const MESSAGE_TYPE: MessageType = MessageType::LobbyRoomList;
    const DIRECTION: PacketDirection = PacketDirection::ServerToClient;

    fn write_payload(&self, writer: &mut ByteWriter) {
        let count = self.rooms.len().min(u16::MAX as usize);
        writer.put_u16(count as u16);
        for room in &self.rooms[..count] {
            room.write(writer);
        }
    }

    fn read_payload(reader: &mut ByteReader<'_>) -> Option<Self> {
        let count = reader.u16()? as usize;
        let mut rooms = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            rooms.push(RoomInfo::read(reader)?);
        }
        Some(Self { rooms })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRoom {
    pub name: String,
    pub room_type: RoomType,
    pub max_players: u16,
    pub visibility: RoomVisibility,
    pub password_hash: Option<String>,
}

impl Message for CreateRoom {
    const MESSAGE_TYPE: MessageType = MessageType::LobbyCreateRoom;
    const DIRECTION: PacketDirection = PacketDirection::ClientToServer;

    fn write_payload(&self, writer: &mut ByteWriter) {
        writer.put_prefixed(self.name.as_bytes());
        writer.put_u8(self.room_type as u8);
        writer.put_u16(self.max_players);
        writer.put_u8(self.visibility as u8);
        writer.put_prefixed(self.password_hash.as_deref().unwrap_or_default().as_bytes());
    }

    fn read_payload(reader: &mut ByteReader<'_>) -> Option<Self> {
        let name = reader.prefixed_string()?;
        let room_type = RoomType::from_u8(reader.u8()?)?;
        let max_players = reader.u16()?;
        let visibility = RoomVisibility::from_u8(reader.u8()?)?;
        let password_hash = reader.prefixed_string()?;
        Some(Self {
            name,
            room_type,
            max_players,
            visibility,
            password_hash: (!password_hash.is_empty()).then_some(password_hash),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomCreated {
    pub room_id: RoomId,
    pub port: u16,
}

impl Message for RoomCreated {
    const MESSAGE_TYPE: MessageType = MessageType::LobbyRoomCreated;
    const DIRECTION: PacketDirection = PacketDirection::ServerToClient;

    fn write_payload(&self, writer: &mut ByteWriter) {
        writer.put_u32(self.room_id);
        writer.put_u16(self.port);
    }

    fn read_payload(reader: &mut ByteReader<'_>) -> Option<Self> {
        Some(Self {
            room_id: reader.u32()?,
            port: reader.u16()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRoom {
    pub room_id: RoomId,
    pub spectator: bool,
    pub password_hash: Option<String>,
}

impl Message for JoinRoom {
    const MESSAGE_TYPE: MessageType = MessageType::LobbyJoinRoom;
    const DIRECTION: PacketDirection = PacketDirection::ClientToServer;

    fn write_payload(&self, writer: &mut ByteWriter) {
        writer.put_u32(self.room_id);
        writer.put_bool(self.spectator);
        writer.put_prefixed(self.password_hash.as_deref().unwrap_or_default().as_bytes());
    }

    fn read_payload(reader: &mut ByteReader<'_>) -> Option<Self> {
        let room_id = reader.u32()?;
        let spectator = reader.bool()?;
        let password_hash = reader.prefixed_string()?;
        Some(Self {
            room_id,
            spectator,
            password_hash: (!password_hash.is_empty()).then_some(password_hash),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinSuccess {
    pub room_id: RoomId,
    pub port: u16,
}

impl Message for JoinSuccess {
    const MESSAGE_TYPE: MessageType = MessageType::LobbyJoinSuccess;
    const DIRECTION: PacketDirection = PacketDirection::ServerToClient;

    fn write_payload(&self, writer: &mut ByteWriter) {
        writer.put_u32(self.room_id);
        writer.put_u16(self.port);
    }

    fn read_payload(reader: &mut ByteReader<'_>) -> Option<Self> {
        Some(Self {
            room_id: reader.u32()?,
            port: reader.u16()?,
        })
    }
}

/// Join refusal. An empty payload carries no reason.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JoinFailed {
    pub reason: Option<String>,
}

impl Message for JoinFailed {
    const MESSAGE_TYPE: MessageType = MessageType::LobbyJoinFailed;
    const DIRECTION: PacketDirection = PacketDirection::ServerToClient;

    fn write_payload(&self, writer: &mut ByteWriter) {
        if let Some(reason) = &self.reason {
            writer.put_prefixed(reason.as_bytes());
        }
    }

    fn read_payload(reader: &mut ByteReader<'_>) -> Option<Self> {
        if reader.is_empty() {
            return Some(Self { reason: None });
        }
        Some(Self {
            reason: Some(reader.prefixed_string()?),
        })
    }
}
