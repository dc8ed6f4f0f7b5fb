mod control;
mod input;
mod lobby;
mod protocol;
mod snapshot;
mod stats;
mod transport;

pub use control::{DesyncDetectedPacket, Ping, Pong, RollbackRequestPacket, StateChecksumPacket};
pub use input::{InputFlags, InputPacket};
pub use lobby::{
    CreateRoom, JoinFailed, JoinRoom, JoinSuccess, ListRooms, RoomCreated, RoomId, RoomInfo,
    RoomList, RoomState, RoomType, RoomVisibility,
};
pub use protocol::{
    ByteReader, ByteWriter, CRC_SIZE, CodecError, DEFAULT_PORT, DEFAULT_TICK_RATE, Frame,
    HEADER_SIZE, MAX_PACKET_SIZE, Message, MessageType, PROTOCOL_MAGIC, PROTOCOL_VERSION,
    PacketDirection, PacketHeader, crc32, decode_frame, encode_frame, sequence_greater_than,
    try_decode_frame, widen_sequence,
};
pub use snapshot::{SnapshotEntity, SnapshotPacket};
pub use stats::NetworkStats;
pub use transport::{DatagramSocket, TransportError, TransportResult, UdpEndpoint};
