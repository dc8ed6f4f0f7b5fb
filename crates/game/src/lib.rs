pub mod ecs;
pub mod input;
pub mod net;
pub mod prediction;
pub mod rollback;
pub mod simulation;
pub mod snapshot;

pub use ecs::{EntityId, Registry};
pub use input::{
    InputBuffer, InputCommand, InputHistory, InputHistoryEntry, NetworkSender, SendError,
    SenderConfig,
};
pub use net::{
    DEFAULT_PORT, DEFAULT_TICK_RATE, DatagramSocket, InputFlags, InputPacket, Message, MessageType,
    NetworkStats, PacketDirection, PacketHeader, TransportError, UdpEndpoint,
};
pub use prediction::{ReconcileConfig, ReconcileOutcome, Reconciler};
pub use rollback::{ClientRollbackHandler, RollbackManager};
pub use simulation::{FixedTimestep, InputProcessor, InputQueue};
pub use snapshot::{
    CachedEntityState, ClientEntityState, HISTORY_SIZE, StateChecksum, StateHistory, StateSnapshot,
};
