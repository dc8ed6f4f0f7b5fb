mod checksum;
mod dump;
mod entity;
mod history;

pub use checksum::{ChecksumFields, StateChecksum};
pub use dump::{DumpError, EntityRecord, SnapshotDump};
pub use entity::{
    CachedEntityState, ClientEntityState, RESTORED_INVINCIBILITY_SECS, SnapshotState, StatusFlags,
};
pub use history::{EntityMap, HISTORY_SIZE, StateHistory, StateSnapshot};
