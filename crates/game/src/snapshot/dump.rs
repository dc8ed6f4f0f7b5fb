use glam::Vec2;
use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize, rancor};

use super::entity::CachedEntityState;
use super::history::{EntityMap, StateSnapshot};
use crate::ecs::EntityId;

#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    #[error("snapshot serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("snapshot deserialization failed: {0}")]
    Deserialize(rancor::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct EntityRecord {
    pub id: EntityId,
    pub position: [f32; 2],
    pub velocity: [f32; 2],
    pub health: i16,
    pub lives: u8,
    pub score: i32,
    pub status: u8,
    pub type_id: u8,
}

impl EntityRecord {
    fn from_state(id: EntityId, state: &CachedEntityState) -> Self {
        Self {
            id,
            position: state.position.to_array(),
            velocity: state.velocity.to_array(),
            health: state.health,
            lives: state.lives,
            score: state.score,
            status: state.status,
            type_id: state.type_id,
        }
    }

    pub fn to_state(&self) -> CachedEntityState {
        CachedEntityState {
            position: Vec2::from_array(self.position),
            velocity: Vec2::from_array(self.velocity),
            health: self.health,
            lives: self.lives,
            score: self.score,
            status: self.status,
            type_id: self.type_id,
            initialized: true,
        }
    }
}

/// Self-contained copy of one server snapshot, written out when a client
/// reports a desync so the two states can be diffed offline.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct SnapshotDump {
    pub tick: u64,
    pub checksum: u32,
    pub entities: Vec<EntityRecord>,
}

impl SnapshotDump {
    pub fn from_snapshot(snapshot: &StateSnapshot<CachedEntityState>) -> Self {
        let mut entities: Vec<EntityRecord> = snapshot
            .entities
            .iter()
            .map(|(id, state)| EntityRecord::from_state(*id, state))
            .collect();
        entities.sort_unstable_by_key(|e| e.id);

        Self {
            tick: snapshot.tick,
            checksum: snapshot.checksum,
            entities,
        }
    }

    pub fn entity_map(&self) -> EntityMap<CachedEntityState> {
        self.entities.iter().map(|e| (e.id, e.to_state())).collect()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, DumpError> {
        rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(DumpError::Serialize)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, DumpError> {
        let mut aligned = AlignedVec::<16>::with_capacity(data.len());
        aligned.extend_from_slice(data);
        rkyv::from_bytes::<Self, rancor::Error>(&aligned).map_err(DumpError::Deserialize)
    }
}

impl StateSnapshot<CachedEntityState> {
    pub fn archive_entities(&self) -> Result<Vec<u8>, DumpError> {
        SnapshotDump::from_snapshot(self).to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::StateChecksum;

    #[test]
    fn test_dump_preserves_checksum_of_entities() {
        let mut entities = EntityMap::new();
        entities.insert(
            4,
            CachedEntityState {
                position: Vec2::new(1.0, 2.0),
                velocity: Vec2::new(-3.0, 0.5),
                health: 75,
                lives: 2,
                score: 900,
                status: 0b10,
                type_id: 1,
                initialized: true,
            },
        );
        entities.insert(
            2,
            CachedEntityState {
                position: Vec2::new(9.0, 9.0),
                initialized: true,
                ..Default::default()
            },
        );
        let checksum = StateChecksum::compute(&entities);
        let snapshot = StateSnapshot {
            tick: 42,
            entities,
            checksum,
        };

        let bytes = snapshot.archive_entities().unwrap();
        let dump = SnapshotDump::from_bytes(&bytes).unwrap();
        assert_eq!(dump.tick, 42);
        assert_eq!(
            dump.entities.iter().map(|e| e.id).collect::<Vec<_>>(),
            vec![2, 4]
        );
        assert_eq!(StateChecksum::compute(&dump.entity_map()), checksum);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(SnapshotDump::from_bytes(&[0xFF; 3]).is_err());
    }
}
