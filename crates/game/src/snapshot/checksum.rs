use std::collections::HashMap;

use crc32fast::Hasher;
use glam::Vec2;

use super::entity::{CachedEntityState, ClientEntityState};
use crate::ecs::EntityId;

/// Canonical big-endian byte feed for checksumming an entity state.
pub trait ChecksumFields {
    fn write_fields(&self, hasher: &mut Hasher);

    /// Reduced field set shared by server and client states.
    fn write_critical_fields(&self, hasher: &mut Hasher);
}

fn write_vec2(hasher: &mut Hasher, v: Vec2) {
    hasher.update(&v.x.to_bits().to_be_bytes());
    hasher.update(&v.y.to_bits().to_be_bytes());
}

impl ChecksumFields for CachedEntityState {
    fn write_fields(&self, hasher: &mut Hasher) {
        write_vec2(hasher, self.position);
        write_vec2(hasher, self.velocity);
        hasher.update(&self.health.to_be_bytes());
        hasher.update(&[self.lives]);
        hasher.update(&self.score.to_be_bytes());
        hasher.update(&[self.status, self.type_id]);
    }

    fn write_critical_fields(&self, hasher: &mut Hasher) {
        write_vec2(hasher, self.position);
        hasher.update(&self.health.to_be_bytes());
    }
}

impl ChecksumFields for ClientEntityState {
    fn write_fields(&self, hasher: &mut Hasher) {
        write_vec2(hasher, self.position);
        write_vec2(hasher, self.velocity);
        hasher.update(&self.health.to_be_bytes());
    }

    fn write_critical_fields(&self, hasher: &mut Hasher) {
        write_vec2(hasher, self.position);
        hasher.update(&self.health.to_be_bytes());
    }
}

/// CRC32 digests over entity-state maps, independent of map iteration order.
pub struct StateChecksum;

impl StateChecksum {
    fn digest<S>(
        entities: &HashMap<EntityId, S>,
        mut write: impl FnMut(&S, &mut Hasher),
    ) -> u32 {
        let mut ids: Vec<EntityId> = entities.keys().copied().collect();
        ids.sort_unstable();

        let mut hasher = Hasher::new();
        for id in ids {
            hasher.update(&id.to_be_bytes());
            if let Some(state) = entities.get(&id) {
                write(state, &mut hasher);
            }
        }
        hasher.finalize()
    }

    pub fn compute<S: ChecksumFields>(entities: &HashMap<EntityId, S>) -> u32 {
        Self::digest(entities, S::write_fields)
    }

    pub fn compute_critical<S: ChecksumFields>(entities: &HashMap<EntityId, S>) -> u32 {
        Self::digest(entities, S::write_critical_fields)
    }

    pub fn verify(a: u32, b: u32) -> bool {
        a == b
    }
}
