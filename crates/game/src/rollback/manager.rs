use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{extract_states, restore_states};
use crate::ecs::Registry;
use crate::snapshot::{
    CachedEntityState, DumpError, HISTORY_SIZE, StateChecksum, StateHistory, StateSnapshot,
};

/// Authoritative per-tick state history. Safe to share between the tick
/// loop and the packet-receive path.
#[derive(Debug)]
pub struct RollbackManager {
    history: Mutex<StateHistory<CachedEntityState>>,
}

impl Default for RollbackManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RollbackManager {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            history: Mutex::new(StateHistory::with_capacity(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StateHistory<CachedEntityState>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the world at `tick` and returns its checksum.
    pub fn capture_state(&self, tick: u64, registry: &Registry) -> u32 {
        let entities = extract_states::<CachedEntityState>(registry);
        let checksum = StateChecksum::compute(&entities);
        log::trace!(
            "captured tick {} ({} entities, checksum {:#010x})",
            tick,
            entities.len(),
            checksum
        );
        self.lock().add_snapshot(tick, entities, checksum);
        checksum
    }

    /// Rewinds the world to `tick`. The world is untouched when no snapshot
    /// for that tick is retained.
    pub fn rollback_to(&self, tick: u64, registry: &mut Registry) -> bool {
        let entities = {
            let history = self.lock();
            match history.get_snapshot(tick) {
                Some(snapshot) => snapshot.entities.clone(),
                None => {
                    log::debug!("rollback to tick {} refused: not in history", tick);
                    return false;
                }
            }
        };
        restore_states(registry, &entities);
        log::debug!("rolled back to tick {} ({} entities)", tick, entities.len());
        true
    }

    pub fn snapshot_checksum(&self, tick: u64) -> Option<u32> {
        self.lock().get_snapshot(tick).map(|s| s.checksum)
    }

    /// Critical-field digest of the snapshot at `tick`.
    pub fn critical_checksum(&self, tick: u64) -> Option<u32> {
        self.with_snapshot(tick, |s| StateChecksum::compute_critical(&s.entities))
    }

    pub fn can_rollback_to(&self, tick: u64) -> bool {
        self.lock().has_snapshot(tick)
    }

    pub fn tick_range(&self) -> Option<(u64, u64)> {
        self.lock().tick_range()
    }

    pub fn history_len(&self) -> usize {
        self.lock().len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Lends the snapshot at `tick` to `f` while the history lock is held.
    pub fn with_snapshot<R>(
        &self,
        tick: u64,
        f: impl FnOnce(&StateSnapshot<CachedEntityState>) -> R,
    ) -> Option<R> {
        self.lock().get_snapshot(tick).map(f)
    }

    /// Serialized copy of the snapshot at `tick` for offline inspection.
    pub fn dump_snapshot(&self, tick: u64) -> Option<Result<Vec<u8>, DumpError>> {
        self.with_snapshot(tick, |s| s.archive_entities())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{EntityId, Health, Invincibility, Lives, Score, Transform, Velocity};
    use crate::snapshot::SnapshotDump;
    use glam::Vec2;

    fn spawn(registry: &mut Registry, x: f32) -> EntityId {
        let id = registry.create_entity();
        registry.emplace(id, Transform::at(x, 0.0));
        registry.emplace(id, Health::new(100));
        registry.emplace(id, Lives { remaining: 3 });
        registry.emplace(id, Score::default());
        id
    }

    #[test]
    fn test_capture_returns_stored_checksum() {
        let manager = RollbackManager::new();
        let mut registry = Registry::new();
        spawn(&mut registry, 1.0);

        let checksum = manager.capture_state(10, &registry);
        assert_eq!(manager.snapshot_checksum(10), Some(checksum));
        assert!(manager.can_rollback_to(10));
        assert_eq!(manager.history_len(), 1);
        assert_eq!(manager.tick_range(), Some((10, 10)));
    }

    type EntityView = (
        EntityId,
        Option<Transform>,
        Option<Velocity>,
        Option<Health>,
        Option<Lives>,
        Option<Score>,
        Option<Invincibility>,
    );

    fn observe(registry: &Registry) -> Vec<EntityView> {
        registry
            .alive_entities()
            .map(|id| {
                (
                    id,
                    registry.get::<Transform>(id).copied(),
                    registry.get::<Velocity>(id).copied(),
                    registry.get::<Health>(id).copied(),
                    registry.get::<Lives>(id).copied(),
                    registry.get::<Score>(id).copied(),
                    registry.get::<Invincibility>(id).copied(),
                )
            })
            .collect()
    }

    #[test]
    fn test_rollback_unknown_tick_leaves_world_untouched() {
        let manager = RollbackManager::new();
        let mut registry = Registry::new();
        let id = spawn(&mut registry, 5.0);
        manager.capture_state(1, &registry);

        registry.get_mut::<Transform>(id).unwrap().position.x = 50.0;
        registry.get_mut::<Health>(id).unwrap().current = 40;
        registry.emplace(
            id,
            Velocity {
                linear: Vec2::new(1.0, -1.0),
            },
        );
        let late = spawn(&mut registry, -8.0);
        registry.get_mut::<Score>(late).unwrap().points = 250;
        registry.emplace(late, Invincibility { remaining: 1.5 });

        let count = registry.entity_count();
        let before = observe(&registry);
        assert_eq!(before.len(), 2);

        assert!(!manager.rollback_to(99, &mut registry));
        assert!(!manager.rollback_to(0, &mut registry));
        assert_eq!(registry.entity_count(), count);
        assert_eq!(observe(&registry), before);
    }

    #[test]
    fn test_rollback_restores_fields() {
        let manager = RollbackManager::new();
        let mut registry = Registry::new();
        let id = spawn(&mut registry, 5.0);
        registry.emplace(
            id,
            Velocity {
                linear: Vec2::new(2.0, 0.0),
            },
        );
        let before = manager.capture_state(1, &registry);

        registry.get_mut::<Transform>(id).unwrap().position = Vec2::new(80.0, 80.0);
        registry.get_mut::<Health>(id).unwrap().current = 10;
        registry.get_mut::<Lives>(id).unwrap().remaining = 1;
        registry.get_mut::<Score>(id).unwrap().points = 500;
        registry.emplace(id, Invincibility { remaining: 3.0 });

        assert!(manager.rollback_to(1, &mut registry));
        assert_eq!(
            registry.get::<Transform>(id).unwrap().position,
            Vec2::new(5.0, 0.0)
        );
        assert_eq!(registry.get::<Health>(id).unwrap().current, 100);
        assert_eq!(registry.get::<Lives>(id).unwrap().remaining, 3);
        assert_eq!(registry.get::<Score>(id).unwrap().points, 0);
        assert!(!registry.has::<Invincibility>(id));

        assert_eq!(manager.capture_state(2, &registry), before);
    }

    #[test]
    fn test_rollback_reconciles_entity_set() {
        let manager = RollbackManager::new();
        let mut registry = Registry::new();
        let kept = spawn(&mut registry, 1.0);
        let removed_later = spawn(&mut registry, 2.0);
        manager.capture_state(1, &registry);

        registry.destroy_entity(removed_later);
        let spawned_later = spawn(&mut registry, 3.0);
        let untracked = registry.create_entity();

        assert!(manager.rollback_to(1, &mut registry));
        assert!(registry.is_alive(kept));
        assert!(registry.is_alive(removed_later));
        assert_eq!(
            registry
                .get::<Transform>(removed_later)
                .map(|t| t.position.x),
            Some(2.0)
        );
        assert!(!registry.is_alive(spawned_later));
        assert!(registry.is_alive(untracked));
    }

    #[test]
    fn test_history_window_is_bounded() {
        let manager = RollbackManager::new();
        let mut registry = Registry::new();
        spawn(&mut registry, 0.0);
        for tick in 0..=HISTORY_SIZE as u64 {
            manager.capture_state(tick, &registry);
        }
        assert_eq!(manager.history_len(), HISTORY_SIZE);
        assert!(!manager.can_rollback_to(0));
        assert_eq!(manager.tick_range(), Some((1, HISTORY_SIZE as u64)));

        manager.clear();
        assert_eq!(manager.history_len(), 0);
        assert!(manager.tick_range().is_none());
    }

    #[test]
    fn test_dump_snapshot() {
        let manager = RollbackManager::new();
        let mut registry = Registry::new();
        spawn(&mut registry, 7.0);
        let checksum = manager.capture_state(3, &registry);

        assert!(manager.dump_snapshot(4).is_none());
        let bytes = manager.dump_snapshot(3).unwrap().unwrap();
        let dump = SnapshotDump::from_bytes(&bytes).unwrap();
        assert_eq!(dump.checksum, checksum);
        assert_eq!(
            manager.with_snapshot(3, |s| s.entities.len()),
            Some(dump.entities.len())
        );
    }
}
