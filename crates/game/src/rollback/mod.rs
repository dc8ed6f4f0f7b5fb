mod client;
mod manager;

pub use client::{ClientRollbackHandler, RollbackCallback};
pub use manager::RollbackManager;

use crate::ecs::{EntityId, Registry, Transform};
use crate::snapshot::{EntityMap, SnapshotState};

/// Captures every live entity that has a transform.
pub(crate) fn extract_states<S: SnapshotState>(registry: &Registry) -> EntityMap<S> {
    registry
        .entities_with::<Transform>()
        .into_iter()
        .filter_map(|id| S::capture(registry, id).map(|state| (id, state)))
        .collect()
}

/// Makes the registry's positioned entities match `states` exactly: extras
/// are destroyed, missing ids are revived, and every entry is written back
/// in ascending id order.
pub(crate) fn restore_states<S: SnapshotState>(registry: &mut Registry, states: &EntityMap<S>) {
    let stale: Vec<EntityId> = registry
        .entities_with::<Transform>()
        .into_iter()
        .filter(|id| !states.contains_key(id))
        .collect();
    for id in stale {
        registry.destroy_entity(id);
    }

    let mut ids: Vec<EntityId> = states.keys().copied().collect();
    ids.sort_unstable();
    for id in ids {
        let Some(state) = states.get(&id) else {
            continue;
        };
        if !state.is_initialized() {
            continue;
        }
        if !registry.is_alive(id) && !registry.spawn_with_id(id) {
            continue;
        }
        state.restore(registry, id);
    }
}
