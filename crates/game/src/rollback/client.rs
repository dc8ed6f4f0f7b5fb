use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{extract_states, restore_states};
use crate::ecs::Registry;
use crate::snapshot::{ClientEntityState, HISTORY_SIZE, StateChecksum, StateHistory};

/// Invoked with `(target_tick, current_tick)` after a rollback request has
/// been serviced.
pub type RollbackCallback = Box<dyn FnMut(u64, u64) + Send>;

/// Client-side history of locally simulated state, rewound on server request.
pub struct ClientRollbackHandler {
    history: Mutex<StateHistory<ClientEntityState>>,
    callback: Mutex<Option<RollbackCallback>>,
}

impl Default for ClientRollbackHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ClientRollbackHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRollbackHandler")
            .field("history_len", &self.history_len())
            .finish_non_exhaustive()
    }
}

impl ClientRollbackHandler {
    pub fn new() -> Self {
        Self {
            history: Mutex::new(StateHistory::with_capacity(HISTORY_SIZE)),
            callback: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StateHistory<ClientEntityState>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_rollback_callback(&self, callback: impl FnMut(u64, u64) + Send + 'static) {
        *self.callback.lock().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(callback));
    }

    pub fn capture_state(&self, tick: u64, registry: &Registry) -> u32 {
        let entities = extract_states::<ClientEntityState>(registry);
        let checksum = StateChecksum::compute(&entities);
        self.lock().add_snapshot(tick, entities, checksum);
        checksum
    }

    /// Rewinds to `target_tick` if it is still retained, then notifies the
    /// callback.
    pub fn handle_rollback_request(
        &self,
        target_tick: u64,
        current_tick: u64,
        registry: &mut Registry,
    ) -> bool {
        let entities = {
            let history = self.lock();
            match history.get_snapshot(target_tick) {
                Some(snapshot) => snapshot.entities.clone(),
                None => {
                    log::debug!(
                        "rollback request for tick {} ignored: not in history",
                        target_tick
                    );
                    return false;
                }
            }
        };
        restore_states(registry, &entities);
        log::debug!("rolled back from tick {} to {}", current_tick, target_tick);

        if let Some(callback) = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            callback(target_tick, current_tick);
        }
        true
    }

    pub fn snapshot_checksum(&self, tick: u64) -> Option<u32> {
        self.lock().get_snapshot(tick).map(|s| s.checksum)
    }

    pub fn critical_checksum(&self, tick: u64) -> Option<u32> {
        self.lock()
            .get_snapshot(tick)
            .map(|s| StateChecksum::compute_critical(&s.entities))
    }

    pub fn has_snapshot(&self, tick: u64) -> bool {
        self.lock().has_snapshot(tick)
    }

    pub fn history_len(&self) -> usize {
        self.lock().len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
