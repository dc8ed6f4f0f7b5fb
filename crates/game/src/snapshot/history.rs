use std::collections::HashMap;

use crate::ecs::EntityId;

pub const HISTORY_SIZE: usize = 60;

pub type EntityMap<S> = HashMap<EntityId, S>;

/// Every captured entity at one tick. Owned by a [`StateHistory`] slot and
/// only ever lent out.
#[derive(Debug)]
pub struct StateSnapshot<S> {
    pub tick: u64,
    pub entities: EntityMap<S>,
    pub checksum: u32,
}

/// Fixed-capacity ring of snapshots; the oldest slot is overwritten once full.
#[derive(Debug)]
pub struct StateHistory<S> {
    slots: Vec<Option<StateSnapshot<S>>>,
    head: usize,
    len: usize,
}

impl<S> Default for StateHistory<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> StateHistory<S> {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity.max(1)).map(|_| None).collect(),
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn add_snapshot(&mut self, tick: u64, entities: EntityMap<S>, checksum: u32) {
        self.slots[self.head] = Some(StateSnapshot {
            tick,
            entities,
            checksum,
        });
        self.head = (self.head + 1) % self.capacity();
        self.len = (self.len + 1).min(self.capacity());
    }

    /// Slot index of the `age`-th newest snapshot (0 = latest).
    fn index_from_newest(&self, age: usize) -> usize {
        let capacity = self.capacity();
        (self.head + capacity - 1 - age) % capacity
    }

    pub fn get_snapshot(&self, tick: u64) -> Option<&StateSnapshot<S>> {
        (0..self.len)
            .filter_map(|age| self.slots[self.index_from_newest(age)].as_ref())
            .find(|snapshot| snapshot.tick == tick)
    }

    pub fn has_snapshot(&self, tick: u64) -> bool {
        self.get_snapshot(tick).is_some()
    }

    pub fn latest(&self) -> Option<&StateSnapshot<S>> {
        if self.len == 0 {
            return None;
        }
        self.slots[self.index_from_newest(0)].as_ref()
    }

    pub fn oldest(&self) -> Option<&StateSnapshot<S>> {
        if self.len == 0 {
            return None;
        }
        let index = if self.len < self.capacity() { 0 } else { self.head };
        self.slots[index].as_ref()
    }

    /// `(oldest, latest)` ticks currently retained.
    pub fn tick_range(&self) -> Option<(u64, u64)> {
        Some((self.oldest()?.tick, self.latest()?.tick))
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }
}
