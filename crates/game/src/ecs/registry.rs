use std::any::{Any, TypeId};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

pub type EntityId = u32;

/// Never handed out or revived; keeps `next_entity_id` from overflowing.
pub const INVALID_ENTITY: EntityId = EntityId::MAX;

trait ComponentStorage: Send {
    fn remove_entity(&mut self, id: EntityId);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Send + 'static> ComponentStorage for HashMap<EntityId, T> {
    fn remove_entity(&mut self, id: EntityId) {
        self.remove(&id);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Entity registry with one sparse storage per component type. Ids are
/// not reused by `create_entity` until the id space wraps, so snapshots can
/// name entities across despawns.
pub struct Registry {
    alive: BTreeSet<EntityId>,
    next_entity_id: EntityId,
    storages: HashMap<TypeId, Box<dyn ComponentStorage>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("alive", &self.alive.len())
            .field("next_entity_id", &self.next_entity_id)
            .field("component_types", &self.storages.len())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            alive: BTreeSet::new(),
            next_entity_id: 1,
            storages: HashMap::new(),
        }
    }

    /// Hands out the next free id, skipping ids revived by `spawn_with_id`.
    pub fn create_entity(&mut self) -> EntityId {
        loop {
            let id = self.next_entity_id;
            self.next_entity_id = match id.checked_add(1) {
                Some(next) if next != INVALID_ENTITY => next,
                _ => 1,
            };
            if id != INVALID_ENTITY && self.alive.insert(id) {
                return id;
            }
        }
    }

    /// Revives a specific id. Returns false if it is already alive or is
    /// `INVALID_ENTITY`.
    pub fn spawn_with_id(&mut self, id: EntityId) -> bool {
        if id == INVALID_ENTITY || !self.alive.insert(id) {
            return false;
        }
        if id >= self.next_entity_id {
            // id < INVALID_ENTITY, so this cannot overflow.
            self.next_entity_id = id + 1;
        }
        true
    }

    pub fn destroy_entity(&mut self, id: EntityId) -> bool {
        if !self.alive.remove(&id) {
            return false;
        }
        for storage in self.storages.values_mut() {
            storage.remove_entity(id);
        }
        true
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        self.alive.contains(&id)
    }

    pub fn entity_count(&self) -> usize {
        self.alive.len()
    }

    /// Live ids in ascending order.
    pub fn alive_entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.alive.iter().copied()
    }

    pub fn for_each_alive(&self, mut f: impl FnMut(EntityId)) {
        for &id in &self.alive {
            f(id);
        }
    }

    fn storage<T: Send + 'static>(&self) -> Option<&HashMap<EntityId, T>> {
        self.storages
            .get(&TypeId::of::<T>())
            .and_then(|s| s.as_any().downcast_ref())
    }

    fn storage_mut<T: Send + 'static>(&mut self) -> Option<&mut HashMap<EntityId, T>> {
        self.storages
            .get_mut(&TypeId::of::<T>())
            .and_then(|s| s.as_any_mut().downcast_mut())
    }

    /// Attaches or replaces a component. Dead entities are left untouched.
    pub fn emplace<T: Send + 'static>(&mut self, id: EntityId, component: T) -> Option<&mut T> {
        if !self.is_alive(id) {
            return None;
        }
        let storage = self
            .storages
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(HashMap::<EntityId, T>::new()))
            .as_any_mut()
            .downcast_mut::<HashMap<EntityId, T>>()?;
        storage.insert(id, component);
        storage.get_mut(&id)
    }

    pub fn get<T: Send + 'static>(&self, id: EntityId) -> Option<&T> {
        self.storage::<T>()?.get(&id)
    }

    pub fn get_mut<T: Send + 'static>(&mut self, id: EntityId) -> Option<&mut T> {
        self.storage_mut::<T>()?.get_mut(&id)
    }

    pub fn has<T: Send + 'static>(&self, id: EntityId) -> bool {
        self.get::<T>(id).is_some()
    }

    pub fn remove<T: Send + 'static>(&mut self, id: EntityId) -> Option<T> {
        self.storage_mut::<T>()?.remove(&id)
    }

    /// Live ids carrying component `T`, ascending.
    pub fn entities_with<T: Send + 'static>(&self) -> Vec<EntityId> {
        match self.storage::<T>() {
            Some(storage) => self
                .alive
                .iter()
                .copied()
                .filter(|id| storage.contains_key(id))
                .collect(),
            None => Vec::new(),
        }
    }
}
