use bitflags::bitflags;
use glam::Vec2;

use crate::ecs::{
    EntityId, Health, Invincibility, Lives, Registry, RenderType, Score, Transform, Velocity,
};

/// Immunity granted when a rollback revives the invincible status bit.
pub const RESTORED_INVINCIBILITY_SECS: f32 = 2.0;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StatusFlags: u8 {
        const INVINCIBLE = 1 << 1;
    }
}

/// Per-entity values that can be captured from and written back into a
/// [`Registry`].
pub trait SnapshotState: Copy + Send + 'static {
    /// `None` for entities without a transform.
    fn capture(registry: &Registry, id: EntityId) -> Option<Self>;

    /// Writes this state onto a live entity.
    fn restore(&self, registry: &mut Registry, id: EntityId);

    fn is_initialized(&self) -> bool;
}

fn restore_transform(registry: &mut Registry, id: EntityId, position: Vec2) {
    match registry.get_mut::<Transform>(id) {
        Some(transform) => transform.position = position,
        None => {
            registry.emplace(
                id,
                Transform {
                    position,
                    rotation: 0.0,
                },
            );
        }
    }
}

fn restore_velocity(registry: &mut Registry, id: EntityId, linear: Vec2) {
    if linear == Vec2::ZERO {
        return;
    }
    match registry.get_mut::<Velocity>(id) {
        Some(velocity) => velocity.linear = linear,
        None => {
            registry.emplace(id, Velocity { linear });
        }
    }
}

fn restore_health(registry: &mut Registry, id: EntityId, health: i16) {
    if let Some(h) = registry.get_mut::<Health>(id) {
        h.current = health;
    }
}

/// Server-side view of one entity at one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CachedEntityState {
    pub position: Vec2,
    pub velocity: Vec2,
    pub health: i16,
    pub lives: u8,
    pub score: i32,
    pub status: u8,
    pub type_id: u8,
    pub initialized: bool,
}

impl CachedEntityState {
    pub fn status_flags(&self) -> StatusFlags {
        StatusFlags::from_bits_retain(self.status)
    }
}

impl SnapshotState for CachedEntityState {
    fn capture(registry: &Registry, id: EntityId) -> Option<Self> {
        let transform = registry.get::<Transform>(id)?;

        let mut status = StatusFlags::empty();
        status.set(StatusFlags::INVINCIBLE, registry.has::<Invincibility>(id));

        Some(Self {
            position: transform.position,
            velocity: registry
                .get::<Velocity>(id)
                .map_or(Vec2::ZERO, |v| v.linear),
            health: registry.get::<Health>(id).map_or(0, |h| h.current),
            lives: registry.get::<Lives>(id).map_or(0, |l| l.remaining),
            score: registry.get::<Score>(id).map_or(0, |s| s.points),
            status: status.bits(),
            type_id: registry.get::<RenderType>(id).map_or(0, |r| r.kind),
            initialized: true,
        })
    }

    fn restore(&self, registry: &mut Registry, id: EntityId) {
        restore_transform(registry, id, self.position);
        restore_velocity(registry, id, self.velocity);
        restore_health(registry, id, self.health);
        if let Some(lives) = registry.get_mut::<Lives>(id) {
            lives.remaining = self.lives;
        }
        if let Some(score) = registry.get_mut::<Score>(id) {
            score.points = self.score;
        }

        let invincible = self.status_flags().contains(StatusFlags::INVINCIBLE);
        match (invincible, registry.has::<Invincibility>(id)) {
            (true, false) => {
                registry.emplace(
                    id,
                    Invincibility {
                        remaining: RESTORED_INVINCIBILITY_SECS,
                    },
                );
            }
            (false, true) => {
                registry.remove::<Invincibility>(id);
            }
            _ => {}
        }
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Client-side view of one entity: only what the client simulates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClientEntityState {
    pub position: Vec2,
    pub velocity: Vec2,
    pub health: i16,
    pub valid: bool,
}

impl SnapshotState for ClientEntityState {
    fn capture(registry: &Registry, id: EntityId) -> Option<Self> {
        let transform = registry.get::<Transform>(id)?;
        Some(Self {
            position: transform.position,
            velocity: registry
                .get::<Velocity>(id)
                .map_or(Vec2::ZERO, |v| v.linear),
            health: registry.get::<Health>(id).map_or(0, |h| h.current),
            valid: true,
        })
    }

    fn restore(&self, registry: &mut Registry, id: EntityId) {
        restore_transform(registry, id, self.position);
        restore_velocity(registry, id, self.velocity);
        restore_health(registry, id, self.health);
    }

    fn is_initialized(&self) -> bool {
        self.valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_entity(registry: &mut Registry) -> EntityId {
        let id = registry.create_entity();
        registry.emplace(id, Transform::at(10.0, 20.0));
        registry.emplace(
            id,
            Velocity {
                linear: Vec2::new(1.0, 0.0),
            },
        );
        registry.emplace(id, Health::new(100));
        registry.emplace(id, Lives { remaining: 3 });
        registry.emplace(id, Score { points: 1500 });
        registry.emplace(id, Invincibility { remaining: 1.0 });
        registry.emplace(id, RenderType { kind: 4 });
        id
    }

    #[test]
    fn test_capture_reads_present_components() {
        let mut registry = Registry::new();
        let id = full_entity(&mut registry);

        let state = CachedEntityState::capture(&registry, id).unwrap();
        assert_eq!(state.position, Vec2::new(10.0, 20.0));
        assert_eq!(state.velocity, Vec2::new(1.0, 0.0));
        assert_eq!(state.health, 100);
        assert_eq!(state.lives, 3);
        assert_eq!(state.score, 1500);
        assert!(state.status_flags().contains(StatusFlags::INVINCIBLE));
        assert_eq!(state.type_id, 4);
        assert!(state.initialized);
    }

    #[test]
    fn test_capture_requires_transform() {
        let mut registry = Registry::new();
        let id = registry.create_entity();
        registry.emplace(id, Health::new(5));
        assert!(CachedEntityState::capture(&registry, id).is_none());
        assert!(ClientEntityState::capture(&registry, id).is_none());
    }

    #[test]
    fn test_restore_toggles_invincibility_by_status_bit() {
        let mut registry = Registry::new();
        let id = full_entity(&mut registry);
        let mut state = CachedEntityState::capture(&registry, id).unwrap();

        state.status = 0;
        state.restore(&mut registry, id);
        assert!(!registry.has::<Invincibility>(id));

        state.status = StatusFlags::INVINCIBLE.bits();
        state.restore(&mut registry, id);
        assert_eq!(
            registry.get::<Invincibility>(id).map(|i| i.remaining),
            Some(RESTORED_INVINCIBILITY_SECS)
        );
    }

    #[test]
    fn test_restore_skips_zero_velocity_and_absent_components() {
        let mut registry = Registry::new();
        let id = registry.create_entity();
        let state = CachedEntityState {
            position: Vec2::new(3.0, 4.0),
            health: 50,
            initialized: true,
            ..Default::default()
        };
        state.restore(&mut registry, id);

        assert_eq!(
            registry.get::<Transform>(id).map(|t| t.position),
            Some(Vec2::new(3.0, 4.0))
        );
        assert!(!registry.has::<Velocity>(id));
        assert!(!registry.has::<Health>(id));
    }

    #[test]
    fn test_client_state_roundtrip_through_registry() {
        let mut registry = Registry::new();
        let id = full_entity(&mut registry);
        let state = ClientEntityState::capture(&registry, id).unwrap();

        registry.get_mut::<Transform>(id).unwrap().position = Vec2::ZERO;
        registry.get_mut::<Health>(id).unwrap().current = 1;
        state.restore(&mut registry, id);

        assert_eq!(
            registry.get::<Transform>(id).unwrap().position,
            Vec2::new(10.0, 20.0)
        );
        assert_eq!(registry.get::<Health>(id).unwrap().current, 100);
        assert!(state.is_initialized());
    }
}
