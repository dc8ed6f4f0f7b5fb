use std::collections::{HashMap, VecDeque};

use super::movement::{DEFAULT_MOVE_SPEED, apply_movement};
use crate::ecs::{EntityId, Registry, Transform};
use crate::net::{InputPacket, sequence_greater_than};

#[derive(Debug, Clone, Copy)]
pub struct PendingInput {
    pub entity: EntityId,
    pub packet: InputPacket,
}

/// Inputs received since the last tick, bounded so a flooding client cannot
/// grow it without limit.
#[derive(Debug)]
pub struct InputQueue {
    inputs: VecDeque<PendingInput>,
    max_size: usize,
}

impl InputQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            inputs: VecDeque::with_capacity(max_size),
            max_size: max_size.max(1),
        }
    }

    pub fn push(&mut self, entity: EntityId, packet: InputPacket) {
        if self.inputs.len() >= self.max_size {
            self.inputs.pop_front();
        }
        self.inputs.push_back(PendingInput { entity, packet });
    }

    pub fn drain(&mut self) -> Vec<PendingInput> {
        self.inputs.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.inputs.clear();
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

/// Authoritative application of client inputs. Each accepted input moves
/// its entity one fixed step; duplicates and inputs older than the newest
/// applied sequence are dropped.
#[derive(Debug)]
pub struct InputProcessor {
    move_speed: f32,
    dt: f32,
    last_sequence: HashMap<EntityId, u16>,
}

impl Default for InputProcessor {
    fn default() -> Self {
        Self::new(
            DEFAULT_MOVE_SPEED,
            1.0 / crate::net::DEFAULT_TICK_RATE as f32,
        )
    }
}

impl InputProcessor {
    pub fn new(move_speed: f32, dt: f32) -> Self {
        Self {
            move_speed,
            dt,
            last_sequence: HashMap::new(),
        }
    }

    pub fn process(
        &mut self,
        registry: &mut Registry,
        entity: EntityId,
        packet: &InputPacket,
    ) -> bool {
        let sequence = packet.header.sequence;
        if let Some(&last) = self.last_sequence.get(&entity) {
            if !sequence_greater_than(sequence, last) {
                log::trace!(
                    "entity {} dropped stale input {} (last {})",
                    entity,
                    sequence,
                    last
                );
                return false;
            }
        }
        let Some(transform) = registry.get_mut::<Transform>(entity) else {
            return false;
        };

        apply_movement(
            &mut transform.position,
            packet.flags,
            self.move_speed,
            self.dt,
        );
        transform.rotation = packet.angle;
        self.last_sequence.insert(entity, sequence);
        true
    }

    /// Applies inputs in arrival order, returning how many were accepted.
    pub fn process_all(&mut self, inputs: &[PendingInput], registry: &mut Registry) -> usize {
        inputs
            .iter()
            .filter(|pending| self.process(registry, pending.entity, &pending.packet))
            .count()
    }

    pub fn last_processed(&self, entity: EntityId) -> Option<u16> {
        self.last_sequence.get(&entity).copied()
    }

    pub fn remove_entity(&mut self, entity: EntityId) {
        self.last_sequence.remove(&entity);
    }
}
