use glam::Vec2;

use crate::ecs::{EntityId, Registry, Transform};
use crate::input::InputHistory;
use crate::simulation::{DEFAULT_MOVE_SPEED, apply_movement};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconcileConfig {
    pub move_speed: f32,
    /// Error fraction at or above which the client always snaps.
    pub hard_threshold: f32,
    /// Error fraction at or above which the client snaps once the cooldown
    /// has elapsed.
    pub soft_threshold: f32,
    pub soft_cooldown_secs: f32,
    /// Assumed seconds between authoritative updates.
    pub update_interval_secs: f32,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            move_speed: DEFAULT_MOVE_SPEED,
            hard_threshold: 0.05,
            soft_threshold: 0.02,
            soft_cooldown_secs: 2.0,
            update_interval_secs: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconcileOutcome {
    /// Entity is dead or lacks a transform or input history.
    Skipped,
    WithinTolerance { percent_error: f32 },
    Corrected { percent_error: f32, replayed: usize },
}

/// Relative error between predicted and authoritative positions, normalized
/// by the authoritative position's distance from the origin.
pub fn percent_error(predicted: Vec2, authoritative: Vec2) -> f32 {
    let error = predicted.distance(authoritative);
    let magnitude = authoritative.length();
    if magnitude > 0.0 { error / magnitude } else { error }
}

/// Corrects a locally predicted entity against server positions and
/// replays the inputs the server has not processed yet.
#[derive(Debug, Clone)]
pub struct Reconciler {
    config: ReconcileConfig,
    time_since_correction: f32,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(ReconcileConfig::default())
    }
}

impl Reconciler {
    pub fn new(config: ReconcileConfig) -> Self {
        Self {
            config,
            time_since_correction: 0.0,
        }
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    pub fn time_since_correction(&self) -> f32 {
        self.time_since_correction
    }

    pub fn reconcile(
        &mut self,
        registry: &mut Registry,
        entity: EntityId,
        authoritative: Vec2,
        ack_sequence: u32,
    ) -> ReconcileOutcome {
        if !registry.is_alive(entity) || !registry.has::<InputHistory>(entity) {
            return ReconcileOutcome::Skipped;
        }
        let Some(predicted) = registry.get::<Transform>(entity).map(|t| t.position) else {
            return ReconcileOutcome::Skipped;
        };

        let error = percent_error(predicted, authoritative);
        self.time_since_correction += self.config.update_interval_secs;

        let must_correct = error >= self.config.hard_threshold
            || (error >= self.config.soft_threshold
                && self.time_since_correction >= self.config.soft_cooldown_secs);

        let outcome = if must_correct {
            let mut replay = registry
                .get::<InputHistory>(entity)
                .map(|history| history.inputs_after(ack_sequence))
                .unwrap_or_default();
            replay.sort_by_key(|entry| entry.sequence);

            let mut position = authoritative;
            for entry in &replay {
                apply_movement(
                    &mut position,
                    entry.flags,
                    self.config.move_speed,
                    entry.delta_time,
                );
            }
            if let Some(transform) = registry.get_mut::<Transform>(entity) {
                transform.position = position;
            }
            self.time_since_correction = 0.0;

            log::debug!(
                "entity {} corrected: {:.2}% error, replayed {} inputs after {}",
                entity,
                error * 100.0,
                replay.len(),
                ack_sequence
            );
            ReconcileOutcome::Corrected {
                percent_error: error,
                replayed: replay.len(),
            }
        } else {
            ReconcileOutcome::WithinTolerance {
                percent_error: error,
            }
        };

        if let Some(history) = registry.get_mut::<InputHistory>(entity) {
            history.acknowledge_up_to(ack_sequence);
        }
        outcome
    }
}
