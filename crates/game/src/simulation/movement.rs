use glam::Vec2;

use crate::net::InputFlags;

/// Units per second.
pub const DEFAULT_MOVE_SPEED: f32 = 200.0;

/// Displacement produced by holding `flags` for `dt` seconds. Client
/// prediction, replay, and the server all move through this function so
/// they agree bit for bit on the same inputs.
#[inline]
pub fn movement_delta(flags: InputFlags, speed: f32, dt: f32) -> Vec2 {
    flags.direction() * (speed * dt)
}

/// Applies one input step to `position`. Returns whether it moved.
pub fn apply_movement(position: &mut Vec2, flags: InputFlags, speed: f32, dt: f32) -> bool {
    let delta = movement_delta(flags, speed, dt);
    if delta == Vec2::ZERO {
        return false;
    }
    *position += delta;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_axis_step() {
        let mut pos = Vec2::new(100.0, 100.0);
        assert!(apply_movement(&mut pos, InputFlags::MOVE_RIGHT, 200.0, 0.016));
        assert!((pos.x - 103.2).abs() < 1e-4);
        assert_eq!(pos.y, 100.0);
    }

    #[test]
    fn test_diagonal_is_not_faster() {
        let straight = movement_delta(InputFlags::MOVE_DOWN, 200.0, 0.5);
        let diagonal = movement_delta(InputFlags::MOVE_DOWN | InputFlags::MOVE_LEFT, 200.0, 0.5);
        assert!((straight.length() - diagonal.length()).abs() < 1e-4);
    }

    #[test]
    fn test_idle_or_cancelled_input_does_not_move() {
        let mut pos = Vec2::new(5.0, 5.0);
        assert!(!apply_movement(&mut pos, InputFlags::FIRE, 200.0, 0.016));
        assert!(!apply_movement(
            &mut pos,
            InputFlags::MOVE_UP | InputFlags::MOVE_DOWN,
            200.0,
            0.016
        ));
        assert_eq!(pos, Vec2::new(5.0, 5.0));
    }
}
