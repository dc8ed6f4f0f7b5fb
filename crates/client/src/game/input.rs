use strafe::net::InputFlags;

const LEGS: [InputFlags; 6] = [
    InputFlags::MOVE_RIGHT,
    InputFlags::MOVE_DOWN,
    InputFlags::MOVE_LEFT,
    InputFlags::MOVE_UP,
    InputFlags::MOVE_RIGHT.union(InputFlags::MOVE_UP),
    InputFlags::empty(),
];

/// Deterministic stand-in for a player: walks a fixed loop of movement legs,
/// firing periodically and sweeping the aim angle.
#[derive(Debug, Clone)]
pub struct InputScript {
    leg_ticks: u32,
    fire_every: u32,
    tick: u32,
}

impl InputScript {
    pub fn new(leg_ticks: u32, fire_every: u32) -> Self {
        Self {
            leg_ticks: leg_ticks.max(1),
            fire_every,
            tick: 0,
        }
    }

    /// Flags and aim angle for the next tick.
    pub fn next_input(&mut self) -> (InputFlags, f32) {
        let leg = (self.tick / self.leg_ticks) as usize % LEGS.len();
        let mut flags = LEGS[leg];
        if self.fire_every > 0 && self.tick % self.fire_every == 0 {
            flags |= InputFlags::FIRE;
        }
        let angle = (self.tick % 360) as f32;
        self.tick = self.tick.wrapping_add(1);
        (flags, angle)
    }
}

impl Default for InputScript {
    fn default() -> Self {
        Self::new(45, 20)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_walks_legs_in_order() {
        let mut script = InputScript::new(2, 0);
        let flags: Vec<InputFlags> = (0..6).map(|_| script.next_input().0).collect();
        assert_eq!(
            flags,
            vec![
                InputFlags::MOVE_RIGHT,
                InputFlags::MOVE_RIGHT,
                InputFlags::MOVE_DOWN,
                InputFlags::MOVE_DOWN,
                InputFlags::MOVE_LEFT,
                InputFlags::MOVE_LEFT,
            ]
        );
    }

    #[test]
    fn test_script_fires_periodically() {
        let mut script = InputScript::new(100, 3);
        let fired: Vec<bool> = (0..6)
            .map(|_| script.next_input().0.contains(InputFlags::FIRE))
            .collect();
        assert_eq!(fired, vec![true, false, false, true, false, false]);
    }
}
