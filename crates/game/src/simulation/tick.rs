use std::time::Duration;

const MAX_FRAME_DELTA: Duration = Duration::from_millis(250);

/// Fixed-step accumulator. Long stalls are clamped so a frozen process does
/// not try to catch up hundreds of ticks at once.
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    tick_rate: u32,
    step: Duration,
    accumulator: Duration,
    tick: u64,
}

impl FixedTimestep {
    pub fn new(tick_rate: u32) -> Self {
        let tick_rate = tick_rate.max(1);
        Self {
            tick_rate,
            step: Duration::from_secs(1) / tick_rate,
            accumulator: Duration::ZERO,
            tick: 0,
        }
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    pub fn dt(&self) -> f32 {
        self.step.as_secs_f32()
    }

    /// Ticks consumed so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn accumulate(&mut self, delta: Duration) {
        self.accumulator += delta.min(MAX_FRAME_DELTA);
    }

    /// Consumes one step if enough time has accumulated, returning the
    /// number of the tick to simulate.
    pub fn consume_tick(&mut self) -> Option<u64> {
        if self.accumulator < self.step {
            return None;
        }
        self.accumulator -= self.step;
        self.tick += 1;
        Some(self.tick)
    }

    /// Time left until the next step is due.
    pub fn until_next(&self) -> Duration {
        self.step.saturating_sub(self.accumulator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consumes_whole_steps() {
        let mut timestep = FixedTimestep::new(50);
        timestep.accumulate(Duration::from_millis(45));
        assert_eq!(timestep.consume_tick(), Some(1));
        assert_eq!(timestep.consume_tick(), Some(2));
        assert_eq!(timestep.consume_tick(), None);
        assert_eq!(timestep.until_next(), Duration::from_millis(15));
    }

    #[test]
    fn test_stall_is_clamped() {
        let mut timestep = FixedTimestep::new(100);
        timestep.accumulate(Duration::from_secs(10));
        let mut ticks = 0;
        while timestep.consume_tick().is_some() {
            ticks += 1;
        }
        assert_eq!(ticks, 25);
    }
}
