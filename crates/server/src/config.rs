use std::path::PathBuf;
use std::time::Duration;

use strafe::simulation::DEFAULT_MOVE_SPEED;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub tick_rate: u32,
    pub max_clients: usize,
    /// Broadcast a snapshot every this many ticks.
    pub snapshot_send_rate: u32,
    pub move_speed: f32,
    pub client_timeout: Duration,
    pub input_queue_size: usize,
    /// Where desync dumps are written. Dumps are only logged when unset.
    pub dump_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: strafe::DEFAULT_TICK_RATE,
            max_clients: 32,
            snapshot_send_rate: 3,
            move_speed: DEFAULT_MOVE_SPEED,
            client_timeout: Duration::from_secs(5),
            input_queue_size: 1024,
            dump_dir: None,
        }
    }
}
