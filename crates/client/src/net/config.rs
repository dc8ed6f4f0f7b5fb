use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use strafe::input::DEFAULT_SEND_INTERVAL;
use strafe::prediction::ReconcileConfig;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: SocketAddr,
    pub bind: SocketAddr,
    pub player_id: u32,
    pub tick_rate: u32,
    pub send_interval: Duration,
    pub ping_interval: Duration,
    /// Minimum spacing between desync reports sent to the server.
    pub desync_report_interval: Duration,
    /// How long the scripted input pattern runs.
    pub duration: Duration,
    pub reconcile: ReconcileConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: SocketAddr::from((Ipv4Addr::LOCALHOST, strafe::DEFAULT_PORT)),
            bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            player_id: 1,
            tick_rate: strafe::DEFAULT_TICK_RATE,
            send_interval: DEFAULT_SEND_INTERVAL,
            ping_interval: Duration::from_millis(250),
            desync_report_interval: Duration::from_secs(1),
            duration: Duration::from_secs(30),
            reconcile: ReconcileConfig::default(),
        }
    }
}
