mod config;
mod server;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use config::ServerConfig;
use server::GameServer;

#[derive(Parser)]
#[command(name = "strafe-server")]
#[command(about = "Authoritative strafe game server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: IpAddr,

    #[arg(short, long, default_value_t = strafe::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value_t = strafe::DEFAULT_TICK_RATE)]
    tick_rate: u32,

    #[arg(short, long, default_value_t = 32)]
    max_clients: usize,

    #[arg(long, default_value_t = 3, help = "Ticks between snapshot broadcasts")]
    snapshot_rate: u32,

    #[arg(long, default_value_t = strafe::simulation::DEFAULT_MOVE_SPEED)]
    move_speed: f32,

    #[arg(long, default_value_t = 5, help = "Seconds of silence before a client is dropped")]
    timeout: u64,

    #[arg(long, help = "Directory for desync snapshot dumps")]
    dump_dir: Option<PathBuf>,

    #[arg(long, help = "Stop after this many seconds")]
    duration: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let bind_addr = SocketAddr::new(args.bind, args.port);

    let config = ServerConfig {
        tick_rate: args.tick_rate.max(1),
        max_clients: args.max_clients,
        snapshot_send_rate: args.snapshot_rate.max(1),
        move_speed: args.move_speed,
        client_timeout: Duration::from_secs(args.timeout),
        dump_dir: args.dump_dir,
        ..Default::default()
    };

    let mut server = GameServer::new(bind_addr, config)
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    log::info!("Server started on {}", server.local_addr()?);
    server.run(args.duration.map(Duration::from_secs));
    log::info!("Server shutting down");

    Ok(())
}
