mod game;
mod net;

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;

use net::{ClientConfig, NetworkClient};

#[derive(Parser)]
#[command(name = "strafe-client")]
#[command(about = "Headless strafe client driving a scripted input pattern")]
struct Args {
    #[arg(
        short,
        long,
        default_value = "127.0.0.1:27015",
        help = "Server address to connect to"
    )]
    server: SocketAddr,

    #[arg(short, long, default_value = "0.0.0.0:0")]
    bind: SocketAddr,

    #[arg(long, default_value_t = 1)]
    player_id: u32,

    #[arg(short, long, default_value_t = strafe::DEFAULT_TICK_RATE)]
    tick_rate: u32,

    #[arg(long, default_value_t = 16, help = "Milliseconds between input packets")]
    send_interval: u64,

    #[arg(short, long, default_value_t = 30, help = "Seconds to run the input script")]
    duration: u64,

    #[arg(long, default_value_t = strafe::simulation::DEFAULT_MOVE_SPEED)]
    move_speed: f32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let defaults = ClientConfig::default();
    let config = ClientConfig {
        server: args.server,
        bind: args.bind,
        player_id: args.player_id,
        tick_rate: args.tick_rate.max(1),
        send_interval: Duration::from_millis(args.send_interval),
        duration: Duration::from_secs(args.duration),
        reconcile: strafe::ReconcileConfig {
            move_speed: args.move_speed,
            ..defaults.reconcile
        },
        ..defaults
    };

    let mut client =
        NetworkClient::new(config).with_context(|| format!("failed to bind {}", args.bind))?;
    log::info!(
        "Client {} playing against {}",
        client.local_addr()?,
        args.server
    );

    if !client.run() {
        bail!("input sender failed to start");
    }
    Ok(())
}
