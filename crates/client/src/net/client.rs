use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use glam::Vec2;

use strafe::ecs::{EntityId, Health, Registry, Transform};
use strafe::input::{InputBuffer, InputCommand, InputHistory, NetworkSender, SenderConfig};
use strafe::net::{
    DatagramSocket, DesyncDetectedPacket, MAX_PACKET_SIZE, Message, MessageType, NetworkStats, Ping,
    Pong, RollbackRequestPacket, SnapshotPacket, StateChecksumPacket, TransportResult, UdpEndpoint,
    decode_frame, widen_sequence,
};
use strafe::prediction::{ReconcileOutcome, Reconciler};
use strafe::rollback::ClientRollbackHandler;
use strafe::simulation::{FixedTimestep, apply_movement};

use super::config::ClientConfig;
use crate::game::InputScript;

/// Headless game client: samples scripted input, predicts its own player,
/// reconciles against server snapshots and checks the server's digests
/// against a mirror of the authoritative world.
pub struct NetworkClient {
    socket: Arc<UdpEndpoint>,
    config: ClientConfig,
    buffer: Arc<InputBuffer>,
    sender: NetworkSender,
    /// Locally predicted world.
    world: Registry,
    /// Last authoritative state received from the server.
    authority: Registry,
    rollback: ClientRollbackHandler,
    rollbacks: Arc<AtomicU32>,
    reconciler: Reconciler,
    script: InputScript,
    timestep: FixedTimestep,
    player: Option<EntityId>,
    input_sequence: u32,
    last_ack: u32,
    last_snapshot_tick: Option<u32>,
    control_sequence: u16,
    last_ping: Instant,
    last_desync_report: Option<Instant>,
    corrections: u32,
    stats: NetworkStats,
}

impl NetworkClient {
    pub fn new(config: ClientConfig) -> TransportResult<Self> {
        let socket = Arc::new(UdpEndpoint::bind(config.bind)?);
        let buffer = Arc::new(InputBuffer::new());

        let sender_config = SenderConfig {
            remote: config.server,
            bind: config.bind,
            player_id: config.player_id,
            interval: config.send_interval,
        };
        let shared: Arc<dyn DatagramSocket> = socket.clone();
        let sender = NetworkSender::with_socket(Arc::clone(&buffer), sender_config, shared)
            .with_error_handler(|e| log::error!("input sender: {}", e));

        let rollback = ClientRollbackHandler::new();
        let rollbacks = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&rollbacks);
        rollback.set_rollback_callback(move |target, current| {
            counter.fetch_add(1, Ordering::Relaxed);
            log::info!("server rolled us back from tick {} to {}", current, target);
        });

        Ok(Self {
            socket,
            buffer,
            sender,
            world: Registry::new(),
            authority: Registry::new(),
            rollback,
            rollbacks,
            reconciler: Reconciler::new(config.reconcile),
            script: InputScript::default(),
            timestep: FixedTimestep::new(config.tick_rate),
            player: None,
            input_sequence: 0,
            last_ack: 0,
            last_snapshot_tick: None,
            control_sequence: 0,
            last_ping: Instant::now(),
            last_desync_report: None,
            corrections: 0,
            stats: NetworkStats::new(),
            config,
        })
    }

    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        self.socket.local_endpoint()
    }

    /// Plays the input script for the configured duration.
    pub fn run(&mut self) -> bool {
        if !self.sender.start() {
            return false;
        }

        let started = Instant::now();
        let mut last_frame = started;
        while started.elapsed() < self.config.duration {
            let now = Instant::now();
            self.timestep.accumulate(now - last_frame);
            last_frame = now;

            if let Err(e) = self.process_network() {
                log::error!("network error: {}", e);
            }
            while self.timestep.consume_tick().is_some() {
                self.tick();
            }
            if self.last_ping.elapsed() >= self.config.ping_interval {
                self.send_ping();
            }

            std::thread::sleep(self.timestep.until_next().min(Duration::from_millis(1)));
        }

        self.sender.stop();
        self.log_summary();
        true
    }

    fn tick(&mut self) {
        let dt = self.timestep.dt();
        let (flags, angle) = self.script.next_input();
        self.input_sequence = self.input_sequence.wrapping_add(1);
        let sequence = self.input_sequence;

        let mut position = Vec2::ZERO;
        if let Some(player) = self.player {
            let speed = self.config.reconcile.move_speed;
            if let Some(transform) = self.world.get_mut::<Transform>(player) {
                apply_movement(&mut transform.position, flags, speed, dt);
                transform.rotation = angle;
                position = transform.position;
            }
            if let Some(history) = self.world.get_mut::<InputHistory>(player) {
                history.push_input(sequence, flags, position, angle, dt);
            }
        }

        self.buffer.push(
            InputCommand::new(sequence, flags)
                .at(position)
                .aiming(angle)
                .with_delta_time(dt),
        );
    }

    fn process_network(&mut self) -> TransportResult<()> {
        let mut buf = [0u8; MAX_PACKET_SIZE];
        let mut datagrams = Vec::new();
        self.socket
            .drain(&mut buf, |data, _| datagrams.push(data.to_vec()))?;

        for data in datagrams {
            self.stats.record_received(data.len());
            let Some(frame) = decode_frame(&data) else {
                self.stats.record_dropped();
                continue;
            };

            let handled = match frame.header.message_type {
                MessageType::Snapshot => SnapshotPacket::from_frame(&frame)
                    .map(|(header, snapshot)| self.handle_snapshot(header.tick, snapshot)),
                MessageType::StateChecksum => StateChecksumPacket::from_frame(&frame)
                    .map(|(_, checksum)| self.handle_checksum(checksum)),
                MessageType::RollbackRequest => RollbackRequestPacket::from_frame(&frame)
                    .map(|(_, request)| self.handle_rollback(request)),
                MessageType::ServerPong => {
                    Pong::from_frame(&frame).map(|(header, _)| self.handle_pong(header.sequence))
                }
                other => {
                    log::debug!("ignoring {:?}", other);
                    Some(())
                }
            };
            if handled.is_none() {
                self.stats.record_dropped();
            }
        }
        Ok(())
    }

    fn handle_snapshot(&mut self, tick: u32, snapshot: SnapshotPacket) {
        if self.last_snapshot_tick.is_some_and(|last| tick <= last) {
            log::trace!("stale snapshot for tick {}", tick);
            return;
        }
        self.last_snapshot_tick = Some(tick);

        self.mirror_authority(&snapshot);
        self.rollback
            .capture_state(u64::from(tick), &self.authority);

        let Some(server_view) = snapshot.entity(snapshot.player_entity).copied() else {
            return;
        };
        let player = match self.player {
            Some(player) => player,
            None => {
                let id = snapshot.player_entity;
                if !self.world.spawn_with_id(id) {
                    log::warn!("cannot control entity {}", id);
                    return;
                }
                self.world.emplace(
                    id,
                    Transform {
                        position: server_view.position,
                        rotation: 0.0,
                    },
                );
                self.world.emplace(id, InputHistory::new());
                self.sender.set_player_id(id);
                self.player = Some(id);
                log::info!("controlling entity {}", id);
                id
            }
        };

        self.last_ack = widen_sequence(self.input_sequence, snapshot.last_input_sequence);
        let outcome = self.reconciler.reconcile(
            &mut self.world,
            player,
            server_view.position,
            self.last_ack,
        );
        if let ReconcileOutcome::Corrected {
            percent_error,
            replayed,
        } = outcome
        {
            self.corrections += 1;
            log::debug!(
                "tick {}: corrected {:.2}% error, replayed {} inputs",
                tick,
                percent_error * 100.0,
                replayed
            );
        }
    }

    /// Makes `authority` hold exactly the entities in `snapshot`.
    fn mirror_authority(&mut self, snapshot: &SnapshotPacket) {
        for id in self.authority.entities_with::<Transform>() {
            if snapshot.entity(id).is_none() {
                self.authority.destroy_entity(id);
            }
        }
        for entity in &snapshot.entities {
            if !self.authority.is_alive(entity.id) && !self.authority.spawn_with_id(entity.id) {
                log::debug!("dropping snapshot entity {}", entity.id);
                continue;
            }
            self.authority.emplace(
                entity.id,
                Transform {
                    position: entity.position,
                    rotation: 0.0,
                },
            );
            self.authority.emplace(
                entity.id,
                Health {
                    current: entity.health,
                    max: entity.health,
                },
            );
        }
    }

    fn handle_checksum(&mut self, packet: StateChecksumPacket) {
        let tick = u64::from(packet.tick);
        let Some(local) = self.rollback.critical_checksum(tick) else {
            log::trace!("no local snapshot for tick {}", tick);
            return;
        };
        if local == packet.critical_checksum {
            log::trace!("tick {} verified ({:08x})", tick, local);
            return;
        }

        log::warn!(
            "desync at tick {}: server {:08x}, local {:08x}",
            tick,
            packet.critical_checksum,
            local
        );
        let throttled = self
            .last_desync_report
            .is_some_and(|last| last.elapsed() < self.config.desync_report_interval);
        if throttled {
            return;
        }
        self.last_desync_report = Some(Instant::now());

        let report = DesyncDetectedPacket {
            tick: packet.tick,
            expected: packet.critical_checksum,
            actual: local,
        };
        self.send_control(&report);
    }

    fn handle_rollback(&mut self, request: RollbackRequestPacket) {
        let target = u64::from(request.target_tick);
        let current = u64::from(request.current_tick);
        if !self.rollback.handle_rollback_request(
            target,
            current,
            &mut self.authority,
        ) {
            return;
        }

        let Some(player) = self.player else {
            return;
        };
        if let Some(position) = self.authority.get::<Transform>(player).map(|t| t.position) {
            self.reconciler.reconcile(
                &mut self.world,
                player,
                position,
                self.last_ack,
            );
        }
    }

    fn handle_pong(&mut self, sequence: u16) {
        if let Some(rtt) = self.stats.record_pong(sequence, Instant::now()) {
            log::trace!(
                "pong {}: {:?} (smoothed {:.1} ms)",
                sequence,
                rtt,
                self.stats.rtt_ms
            );
        }
    }

    fn send_ping(&mut self) {
        let sequence = self.control_sequence;
        self.last_ping = Instant::now();
        self.stats.record_ping_sent(sequence, self.last_ping);
        self.send_control(&Ping);
    }

    fn send_control<M: Message>(&mut self, message: &M) {
        let sequence = self.control_sequence;
        self.control_sequence = self.control_sequence.wrapping_add(1);

        let bytes = match message.encode(sequence, self.timestep.tick() as u32) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("failed to encode {:?}: {}", M::MESSAGE_TYPE, e);
                return;
            }
        };
        match self.socket.send_to(&bytes, self.config.server) {
            Ok(sent) => self.stats.record_sent(sent),
            Err(e) if e.is_transient() => {}
            Err(e) => {
                self.stats.record_send_error();
                log::warn!("failed to send {:?}: {}", M::MESSAGE_TYPE, e);
            }
        }
    }

    fn log_summary(&self) {
        let inputs = self.sender.stats();
        log::info!(
            "sent {} inputs ({} errors), received {} packets ({} dropped)",
            inputs.packets_sent,
            inputs.send_errors,
            self.stats.packets_received,
            self.stats.packets_dropped
        );
        log::info!(
            "rtt {:.1} ms (variance {:.1}), {} corrections, {} rollbacks, last ack {}",
            self.stats.rtt_ms,
            self.stats.rtt_variance,
            self.corrections,
            self.rollbacks.load(Ordering::Relaxed),
            self.last_ack
        );
        if let Some(player) = self.player {
            if let Some(transform) = self.world.get::<Transform>(player) {
                log::info!("final position {:?}", transform.position);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use strafe::ecs::INVALID_ENTITY;
    use strafe::net::SnapshotEntity;

    use super::*;

    fn client() -> NetworkClient {
        let config = ClientConfig {
            bind: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            ..ClientConfig::default()
        };
        NetworkClient::new(config).unwrap()
    }

    fn entity(id: u32, x: f32) -> SnapshotEntity {
        SnapshotEntity {
            id,
            position: Vec2::new(x, 0.0),
            health: 100,
        }
    }

    #[test]
    fn test_snapshot_with_invalid_entity_is_dropped() {
        let mut client = client();
        let snapshot = SnapshotPacket {
            player_entity: INVALID_ENTITY,
            last_input_sequence: 0,
            entities: vec![entity(INVALID_ENTITY, 1.0), entity(4, 2.0)],
        };
        let bytes = snapshot.encode(0, 7).unwrap();
        let (header, decoded) = SnapshotPacket::decode(&bytes).unwrap();

        client.handle_snapshot(header.tick, decoded);

        assert!(client.player.is_none());
        assert!(!client.authority.is_alive(INVALID_ENTITY));
        assert_eq!(client.authority.entity_count(), 1);
        assert_eq!(
            client.authority.get::<Transform>(4).map(|t| t.position),
            Some(Vec2::new(2.0, 0.0))
        );
        assert_eq!(client.authority.create_entity(), 5);
    }

    #[test]
    fn test_first_snapshot_takes_control_of_player() {
        let mut client = client();
        let snapshot = SnapshotPacket {
            player_entity: 3,
            last_input_sequence: 0,
            entities: vec![entity(3, 10.0)],
        };

        client.handle_snapshot(1, snapshot);

        assert_eq!(client.player, Some(3));
        assert!(client.world.has::<InputHistory>(3));
        assert_eq!(
            client.world.get::<Transform>(3).map(|t| t.position),
            Some(Vec2::new(10.0, 0.0))
        );
    }
}
