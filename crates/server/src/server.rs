use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use strafe::ecs::{Controller, EntityId, Health, Lives, Registry, Score, Transform};
use strafe::net::{
    DatagramSocket, DesyncDetectedPacket, Frame, InputPacket, JoinFailed, JoinRoom, JoinSuccess,
    ListRooms, MAX_PACKET_SIZE, Message, MessageType, NetworkStats, Ping, Pong,
    RollbackRequestPacket, RoomInfo, RoomList, RoomState, RoomType, RoomVisibility, SnapshotEntity,
    SnapshotPacket, StateChecksumPacket, TransportResult, UdpEndpoint, decode_frame,
};
use strafe::rollback::RollbackManager;
use strafe::simulation::{FixedTimestep, InputProcessor, InputQueue};

use crate::config::ServerConfig;

const ROOM_ID: u32 = 1;
const PLAYER_HEALTH: i16 = 100;
const PLAYER_LIVES: u8 = 3;

#[derive(Debug)]
struct ClientSlot {
    entity: EntityId,
    last_receive: Instant,
    send_sequence: u16,
}

impl ClientSlot {
    fn next_sequence(&mut self) -> u16 {
        let sequence = self.send_sequence;
        self.send_sequence = self.send_sequence.wrapping_add(1);
        sequence
    }
}

pub struct GameServer {
    endpoint: UdpEndpoint,
    config: ServerConfig,
    registry: Registry,
    rollback: RollbackManager,
    inputs: InputQueue,
    processor: InputProcessor,
    clients: HashMap<SocketAddr, ClientSlot>,
    timestep: FixedTimestep,
    last_tick_time: Instant,
    stats: NetworkStats,
}

impl GameServer {
    pub fn new(bind_addr: SocketAddr, config: ServerConfig) -> TransportResult<Self> {
        let endpoint = UdpEndpoint::bind(bind_addr)?;
        let timestep = FixedTimestep::new(config.tick_rate);

        Ok(Self {
            endpoint,
            registry: Registry::new(),
            rollback: RollbackManager::new(),
            inputs: InputQueue::new(config.input_queue_size),
            processor: InputProcessor::new(config.move_speed, timestep.dt()),
            clients: HashMap::new(),
            timestep,
            last_tick_time: Instant::now(),
            stats: NetworkStats::new(),
            config,
        })
    }

    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        self.endpoint.local_endpoint()
    }

    /// Serves until `duration` elapses, or forever when it is `None`.
    pub fn run(&mut self, duration: Option<Duration>) {
        let started = Instant::now();
        while duration.is_none_or(|limit| started.elapsed() < limit) {
            self.tick_once();
            std::thread::sleep(Duration::from_millis(1));
        }
        log::info!(
            "sent {} packets ({} bytes), received {} ({} bytes), dropped {}",
            self.stats.packets_sent,
            self.stats.bytes_sent,
            self.stats.packets_received,
            self.stats.bytes_received,
            self.stats.packets_dropped
        );
    }

    pub fn tick_once(&mut self) {
        let now = Instant::now();
        self.timestep.accumulate(now - self.last_tick_time);
        self.last_tick_time = now;

        if let Err(e) = self.process_network() {
            log::error!("network error: {}", e);
        }

        while let Some(tick) = self.timestep.consume_tick() {
            self.tick(tick);
        }
    }

    fn tick(&mut self, tick: u64) {
        let pending = self.inputs.drain();
        let applied = self.processor.process_all(&pending, &mut self.registry);
        if applied < pending.len() {
            log::trace!(
                "tick {}: applied {}/{} inputs",
                tick,
                applied,
                pending.len()
            );
        }

        let checksum = self.rollback.capture_state(tick, &self.registry);
        log::trace!("tick {} captured, checksum {:08x}", tick, checksum);

        if tick % u64::from(self.config.snapshot_send_rate.max(1)) == 0 {
            self.broadcast_snapshots(tick);
        }

        self.cleanup_timed_out();
    }

    fn broadcast_snapshots(&mut self, tick: u64) {
        let entities: Vec<SnapshotEntity> = self
            .registry
            .entities_with::<Transform>()
            .into_iter()
            .filter_map(|id| {
                let transform = self.registry.get::<Transform>(id)?;
                Some(SnapshotEntity {
                    id,
                    position: transform.position,
                    health: self.registry.get::<Health>(id).map_or(0, |h| h.current),
                })
            })
            .collect();

        let checksum = StateChecksumPacket {
            tick: tick as u32,
            checksum: self.rollback.snapshot_checksum(tick).unwrap_or_default(),
            critical_checksum: self.rollback.critical_checksum(tick).unwrap_or_default(),
            entity_count: entities.len().min(u16::MAX as usize) as u16,
        };

        let addrs: Vec<SocketAddr> = self.clients.keys().copied().collect();
        for addr in addrs {
            let Some(client) = self.clients.get_mut(&addr) else {
                continue;
            };
            let snapshot = SnapshotPacket {
                player_entity: client.entity,
                last_input_sequence: self.processor.last_processed(client.entity).unwrap_or(0),
                entities: entities.clone(),
            };
            let snapshot_seq = client.next_sequence();
            let checksum_seq = client.next_sequence();

            self.send(&snapshot, snapshot_seq, tick, addr);
            self.send(&checksum, checksum_seq, tick, addr);
        }
    }

    fn send<M: Message>(&mut self, message: &M, sequence: u16, tick: u64, addr: SocketAddr) {
        let bytes = match message.encode(sequence, tick as u32) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("failed to encode {:?} for {}: {}", M::MESSAGE_TYPE, addr, e);
                return;
            }
        };
        match self.endpoint.send_to(&bytes, addr) {
            Ok(sent) => self.stats.record_sent(sent),
            Err(e) if e.is_transient() => {}
            Err(e) => {
                self.stats.record_send_error();
                log::warn!("failed to send {:?} to {}: {}", M::MESSAGE_TYPE, addr, e);
            }
        }
    }

    fn process_network(&mut self) -> TransportResult<()> {
        let mut buf = [0u8; MAX_PACKET_SIZE];
        let mut datagrams = Vec::new();
        self.endpoint
            .drain(&mut buf, |data, from| datagrams.push((data.to_vec(), from)))?;

        for (data, from) in datagrams {
            self.stats.record_received(data.len());
            match decode_frame(&data) {
                Some(frame) => self.handle_frame(&data, &frame, from),
                None => self.stats.record_dropped(),
            }
        }
        Ok(())
    }

    fn handle_frame(&mut self, data: &[u8], frame: &Frame<'_>, from: SocketAddr) {
        let tick = self.timestep.tick();
        match frame.header.message_type {
            MessageType::Input => match InputPacket::decode(data) {
                Some(packet) => self.handle_input(packet, from),
                None => self.stats.record_dropped(),
            },
            MessageType::ClientPing if Ping::from_frame(frame).is_some() => {
                self.send(&Pong, frame.header.sequence, tick, from);
            }
            MessageType::DesyncDetected => match DesyncDetectedPacket::from_frame(frame) {
                Some((_, report)) => self.handle_desync(report, from),
                None => self.stats.record_dropped(),
            },
            MessageType::LobbyListRooms if ListRooms::from_frame(frame).is_some() => {
                let list = RoomList {
                    rooms: vec![self.room_info()],
                };
                self.send(&list, frame.header.sequence, tick, from);
            }
            MessageType::LobbyJoinRoom => match JoinRoom::from_frame(frame) {
                Some((_, request)) => self.handle_join(request, frame.header.sequence, from),
                None => self.stats.record_dropped(),
            },
            other => {
                log::debug!("ignoring {:?} from {}", other, from);
            }
        }

        if let Some(client) = self.clients.get_mut(&from) {
            client.last_receive = Instant::now();
        }
    }

    fn handle_input(&mut self, packet: InputPacket, from: SocketAddr) {
        let entity = match self.clients.get(&from) {
            Some(client) => client.entity,
            None => match self.admit(from, packet.player_id) {
                Some(entity) => entity,
                None => return,
            },
        };
        self.inputs.push(entity, packet);
    }

    fn admit(&mut self, addr: SocketAddr, player_id: u32) -> Option<EntityId> {
        if self.clients.len() >= self.config.max_clients {
            log::warn!(
                "rejecting {}: server full ({} clients)",
                addr,
                self.clients.len()
            );
            return None;
        }

        let entity = self.registry.create_entity();
        self.registry.emplace(entity, Transform::default());
        self.registry.emplace(entity, Health::new(PLAYER_HEALTH));
        self.registry.emplace(
            entity,
            Lives {
                remaining: PLAYER_LIVES,
            },
        );
        self.registry.emplace(entity, Score::default());
        self.registry.emplace(entity, Controller { player_id });

        self.clients.insert(
            addr,
            ClientSlot {
                entity,
                last_receive: Instant::now(),
                send_sequence: 0,
            },
        );
        log::info!(
            "client {} (player {}) joined as entity {}",
            addr,
            player_id,
            entity
        );
        Some(entity)
    }

    fn handle_desync(&mut self, report: DesyncDetectedPacket, from: SocketAddr) {
        let tick = u64::from(report.tick);
        log::warn!(
            "client {} desynced at tick {}: expected {:08x}, got {:08x}",
            from,
            tick,
            report.expected,
            report.actual
        );

        match self.rollback.dump_snapshot(tick) {
            Some(Ok(bytes)) => self.write_dump(tick, &bytes),
            Some(Err(e)) => log::error!("failed to dump tick {}: {}", tick, e),
            None => {
                log::warn!(
                    "tick {} is no longer in history, cannot roll back {}",
                    tick,
                    from
                );
                return;
            }
        }

        let current = self.timestep.tick();
        let request = RollbackRequestPacket {
            target_tick: report.tick,
            current_tick: current as u32,
        };
        let sequence = match self.clients.get_mut(&from) {
            Some(client) => client.next_sequence(),
            None => 0,
        };
        self.send(&request, sequence, current, from);
    }

    fn write_dump(&self, tick: u64, bytes: &[u8]) {
        let Some(dir) = &self.config.dump_dir else {
            log::info!("desync dump for tick {}: {} bytes", tick, bytes.len());
            return;
        };
        let path = dir.join(format!("desync-{}.bin", tick));
        match fs::create_dir_all(dir).and_then(|()| fs::write(&path, bytes)) {
            Ok(()) => log::info!("wrote desync dump {}", path.display()),
            Err(e) => log::error!("failed to write {}: {}", path.display(), e),
        }
    }

    fn room_info(&self) -> RoomInfo {
        RoomInfo {
            room_id: ROOM_ID,
            room_type: RoomType::Casual,
            player_count: self.clients.len().min(u16::MAX as usize) as u16,
            max_players: self.config.max_clients.min(u16::MAX as usize) as u16,
            port: self.local_addr().map_or(0, |addr| addr.port()),
            state: RoomState::InGame,
            owner_id: 0,
            password_protected: false,
            visibility: RoomVisibility::Public,
            countdown: 0,
            name: "strafe".to_string(),
            invite_code: String::new(),
        }
    }

    fn handle_join(&mut self, request: JoinRoom, sequence: u16, from: SocketAddr) {
        let tick = self.timestep.tick();
        let room = self.room_info();
        let reason = if request.room_id != room.room_id {
            Some("unknown room")
        } else if room.is_full() && !request.spectator {
            Some("room is full")
        } else {
            None
        };

        match reason {
            Some(reason) => {
                let failed = JoinFailed {
                    reason: Some(reason.to_string()),
                };
                self.send(&failed, sequence, tick, from);
            }
            None => {
                let success = JoinSuccess {
                    room_id: room.room_id,
                    port: room.port,
                };
                self.send(&success, sequence, tick, from);
            }
        }
    }

    fn cleanup_timed_out(&mut self) {
        let timeout = self.config.client_timeout;
        let timed_out: Vec<SocketAddr> = self
            .clients
            .iter()
            .filter(|(_, client)| client.last_receive.elapsed() > timeout)
            .map(|(addr, _)| *addr)
            .collect();

        for addr in timed_out {
            if let Some(client) = self.clients.remove(&addr) {
                self.registry.destroy_entity(client.entity);
                self.processor.remove_entity(client.entity);
                log::info!("client {} timed out (entity {})", addr, client.entity);
            }
        }
    }
}
