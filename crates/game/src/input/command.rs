use glam::Vec2;

use crate::net::{InputFlags, InputPacket};

/// Default simulation step recorded with an input, in seconds.
pub const DEFAULT_INPUT_DT: f32 = 0.016;

/// One locally sampled input, tagged with a client-side sequence number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputCommand {
    pub sequence: u32,
    pub flags: InputFlags,
    pub position: Vec2,
    pub angle: f32,
    pub delta_time: f32,
}

impl InputCommand {
    pub fn new(sequence: u32, flags: InputFlags) -> Self {
        Self {
            sequence,
            flags,
            position: Vec2::ZERO,
            angle: 0.0,
            delta_time: DEFAULT_INPUT_DT,
        }
    }

    pub fn at(mut self, position: Vec2) -> Self {
        self.position = position;
        self
    }

    pub fn aiming(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    pub fn with_delta_time(mut self, delta_time: f32) -> Self {
        self.delta_time = delta_time;
        self
    }

    /// Wire form. The sequence is truncated to the header's 16 bits.
    pub fn to_packet(&self, player_id: u32) -> InputPacket {
        InputPacket::new(player_id, self.sequence as u16, self.flags)
            .with_position(self.position)
            .with_angle(self.angle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_packet_truncates_sequence() {
        let cmd = InputCommand::new(0x1_0003, InputFlags::MOVE_LEFT)
            .at(Vec2::new(1.0, 2.0))
            .aiming(0.25);
        let packet = cmd.to_packet(9);
        assert_eq!(packet.header.sequence, 3);
        assert_eq!(packet.player_id, 9);
        assert_eq!(packet.flags, InputFlags::MOVE_LEFT);
        assert_eq!(packet.position(), Vec2::new(1.0, 2.0));
        assert_eq!(packet.angle, 0.25);
    }
}
