use std::collections::VecDeque;

use glam::Vec2;

use crate::net::InputFlags;

pub const MAX_HISTORY_SIZE: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputHistoryEntry {
    pub sequence: u32,
    pub flags: InputFlags,
    pub position: Vec2,
    pub angle: f32,
    pub delta_time: f32,
}

/// Inputs the server has not yet confirmed, kept on the locally controlled
/// entity for replay after a correction.
#[derive(Debug, Clone)]
pub struct InputHistory {
    entries: VecDeque<InputHistoryEntry>,
    last_acknowledged: u32,
    capacity: usize,
}

impl Default for InputHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl InputHistory {
    pub fn new() -> Self {
        Self::with_capacity(MAX_HISTORY_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            last_acknowledged: 0,
            capacity,
        }
    }

    /// Appends an entry, evicting the oldest once full.
    pub fn push(&mut self, entry: InputHistoryEntry) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn push_input(
        &mut self,
        sequence: u32,
        flags: InputFlags,
        position: Vec2,
        angle: f32,
        delta_time: f32,
    ) {
        self.push(InputHistoryEntry {
            sequence,
            flags,
            position,
            angle,
            delta_time,
        });
    }

    /// Drops every entry the server has confirmed, up to and including
    /// `sequence`. Sequences are already widened to `u32`, so a stale ack
    /// arriving out of order never moves `last_acknowledged` backwards.
    pub fn acknowledge_up_to(&mut self, sequence: u32) {
        if sequence <= self.last_acknowledged {
            return;
        }
        self.last_acknowledged = sequence;
        self.entries.retain(|e| e.sequence > sequence);
    }

    /// Copies of the entries newer than `sequence`, oldest first.
    pub fn inputs_after(&self, sequence: u32) -> Vec<InputHistoryEntry> {
        self.entries
            .iter()
            .filter(|e| e.sequence > sequence)
            .copied()
            .collect()
    }

    pub fn last_acknowledged(&self) -> u32 {
        self.last_acknowledged
    }

    pub fn latest_sequence(&self) -> Option<u32> {
        self.entries.back().map(|e| e.sequence)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InputHistoryEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_with(sequences: impl IntoIterator<Item = u32>) -> InputHistory {
        let mut history = InputHistory::new();
        for seq in sequences {
            history.push_input(seq, InputFlags::MOVE_RIGHT, Vec2::ZERO, 0.0, 0.016);
        }
        history
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let history = history_with(1..=130);
        assert_eq!(history.len(), MAX_HISTORY_SIZE);
        assert_eq!(history.iter().next().map(|e| e.sequence), Some(3));
        assert_eq!(history.latest_sequence(), Some(130));
    }

    #[test]
    fn test_acknowledge_up_to() {
        let mut history = history_with(1..=5);
        history.acknowledge_up_to(3);
        assert_eq!(history.last_acknowledged(), 3);
        let remaining: Vec<_> = history.iter().map(|e| e.sequence).collect();
        assert_eq!(remaining, vec![4, 5]);

        history.acknowledge_up_to(10);
        assert!(history.is_empty());
    }

    #[test]
    fn test_stale_ack_is_ignored() {
        let mut history = history_with(1..=6);
        history.acknowledge_up_to(4);
        history.push_input(7, InputFlags::MOVE_UP, Vec2::ZERO, 0.0, 0.016);

        history.acknowledge_up_to(2);
        assert_eq!(history.last_acknowledged(), 4);
        let remaining: Vec<_> = history.iter().map(|e| e.sequence).collect();
        assert_eq!(remaining, vec![5, 6, 7]);

        history.acknowledge_up_to(4);
        assert_eq!(history.len(), 3);
        history.acknowledge_up_to(6);
        assert_eq!(history.last_acknowledged(), 6);
        assert_eq!(history.latest_sequence(), Some(7));
    }

    #[test]
    fn test_inputs_after_is_a_copy() {
        let mut history = history_with([1, 2, 3]);
        let after = history.inputs_after(1);
        assert_eq!(
            after.iter().map(|e| e.sequence).collect::<Vec<_>>(),
            vec![2, 3]
        );

        history.acknowledge_up_to(3);
        assert_eq!(after.len(), 2);
        assert!(history.inputs_after(0).is_empty());
    }
}
