use std::collections::VecDeque;
use std::time::{Duration, Instant};

const MAX_PENDING_PINGS: usize = 32;
const INITIAL_RTT_MS: f32 = 100.0;
const INITIAL_RTT_VAR_MS: f32 = 50.0;

#[derive(Debug, Clone, Copy)]
struct PendingPing {
    sequence: u16,
    sent_at: Instant,
}

/// Traffic counters for one socket plus a smoothed round-trip estimate fed
/// by ping/pong exchanges.
#[derive(Debug, Clone)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_dropped: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub send_errors: u64,
    pub rtt_ms: f32,
    pub rtt_variance: f32,
    pings: VecDeque<PendingPing>,
    rtt_sampled: bool,
}

impl Default for NetworkStats {
    fn default() -> Self {
        Self {
            packets_sent: 0,
            packets_received: 0,
            packets_dropped: 0,
            bytes_sent: 0,
            bytes_received: 0,
            send_errors: 0,
            rtt_ms: INITIAL_RTT_MS,
            rtt_variance: INITIAL_RTT_VAR_MS,
            pings: VecDeque::with_capacity(MAX_PENDING_PINGS),
            rtt_sampled: false,
        }
    }
}

impl NetworkStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&mut self, bytes: usize) {
        self.packets_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    pub fn record_received(&mut self, bytes: usize) {
        self.packets_received += 1;
        self.bytes_received += bytes as u64;
    }

    /// A datagram that arrived but failed validation.
    pub fn record_dropped(&mut self) {
        self.packets_dropped += 1;
    }

    pub fn record_send_error(&mut self) {
        self.send_errors += 1;
    }

    pub fn record_ping_sent(&mut self, sequence: u16, now: Instant) {
        while self.pings.len() >= MAX_PENDING_PINGS {
            self.pings.pop_front();
        }
        self.pings.push_back(PendingPing {
            sequence,
            sent_at: now,
        });
    }

    /// Matches a pong against an outstanding ping and folds the sample into
    /// the smoothed RTT. Unknown or duplicate pongs are ignored.
    pub fn record_pong(&mut self, sequence: u16, now: Instant) -> Option<Duration> {
        let index = self.pings.iter().position(|p| p.sequence == sequence)?;
        let ping = self.pings.remove(index)?;
        let sample = now.saturating_duration_since(ping.sent_at);
        self.update_rtt(sample.as_secs_f32() * 1000.0);
        Some(sample)
    }

    pub fn pending_pings(&self) -> usize {
        self.pings.len()
    }

    fn update_rtt(&mut self, rtt: f32) {
        const ALPHA: f32 = 0.125;
        const BETA: f32 = 0.25;

        if !self.rtt_sampled {
            self.rtt_ms = rtt;
            self.rtt_variance = rtt / 2.0;
            self.rtt_sampled = true;
            return;
        }

        let diff = (rtt - self.rtt_ms).abs();
        self.rtt_variance = (1.0 - BETA) * self.rtt_variance + BETA * diff;
        self.rtt_ms = (1.0 - ALPHA) * self.rtt_ms + ALPHA * rtt;
    }

    pub fn drop_rate(&self) -> f32 {
        let total = self.packets_received + self.packets_dropped;
        if total == 0 {
            0.0
        } else {
            self.packets_dropped as f32 / total as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let mut stats = NetworkStats::new();
        stats.record_sent(37);
        stats.record_sent(37);
        stats.record_received(100);
        stats.record_dropped();

        assert_eq!(stats.packets_sent, 2);
        assert_eq!(stats.bytes_sent, 74);
        assert_eq!(stats.packets_received, 1);
        assert!((stats.drop_rate() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_first_pong_seeds_rtt() {
        let mut stats = NetworkStats::new();
        let t0 = Instant::now();
        stats.record_ping_sent(7, t0);

        let sample = stats
            .record_pong(7, t0 + Duration::from_millis(40))
            .unwrap();
        assert_eq!(sample, Duration::from_millis(40));
        assert!((stats.rtt_ms - 40.0).abs() < 0.01);
        assert_eq!(stats.pending_pings(), 0);
    }

    #[test]
    fn test_rtt_smoothing() {
        let mut stats = NetworkStats::new();
        let t0 = Instant::now();
        stats.record_ping_sent(1, t0);
        stats.record_pong(1, t0 + Duration::from_millis(40));
        stats.record_ping_sent(2, t0);
        stats.record_pong(2, t0 + Duration::from_millis(120));

        assert!((stats.rtt_ms - 50.0).abs() < 0.01);
    }

    #[test]
    fn test_unknown_pong_ignored() {
        let mut stats = NetworkStats::new();
        let t0 = Instant::now();
        stats.record_ping_sent(1, t0);
        assert!(stats.record_pong(2, t0).is_none());
        assert!(stats.record_pong(1, t0).is_some());
        assert!(stats.record_pong(1, t0).is_none());
    }

    #[test]
    fn test_pending_pings_bounded() {
        let mut stats = NetworkStats::new();
        let t0 = Instant::now();
        for seq in 0..100 {
            stats.record_ping_sent(seq, t0);
        }
        assert_eq!(stats.pending_pings(), MAX_PENDING_PINGS);
        assert!(stats.record_pong(0, t0).is_none());
        assert!(stats.record_pong(99, t0).is_some());
    }
}
