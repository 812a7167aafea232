use crate::error::ProtocolError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters shared between the accept loop and whoever owns the listener.
#[derive(Debug, Default)]
pub struct ListenerStats {
    connections_accepted: AtomicU64,
    votes_dispatched: AtomicU64,
    commands_sent: AtomicU64,
    decryption_failures: AtomicU64,
    malformed_packets: AtomicU64,
    invalid_usernames: AtomicU64,
    sink_failures: AtomicU64,
    audit_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub connections_accepted: u64,
    pub votes_dispatched: u64,
    pub commands_sent: u64,
    pub decryption_failures: u64,
    pub malformed_packets: u64,
    pub invalid_usernames: u64,
    pub sink_failures: u64,
    pub audit_failures: u64,
}

impl StatsSnapshot {
    pub fn rejected(&self) -> u64 {
        self.decryption_failures + self.malformed_packets + self.invalid_usernames
    }
}

impl ListenerStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connection_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_rejected(&self, error: &ProtocolError) {
        let counter = match error {
            ProtocolError::Decryption => &self.decryption_failures,
            ProtocolError::MalformedPacket(_) => &self.malformed_packets,
            ProtocolError::InvalidUsername(_) => &self.invalid_usernames,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_sent(&self) {
        self.commands_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sink_failed(&self) {
        self.sink_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn vote_dispatched(&self) {
        self.votes_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn audit_failed(&self) {
        self.audit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            votes_dispatched: self.votes_dispatched.load(Ordering::Relaxed),
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            decryption_failures: self.decryption_failures.load(Ordering::Relaxed),
            malformed_packets: self.malformed_packets.load(Ordering::Relaxed),
            invalid_usernames: self.invalid_usernames.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            audit_failures: self.audit_failures.load(Ordering::Relaxed),
        }
    }
}
